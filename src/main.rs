use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;

use diffdrive_runtime::config::{PWM_DEFAULT_FREQ_HZ, ROBOT_WIDTH};
use diffdrive_runtime::drive::sim::{SimBase, SimParams};
use diffdrive_runtime::drive::{
    DriveConfig, DriveController, EncoderReader, MotorDriver, Polarity, Wheel,
};
use diffdrive_runtime::messages::{RuntimeCommand, TelemetrySnapshot};
use diffdrive_runtime::runtime::{spawn_regulation, DriveRuntime, RuntimeConfig};

/// Run the drive runtime against the simulated base through a scripted
/// sequence of velocity commands.
#[derive(Parser)]
struct Args {
    /// Supervision loop rate in Hz
    #[arg(long, default_value_t = 50)]
    rate_hz: u64,

    /// Speed-watchdog timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    watchdog_ms: u64,

    /// Total scripted run duration in seconds
    #[arg(long, default_value_t = 6.0)]
    duration_s: f64,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let sim = SimBase::new(SimParams::default());
    let drivers: [Box<dyn MotorDriver>; 2] = [Box::new(sim.driver(0)), Box::new(sim.driver(1))];
    let encoders: [Box<dyn EncoderReader>; 4] = [
        Box::new(sim.encoder(Wheel::FrontRight)),
        Box::new(sim.encoder(Wheel::FrontLeft)),
        Box::new(sim.encoder(Wheel::RearRight)),
        Box::new(sim.encoder(Wheel::RearLeft)),
    ];

    // The simulated wiring is ideal, so no polarity correction
    let config = DriveConfig {
        polarity: Polarity::IDENTITY,
        ..DriveConfig::default()
    };
    let drive = Arc::new(DriveController::new(config, drivers, encoders)?);
    drive.init(PWM_DEFAULT_FREQ_HZ)?;
    drive.enable_pid_reg(true);
    drive.enable(true)?;

    let regulation = spawn_regulation(drive.clone());
    let physics = {
        let sim = sim.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(2));
            loop {
                tick.tick().await;
                sim.step(0.002);
            }
        })
    };

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (telemetry_tx, telemetry_rx) = watch::channel(TelemetrySnapshot::default());
    let runtime = DriveRuntime::new(
        drive.clone(),
        ROBOT_WIDTH,
        config.wheel,
        RuntimeConfig {
            loop_hz: args.rate_hz,
            cmd_timeout: Duration::from_millis(args.watchdog_ms),
            ..RuntimeConfig::default()
        },
    );
    let supervisor = tokio::spawn(runtime.run(cmd_rx, telemetry_tx));

    // Scripted run: straight leg, arc, stop. Commands are republished the
    // way a live operator stream would, so the watchdog stays quiet.
    let phases = [(0.3, 0.0), (0.2, 0.6), (0.0, 0.0)];
    let leg = Duration::from_secs_f64((args.duration_s / phases.len() as f64).max(0.1));
    for (linear, angular) in phases {
        info!(linear, angular, "phase");
        let deadline = Instant::now() + leg;
        while Instant::now() < deadline {
            cmd_tx
                .send(RuntimeCommand::SetVelocity { linear, angular })
                .await?;
            sleep(Duration::from_millis(100)).await;
        }
        report(&telemetry_rx);
    }

    drop(cmd_tx);
    supervisor.await?;
    regulation.abort();
    physics.abort();
    info!("scripted run complete");
    Ok(())
}

fn report(telemetry: &watch::Receiver<TelemetrySnapshot>) {
    let snapshot = *telemetry.borrow();
    match serde_json::to_string(&snapshot) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("telemetry serialisation failed: {}", e),
    }
}
