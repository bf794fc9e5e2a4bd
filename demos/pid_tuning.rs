// Step-response capture for regulator tuning
//
// Applies a speed step to the simulated base and prints one CSV row per
// regulation tick from the front-right wheel's debug snapshot. Pipe the
// output into a plotter and iterate on the gains.
//
// Usage: cargo run --example pid_tuning

use diffdrive_runtime::config::{DEFAULT_PID_PARAMS, PWM_DEFAULT_FREQ_HZ};
use diffdrive_runtime::drive::sim::{SimBase, SimParams};
use diffdrive_runtime::drive::{
    DriveConfig, DriveController, EncoderReader, MotorDriver, PidParams, Polarity, SpeedMode,
    TargetSpeed, Wheel,
};

const STEP_TARGET_MPS: f64 = 0.4;
const CAPTURE_TICKS: u32 = 200;

fn capture(label: &str, drive: &DriveController, sim: &SimBase, dt: f64) {
    drive.update_target_speed(&TargetSpeed {
        speed: [STEP_TARGET_MPS; 4],
        mode: SpeedMode::MetersPerSecond,
    });

    for n in 0..CAPTURE_TICKS {
        drive.tick();
        sim.step(dt);
        let d = drive.get_pid_debug_data(Wheel::FrontRight);
        println!(
            "{},{},{:.4},{:.4},{:.4},{:.4}",
            label, n, d.measured_speed, d.target_speed, d.output, d.error
        );
    }

    // Back to standstill between captures
    drive.update_target_speed(&TargetSpeed {
        speed: [0.0; 4],
        mode: SpeedMode::MetersPerSecond,
    });
    for _ in 0..CAPTURE_TICKS {
        drive.tick();
        sim.step(dt);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sim = SimBase::new(SimParams::default());
    let drivers: [Box<dyn MotorDriver>; 2] = [Box::new(sim.driver(0)), Box::new(sim.driver(1))];
    let encoders: [Box<dyn EncoderReader>; 4] = [
        Box::new(sim.encoder(Wheel::FrontRight)),
        Box::new(sim.encoder(Wheel::FrontLeft)),
        Box::new(sim.encoder(Wheel::RearRight)),
        Box::new(sim.encoder(Wheel::RearLeft)),
    ];

    let config = DriveConfig {
        polarity: Polarity::IDENTITY,
        ..DriveConfig::default()
    };
    let drive = DriveController::new(config, drivers, encoders)?;
    drive.init(PWM_DEFAULT_FREQ_HZ)?;
    drive.enable_pid_reg(true);
    drive.enable(true)?;

    let dt = DEFAULT_PID_PARAMS.dt_ms as f64 / 1000.0;

    println!("gains,tick,measured,target,output,error");
    capture("default", &drive, &sim, dt);

    // Same step with a stiffer proportional term for comparison
    let stiff = PidParams {
        kp: 2.0,
        ..DEFAULT_PID_PARAMS
    };
    drive.update_pid_params(&stiff, true)?;
    capture("stiff", &drive, &sim, dt);

    Ok(())
}
