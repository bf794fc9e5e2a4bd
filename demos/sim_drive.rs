// Deterministic scripted drive of the simulated base
//
// Steps the drive core, the plant physics and the odometry estimator by
// hand (no async runtime), so every run produces the same track. Useful for
// eyeballing the kinematics and pose integration.
//
// Usage: cargo run --example sim_drive

use diffdrive_runtime::config::{
    DEFAULT_PID_PARAMS, DEFAULT_WHEEL_PARAMS, PWM_DEFAULT_FREQ_HZ, ROBOT_WIDTH,
};
use diffdrive_runtime::drive::sim::{SimBase, SimParams};
use diffdrive_runtime::drive::{
    DriveConfig, DriveController, DriveKinematics, EncoderReader, MotorDriver,
    OdometryEstimator, Polarity, Wheel,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

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

    let kinematics = DriveKinematics::new(ROBOT_WIDTH);
    let mut odometry = OdometryEstimator::new(ROBOT_WIDTH, DEFAULT_WHEEL_PARAMS);
    let dt = DEFAULT_PID_PARAMS.dt_ms as f64 / 1000.0;

    // (linear m/s, angular rad/s, seconds)
    let phases = [
        ("straight", 0.4, 0.0, 2.0),
        ("spin", 0.0, 1.2, 1.5),
        ("arc", 0.4, -0.8, 2.0),
        ("stop", 0.0, 0.0, 1.0),
    ];

    println!("{:>8}  {:>8}  {:>8}  {:>8}  {:>8}", "phase", "x [m]", "y [m]", "hdg [rad]", "v [m/s]");
    for (name, linear, angular, seconds) in phases {
        kinematics.set_robot_speed(&drive, linear, angular);

        let ticks = (seconds / dt) as u64;
        for n in 0..ticks {
            drive.tick();
            sim.step(dt);
            odometry.update(&drive, dt);

            if n % 50 == 0 {
                let odom = odometry.snapshot();
                let speed =
                    (odom.robot_x_vel.powi(2) + odom.robot_y_vel.powi(2)).sqrt();
                println!(
                    "{:>8}  {:>8.3}  {:>8.3}  {:>8.3}  {:>8.3}",
                    name, odom.robot_x_pos, odom.robot_y_pos, odom.robot_angular_pos, speed
                );
            }
        }
    }

    let odom = odometry.snapshot();
    println!();
    println!(
        "final pose: x={:.3} m, y={:.3} m, heading={:.3} rad",
        odom.robot_x_pos, odom.robot_y_pos, odom.robot_angular_pos
    );
    println!(
        "wheel distances: FR={:.3} FL={:.3} RR={:.3} RL={:.3} m",
        drive.get_distance(Wheel::FrontRight),
        drive.get_distance(Wheel::FrontLeft),
        drive.get_distance(Wheel::RearRight),
        drive.get_distance(Wheel::RearLeft),
    );

    Ok(())
}
