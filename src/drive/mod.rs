// Drive core for the four-wheel skid-steer base
//
// Provides:
// - Hardware abstraction traits for the dual-channel motor drivers and
//   quadrature encoders, plus a simulated backend
// - Wheel model (encoder ticks <-> physical units)
// - Per-wheel PID speed regulation behind a single mutex (DriveController)
// - Differential-drive kinematics and odometry integration

mod controller;
mod kinematics;
mod odometry;
mod pid;
pub mod hal;
pub mod sim;
mod wheel;

pub use controller::{
    DriveConfig, DriveController, DriveError, DriveState, PidDebugData, TICK_ORDER,
};
pub use hal::{DriverChannel, EncoderReader, HalError, MotorDriver, Polarity, Wheel};
pub use kinematics::DriveKinematics;
pub use odometry::{OdometryEstimator, RobotOdometry};
pub use pid::{PidParams, SpeedRegulator};
pub use wheel::{SpeedMode, TargetSpeed, WheelParams};
