// Loop rates, watchdog timeout, robot geometry, default regulator tuning
use std::time::Duration;

use crate::drive::{PidParams, Polarity, WheelParams};

// Supervision loop frequency
pub const LOOP_HZ: u64 = 50;

// Velocity-command timeout for the speed watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(1000);

// Telemetry is published every Nth supervision cycle
pub const TELEMETRY_DIVIDER: u32 = 3;

// Motor PWM carrier frequency handed to the drivers at init
pub const PWM_DEFAULT_FREQ_HZ: u32 = 18_000;

// Base geometry
pub const ROBOT_WIDTH: f64 = 0.19; // meters, track width between wheel centers
pub const ROBOT_WIDTH_HALF: f64 = ROBOT_WIDTH / 2.0;
pub const WHEEL_DIAMETER: f64 = 0.063; // meters
pub const WHEEL_RADIUS: f64 = WHEEL_DIAMETER / 2.0;

// Wiring signs: low nibble = motor direction per wheel, high nibble = encoder
// count sign per wheel (FR, FL, RR, RL)
pub const DEFAULT_POLARITY: Polarity = Polarity::new(0b0011_0000);

pub const DEFAULT_WHEEL_PARAMS: WheelParams = WheelParams {
    radius: WHEEL_RADIUS,
    diameter_modificator: 1.0,
    tyre_deflection: 1.0,
    gear_ratio: 34.014,
    encoder_cpr: 48,
};

pub const DEFAULT_PID_PARAMS: PidParams = PidParams {
    kp: 0.8,
    ki: 0.2,
    kd: 0.015,
    out_min: -0.8,
    out_max: 0.8,
    dt_ms: 10,
};
