// Message types exchanged with the runtime

use serde::{Deserialize, Serialize};

use crate::drive::{DriveState, RobotOdometry};

/// Robot-frame velocity demand.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// Forward velocity in m/s (positive = forward)
    pub linear: f64,
    /// Angular velocity in rad/s (positive = counter-clockwise)
    pub angular: f64,
}

/// Commands accepted by the supervision loop.
///
/// This is the drive-relevant subset of the original platform's command set,
/// dispatched with a `match` instead of a name-to-handler table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum RuntimeCommand {
    SetVelocity { linear: f64, angular: f64 },
    Stop,
    ResetOdometry,
    ResetDistance,
    EnablePid { enable: bool },
    EnableSpeedWatchdog { enable: bool },
    CalibrateOdometry {
        diameter_modificator: f64,
        tyre_deflection: f64,
    },
}

/// Health status published alongside telemetry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    /// No velocity command within the watchdog timeout; base commanded to stop
    #[default]
    CmdStale,
    /// Drive core latched a peripheral fault; actuation forced to zero
    Fault,
}

/// Point-in-time telemetry snapshot published by the runtime.
#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct TelemetrySnapshot {
    pub health: RuntimeHealth,
    pub drive_state: DriveState,
    pub odometry: RobotOdometry,
    /// Last measured wheel speeds in m/s (FR, FL, RR, RL)
    pub wheel_speeds: [f64; 4],
}
