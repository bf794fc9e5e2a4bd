// Differential-drive inverse kinematics
//
// The four-wheel base is driven as two effective wheels (skid steer): both
// wheels of a side get the same target, and the side speeds come from the
// standard differential relation around the track width.

use super::controller::DriveController;
use super::wheel::{SpeedMode, TargetSpeed};

/// Converts robot-frame velocity demands into per-wheel targets.
#[derive(Debug, Clone, Copy)]
pub struct DriveKinematics {
    /// Distance between the left and right wheel contact lines, meters
    track_width: f64,
}

impl DriveKinematics {
    pub const fn new(track_width: f64) -> Self {
        DriveKinematics { track_width }
    }

    pub fn track_width(&self) -> f64 {
        self.track_width
    }

    /// Per-wheel targets (FR, FL, RR, RL) for a robot-frame velocity.
    ///
    /// `linear` in m/s (positive forward), `angular` in rad/s (positive
    /// counter-clockwise).
    pub fn wheel_targets(&self, linear: f64, angular: f64) -> TargetSpeed {
        let half_track = self.track_width / 2.0;
        let v_left = linear - angular * half_track;
        let v_right = linear + angular * half_track;

        TargetSpeed {
            speed: [v_right, v_left, v_right, v_left],
            mode: SpeedMode::MetersPerSecond,
        }
    }

    /// Push a robot-frame velocity demand to the drive core.
    pub fn set_robot_speed(&self, drive: &DriveController, linear: f64, angular: f64) {
        drive.update_target_speed(&self.wheel_targets(linear, angular));
    }
}
