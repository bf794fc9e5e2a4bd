// Forward kinematics and pose integration
//
// Consumes the drive core's measured wheel speeds and distances through its
// public accessors and integrates them into a robot-frame pose and velocity
// estimate. Integration is first-order Euler using the heading at the start
// of each step, applied consistently on every call.

use serde::Serialize;

use super::controller::DriveController;
use super::wheel::WheelParams;

/// Robot odometry record: per-wheel and per-side angular state plus the
/// robot-frame pose and velocity. Zeroed at startup and by [`OdometryEstimator::reset`];
/// mutated only by the estimator's update step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RobotOdometry {
    pub wheel_fr_ang_pos: f64, // radians
    pub wheel_fl_ang_pos: f64, // radians
    pub wheel_rr_ang_pos: f64, // radians
    pub wheel_rl_ang_pos: f64, // radians
    pub wheel_l_ang_pos: f64,  // radians
    pub wheel_r_ang_pos: f64,  // radians
    pub wheel_l_ang_vel: f64,  // radians per second
    pub wheel_r_ang_vel: f64,  // radians per second
    pub robot_angular_pos: f64, // radians
    pub robot_angular_vel: f64, // radians per second
    pub robot_x_pos: f64,      // meters
    pub robot_y_pos: f64,      // meters
    pub robot_x_vel: f64,      // meters per second
    pub robot_y_vel: f64,      // meters per second
}

/// Owns the [`RobotOdometry`] record exclusively. Driven by a single
/// external caller at a fixed cadence; callers serialize their own access.
pub struct OdometryEstimator {
    track_width: f64,
    wheel: WheelParams,
    odom: RobotOdometry,
}

impl OdometryEstimator {
    pub fn new(track_width: f64, wheel: WheelParams) -> Self {
        OdometryEstimator {
            track_width,
            wheel,
            odom: RobotOdometry::default(),
        }
    }

    /// Keep the geometry in step with a live wheel-parameter recalibration.
    pub fn set_wheel_params(&mut self, wheel: WheelParams) {
        self.wheel = wheel;
    }

    /// One integration step over `dt` seconds of elapsed time.
    pub fn update(&mut self, drive: &DriveController, dt: f64) {
        self.apply(drive.get_speeds(), drive.get_distances(), dt);
    }

    /// Zero the whole record. Drive-core distance and tick counters are
    /// reset independently; both resets are needed for a full re-baseline.
    pub fn reset(&mut self) {
        self.odom = RobotOdometry::default();
    }

    pub fn snapshot(&self) -> RobotOdometry {
        self.odom
    }

    fn apply(&mut self, speeds: [f64; 4], distances: [f64; 4], dt: f64) {
        // Side speeds from the wheel pairs (FR, FL, RR, RL slot order)
        let v_right = (speeds[0] + speeds[2]) / 2.0;
        let v_left = (speeds[1] + speeds[3]) / 2.0;

        let v = (v_left + v_right) / 2.0;
        let omega = (v_right - v_left) / self.track_width;

        // Position uses the heading at the start of the step
        let heading = self.odom.robot_angular_pos;
        self.odom.robot_x_pos += v * heading.cos() * dt;
        self.odom.robot_y_pos += v * heading.sin() * dt;
        self.odom.robot_angular_pos += omega * dt;

        self.odom.robot_x_vel = v * heading.cos();
        self.odom.robot_y_vel = v * heading.sin();
        self.odom.robot_angular_vel = omega;

        let radius = self.wheel.effective_radius();
        self.odom.wheel_l_ang_vel = v_left / radius;
        self.odom.wheel_r_ang_vel = v_right / radius;

        self.odom.wheel_fr_ang_pos = self.wheel.distance_to_angle(distances[0]);
        self.odom.wheel_fl_ang_pos = self.wheel.distance_to_angle(distances[1]);
        self.odom.wheel_rr_ang_pos = self.wheel.distance_to_angle(distances[2]);
        self.odom.wheel_rl_ang_pos = self.wheel.distance_to_angle(distances[3]);
        self.odom.wheel_l_ang_pos =
            (self.odom.wheel_fl_ang_pos + self.odom.wheel_rl_ang_pos) / 2.0;
        self.odom.wheel_r_ang_pos =
            (self.odom.wheel_fr_ang_pos + self.odom.wheel_rr_ang_pos) / 2.0;
    }
}
