// Closed-loop drive control and odometry for a four-wheel skid-steer base.
//
// The `drive` module is the core: per-wheel PID speed regulation against
// quadrature-encoder feedback, plus the differential-drive kinematics and
// pose integration built on top of it. `runtime` wraps the core in a
// fixed-rate supervision loop with a command watchdog and telemetry
// publication.

pub mod config;
pub mod drive;
pub mod messages;
pub mod runtime;
