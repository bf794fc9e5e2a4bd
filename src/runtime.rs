// Fixed-rate supervision loop around the drive core
//
// Owns the kinematics layer and the odometry estimator; drains runtime
// commands non-blockingly (latest velocity wins), runs the speed watchdog,
// integrates odometry with measured elapsed time, and publishes telemetry
// snapshots at a divided cadence. The regulation tick itself runs in its
// own task so a slow supervision cycle never stalls speed control.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{CMD_TIMEOUT, LOOP_HZ, TELEMETRY_DIVIDER};
use crate::drive::{
    DriveController, DriveKinematics, DriveState, OdometryEstimator, WheelParams,
};
use crate::messages::{RuntimeCommand, RuntimeHealth, TelemetrySnapshot};

#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub loop_hz: u64,
    pub cmd_timeout: Duration,
    pub telemetry_divider: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            loop_hz: LOOP_HZ,
            cmd_timeout: CMD_TIMEOUT,
            telemetry_divider: TELEMETRY_DIVIDER,
        }
    }
}

pub struct DriveRuntime {
    drive: Arc<DriveController>,
    kinematics: DriveKinematics,
    odometry: OdometryEstimator,
    config: RuntimeConfig,
    wheel: WheelParams,
    watchdog_enabled: bool,
    /// Starts tripped: the base holds still until the first command
    watchdog_tripped: bool,
    last_cmd_at: Instant,
}

impl DriveRuntime {
    pub fn new(
        drive: Arc<DriveController>,
        track_width: f64,
        wheel: WheelParams,
        config: RuntimeConfig,
    ) -> Self {
        DriveRuntime {
            drive,
            kinematics: DriveKinematics::new(track_width),
            odometry: OdometryEstimator::new(track_width, wheel),
            config,
            wheel,
            watchdog_enabled: true,
            watchdog_tripped: true,
            last_cmd_at: Instant::now(),
        }
    }

    fn on_command(&mut self, cmd: RuntimeCommand) {
        debug!(?cmd, "runtime command");
        match cmd {
            RuntimeCommand::SetVelocity { linear, angular } => {
                self.kinematics.set_robot_speed(&self.drive, linear, angular);
                self.last_cmd_at = Instant::now();
                self.watchdog_tripped = false;
            }
            RuntimeCommand::Stop => self.drive.stop(),
            RuntimeCommand::ResetOdometry => {
                self.odometry.reset();
                info!("odometry reset");
            }
            RuntimeCommand::ResetDistance => self.drive.reset_distance(),
            RuntimeCommand::EnablePid { enable } => self.drive.enable_pid_reg(enable),
            RuntimeCommand::EnableSpeedWatchdog { enable } => {
                self.watchdog_enabled = enable;
                self.last_cmd_at = Instant::now();
            }
            RuntimeCommand::CalibrateOdometry {
                diameter_modificator,
                tyre_deflection,
            } => {
                let mut wheel = self.wheel;
                wheel.diameter_modificator = diameter_modificator;
                wheel.tyre_deflection = tyre_deflection;
                match self.drive.update_wheel_params(&wheel) {
                    Ok(()) => {
                        self.wheel = wheel;
                        self.odometry.set_wheel_params(wheel);
                        info!(diameter_modificator, tyre_deflection, "odometry calibrated");
                    }
                    Err(e) => warn!(error = %e, "calibration rejected"),
                }
            }
        }
    }

    fn check_watchdog(&mut self) {
        if !self.watchdog_enabled || self.watchdog_tripped {
            return;
        }
        if self.last_cmd_at.elapsed() > self.config.cmd_timeout {
            warn!(
                timeout_ms = self.config.cmd_timeout.as_millis() as u64,
                "velocity command stale, stopping base"
            );
            self.kinematics.set_robot_speed(&self.drive, 0.0, 0.0);
            self.watchdog_tripped = true;
        }
    }

    fn health(&self) -> RuntimeHealth {
        if self.drive.state() == DriveState::Fault {
            RuntimeHealth::Fault
        } else if self.watchdog_tripped {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        }
    }

    fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            health: self.health(),
            drive_state: self.drive.state(),
            odometry: self.odometry.snapshot(),
            wheel_speeds: self.drive.get_speeds(),
        }
    }

    /// Run until the command channel closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<RuntimeCommand>,
        telemetry: watch::Sender<TelemetrySnapshot>,
    ) {
        let period = Duration::from_millis((1000 / self.config.loop_hz.max(1)).max(1));
        let divider = self.config.telemetry_divider.max(1);
        let mut tick = interval(period);

        info!(
            loop_hz = self.config.loop_hz,
            watchdog_ms = self.config.cmd_timeout.as_millis() as u64,
            "supervision loop started"
        );

        let mut last_update = Instant::now();
        let mut cycle: u32 = 0;

        loop {
            tick.tick().await;

            // Drain all pending commands, newest state wins
            let mut closed = false;
            loop {
                match commands.try_recv() {
                    Ok(cmd) => self.on_command(cmd),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }

            self.check_watchdog();

            let now = Instant::now();
            let dt = (now - last_update).as_secs_f64();
            last_update = now;
            self.odometry.update(&self.drive, dt);

            cycle = cycle.wrapping_add(1);
            if cycle % divider == 0 {
                // send only fails with no receivers left; keep accounting
                let _ = telemetry.send(self.snapshot());
            }

            if closed {
                info!("command channel closed, supervision loop exiting");
                break;
            }
        }
    }
}

/// Spawn the fixed-period regulation tick task. Re-arms its interval when a
/// parameter update changes the regulation period.
pub fn spawn_regulation(drive: Arc<DriveController>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut period = drive.tick_period();
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = period.as_millis() as u64, "regulation tick started");

        loop {
            tick.tick().await;
            drive.tick();

            let current = drive.tick_period();
            if current != period {
                info!(
                    period_ms = current.as_millis() as u64,
                    "regulation period changed, re-arming"
                );
                period = current;
                tick = interval(period);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            }
        }
    })
}
