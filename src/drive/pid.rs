// Discrete PID speed regulator, one instance per wheel
//
// Fixed-step form: the integral and derivative terms use the configured
// regulation period, so the tick scheduler and the regulator must agree on
// dt_ms. Changing the period or gains requires a state reset to avoid an
// output discontinuity from stale history.

use serde::{Deserialize, Serialize};

/// PID gains, actuation clamp, and the regulation period they are tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidParams {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Lower duty-cycle bound
    pub out_min: f64,
    /// Upper duty-cycle bound
    pub out_max: f64,
    /// Regulation period in milliseconds
    pub dt_ms: u32,
}

impl PidParams {
    pub fn is_valid(&self) -> bool {
        let gains = [self.kp, self.ki, self.kd];
        gains.iter().all(|g| g.is_finite() && *g >= 0.0)
            && self.out_min.is_finite()
            && self.out_max.is_finite()
            && self.out_min < self.out_max
            && self.dt_ms > 0
    }

    #[inline]
    pub fn dt_s(&self) -> f64 {
        self.dt_ms as f64 / 1000.0
    }
}

/// Regulator state for one wheel. Gains live in the shared [`PidParams`] so
/// a parameter update swaps all four wheels in one step.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedRegulator {
    integral: f64,
    prev_error: f64,
    /// False until the first step after a reset; the derivative term is
    /// suppressed on that step since there is no valid error history.
    primed: bool,
}

impl SpeedRegulator {
    /// Advance one regulation period and return the clamped actuation.
    pub fn step(&mut self, error: f64, params: &PidParams) -> f64 {
        let dt = params.dt_s();

        self.integral += error * dt;
        // Anti-windup: keep the integral contribution inside the output band
        if params.ki > 0.0 {
            self.integral = self
                .integral
                .clamp(params.out_min / params.ki, params.out_max / params.ki);
        }

        let derivative = if self.primed {
            (error - self.prev_error) / dt
        } else {
            0.0
        };
        self.primed = true;
        self.prev_error = error;

        let out = params.kp * error + params.ki * self.integral + params.kd * derivative;
        out.clamp(params.out_min, params.out_max)
    }

    /// Drop integral and derivative history.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.primed = false;
    }
}
