// Wheel model: encoder ticks and target-speed units to physical quantities
//
// All conversions funnel through the effective rolling radius
// (radius corrected for manufacturing tolerance and tyre compression) and
// the tick count of one wheel revolution (encoder CPR through the gearbox).

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

/// Physical wheel and transmission parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelParams {
    /// Nominal wheel radius in meters
    pub radius: f64,
    /// Multiplicative correction for manufacturing tolerance
    pub diameter_modificator: f64,
    /// Multiplicative correction for tyre compression under load
    pub tyre_deflection: f64,
    /// Gearbox reduction between motor shaft and wheel
    pub gear_ratio: f64,
    /// Encoder counts per motor-shaft revolution
    pub encoder_cpr: u32,
}

/// Unit tag attached to a target-speed update. Converted once at the
/// boundary into the canonical internal unit (m/s); `DutyCycle` carries a
/// raw actuation value instead of a speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedMode {
    TicksPerSamplePeriod,
    Rpm,
    RpmNoGear,
    MetersPerSecond,
    DutyCycle,
}

/// A four-wheel target-speed update (FR, FL, RR, RL order).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TargetSpeed {
    pub speed: [f64; 4],
    pub mode: SpeedMode,
}

impl Default for TargetSpeed {
    fn default() -> Self {
        TargetSpeed {
            speed: [0.0; 4],
            mode: SpeedMode::MetersPerSecond,
        }
    }
}

impl WheelParams {
    /// All parameters must be positive and finite.
    pub fn is_valid(&self) -> bool {
        let fields = [
            self.radius,
            self.diameter_modificator,
            self.tyre_deflection,
            self.gear_ratio,
        ];
        fields.iter().all(|v| v.is_finite() && *v > 0.0) && self.encoder_cpr > 0
    }

    /// Rolling radius after tyre and tolerance corrections.
    #[inline]
    pub fn effective_radius(&self) -> f64 {
        self.radius * self.diameter_modificator * self.tyre_deflection
    }

    /// Encoder ticks per one wheel revolution.
    #[inline]
    pub fn ticks_per_rev(&self) -> f64 {
        self.encoder_cpr as f64 * self.gear_ratio
    }

    /// Linear distance covered per encoder tick.
    #[inline]
    pub fn meters_per_tick(&self) -> f64 {
        TAU * self.effective_radius() / self.ticks_per_rev()
    }

    pub fn ticks_to_meters(&self, ticks: i64) -> f64 {
        ticks as f64 * self.meters_per_tick()
    }

    /// Wheel angle in radians corresponding to a rolled distance.
    pub fn distance_to_angle(&self, meters: f64) -> f64 {
        meters / self.effective_radius()
    }

    /// Convert a target-speed value tagged with `mode` into the canonical
    /// internal unit. `DutyCycle` values pass through unchanged; a
    /// degenerate conversion clamps to zero instead of propagating, so one
    /// bad channel cannot take down the other three.
    pub fn speed_to_mps(&self, value: f64, mode: SpeedMode, dt_ms: u32) -> f64 {
        let converted = match mode {
            SpeedMode::TicksPerSamplePeriod => {
                value * self.meters_per_tick() * 1000.0 / dt_ms as f64
            }
            SpeedMode::Rpm => value / 60.0 * TAU * self.effective_radius(),
            SpeedMode::RpmNoGear => value / (60.0 * self.gear_ratio) * TAU * self.effective_radius(),
            SpeedMode::MetersPerSecond | SpeedMode::DutyCycle => value,
        };
        if converted.is_finite() { converted } else { 0.0 }
    }
}
