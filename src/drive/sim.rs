// Simulated hardware backend
//
// Each wheel is a first-order plant: commanded duty maps to a steady-state
// speed, approached with a configurable time constant. The encoder counter
// integrates the plant speed through the wheel geometry. Deterministic by
// construction, so the demo binary and the closed-loop tests both run
// against it; faults are injectable to exercise the Fault path.

use std::sync::{Arc, Mutex};

use super::hal::{DriverChannel, EncoderReader, HalError, MotorDriver, Wheel};
use super::wheel::WheelParams;

/// Plant coefficients shared by all four simulated wheels.
#[derive(Debug, Clone, Copy)]
pub struct SimParams {
    /// Wheel speed at full duty, m/s
    pub max_speed_mps: f64,
    /// First-order time constant, seconds
    pub time_constant_s: f64,
    /// Geometry used to turn plant speed into encoder ticks
    pub wheel: WheelParams,
}

impl Default for SimParams {
    fn default() -> Self {
        SimParams {
            max_speed_mps: 1.0,
            time_constant_s: 0.15,
            wheel: crate::config::DEFAULT_WHEEL_PARAMS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WheelPlant {
    duty: f64,
    speed_mps: f64,
    /// Fractional tick position; the encoder reports the floor
    position_ticks: f64,
    encoder_failed: bool,
}

#[derive(Default)]
struct SimState {
    plants: [WheelPlant; 4],
    driver_faults: [bool; 2],
}

/// Handle to the simulated base. Cheap to clone; all clones share the same
/// plant state, mirroring how the real peripherals are one physical robot.
#[derive(Clone)]
pub struct SimBase {
    params: SimParams,
    state: Arc<Mutex<SimState>>,
}

impl SimBase {
    pub fn new(params: SimParams) -> Self {
        SimBase {
            params,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Advance the physics by `dt` seconds.
    pub fn step(&self, dt: f64) {
        let mut state = self.state.lock().unwrap();
        let ticks_per_meter = 1.0 / self.params.wheel.meters_per_tick();
        for plant in state.plants.iter_mut() {
            let steady = plant.duty * self.params.max_speed_mps;
            let alpha = dt / (self.params.time_constant_s + dt);
            plant.speed_mps += alpha * (steady - plant.speed_mps);
            plant.position_ticks += plant.speed_mps * dt * ticks_per_meter;
        }
    }

    /// Current plant speed of one wheel, m/s.
    pub fn wheel_speed(&self, wheel: Wheel) -> f64 {
        self.state.lock().unwrap().plants[wheel.index()].speed_mps
    }

    pub fn inject_driver_fault(&self, driver: usize, on: bool) {
        self.state.lock().unwrap().driver_faults[driver] = on;
    }

    pub fn fail_encoder(&self, wheel: Wheel, on: bool) {
        self.state.lock().unwrap().plants[wheel.index()].encoder_failed = on;
    }

    /// Motor-driver endpoint for one of the two dual-channel drivers.
    pub fn driver(&self, index: usize) -> SimMotorDriver {
        SimMotorDriver { index, base: self.clone() }
    }

    /// Encoder endpoint for one wheel.
    pub fn encoder(&self, wheel: Wheel) -> SimEncoder {
        SimEncoder { wheel, base: self.clone() }
    }

    /// Wheel a driver channel is wired to; mirror of the harness mapping in
    /// `hal::driver_slot`.
    fn channel_wheel(index: usize, channel: DriverChannel) -> Wheel {
        match (index, channel) {
            (0, DriverChannel::A) => Wheel::FrontRight,
            (0, DriverChannel::B) => Wheel::RearRight,
            (1, DriverChannel::A) => Wheel::FrontLeft,
            _ => Wheel::RearLeft,
        }
    }
}

pub struct SimMotorDriver {
    index: usize,
    base: SimBase,
}

impl MotorDriver for SimMotorDriver {
    fn init(&mut self, _pwm_freq_hz: u32) -> Result<(), HalError> {
        Ok(())
    }

    fn set_duty(&mut self, channel: DriverChannel, duty: f64) -> Result<(), HalError> {
        let wheel = SimBase::channel_wheel(self.index, channel);
        let mut state = self.base.state.lock().unwrap();
        if state.driver_faults[self.index] {
            return Err(HalError::DriverWrite {
                driver: self.index,
                reason: "injected fault".into(),
            });
        }
        state.plants[wheel.index()].duty = duty.clamp(-1.0, 1.0);
        Ok(())
    }

    fn fault_asserted(&self) -> bool {
        self.base.state.lock().unwrap().driver_faults[self.index]
    }
}

pub struct SimEncoder {
    wheel: Wheel,
    base: SimBase,
}

impl EncoderReader for SimEncoder {
    fn read_ticks(&mut self) -> Result<i64, HalError> {
        let state = self.base.state.lock().unwrap();
        let plant = &state.plants[self.wheel.index()];
        if plant.encoder_failed {
            return Err(HalError::EncoderRead {
                wheel: self.wheel,
                reason: "injected failure".into(),
            });
        }
        Ok(plant.position_ticks.floor() as i64)
    }

    fn reset(&mut self) {
        self.base.state.lock().unwrap().plants[self.wheel.index()].position_ticks = 0.0;
    }
}
