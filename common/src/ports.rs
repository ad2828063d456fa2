//! Hardware and time boundaries consumed by the control core.
//!
//! Adapters (ESP32 peripherals, host simulation, test mocks) implement these
//! traits; the core never touches pins or clocks directly.

use chrono::NaiveTime;

/// Direction of travel for the valve motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// IN1 low, PWM on IN2.
    Open,
    /// PWM on IN1, IN2 low.
    Close,
}

/// H-bridge output sink.
pub trait ActuatorHardware {
    /// Energize the bridge in `direction` at `duty` (0-255).
    fn drive(&mut self, direction: Direction, duty: u8);

    /// Both inputs low, both PWM channels zeroed.
    fn idle(&mut self);
}

/// Raw ADC reading of the divided-down supply rail.
pub trait VoltageSource {
    fn sample_millivolts(&mut self) -> u32;
}

/// Room temperature in °F, or NaN when the sensor is missing or faulted.
pub trait TemperatureSource {
    fn read(&mut self) -> f32;
}

/// One reading of the control clock.
///
/// `monotonic_ms` drives every duration; `local_time` is only consulted for
/// the allowed-hours window and is `None` until wall-clock time is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    pub monotonic_ms: u64,
    pub local_time: Option<NaiveTime>,
}

impl ClockReading {
    pub fn new(monotonic_ms: u64, local_time: Option<NaiveTime>) -> Self {
        Self {
            monotonic_ms,
            local_time,
        }
    }
}

pub trait Clock {
    fn now(&self) -> ClockReading;
}
