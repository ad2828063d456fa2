//! Bench stand-ins for the H-bridge, supply sense line and room sensor.

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use tracing::{debug, info};

use gaslog_common::{ActuatorHardware, Direction, TemperatureSource, VoltageSource};

use crate::host::monotonic_ms;

/// 12 V rail seen through a 13:1 divider.
const DEFAULT_SUPPLY_MILLIVOLTS: u32 = 923;

/// Logs bridge transitions instead of toggling pins.
#[derive(Debug, Default)]
pub struct SimulatedBridge {
    energized: Option<(Direction, u8)>,
}

impl ActuatorHardware for SimulatedBridge {
    fn drive(&mut self, direction: Direction, duty: u8) {
        info!(?direction, duty, "bridge energized");
        self.energized = Some((direction, duty));
    }

    fn idle(&mut self) {
        if self.energized.take().is_some() {
            info!("bridge idle");
        }
    }
}

/// Fixed ADC reading, overridable through `SUPPLY_MILLIVOLTS`.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedRail {
    millivolts: u32,
}

impl SimulatedRail {
    pub fn from_env() -> Self {
        let millivolts = std::env::var("SUPPLY_MILLIVOLTS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(DEFAULT_SUPPLY_MILLIVOLTS);
        info!(millivolts, "simulated supply rail");
        Self { millivolts }
    }
}

impl VoltageSource for SimulatedRail {
    fn sample_millivolts(&mut self) -> u32 {
        self.millivolts
    }
}

/// Blocking delay for the sampling loop; callers run it off the async workers.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

/// Latest reading pushed by the MQTT sensor node.
#[derive(Debug)]
pub struct SensorFeed {
    latest: Option<(f32, u64)>,
    stale_timeout_ms: u64,
}

impl SensorFeed {
    pub fn new(stale_timeout_ms: u64) -> Self {
        Self {
            latest: None,
            stale_timeout_ms,
        }
    }

    /// Store a raw reading. Anything unparseable or outside -40..=150 °F is
    /// kept as a faulted (NaN) sample.
    pub fn record(&mut self, temperature_f: Option<f32>, now_ms: u64) {
        let value = temperature_f
            .filter(|temp| temp.is_finite() && (-40.0..=150.0).contains(temp))
            .unwrap_or(f32::NAN);
        if value.is_nan() {
            debug!(?temperature_f, "sensor reading rejected");
        }
        self.latest = Some((value, now_ms));
    }

    fn read_at(&self, now_ms: u64) -> f32 {
        match self.latest {
            Some((value, received_ms))
                if now_ms.saturating_sub(received_ms) <= self.stale_timeout_ms =>
            {
                value
            }
            _ => f32::NAN,
        }
    }
}

impl TemperatureSource for SensorFeed {
    fn read(&mut self) -> f32 {
        self.read_at(monotonic_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_goes_stale() {
        let mut feed = SensorFeed::new(30_000);
        assert!(feed.read_at(0).is_nan());

        feed.record(Some(68.5), 1_000);
        assert_eq!(feed.read_at(31_000), 68.5);
        assert!(feed.read_at(31_001).is_nan());
    }

    #[test]
    fn feed_rejects_out_of_range_readings() {
        let mut feed = SensorFeed::new(30_000);
        feed.record(Some(68.5), 0);
        feed.record(Some(-196.6), 10);

        assert!(feed.read_at(20).is_nan());

        feed.record(None, 30);
        assert!(feed.read_at(40).is_nan());
    }

    #[test]
    fn bridge_tracks_energized_state() {
        let mut bridge = SimulatedBridge::default();
        bridge.drive(Direction::Open, 200);
        assert_eq!(bridge.energized, Some((Direction::Open, 200)));

        bridge.idle();
        assert_eq!(bridge.energized, None);
    }
}
