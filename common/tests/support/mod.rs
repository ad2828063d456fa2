//! Recording bench hardware for controller tests.

#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use chrono::NaiveTime;
use embedded_hal::delay::DelayNs;
use gaslog_common::{
    ActuatorHardware, ClockReading, ControllerConfig, Direction, ModeController,
    PersistedSettings, VoltageSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeCall {
    Drive(Direction, u8),
    Idle,
}

/// Shared handle so tests can inspect the bridge after the controller owns it.
#[derive(Clone, Default)]
pub struct BenchBridge {
    calls: Rc<RefCell<Vec<BridgeCall>>>,
}

impl BenchBridge {
    pub fn calls(&self) -> Vec<BridgeCall> {
        self.calls.borrow().clone()
    }

    pub fn pulses(&self) -> Vec<Direction> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                BridgeCall::Drive(direction, _) => Some(*direction),
                BridgeCall::Idle => None,
            })
            .collect()
    }

    pub fn energized(&self) -> bool {
        matches!(self.calls.borrow().last(), Some(BridgeCall::Drive(..)))
    }
}

impl ActuatorHardware for BenchBridge {
    fn drive(&mut self, direction: Direction, duty: u8) {
        self.calls.borrow_mut().push(BridgeCall::Drive(direction, duty));
    }

    fn idle(&mut self) {
        self.calls.borrow_mut().push(BridgeCall::Idle);
    }
}

#[derive(Clone)]
pub struct BenchRail {
    millivolts: Rc<RefCell<u32>>,
}

impl BenchRail {
    pub fn new(millivolts: u32) -> Self {
        Self {
            millivolts: Rc::new(RefCell::new(millivolts)),
        }
    }

    pub fn set(&self, millivolts: u32) {
        *self.millivolts.borrow_mut() = millivolts;
    }
}

impl VoltageSource for BenchRail {
    fn sample_millivolts(&mut self) -> u32 {
        *self.millivolts.borrow()
    }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

pub type BenchController = ModeController<BenchBridge, BenchRail, NoDelay>;

pub const OPEN_MS: u64 = 5_000;
pub const CLOSE_MS: u64 = 5_000;

pub fn bench_config() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.valve.time_to_open_ms = OPEN_MS;
    config.valve.time_to_close_ms = CLOSE_MS;
    config.valve.divider_ratio = 10.0;
    config.valve.target_voltage = 5.0;
    config
}

pub fn bench(config: &ControllerConfig) -> (BenchController, BenchBridge, BenchRail) {
    let bridge = BenchBridge::default();
    let rail = BenchRail::new(1_200);
    let controller = ModeController::new(
        config,
        &PersistedSettings { setpoint_f: 70 },
        bridge.clone(),
        rail.clone(),
        NoDelay,
        0,
    );
    (controller, bridge, rail)
}

/// Noon-ish reading inside the default 06:00-23:00 window.
pub fn midday(monotonic_ms: u64) -> ClockReading {
    ClockReading::new(monotonic_ms, NaiveTime::from_hms_opt(12, 0, 0))
}

pub fn at(monotonic_ms: u64, hour: u32, minute: u32) -> ClockReading {
    ClockReading::new(monotonic_ms, NaiveTime::from_hms_opt(hour, minute, 0))
}
