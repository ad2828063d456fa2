//! Timed-pulse valve actuator.
//!
//! The valve has no position feedback: it is opened or closed by driving the
//! H-bridge in one direction for a fixed travel time, then de-energizing.
//! A pulse is a phase with a deadline that [`ValveActuator::poll`] retires;
//! nothing here sleeps.

use embedded_hal::delay::DelayNs;
use tracing::{info, warn};

use crate::{
    config::ValveConfig,
    duty::SupplySampler,
    ports::{ActuatorHardware, Direction, VoltageSource},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValvePhase {
    Idle,
    Opening { deadline_ms: u64 },
    Closing { deadline_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Logical state already matches.
    Unchanged,
    Started,
    /// A pulse is in flight; the request was dropped.
    Busy,
    /// Supply measured as dead; no pulse was started.
    Unpowered,
}

pub struct ValveActuator<H, V, D> {
    hardware: H,
    sampler: SupplySampler<V, D>,
    time_to_open_ms: u64,
    time_to_close_ms: u64,
    is_open: bool,
    phase: ValvePhase,
}

impl<H, V, D> ValveActuator<H, V, D>
where
    H: ActuatorHardware,
    V: VoltageSource,
    D: DelayNs,
{
    /// Takes ownership of the bridge and immediately starts a closing pulse.
    pub fn new(hardware: H, sampler: SupplySampler<V, D>, config: &ValveConfig, now_ms: u64) -> Self {
        let mut valve = Self {
            hardware,
            sampler,
            time_to_open_ms: config.time_to_open_ms,
            time_to_close_ms: config.time_to_close_ms,
            is_open: false,
            phase: ValvePhase::Idle,
        };

        valve.hardware.idle();
        info!("forcing valve closed for safe startup");
        let duty = valve.sampler.measure_duty();
        valve.begin_pulse(Direction::Close, duty, now_ms);
        valve
    }

    pub fn request(&mut self, open: bool, now_ms: u64) -> RequestOutcome {
        if self.is_busy() {
            return RequestOutcome::Busy;
        }
        if open == self.is_open {
            return RequestOutcome::Unchanged;
        }

        let duty = self.sampler.measure_duty();
        if duty == 0 {
            warn!(open, "supply rail reads dead; valve pulse not started");
            self.hardware.idle();
            return RequestOutcome::Unpowered;
        }

        let direction = if open {
            Direction::Open
        } else {
            Direction::Close
        };
        self.begin_pulse(direction, duty, now_ms);
        RequestOutcome::Started
    }

    /// Retire the in-flight pulse once its deadline has passed. Returns the
    /// new logical state when a pulse completes.
    pub fn poll(&mut self, now_ms: u64) -> Option<bool> {
        let (open, deadline_ms) = match self.phase {
            ValvePhase::Idle => return None,
            ValvePhase::Opening { deadline_ms } => (true, deadline_ms),
            ValvePhase::Closing { deadline_ms } => (false, deadline_ms),
        };
        if now_ms < deadline_ms {
            return None;
        }

        self.hardware.idle();
        self.is_open = open;
        self.phase = ValvePhase::Idle;
        info!("valve {}", if open { "OPEN" } else { "CLOSED" });
        Some(open)
    }

    /// Logical state after the last completed pulse.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_busy(&self) -> bool {
        self.phase != ValvePhase::Idle
    }

    pub fn phase(&self) -> ValvePhase {
        self.phase
    }

    /// Where the valve is headed: the in-flight direction, or the settled state.
    pub fn target_open(&self) -> bool {
        match self.phase {
            ValvePhase::Idle => self.is_open,
            ValvePhase::Opening { .. } => true,
            ValvePhase::Closing { .. } => false,
        }
    }

    pub fn pulse_deadline_ms(&self) -> Option<u64> {
        match self.phase {
            ValvePhase::Idle => None,
            ValvePhase::Opening { deadline_ms } | ValvePhase::Closing { deadline_ms } => {
                Some(deadline_ms)
            }
        }
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    fn begin_pulse(&mut self, direction: Direction, duty: u8, now_ms: u64) {
        let (duration_ms, phase) = match direction {
            Direction::Open => {
                let deadline_ms = now_ms.saturating_add(self.time_to_open_ms);
                (self.time_to_open_ms, ValvePhase::Opening { deadline_ms })
            }
            Direction::Close => {
                let deadline_ms = now_ms.saturating_add(self.time_to_close_ms);
                (self.time_to_close_ms, ValvePhase::Closing { deadline_ms })
            }
        };

        info!(?direction, duty, duration_ms, "valve pulse started");
        self.hardware.drive(direction, duty);
        self.phase = phase;
    }
}
