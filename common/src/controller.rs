use embedded_hal::delay::DelayNs;
use tracing::{debug, info, warn};

use crate::{
    config::{ControllerConfig, PersistedSettings},
    duty::SupplySampler,
    error::CommandError,
    hysteresis::HysteresisEngine,
    ports::{ActuatorHardware, ClockReading, VoltageSource},
    safety::{SafetySupervisor, SafetyVerdict, Veto},
    types::{
        ControlMode, ControlState, ControllerStatus, ModeRequest, StatusMessage, ValveVisualState,
    },
    valve::{RequestOutcome, ValveActuator},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    StateChanged(ControlState),
    Status(StatusMessage),
    ValveSettled { open: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub mode: Option<ModeRequest>,
    pub setpoint_f: Option<i32>,
}

impl Command {
    pub fn mode(mode: impl Into<ModeRequest>) -> Self {
        Self {
            mode: Some(mode.into()),
            setpoint_f: None,
        }
    }

    pub fn setpoint(setpoint_f: i32) -> Self {
        Self {
            mode: None,
            setpoint_f: Some(setpoint_f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub changed: bool,
    pub rejected: Option<CommandError>,
    pub events: Vec<ControlEvent>,
}

impl From<Veto> for StatusMessage {
    fn from(veto: Veto) -> Self {
        match veto {
            Veto::OutsideSchedule => Self::OutsideSchedule,
            Veto::RuntimeLimit => Self::RuntimeLimit,
        }
    }
}

/// Top-level OFF / THERMOSTAT / MANUAL_ON state machine.
///
/// Owns the other four components and is the only writer of [`ControlState`].
/// Each [`on_tick`](Self::on_tick) runs one control cycle in a fixed order:
/// pulse bookkeeping, sensor sample, hysteresis, safety authorization,
/// actuator request, safety housekeeping. Open time is charged from the
/// moment an opening pulse starts until a closing pulse starts.
pub struct ModeController<H, V, D> {
    state: ControlState,
    hysteresis: HysteresisEngine,
    safety: SafetySupervisor,
    valve: ValveActuator<H, V, D>,
    status: StatusMessage,
}

impl<H, V, D> ModeController<H, V, D>
where
    H: ActuatorHardware,
    V: VoltageSource,
    D: DelayNs,
{
    pub fn new(
        config: &ControllerConfig,
        settings: &PersistedSettings,
        hardware: H,
        supply: V,
        delay: D,
        now_ms: u64,
    ) -> Self {
        let sampler = SupplySampler::new(supply, delay, &config.valve);
        Self {
            state: ControlState::new(settings.setpoint_f),
            hysteresis: HysteresisEngine::new(config.hysteresis_f),
            safety: SafetySupervisor::new(config.safety.clone()),
            valve: ValveActuator::new(hardware, sampler, &config.valve, now_ms),
            status: StatusMessage::Ready,
        }
    }

    pub fn control_state(&self) -> ControlState {
        self.state
    }

    pub fn status(&self) -> &StatusMessage {
        &self.status
    }

    pub fn safety(&self) -> &SafetySupervisor {
        &self.safety
    }

    pub fn valve(&self) -> &ValveActuator<H, V, D> {
        &self.valve
    }

    pub fn valve_mut(&mut self) -> &mut ValveActuator<H, V, D> {
        &mut self.valve
    }

    pub fn heat_call(&self) -> bool {
        self.hysteresis.heat_call()
    }

    pub fn apply_command(&mut self, command: Command) -> CommandOutcome {
        let before = self.state;
        let mut events = Vec::new();
        let mut rejected = None;

        if let Some(setpoint_f) = command.setpoint_f {
            if setpoint_f != self.state.setpoint_f {
                info!(setpoint_f, "setpoint updated");
                self.state.setpoint_f = setpoint_f;
            }
        }

        match command.mode {
            None => {}
            Some(ModeRequest::Mode(ControlMode::Thermostat)) if !self.state.has_temperature() => {
                warn!("thermostat mode rejected: no valid temperature");
                self.state.mode = ControlMode::Off;
                self.surface(StatusMessage::SensorFailure, &mut events);
                rejected = Some(CommandError::SensorUnavailable);
            }
            Some(ModeRequest::Mode(mode)) => {
                if mode != self.state.mode {
                    info!(mode = mode.as_str(), "mode changed");
                    self.state.mode = mode;
                }
                self.surface(StatusMessage::Ready, &mut events);
            }
            Some(ModeRequest::Invalid(value)) => {
                warn!(%value, "invalid mode command; failing safe to OFF");
                self.state.mode = ControlMode::Off;
                self.surface(StatusMessage::InvalidMode, &mut events);
                rejected = Some(CommandError::InvalidMode(value));
            }
        }

        let changed = !self.state.same_as(&before);
        if changed {
            events.push(ControlEvent::StateChanged(self.state));
        }

        CommandOutcome {
            changed,
            rejected,
            events,
        }
    }

    /// Run one control cycle. `temperature_f` is NaN when no reading is available.
    pub fn on_tick(&mut self, now: ClockReading, temperature_f: f32) -> Vec<ControlEvent> {
        let before = self.state;
        let now_ms = now.monotonic_ms;
        let mut events = Vec::new();

        if let Some(open) = self.valve.poll(now_ms) {
            events.push(ControlEvent::ValveSettled { open });
        }

        self.state.room_temp_f = if temperature_f.is_finite() {
            temperature_f
        } else {
            f32::NAN
        };

        let desired_open = match self.state.mode {
            ControlMode::Off => false,
            ControlMode::Thermostat if !self.state.has_temperature() => {
                warn!("temperature unavailable; thermostat mode disabled");
                self.state.mode = ControlMode::Off;
                self.surface(StatusMessage::SensorFailure, &mut events);
                false
            }
            ControlMode::Thermostat => self
                .hysteresis
                .evaluate(self.state.room_temp_f, self.state.setpoint_f as f32),
            ControlMode::ManualOn => true,
        };

        let granted = self.safety.authorize(desired_open, now);
        if desired_open {
            match (granted, self.safety.last_veto()) {
                (true, _) => self.surface(StatusMessage::Ready, &mut events),
                (false, Some(veto)) => self.surface(veto.into(), &mut events),
                (false, None) => {}
            }
        }
        self.request_valve(desired_open && granted, now_ms);

        if let SafetyVerdict::ForceClose(veto) = self.safety.tick(now, self.valve.target_open()) {
            self.request_valve(false, now_ms);
            self.surface(veto.into(), &mut events);
        }

        self.state.valve_state = self.visible_state();
        if !self.state.same_as(&before) {
            events.push(ControlEvent::StateChanged(self.state));
        }
        events
    }

    pub fn status_report(
        &self,
        now: ClockReading,
        time_synced: bool,
        timezone: &str,
    ) -> ControllerStatus {
        ControllerStatus {
            mode: self.state.mode.as_str(),
            setpoint_f: self.state.setpoint_f,
            room_temp_f: self
                .state
                .has_temperature()
                .then_some(self.state.room_temp_f),
            valve_state: self.state.valve_state.as_str(),
            valve_open: self.valve.is_open(),
            valve_busy: self.valve.is_busy(),
            status: self.status.as_str(),
            safety: self.safety.snapshot(now),
            time_synced,
            timezone: timezone.to_string(),
        }
    }

    /// The ledger follows what the actuator did, not what was asked of it.
    fn request_valve(&mut self, open: bool, now_ms: u64) {
        match self.valve.request(open, now_ms) {
            RequestOutcome::Started if open => self.safety.record_opened(now_ms),
            RequestOutcome::Started => self.safety.record_closed(now_ms),
            RequestOutcome::Busy => debug!(open, "valve busy; request deferred"),
            RequestOutcome::Unchanged | RequestOutcome::Unpowered => {}
        }
    }

    fn visible_state(&self) -> ValveVisualState {
        if self.valve.target_open() {
            ValveVisualState::Heating
        } else if self.state.mode == ControlMode::Thermostat {
            ValveVisualState::Idle
        } else {
            ValveVisualState::Off
        }
    }

    fn surface(&mut self, status: StatusMessage, events: &mut Vec<ControlEvent>) {
        if status == self.status {
            return;
        }
        if status.is_error() {
            warn!(%status, "status");
        } else {
            info!(%status, "status");
        }
        self.status = status.clone();
        events.push(ControlEvent::Status(status));
    }
}
