use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMode {
    Off,
    Thermostat,
    #[serde(rename = "ON", alias = "MANUAL_ON")]
    ManualOn,
}

impl ControlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Thermostat => "THERMOSTAT",
            Self::ManualOn => "ON",
        }
    }
}

impl FromStr for ControlMode {
    type Err = CommandError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OFF" => Ok(Self::Off),
            "THERMOSTAT" => Ok(Self::Thermostat),
            "ON" | "MANUAL_ON" => Ok(Self::ManualOn),
            _ => Err(CommandError::InvalidMode(value.to_string())),
        }
    }
}

/// What the outside world is told the burner is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValveVisualState {
    Off,
    Idle,
    Heating,
}

impl ValveVisualState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Idle => "IDLE",
            Self::Heating => "HEATING",
        }
    }
}

/// A mode command as received from a collaborator, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeRequest {
    Mode(ControlMode),
    Invalid(String),
}

impl From<ControlMode> for ModeRequest {
    fn from(mode: ControlMode) -> Self {
        Self::Mode(mode)
    }
}

impl From<&str> for ModeRequest {
    fn from(value: &str) -> Self {
        match value.parse::<ControlMode>() {
            Ok(mode) => Self::Mode(mode),
            Err(_) => Self::Invalid(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlState {
    pub mode: ControlMode,
    #[serde(rename = "setpointF")]
    pub setpoint_f: i32,
    #[serde(rename = "roomTempF")]
    pub room_temp_f: f32,
    #[serde(rename = "valveState")]
    pub valve_state: ValveVisualState,
}

impl ControlState {
    pub fn new(setpoint_f: i32) -> Self {
        Self {
            mode: ControlMode::Off,
            setpoint_f,
            room_temp_f: f32::NAN,
            valve_state: ValveVisualState::Off,
        }
    }

    pub fn has_temperature(&self) -> bool {
        self.room_temp_f.is_finite()
    }

    /// Equality that treats two missing readings as the same reading.
    pub fn same_as(&self, other: &Self) -> bool {
        let same_temp = (self.room_temp_f.is_nan() && other.room_temp_f.is_nan())
            || self.room_temp_f == other.room_temp_f;
        same_temp
            && self.mode == other.mode
            && self.setpoint_f == other.setpoint_f
            && self.valve_state == other.valve_state
    }
}

/// Human-readable status surfaced to the UI and MQTT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    Ready,
    SensorFailure,
    InvalidMode,
    OutsideSchedule,
    RuntimeLimit,
}

impl StatusMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::SensorFailure => "Sensor failure: Thermostat mode disabled",
            Self::InvalidMode => "Error: Invalid mode",
            Self::OutsideSchedule => "Outside allowed hours: valve held closed",
            Self::RuntimeLimit => "Runtime limit reached: valve held closed",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::SensorFailure | Self::InvalidMode)
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SafetySnapshot {
    #[serde(rename = "cumulativeOpenMs")]
    pub cumulative_open_ms: u64,
    #[serde(rename = "remainingBudgetMs")]
    pub remaining_budget_ms: u64,
    #[serde(rename = "limitActive")]
    pub limit_active: bool,
    #[serde(rename = "inWindow")]
    pub in_window: bool,
    #[serde(rename = "inhibitedMs")]
    pub inhibited_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub mode: &'static str,
    #[serde(rename = "setpointF")]
    pub setpoint_f: i32,
    #[serde(rename = "roomTempF")]
    pub room_temp_f: Option<f32>,
    #[serde(rename = "valveState")]
    pub valve_state: &'static str,
    #[serde(rename = "valveOpen")]
    pub valve_open: bool,
    #[serde(rename = "valveBusy")]
    pub valve_busy: bool,
    pub status: &'static str,
    pub safety: SafetySnapshot,
    #[serde(rename = "timeSynced")]
    pub time_synced: bool,
    pub timezone: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_strings_case_insensitively() {
        assert_eq!("off".parse::<ControlMode>().unwrap(), ControlMode::Off);
        assert_eq!(
            " Thermostat ".parse::<ControlMode>().unwrap(),
            ControlMode::Thermostat
        );
        assert_eq!("ON".parse::<ControlMode>().unwrap(), ControlMode::ManualOn);
        assert_eq!(
            "manual_on".parse::<ControlMode>().unwrap(),
            ControlMode::ManualOn
        );
        assert!(matches!(
            "heat".parse::<ControlMode>(),
            Err(CommandError::InvalidMode(_))
        ));
    }

    #[test]
    fn unknown_mode_string_becomes_invalid_request() {
        assert_eq!(
            ModeRequest::from("AUTO"),
            ModeRequest::Invalid("AUTO".to_string())
        );
        assert_eq!(
            ModeRequest::from("thermostat"),
            ModeRequest::Mode(ControlMode::Thermostat)
        );
    }

    #[test]
    fn serde_and_broadcast_spellings_agree() {
        for mode in [ControlMode::Off, ControlMode::Thermostat, ControlMode::ManualOn] {
            let json = serde_json::to_value(mode).unwrap();
            assert_eq!(json, mode.as_str());
        }
        let legacy: ControlMode = serde_json::from_str("\"MANUAL_ON\"").unwrap();
        assert_eq!(legacy, ControlMode::ManualOn);
    }

    #[test]
    fn control_state_serializes_visible_strings() {
        let state = ControlState {
            mode: ControlMode::ManualOn,
            setpoint_f: 70,
            room_temp_f: 68.5,
            valve_state: ValveVisualState::Heating,
        };
        let json = serde_json::to_value(state).unwrap();

        assert_eq!(json["mode"], ControlMode::ManualOn.as_str());
        assert_eq!(json["valveState"], "HEATING");
        assert_eq!(json["setpointF"], 70);
    }
}
