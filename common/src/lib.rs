pub mod config;
pub mod controller;
pub mod duty;
pub mod error;
pub mod hysteresis;
pub mod ports;
pub mod safety;
pub mod schedule;
pub mod topics;
pub mod types;
pub mod valve;

pub use config::{
    ControllerConfig, NetworkConfig, PersistedSettings, RuntimeConfig, SafetyConfig, ValveConfig,
};
pub use controller::{Command, CommandOutcome, ControlEvent, ModeController};
pub use duty::{compute_duty, SupplySampler};
pub use error::{CommandError, ConfigError};
pub use hysteresis::HysteresisEngine;
pub use ports::{ActuatorHardware, Clock, ClockReading, Direction, TemperatureSource, VoltageSource};
pub use safety::{SafetySupervisor, SafetyVerdict, Veto};
pub use schedule::ScheduleWindow;
pub use topics::*;
pub use types::{
    ControlMode, ControlState, ControllerStatus, ModeRequest, SafetySnapshot, StatusMessage,
    ValveVisualState,
};
pub use valve::{RequestOutcome, ValveActuator, ValvePhase};
