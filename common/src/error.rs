use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("thermostat mode requires a valid temperature reading")]
    SensorUnavailable,
    #[error("invalid mode `{0}`; use OFF, THERMOSTAT or ON")]
    InvalidMode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} is out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn out_of_range(field: &'static str, reason: &'static str) -> Self {
        Self::OutOfRange { field, reason }
    }
}
