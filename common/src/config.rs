use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, schedule::ScheduleWindow};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValveConfig {
    pub time_to_open_ms: u64,
    pub time_to_close_ms: u64,
    /// Supply volts per ADC volt at the sense pin.
    pub divider_ratio: f32,
    /// Voltage the actuator motor should see regardless of the supply rail.
    pub target_voltage: f32,
    pub sample_count: usize,
    pub sample_delay_ms: u32,
}

impl Default for ValveConfig {
    fn default() -> Self {
        Self {
            time_to_open_ms: 5_000,
            time_to_close_ms: 5_000,
            divider_ratio: 13.0,
            target_voltage: 5.0,
            sample_count: 10,
            sample_delay_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub max_open_budget_ms: u64,
    pub reset_threshold_ms: u64,
    pub window: ScheduleWindow,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_open_budget_ms: 14_400_000,
            reset_threshold_ms: 21_600_000,
            window: ScheduleWindow::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub hysteresis_f: f32,
    pub control_interval_ms: u64,
    pub sensor_stale_timeout_ms: u64,
    pub state_publish_interval_ms: u64,
    pub valve: ValveConfig,
    pub safety: SafetyConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            hysteresis_f: 0.2,
            control_interval_ms: 250,
            sensor_stale_timeout_ms: 30_000,
            state_publish_interval_ms: 10_000,
            valve: ValveConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.hysteresis_f.is_finite() || self.hysteresis_f <= 0.0 {
            return Err(ConfigError::out_of_range("hysteresis_f", "must be > 0"));
        }
        if self.control_interval_ms == 0 {
            return Err(ConfigError::out_of_range(
                "control_interval_ms",
                "must be > 0",
            ));
        }
        if self.valve.time_to_open_ms == 0 || self.valve.time_to_close_ms == 0 {
            return Err(ConfigError::out_of_range(
                "time_to_open_ms/time_to_close_ms",
                "pulse durations must be > 0",
            ));
        }
        if !self.valve.divider_ratio.is_finite() || self.valve.divider_ratio <= 0.0 {
            return Err(ConfigError::out_of_range("divider_ratio", "must be > 0"));
        }
        if !self.valve.target_voltage.is_finite() || self.valve.target_voltage <= 0.0 {
            return Err(ConfigError::out_of_range("target_voltage", "must be > 0"));
        }
        if self.valve.sample_count == 0 {
            return Err(ConfigError::out_of_range("sample_count", "must be >= 1"));
        }
        if self.safety.max_open_budget_ms == 0 {
            return Err(ConfigError::out_of_range(
                "max_open_budget_ms",
                "must be > 0",
            ));
        }
        if self.safety.reset_threshold_ms == 0 {
            return Err(ConfigError::out_of_range(
                "reset_threshold_ms",
                "must be > 0",
            ));
        }
        self.safety.window.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSettings {
    pub setpoint_f: i32,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self { setpoint_f: 70 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.0.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub settings: PersistedSettings,
    pub timezone: String,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            settings: PersistedSettings::default(),
            timezone: "America/Los_Angeles".to_string(),
            network: NetworkConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ControllerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_pulse_time() {
        let mut config = ControllerConfig::default();
        config.valve.time_to_close_ms = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nan_hysteresis() {
        let config = ControllerConfig {
            hysteresis_f: f32::NAN,
            ..ControllerConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_runtime_file_fills_defaults() {
        let raw = r#"{ "timezone": "America/Denver", "settings": { "setpoint_f": 68 } }"#;
        let runtime: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(runtime.timezone, "America/Denver");
        assert_eq!(runtime.settings.setpoint_f, 68);
        assert_eq!(runtime.controller.valve.sample_count, 10);
        assert_eq!(runtime.network.mqtt_port, 1883);
    }
}
