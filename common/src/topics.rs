pub const TOPIC_SENSOR_TEMP: &str = "gaslog/sensor/temperature";

pub const TOPIC_STATE_MODE: &str = "gaslog/mode";
pub const TOPIC_STATE_VALVE: &str = "gaslog/valve_state";
pub const TOPIC_STATE_VISIBLE: &str = "gaslog/visible_state";
pub const TOPIC_STATE_TEMPERATURE: &str = "gaslog/temperature";
pub const TOPIC_STATE_SETPOINT: &str = "gaslog/setpoint";
pub const TOPIC_STATUS: &str = "gaslog/status";

pub const TOPIC_CMD_MODE: &str = "gaslog/set_mode";
pub const TOPIC_CMD_SETPOINT: &str = "gaslog/set_setpoint";
