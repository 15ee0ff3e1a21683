use crate::types::Terminal;

pub const TOPIC_SENSOR_TEMP: &str = "prostat/sensor/temperature";
pub const TOPIC_SENSOR_HUMIDITY: &str = "prostat/sensor/humidity";
pub const TOPIC_SENSOR_STATUS: &str = "prostat/sensor/status";

pub const TOPIC_CONTROLLER_STATE: &str = "prostat/controller/state";
pub const TOPIC_CONTROLLER_SCHEDULE_STATE: &str = "prostat/controller/schedule/state";

pub const TOPIC_RELAY_HEAT: &str = "prostat/relay/W";
pub const TOPIC_RELAY_COOL: &str = "prostat/relay/Y";
pub const TOPIC_RELAY_FAN: &str = "prostat/relay/G";

pub const TOPIC_CMD_SETPOINT: &str = "prostat/cmnd/setpoint";
pub const TOPIC_CMD_MODE: &str = "prostat/cmnd/mode";
pub const TOPIC_CMD_HOLD: &str = "prostat/cmnd/hold";
pub const TOPIC_CMD_SCHEDULE: &str = "prostat/cmnd/schedule";

pub fn relay_topic(terminal: Terminal) -> &'static str {
    match terminal {
        Terminal::W => TOPIC_RELAY_HEAT,
        Terminal::Y => TOPIC_RELAY_COOL,
        Terminal::G => TOPIC_RELAY_FAN,
    }
}
