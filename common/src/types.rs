use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperatingMode {
    Off,
    Heat,
    Cool,
    Auto,
}

impl OperatingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
            Self::Auto => "AUTO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlState {
    Idle,
    Heating,
    Cooling,
    DissipatingAfterHeat,
    DissipatingAfterCool,
}

impl ControlState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Heating => "HEATING",
            Self::Cooling => "COOLING",
            Self::DissipatingAfterHeat => "DISSIPATING_AFTER_HEAT",
            Self::DissipatingAfterCool => "DISSIPATING_AFTER_COOL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    Auto,
    On,
}

impl FanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::On => "on",
        }
    }
}

/// Physical contactor terminals: W energizes heat, Y the compressor, G the fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminal {
    W,
    Y,
    G,
}

impl Terminal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::W => "W",
            Self::Y => "Y",
            Self::G => "G",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputState {
    pub heat: bool,
    pub cool: bool,
    pub fan: bool,
}

impl OutputState {
    pub const OFF: OutputState = OutputState {
        heat: false,
        cool: false,
        fan: false,
    };

    pub fn any_call(self) -> bool {
        self.heat || self.cool
    }

    /// Per-terminal edges relative to a previous state, in W, Y, G order.
    pub fn changes_from(self, previous: OutputState) -> Vec<RelayCommand> {
        let mut commands = Vec::new();
        if self.heat != previous.heat {
            commands.push(RelayCommand {
                terminal: Terminal::W,
                energized: self.heat,
            });
        }
        if self.cool != previous.cool {
            commands.push(RelayCommand {
                terminal: Terminal::Y,
                energized: self.cool,
            });
        }
        if self.fan != previous.fan {
            commands.push(RelayCommand {
                terminal: Terminal::G,
                energized: self.fan,
            });
        }
        commands
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayCommand {
    pub terminal: Terminal,
    pub energized: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    #[serde(rename = "currentTemp")]
    pub current_temp: f32,
    #[serde(rename = "rawTemp")]
    pub raw_temp: f32,
    #[serde(rename = "targetTemp")]
    pub target_temp: f32,
    pub mode: &'static str,
    pub state: &'static str,
    pub heat: bool,
    pub cool: bool,
    pub fan: bool,
    #[serde(rename = "fanMode")]
    pub fan_mode: &'static str,
    #[serde(rename = "activeComfort")]
    pub active_comfort: &'static str,
    #[serde(rename = "sensorValid")]
    pub sensor_valid: bool,
    #[serde(rename = "holdActive")]
    pub hold_active: bool,
    #[serde(rename = "holdIndefinite")]
    pub hold_indefinite: bool,
    #[serde(rename = "holdRemainingMin")]
    pub hold_remaining_min: u64,
    #[serde(rename = "guardsActive")]
    pub guards_active: Vec<&'static str>,
    #[serde(rename = "compressorRestRemainingSecs")]
    pub compressor_rest_remaining_secs: u64,
    #[serde(rename = "dissipationRemainingSeconds")]
    pub dissipation_remaining_seconds: Option<f32>,
    #[serde(rename = "scheduleEnabled")]
    pub schedule_enabled: bool,
    #[serde(rename = "nextScheduleEventEpoch")]
    pub next_schedule_event_epoch: Option<i64>,
    #[serde(rename = "timeSynced")]
    pub time_synced: bool,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatePayload {
    pub temp: f32,
    pub target: f32,
    pub mode: &'static str,
    pub state: &'static str,
    pub heat: bool,
    pub cool: bool,
    pub fan: bool,
    #[serde(rename = "holdActive")]
    pub hold_active: bool,
}
