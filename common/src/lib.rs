pub mod config;
pub mod guard;
pub mod relay;
pub mod schedule;
pub mod topics;
pub mod types;
pub mod validate;

pub use config::{
    ComfortMode, ComfortProfile, ControlSettings, RuntimeConfig, SettingsPreset, Staging,
};
pub use guard::{DissipationKind, GuardId, ProtectionGuards};
pub use relay::RelayEngine;
pub use schedule::{DayOfWeek, Schedule, ScheduleEntry};
pub use topics::*;
pub use types::{
    ControlState, ControllerStatePayload, ControllerStatus, FanMode, OperatingMode, OutputState,
    RelayCommand, Terminal,
};
pub use validate::{SettingsError, ThresholdKey};
