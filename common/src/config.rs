use serde::{Deserialize, Serialize};

use crate::types::{FanMode, OperatingMode};
use crate::validate::{self, SettingsError, ThresholdKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Staging {
    Auto,
    Manual,
}

impl Staging {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

/// Installer thresholds. Numeric fields are mutated only through `set`,
/// which routes every value through the validator first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    pub auto_heat_cool: bool,
    pub heat_cool_min_delta: f32,
    pub staging: Staging,
    pub compressor_min_cycle_off: u32,
    pub compressor_min_outdoor_temp: f32,
    pub ac_overcool_max: f32,
    pub aux_heat_max_outdoor_temp: f32,
    pub heat_differential: f32,
    pub heat_dissipation_time: u32,
    pub heat_min_on_time: u32,
    pub cool_differential: f32,
    pub cool_dissipation_time: u32,
    pub cool_min_on_time: u32,
    pub temperature_correction: f32,
    pub humidity_correction: f32,
    pub thermal_protect: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            auto_heat_cool: false,
            heat_cool_min_delta: 5.0,
            staging: Staging::Auto,
            compressor_min_cycle_off: 300,
            compressor_min_outdoor_temp: 35.0,
            ac_overcool_max: 2.0,
            aux_heat_max_outdoor_temp: 50.0,
            heat_differential: 0.5,
            heat_dissipation_time: 30,
            heat_min_on_time: 300,
            cool_differential: 0.5,
            cool_dissipation_time: 30,
            cool_min_on_time: 300,
            temperature_correction: 0.0,
            humidity_correction: 0.0,
            thermal_protect: 10.0,
        }
    }
}

impl Thresholds {
    pub fn set(&mut self, key: ThresholdKey, value: f64) -> Result<(), SettingsError> {
        validate::validate(key, value)?;
        match key {
            ThresholdKey::HeatCoolMinDelta => self.heat_cool_min_delta = value as f32,
            ThresholdKey::CompressorMinCycleOff => {
                self.compressor_min_cycle_off = value.round() as u32
            }
            ThresholdKey::CompressorMinOutdoorTemp => {
                self.compressor_min_outdoor_temp = value as f32
            }
            ThresholdKey::AcOvercoolMax => self.ac_overcool_max = value as f32,
            ThresholdKey::AuxHeatMaxOutdoorTemp => self.aux_heat_max_outdoor_temp = value as f32,
            ThresholdKey::HeatDifferential => self.heat_differential = value as f32,
            ThresholdKey::HeatDissipationTime => self.heat_dissipation_time = value.round() as u32,
            ThresholdKey::HeatMinOnTime => self.heat_min_on_time = value.round() as u32,
            ThresholdKey::CoolDifferential => self.cool_differential = value as f32,
            ThresholdKey::CoolDissipationTime => self.cool_dissipation_time = value.round() as u32,
            ThresholdKey::CoolMinOnTime => self.cool_min_on_time = value.round() as u32,
            ThresholdKey::TemperatureCorrection => self.temperature_correction = value as f32,
            ThresholdKey::HumidityCorrection => self.humidity_correction = value as f32,
            ThresholdKey::ThermalProtect => self.thermal_protect = value as f32,
        }
        Ok(())
    }

    pub fn get(&self, key: ThresholdKey) -> f64 {
        match key {
            ThresholdKey::HeatCoolMinDelta => self.heat_cool_min_delta as f64,
            ThresholdKey::CompressorMinCycleOff => self.compressor_min_cycle_off as f64,
            ThresholdKey::CompressorMinOutdoorTemp => self.compressor_min_outdoor_temp as f64,
            ThresholdKey::AcOvercoolMax => self.ac_overcool_max as f64,
            ThresholdKey::AuxHeatMaxOutdoorTemp => self.aux_heat_max_outdoor_temp as f64,
            ThresholdKey::HeatDifferential => self.heat_differential as f64,
            ThresholdKey::HeatDissipationTime => self.heat_dissipation_time as f64,
            ThresholdKey::HeatMinOnTime => self.heat_min_on_time as f64,
            ThresholdKey::CoolDifferential => self.cool_differential as f64,
            ThresholdKey::CoolDissipationTime => self.cool_dissipation_time as f64,
            ThresholdKey::CoolMinOnTime => self.cool_min_on_time as f64,
            ThresholdKey::TemperatureCorrection => self.temperature_correction as f64,
            ThresholdKey::HumidityCorrection => self.humidity_correction as f64,
            ThresholdKey::ThermalProtect => self.thermal_protect as f64,
        }
    }

    pub fn heat_min_on_ms(&self) -> u64 {
        self.heat_min_on_time as u64 * 1_000
    }

    pub fn cool_min_on_ms(&self) -> u64 {
        self.cool_min_on_time as u64 * 1_000
    }

    pub fn compressor_min_cycle_off_ms(&self) -> u64 {
        self.compressor_min_cycle_off as u64 * 1_000
    }

    pub fn heat_dissipation_ms(&self) -> u64 {
        self.heat_dissipation_time as u64 * 1_000
    }

    pub fn cool_dissipation_ms(&self) -> u64 {
        self.cool_dissipation_time as u64 * 1_000
    }

    /// Clamp persisted values back into their legal ranges. Out-of-range data
    /// in the store must not bypass the validator on load.
    pub fn sanitize(&mut self) {
        for key in ThresholdKey::ALL {
            let clamped = validate::clamp(key, self.get(key));
            // set() cannot fail for a clamped value.
            let _ = self.set(key, clamped);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComfortProfile {
    pub heat_set_point: f32,
    pub cool_set_point: f32,
    pub fan_mode: FanMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComfortMode {
    Home,
    Away,
    Sleep,
}

impl ComfortMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Away => "away",
            Self::Sleep => "sleep",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComfortProfiles {
    pub home: ComfortProfile,
    pub away: ComfortProfile,
    pub sleep: ComfortProfile,
}

impl Default for ComfortProfiles {
    fn default() -> Self {
        Self {
            home: ComfortProfile {
                heat_set_point: 70.0,
                cool_set_point: 74.0,
                fan_mode: FanMode::Auto,
            },
            away: ComfortProfile {
                heat_set_point: 62.0,
                cool_set_point: 85.0,
                fan_mode: FanMode::Auto,
            },
            sleep: ComfortProfile {
                heat_set_point: 66.0,
                cool_set_point: 72.0,
                fan_mode: FanMode::Auto,
            },
        }
    }
}

impl ComfortProfiles {
    pub fn get(&self, mode: ComfortMode) -> ComfortProfile {
        match mode {
            ComfortMode::Home => self.home,
            ComfortMode::Away => self.away,
            ComfortMode::Sleep => self.sleep,
        }
    }

    /// Replace one profile; the setpoint pair is validated before assignment.
    pub fn set(&mut self, mode: ComfortMode, profile: ComfortProfile) -> Result<(), SettingsError> {
        validate::validate_setpoint_pair(profile.heat_set_point, profile.cool_set_point)?;
        match mode {
            ComfortMode::Home => self.home = profile,
            ComfortMode::Away => self.away = profile,
            ComfortMode::Sleep => self.sleep = profile,
        }
        Ok(())
    }

    fn set_pair(&mut self, mode: ComfortMode, heat: f32, cool: f32) -> Result<(), SettingsError> {
        let mut profile = self.get(mode);
        profile.heat_set_point = heat;
        profile.cool_set_point = cool;
        self.set(mode, profile)
    }

    pub fn sanitize(&mut self) {
        for mode in [ComfortMode::Home, ComfortMode::Away, ComfortMode::Sleep] {
            let mut profile = self.get(mode);
            profile.heat_set_point = profile.heat_set_point.clamp(50.0, 90.0);
            profile.cool_set_point = profile.cool_set_point.clamp(50.0, 90.0);
            if profile.heat_set_point >= profile.cool_set_point {
                let defaults = ComfortProfiles::default().get(mode);
                profile.heat_set_point = defaults.heat_set_point;
                profile.cool_set_point = defaults.cool_set_point;
            }
            match mode {
                ComfortMode::Home => self.home = profile,
                ComfortMode::Away => self.away = profile,
                ComfortMode::Sleep => self.sleep = profile,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettingsPreset {
    Default,
    EnergySaver,
    Comfort,
    Aggressive,
}

impl SettingsPreset {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::Default),
            "energy-saver" => Some(Self::EnergySaver),
            "comfort" => Some(Self::Comfort),
            "aggressive" => Some(Self::Aggressive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub mode: OperatingMode,
    pub setpoint_f: f32,
    pub thresholds: Thresholds,
    pub comfort: ComfortProfiles,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Off,
            setpoint_f: 70.0,
            thresholds: Thresholds::default(),
            comfort: ComfortProfiles::default(),
        }
    }
}

impl ControlSettings {
    pub fn sanitize(&mut self) {
        self.setpoint_f = self.setpoint_f.clamp(50.0, 90.0);
        self.thresholds.sanitize();
        self.comfort.sanitize();
    }

    /// Installer presets from the settings panel. Every value still passes
    /// through the validated setters.
    pub fn apply_preset(&mut self, preset: SettingsPreset) -> Result<(), SettingsError> {
        use ThresholdKey::*;

        match preset {
            SettingsPreset::Default => {
                self.thresholds = Thresholds::default();
                self.comfort = ComfortProfiles::default();
            }
            SettingsPreset::EnergySaver => {
                self.apply_bundle(
                    &[
                        (HeatDifferential, 1.5),
                        (CoolDifferential, 1.5),
                        (CompressorMinCycleOff, 600.0),
                        (HeatMinOnTime, 600.0),
                        (CoolMinOnTime, 600.0),
                    ],
                    [(68.0, 78.0), (60.0, 85.0), (64.0, 75.0)],
                )?;
            }
            SettingsPreset::Comfort => {
                self.apply_bundle(
                    &[
                        (HeatDifferential, 0.5),
                        (CoolDifferential, 0.5),
                        (CompressorMinCycleOff, 300.0),
                        (HeatMinOnTime, 300.0),
                        (CoolMinOnTime, 300.0),
                    ],
                    [(72.0, 74.0), (65.0, 80.0), (68.0, 72.0)],
                )?;
            }
            SettingsPreset::Aggressive => {
                self.apply_bundle(
                    &[
                        (HeatDifferential, 0.3),
                        (CoolDifferential, 0.3),
                        (CompressorMinCycleOff, 180.0),
                        (HeatMinOnTime, 180.0),
                        (CoolMinOnTime, 180.0),
                    ],
                    [(70.0, 74.0), (62.0, 85.0), (66.0, 72.0)],
                )?;
            }
        }
        Ok(())
    }

    fn apply_bundle(
        &mut self,
        thresholds: &[(ThresholdKey, f64)],
        // (heat, cool) for home, away, sleep in that order.
        setpoints: [(f32, f32); 3],
    ) -> Result<(), SettingsError> {
        for &(key, value) in thresholds {
            self.thresholds.set(key, value)?;
        }
        let [(home_h, home_c), (away_h, away_c), (sleep_h, sleep_c)] = setpoints;
        self.comfort.set_pair(ComfortMode::Home, home_h, home_c)?;
        self.comfort.set_pair(ComfortMode::Away, away_h, away_c)?;
        self.comfort.set_pair(ComfortMode::Sleep, sleep_h, sleep_c)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlLoopConfig {
    pub tick_interval_ms: u64,
    pub state_publish_interval_ms: u64,
    pub sensor_stale_timeout_ms: u64,
    pub min_valid_temp_f: f32,
    pub max_valid_temp_f: f32,
    pub max_hold_minutes: u16,
    pub schedule_change_threshold_f: f32,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            state_publish_interval_ms: 10_000,
            sensor_stale_timeout_ms: 120_000,
            min_valid_temp_f: -40.0,
            max_valid_temp_f: 150.0,
            max_hold_minutes: 1_440,
            schedule_change_threshold_f: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    pub control: ControlLoopConfig,
    pub settings: ControlSettings,
    pub timezone: String,
    pub network: NetworkConfig,
}

impl RuntimeConfig {
    pub fn sanitized(mut self) -> Self {
        self.settings.sanitize();
        if self.timezone.is_empty() {
            self.timezone = "America/Los_Angeles".to_string();
        }
        self
    }
}
