use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard floor for compressor short-cycle protection. Values below this are a
/// safety rejection even though the nominal panel range starts at 60 s.
pub const COMPRESSOR_CYCLE_OFF_FLOOR_SECS: f64 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThresholdKey {
    HeatCoolMinDelta,
    CompressorMinCycleOff,
    CompressorMinOutdoorTemp,
    AcOvercoolMax,
    AuxHeatMaxOutdoorTemp,
    HeatDifferential,
    HeatDissipationTime,
    HeatMinOnTime,
    CoolDifferential,
    CoolDissipationTime,
    CoolMinOnTime,
    TemperatureCorrection,
    HumidityCorrection,
    ThermalProtect,
}

impl ThresholdKey {
    pub const ALL: [ThresholdKey; 14] = [
        Self::HeatCoolMinDelta,
        Self::CompressorMinCycleOff,
        Self::CompressorMinOutdoorTemp,
        Self::AcOvercoolMax,
        Self::AuxHeatMaxOutdoorTemp,
        Self::HeatDifferential,
        Self::HeatDissipationTime,
        Self::HeatMinOnTime,
        Self::CoolDifferential,
        Self::CoolDissipationTime,
        Self::CoolMinOnTime,
        Self::TemperatureCorrection,
        Self::HumidityCorrection,
        Self::ThermalProtect,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeatCoolMinDelta => "heatCoolMinDelta",
            Self::CompressorMinCycleOff => "compressorMinCycleOff",
            Self::CompressorMinOutdoorTemp => "compressorMinOutdoorTemp",
            Self::AcOvercoolMax => "acOvercoolMax",
            Self::AuxHeatMaxOutdoorTemp => "auxHeatMaxOutdoorTemp",
            Self::HeatDifferential => "heatDifferential",
            Self::HeatDissipationTime => "heatDissipationTime",
            Self::HeatMinOnTime => "heatMinOnTime",
            Self::CoolDifferential => "coolDifferential",
            Self::CoolDissipationTime => "coolDissipationTime",
            Self::CoolMinOnTime => "coolMinOnTime",
            Self::TemperatureCorrection => "temperatureCorrection",
            Self::HumidityCorrection => "humidityCorrection",
            Self::ThermalProtect => "thermalProtect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{key} = {value} is below the {floor} second safety floor")]
    SafetyViolation {
        key: &'static str,
        value: f64,
        floor: f64,
    },
    #[error("heat setpoint {heat} must be below cool setpoint {cool}")]
    InconsistentSetpoints { heat: f32, cool: f32 },
}

impl SettingsError {
    pub fn is_safety(&self) -> bool {
        matches!(self, Self::SafetyViolation { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::OutOfRange { .. } => "validation",
            Self::SafetyViolation { .. } => "safety",
            Self::InconsistentSetpoints { .. } => "inconsistent",
        }
    }
}

/// Nominal panel range per key. The compressor cycle-off key has a stricter
/// effective minimum, see `COMPRESSOR_CYCLE_OFF_FLOOR_SECS`.
pub fn range(key: ThresholdKey) -> (f64, f64) {
    match key {
        ThresholdKey::HeatCoolMinDelta => (1.0, 10.0),
        ThresholdKey::CompressorMinCycleOff => (60.0, 1_800.0),
        ThresholdKey::CompressorMinOutdoorTemp => (-20.0, 60.0),
        ThresholdKey::AcOvercoolMax => (0.0, 5.0),
        ThresholdKey::AuxHeatMaxOutdoorTemp => (20.0, 60.0),
        ThresholdKey::HeatDifferential | ThresholdKey::CoolDifferential => (0.1, 5.0),
        ThresholdKey::HeatDissipationTime | ThresholdKey::CoolDissipationTime => (0.0, 600.0),
        ThresholdKey::HeatMinOnTime | ThresholdKey::CoolMinOnTime => (60.0, 1_800.0),
        ThresholdKey::TemperatureCorrection => (-5.0, 5.0),
        ThresholdKey::HumidityCorrection => (-10.0, 10.0),
        ThresholdKey::ThermalProtect => (1.0, 20.0),
    }
}

fn effective_min(key: ThresholdKey) -> f64 {
    match key {
        ThresholdKey::CompressorMinCycleOff => COMPRESSOR_CYCLE_OFF_FLOOR_SECS,
        _ => range(key).0,
    }
}

/// Clamp a stored value into the legal range for its key, honoring the
/// safety floor. Used when sanitizing persisted settings.
pub fn clamp(key: ThresholdKey, value: f64) -> f64 {
    value.clamp(effective_min(key), range(key).1)
}

pub fn validate(key: ThresholdKey, value: f64) -> Result<(), SettingsError> {
    let (min, max) = range(key);
    if !value.is_finite() {
        return Err(SettingsError::OutOfRange {
            key: key.as_str(),
            value,
            min,
            max,
        });
    }

    // The safety floor outranks the nominal range: anything below it is a
    // safety rejection, even values that are also below the range minimum.
    if key == ThresholdKey::CompressorMinCycleOff && value < COMPRESSOR_CYCLE_OFF_FLOOR_SECS {
        return Err(SettingsError::SafetyViolation {
            key: key.as_str(),
            value,
            floor: COMPRESSOR_CYCLE_OFF_FLOOR_SECS,
        });
    }

    if value < min || value > max {
        return Err(SettingsError::OutOfRange {
            key: key.as_str(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Comfort setpoints are checked as a pair: each leg in 50..=90 and
/// heat strictly below cool.
pub fn validate_setpoint_pair(heat: f32, cool: f32) -> Result<(), SettingsError> {
    for (name, value) in [("heatSetPoint", heat), ("coolSetPoint", cool)] {
        if !value.is_finite() || !(50.0..=90.0).contains(&value) {
            return Err(SettingsError::OutOfRange {
                key: name,
                value: value as f64,
                min: 50.0,
                max: 90.0,
            });
        }
    }
    if heat >= cool {
        return Err(SettingsError::InconsistentSetpoints { heat, cool });
    }
    Ok(())
}
