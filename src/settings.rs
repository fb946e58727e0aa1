use std::fmt;
use std::str::FromStr;

use crate::error::ContractError;

/// Largest capture length the board's sample buffer holds.
pub const MAX_SAMPLES: u32 = 24_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    RisingEdge,
    FallingEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcSource {
    ClkgenX1,
    ClkgenX4,
}

impl FromStr for TriggerMode {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rising_edge" => Ok(TriggerMode::RisingEdge),
            "falling_edge" => Ok(TriggerMode::FallingEdge),
            _ => Err(ContractError::Setting {
                what: "trigger mode",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerMode::RisingEdge => "rising_edge",
            TriggerMode::FallingEdge => "falling_edge",
        })
    }
}

impl FromStr for AdcSource {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clkgen_x1" => Ok(AdcSource::ClkgenX1),
            "clkgen_x4" => Ok(AdcSource::ClkgenX4),
            _ => Err(ContractError::Setting {
                what: "adc source",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for AdcSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdcSource::ClkgenX1 => "clkgen_x1",
            AdcSource::ClkgenX4 => "clkgen_x4",
        })
    }
}

/// Capture settings. `None` leaves the board's current value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeSettings {
    pub samples: Option<u32>,
    pub trigger_mode: Option<TriggerMode>,
    pub offset: Option<u32>,
    pub pre_samples: Option<u32>,
    pub adc_src: Option<AdcSource>,
}

impl ScopeSettings {
    pub fn validate(&self) -> Result<(), ContractError> {
        if let Some(n) = self.samples
            && n > MAX_SAMPLES
        {
            return Err(ContractError::Setting {
                what: "samples",
                value: n.to_string(),
            });
        }
        Ok(())
    }

    /// Overlays the fields set in `other`.
    pub fn merge(&mut self, other: &ScopeSettings) {
        if other.samples.is_some() {
            self.samples = other.samples;
        }
        if other.trigger_mode.is_some() {
            self.trigger_mode = other.trigger_mode;
        }
        if other.offset.is_some() {
            self.offset = other.offset;
        }
        if other.pre_samples.is_some() {
            self.pre_samples = other.pre_samples;
        }
        if other.adc_src.is_some() {
            self.adc_src = other.adc_src;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ScopeSettings::default()
    }
}
