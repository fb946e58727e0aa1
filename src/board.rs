//! Interfaces to the hardware around the target: the capture board (arming,
//! waveforms, clock generator, power and reset GPIO) and the flash programmer.
//! Implementations wrap a vendor SDK; the session only drives them.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{BoardError, ContractError};
use crate::settings::{AdcSource, ScopeSettings};

#[derive(Debug, Clone, PartialEq)]
pub struct BoardStatus {
    pub connected: bool,
    pub name: String,
    /// Samples between arm and trigger of the last capture, when the board reports it.
    pub last_trigger_count: Option<u64>,
}

pub trait Board {
    fn connect(&mut self) -> Result<(), BoardError>;
    fn disconnect(&mut self) -> Result<(), BoardError>;

    fn arm(&mut self) -> Result<(), BoardError>;
    /// Blocks until the capture completes. `true` means it timed out.
    fn capture(&mut self) -> Result<bool, BoardError>;
    fn last_trace(&mut self) -> Result<Vec<f64>, BoardError>;

    /// Target supply rail.
    fn set_target_power(&mut self, on: bool) -> Result<(), BoardError>;
    /// `true` drives nRST low, `false` releases it.
    fn set_nrst_low(&mut self, low: bool) -> Result<(), BoardError>;

    fn clock_freq(&self) -> Result<f64, BoardError>;
    fn set_clock_freq(&mut self, hz: f64) -> Result<(), BoardError>;
    fn adc_source(&self) -> Result<AdcSource, BoardError>;
    fn set_adc_source(&mut self, src: AdcSource) -> Result<(), BoardError>;
    /// Resulting ADC sample rate in samples per second.
    fn adc_freq(&self) -> Result<f64, BoardError>;

    fn apply(&mut self, settings: &ScopeSettings) -> Result<(), BoardError>;
    fn status(&self) -> Result<BoardStatus, BoardError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipFamily {
    Xmega,
    Stm32f,
    Avr,
}

impl ChipFamily {
    /// Whether the programmer needs the target clock near its reference value.
    pub fn needs_reference_clock(self) -> bool {
        matches!(self, ChipFamily::Xmega | ChipFamily::Stm32f)
    }
}

impl FromStr for ChipFamily {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xmega" => Ok(ChipFamily::Xmega),
            "stm32f" => Ok(ChipFamily::Stm32f),
            "avr" => Ok(ChipFamily::Avr),
            _ => Err(ContractError::ChipFamily(s.to_string())),
        }
    }
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChipFamily::Xmega => "xmega",
            ChipFamily::Stm32f => "stm32f",
            ChipFamily::Avr => "avr",
        })
    }
}

pub trait Programmer {
    fn program(&mut self, family: ChipFamily, image: &Path) -> Result<(), BoardError>;
}
