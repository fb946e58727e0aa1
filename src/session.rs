//! A ready-to-use endpoint to one target: protocol engine, frame histories,
//! capture board and the remembered capture settings.

use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use tracing::{info, warn};

use crate::board::{Board, BoardStatus, ChipFamily, Programmer};
use crate::error::{BoardError, ContractError, ProtocolError, Result};
use crate::frame::CommandFrame;
use crate::history::{DEFAULT_HISTORY, History};
use crate::proto::{
    CommandInfo, DEFAULT_TIMEOUT, Exchange, Protocol, ProtocolVersion, REFERENCE_CLOCK_HZ,
};
use crate::settings::ScopeSettings;
use crate::transport::{Link, Pending, Transport};

pub const MIN_POWER_DOWN: Duration = Duration::from_millis(50);
pub const MAX_POWER_DOWN: Duration = Duration::from_secs(10);
pub const MAX_SETTLE: Duration = Duration::from_secs(10);
pub const MIN_CLOCK_HZ: f64 = 3.2e6;
pub const MAX_CLOCK_HZ: f64 = 25e6;
/// Allowed relative deviation from the reference clock when programming.
pub const PROGRAMMING_CLOCK_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStrategy {
    /// Cut the capture board's supply to the target.
    Vcc,
    /// Hold the target's nRST line low; the supply stays on.
    Nrst,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub version: ProtocolVersion,
    pub variable_len: bool,
    pub history_size: usize,
    pub timeout: Duration,
    /// Baud at `reference_clock_hz`; defaults to the protocol's.
    pub reference_baud: Option<u32>,
    pub reference_clock_hz: f64,
    /// Reset used after a clock change or programming.
    pub reset_strategy: ResetStrategy,
    pub power_down: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::V1_1,
            variable_len: false,
            history_size: DEFAULT_HISTORY,
            timeout: DEFAULT_TIMEOUT,
            reference_baud: None,
            reference_clock_hz: REFERENCE_CLOCK_HZ,
            reset_strategy: ResetStrategy::Vcc,
            power_down: Duration::from_millis(100),
        }
    }
}

impl SessionConfig {
    pub fn reference_baud(&self) -> u32 {
        self.reference_baud
            .unwrap_or_else(|| self.version.reference_baud())
    }
}

/// One captured exchange: the target's response and the trace recorded around it.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub response: Vec<u8>,
    pub trace: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub board: BoardStatus,
    pub settings: ScopeSettings,
    pub protocol: ProtocolVersion,
    pub baud: u32,
    pub pending: Pending,
}

pub struct TargetSession<T, B> {
    link: Link<T>,
    protocol: Protocol,
    board: B,
    config: SessionConfig,
    settings: ScopeSettings,
    baud: u32,
}

impl<T: Transport, B: Board> TargetSession<T, B> {
    pub fn new(transport: T, board: B, config: SessionConfig) -> Self {
        let protocol = Protocol::for_version(config.version, config.variable_len);
        let baud = config.reference_baud();
        Self {
            link: Link::new(transport, config.history_size),
            protocol,
            board,
            settings: ScopeSettings::default(),
            baud,
            config,
        }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn version(&self) -> ProtocolVersion {
        self.config.version
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn transport(&self) -> &T {
        self.link.transport()
    }

    pub fn tx_history(&self) -> &History {
        self.link.tx_history()
    }

    pub fn rx_history(&self) -> &History {
        self.link.rx_history()
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    pub fn settings(&self) -> &ScopeSettings {
        &self.settings
    }

    /// Exchange options this session uses unless told otherwise.
    pub fn exchange(&self) -> Exchange {
        Exchange::default()
            .with_ack(self.config.version.acks_by_default())
            .with_timeout(self.config.timeout)
    }

    pub fn write(&mut self, frame: &CommandFrame) -> Result<()> {
        let opts = self.exchange();
        self.write_with(frame, &opts)
    }

    pub fn write_with(&mut self, frame: &CommandFrame, opts: &Exchange) -> Result<()> {
        self.protocol.write(&mut self.link, frame, opts)
    }

    pub fn read(&mut self, cmd: u8, len: usize) -> Result<Vec<u8>> {
        let opts = self.exchange();
        self.read_with(cmd, len, &opts)
    }

    pub fn read_with(&mut self, cmd: u8, len: usize, opts: &Exchange) -> Result<Vec<u8>> {
        self.protocol.read(&mut self.link, cmd, len, opts)
    }

    pub fn wait_ack(&mut self) -> Result<()> {
        let opts = self.exchange();
        Ok(self.protocol.wait_ack(&mut self.link, &opts)?)
    }

    /// Command table reported by the target firmware.
    pub fn commands(&mut self) -> Result<Vec<CommandInfo>> {
        let opts = self.exchange();
        self.protocol.commands(&mut self.link, &opts)
    }

    pub fn set_crc_poly(&mut self, poly: u8) -> Result<()> {
        Ok(self.protocol.set_crc_poly(poly)?)
    }

    pub fn pending(&self) -> Result<Pending> {
        Ok(self.link.pending()?)
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.link.flush()?)
    }

    /// Power-cycles the target and waits `settle` before returning.
    pub fn reset(
        &mut self,
        strategy: ResetStrategy,
        power_down: Duration,
        settle: Duration,
    ) -> Result<()> {
        check_duration("power-down", power_down, MIN_POWER_DOWN, MAX_POWER_DOWN)?;
        check_duration("settle delay", settle, Duration::ZERO, MAX_SETTLE)?;
        info!(?strategy, ?power_down, ?settle, "resetting target");
        match strategy {
            ResetStrategy::Vcc => {
                self.board.set_target_power(false)?;
                sleep(power_down);
                self.board.set_target_power(true)?;
            }
            ResetStrategy::Nrst => {
                self.board.set_nrst_low(true)?;
                sleep(power_down);
                self.board.set_nrst_low(false)?;
            }
        }
        sleep(settle);
        Ok(())
    }

    /// Retunes the target clock and the UART with it. Returns the new baud.
    pub fn set_clock_freq(&mut self, hz: f64, settle: Duration) -> Result<u32> {
        if !(MIN_CLOCK_HZ..=MAX_CLOCK_HZ).contains(&hz) {
            return Err(ContractError::ClockRange(hz).into());
        }
        check_duration("settle delay", settle, Duration::ZERO, MAX_SETTLE)?;

        let adc_src = self.board.adc_source()?;
        self.board.set_clock_freq(hz)?;
        self.board.set_adc_source(adc_src)?;

        let baud = scaled_baud(self.config.reference_baud(), self.config.reference_clock_hz, hz);
        self.link
            .transport_mut()
            .set_baud(baud)
            .map_err(ProtocolError::from)?;
        self.baud = baud;
        info!(hz, baud, "target clock changed");

        self.reset(self.config.reset_strategy, self.config.power_down, settle)?;
        match self.board.adc_freq() {
            Ok(f) => info!("adjusted sampling rate: {:.4} MS/s ({adc_src})", f * 1e-6),
            Err(e) => warn!("could not read back sampling rate: {e}"),
        }
        Ok(baud)
    }

    /// Flashes `image` with `programmer`, optionally resetting the target afterwards.
    pub fn program<P: Programmer>(
        &mut self,
        programmer: &mut P,
        image: &Path,
        family: ChipFamily,
        reset_after: bool,
    ) -> Result<()> {
        if !image.is_file() {
            return Err(ContractError::FirmwareImage(image.display().to_string()).into());
        }
        if !self.board.status()?.connected {
            return Err(BoardError::NotConnected.into());
        }
        if family.needs_reference_clock() {
            let actual = self.board.clock_freq()?;
            let reference = self.config.reference_clock_hz;
            let min = reference * (1.0 - PROGRAMMING_CLOCK_TOLERANCE);
            let max = reference * (1.0 + PROGRAMMING_CLOCK_TOLERANCE);
            if !(min..=max).contains(&actual) {
                return Err(ContractError::ProgrammingClock { actual, min, max }.into());
            }
        }
        info!(%family, image = %image.display(), "programming target");
        programmer.program(family, image)?;
        if reset_after {
            self.reset(ResetStrategy::Vcc, self.config.power_down, Duration::ZERO)?;
        }
        Ok(())
    }

    /// Validates, applies and remembers the fields set in `update`.
    pub fn set_scope_settings(&mut self, update: &ScopeSettings) -> Result<()> {
        update.validate()?;
        self.board.apply(update)?;
        self.settings.merge(update);
        Ok(())
    }

    pub fn status(&self) -> Result<SessionStatus> {
        Ok(SessionStatus {
            board: self.board.status()?,
            settings: self.settings.clone(),
            protocol: self.config.version,
            baud: self.baud,
            pending: self.link.pending()?,
        })
    }

    /// Disconnects the board and forgets the capture settings.
    pub fn disconnect(&mut self) -> Result<()> {
        self.board.disconnect()?;
        self.settings = ScopeSettings::default();
        info!("disconnected");
        Ok(())
    }

    /// Remembered settings are dropped only after the board is back and `preserve_settings` is false.
    pub fn reconnect(&mut self, preserve_settings: bool) -> Result<()> {
        self.board.disconnect()?;
        self.board.connect()?;
        if !preserve_settings {
            self.settings = ScopeSettings::default();
        } else if !self.settings.is_empty() {
            self.board.apply(&self.settings)?;
        }
        info!(preserve_settings, "reconnected");
        Ok(())
    }

    /// One traced exchange: arm, write without ack, read with the session's ack
    /// policy, then collect the trace. The trace is collected even when the
    /// exchange failed, but is only returned when everything succeeded.
    pub fn measure(
        &mut self,
        frame: &CommandFrame,
        read_cmd: u8,
        read_len: usize,
    ) -> Result<Measurement> {
        let opts = self.exchange();
        self.board.arm()?;
        let response = self
            .protocol
            .write(&mut self.link, frame, &opts.with_ack(false))
            .and_then(|()| self.protocol.read(&mut self.link, read_cmd, read_len, &opts));
        let timed_out = self.board.capture();
        let trace = self.board.last_trace();

        let response = response?;
        if timed_out? {
            warn!("timeout happened during capture");
            return Err(BoardError::CaptureTimeout.into());
        }
        Ok(Measurement {
            response,
            trace: trace?,
        })
    }
}

fn check_duration(
    what: &'static str,
    value: Duration,
    min: Duration,
    max: Duration,
) -> Result<(), ContractError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ContractError::DurationRange {
            what,
            value,
            min,
            max,
        })
    }
}

/// Baud that keeps the target's UART divisor unchanged at `hz`.
pub fn scaled_baud(reference_baud: u32, reference_hz: f64, hz: f64) -> u32 {
    (reference_baud as f64 * hz / reference_hz).round() as u32
}
