//! SimpleSerial protocol engine.
//!
//! Three primitives per variant: Encode-Write, Decode-Read and Ack-Wait. None of
//! them retry; every failure is logged and returned to the caller, who decides
//! whether to repeat the whole exchange.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::{ContractError, ProtocolError, Result};
use crate::frame::CommandFrame;
use crate::transport::{Link, Transport};

pub mod ascii;
pub mod binary;
pub mod crc8;

pub use ascii::AsciiHex;
pub use binary::BinaryCrc;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
/// Command asking the target to list the commands it implements.
pub const COMMAND_TABLE_CMD: u8 = b'w';
pub const COMMAND_TABLE_RESP: u8 = b'r';
/// Clock frequency at which the reference baud rates are defined.
pub const REFERENCE_CLOCK_HZ: f64 = 7.37e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1_0,
    V1_1,
    V2_0,
}

impl ProtocolVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolVersion::V1_0 => "1.0",
            ProtocolVersion::V1_1 => "1.1",
            ProtocolVersion::V2_0 => "2.0",
        }
    }

    /// Baud rate at [`REFERENCE_CLOCK_HZ`].
    pub fn reference_baud(self) -> u32 {
        match self {
            ProtocolVersion::V1_0 | ProtocolVersion::V1_1 => 38_400,
            ProtocolVersion::V2_0 => 230_400,
        }
    }

    /// 1.0 targets never ack writes.
    pub fn acks_by_default(self) -> bool {
        !matches!(self, ProtocolVersion::V1_0)
    }
}

impl FromStr for ProtocolVersion {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1.0" => Ok(ProtocolVersion::V1_0),
            "1.1" => Ok(ProtocolVersion::V1_1),
            "2.0" => Ok(ProtocolVersion::V2_0),
            other => Err(ContractError::ProtocolVersion(other.to_string())),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call knobs for one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    /// Wait for the target's ack after the frame.
    pub ack: bool,
    pub timeout: Duration,
    /// Discard stale inbound bytes before writing.
    pub flush: bool,
}

impl Default for Exchange {
    fn default() -> Self {
        Self {
            ack: true,
            timeout: DEFAULT_TIMEOUT,
            flush: true,
        }
    }
}

impl Exchange {
    pub fn with_ack(mut self, ack: bool) -> Self {
        self.ack = ack;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_flush(mut self, flush: bool) -> Self {
        self.flush = flush;
        self
    }
}

/// One entry of the target's command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    pub cmd: u8,
    /// Payload length the command expects.
    pub len: u8,
    pub flags: u8,
}

impl CommandInfo {
    /// Splits a command-table payload into `(cmd, len, flags)` triples.
    pub fn parse_table(payload: &[u8], raw: &[u8]) -> Result<Vec<Self>, ProtocolError> {
        if payload.len() % 3 != 0 {
            return Err(ProtocolError::MalformedFrame { raw: raw.to_vec() });
        }
        Ok(payload
            .chunks_exact(3)
            .map(|c| CommandInfo {
                cmd: c[0],
                len: c[1],
                flags: c[2],
            })
            .collect())
    }
}

impl fmt::Display for CommandInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cmd.is_ascii_alphabetic() {
            write!(f, "cmd: {}", self.cmd as char)?;
        } else {
            write!(f, "cmd: 0x{:02x}", self.cmd)?;
        }
        write!(f, ", len: {:>3}, flags: {}", self.len, self.flags)
    }
}

/// The negotiated protocol variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ascii(AsciiHex),
    Binary(BinaryCrc),
}

impl Protocol {
    pub fn for_version(version: ProtocolVersion, variable_len: bool) -> Self {
        match version {
            ProtocolVersion::V1_0 | ProtocolVersion::V1_1 => {
                Protocol::Ascii(AsciiHex { variable_len })
            }
            ProtocolVersion::V2_0 => Protocol::Binary(BinaryCrc::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Ascii(_) => "ascii-hex",
            Protocol::Binary(_) => "binary-crc",
        }
    }

    pub fn set_crc_poly(&mut self, poly: u8) -> Result<(), ContractError> {
        match self {
            Protocol::Binary(ss) => ss.set_poly(poly),
            Protocol::Ascii(_) => Err(ContractError::Unsupported("crc polynomial", self.name())),
        }
    }

    pub fn write<T: Transport>(
        &self,
        link: &mut Link<T>,
        frame: &CommandFrame,
        opts: &Exchange,
    ) -> Result<()> {
        match self {
            Protocol::Ascii(ss) => ss.write(link, frame, opts),
            Protocol::Binary(ss) => ss.write(link, frame, opts),
        }
    }

    pub fn read<T: Transport>(
        &self,
        link: &mut Link<T>,
        cmd: u8,
        len: usize,
        opts: &Exchange,
    ) -> Result<Vec<u8>> {
        match self {
            Protocol::Ascii(ss) => ss.read(link, cmd, len, opts),
            Protocol::Binary(ss) => ss.read(link, cmd, len, opts),
        }
    }

    pub fn commands<T: Transport>(
        &self,
        link: &mut Link<T>,
        opts: &Exchange,
    ) -> Result<Vec<CommandInfo>> {
        match self {
            Protocol::Ascii(ss) => ss.commands(link, opts),
            Protocol::Binary(ss) => ss.commands(link, opts),
        }
    }

    pub fn wait_ack<T: Transport>(
        &self,
        link: &mut Link<T>,
        opts: &Exchange,
    ) -> Result<(), ProtocolError> {
        match self {
            Protocol::Ascii(ss) => ss.wait_ack(link, opts),
            Protocol::Binary(ss) => ss.wait_ack(link, opts),
        }
    }
}

pub(crate) fn logged(op: &'static str, err: ProtocolError) -> ProtocolError {
    warn!(op, kind = err.kind(), "{err}");
    err
}
