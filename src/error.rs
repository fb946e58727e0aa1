use std::time::Duration;

use thiserror::Error;

use crate::frame::escape;

/// Caller supplied something out of range. These are programming errors, never
/// something a retry would fix.
#[derive(Debug, Error, PartialEq)]
pub enum ContractError {
    #[error("command id must be a single ASCII character, got {0:?}")]
    CommandLength(String),
    #[error("command id {0:#04x} is not printable ASCII")]
    CommandNotPrintable(u8),
    #[error("payload length {0} out of range 0..=64")]
    PayloadLength(usize),
    #[error("read length {0} out of range 1..=64")]
    ReadLength(usize),
    #[error("declared payload length {declared} but payload has {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("invalid hex in payload: {0:?}")]
    PayloadHex(String),
    #[error("CRC polynomial must be 1..=255")]
    CrcPoly,
    #[error("{what} {value:?} out of range {min:?}..={max:?}")]
    DurationRange {
        what: &'static str,
        value: Duration,
        min: Duration,
        max: Duration,
    },
    #[error("clock frequency {0} Hz out of range 3.2 MHz..=25 MHz")]
    ClockRange(f64),
    #[error("{what} {value} out of range")]
    Setting { what: &'static str, value: String },
    #[error("unsupported chip family {0:?} (available: xmega, stm32f, avr)")]
    ChipFamily(String),
    #[error("firmware image {0} does not exist or is not a file")]
    FirmwareImage(String),
    #[error("target clock {actual} Hz outside {min}..={max} Hz required for programming")]
    ProgrammingClock { actual: f64, min: f64, max: f64 },
    #[error("{0} is not supported by protocol {1}")]
    Unsupported(&'static str, &'static str),
    #[error("unknown protocol version {0:?} (available: 1.0, 1.1, 2.0)")]
    ProtocolVersion(String),
}

/// A frame exchange with the target failed. Raw bytes are kept so the caller can
/// log or inspect them without parsing text.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("no data to receive from target")]
    NoData,
    #[error("short read (expected: {expected}, received: {})", .raw.len())]
    ShortRead { expected: usize, raw: Vec<u8> },
    #[error("target did not ack (received: {})", escape(.raw))]
    NoAck { raw: Vec<u8> },
    #[error("invalid ack frame (received: {})", escape(.raw))]
    InvalidAck { raw: Vec<u8> },
    #[error("target reported error 0x{code:02X}")]
    TargetError { code: u8 },
    #[error("malformed response frame (received: {})", escape(.raw))]
    MalformedFrame { raw: Vec<u8> },
    #[error("unexpected response command (expected: {:?}, received: {:?})", *.expected as char, *.received as char)]
    CommandMismatch {
        expected: u8,
        received: u8,
        raw: Vec<u8>,
    },
    #[error("invalid hex in response payload (received: {})", escape(.raw))]
    InvalidHex { raw: Vec<u8> },
    #[error("crc mismatch: expected 0x{expected:02X}, got 0x{actual:02X} (received: {})", escape(.raw))]
    CrcMismatch {
        expected: u8,
        actual: u8,
        raw: Vec<u8>,
    },
    #[error("response {} received but target did not ack", escape(.raw))]
    MissingAck {
        raw: Vec<u8>,
        #[source]
        source: Box<ProtocolError>,
    },
}

impl ProtocolError {
    /// Short stable name, used for tallies.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::Transport(_) => "transport",
            ProtocolError::NoData => "no_data",
            ProtocolError::ShortRead { .. } => "short_read",
            ProtocolError::NoAck { .. } => "no_ack",
            ProtocolError::InvalidAck { .. } => "invalid_ack",
            ProtocolError::TargetError { .. } => "target_error",
            ProtocolError::MalformedFrame { .. } => "malformed",
            ProtocolError::CommandMismatch { .. } => "cmd_mismatch",
            ProtocolError::InvalidHex { .. } => "invalid_hex",
            ProtocolError::CrcMismatch { .. } => "crc",
            ProtocolError::MissingAck { .. } => "missing_ack",
        }
    }
}

/// Failure reported by a collaborator: capture board, GPIO or programmer.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("board i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("board not connected")]
    NotConnected,
    #[error("timeout happened during capture")]
    CaptureTimeout,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Board(#[from] BoardError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
