use std::fmt::Write;

use crate::error::ContractError;

/// Largest payload either protocol variant carries in one frame.
pub const MAX_PAYLOAD: usize = 64;
/// Terminator of every ASCII-hex frame.
pub const TERMINATOR: u8 = b'\n';

/// An outbound command, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    cmd: u8,
    scmd: u8,
    payload: Vec<u8>,
}

impl CommandFrame {
    /// `cmd` must be a single character; `payload_len` must match the payload exactly.
    pub fn new(cmd: &str, payload_len: usize, payload: &[u8]) -> Result<Self, ContractError> {
        let cmd = command_byte(cmd)?;
        Self::from_byte(cmd, payload_len, payload)
    }

    /// Same as [`CommandFrame::new`] with the payload given as an ASCII-hex string.
    pub fn from_hex(cmd: &str, payload_len: usize, payload_hex: &str) -> Result<Self, ContractError> {
        let payload = decode_hex(payload_hex.trim())
            .ok_or_else(|| ContractError::PayloadHex(payload_hex.to_string()))?;
        Self::new(cmd, payload_len, &payload)
    }

    /// Raw command byte, for binary targets whose command space is not printable.
    pub fn from_byte(cmd: u8, payload_len: usize, payload: &[u8]) -> Result<Self, ContractError> {
        if payload_len > MAX_PAYLOAD {
            return Err(ContractError::PayloadLength(payload_len));
        }
        if payload.len() != payload_len {
            return Err(ContractError::LengthMismatch {
                declared: payload_len,
                actual: payload.len(),
            });
        }
        Ok(Self {
            cmd,
            scmd: 0,
            payload: payload.to_vec(),
        })
    }

    /// Sub-command byte, only carried by binary frames.
    pub fn with_scmd(mut self, scmd: u8) -> Self {
        self.scmd = scmd;
        self
    }

    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    pub fn scmd(&self) -> u8 {
        self.scmd
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// ASCII-hex wire form: `cmd [LL] HEX.. '\n'`.
    pub fn encode_ascii(&self, variable_len: bool) -> Result<Vec<u8>, ContractError> {
        if !is_printable(self.cmd) {
            return Err(ContractError::CommandNotPrintable(self.cmd));
        }
        let mut s = String::with_capacity(2 * self.payload.len() + 4);
        s.push(self.cmd as char);
        if variable_len {
            let _ = write!(s, "{:02X}", self.payload.len());
        }
        s.push_str(&to_hex(&self.payload));
        s.push(TERMINATOR as char);
        Ok(s.into_bytes())
    }
}

/// Single-character command id as its wire byte.
pub fn command_byte(cmd: &str) -> Result<u8, ContractError> {
    let mut chars = cmd.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c as u8),
        _ => Err(ContractError::CommandLength(cmd.to_string())),
    }
}

fn is_printable(b: u8) -> bool {
    b.is_ascii_graphic()
}

/// Checked read length for a response payload.
pub fn read_len(len: usize) -> Result<usize, ContractError> {
    if (1..=MAX_PAYLOAD).contains(&len) {
        Ok(len)
    } else {
        Err(ContractError::ReadLength(len))
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02X}", b);
    }
    s
}

/// One byte from two hex digits. Signs and whitespace are rejected.
pub fn hex_byte(pair: &[u8]) -> Option<u8> {
    match pair {
        [hi, lo] => {
            let hi = (*hi as char).to_digit(16)?;
            let lo = (*lo as char).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        }
        _ => None,
    }
}

pub fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    bytes.chunks(2).map(hex_byte).collect()
}

/// Printable rendering of raw wire bytes, newline shown as `\n`.
pub fn escape(raw: &[u8]) -> String {
    raw.iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}
