//! SimpleSerial 2.0 style binary frames.
//!
//! Every frame, in both directions, is `cmd, scmd, len, payload[len], crc` where
//! `crc` is CRC-8 over everything before it. The target acks with an `'e'` frame
//! carrying a single status byte.

use crate::error::{ContractError, ProtocolError, Result};
use crate::frame::{CommandFrame, read_len, to_hex};
use crate::transport::{Link, Transport};

use super::crc8::{DEFAULT_POLY, crc8};
use super::{COMMAND_TABLE_CMD, COMMAND_TABLE_RESP, CommandInfo, Exchange, logged};

pub const ACK_CMD: u8 = b'e';
/// Header (cmd, scmd, len) plus CRC trailer.
pub const OVERHEAD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryCrc {
    poly: u8,
}

impl Default for BinaryCrc {
    fn default() -> Self {
        Self { poly: DEFAULT_POLY }
    }
}

impl BinaryCrc {
    pub fn new(poly: u8) -> Result<Self, ContractError> {
        let mut ss = Self::default();
        ss.set_poly(poly)?;
        Ok(ss)
    }

    pub fn poly(&self) -> u8 {
        self.poly
    }

    pub fn set_poly(&mut self, poly: u8) -> Result<(), ContractError> {
        if poly == 0 {
            return Err(ContractError::CrcPoly);
        }
        self.poly = poly;
        Ok(())
    }

    pub fn encode(&self, frame: &CommandFrame) -> Vec<u8> {
        self.encode_parts(frame.cmd(), frame.scmd(), frame.payload())
    }

    fn encode_parts(&self, cmd: u8, scmd: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + OVERHEAD);
        out.push(cmd);
        out.push(scmd);
        out.push(payload.len() as u8);
        out.extend_from_slice(payload);
        out.push(crc8(self.poly, &out));
        out
    }

    /// Checks integrity, command and length of a received frame; returns its payload.
    pub fn decode(&self, cmd: u8, len: usize, raw: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if raw.len() != len + OVERHEAD {
            return Err(ProtocolError::MalformedFrame { raw: raw.to_vec() });
        }
        let (body, trailer) = raw.split_at(raw.len() - 1);
        let expected = crc8(self.poly, body);
        if trailer[0] != expected {
            return Err(ProtocolError::CrcMismatch {
                expected,
                actual: trailer[0],
                raw: raw.to_vec(),
            });
        }
        if raw[0] != cmd {
            return Err(ProtocolError::CommandMismatch {
                expected: cmd,
                received: raw[0],
                raw: raw.to_vec(),
            });
        }
        if raw[2] as usize != len {
            return Err(ProtocolError::MalformedFrame { raw: raw.to_vec() });
        }
        Ok(body[3..].to_vec())
    }

    pub fn write<T: Transport>(
        &self,
        link: &mut Link<T>,
        frame: &CommandFrame,
        opts: &Exchange,
    ) -> Result<()> {
        let wire = self.encode(frame);
        link.send(&wire, to_hex(&wire), opts.flush)
            .map_err(|e| logged("ss_write", e))?;
        if opts.ack {
            self.wait_ack(link, opts)?;
        }
        Ok(())
    }

    pub fn read<T: Transport>(
        &self,
        link: &mut Link<T>,
        cmd: u8,
        len: usize,
        opts: &Exchange,
    ) -> Result<Vec<u8>> {
        let len = read_len(len)?;
        let raw = link
            .recv(len + OVERHEAD, opts.timeout)
            .map_err(|e| logged("ss_read", e))?;
        let payload = self
            .decode(cmd, len, &raw)
            .map_err(|e| logged("ss_read", e))?;
        self.finish_read(link, raw, payload, opts)
    }

    /// Asks the target for the commands it implements.
    pub fn commands<T: Transport>(
        &self,
        link: &mut Link<T>,
        opts: &Exchange,
    ) -> Result<Vec<CommandInfo>> {
        let query = CommandFrame::from_byte(COMMAND_TABLE_CMD, 0, &[])?;
        self.write(link, &query, &opts.with_ack(false))?;
        let raw = recv_frame(link, opts).map_err(|e| logged("ss_commands", e))?;
        let payload = self
            .decode(COMMAND_TABLE_RESP, raw[2] as usize, &raw)
            .map_err(|e| logged("ss_commands", e))?;
        let table = CommandInfo::parse_table(&payload, &raw).map_err(|e| logged("ss_commands", e))?;
        self.finish_read(link, raw, payload, opts)?;
        Ok(table)
    }

    fn finish_read<T: Transport>(
        &self,
        link: &mut Link<T>,
        raw: Vec<u8>,
        payload: Vec<u8>,
        opts: &Exchange,
    ) -> Result<Vec<u8>> {
        if opts.ack
            && let Err(e) = self.wait_ack(link, opts)
        {
            return Err(logged(
                "ss_read",
                ProtocolError::MissingAck {
                    raw,
                    source: Box::new(e),
                },
            )
            .into());
        }
        link.record_rx(to_hex(&payload));
        Ok(payload)
    }

    pub fn wait_ack<T: Transport>(
        &self,
        link: &mut Link<T>,
        opts: &Exchange,
    ) -> Result<(), ProtocolError> {
        let raw = match link.recv(1 + OVERHEAD, opts.timeout) {
            Ok(raw) => raw,
            Err(ProtocolError::NoData) => {
                return Err(logged("ss_ack", ProtocolError::NoAck { raw: Vec::new() }));
            }
            Err(ProtocolError::ShortRead { raw, .. }) => {
                return Err(logged("ss_ack", ProtocolError::NoAck { raw }));
            }
            Err(e) => return Err(logged("ss_ack", e)),
        };
        self.parse_ack(&raw).map_err(|e| logged("ss_ack", e))
    }

    pub fn parse_ack(&self, raw: &[u8]) -> Result<(), ProtocolError> {
        let status = match self.decode(ACK_CMD, 1, raw) {
            Ok(payload) => payload[0],
            Err(_) => return Err(ProtocolError::InvalidAck { raw: raw.to_vec() }),
        };
        if status != 0 {
            return Err(ProtocolError::TargetError { code: status });
        }
        Ok(())
    }

    /// Ack frame as the target would send it.
    pub fn ack_frame(&self, status: u8) -> Vec<u8> {
        self.encode_parts(ACK_CMD, 0, &[status])
    }

    /// Response frame as the target would send it.
    pub fn response_frame(&self, cmd: u8, payload: &[u8]) -> Vec<u8> {
        self.encode_parts(cmd, 0, payload)
    }
}

/// Reads a frame whose length comes from its own header.
fn recv_frame<T: Transport>(link: &mut Link<T>, opts: &Exchange) -> Result<Vec<u8>, ProtocolError> {
    let mut raw = link.recv(3, opts.timeout)?;
    let expected = raw[2] as usize + OVERHEAD;
    match link.recv(expected - 3, opts.timeout) {
        Ok(rest) => raw.extend(rest),
        Err(ProtocolError::NoData) => return Err(ProtocolError::ShortRead { expected, raw }),
        Err(ProtocolError::ShortRead { raw: rest, .. }) => {
            raw.extend(rest);
            return Err(ProtocolError::ShortRead { expected, raw });
        }
        Err(e) => return Err(e),
    }
    Ok(raw)
}
