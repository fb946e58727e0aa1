//! SimpleSerial 1.x: ASCII-hex frames terminated by `'\n'`, acked with `z<HH>\n`.

use crate::error::{ProtocolError, Result};
use crate::frame::{CommandFrame, MAX_PAYLOAD, TERMINATOR, hex_byte, read_len, to_hex};
use crate::transport::{Link, Transport};

use super::{COMMAND_TABLE_CMD, COMMAND_TABLE_RESP, CommandInfo, Exchange, logged};

pub const ACK_MARKER: u8 = b'z';
pub const ACK_LEN: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsciiHex {
    /// Insert a two-digit payload length after the command character.
    pub variable_len: bool,
}

impl AsciiHex {
    pub fn write<T: Transport>(
        &self,
        link: &mut Link<T>,
        frame: &CommandFrame,
        opts: &Exchange,
    ) -> Result<()> {
        let wire = frame.encode_ascii(self.variable_len)?;
        let shown = String::from_utf8_lossy(&wire).into_owned();
        link.send(&wire, shown, opts.flush)
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
            .recv(response_len(len), opts.timeout)
            .map_err(|e| logged("ss_read", e))?;
        let payload = decode_response(cmd, len, &raw).map_err(|e| logged("ss_read", e))?;
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
        let raw = link
            .recv_until(TERMINATOR, response_len(MAX_PAYLOAD), opts.timeout)
            .map_err(|e| logged("ss_commands", e))?;
        let payload = decode_table(&raw).map_err(|e| logged("ss_commands", e))?;
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
        let raw = match link.recv(ACK_LEN, opts.timeout) {
            Ok(raw) => raw,
            Err(ProtocolError::NoData) => {
                return Err(logged("ss_ack", ProtocolError::NoAck { raw: Vec::new() }));
            }
            Err(ProtocolError::ShortRead { raw, .. }) => {
                return Err(logged("ss_ack", ProtocolError::NoAck { raw }));
            }
            Err(e) => return Err(logged("ss_ack", e)),
        };
        parse_ack(&raw).map_err(|e| logged("ss_ack", e))
    }
}

/// Bytes in a response carrying `len` payload bytes: command, hex digits, terminator.
pub fn response_len(len: usize) -> usize {
    2 * len + 2
}

pub fn parse_ack(raw: &[u8]) -> Result<(), ProtocolError> {
    let invalid = || ProtocolError::InvalidAck { raw: raw.to_vec() };
    if raw.len() < ACK_LEN || raw[0] != ACK_MARKER || raw.last() != Some(&TERMINATOR) {
        return Err(invalid());
    }
    let code = hex_byte(&raw[1..3]).ok_or_else(invalid)?;
    if code != 0 {
        return Err(ProtocolError::TargetError { code });
    }
    Ok(())
}

/// Validates a full response frame and returns its decoded payload.
pub fn decode_response(cmd: u8, len: usize, raw: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if raw.len() != response_len(len) || raw.last() != Some(&TERMINATOR) {
        return Err(ProtocolError::MalformedFrame { raw: raw.to_vec() });
    }
    if raw[0] != cmd {
        return Err(ProtocolError::CommandMismatch {
            expected: cmd,
            received: raw[0],
            raw: raw.to_vec(),
        });
    }
    decode_body(raw, &raw[1..1 + 2 * len])
}

/// Like [`decode_response`] for the command table, whose length is not known up front.
pub fn decode_table(raw: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if raw.len() < 2 || raw.last() != Some(&TERMINATOR) || raw.len() % 2 != 0 {
        return Err(ProtocolError::MalformedFrame { raw: raw.to_vec() });
    }
    if raw[0] != COMMAND_TABLE_RESP {
        return Err(ProtocolError::CommandMismatch {
            expected: COMMAND_TABLE_RESP,
            received: raw[0],
            raw: raw.to_vec(),
        });
    }
    decode_body(raw, &raw[1..raw.len() - 1])
}

fn decode_body(raw: &[u8], body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    body.chunks(2)
        .map(hex_byte)
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| ProtocolError::InvalidHex { raw: raw.to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mock::ScriptedTransport;
    use pretty_assertions::assert_eq;

    fn link(t: ScriptedTransport) -> Link<ScriptedTransport> {
        Link::new(t, 10)
    }

    #[test]
    fn ack_parsing() {
        assert!(parse_ack(b"z00\n").is_ok());
        assert!(matches!(
            parse_ack(b"z01\n"),
            Err(ProtocolError::TargetError { code: 0x01 })
        ));
        assert!(matches!(
            parse_ack(b"y00\n"),
            Err(ProtocolError::InvalidAck { .. })
        ));
        assert!(matches!(
            parse_ack(b"z0\n"),
            Err(ProtocolError::InvalidAck { .. })
        ));
        assert!(matches!(
            parse_ack(b"zG0\n"),
            Err(ProtocolError::InvalidAck { .. })
        ));
        assert!(matches!(
            parse_ack(b"z000"),
            Err(ProtocolError::InvalidAck { .. })
        ));
    }

    #[test]
    fn wait_ack_over_the_wire() {
        let ss = AsciiHex::default();
        let opts = Exchange::default();

        let mut l = link(ScriptedTransport::with_inbound(b"z00\n"));
        assert!(ss.wait_ack(&mut l, &opts).is_ok());

        let mut l = link(ScriptedTransport::with_inbound(b"z01\n"));
        assert!(matches!(
            ss.wait_ack(&mut l, &opts),
            Err(ProtocolError::TargetError { code: 1 })
        ));

        let mut l = link(ScriptedTransport::with_inbound(b"z0\n"));
        assert!(matches!(
            ss.wait_ack(&mut l, &opts),
            Err(ProtocolError::NoAck { .. })
        ));

        let mut l = link(ScriptedTransport::default());
        assert!(matches!(
            ss.wait_ack(&mut l, &opts),
            Err(ProtocolError::NoAck { raw }) if raw.is_empty()
        ));
    }

    #[test]
    fn write_key_with_ack() {
        let mut t = ScriptedTransport::default();
        t.reply(b"z00\n");
        let mut l = link(t);
        let frame = CommandFrame::from_hex("k", 16, "2AEF4FBF1020489FFD01F8369D353698").unwrap();

        AsciiHex::default()
            .write(&mut l, &frame, &Exchange::default())
            .unwrap();

        assert_eq!(
            l.transport().written(),
            &[b"k2AEF4FBF1020489FFD01F8369D353698\n".to_vec()]
        );
        assert_eq!(
            l.tx_history().newest(),
            Some("k2AEF4FBF1020489FFD01F8369D353698\n")
        );
    }

    #[test]
    fn write_fails_when_target_reports_error() {
        let mut t = ScriptedTransport::default();
        t.reply(b"z10\n");
        let mut l = link(t);
        let frame = CommandFrame::new("p", 0, &[]).unwrap();
        let err = AsciiHex::default()
            .write(&mut l, &frame, &Exchange::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::TargetError { code: 0x10 })
        ));
    }

    #[test]
    fn write_without_ack_does_not_read() {
        let mut t = ScriptedTransport::default();
        t.reply(b"z00\n");
        let mut l = link(t);
        let frame = CommandFrame::new("p", 1, &[0xAB]).unwrap();
        AsciiHex::default()
            .write(&mut l, &frame, &Exchange::default().with_ack(false))
            .unwrap();
        assert_eq!(l.transport().inbound_len(), 4);
    }

    #[test]
    fn write_reports_transport_failure() {
        let mut t = ScriptedTransport::default();
        t.fail_writes = true;
        let mut l = link(t);
        let frame = CommandFrame::new("p", 0, &[]).unwrap();
        let err = AsciiHex::default()
            .write(&mut l, &frame, &Exchange::default())
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::Transport(_))));
        assert!(l.tx_history().is_empty());
    }

    #[test]
    fn stale_bytes_are_flushed_before_write() {
        let mut t = ScriptedTransport::with_inbound(b"junk");
        t.reply(b"z00\n");
        let mut l = link(t);
        let frame = CommandFrame::new("p", 0, &[]).unwrap();
        AsciiHex::default()
            .write(&mut l, &frame, &Exchange::default())
            .unwrap();
    }

    #[test]
    fn no_flush_keeps_stale_bytes() {
        let mut t = ScriptedTransport::with_inbound(b"junk");
        t.reply(b"z00\n");
        let mut l = link(t);
        let frame = CommandFrame::new("p", 0, &[]).unwrap();
        let err = AsciiHex::default()
            .write(&mut l, &frame, &Exchange::default().with_flush(false))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::InvalidAck { .. })));
    }

    #[test]
    fn read_response_then_ack() {
        let mut l = link(ScriptedTransport::with_inbound(b"r00112233445566778899AABBCCDDEEFF\nz00\n"));
        let payload = AsciiHex::default()
            .read(&mut l, b'r', 16, &Exchange::default())
            .unwrap();
        assert_eq!(
            payload,
            vec![
                0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC,
                0xDD, 0xEE, 0xFF
            ]
        );
        assert_eq!(
            l.rx_history().newest(),
            Some("00112233445566778899AABBCCDDEEFF")
        );
        assert_eq!(l.rx_history().len(), 1);
    }

    #[test]
    fn read_rejects_command_mismatch() {
        let mut l = link(ScriptedTransport::with_inbound(b"p00112233445566778899AABBCCDDEEFF\nz00\n"));
        let err = AsciiHex::default()
            .read(&mut l, b'r', 16, &Exchange::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::CommandMismatch {
                expected: b'r',
                received: b'p',
                ..
            })
        ));
        assert!(l.rx_history().is_empty());
    }

    #[test]
    fn read_rejects_non_hex_payload() {
        let mut l = link(ScriptedTransport::with_inbound(b"rZZ\n"));
        let err = AsciiHex::default()
            .read(&mut l, b'r', 1, &Exchange::default().with_ack(false))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::InvalidHex { .. })));
        assert!(l.rx_history().is_empty());
    }

    #[test]
    fn read_rejects_missing_terminator() {
        let mut l = link(ScriptedTransport::with_inbound(b"r00112233445566778899AABBCCDDEEFF0"));
        let err = AsciiHex::default()
            .read(&mut l, b'r', 16, &Exchange::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::MalformedFrame { ref raw }) if raw.len() == 34
        ));
        assert!(l.rx_history().is_empty());
    }

    #[test]
    fn read_without_data() {
        let mut l = link(ScriptedTransport::default());
        let err = AsciiHex::default()
            .read(&mut l, b'r', 16, &Exchange::default())
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::NoData)));
    }

    #[test]
    fn short_response_is_rejected() {
        let mut l = link(ScriptedTransport::with_inbound(b"r0011\n"));
        let err = AsciiHex::default()
            .read(&mut l, b'r', 16, &Exchange::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ShortRead { expected: 34, .. })
        ));
    }

    #[test]
    fn legible_response_without_ack_is_a_failure() {
        let mut l = link(ScriptedTransport::with_inbound(b"rAB\n"));
        let err = AsciiHex::default()
            .read(&mut l, b'r', 1, &Exchange::default())
            .unwrap_err();
        match err {
            Error::Protocol(ProtocolError::MissingAck { raw, source }) => {
                assert_eq!(raw, b"rAB\n".to_vec());
                assert!(matches!(*source, ProtocolError::NoAck { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(l.rx_history().is_empty());
    }

    #[test]
    fn read_length_is_a_contract() {
        let mut l = link(ScriptedTransport::default());
        let err = AsciiHex::default()
            .read(&mut l, b'r', 0, &Exchange::default())
            .unwrap_err();
        assert!(matches!(err, Error::Contract(_)));
    }

    #[test]
    fn command_table() {
        let mut t = ScriptedTransport::default();
        t.reply(b"r6B1000701000\nz00\n");
        let mut l = link(t);
        let table = AsciiHex::default()
            .commands(&mut l, &Exchange::default())
            .unwrap();
        assert_eq!(l.transport().written(), &[b"w\n".to_vec()]);
        assert_eq!(
            table,
            vec![
                CommandInfo {
                    cmd: b'k',
                    len: 16,
                    flags: 0
                },
                CommandInfo {
                    cmd: b'p',
                    len: 16,
                    flags: 0
                },
            ]
        );
        assert_eq!(l.rx_history().newest(), Some("6B1000701000"));
    }

    #[test]
    fn command_table_must_be_whole_entries() {
        let mut t = ScriptedTransport::default();
        t.reply(b"r6B10\nz00\n");
        let mut l = link(t);
        let err = AsciiHex::default()
            .commands(&mut l, &Exchange::default())
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::MalformedFrame { .. })));
        assert!(l.rx_history().is_empty());
    }

    #[test]
    fn command_table_needs_terminator() {
        let mut t = ScriptedTransport::default();
        t.reply(b"r6B1000");
        let mut l = link(t);
        let err = AsciiHex::default()
            .commands(&mut l, &Exchange::default())
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::MalformedFrame { .. })));
    }
}
