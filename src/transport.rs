use std::io;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::frame::escape;
use crate::history::History;

/// Bytes waiting in each direction of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pending {
    pub rx: usize,
    pub tx: usize,
}

/// Dumb byte pipe to the target. No retries happen here.
pub trait Transport {
    fn write(&mut self, frame: &[u8]) -> io::Result<()>;
    /// Reads up to `n` bytes, giving up after `timeout`. An empty result means
    /// nothing arrived; a short result means a partial frame.
    fn read(&mut self, n: usize, timeout: Duration) -> io::Result<Vec<u8>>;
    /// Discards unread inbound bytes.
    fn flush(&mut self) -> io::Result<()>;
    fn pending(&self) -> io::Result<Pending>;
    fn set_baud(&mut self, baud: u32) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).write(frame)
    }
    fn read(&mut self, n: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        (**self).read(n, timeout)
    }
    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
    fn pending(&self) -> io::Result<Pending> {
        (**self).pending()
    }
    fn set_baud(&mut self, baud: u32) -> io::Result<()> {
        (**self).set_baud(baud)
    }
}

/// A transport plus the frame histories of the session that owns it.
#[derive(Debug)]
pub struct Link<T> {
    transport: T,
    tx_history: History,
    rx_history: History,
}

impl<T: Transport> Link<T> {
    pub fn new(transport: T, history_size: usize) -> Self {
        Self {
            transport,
            tx_history: History::new(history_size),
            rx_history: History::new(history_size),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn tx_history(&self) -> &History {
        &self.tx_history
    }

    pub fn rx_history(&self) -> &History {
        &self.rx_history
    }

    /// Discards inbound bytes, warning when any were waiting: stale bytes mean
    /// the previous exchange left the framing out of step.
    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        match self.transport.pending() {
            Ok(p) if p.rx > 0 => warn!(stale = p.rx, "discarding stale bytes before write"),
            Ok(_) => {}
            Err(e) => debug!("pending() failed before flush: {e}"),
        }
        self.transport.flush()?;
        Ok(())
    }

    /// Writes one frame, recording `shown` in the transmit history on success.
    pub fn send(&mut self, frame: &[u8], shown: String, flush: bool) -> Result<(), ProtocolError> {
        if flush {
            self.flush()?;
        }
        if let Err(e) = self.transport.write(frame) {
            warn!("write failed: {e}");
            return Err(e.into());
        }
        debug!(frame = %escape(frame), "tx");
        self.tx_history.push(shown);
        Ok(())
    }

    /// Reads exactly `n` bytes or fails with `NoData`/`ShortRead`.
    pub fn recv(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, ProtocolError> {
        let raw = self.transport.read(n, timeout)?;
        if raw.is_empty() {
            return Err(ProtocolError::NoData);
        }
        debug!(frame = %escape(&raw), "rx");
        if raw.len() < n {
            return Err(ProtocolError::ShortRead { expected: n, raw });
        }
        Ok(raw)
    }

    /// Reads until `end` arrives, `max` bytes have been read, or the target
    /// goes quiet. The result may lack `end`; callers validate the frame.
    pub fn recv_until(
        &mut self,
        end: u8,
        max: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut raw = Vec::new();
        while raw.len() < max {
            let byte = self.transport.read(1, timeout)?;
            let Some(&b) = byte.first() else { break };
            raw.push(b);
            if b == end {
                break;
            }
        }
        if raw.is_empty() {
            return Err(ProtocolError::NoData);
        }
        debug!(frame = %escape(&raw), "rx");
        Ok(raw)
    }

    pub(crate) fn record_rx(&mut self, shown: String) {
        self.rx_history.push(shown);
    }

    pub fn pending(&self) -> Result<Pending, ProtocolError> {
        Ok(self.transport.pending()?)
    }
}
