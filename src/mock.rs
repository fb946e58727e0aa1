//! Test doubles: a scripted target on the far end of the transport, and a
//! capture board / programmer that record what they were asked to do.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::board::{Board, BoardStatus, ChipFamily, Programmer};
use crate::error::BoardError;
use crate::settings::{AdcSource, ScopeSettings};
use crate::transport::{Pending, Transport};

/// Replies are queued per write, so a flush before the write never drops them.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    inbound: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    pub fail_writes: bool,
    pub baud: Option<u32>,
}

impl ScriptedTransport {
    pub fn with_inbound(bytes: &[u8]) -> Self {
        Self {
            inbound: bytes.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Bytes the target sends after the next write.
    pub fn reply(&mut self, bytes: &[u8]) {
        self.replies.push_back(bytes.to_vec());
    }

    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted failure"));
        }
        self.written.push(frame.to_vec());
        if let Some(reply) = self.replies.pop_front() {
            self.inbound.extend(reply);
        }
        Ok(())
    }

    fn read(&mut self, n: usize, _timeout: Duration) -> io::Result<Vec<u8>> {
        let k = n.min(self.inbound.len());
        Ok(self.inbound.drain(..k).collect())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inbound.clear();
        Ok(())
    }

    fn pending(&self) -> io::Result<Pending> {
        Ok(Pending {
            rx: self.inbound.len(),
            tx: 0,
        })
    }

    fn set_baud(&mut self, baud: u32) -> io::Result<()> {
        self.baud = Some(baud);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    Connect,
    Disconnect,
    Arm,
    Capture,
    Trace,
    Power(bool),
    Nrst(bool),
    Clock(f64),
    AdcSource(AdcSource),
    Apply(ScopeSettings),
}

#[derive(Debug)]
pub struct MockBoard {
    pub events: Vec<BoardEvent>,
    pub connected: bool,
    pub clock_hz: f64,
    pub adc_src: AdcSource,
    pub capture_times_out: bool,
    pub fail_connect: bool,
    pub trace: Vec<f64>,
}

impl Default for MockBoard {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            connected: true,
            clock_hz: 7.37e6,
            adc_src: AdcSource::ClkgenX4,
            capture_times_out: false,
            fail_connect: false,
            trace: vec![0.1, -0.2, 0.3],
        }
    }
}

impl MockBoard {
    fn check(&self) -> Result<(), BoardError> {
        if self.connected {
            Ok(())
        } else {
            Err(BoardError::NotConnected)
        }
    }
}

impl Board for MockBoard {
    fn connect(&mut self) -> Result<(), BoardError> {
        if self.fail_connect {
            return Err(BoardError::Other("board did not enumerate".into()));
        }
        self.events.push(BoardEvent::Connect);
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BoardError> {
        self.events.push(BoardEvent::Disconnect);
        self.connected = false;
        Ok(())
    }

    fn arm(&mut self) -> Result<(), BoardError> {
        self.check()?;
        self.events.push(BoardEvent::Arm);
        Ok(())
    }

    fn capture(&mut self) -> Result<bool, BoardError> {
        self.check()?;
        self.events.push(BoardEvent::Capture);
        Ok(self.capture_times_out)
    }

    fn last_trace(&mut self) -> Result<Vec<f64>, BoardError> {
        self.check()?;
        self.events.push(BoardEvent::Trace);
        Ok(self.trace.clone())
    }

    fn set_target_power(&mut self, on: bool) -> Result<(), BoardError> {
        self.check()?;
        self.events.push(BoardEvent::Power(on));
        Ok(())
    }

    fn set_nrst_low(&mut self, low: bool) -> Result<(), BoardError> {
        self.check()?;
        self.events.push(BoardEvent::Nrst(low));
        Ok(())
    }

    fn clock_freq(&self) -> Result<f64, BoardError> {
        self.check()?;
        Ok(self.clock_hz)
    }

    fn set_clock_freq(&mut self, hz: f64) -> Result<(), BoardError> {
        self.check()?;
        self.events.push(BoardEvent::Clock(hz));
        self.clock_hz = hz;
        Ok(())
    }

    fn adc_source(&self) -> Result<AdcSource, BoardError> {
        self.check()?;
        Ok(self.adc_src)
    }

    fn set_adc_source(&mut self, src: AdcSource) -> Result<(), BoardError> {
        self.check()?;
        self.events.push(BoardEvent::AdcSource(src));
        self.adc_src = src;
        Ok(())
    }

    fn adc_freq(&self) -> Result<f64, BoardError> {
        self.check()?;
        Ok(match self.adc_src {
            AdcSource::ClkgenX1 => self.clock_hz,
            AdcSource::ClkgenX4 => self.clock_hz * 4.0,
        })
    }

    fn apply(&mut self, settings: &ScopeSettings) -> Result<(), BoardError> {
        self.check()?;
        self.events.push(BoardEvent::Apply(settings.clone()));
        if let Some(src) = settings.adc_src {
            self.adc_src = src;
        }
        Ok(())
    }

    fn status(&self) -> Result<BoardStatus, BoardError> {
        Ok(BoardStatus {
            connected: self.connected,
            name: "mock".into(),
            last_trigger_count: Some(42),
        })
    }
}

#[derive(Debug, Default)]
pub struct MockProgrammer {
    pub flashed: Vec<(ChipFamily, PathBuf)>,
}

impl Programmer for MockProgrammer {
    fn program(&mut self, family: ChipFamily, image: &Path) -> Result<(), BoardError> {
        self.flashed.push((family, image.to_path_buf()));
        Ok(())
    }
}
