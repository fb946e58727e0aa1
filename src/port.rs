use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::transport::{Pending, Transport};

/// UART to the target, 8N1.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

pub fn open_port(dev: &str, baud: u32, rtscts: bool) -> serialport::Result<SerialTransport> {
    let port = serialport::new(dev, baud)
        .timeout(Duration::from_millis(100))
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(if rtscts {
            FlowControl::Hardware
        } else {
            FlowControl::None
        })
        .open()?;
    Ok(SerialTransport { port })
}

impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    pub fn baud(&self) -> io::Result<u32> {
        Ok(self.port.baud_rate()?)
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, frame: &[u8]) -> io::Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()
    }

    fn read(&mut self, n: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; n];
        let mut got = 0;
        while got < n {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.port.set_timeout(deadline - now)?;
            match self.port.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(k) => got += k,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(got);
        Ok(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.port.clear(ClearBuffer::Input)?)
    }

    fn pending(&self) -> io::Result<Pending> {
        Ok(Pending {
            rx: self.port.bytes_to_read()? as usize,
            tx: self.port.bytes_to_write()? as usize,
        })
    }

    fn set_baud(&mut self, baud: u32) -> io::Result<()> {
        Ok(self.port.set_baud_rate(baud)?)
    }
}
