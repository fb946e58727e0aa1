use anyhow::{Context, anyhow};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::time::Duration;

use simpleserial_host::port::{SerialTransport, open_port};
use simpleserial_host::transport::Link;
use simpleserial_host::{Exchange, Protocol, ProtocolVersion};

#[derive(Parser, Debug, Clone)]
#[command(name = "simpleserial", about = "SimpleSerial host: write commands, read responses")]
pub struct Cli {
    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Send one command frame and wait for its ack
    Write(WriteOpts),
    /// Read one response frame
    Read(ReadOpts),
    /// Repeated write/read exchanges with a tally of failures
    Query(QueryOpts),
    /// List the commands the target firmware implements
    Commands(CommandsOpts),
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path
    #[arg(long, default_value = "/dev/ttyUSB0")]
    pub dev: String,
    /// Baud rate (default: 38400 for 1.x, 230400 for 2.0)
    #[arg(long)]
    pub baud: Option<u32>,
    /// Enable RTS/CTS
    #[arg(long, default_value_t = false)]
    pub rtscts: bool,
    /// Protocol version: 1.0, 1.1 or 2.0
    #[arg(long, default_value = "1.1")]
    pub proto: ProtocolVersion,
    /// Per-frame timeout in milliseconds
    #[arg(long, default_value_t = 500)]
    pub timeout_ms: u64,
    /// CRC-8 polynomial for 2.0 frames (e.g. 0xA6)
    #[arg(long, value_parser = parse_u8)]
    pub crc_poly: Option<u8>,
    /// Insert the payload length after the command (1.x)
    #[arg(long, default_value_t = false)]
    pub varlen: bool,
    /// Do not wait for acks
    #[arg(long, default_value_t = false)]
    pub no_ack: bool,
    /// Keep stale inbound bytes instead of flushing before each write
    #[arg(long, default_value_t = false)]
    pub no_flush: bool,
}

#[derive(Args, Debug, Clone)]
pub struct WriteOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Command character
    #[arg(long)]
    pub cmd: String,
    /// Payload as hex
    #[arg(long, default_value = "")]
    pub payload: String,
    /// Declared payload length in bytes (default: length of --payload)
    #[arg(long)]
    pub len: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ReadOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Expected response command character
    #[arg(long, default_value = "r")]
    pub cmd: String,
    /// Response payload length in bytes
    #[arg(long, default_value_t = 16)]
    pub len: usize,
}

#[derive(Args, Debug, Clone)]
pub struct QueryOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Command character sent each round
    #[arg(long, default_value = "p")]
    pub cmd: String,
    /// Fixed payload as hex
    #[arg(long, conflicts_with = "random")]
    pub payload: Option<String>,
    /// Fresh random payload of this many bytes each round
    #[arg(long)]
    pub random: Option<usize>,
    /// Expected response command character
    #[arg(long, default_value = "r")]
    pub resp: String,
    /// Response payload length in bytes
    #[arg(long, default_value_t = 16)]
    pub len: usize,
    /// Number of exchanges (0 = until interrupted)
    #[arg(long, default_value_t = 100)]
    pub count: u64,
    /// Stats print interval in seconds
    #[arg(long, default_value_t = 1.0)]
    pub stats: f64,
}

#[derive(Args, Debug, Clone)]
pub struct CommandsOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
}

/// Everything needed to run exchanges on one port.
pub struct Endpoint {
    pub protocol: Protocol,
    pub link: Link<SerialTransport>,
    pub opts: Exchange,
}

impl SerialOpts {
    pub fn open(&self) -> anyhow::Result<Endpoint> {
        let baud = self.baud.unwrap_or_else(|| self.proto.reference_baud());
        let transport =
            open_port(&self.dev, baud, self.rtscts).with_context(|| format!("open {}", self.dev))?;
        let mut protocol = Protocol::for_version(self.proto, self.varlen);
        if let Some(poly) = self.crc_poly {
            protocol.set_crc_poly(poly)?;
        }
        let opts = Exchange::default()
            .with_ack(!self.no_ack && self.proto.acks_by_default())
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_flush(!self.no_flush);
        Ok(Endpoint {
            protocol,
            link: Link::new(transport, simpleserial_host::history::DEFAULT_HISTORY),
            opts,
        })
    }
}

fn parse_u8(s: &str) -> anyhow::Result<u8> {
    let v = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    v.map_err(|_| anyhow!("expected a byte value like 0xA6 or 166"))
}
