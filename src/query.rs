use anyhow::{Result, bail};
use rand::RngCore;
use tracing::{debug, info};

use simpleserial_host::frame::{command_byte, read_len, to_hex};
use simpleserial_host::stats::ExchangeStats;
use simpleserial_host::{CommandFrame, Error};

use crate::cli::QueryOpts;

#[derive(Debug)]
enum Payload {
    Fixed(CommandFrame),
    Random(usize),
}

/// Everything about a query run that can be checked before the port is opened.
#[derive(Debug)]
struct Plan {
    source: Payload,
    resp: u8,
    len: usize,
}

fn plan(opts: &QueryOpts) -> Result<Plan> {
    let resp = command_byte(&opts.resp)?;
    let len = read_len(opts.len)?;
    let source = match (&opts.payload, opts.random) {
        (Some(hex), None) => {
            Payload::Fixed(CommandFrame::from_hex(&opts.cmd, hex.trim().len() / 2, hex)?)
        }
        (None, Some(n)) => {
            CommandFrame::new(&opts.cmd, n, &vec![0u8; n])?;
            Payload::Random(n)
        }
        (None, None) => Payload::Fixed(CommandFrame::new(&opts.cmd, 0, &[])?),
        (Some(_), Some(_)) => bail!("--payload and --random are exclusive"),
    };
    Ok(Plan { source, resp, len })
}

pub fn run(opts: QueryOpts) -> Result<()> {
    let plan = plan(&opts)?;
    let mut ep = opts.ser.open()?;
    let mut rng = rand::thread_rng();
    let mut stats = ExchangeStats::new();
    let write_opts = ep.opts.with_ack(false);

    info!(
        "[query] dev={} proto={} cmd={} resp={} len={} count={}",
        opts.ser.dev, opts.ser.proto, opts.cmd, opts.resp, plan.len, opts.count
    );

    let mut round: u64 = 0;
    while opts.count == 0 || round < opts.count {
        round += 1;
        let frame = match &plan.source {
            Payload::Fixed(f) => f.clone(),
            Payload::Random(n) => {
                let mut buf = vec![0u8; *n];
                rng.fill_bytes(&mut buf);
                CommandFrame::new(&opts.cmd, *n, &buf)?
            }
        };

        let result = ep
            .protocol
            .write(&mut ep.link, &frame, &write_opts)
            .and_then(|()| ep.protocol.read(&mut ep.link, plan.resp, plan.len, &ep.opts));
        match result {
            Ok(payload) => {
                stats.inc_ok();
                stats.add_bytes(payload.len() + frame.payload().len());
                debug!(
                    "[query] {} -> {}",
                    to_hex(frame.payload()),
                    to_hex(&payload)
                );
            }
            Err(Error::Contract(e)) => return Err(e.into()),
            Err(e) => stats.inc_failed(&e),
        }
        stats.maybe_print(opts.stats);
    }

    info!("[query] {}", stats.summary());
    Ok(())
}
