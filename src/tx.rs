use anyhow::{Context, Result};
use tracing::info;

use simpleserial_host::CommandFrame;
use simpleserial_host::frame::decode_hex;

use crate::cli::WriteOpts;

pub fn run(opts: WriteOpts) -> Result<()> {
    let mut ep = opts.ser.open()?;
    let declared = match opts.len {
        Some(n) => n,
        None => {
            decode_hex(opts.payload.trim())
                .with_context(|| format!("invalid hex payload {:?}", opts.payload))?
                .len()
        }
    };
    let frame = CommandFrame::from_hex(&opts.cmd, declared, &opts.payload)?;
    ep.protocol
        .write(&mut ep.link, &frame, &ep.opts)
        .context("serial write")?;
    if let Some(sent) = ep.link.tx_history().newest() {
        info!(acked = ep.opts.ack, "[tx] {}", sent.trim_end());
    }
    Ok(())
}
