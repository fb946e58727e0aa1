use anyhow::{Context, Result};

use simpleserial_host::frame::{command_byte, to_hex};

use crate::cli::ReadOpts;

pub fn run(opts: ReadOpts) -> Result<()> {
    let mut ep = opts.ser.open()?;
    let cmd = command_byte(&opts.cmd)?;
    let payload = ep
        .protocol
        .read(&mut ep.link, cmd, opts.len, &ep.opts)
        .context("serial read")?;
    println!("{}", to_hex(&payload));
    Ok(())
}
