use anyhow::{Context, Result};

use crate::cli::CommandsOpts;

pub fn run(opts: CommandsOpts) -> Result<()> {
    let mut ep = opts.ser.open()?;
    let table = ep
        .protocol
        .commands(&mut ep.link, &ep.opts)
        .context("query command table")?;
    for entry in &table {
        println!("{entry}");
    }
    Ok(())
}
