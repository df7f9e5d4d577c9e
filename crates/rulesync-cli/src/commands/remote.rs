use colored::Colorize;

use rulesync_transport::BundleTransport;

use crate::context::Context;
use crate::error::Result;

/// Print the current bundle hash of one file from the configured source.
pub fn run_remote_hash(ctx: &Context, name: &str) -> Result<()> {
    let hash = ctx.config.transport()?.fetch_file_hash(name)?;
    println!("{}  {}", hash, name.cyan());
    Ok(())
}
