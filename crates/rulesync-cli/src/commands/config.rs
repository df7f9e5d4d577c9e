use rulesync_core::SourceConfig;

use crate::context::Context;
use crate::error::Result;

/// Print the effective configuration with the API key masked.
pub fn run_show_config(ctx: &Context, json: bool) -> Result<()> {
    let mut config = ctx.config.clone();
    if let SourceConfig::Package { api_key, .. } = &mut config.source
        && !api_key.is_empty()
    {
        *api_key = "********".into();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{:#?}", config);
    }
    Ok(())
}
