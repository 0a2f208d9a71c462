use anyhow::Result;

use crate::cli::context::CliContext;
use crate::cli::output::OutputFormat;

pub fn cmd_config(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    match ctx.output() {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(config)?),
        OutputFormat::Human => {
            println!("Effective configuration ({}):", ctx.config_path().display());
            print!("{}", serde_yaml::to_string(config)?);
        }
    }
    Ok(())
}
