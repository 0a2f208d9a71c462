use super::config::cmd_config;
use super::endpoints::cmd_endpoints;
use super::env::CliArgs;
use super::serve::cmd_serve;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Serve(args) => cmd_serve(args, ctx),
        Commands::Config => cmd_config(ctx),
        Commands::Endpoints => cmd_endpoints(ctx),
    }
}
