use clap::Subcommand;

use super::serve::ServeArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Serve the gated API endpoints
    Serve(ServeArgs),

    /// Show the effective configuration
    Config,

    /// List the endpoint bindings and their limits
    Endpoints,
}
