//! CLI command definitions.

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve the exchange endpoint over HTTP
    Serve {
        /// Address to listen on; overrides BIND_ADDR
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Exchange one token and print the result as JSON
    Exchange {
        /// Identity provider token; read from stdin when omitted
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Validate configuration and print the effective settings
    CheckConfig,
}
