//! Vend CLI entrypoint.

use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod handlers;

use commands::Commands;

#[derive(Debug, Parser)]
#[command(name = "vend")]
#[command(author, version, about = "Exchange identity provider tokens for temporary cloud credentials", long_about = None)]
struct Cli {
    /// Optional configuration file, layered under the environment
    #[arg(short, long, global = true, env = "VEND_CONFIG")]
    config: Option<PathBuf>,

    /// Env file to load before reading the environment; defaults to the nearest .env
    #[arg(long, global = true, env = "VEND_ENV_FILE")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let sources = handlers::Sources {
        config: cli.config.as_deref(),
        env_file: cli.env_file.as_deref(),
    };

    let result = match cli.command {
        Commands::Serve { bind } => handlers::serve(sources, bind).await,
        Commands::Exchange { token } => handlers::exchange(sources, token).await,
        Commands::CheckConfig => handlers::check_config(sources),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_bind() {
        let cli = Cli::try_parse_from(["vend", "serve", "--bind", "127.0.0.1:9000"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Serve { bind: Some(ref addr) } if addr == "127.0.0.1:9000"
        ));
    }

    #[test]
    fn test_parse_exchange_with_global_config() {
        let cli =
            Cli::try_parse_from(["vend", "exchange", "--config", "vend.toml", "-t", "eyJ.a.b"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("vend.toml")));
        assert!(matches!(
            cli.command,
            Commands::Exchange { token: Some(ref t) } if t == "eyJ.a.b"
        ));
    }

    #[test]
    fn test_parse_env_file() {
        let cli = Cli::try_parse_from(["vend", "check-config", "--env-file", "prod.env"]).unwrap();
        assert_eq!(cli.env_file, Some(PathBuf::from("prod.env")));
    }

    #[test]
    fn test_parse_check_config() {
        let cli = Cli::try_parse_from(["vend", "check-config"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckConfig));
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["vend", "deploy"]).is_err());
    }
}
