//! Command handlers.

use anyhow::Context;
use console::style;
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use vend_api::AppState;
use vend_auth::TokenExchangeBroker;
use vend_core::config::load_env_file;
use vend_core::{BrokerConfig, IncomingRequest};
use vend_trace::{TracingConfig, init_tracer, shutdown_tracer};

/// Paths given on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sources<'a> {
    pub config: Option<&'a Path>,
    pub env_file: Option<&'a Path>,
}

/// Load the env file first so both the broker and the tracer see its values.
fn prepare(sources: Sources<'_>) -> anyhow::Result<(BrokerConfig, TracingConfig)> {
    load_env_file(sources.env_file).context("failed to load env file")?;
    let config =
        BrokerConfig::from_sources(sources.config).context("failed to load broker configuration")?;
    Ok((config, TracingConfig::from_env()))
}

/// Run `command` with the tracer installed, flushing it however `command` ends.
async fn traced<F>(tracing: &TracingConfig, command: F) -> anyhow::Result<ExitCode>
where
    F: Future<Output = anyhow::Result<ExitCode>>,
{
    init_tracer(tracing)?;
    let result = command.await;
    shutdown_tracer();
    result
}

/// Run the HTTP surface until Ctrl-C or SIGTERM.
pub async fn serve(sources: Sources<'_>, bind: Option<String>) -> anyhow::Result<ExitCode> {
    let (config, tracing) = prepare(sources)?;
    traced(&tracing, run_server(config, bind)).await
}

async fn run_server(config: BrokerConfig, bind: Option<String>) -> anyhow::Result<ExitCode> {
    let broker = TokenExchangeBroker::from_config(&config)
        .await
        .context("failed to build token exchange broker")?;

    let addr = bind.unwrap_or_else(|| config.bind_addr.clone());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let state = Arc::new(AppState::new(Arc::new(broker)));
    vend_api::serve(listener, state, shutdown_signal()).await?;

    info!("Token exchange broker stopped");
    Ok(ExitCode::SUCCESS)
}

/// One-shot exchange. Prints the success or failure body as JSON on stdout.
pub async fn exchange(sources: Sources<'_>, token: Option<String>) -> anyhow::Result<ExitCode> {
    let (config, tracing) = prepare(sources)?;
    traced(&tracing, run_exchange(config, token)).await
}

async fn run_exchange(config: BrokerConfig, token: Option<String>) -> anyhow::Result<ExitCode> {
    let token = match token {
        Some(token) => token,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read token from stdin")?;
            buf
        }
    };

    let broker = TokenExchangeBroker::from_config(&config)
        .await
        .context("failed to build token exchange broker")?;

    let mut request = IncomingRequest::new(token.trim());
    request.http_method = "CLI".to_string();

    match broker.exchange(&request).await {
        Ok(credentials) => {
            println!("{}", serde_json::to_string_pretty(&credentials)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            println!("{}", serde_json::to_string_pretty(&failure.to_response())?);
            eprintln!(
                "{} {} during {}",
                style("✗").red(),
                style(failure.kind).bold(),
                failure.stage.as_str()
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Validate configuration and print what the broker would run with.
pub fn check_config(sources: Sources<'_>) -> anyhow::Result<ExitCode> {
    let (config, _) = prepare(sources)?;

    println!("{} Configuration is valid", style("✓").green());
    println!("  Application:   {}", config.idp_app_arn);
    println!("  Role:          {}", config.identity_bearer_role_arn);
    println!("  Region:        {}", config.region);
    println!("  Key set:       {}", config.jwks_uri);
    println!("  Algorithm:     {:?}", config.jwt_algorithm);
    println!(
        "  Issuer:        {}",
        config.expected_issuer.as_deref().unwrap_or("(not checked)")
    );
    println!(
        "  Audience:      {}",
        config.expected_audience.as_deref().unwrap_or("(not checked)")
    );
    println!("  Clock skew:    {}s", config.clock_skew_secs);
    println!("  Call timeout:  {}s", config.call_timeout_secs);
    println!("  Bind address:  {}", config.bind_addr);
    if let Some(ref endpoint) = config.federation_endpoint_url {
        println!("  Federation endpoint override: {}", style(endpoint).yellow());
    }
    if let Some(ref endpoint) = config.sts_endpoint_url {
        println!("  STS endpoint override:        {}", style(endpoint).yellow());
    }

    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
