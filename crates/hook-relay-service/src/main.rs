//! # Hook Relay Service
//!
//! Binary entry point for the Hook Relay HTTP service.
//!
//! This executable:
//! - Loads configuration from files, environment and command-line flags
//! - Initializes logging
//! - Creates the trigger client
//! - Starts the HTTP server from hook-relay-api

use anyhow::Context;
use clap::Parser;
use hook_relay_api::{start_server, HttpTriggerClient, ServiceConfig, ServiceError};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Hook Relay - forwards source-control webhooks to a build trigger API
#[derive(Debug, Parser)]
#[command(name = "hook-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relays source-control and chat webhooks to build triggers")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Send every trigger to this base URL instead of the configured API
    #[arg(long)]
    send_requests_to: Option<String>,

    /// Configuration file (YAML)
    #[arg(short, long, env = "HOOK_RELAY_CONFIG_FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging depends on the loaded configuration, so a load failure is
    // reported through a default subscriber.
    let service_config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&ServiceConfig::default());
            error!(error = %format!("{:#}", e), "Failed to load configuration; aborting");
            std::process::exit(3);
        }
    };

    init_logging(&service_config);
    info!(
        environment = %service_config.environment,
        "Starting Hook Relay Service"
    );

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    let trigger_client = match HttpTriggerClient::new(&service_config.trigger) {
        Ok(client) => client.with_request_body_logging(service_config.is_development()),
        Err(e) => {
            error!(error = %e, "Failed to create trigger client; aborting");
            std::process::exit(3);
        }
    };

    info!(
        base_url = %service_config.trigger.effective_base_url(),
        "Build triggers will be sent to this API"
    );

    if let Err(e) = start_server(service_config, Arc::new(trigger_client)).await {
        error!("Failed to start server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }

    Ok(())
}

/// Build the service configuration.
///
/// Sources, later overriding earlier:
///  1. /etc/hook-relay/service.yaml
///  2. ./config/service.yaml
///  3. `--config` or `HOOK_RELAY_CONFIG_FILE` (must exist when given)
///  4. `HOOK_RELAY__*` environment variables, e.g. `HOOK_RELAY__SERVER__PORT=9090`
///  5. `--port` and `--send-requests-to`
fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/hook-relay/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = cli.config.as_ref().filter(|p| !p.as_os_str().is_empty()) {
        builder = builder.add_source(
            config::File::with_name(&path.to_string_lossy())
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    let config: ServiceConfig = builder
        .add_source(config::Environment::with_prefix("HOOK_RELAY").separator("__"))
        .build()
        .context("failed to build configuration")?
        .try_deserialize()
        .context("could not deserialize service configuration")?;

    Ok(apply_cli_overrides(config, cli))
}

fn apply_cli_overrides(mut config: ServiceConfig, cli: &Cli) -> ServiceConfig {
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(url) = &cli.send_requests_to {
        config.trigger.send_requests_to = Some(url.clone());
    }
    config
}

fn init_logging(config: &ServiceConfig) {
    let level = config.logging.level.to_lowercase();
    let default_filter = format!(
        "hook_relay_service={level},hook_relay_api={level},hook_relay_core={level},tower_http=debug"
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let json = config.logging.json_format;
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
