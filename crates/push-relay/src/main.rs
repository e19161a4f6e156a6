//! push-relay binary entry point.
//!
//! Usage: push-relay [-c <config.toml>] [--log-level <level>] [--check]

use clap::Parser;
use push_relay::{RelayConfig, RelayService};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::instrument::WithSubscriber;
use tracing::{error, info};

/// Relays Redis pub/sub messages to HTTP endpoints.
#[derive(Parser, Debug)]
#[command(name = "push-relay")]
#[command(about = "Relays Redis pub/sub messages to HTTP endpoints with per-topic concurrency limits")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short = 'c', long = "config", env = "PUSH_RELAY_CONFIG", default_value = "./config.toml")]
    config: PathBuf,

    /// Override logger.log_level (debug, info, warn, error, fatal).
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match RelayConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("push-relay: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = args.log_level {
        config.logger.log_level = level;
    }

    let logging = match config
        .log_config("push-relay")
        .map_err(|e| e.to_string())
        .and_then(|log| observability::build(&log).map_err(|e| e.to_string()))
    {
        Ok(logging) => logging,
        Err(e) => {
            eprintln!("push-relay: {e}");
            return ExitCode::FAILURE;
        }
    };

    let dispatch = logging.dispatch();

    if args.check {
        println!(
            "push-relay: {} is valid ({} channels)",
            args.config.display(),
            config.channels.len()
        );
        return ExitCode::SUCCESS;
    }

    let app = async {
        info!(
            config = %args.config.display(),
            redis = %config.database.redis_addr,
            channels = config.channels.len(),
            "Load config successfully"
        );

        // Startup failures are logged by the service itself.
        let Ok(service) = RelayService::from_config(&config, dispatch.clone()).await else {
            return ExitCode::FAILURE;
        };

        tokio::select! {
            summary = service.run() => {
                error!(
                    fatal = true,
                    closed = summary.closed,
                    failed = summary.failed,
                    "Every consumer stopped, exiting"
                );
                ExitCode::FAILURE
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, exiting...");
                ExitCode::SUCCESS
            }
        }
    };

    app.with_subscriber(dispatch.clone()).await
}
