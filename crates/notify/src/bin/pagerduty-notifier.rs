//! PagerDuty notifier binary.
//!
//! Loads a notifier config, sets up the PagerDuty notifier and either
//! dispatches a single build or serves Pub/Sub push requests.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

use build_notify::server::{build_router, AppState};
use build_notify::telemetry::{self, LogFormat};
use build_notify::{
    Build, EnvSecretResolver, FileSecretResolver, Notifier, NotifierConfig, PagerDutyNotifier,
    SecretResolver,
};

/// Forward CI build events to PagerDuty.
#[derive(Parser)]
#[command(name = "pagerduty-notifier")]
#[command(about = "Trigger PagerDuty incidents for matching build events")]
#[command(version)]
struct Cli {
    /// Notifier config file (YAML)
    #[arg(long, global = true, env = "NOTIFIER_CONFIG", default_value = "notifier.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// HTTP request timeout in seconds (no timeout when unset)
    #[arg(long, global = true, env = "NOTIFIER_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Read secrets from files in this directory instead of the environment
    #[arg(long, global = true, env = "NOTIFIER_SECRETS_DIR")]
    secrets_dir: Option<PathBuf>,

    /// Prefix for secret environment variables
    #[arg(long, global = true, env = "NOTIFIER_SECRET_ENV_PREFIX", default_value = "")]
    secret_env_prefix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the config and resolve secrets without sending anything
    Check,

    /// Dispatch a single build event
    Send {
        /// Build JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        build: String,
    },

    /// Serve Pub/Sub push requests
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value = "8080")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init(cli.verbose, cli.log_format);

    let notifier = set_up(&cli).await?;

    match cli.command {
        Commands::Check => {
            info!(config = %cli.config.display(), "Config is valid");
        }
        Commands::Send { build } => {
            let build = read_build(&build)?;
            notifier
                .send_notification(&build)
                .await
                .with_context(|| format!("Failed to send notification for build {}", build.id))?;
        }
        Commands::Serve { port } => {
            let state = AppState {
                notifier: Arc::new(notifier),
            };
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;

            info!(%addr, "PagerDuty notifier listening");
            axum::serve(listener, build_router(state))
                .await
                .context("Server error")?;
        }
    }

    Ok(())
}

/// Load the config and set the notifier up. Any failure aborts startup.
async fn set_up(cli: &Cli) -> Result<PagerDutyNotifier> {
    let config = NotifierConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    let mut client = reqwest::Client::builder();
    if let Some(secs) = cli.timeout_secs {
        client = client.timeout(Duration::from_secs(secs));
    }
    let client = client.build().context("Failed to build HTTP client")?;

    let resolver: Box<dyn SecretResolver> = match &cli.secrets_dir {
        Some(dir) => Box::new(FileSecretResolver::new(dir)),
        None => Box::new(EnvSecretResolver::with_prefix(&cli.secret_env_prefix)),
    };

    let mut notifier = PagerDutyNotifier::with_client(client);
    notifier
        .set_up(&config, resolver.as_ref())
        .await
        .context("Failed to set up PagerDuty notifier")?;
    Ok(notifier)
}

fn read_build(source: &str) -> Result<Build> {
    let contents = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read build from stdin")?;
        buf
    } else {
        std::fs::read_to_string(Path::new(source))
            .with_context(|| format!("Failed to read build file {source}"))?
    };
    serde_json::from_str(&contents).context("Failed to parse build JSON")
}
