//! Crowdplay server binary.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: bind 0.0.0.0:8080, built-in configuration
//! crowdplay-server
//!
//! # With a configuration file (a leading ~ is expanded via $HOME)
//! crowdplay-server --bind 0.0.0.0:9090 --config ~/.config/crowdplay.json
//! ```
//!
//! Exits 0 after a graceful (admin-initiated) shutdown, non-zero if the
//! listener cannot bind.

use clap::Parser;
use crowdplay::{expand_tilde, CrowdplayServer, ServerConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crowdplay emulator streaming server
#[derive(Parser, Debug)]
#[command(name = "crowdplay-server")]
#[command(about = "Multi-user emulator streaming server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = match &args.config {
        Some(path) => {
            let path = expand_tilde(path);
            match ServerConfig::load_from(&path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                    ServerConfig::default()
                }
            }
        }
        None => ServerConfig::default(),
    };

    tracing::info!("crowdplay server starting");
    tracing::info!("binding to {}", args.bind);

    let server = CrowdplayServer::builder()
        .bind(&args.bind)
        .config(config)
        .build()
        .await?;

    tracing::info!("listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
