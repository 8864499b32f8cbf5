//! Veil relay binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on all interfaces
//! veil-relay --bind 0.0.0.0:3000
//!
//! # Expire unanswered group proposals after five minutes
//! veil-relay --bind 0.0.0.0:3000 --pending-group-expiry-secs 300
//! ```

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use veil_relay::{Relay, RelayConfig, RelayRuntimeConfig};

/// Veil relay server
#[derive(Parser, Debug)]
#[command(name = "veil-relay")]
#[command(about = "Rendezvous relay for the Veil encrypted chat protocol")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_endpoints: usize,

    /// Expire unanswered group proposals after this many seconds
    /// (unset: proposals only resolve by responses or disconnects)
    #[arg(long)]
    pending_group_expiry_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Veil relay starting");

    let config = RelayRuntimeConfig {
        bind_address: args.bind,
        driver: RelayConfig {
            max_endpoints: args.max_endpoints,
            pending_group_expiry: args.pending_group_expiry_secs.map(Duration::from_secs),
        },
    };

    let relay = Relay::bind(config).await?;

    tracing::info!("Relay listening on {}", relay.local_addr()?);

    relay.run().await?;

    Ok(())
}
