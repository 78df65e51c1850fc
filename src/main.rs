//! Standalone state backend server binary (`stsv-run`).
//!
//! ## Purpose
//! Runs the HTTP state backend on its own, configured entirely through
//! the environment. The `stsv` CLI offers the same server behind its
//! `server` subcommand together with the operator tooling.
//!
//! ## Environment Variables
//! - `STSV_DATADIR`: data directory for state storage (required)
//! - `STSV_LISTEN`: listen address (default: "0.0.0.0:3000")
//! - `STSV_AUTH`: optional HTTP Basic credentials as `user:password`

use std::net::SocketAddr;
use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use stsv_core::Datastore;
use stsv_http::{BasicAuth, ServerConfig, StateServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = std::env::var("STSV_DATADIR")
        .map_err(|_| anyhow::anyhow!("STSV_DATADIR must point at the data directory"))?;
    let data_path = Path::new(&data_dir);
    if !data_path.is_dir() {
        anyhow::bail!("data directory does not exist: {}", data_path.display());
    }

    // Catch read-only mounts at startup instead of on the first POST.
    let probe = data_path.join(".stsv_write_probe");
    std::fs::write(&probe, b"probe")
        .map_err(|e| anyhow::anyhow!("data directory is not writable: {e}"))?;
    let _ = std::fs::remove_file(&probe);

    let bind_addr: SocketAddr = std::env::var("STSV_LISTEN")
        .unwrap_or_else(|_| "0.0.0.0:3000".into())
        .parse()?;
    let basic_auth = std::env::var("STSV_AUTH")
        .ok()
        .map(|spec| BasicAuth::parse(&spec))
        .transpose()?;

    tracing::info!("-- Starting STSV state backend on {}", bind_addr);

    let config = ServerConfig {
        bind_addr,
        basic_auth,
    };
    StateServer::new(config, Datastore::new(data_path))
        .serve()
        .await?;

    Ok(())
}
