//! radio-relay binary
//!
//! Run with: radio-relay [--config config.json] [--bind 0.0.0.0:24748]
//!
//! Every key under `Streams` in the config becomes `http://<host>:<port>/<key>`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use radio_relay::config::{RelayConfig, SourceCatalog};
use radio_relay::{
    RegistryConfig, RelayServer, ServerConfig, SourceRegistry, TranscoderConfig,
    TranscoderLauncher,
};

#[derive(Parser, Debug)]
#[command(name = "radio-relay", version, about = "Relay live audio sources over HTTP")]
struct Args {
    /// Config file (created with defaults if missing)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Bind address; overrides the port from the config file
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Seconds a source keeps transcoding after its last listener leaves
    #[arg(long, default_value_t = 5)]
    grace_secs: u64,

    /// Seconds without audio before a client stream is ended
    #[arg(long, default_value_t = 30)]
    idle_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("radio_relay=info")),
        )
        .init();

    let relay = RelayConfig::load(&args.config)?;

    let bind_addr = match args.bind {
        Some(addr) => addr,
        None => SocketAddr::from(([0, 0, 0, 0], relay.port()?)),
    };

    for key in relay.streams.keys() {
        tracing::info!(
            source = %key,
            url = %format!("http://localhost:{}/{}", bind_addr.port(), key),
            "Source available"
        );
    }

    // Sources and the transcoder path are re-read from the file per request
    let catalog = Arc::new(SourceCatalog::watch_file(&args.config, relay));
    let launcher =
        TranscoderLauncher::with_catalog(TranscoderConfig::default(), Arc::clone(&catalog));
    let registry = Arc::new(SourceRegistry::with_config(
        Arc::new(launcher),
        RegistryConfig::default().grace_period(Duration::from_secs(args.grace_secs)),
    ));

    let config = ServerConfig::with_addr(bind_addr)
        .idle_timeout(Duration::from_secs(args.idle_secs));

    let server = RelayServer::new(config, registry, catalog);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
