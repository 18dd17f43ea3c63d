//! Process entry point: load settings, construct one engine instance,
//! accept connections and hand each to its own task. The engine itself
//! is single-threaded by design (spec §5); concurrent access from
//! multiple connection tasks is serialized by a mutex rather than
//! sharding, since cache operations never block and the critical
//! section is always short.

use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use slabcache_engine::Cache;
use slabcache_server::{Metrics, Settings};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let settings = Settings::from_env();
    let cache = Cache::new(settings.cache).unwrap_or_else(|err| {
        tracing::error!(%err, "invalid engine configuration");
        std::process::exit(1);
    });
    let cache = Arc::new(Mutex::new(cache));
    let metrics = Arc::new(Metrics::new());

    let listener = TcpListener::bind(settings.net.listen_addr).await?;
    tracing::info!(addr = %settings.net.listen_addr, "slabcache-server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let cache = Arc::clone(&cache);
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            tracing::debug!(%peer, "connection accepted");
            if let Err(err) = slabcache_server::handle_connection(stream, cache, metrics).await {
                tracing::debug!(%peer, %err, "connection closed with error");
            }
        });
    }
}
