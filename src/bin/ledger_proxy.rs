//! The caching proxy: an offline worker wrapped in the server loop.
//!
//! Sits between the ledger page and the backend. On startup it installs the
//! manifest's cache generation (or adopts one a previous run left on disk)
//! and garbage-collects superseded generations; from then on every request
//! is mediated by the worker — safe reads cache-first, mutations passed
//! through, fallback document when the backend is unreachable.
//!
//! Configuration, all via environment:
//!
//! | Variable            | Default                 |
//! |---------------------|-------------------------|
//! | `LEDGER_PROXY_ADDR` | `127.0.0.1:8080`        |
//! | `LEDGER_ORIGIN`     | `127.0.0.1:3000`        |
//! | `LEDGER_MANIFEST`   | `offline-manifest.json` |
//! | `LEDGER_CACHE_DIR`  | `.ledger-cache`         |

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ledgerd::offline::{
    DiskCacheStore, OfflineManifest, OfflineWorker, OutboundRequest, TcpNetwork,
};
use ledgerd::server::Server;
use ledgerd::{Response, StatusCode};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let addr = env_or("LEDGER_PROXY_ADDR", "127.0.0.1:8080");
    let origin = env_or("LEDGER_ORIGIN", "127.0.0.1:3000");
    let manifest_path = env_or("LEDGER_MANIFEST", "offline-manifest.json");
    let cache_dir = env_or("LEDGER_CACHE_DIR", ".ledger-cache");

    let manifest = OfflineManifest::load(&manifest_path).await?;
    info!(
        version = manifest.version(),
        assets = manifest.assets().len(),
        "manifest loaded"
    );

    let worker = Arc::new(OfflineWorker::new(
        manifest,
        Arc::new(DiskCacheStore::new(cache_dir)),
        Arc::new(TcpNetwork::new(origin)),
    ));

    // A restart with an unchanged manifest finds its generation already on
    // disk; only a new version pays the install fetch.
    if worker.try_adopt().await? {
        info!("existing cache generation adopted");
    } else {
        worker.on_install().await?;
    }
    worker.on_activate().await?;

    let server = Server::bind(&addr).await?;
    info!(address = %server.local_addr(), "ledger-proxy up");

    server
        .run(move |request| {
            let worker = Arc::clone(&worker);
            async move {
                let outbound = OutboundRequest::from_http(&request);
                match worker.on_intercept(&outbound).await {
                    Ok(snapshot) => snapshot.into_response(),
                    Err(error) => {
                        warn!(%error, "intercept failed");
                        Response::new(StatusCode::BadGateway)
                            .body(format!("upstream unreachable: {error}"))
                    }
                }
            }
        })
        .await?;

    Ok(())
}
