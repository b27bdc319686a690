//! The offline worker: one actor, three lifecycle events.
//!
//! The worker owns its manifest, a cache store handle, and a network
//! handle — all injected at construction. Its three handlers compose into
//! the lifetime of one deployed version:
//!
//! ```text
//! on_install (once) → on_intercept (many, concurrent) → on_activate (once)
//! ```
//!
//! Install populates generation `manifest.version()` all-or-nothing.
//! Intercept serves safe reads cache-first, passes mutations through
//! untouched, and substitutes the fallback document when the network is
//! gone. Activate deletes every generation except the current one. The
//! hosting runtime awaits each handler; intercepts run as independent
//! tasks and are deliberately not gated on lifecycle state — a request
//! racing activation may still observe the previous generation.

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::offline::manifest::OfflineManifest;
use crate::offline::net::{Network, NetworkError, OutboundRequest};
use crate::offline::store::{CacheError, CacheKey, CacheStore, Snapshot};

/// Lifecycle states of one registered worker instance.
///
/// `Installing` reaches `Installed` only on full manifest success; a
/// partial install returns the instance to `Registered`. `Active` is
/// terminal — a new version supersedes the instance from outside rather
/// than transitioning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Registered,
    Installing,
    Installed,
    Activating,
    Active,
}

/// How a network-sourced snapshot is copied into the cache after a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Store from a spawned task after the response is already on its way
    /// to the caller. The default: the caller never waits on the cache.
    #[default]
    WriteBehind,
    /// Await the store before returning. Trades response latency for a
    /// cache that is current the moment the caller sees the response; a
    /// store failure is still only logged, never surfaced.
    WriteThrough,
}

/// Why a single asset failed during install.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("retrieval failed: {0}")]
    Fetch(#[from] NetworkError),

    #[error("asset responded with status {0}")]
    Status(u16),

    #[error("store failed: {0}")]
    Store(#[from] CacheError),
}

/// Failures surfaced to the hosting runtime.
#[derive(Debug, Error)]
pub enum OfflineError {
    #[error("cannot {event} while {state:?}")]
    Lifecycle {
        state: Lifecycle,
        event: &'static str,
    },

    #[error("install of generation {generation:?} failed at asset {asset:?}: {source}")]
    Install {
        generation: String,
        asset: String,
        #[source]
        source: InstallError,
    },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// The cache-first interception actor.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use ledgerd::offline::{
///     MemoryCacheStore, OfflineManifest, OfflineWorker, OutboundRequest, TcpNetwork,
/// };
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let manifest = OfflineManifest::new(
///     "ledger-cache-v2",
///     ["/", "/app.html", "/manifest.json"],
///     "/app.html",
/// )?;
/// let worker = OfflineWorker::new(
///     manifest,
///     Arc::new(MemoryCacheStore::new()),
///     Arc::new(TcpNetwork::new("127.0.0.1:3000")),
/// );
///
/// worker.on_install().await?;
/// worker.on_activate().await?;
/// let snapshot = worker.on_intercept(&OutboundRequest::get("/app.html")).await?;
/// # Ok(())
/// # }
/// ```
pub struct OfflineWorker<S, N> {
    manifest: OfflineManifest,
    store: Arc<S>,
    net: Arc<N>,
    policy: WritePolicy,
    state: RwLock<Lifecycle>,
}

impl<S, N> OfflineWorker<S, N>
where
    S: CacheStore + 'static,
    N: Network,
{
    /// Creates a worker in the `Registered` state with the default
    /// [`WritePolicy::WriteBehind`].
    pub fn new(manifest: OfflineManifest, store: Arc<S>, net: Arc<N>) -> Self {
        Self {
            manifest,
            store,
            net,
            policy: WritePolicy::default(),
            state: RwLock::new(Lifecycle::Registered),
        }
    }

    /// Overrides the write-back policy.
    #[must_use]
    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The manifest this worker was constructed with.
    pub fn manifest(&self) -> &OfflineManifest {
        &self.manifest
    }

    /// The current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: Lifecycle) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        debug!(from = ?*state, to = ?next, "lifecycle transition");
        *state = next;
    }

    fn transition(
        &self,
        expected: Lifecycle,
        next: Lifecycle,
        event: &'static str,
    ) -> Result<(), OfflineError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != expected {
            return Err(OfflineError::Lifecycle {
                state: *state,
                event,
            });
        }
        debug!(from = ?*state, to = ?next, "lifecycle transition");
        *state = next;
        Ok(())
    }

    /// Populates the generation named by the manifest version.
    ///
    /// All-or-nothing: every asset must be retrieved with a 2xx status and
    /// stored, or the whole install fails, the partially-populated
    /// generation is dropped, and the worker returns to `Registered`. No
    /// other generation is touched either way, and nothing is retried —
    /// the previously active version, if any, keeps serving.
    pub async fn on_install(&self) -> Result<(), OfflineError> {
        self.transition(Lifecycle::Registered, Lifecycle::Installing, "install")?;
        let generation = self.manifest.version();
        info!(generation, "installing offline generation");

        match self.populate(generation).await {
            Ok(()) => {
                self.set_state(Lifecycle::Installed);
                info!(
                    generation,
                    assets = self.manifest.assets().len(),
                    "install complete"
                );
                Ok(())
            }
            Err(error) => {
                // Leave no half-filled generation behind; cleanup failure is
                // only worth a warning on top of the install error itself.
                if let Err(cleanup) = self.store.remove(generation).await {
                    warn!(generation, error = %cleanup, "failed to drop partial generation");
                }
                self.set_state(Lifecycle::Registered);
                Err(error)
            }
        }
    }

    async fn populate(&self, generation: &str) -> Result<(), OfflineError> {
        let install_error = |asset: &str, source: InstallError| OfflineError::Install {
            generation: generation.to_owned(),
            asset: asset.to_owned(),
            source,
        };

        self.store.open(generation).await?;
        for asset in self.manifest.assets() {
            let request = OutboundRequest::get(asset.as_str());
            let snapshot = self
                .net
                .fetch(&request)
                .await
                .map_err(|e| install_error(asset, e.into()))?;
            if !snapshot.is_success() {
                return Err(install_error(asset, InstallError::Status(snapshot.status)));
            }
            self.store
                .put(generation, request.key(), snapshot)
                .await
                .map_err(|e| install_error(asset, e.into()))?;
            debug!(generation, asset, "asset cached");
        }
        Ok(())
    }

    /// Adopts a generation a previous process already installed.
    ///
    /// When the store still holds a generation named by this manifest's
    /// version, the worker moves straight to `Installed` without fetching
    /// anything and returns `true`; otherwise it stays `Registered` and
    /// returns `false` so the caller can run [`on_install`](Self::on_install).
    /// Keeping install off this path means install only ever writes into a
    /// generation it created, so a failed install never destroys data a
    /// previous run persisted.
    pub async fn try_adopt(&self) -> Result<bool, OfflineError> {
        let state = self.lifecycle();
        if state != Lifecycle::Registered {
            return Err(OfflineError::Lifecycle {
                state,
                event: "adopt",
            });
        }

        let version = self.manifest.version();
        let exists = self.store.list().await?.iter().any(|name| name == version);
        if exists {
            self.transition(Lifecycle::Registered, Lifecycle::Installed, "adopt")?;
            info!(generation = version, "adopted existing generation");
        }
        Ok(exists)
    }

    /// Deletes every cache generation except the current one.
    ///
    /// Deletions run concurrently; a failed deletion is logged and
    /// non-fatal (it leaves orphaned storage, bounded by the number of
    /// versions ever deployed). Activation completes once every deletion
    /// has been attempted, after which this worker is `Active` and the
    /// surviving generation is authoritative.
    pub async fn on_activate(&self) -> Result<(), OfflineError> {
        self.transition(Lifecycle::Installed, Lifecycle::Activating, "activate")?;
        let current = self.manifest.version();

        let stale: Vec<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|name| name != current)
            .collect();

        let mut deletions = JoinSet::new();
        for generation in stale {
            let store = Arc::clone(&self.store);
            deletions.spawn(async move {
                match store.remove(&generation).await {
                    Ok(_) => debug!(generation = %generation, "stale generation deleted"),
                    Err(error) => {
                        warn!(generation = %generation, error = %error, "failed to delete stale generation");
                    }
                }
            });
        }
        while deletions.join_next().await.is_some() {}

        self.set_state(Lifecycle::Active);
        info!(generation = current, "activation complete");
        Ok(())
    }

    /// Mediates one outgoing request.
    ///
    /// Non-safe methods are forwarded to the network untouched — the cache
    /// is neither read nor written, and failures propagate unchanged. Safe
    /// reads are served cache-first from the current generation; a miss
    /// goes to the network, and a network-sourced snapshot is copied back
    /// into the generation under the configured [`WritePolicy`]. When the
    /// network fails, the cached fallback document stands in; if even that
    /// is absent, the network failure propagates.
    pub async fn on_intercept(
        &self,
        request: &OutboundRequest,
    ) -> Result<Snapshot, OfflineError> {
        if !request.method().is_safe() {
            return Ok(self.net.fetch(request).await?);
        }

        let generation = self.manifest.version();
        let key = request.key();

        match self.store.get(generation, &key).await {
            Ok(Some(snapshot)) => {
                debug!(%key, "cache hit");
                return Ok(snapshot);
            }
            Ok(None) => debug!(%key, "cache miss"),
            // A broken store read is a miss, not a failed request.
            Err(error) => warn!(%key, %error, "cache lookup failed, treating as miss"),
        }

        match self.net.fetch(request).await {
            Ok(snapshot) => {
                self.record(generation, key, snapshot.clone()).await;
                Ok(snapshot)
            }
            Err(network_error) => {
                let fallback = CacheKey::get(self.manifest.fallback_asset());
                match self.store.get(generation, &fallback).await {
                    Ok(Some(snapshot)) => {
                        debug!(%key, %network_error, "network down, serving fallback document");
                        Ok(snapshot)
                    }
                    Ok(None) => Err(network_error.into()),
                    Err(store_error) => {
                        warn!(%fallback, error = %store_error, "fallback lookup failed");
                        Err(network_error.into())
                    }
                }
            }
        }
    }

    // Copy a network-sourced snapshot into the current generation. Store
    // failures (quota, racing deletion) are logged and swallowed in both
    // policies; the response already belongs to the caller.
    async fn record(&self, generation: &str, key: CacheKey, snapshot: Snapshot) {
        match self.policy {
            WritePolicy::WriteBehind => {
                let store = Arc::clone(&self.store);
                let generation = generation.to_owned();
                tokio::spawn(async move {
                    if let Err(error) = store.put(&generation, key, snapshot).await {
                        warn!(generation = %generation, error = %error, "write-behind store failed");
                    }
                });
            }
            WritePolicy::WriteThrough => {
                if let Err(error) = self.store.put(generation, key, snapshot).await {
                    warn!(generation, error = %error, "write-through store failed");
                }
            }
        }
    }
}
