//! The offline availability layer.
//!
//! This is the ledger client's answer to a flaky network: a cache-first
//! interception layer that keeps read traffic working when the entry store
//! is unreachable. It is an availability layer, not a consistency layer —
//! it never synchronizes cached reads with the remote store, bounds no
//! staleness, and resolves no conflicts.
//!
//! ## Moving parts
//!
//! - [`OfflineManifest`] — the versioned list of assets to pre-fetch, plus
//!   the designated fallback document.
//! - [`CacheStore`] — the environment contract for named, independently
//!   deletable cache generations ([`MemoryCacheStore`], [`DiskCacheStore`]).
//! - [`Network`] — the outbound request contract ([`TcpNetwork`]).
//! - [`OfflineWorker`] — the actor tying them together through its three
//!   lifecycle events: install (pre-populate a generation), intercept
//!   (cache-first reads, pass-through writes, fallback on network failure),
//!   and activate (garbage-collect superseded generations).
//!
//! ## Lifecycle
//!
//! ```text
//! Registered → Installing → Installed → Activating → Active
//! ```
//!
//! Install populates generation `manifest.version()` all-or-nothing; a new
//! `version` is the sole trigger for rotation; activation deletes every
//! generation but the current one. Intercepts run as independent tasks the
//! whole time.

pub mod manifest;
pub mod net;
pub mod store;
pub mod worker;

pub use manifest::{ManifestError, OfflineManifest};
pub use net::{Network, NetworkError, OutboundRequest, TcpNetwork};
pub use store::{CacheError, CacheKey, CacheStore, DiskCacheStore, MemoryCacheStore, Snapshot};
pub use worker::{InstallError, Lifecycle, OfflineError, OfflineWorker, WritePolicy};
