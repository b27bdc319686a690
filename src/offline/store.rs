//! Cache generations and the store contract.
//!
//! A *generation* is a named, isolated container of cached request/response
//! pairs, tied to one deployed manifest version. At most one generation is
//! current at any time; every other generation is a candidate for deletion.
//! Entries are keyed by request identity — method plus target — and only
//! ever written for safe read requests.
//!
//! Two backends are provided: [`MemoryCacheStore`] for tests and embedded
//! use, and [`DiskCacheStore`] for the proxy binary, where a generation must
//! survive process restarts the way a browser cache survives page loads.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::http::{Method, Response, StatusCode};
use crate::offline::net::OutboundRequest;

/// Cache store failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("generation {0:?} does not exist")]
    NoSuchGeneration(String),

    #[error("generation {0:?} is not a usable name")]
    InvalidGeneration(String),

    #[error("generation {generation:?} is over its entry quota")]
    QuotaExceeded { generation: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Request identity: the key a cached snapshot is stored under.
///
/// # Examples
///
/// ```
/// use ledgerd::offline::CacheKey;
///
/// let key = CacheKey::get("/app.html");
/// assert_eq!(key.to_string(), "GET /app.html");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    target: String,
}

impl CacheKey {
    /// Key for an arbitrary method and target.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
        }
    }

    /// Key for a plain GET — how every manifest asset is stored.
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::Get, target)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.target)
    }
}

/// A captured response: status, headers, and body, detached from any
/// connection so it can be stored, cloned, and replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Snapshot {
    /// Builds a snapshot directly; used by network backends after parsing an
    /// upstream response.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns `true` for 2xx statuses; install refuses to cache anything else.
    pub fn is_success(&self) -> bool {
        StatusCode::from_u16(self.status).is_success()
    }

    /// Rehydrates the snapshot into a servable [`Response`].
    pub fn into_response(self) -> Response {
        let mut response = Response::new(StatusCode::from_u16(self.status));
        for (name, value) in self.headers {
            response.add_header(name, value);
        }
        response.body_bytes(self.body)
    }
}

impl From<&Response> for Snapshot {
    fn from(response: &Response) -> Self {
        Self {
            status: response.status().as_u16(),
            headers: response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
            body: response.body_ref().to_vec(),
        }
    }
}

impl From<Snapshot> for Response {
    fn from(snapshot: Snapshot) -> Self {
        snapshot.into_response()
    }
}

/// The environment contract the offline worker runs against.
///
/// Generations are addressed by name. `get` on an absent generation is a
/// miss, never an error; `put` on an absent generation is an error the
/// caller tolerates (a write racing a deletion lands on the stale
/// generation and fails, it must never crash the worker).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Opens the named generation, creating it if absent.
    async fn open(&self, generation: &str) -> Result<(), CacheError>;

    /// Looks up a snapshot by request identity within a generation.
    async fn get(&self, generation: &str, key: &CacheKey) -> Result<Option<Snapshot>, CacheError>;

    /// Stores a snapshot under a request identity within a generation.
    ///
    /// Concurrent writers to the same key store semantically equivalent
    /// snapshots of the same resource; last write wins.
    async fn put(
        &self,
        generation: &str,
        key: CacheKey,
        snapshot: Snapshot,
    ) -> Result<(), CacheError>;

    /// Deletes an entire generation. Returns `false` if it did not exist.
    async fn remove(&self, generation: &str) -> Result<bool, CacheError>;

    /// Lists the names of all existing generations.
    async fn list(&self) -> Result<Vec<String>, CacheError>;
}

/// Convenience: build the key an [`OutboundRequest`] is cached under.
impl From<&OutboundRequest> for CacheKey {
    fn from(request: &OutboundRequest) -> Self {
        Self::new(request.method().clone(), request.target())
    }
}

// ─── In-memory backend ────────────────────────────────────────────────────────

/// Generation map held entirely in memory.
///
/// The optional per-generation quota turns `put` into a
/// [`CacheError::QuotaExceeded`] once a generation holds that many distinct
/// keys, which is how tests exercise the swallowed write-behind failure
/// path.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    generations: RwLock<HashMap<String, HashMap<CacheKey, Snapshot>>>,
    quota: Option<usize>,
}

impl MemoryCacheStore {
    /// Creates an unbounded in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that refuses to grow any generation past
    /// `max_entries` distinct keys.
    pub fn with_quota(max_entries: usize) -> Self {
        Self {
            generations: RwLock::new(HashMap::new()),
            quota: Some(max_entries),
        }
    }

    /// Number of entries in a generation; 0 if the generation is absent.
    /// Test observability, not part of [`CacheStore`].
    pub async fn entry_count(&self, generation: &str) -> usize {
        self.generations
            .read()
            .await
            .get(generation)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, generation: &str) -> Result<(), CacheError> {
        self.generations
            .write()
            .await
            .entry(generation.to_owned())
            .or_default();
        Ok(())
    }

    async fn get(&self, generation: &str, key: &CacheKey) -> Result<Option<Snapshot>, CacheError> {
        Ok(self
            .generations
            .read()
            .await
            .get(generation)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(
        &self,
        generation: &str,
        key: CacheKey,
        snapshot: Snapshot,
    ) -> Result<(), CacheError> {
        let mut generations = self.generations.write().await;
        let entries = generations
            .get_mut(generation)
            .ok_or_else(|| CacheError::NoSuchGeneration(generation.to_owned()))?;
        if let Some(quota) = self.quota {
            if entries.len() >= quota && !entries.contains_key(&key) {
                return Err(CacheError::QuotaExceeded {
                    generation: generation.to_owned(),
                });
            }
        }
        entries.insert(key, snapshot);
        Ok(())
    }

    async fn remove(&self, generation: &str) -> Result<bool, CacheError> {
        Ok(self.generations.write().await.remove(generation).is_some())
    }

    async fn list(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.generations.read().await.keys().cloned().collect())
    }
}

// ─── Disk backend ─────────────────────────────────────────────────────────────

/// One JSON file per generation under a root directory.
///
/// The file holds a map from `CacheKey` display form to [`Snapshot`]; the
/// generation name (a manifest version token) is the file stem. Writes do a
/// full read-modify-write under a process-local mutex, which is plenty at
/// the scale of one manifest per deployed version.
#[derive(Debug)]
pub struct DiskCacheStore {
    root: PathBuf,
    // Serializes read-modify-write cycles on the generation files.
    io_lock: Mutex<()>,
}

impl DiskCacheStore {
    /// Creates a disk store rooted at `root`. The directory is created on
    /// first `open`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            io_lock: Mutex::new(()),
        }
    }

    // Generation names become file stems; anything that could escape the
    // root directory is rejected rather than sanitized.
    fn generation_path(&self, generation: &str) -> Result<PathBuf, CacheError> {
        if generation.is_empty()
            || generation.contains('/')
            || generation.contains('\\')
            || generation.contains("..")
        {
            return Err(CacheError::InvalidGeneration(generation.to_owned()));
        }
        Ok(self.root.join(format!("{generation}.json")))
    }

    async fn read_generation(
        &self,
        path: &Path,
    ) -> Result<Option<HashMap<String, Snapshot>>, CacheError> {
        match tokio::fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_generation(
        &self,
        path: &Path,
        entries: &HashMap<String, Snapshot>,
    ) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let raw = serde_json::to_vec(entries)?;
        tokio::fs::write(path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn open(&self, generation: &str) -> Result<(), CacheError> {
        let path = self.generation_path(generation)?;
        let _guard = self.io_lock.lock().await;
        if self.read_generation(&path).await?.is_none() {
            self.write_generation(&path, &HashMap::new()).await?;
        }
        Ok(())
    }

    async fn get(&self, generation: &str, key: &CacheKey) -> Result<Option<Snapshot>, CacheError> {
        let path = self.generation_path(generation)?;
        let _guard = self.io_lock.lock().await;
        Ok(self
            .read_generation(&path)
            .await?
            .and_then(|entries| entries.get(&key.to_string()).cloned()))
    }

    async fn put(
        &self,
        generation: &str,
        key: CacheKey,
        snapshot: Snapshot,
    ) -> Result<(), CacheError> {
        let path = self.generation_path(generation)?;
        let _guard = self.io_lock.lock().await;
        let mut entries = self
            .read_generation(&path)
            .await?
            .ok_or_else(|| CacheError::NoSuchGeneration(generation.to_owned()))?;
        entries.insert(key.to_string(), snapshot);
        self.write_generation(&path, &entries).await
    }

    async fn remove(&self, generation: &str) -> Result<bool, CacheError> {
        let path = self.generation_path(generation)?;
        let _guard = self.io_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, CacheError> {
        let _guard = self.io_lock.lock().await;
        let mut names = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_owned());
                }
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(body: &str) -> Snapshot {
        Snapshot::new(
            200,
            vec![("Content-Type".into(), "text/html".into())],
            body.as_bytes().to_vec(),
        )
    }

    // ── Snapshot ─────────────────────────────────────────────────────────────

    #[test]
    fn snapshot_rehydrates_into_response() {
        let response: Response = snapshot("<p>hi</p>").into_response();
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.headers().get("content-type"), Some("text/html"));
        assert_eq!(response.body_ref(), b"<p>hi</p>");
    }

    #[test]
    fn snapshot_captures_response() {
        let response = Response::new(StatusCode::Created)
            .header("X-Tag", "a")
            .body("made");
        let snap = Snapshot::from(&response);
        assert_eq!(snap.status, 201);
        assert_eq!(snap.body, b"made");
        assert!(snap.is_success());
    }

    #[test]
    fn snapshot_success_classification() {
        assert!(snapshot("x").is_success());
        assert!(!Snapshot::new(404, vec![], vec![]).is_success());
    }

    // ── MemoryCacheStore ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn get_on_absent_generation_is_a_miss() {
        let store = MemoryCacheStore::new();
        let hit = store.get("v1", &CacheKey::get("/")).await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn put_on_absent_generation_is_an_error() {
        let store = MemoryCacheStore::new();
        let err = store
            .put("v1", CacheKey::get("/"), snapshot("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::NoSuchGeneration(g) if g == "v1"));
    }

    #[tokio::test]
    async fn open_put_get_round_trip() {
        let store = MemoryCacheStore::new();
        store.open("v1").await.unwrap();
        store
            .put("v1", CacheKey::get("/"), snapshot("home"))
            .await
            .unwrap();
        let hit = store.get("v1", &CacheKey::get("/")).await.unwrap().unwrap();
        assert_eq!(hit.body, b"home");
        // other generations are untouched
        assert!(store.get("v2", &CacheKey::get("/")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn generations_are_isolated_and_removable() {
        let store = MemoryCacheStore::new();
        store.open("v1").await.unwrap();
        store.open("v2").await.unwrap();
        store
            .put("v1", CacheKey::get("/"), snapshot("old"))
            .await
            .unwrap();

        assert!(store.remove("v1").await.unwrap());
        assert!(!store.remove("v1").await.unwrap());

        let mut names = store.list().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["v2"]);
    }

    #[tokio::test]
    async fn quota_rejects_new_keys_but_allows_overwrites() {
        let store = MemoryCacheStore::with_quota(1);
        store.open("v1").await.unwrap();
        store
            .put("v1", CacheKey::get("/"), snapshot("a"))
            .await
            .unwrap();

        // overwriting an existing key is fine
        store
            .put("v1", CacheKey::get("/"), snapshot("b"))
            .await
            .unwrap();

        let err = store
            .put("v1", CacheKey::get("/other"), snapshot("c"))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::QuotaExceeded { .. }));
        assert_eq!(store.entry_count("v1").await, 1);
    }

    #[tokio::test]
    async fn keys_distinguish_methods() {
        let store = MemoryCacheStore::new();
        store.open("v1").await.unwrap();
        store
            .put("v1", CacheKey::get("/x"), snapshot("get"))
            .await
            .unwrap();
        let post_key = CacheKey::new(Method::Post, "/x");
        assert!(store.get("v1", &post_key).await.unwrap().is_none());
    }

    // ── DiskCacheStore ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn disk_round_trip_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskCacheStore::new(dir.path());

        store.open("v1").await.unwrap();
        store
            .put("v1", CacheKey::get("/app.html"), snapshot("<html>"))
            .await
            .unwrap();

        let hit = store
            .get("v1", &CacheKey::get("/app.html"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.body, b"<html>");
        assert_eq!(store.list().await.unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn disk_survives_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DiskCacheStore::new(dir.path());
            store.open("v1").await.unwrap();
            store
                .put("v1", CacheKey::get("/"), snapshot("persisted"))
                .await
                .unwrap();
        }
        let reopened = DiskCacheStore::new(dir.path());
        let hit = reopened.get("v1", &CacheKey::get("/")).await.unwrap();
        assert_eq!(hit.unwrap().body, b"persisted");
    }

    #[tokio::test]
    async fn disk_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskCacheStore::new(dir.path());
        store.open("v1").await.unwrap();
        assert!(store.remove("v1").await.unwrap());
        assert!(!store.remove("v1").await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disk_rejects_path_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskCacheStore::new(dir.path());
        for bad in ["", "a/b", "..", "..\\x"] {
            assert!(matches!(
                store.open(bad).await,
                Err(CacheError::InvalidGeneration(_))
            ));
        }
    }
}
