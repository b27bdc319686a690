//! The ledger entry store and its REST API.
//!
//! A monetary entry is `{id, title, amount}`; the store is an in-memory list
//! with an auto-incrementing identifier. Three routes cover it:
//!
//! | Method | Path               | Success                    | Failure |
//! |--------|--------------------|----------------------------|---------|
//! | GET    | /api/entries       | 200, JSON array            | —       |
//! | POST   | /api/entries       | 201, created entry with id | 400 invalid body |
//! | DELETE | /api/entries/:id   | 204, empty body            | 404 unknown id |
//!
//! The store deliberately has no persistence; the offline layer in
//! [`crate::offline`] is an availability layer for reads, not a sync layer,
//! and mutations only ever live here.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::router::Router;
use crate::{Response, StatusCode};

/// A single monetary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: u64,
    pub title: String,
    pub amount: f64,
}

// Inner state guarded by the store mutex.
#[derive(Debug)]
struct Entries {
    items: Vec<Entry>,
    next_id: u64,
}

/// In-memory entry store with auto-incrementing ids starting at 1.
///
/// Critical sections are short and never held across an await, so a plain
/// [`std::sync::Mutex`] suffices.
#[derive(Debug)]
pub struct LedgerStore {
    inner: Mutex<Entries>,
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore {
    /// Creates an empty store; the first entry will get id 1.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Entries {
                items: Vec::new(),
                next_id: 1,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns all entries in insertion order.
    pub fn list(&self) -> Vec<Entry> {
        self.lock().items.clone()
    }

    /// Appends a new entry and returns it with its assigned id.
    pub fn add(&self, title: String, amount: f64) -> Entry {
        let mut inner = self.lock();
        let entry = Entry {
            id: inner.next_id,
            title,
            amount,
        };
        inner.next_id += 1;
        inner.items.push(entry.clone());
        entry
    }

    /// Removes the entry with the given id. Returns `false` if absent.
    pub fn remove(&self, id: u64) -> bool {
        let mut inner = self.lock();
        match inner.items.iter().position(|e| e.id == id) {
            Some(index) => {
                inner.items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

fn error_body(message: &str) -> Value {
    serde_json::json!({ "error": message })
}

// POST body validation: `title` must be a non-empty string and `amount` a
// JSON number. A numeric string is rejected, matching the strictness the
// client relies on.
fn parse_new_entry(body: &Value) -> Option<(String, f64)> {
    let title = body.get("title")?.as_str()?;
    if title.is_empty() {
        return None;
    }
    let amount = body.get("amount")?.as_f64()?;
    Some((title.to_owned(), amount))
}

/// Builds the entry-store API router over a shared [`LedgerStore`].
pub fn api_router(store: Arc<LedgerStore>) -> Router {
    let mut router = Router::new();

    let list_store = Arc::clone(&store);
    router.get("/api/entries", move |_ctx: Context| {
        let store = Arc::clone(&list_store);
        async move { Response::json(StatusCode::Ok, &store.list()) }
    });

    let create_store = Arc::clone(&store);
    router.post("/api/entries", move |ctx: Context| {
        let store = Arc::clone(&create_store);
        async move {
            let body: Value = match ctx.json() {
                Ok(body) => body,
                Err(_) => {
                    return Response::json(
                        StatusCode::BadRequest,
                        &error_body("Invalid entry data"),
                    );
                }
            };
            match parse_new_entry(&body) {
                Some((title, amount)) => {
                    let entry = store.add(title, amount);
                    Response::json(StatusCode::Created, &entry)
                }
                None => {
                    Response::json(StatusCode::BadRequest, &error_body("Invalid entry data"))
                }
            }
        }
    });

    let delete_store = Arc::clone(&store);
    router.delete("/api/entries/:id", move |ctx: Context| {
        let store = Arc::clone(&delete_store);
        async move {
            // A non-numeric id cannot name an entry: same 404 as a missing one.
            let id = ctx.params().get("id").and_then(|raw| raw.parse::<u64>().ok());
            match id {
                Some(id) if store.remove(id) => Response::new(StatusCode::NoContent),
                _ => Response::json(StatusCode::NotFound, &error_body("Entry not found")),
            }
        }
    });

    router
}
