//! # ledgerd
//!
//! An offline-capable ledger service: a CRUD store of monetary entries
//! exposed over HTTP, and a cache-first interception layer that keeps the
//! read path working when the network does not.
//!
//! The two halves ship as two binaries over one library:
//!
//! - `ledgerd` — the entry-store API (`GET/POST /api/entries`,
//!   `DELETE /api/entries/:id`) plus the demo pages, served through the
//!   [`server`] / [`router`] / [`middleware`] stack.
//! - `ledger-proxy` — an [`offline::OfflineWorker`] wrapped in the same
//!   server loop: it pre-populates a versioned cache generation from a
//!   manifest at install, serves safe reads cache-first, passes mutations
//!   through untouched, substitutes a fallback document when the network is
//!   unreachable, and garbage-collects superseded generations on activation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ledgerd::ledger::{LedgerStore, api_router};
//! use ledgerd::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Arc::new(api_router(Arc::new(LedgerStore::new())));
//!     let server = Server::bind("127.0.0.1:3000").await?;
//!     server.run(move |req| {
//!         let router = Arc::clone(&router);
//!         async move { router.route(req).await }
//!     }).await?;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod http;
pub mod ledger;
pub mod middleware;
pub mod offline;
pub mod router;
pub mod server;

pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
