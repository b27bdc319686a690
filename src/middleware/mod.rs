//! Middleware pipeline — composable before/after request handler logic.
//!
//! Each middleware wraps the next layer, enabling request inspection,
//! short-circuit responses, and response decoration without coupling handlers
//! to infrastructure concerns.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] / [`terminal`] — adapters into [`MiddlewareHandler`].
//! - [`RequestLog`] — built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Response, context::Context};

pub mod cors;

pub use cors::Cors;

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`;
/// the [`Arc`] makes handlers cheap to clone so [`Next`] can advance through
/// the chain without copying closures.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so a middleware can forward a
/// request at most once. When the chain is exhausted without any layer
/// producing a response, a `500` fallback is returned.
pub struct Next {
    chain: Vec<MiddlewareHandler>,
    index: usize,
}

impl Next {
    /// Creates a `Next` positioned at the start of the given chain.
    pub fn new(chain: Vec<MiddlewareHandler>) -> Self {
        Self { chain, index: 0 }
    }

    /// Invokes the next middleware in the chain and returns its response.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.index < self.chain.len() {
            let handler = self.chain[self.index].clone();
            self.index += 1;
            handler(ctx, self).await
        } else {
            Response::new(crate::StatusCode::InternalServerError)
                .body("no response generated by middleware chain")
        }
    }
}

/// The trait implemented by all middleware.
///
/// Implementations may pass through (`next.run(ctx).await`), short-circuit
/// (return a [`Response`] without calling `next`), or decorate the downstream
/// response. They must be `Send + Sync` because the stack is shared across
/// tasks.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Wraps a [`Middleware`] implementation as a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Wraps a plain async handler as the innermost chain entry.
///
/// The terminal handler never calls `next`; it is where the router (or any
/// other endpoint) sits at the bottom of the stack.
pub fn terminal<F, Fut>(handler: F) -> MiddlewareHandler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |ctx: Context, _next: Next| {
        let handler = Arc::clone(&handler);
        Box::pin(async move { handler(ctx).await })
    })
}

/// Built-in middleware that logs each request's method, path, status, and
/// duration once the downstream handler completes. Never short-circuits.
pub struct RequestLog;

impl Middleware for RequestLog {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request"
            );

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, StatusCode};

    fn make_ctx(raw: &[u8]) -> Context {
        Context::new(Request::parse(raw).unwrap().0)
    }

    #[tokio::test]
    async fn exhausted_chain_returns_500() {
        let next = Next::new(vec![]);
        let res = next
            .run(make_ctx(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn terminal_handler_responds() {
        let chain = vec![terminal(|_ctx| async {
            Response::new(StatusCode::Ok).body("done")
        })];
        let res = Next::new(chain)
            .run(make_ctx(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(res.body_ref(), b"done");
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let chain = vec![
            from_middleware(Arc::new(RequestLog)),
            terminal(|_ctx| async { Response::new(StatusCode::Created) }),
        ];
        let res = Next::new(chain)
            .run(make_ctx(b"POST /api/entries HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(res.status(), StatusCode::Created);
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        struct Deny;
        impl Middleware for Deny {
            fn handle(
                &self,
                _ctx: Context,
                _next: Next,
            ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
                Box::pin(async { Response::new(StatusCode::MethodNotAllowed) })
            }
        }

        let chain = vec![
            from_middleware(Arc::new(Deny)),
            terminal(|_ctx| async { Response::new(StatusCode::Ok) }),
        ];
        let res = Next::new(chain)
            .run(make_ctx(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
    }
}
