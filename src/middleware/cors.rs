//! Cross-Origin Resource Sharing.
//!
//! The ledger page is served from one origin and talks to the entry-store
//! API on another, so every API response needs `Access-Control-*` headers
//! and `OPTIONS` preflights must be answered without reaching a handler.

use std::future::Future;
use std::pin::Pin;

use crate::{
    Method, Response, StatusCode,
    context::Context,
    middleware::{Middleware, Next},
};

/// CORS middleware — validates the `Origin` header, answers preflight
/// requests, and injects `Access-Control-*` headers on actual responses.
///
/// # Behavior
///
/// - No `Origin` header, or an origin not in the allow-list: the request
///   passes through unmodified.
/// - `OPTIONS` preflights short-circuit with `204 No Content` and the
///   `Access-Control-*` headers; the downstream handler is not called.
/// - All other requests run normally and the CORS headers are appended to
///   the response. When a specific (non-wildcard) origin is echoed back, a
///   `Vary: Origin` header is added so caches key on the origin.
///
/// # Examples
///
/// ```
/// use ledgerd::middleware::Cors;
///
/// // The defaults mirror a bare `cors()`: every origin, the entry-store verbs.
/// let permissive = Cors::new();
/// let locked = Cors::new().allow_origin("https://ledger.example.com");
/// ```
pub struct Cors {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
}

impl Default for Cors {
    fn default() -> Self {
        Self::new()
    }
}

impl Cors {
    /// Creates a permissive policy: all origins, the methods the entry store
    /// serves, and the `Content-Type` header the client sends with JSON.
    pub fn new() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "DELETE".to_string(),
            ],
            allowed_headers: vec!["Content-Type".to_string()],
        }
    }

    /// Adds an allowed origin. The first non-wildcard origin added replaces
    /// the default `*`.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.retain(|o| o != "*");
        self.allowed_origins.push(origin.into());
        self
    }

    /// Adds an allowed HTTP method, sent verbatim in
    /// `Access-Control-Allow-Methods`.
    #[must_use]
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowed_methods.push(method.into());
        self
    }

    /// Adds an allowed request header, sent verbatim in
    /// `Access-Control-Allow-Headers`.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.push(header.into());
        self
    }
}

impl Middleware for Cors {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let allowed_origins = self.allowed_origins.clone();
        let methods_str = self.allowed_methods.join(", ");
        let headers_str = self.allowed_headers.join(", ");

        Box::pin(async move {
            let request_origin = ctx.request().headers().get("origin").map(str::to_owned);
            let is_preflight = ctx.request().method() == &Method::Options;

            let Some(origin) = request_origin else {
                return next.run(ctx).await;
            };

            let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
                "*".to_owned()
            } else if allowed_origins.contains(&origin) {
                origin
            } else {
                return next.run(ctx).await;
            };

            let is_wildcard = allow_origin == "*";

            if is_preflight {
                let mut resp = Response::new(StatusCode::NoContent)
                    .header("Access-Control-Allow-Origin", &allow_origin)
                    .header("Access-Control-Allow-Methods", &methods_str)
                    .header("Access-Control-Allow-Headers", &headers_str)
                    .header("Access-Control-Max-Age", "3600");
                if !is_wildcard {
                    resp.add_header("Vary", "Origin");
                }
                return resp;
            }

            let mut resp = next.run(ctx).await;
            resp.add_header("Access-Control-Allow-Origin", &allow_origin);
            resp.add_header("Access-Control-Allow-Methods", &methods_str);
            resp.add_header("Access-Control-Allow-Headers", &headers_str);
            if !is_wildcard {
                resp.add_header("Vary", "Origin");
            }
            resp
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::Request;
    use crate::middleware::{from_middleware, terminal};

    fn make_ctx(raw: &str) -> Context {
        Context::new(Request::parse(raw.as_bytes()).unwrap().0)
    }

    fn chain(cors: Cors) -> Vec<crate::middleware::MiddlewareHandler> {
        vec![
            from_middleware(Arc::new(cors)),
            terminal(|_ctx| async { Response::new(StatusCode::Ok).body("api") }),
        ]
    }

    #[tokio::test]
    async fn no_origin_passes_through_untouched() {
        let res = Next::new(chain(Cors::new()))
            .run(make_ctx("GET /api/entries HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(res.headers().get("access-control-allow-origin"), None);
    }

    #[tokio::test]
    async fn wildcard_origin_is_echoed_as_star() {
        let res = Next::new(chain(Cors::new()))
            .run(make_ctx(
                "GET /api/entries HTTP/1.1\r\nHost: x\r\nOrigin: http://page.local\r\n\r\n",
            ))
            .await;
        assert_eq!(res.headers().get("access-control-allow-origin"), Some("*"));
        assert_eq!(res.headers().get("vary"), None);
        assert_eq!(res.body_ref(), b"api");
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let res = Next::new(chain(Cors::new()))
            .run(make_ctx(
                "OPTIONS /api/entries HTTP/1.1\r\nHost: x\r\nOrigin: http://page.local\r\n\r\n",
            ))
            .await;
        assert_eq!(res.status(), StatusCode::NoContent);
        assert!(res.body_ref().is_empty());
        assert!(
            res.headers()
                .get("access-control-allow-methods")
                .unwrap()
                .contains("DELETE")
        );
    }

    #[tokio::test]
    async fn specific_origin_gets_vary_header() {
        let cors = Cors::new().allow_origin("http://page.local");
        let res = Next::new(chain(cors))
            .run(make_ctx(
                "GET /api/entries HTTP/1.1\r\nHost: x\r\nOrigin: http://page.local\r\n\r\n",
            ))
            .await;
        assert_eq!(
            res.headers().get("access-control-allow-origin"),
            Some("http://page.local")
        );
        assert_eq!(res.headers().get("vary"), Some("Origin"));
    }

    #[tokio::test]
    async fn rejected_origin_passes_through_without_headers() {
        let cors = Cors::new().allow_origin("http://page.local");
        let res = Next::new(chain(cors))
            .run(make_ctx(
                "GET /api/entries HTTP/1.1\r\nHost: x\r\nOrigin: http://evil.local\r\n\r\n",
            ))
            .await;
        assert_eq!(res.headers().get("access-control-allow-origin"), None);
        assert_eq!(res.body_ref(), b"api");
    }
}
