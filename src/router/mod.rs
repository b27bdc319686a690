//! Request routing — map URL patterns and HTTP methods to handler functions.
//!
//! [`Router`] dispatches incoming HTTP requests to handler functions based on
//! the request method and URL path. Three pattern styles are supported:
//!
//! | Pattern              | Example match       | Captured params   |
//! |----------------------|---------------------|-------------------|
//! | `/api/entries`       | `/api/entries`      | *(none)*          |
//! | `/api/entries/:id`   | `/api/entries/42`   | `id → "42"`       |
//! | `/*`                 | `/anything/at/all`  | `wildcard → "/anything/at/all"` |
//!
//! Trailing slashes are normalized on both patterns and incoming paths.
//! Routes are matched in registration order; the first route whose method and
//! pattern both match wins. The wildcard form exists for the SPA fallback the
//! ledger backend serves on unmatched GETs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and
/// returns a [`Response`].
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so they can be cloned and
/// shared across tasks. Use [`Router::get`] and friends rather than
/// constructing this type directly.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this automatically.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    // Matches one exact path string, e.g. `/api/entries`.
    Exact(String),
    // Fixed number of segments, some of which may be named captures.
    Parameterized { segments: Vec<Segment> },
    // Matches any path starting with the given prefix, e.g. `/*`.
    Wildcard(String),
}

impl Pattern {
    // Classification order: `/*` suffix → Wildcard, `:` anywhere →
    // Parameterized, otherwise Exact. Trailing slashes (other than root)
    // are stripped first so `/api/entries/` and `/api/entries` compile
    // identically.
    fn parse(pattern: &str) -> Self {
        let pattern = if pattern != "/" && pattern.ends_with('/') {
            &pattern[..pattern.len() - 1]
        } else {
            pattern
        };

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    if let Some(p) = s.strip_prefix(':') {
                        Segment::Parameter(p.to_string())
                    } else {
                        Segment::Static(s.to_string())
                    }
                })
                .collect();

            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    // Try to match `path` against this pattern, returning extracted
    // [`PathParams`] on success.
    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = if path != "/" && path.ends_with('/') {
            &path[..path.len() - 1]
        } else {
            path
        };

        match self {
            Pattern::Exact(p) => {
                if p == path {
                    Some(PathParams::new())
                } else {
                    None
                }
            }
            Pattern::Parameterized { segments } => {
                let mut params = PathParams::new();
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

                if segments.len() != path_segments.len() {
                    return None;
                }

                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) => {
                            if s != path_seg {
                                return None;
                            }
                        }
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }

                Some(params)
            }
            Pattern::Wildcard(prefix) => {
                if let Some(suffix) = path.strip_prefix(prefix.as_str()) {
                    let mut params = PathParams::new();
                    params.insert("wildcard".to_string(), suffix.to_string());
                    Some(params)
                } else {
                    None
                }
            }
        }
    }
}

// A single registered route binding a method + pattern to a handler.
struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    fn new(method: Method, pattern: &str, handler: Handler) -> Self {
        Self {
            method,
            pattern: Pattern::parse(pattern),
            handler,
        }
    }

    // `Some(params)` when both the method and the path pattern match.
    fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// HTTP request router that dispatches requests to registered handlers.
///
/// Routes are evaluated in registration order; when no route matches, a
/// `404 Not Found` response is returned.
///
/// # Examples
///
/// ```no_run
/// use ledgerd::{Router, Response, StatusCode};
/// use ledgerd::context::Context;
///
/// let mut router = Router::new();
///
/// router.get("/api/entries", |_ctx| async {
///     Response::new(StatusCode::Ok).body("[]")
/// });
///
/// router.delete("/api/entries/:id", |ctx: Context| async move {
///     let id = ctx.params().get("id").unwrap_or("?").to_owned();
///     Response::new(StatusCode::NoContent).body(id)
/// });
/// ```
pub struct Router {
    routes: Vec<Route>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a new, empty `Router`.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register a handler for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Register a handler for `DELETE` requests matching `path`.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    // Erase the concrete handler type and store it as a `Handler` trait object.
    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route::new(method, path, handler));
    }

    /// Return the number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch `request` to the first matching route and return its response.
    ///
    /// When no route matches, a `404 Not Found` response is returned.
    pub async fn route(&self, request: Request) -> Response {
        let path = request.path().to_owned();

        for route in &self.routes {
            if let Some(params) = route.matches(request.method(), &path) {
                let ctx = Context::with_params(request, params);
                return (route.handler)(ctx).await;
            }
        }

        Response::new(StatusCode::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    // ── Pattern ──────────────────────────────────────────────────────────────

    #[test]
    fn pattern_exact_match() {
        let pat = Pattern::parse("/api/entries");
        assert!(pat.matches("/api/entries").is_some());
        assert!(pat.matches("/api/entries/").is_some());
        assert!(pat.matches("/api/other").is_none());
    }

    #[test]
    fn pattern_root() {
        let pat = Pattern::parse("/");
        assert!(pat.matches("/").is_some());
        assert!(pat.matches("/other").is_none());
    }

    #[test]
    fn pattern_param_extracts_value() {
        let pat = Pattern::parse("/api/entries/:id");
        let params = pat.matches("/api/entries/42").unwrap();
        assert_eq!(params.get("id"), Some("42"));
    }

    #[test]
    fn pattern_param_segment_count_must_match() {
        let pat = Pattern::parse("/api/entries/:id");
        assert!(pat.matches("/api/entries").is_none());
        assert!(pat.matches("/api/entries/42/extra").is_none());
    }

    #[test]
    fn pattern_param_static_segments_must_match() {
        let pat = Pattern::parse("/api/entries/:id");
        assert!(pat.matches("/api/other/42").is_none());
    }

    #[test]
    fn pattern_wildcard_captures_suffix() {
        let pat = Pattern::parse("/*");
        let params = pat.matches("/app/anything").unwrap();
        assert_eq!(params.get("wildcard"), Some("/app/anything"));
    }

    // ── Router ───────────────────────────────────────────────────────────────

    #[test]
    fn router_starts_empty() {
        let router = Router::new();
        assert!(router.is_empty());
        assert_eq!(router.len(), 0);
    }

    #[tokio::test]
    async fn empty_router_returns_404() {
        let router = Router::new();
        let res = router.route(make_request("GET", "/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn method_mismatch_is_404() {
        let mut router = Router::new();
        router.get("/api/entries", |_ctx| async { Response::new(StatusCode::Ok) });
        let res = router.route(make_request("POST", "/api/entries")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/x", |_ctx| async { Response::new(StatusCode::Ok) });
        router.get("/x", |_ctx| async { Response::new(StatusCode::Created) });
        let res = router.route(make_request("GET", "/x")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn parameterized_route_receives_captures() {
        let mut router = Router::new();
        router.delete("/api/entries/:id", |ctx: Context| async move {
            let id = ctx.params().get("id").unwrap_or("").to_owned();
            Response::new(StatusCode::Ok).body(id)
        });
        let res = router.route(make_request("DELETE", "/api/entries/7")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), b"7");
    }

    #[tokio::test]
    async fn wildcard_fallback_matches_everything_under_prefix() {
        let mut router = Router::new();
        router.get("/api/entries", |_ctx| async { Response::new(StatusCode::Ok) });
        router.get("/*", |_ctx| async {
            Response::new(StatusCode::Ok).body("fallback")
        });
        let res = router.route(make_request("GET", "/some/deep/page")).await;
        assert_eq!(res.body_ref(), b"fallback");
        // registration order still sends the API route to its handler
        let res = router.route(make_request("GET", "/api/entries")).await;
        assert!(res.body_ref().is_empty());
    }
}
