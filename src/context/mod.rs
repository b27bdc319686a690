//! Per-request context passed to route handlers and middleware.

use std::collections::HashMap;

use crate::Request;

/// Path parameters extracted from the matched route pattern.
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    /// Create an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a captured parameter.
    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    /// Look up a captured parameter by name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }
}

/// Per-request context: the parsed request plus router captures.
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    /// Create a context with no path parameters.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            params: PathParams::new(),
        }
    }

    /// Create a context carrying the captures of a matched route.
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Consumes the context, yielding the request back. Used at the bottom
    /// of a middleware chain to hand the request to a router, which builds
    /// its own context from the matched route.
    pub fn into_request(self) -> Request {
        self.request
    }

    /// Deserialize the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &[u8]) -> Request {
        Request::parse(raw).unwrap().0
    }

    #[test]
    fn params_round_trip() {
        let mut params = PathParams::new();
        params.insert("id".into(), "7".into());
        let ctx = Context::with_params(
            parse(b"DELETE /api/entries/7 HTTP/1.1\r\nHost: x\r\n\r\n"),
            params,
        );
        assert_eq!(ctx.params().get("id"), Some("7"));
        assert_eq!(ctx.params().get("missing"), None);
    }

    #[test]
    fn json_body() {
        let raw =
            b"POST /api/entries HTTP/1.1\r\nHost: x\r\nContent-Length: 27\r\n\r\n{\"title\":\"rent\",\"amount\":5}";
        let ctx = Context::new(parse(raw));
        let value: serde_json::Value = ctx.json().unwrap();
        assert_eq!(value["title"], "rent");
    }
}
