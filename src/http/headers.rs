//! HTTP header map with case-insensitive name lookup.

use std::fmt;

/// A case-insensitive, order-preserving HTTP header map.
///
/// Multiple values per name are allowed, matching HTTP/1.1 field semantics
/// (RFC 9110 §5.3). Lookups compare names ASCII-case-insensitively.
///
/// # Examples
///
/// ```
/// use ledgerd::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.append("Content-Type", "application/json");
/// headers.append("X-Tag", "a");
/// headers.append("X-Tag", "b");
///
/// assert_eq!(headers.get("content-type"), Some("application/json"));
/// assert_eq!(headers.get_all("x-tag").collect::<Vec<_>>(), vec!["a", "b"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry, keeping any existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Sets a header to a single value, dropping any previous values for the
    /// same name. Used by the proxy to rewrite hop-by-hop fields like
    /// `Host` and `Connection` before forwarding.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// Returns the first value for `name` (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `name` (case-insensitive), in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries named `name` (case-insensitive).
    ///
    /// Returns `true` if anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.entries.len() < before
    }

    /// Returns `true` if at least one entry is named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the number of entries (not distinct names).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.append("Content-Type", "application/json");
        assert_eq!(h.get("content-type"), Some("application/json"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn append_preserves_multiple_values() {
        let mut h = Headers::new();
        h.append("Set-Cookie", "a=1");
        h.append("Set-Cookie", "b=2");
        assert_eq!(h.get_all("set-cookie").collect::<Vec<_>>(), vec!["a=1", "b=2"]);
        // `get` returns the first
        assert_eq!(h.get("set-cookie"), Some("a=1"));
    }

    #[test]
    fn set_replaces_all_values() {
        let mut h = Headers::new();
        h.append("Connection", "keep-alive");
        h.append("connection", "upgrade");
        h.set("Connection", "close");
        assert_eq!(h.get_all("connection").collect::<Vec<_>>(), vec!["close"]);
    }

    #[test]
    fn remove_clears_every_entry_for_name() {
        let mut h = Headers::new();
        h.append("X-Tag", "a");
        h.append("x-tag", "b");
        assert!(h.remove("X-TAG"));
        assert!(h.is_empty());
        assert!(!h.remove("x-tag"));
    }

    #[test]
    fn contains_and_len() {
        let mut h = Headers::new();
        h.append("Host", "localhost");
        assert!(h.contains("host"));
        assert!(!h.contains("x-missing"));
        assert_eq!(h.len(), 1);
    }
}
