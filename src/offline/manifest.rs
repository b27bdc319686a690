//! The offline manifest: one version string, the assets it pre-fetches,
//! and the designated fallback document.
//!
//! The manifest is explicit configuration handed to the worker at
//! construction. Changing [`version`](OfflineManifest::version) is the sole
//! mechanism that triggers cache-generation rotation; the asset list and the
//! fallback have no behavior of their own.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Manifest validation and loading errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest version must not be empty")]
    EmptyVersion,

    #[error("manifest lists no assets")]
    NoAssets,

    #[error("fallback asset {0:?} is not in the asset list")]
    FallbackNotListed(String),

    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed manifest file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Versioned pre-fetch configuration for the offline worker.
///
/// # Examples
///
/// ```
/// use ledgerd::offline::OfflineManifest;
///
/// let manifest = OfflineManifest::new(
///     "ledger-cache-v2",
///     ["/", "/app.html", "/manifest.json"],
///     "/app.html",
/// )
/// .unwrap();
///
/// assert_eq!(manifest.version(), "ledger-cache-v2");
/// assert_eq!(manifest.fallback_asset(), "/app.html");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineManifest {
    version: String,
    assets: Vec<String>,
    fallback_asset: String,
}

impl OfflineManifest {
    /// Builds a manifest, validating that the version is non-empty and the
    /// fallback document is one of the listed assets.
    pub fn new(
        version: impl Into<String>,
        assets: impl IntoIterator<Item = impl Into<String>>,
        fallback_asset: impl Into<String>,
    ) -> Result<Self, ManifestError> {
        let manifest = Self {
            version: version.into(),
            assets: assets.into_iter().map(Into::into).collect(),
            fallback_asset: fallback_asset.into(),
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Loads and validates a manifest from a JSON file.
    ///
    /// The file mirrors the struct:
    ///
    /// ```json
    /// {
    ///   "version": "ledger-cache-v2",
    ///   "assets": ["/", "/app.html", "/manifest.json"],
    ///   "fallback_asset": "/app.html"
    /// }
    /// ```
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let raw = tokio::fs::read(path.as_ref()).await?;
        let manifest: Self = serde_json::from_slice(&raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if self.version.is_empty() {
            return Err(ManifestError::EmptyVersion);
        }
        if self.assets.is_empty() {
            return Err(ManifestError::NoAssets);
        }
        if !self.assets.contains(&self.fallback_asset) {
            return Err(ManifestError::FallbackNotListed(
                self.fallback_asset.clone(),
            ));
        }
        Ok(())
    }

    /// The cache generation this manifest names.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The assets fetched and stored unconditionally during install, in order.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// The asset substituted for a failed network read with no cache hit.
    pub fn fallback_asset(&self) -> &str {
        &self.fallback_asset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_manifest() {
        let m = OfflineManifest::new("v1", ["/", "/app.html"], "/app.html").unwrap();
        assert_eq!(m.assets().len(), 2);
    }

    #[test]
    fn fallback_must_be_listed() {
        let err = OfflineManifest::new("v1", ["/"], "/app.html").unwrap_err();
        assert!(matches!(err, ManifestError::FallbackNotListed(f) if f == "/app.html"));
    }

    #[test]
    fn version_must_not_be_empty() {
        let err = OfflineManifest::new("", ["/"], "/").unwrap_err();
        assert!(matches!(err, ManifestError::EmptyVersion));
    }

    #[test]
    fn assets_must_not_be_empty() {
        let err = OfflineManifest::new("v1", Vec::<String>::new(), "/").unwrap_err();
        assert!(matches!(err, ManifestError::NoAssets));
    }

    #[tokio::test]
    async fn load_validates_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        tokio::fs::write(
            &path,
            r#"{"version":"v2","assets":["/","/app.html"],"fallback_asset":"/app.html"}"#,
        )
        .await
        .unwrap();
        let m = OfflineManifest::load(&path).await.unwrap();
        assert_eq!(m.version(), "v2");

        tokio::fs::write(
            &path,
            r#"{"version":"v2","assets":["/"],"fallback_asset":"/app.html"}"#,
        )
        .await
        .unwrap();
        assert!(matches!(
            OfflineManifest::load(&path).await,
            Err(ManifestError::FallbackNotListed(_))
        ));
    }
}
