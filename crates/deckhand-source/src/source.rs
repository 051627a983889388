//! Layer sources
//!
//! A source knows where one layer lives and how to fetch it. Sources never
//! merge or validate; they hand a parsed [`Layer`] to the caller.

use async_trait::async_trait;
use deckhand_core::{Layer, LayerOrigin};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{Result, SourceError};

/// Anything a layer can be loaded from
#[async_trait]
pub trait LayerSource: Send + Sync {
    /// Name given to the loaded layer
    fn name(&self) -> &str;

    /// Where the source points, for logs and errors
    fn location(&self) -> String;

    /// Fetch and parse the layer
    async fn fetch(&self) -> Result<Layer>;
}

fn parse_layer(name: &str, origin: LayerOrigin, content: &str) -> Result<Layer> {
    Layer::from_yaml(name, origin, content).map_err(|e| SourceError::Parse {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// A YAML values file on local disk
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
    origin: LayerOrigin,
}

impl FileSource {
    /// The layer is named after the path
    pub fn new(path: impl Into<PathBuf>, origin: LayerOrigin) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            path,
            origin,
        }
    }

    pub fn named(name: impl Into<String>, path: impl Into<PathBuf>, origin: LayerOrigin) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            origin,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LayerSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<Layer> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::io(&self.location(), e))?;
        parse_layer(&self.name, self.origin, &content)
    }
}

/// A values document served over HTTP (e.g. a configuration catalog)
#[derive(Debug, Clone)]
pub struct HttpSource {
    name: String,
    url: Url,
    origin: LayerOrigin,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(url: Url, origin: LayerOrigin) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("deckhand/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(url, origin, client))
    }

    /// Share a client (and its connection pool) between sources
    pub fn with_client(url: Url, origin: LayerOrigin, client: reqwest::Client) -> Self {
        Self {
            name: url.to_string(),
            url,
            origin,
            client,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl LayerSource for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> String {
        self.url.to_string()
    }

    async fn fetch(&self) -> Result<Layer> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound {
                location: self.location(),
            });
        }
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: self.location(),
            });
        }

        // JSON documents are valid YAML
        let body = response.text().await?;
        parse_layer(&self.name, self.origin, &body)
    }
}

/// An already-built layer
#[derive(Debug, Clone)]
pub struct InlineSource {
    layer: Layer,
}

impl InlineSource {
    pub fn new(layer: Layer) -> Self {
        Self { layer }
    }
}

#[async_trait]
impl LayerSource for InlineSource {
    fn name(&self) -> &str {
        self.layer.name()
    }

    fn location(&self) -> String {
        format!("inline:{}", self.layer.name())
    }

    async fn fetch(&self) -> Result<Layer> {
        Ok(self.layer.clone())
    }
}

/// Source for a `-f` argument: `http(s)://` URLs are fetched, anything
/// else is a local path
pub fn source_for(location: &str, origin: LayerOrigin) -> Result<Box<dyn LayerSource>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let url = Url::parse(location).map_err(|e| SourceError::InvalidLocation {
            location: location.to_string(),
            reason: e.to_string(),
        })?;
        return Ok(Box::new(HttpSource::new(url, origin)?));
    }

    if location.contains("://") {
        return Err(SourceError::InvalidLocation {
            location: location.to_string(),
            reason: "only http, https and local paths are supported".to_string(),
        });
    }

    Ok(Box::new(FileSource::new(location, origin)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_core::ConfigNode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prod.yaml");
        std::fs::write(&path, "replicaCount: 4\n").unwrap();

        let source = FileSource::named("production", &path, LayerOrigin::Profile);
        let layer = source.fetch().await.unwrap();

        assert_eq!(layer.name(), "production");
        assert_eq!(layer.origin(), LayerOrigin::Profile);
        assert_eq!(layer.get("replicaCount").and_then(ConfigNode::as_i64), Some(4));
    }

    #[tokio::test]
    async fn test_file_source_missing() {
        let source = FileSource::new("/nonexistent/values.yaml", LayerOrigin::Release);
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_file_source_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "- just\n- a list\n").unwrap();

        let err = FileSource::new(&path, LayerOrigin::Release).fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
        assert!(!err.retryable());
    }

    #[tokio::test]
    async fn test_inline_source() {
        let layer = Layer::from_yaml("inline", LayerOrigin::Inline, "a: 1\n").unwrap();
        let source = InlineSource::new(layer.clone());
        assert_eq!(source.fetch().await.unwrap(), layer);
        assert_eq!(source.location(), "inline:inline");
    }

    #[test]
    fn test_source_for() {
        let source = source_for("values/prod.yaml", LayerOrigin::Release).unwrap();
        assert_eq!(source.location(), "values/prod.yaml");

        let source = source_for("https://catalog.example.com/web/prod.yaml", LayerOrigin::Release).unwrap();
        assert_eq!(source.name(), "https://catalog.example.com/web/prod.yaml");

        let err = source_for("s3://bucket/prod.yaml", LayerOrigin::Release).err().unwrap();
        assert!(matches!(err, SourceError::InvalidLocation { .. }));
    }
}
