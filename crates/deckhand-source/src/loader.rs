//! Concurrent, cancellable layer loading

use deckhand_core::Layer;
use futures::future::try_join_all;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SourceError};
use crate::source::LayerSource;

/// Timeout and retry policy for a load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Limit for a single fetch attempt
    pub timeout: Duration,

    /// Extra attempts after a retryable failure
    pub retries: u32,

    /// Delay before the first retry; doubled for each further retry
    pub backoff: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 2,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Loads layers from their sources
///
/// Sources are fetched concurrently; the returned layers keep the order the
/// sources were given in. Any failure fails the whole load.
#[derive(Debug, Clone, Default)]
pub struct LayerLoader {
    config: LoaderConfig,
    cancel: CancellationToken,
}

impl LayerLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the load when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Token that aborts every in-flight and future load of this loader
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Load every source, in order
    pub async fn load_all(&self, sources: &[Box<dyn LayerSource>]) -> Result<Vec<Layer>> {
        let layers = try_join_all(sources.iter().map(|s| self.load(s.as_ref()))).await?;
        tracing::debug!(layers = layers.len(), "loaded value layers");
        Ok(layers)
    }

    /// Load one source, retrying retryable failures
    pub async fn load(&self, source: &dyn LayerSource) -> Result<Layer> {
        let mut attempt: u32 = 0;

        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SourceError::Cancelled),
                res = tokio::time::timeout(self.config.timeout, source.fetch()) => match res {
                    Ok(fetched) => fetched,
                    Err(_) => Err(SourceError::Timeout {
                        name: source.name().to_string(),
                        after: self.config.timeout,
                    }),
                },
            };

            match result {
                Ok(layer) => {
                    tracing::debug!(source = %source.location(), attempt, "loaded layer");
                    return Ok(layer);
                }
                Err(err) if err.retryable() && attempt < self.config.retries => {
                    let delay = self.config.backoff.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    tracing::warn!(
                        source = %source.location(),
                        attempt,
                        error = %err,
                        "retrying layer source in {:?}",
                        delay
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(SourceError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}
