use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::fetcher::{FetchParams, ResourceFetcher, Served};
use crate::metrics::Counters;

/// What a poller shows when its primary source is unavailable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Ask a secondary source (e.g. a public market-data API).
    #[default]
    Secondary,
    /// Keep the last good data and retry on the next tick.
    StaleOnly,
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "secondary" => Ok(FallbackPolicy::Secondary),
            "stale" | "stale-only" | "stale_only" => Ok(FallbackPolicy::StaleOnly),
            other => Err(format!("unknown fallback policy: {other}")),
        }
    }
}

/// Primary fetcher with an optional secondary behind it.
///
/// If both fail, the primary's error is reported so the caller sees why
/// the main source is down.
pub struct FallbackFetcher<T: Send + 'static> {
    primary: Arc<dyn ResourceFetcher<T>>,
    secondary: Option<Arc<dyn ResourceFetcher<T>>>,
    policy: FallbackPolicy,
    counters: Counters,
}

impl<T: Send + 'static> FallbackFetcher<T> {
    pub fn new(
        primary: Arc<dyn ResourceFetcher<T>>,
        secondary: Option<Arc<dyn ResourceFetcher<T>>>,
        policy: FallbackPolicy,
        counters: Counters,
    ) -> Self {
        Self {
            primary,
            secondary,
            policy,
            counters,
        }
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }
}

#[async_trait]
impl<T: Send + 'static> ResourceFetcher<T> for FallbackFetcher<T> {
    async fn fetch(&self, params: &FetchParams) -> Result<T, FetchError> {
        self.fetch_served(params).await.map(|s| s.payload)
    }

    fn source(&self) -> &str {
        self.primary.source()
    }

    async fn fetch_served(&self, params: &FetchParams) -> Result<Served<T>, FetchError> {
        let primary_err = match self.primary.fetch_served(params).await {
            Ok(served) => return Ok(served),
            Err(e) => e,
        };

        let secondary = match (self.policy, &self.secondary) {
            (FallbackPolicy::Secondary, Some(s)) => s,
            _ => {
                debug!(error = %primary_err, "primary failed; no fallback configured");
                return Err(primary_err);
            }
        };

        warn!(
            primary = self.primary.source(),
            secondary = secondary.source(),
            error = %primary_err,
            "primary source failed; falling back"
        );

        match secondary.fetch_served(params).await {
            Ok(served) => {
                Counters::incr(&self.counters.fallbacks_used, 1);
                Ok(served)
            }
            Err(e) => {
                warn!(error = %e, "secondary source failed too");
                Err(primary_err)
            }
        }
    }
}
