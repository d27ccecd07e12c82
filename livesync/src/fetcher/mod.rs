pub mod client;
pub mod envelope;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ActionError, FetchError};

pub use client::{EnvelopeFetcher, HttpClient};
pub use envelope::{Envelope, PayloadShape};
pub use types::*;

/// One request/response cycle against a named source.
///
/// Implementations return data to the caller and never touch view state.
/// They do not retry: the next poll tick is the retry.
#[async_trait]
pub trait ResourceFetcher<T: Send + 'static>: Send + Sync {
    async fn fetch(&self, params: &FetchParams) -> Result<T, FetchError>;

    /// Short label for logs and `Snapshot::source`.
    fn source(&self) -> &str;

    /// Like `fetch`, but also reports which source actually served the payload.
    async fn fetch_served(&self, params: &FetchParams) -> Result<Served<T>, FetchError> {
        let payload = self.fetch(params).await?;
        Ok(Served {
            payload,
            source: self.source().to_string(),
        })
    }
}

/// Sends user-initiated commands. Errors here are surfaced to the caller.
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn post(&self, path: &str, body: Value) -> Result<Envelope, ActionError>;
}

#[async_trait]
impl CommandSender for HttpClient {
    async fn post(&self, path: &str, body: Value) -> Result<Envelope, ActionError> {
        self.post_envelope(path, &body).await
    }
}
