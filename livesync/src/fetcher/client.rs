use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{ActionError, FetchError};
use crate::fetcher::envelope::Envelope;
use crate::fetcher::types::{Endpoint, FetchParams};
use crate::fetcher::ResourceFetcher;
use crate::session::SessionContext;

/// Thin reqwest wrapper for the trading backend.
#[derive(Clone)]
pub struct HttpClient {
    http: Client,
    base_url: String,
    session: Option<SessionContext>,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: None,
        })
    }

    /// Attaches the session whose bearer token is sent with every request.
    pub fn with_session(mut self, session: SessionContext) -> Self {
        self.session = Some(session);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.session.as_ref().and_then(SessionContext::bearer) {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// GET an absolute third-party URL and return the body as untyped JSON.
    ///
    /// Never carries the session's bearer token; only backend requests do.
    #[instrument(skip(self, query), level = "debug")]
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<Value, FetchError> {
        self.send_json(self.http.get(url).query(query), timeout).await
    }

    async fn send_json(
        &self,
        mut req: RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<Value, FetchError> {
        if let Some(t) = timeout {
            req = req.timeout(t);
        }

        let resp = req.send().await?.error_for_status()?;
        let body: Value = resp.json().await?;
        Ok(body)
    }

    #[instrument(
        skip(self, endpoint, params),
        fields(endpoint = %endpoint),
        level = "debug"
    )]
    pub async fn get_envelope(
        &self,
        endpoint: &Endpoint,
        params: &FetchParams,
    ) -> Result<Envelope, FetchError> {
        let path = endpoint
            .path(params)
            .ok_or_else(|| FetchError::MissingSubject(endpoint.to_string()))?;
        let url = format!("{}{}", self.base_url, path);

        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(tf) = params.timeframe.as_deref() {
            query.push(("timeframe", tf));
        }

        let req = self.authorize(self.http.get(&url)).query(&query);
        let body = self.send_json(req, params.timeout).await?;
        let envelope = Envelope::parse(body)?;

        debug!(success = envelope.is_success(), "envelope received");
        Ok(envelope)
    }

    /// POST a command. Unlike polling, a `success: false` reply is an error
    /// the caller must see.
    #[instrument(skip(self, body), level = "debug")]
    pub async fn post_envelope(&self, path: &str, body: &Value) -> Result<Envelope, ActionError> {
        let url = format!("{}{}", self.base_url, path);

        let resp = self
            .authorize(self.http.post(&url))
            .json(body)
            .send()
            .await
            .map_err(FetchError::from)?
            .error_for_status()
            .map_err(FetchError::from)?;

        let raw: Value = resp.json().await.map_err(FetchError::from)?;
        let envelope = Envelope::parse(raw)?;

        if !envelope.is_success() {
            return Err(ActionError::Rejected(
                envelope.message().unwrap_or("no message").to_string(),
            ));
        }

        Ok(envelope)
    }
}

/// Fetches a list payload out of a backend envelope.
pub struct EnvelopeFetcher<T> {
    client: HttpClient,
    endpoint: Endpoint,
    payload_key: &'static str,
    _item: PhantomData<fn() -> T>,
}

impl<T> EnvelopeFetcher<T> {
    pub fn new(client: HttpClient, endpoint: Endpoint, payload_key: &'static str) -> Self {
        Self {
            client,
            endpoint,
            payload_key,
            _item: PhantomData,
        }
    }
}

#[async_trait]
impl<T> ResourceFetcher<Vec<T>> for EnvelopeFetcher<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<T>, FetchError> {
        let envelope = self.client.get_envelope(&self.endpoint, params).await?;
        let items: Vec<T> = envelope.list(self.payload_key)?;

        debug!(endpoint = %self.endpoint, count = items.len(), "payload decoded");
        Ok(items)
    }

    fn source(&self) -> &str {
        "backend"
    }
}
