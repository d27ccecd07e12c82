use std::fmt;
use std::time::Duration;

/// Named backend resource. Paths are relative to `SyncConfig::api_base_url`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `/notifications/{user_id}`
    Notifications,
    /// `/wallet/{user_id}/balances`
    Balances,
    /// `/prices`
    Prices,
    /// `/market/tickers`
    Tickers,
    /// `/chat/{trade_id}/messages`
    ChatMessages,
    /// Arbitrary path, no subject segment.
    Custom(String),
}

impl Endpoint {
    pub fn name(&self) -> &str {
        match self {
            Endpoint::Notifications => "notifications",
            Endpoint::Balances => "balances",
            Endpoint::Prices => "prices",
            Endpoint::Tickers => "tickers",
            Endpoint::ChatMessages => "chat",
            Endpoint::Custom(path) => path,
        }
    }

    /// Identifier the resource is polled for, or `None` when a required
    /// id is missing (the resource must not be polled then).
    ///
    /// Global resources report `"global"`.
    pub fn subject(&self, params: &FetchParams) -> Option<String> {
        match self {
            Endpoint::Notifications | Endpoint::Balances => params.user_id.clone(),
            Endpoint::ChatMessages => params.trade_id.clone(),
            Endpoint::Prices | Endpoint::Tickers | Endpoint::Custom(_) => {
                Some("global".to_string())
            }
        }
    }

    pub fn path(&self, params: &FetchParams) -> Option<String> {
        let path = match self {
            Endpoint::Notifications => format!("/notifications/{}", params.user_id.as_ref()?),
            Endpoint::Balances => format!("/wallet/{}/balances", params.user_id.as_ref()?),
            Endpoint::Prices => "/prices".to_string(),
            Endpoint::Tickers => "/market/tickers".to_string(),
            Endpoint::ChatMessages => format!("/chat/{}/messages", params.trade_id.as_ref()?),
            Endpoint::Custom(path) => path.clone(),
        };
        Some(path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters identifying the subject of a fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchParams {
    pub user_id: Option<String>,
    pub trade_id: Option<String>,
    pub timeframe: Option<String>,
    /// Overrides the client's default timeout for this request.
    pub timeout: Option<Duration>,
}

impl FetchParams {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn for_trade(trade_id: impl Into<String>) -> Self {
        Self {
            trade_id: Some(trade_id.into()),
            ..Self::default()
        }
    }

    pub fn with_timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = Some(timeframe.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A payload plus the label of the source that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Served<T> {
    pub payload: T,
    pub source: String,
}
