use std::time::Duration;

use tracing::warn;

use crate::fallback::FallbackPolicy;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Base URL of the trading backend REST API (no trailing slash needed).
    pub api_base_url: String,

    /// Base URL of the public market-data API used as the secondary
    /// price source.
    pub public_prices_url: String,

    /// Default per-request timeout applied by the HTTP client.
    ///
    /// Individual fetches may override it through `FetchParams::timeout`.
    pub request_timeout: Duration,

    // =========================
    // Poll intervals
    // =========================
    /// Notification list / unread badge.
    pub notifications_every: Duration,

    /// Spot price ticker.
    pub prices_every: Duration,

    /// Wallet balances.
    pub balances_every: Duration,

    /// Support / trade chat messages.
    pub chat_every: Duration,

    /// Market tickers (slower moving, heavier payload).
    pub tickers_every: Duration,

    // =========================
    // Degradation
    // =========================
    /// What price pollers do when the backend is unavailable.
    ///
    /// Applied uniformly to every price-like resource:
    /// - `Secondary` → try the public market-data API
    /// - `StaleOnly` → keep showing the last good prices
    pub price_fallback: FallbackPolicy,

    /// Emit JSON log lines instead of pretty output.
    pub json_logs: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            public_prices_url: "https://api.coingecko.com/api/v3".to_string(),
            request_timeout: Duration::from_millis(8_000),

            notifications_every: Duration::from_secs(10),
            prices_every: Duration::from_secs(10),
            balances_every: Duration::from_secs(15),
            chat_every: Duration::from_secs(10),
            tickers_every: Duration::from_secs(30),

            price_fallback: FallbackPolicy::Secondary,
            json_logs: false,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset or unparsable
    /// values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();

        let ms = |key: &str, default: Duration| -> Duration {
            match lookup(key) {
                None => default,
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(v) if v > 0 => Duration::from_millis(v),
                    _ => {
                        warn!(key, value = %raw, "invalid duration in env; using default");
                        default
                    }
                },
            }
        };

        let price_fallback = match lookup("LIVESYNC_PRICE_FALLBACK") {
            None => d.price_fallback,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = %raw, "unknown price fallback policy; using default");
                d.price_fallback
            }),
        };

        Self {
            api_base_url: lookup("LIVESYNC_API_URL").unwrap_or(d.api_base_url),
            public_prices_url: lookup("LIVESYNC_PUBLIC_PRICES_URL")
                .unwrap_or(d.public_prices_url),
            request_timeout: ms("LIVESYNC_REQUEST_TIMEOUT_MS", d.request_timeout),

            notifications_every: ms("LIVESYNC_NOTIFICATIONS_MS", d.notifications_every),
            prices_every: ms("LIVESYNC_PRICES_MS", d.prices_every),
            balances_every: ms("LIVESYNC_BALANCES_MS", d.balances_every),
            chat_every: ms("LIVESYNC_CHAT_MS", d.chat_every),
            tickers_every: ms("LIVESYNC_TICKERS_MS", d.tickers_every),

            price_fallback,
            json_logs: lookup("APP_ENV").is_some_and(|v| v == "production"),
        }
    }
}
