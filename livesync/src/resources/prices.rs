use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::FetchError;
use crate::fallback::{FallbackFetcher, FallbackPolicy};
use crate::fetcher::{Endpoint, EnvelopeFetcher, FetchParams, HttpClient, ResourceFetcher};
use crate::metrics::Counters;
use crate::resource::{ApplyReport, Snapshot, SyncState};
use crate::scheduler::Subscription;

/// Coins shown by the ticker: public API id → display symbol.
pub const DEFAULT_COINS: &[(&str, &str)] = &[
    ("bitcoin", "BTC"),
    ("ethereum", "ETH"),
    ("tether", "USDT"),
    ("binancecoin", "BNB"),
    ("solana", "SOL"),
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    #[serde(alias = "price")]
    pub price_usd: f64,
    #[serde(default, alias = "change24h")]
    pub change_24h: f64,
}

impl PriceQuote {
    fn is_usable(&self) -> bool {
        self.price_usd.is_finite() && self.price_usd > 0.0
    }
}

/// Current quotes by symbol.
///
/// A fresh payload decides which symbols are listed, but a zero or missing
/// price never replaces a known good one: the ticker would rather show a
/// slightly old price than a blank.
#[derive(Debug, Default)]
pub struct PriceBoard {
    quotes: BTreeMap<String, PriceQuote>,
}

impl PriceBoard {
    pub fn get(&self, symbol: &str) -> Option<&PriceQuote> {
        self.quotes.get(symbol)
    }
}

impl SyncState for PriceBoard {
    type Payload = Vec<PriceQuote>;
    type View = Vec<PriceQuote>;

    fn apply_fresh(&mut self, payload: Vec<PriceQuote>) -> ApplyReport {
        let mut next = BTreeMap::new();
        for q in payload {
            if q.is_usable() {
                next.insert(q.symbol.clone(), q);
            } else if let Some(prev) = self.quotes.get(&q.symbol) {
                debug!(symbol = %q.symbol, "unusable price; keeping previous quote");
                next.insert(q.symbol.clone(), prev.clone());
            }
        }
        self.quotes = next;
        ApplyReport::default()
    }

    fn view(&self) -> Vec<PriceQuote> {
        self.quotes.values().cloned().collect()
    }
}

/// Secondary source: public market-data API (`/simple/price`).
pub struct PublicPriceFetcher {
    client: HttpClient,
    base_url: String,
    coins: Vec<(String, String)>,
}

impl PublicPriceFetcher {
    pub fn new(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            coins: DEFAULT_COINS
                .iter()
                .map(|(id, sym)| (id.to_string(), sym.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl ResourceFetcher<Vec<PriceQuote>> for PublicPriceFetcher {
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<PriceQuote>, FetchError> {
        let url = format!("{}/simple/price", self.base_url);
        let ids = self
            .coins
            .iter()
            .map(|(id, _)| id.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let body = self
            .client
            .get_json(
                &url,
                &[
                    ("ids", ids.as_str()),
                    ("vs_currencies", "usd"),
                    ("include_24hr_change", "true"),
                ],
                params.timeout,
            )
            .await?;

        parse_public_prices(&body, &self.coins)
    }

    fn source(&self) -> &str {
        "public"
    }
}

/// `{"bitcoin": {"usd": 64000.0, "usd_24h_change": -1.2}, ...}` → quotes.
/// Coins missing from the body are skipped; a body with none of them is
/// malformed.
pub fn parse_public_prices(
    body: &Value,
    coins: &[(String, String)],
) -> Result<Vec<PriceQuote>, FetchError> {
    let obj = body
        .as_object()
        .ok_or_else(|| FetchError::malformed("public price body is not an object"))?;

    let quotes: Vec<PriceQuote> = coins
        .iter()
        .filter_map(|(id, symbol)| {
            let entry = obj.get(id)?;
            let price = entry.get("usd")?.as_f64()?;
            let change = entry
                .get("usd_24h_change")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            Some(PriceQuote {
                symbol: symbol.clone(),
                price_usd: price,
                change_24h: change,
            })
        })
        .collect();

    if quotes.is_empty() {
        return Err(FetchError::malformed("public price body has no known coins"));
    }
    Ok(quotes)
}

/// Price ticker (spot prices or market tickers) with the configured
/// degradation policy.
pub struct PriceTicker {
    sub: Subscription<PriceBoard>,
    params: FetchParams,
}

impl PriceTicker {
    /// Spot prices from `/prices`, every `prices_every`.
    pub fn spot(client: HttpClient, cfg: &SyncConfig, counters: Counters) -> Self {
        let primary = Arc::new(EnvelopeFetcher::<PriceQuote>::new(
            client.clone(),
            Endpoint::Prices,
            "prices",
        ));
        let fetcher = Self::degrade(primary, client, cfg, &counters);
        Self::with_fetcher(
            Endpoint::Prices,
            fetcher,
            cfg.prices_every,
            FetchParams::default(),
            counters,
        )
    }

    /// Market tickers from `/market/tickers?timeframe=..`, every `tickers_every`.
    pub fn market(
        client: HttpClient,
        cfg: &SyncConfig,
        timeframe: &str,
        counters: Counters,
    ) -> Self {
        let primary = Arc::new(EnvelopeFetcher::<PriceQuote>::new(
            client.clone(),
            Endpoint::Tickers,
            "tickers",
        ));
        let fetcher = Self::degrade(primary, client, cfg, &counters);
        Self::with_fetcher(
            Endpoint::Tickers,
            fetcher,
            cfg.tickers_every,
            FetchParams::default().with_timeframe(timeframe),
            counters,
        )
    }

    fn degrade(
        primary: Arc<dyn ResourceFetcher<Vec<PriceQuote>>>,
        client: HttpClient,
        cfg: &SyncConfig,
        counters: &Counters,
    ) -> Arc<dyn ResourceFetcher<Vec<PriceQuote>>> {
        let secondary: Option<Arc<dyn ResourceFetcher<Vec<PriceQuote>>>> =
            match cfg.price_fallback {
                FallbackPolicy::Secondary => Some(Arc::new(PublicPriceFetcher::new(
                    client,
                    cfg.public_prices_url.clone(),
                ))),
                FallbackPolicy::StaleOnly => None,
            };

        Arc::new(FallbackFetcher::new(
            primary,
            secondary,
            cfg.price_fallback,
            counters.clone(),
        ))
    }

    pub fn with_fetcher(
        endpoint: Endpoint,
        fetcher: Arc<dyn ResourceFetcher<Vec<PriceQuote>>>,
        every: Duration,
        params: FetchParams,
        counters: Counters,
    ) -> Self {
        Self {
            sub: Subscription::new(endpoint, fetcher, every, counters),
            params,
        }
    }

    pub fn start(&mut self) -> bool {
        self.sub.activate(self.params.clone())
    }

    pub fn stop(&mut self) {
        self.sub.deactivate();
    }

    pub fn snapshot(&self) -> Snapshot<Vec<PriceQuote>> {
        self.sub.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<Vec<PriceQuote>>> {
        self.sub.subscribe()
    }

    pub fn counters(&self) -> &Counters {
        self.sub.resource().counters()
    }
}
