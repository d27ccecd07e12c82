
use std::sync::Arc;
use std::time::Duration;

use livesync::error::FetchError;
use livesync::fallback::{FallbackFetcher, FallbackPolicy};
use livesync::fetcher::{Endpoint, FetchParams, ResourceFetcher};
use livesync::metrics::Counters;
use livesync::resources::{PriceQuote, PriceTicker};
use mock_fetcher::{ScriptedFetcher, Step};
use tokio::time::sleep;

const EVERY: Duration = Duration::from_secs(30);
const MS: Duration = Duration::from_millis(1);

fn quote(symbol: &str, price: f64) -> PriceQuote {
    PriceQuote {
        symbol: symbol.into(),
        price_usd: price,
        change_24h: 0.5,
    }
}

fn board() -> Vec<PriceQuote> {
    vec![
        quote("BTC", 64_000.0),
        quote("ETH", 3_100.0),
        quote("USDT", 1.0),
    ]
}

fn ticker(
    primary: Arc<ScriptedFetcher<Vec<PriceQuote>>>,
    secondary: Option<Arc<ScriptedFetcher<Vec<PriceQuote>>>>,
    policy: FallbackPolicy,
    counters: Counters,
) -> PriceTicker {
    let secondary = secondary.map(|s| s as Arc<dyn ResourceFetcher<Vec<PriceQuote>>>);
    let fetcher = FallbackFetcher::new(primary, secondary, policy, counters.clone());
    PriceTicker::with_fetcher(
        Endpoint::Prices,
        Arc::new(fetcher),
        EVERY,
        FetchParams::default(),
        counters,
    )
}

#[tokio::test(start_paused = true)]
async fn primary_timeout_is_served_from_secondary() {
    let primary = ScriptedFetcher::new("backend", vec![], Err(FetchError::Timeout));
    let secondary = ScriptedFetcher::new("public", vec![], Ok(board()));
    let counters = Counters::default();
    let mut t = ticker(
        primary.clone(),
        Some(secondary.clone()),
        FallbackPolicy::Secondary,
        counters.clone(),
    );

    t.start();
    let mut rx = t.subscribe();
    rx.changed().await.unwrap();

    let snap = t.snapshot();
    assert_eq!(snap.source.as_deref(), Some("public"));
    assert!(!snap.is_stale);
    let quotes = snap.view.unwrap();
    assert_eq!(quotes.len(), 3);
    assert!(quotes.iter().all(|q| q.price_usd > 0.0));

    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);
    assert_eq!(counters.snapshot().fallbacks_used, 1);
}

#[tokio::test(start_paused = true)]
async fn primary_recovery_switches_source_back() {
    let primary = ScriptedFetcher::new(
        "backend",
        vec![Step::Ready(Err(FetchError::Server { status: 502 }))],
        Ok(board()),
    );
    let secondary = ScriptedFetcher::new("public", vec![], Ok(board()));
    let mut t = ticker(
        primary,
        Some(secondary.clone()),
        FallbackPolicy::Secondary,
        Counters::default(),
    );

    t.start();
    let mut rx = t.subscribe();
    rx.changed().await.unwrap();
    assert_eq!(t.snapshot().source.as_deref(), Some("public"));

    sleep(EVERY + MS).await;
    assert_eq!(t.snapshot().source.as_deref(), Some("backend"));
    assert_eq!(secondary.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_only_policy_keeps_last_prices() {
    let primary = ScriptedFetcher::new(
        "backend",
        vec![Step::Ready(Ok(board()))],
        Err(FetchError::Timeout),
    );
    let secondary = ScriptedFetcher::new("public", vec![], Ok(vec![quote("BTC", 1.0)]));
    let mut t = ticker(
        primary,
        Some(secondary.clone()),
        FallbackPolicy::StaleOnly,
        Counters::default(),
    );

    t.start();
    let mut rx = t.subscribe();
    rx.changed().await.unwrap();
    let good = t.snapshot().view;

    sleep(EVERY * 2 + MS).await;
    let snap = t.snapshot();
    assert!(snap.is_stale);
    assert_eq!(snap.view, good);
    assert_eq!(snap.source.as_deref(), Some("backend"));
    assert_eq!(secondary.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn zero_price_in_fresh_payload_keeps_previous_quote() {
    let primary = ScriptedFetcher::new(
        "backend",
        vec![Step::Ready(Ok(board()))],
        Ok(vec![
            quote("BTC", 0.0),
            quote("ETH", 3_200.0),
            quote("USDT", 1.0),
        ]),
    );
    let mut t = ticker(primary, None, FallbackPolicy::Secondary, Counters::default());

    t.start();
    let mut rx = t.subscribe();
    rx.changed().await.unwrap();
    sleep(EVERY + MS).await;

    let quotes = t.snapshot().view.unwrap();
    let price = |s: &str| quotes.iter().find(|q| q.symbol == s).unwrap().price_usd;
    assert_eq!(price("BTC"), 64_000.0);
    assert_eq!(price("ETH"), 3_200.0);
}
