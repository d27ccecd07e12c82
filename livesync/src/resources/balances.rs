use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::SyncConfig;
use crate::fetcher::{Endpoint, EnvelopeFetcher, FetchParams, HttpClient, ResourceFetcher};
use crate::merge::{LiveCollection, Mergeable};
use crate::metrics::Counters;
use crate::resource::Snapshot;
use crate::scheduler::Subscription;
use crate::session::SessionContext;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    #[serde(alias = "symbol")]
    pub currency: String,
    #[serde(default)]
    pub available: f64,
    /// Held in escrow by open trades.
    #[serde(default, alias = "in_escrow")]
    pub locked: f64,
}

impl WalletBalance {
    pub fn total(&self) -> f64 {
        self.available + self.locked
    }
}

/// Balances are read-only here; there are no local edits to merge.
impl Mergeable for WalletBalance {
    type Key = String;
    type Edit = Infallible;

    fn key(&self) -> String {
        self.currency.clone()
    }

    fn apply(&mut self, edit: &Infallible) {
        match *edit {}
    }

    fn reflects(&self, edit: &Infallible) -> bool {
        match *edit {}
    }
}

pub type BalanceSheet = LiveCollection<WalletBalance>;

/// Looks a currency up in a balances view.
pub fn balance_of<'a>(view: &'a [WalletBalance], currency: &str) -> Option<&'a WalletBalance> {
    view.iter().find(|b| b.currency.eq_ignore_ascii_case(currency))
}

/// Live wallet balances of the signed-in user. Stale data is kept on
/// failure; there is no secondary source for balances.
pub struct Balances {
    sub: Subscription<BalanceSheet>,
    session: SessionContext,
}

impl Balances {
    pub fn new(
        client: HttpClient,
        session: SessionContext,
        cfg: &SyncConfig,
        counters: Counters,
    ) -> Self {
        let fetcher = Arc::new(EnvelopeFetcher::<WalletBalance>::new(
            client,
            Endpoint::Balances,
            "balances",
        ));
        Self::with_fetcher(fetcher, session, cfg.balances_every, counters)
    }

    pub fn with_fetcher(
        fetcher: Arc<dyn ResourceFetcher<Vec<WalletBalance>>>,
        session: SessionContext,
        every: Duration,
        counters: Counters,
    ) -> Self {
        Self {
            sub: Subscription::new(Endpoint::Balances, fetcher, every, counters),
            session,
        }
    }

    pub fn start(&mut self) -> bool {
        if self.session.user_id().is_empty() {
            return false;
        }
        self.sub
            .activate(FetchParams::for_user(self.session.user_id()))
    }

    pub fn stop(&mut self) {
        self.sub.deactivate();
    }

    pub fn snapshot(&self) -> Snapshot<Vec<WalletBalance>> {
        self.sub.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<Vec<WalletBalance>>> {
        self.sub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_and_totals() {
        let b: WalletBalance = serde_json::from_value(json!({
            "symbol": "USDT",
            "available": 120.5,
            "in_escrow": 30.0
        }))
        .unwrap();
        assert_eq!(b.currency, "USDT");
        assert_eq!(b.total(), 150.5);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let view = vec![WalletBalance {
            currency: "BTC".into(),
            available: 0.5,
            locked: 0.0,
        }];
        assert!(balance_of(&view, "btc").is_some());
        assert!(balance_of(&view, "eth").is_none());
    }

    #[test]
    fn empty_wallet_replaces_previous_balances() {
        let mut sheet = BalanceSheet::new();
        sheet.apply_fresh(vec![WalletBalance {
            currency: "BTC".into(),
            available: 1.0,
            locked: 0.0,
        }]);
        sheet.apply_fresh(vec![]);
        assert!(sheet.view().is_empty());
    }
}
