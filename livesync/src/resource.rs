use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::fetcher::{Endpoint, Served};
use crate::metrics::Counters;
use crate::scheduler::{Commit, Liveness, PollSink};
use crate::view::ViewStore;

/// Local state a poll payload is folded into.
pub trait SyncState: Default + Send + 'static {
    type Payload: Send + 'static;
    type View: Clone + fmt::Debug + Send + Sync + 'static;

    fn apply_fresh(&mut self, payload: Self::Payload) -> ApplyReport;

    fn view(&self) -> Self::View;
}

/// Edits settled by one `apply_fresh`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub reconciled: usize,
    pub orphaned: usize,
}

/// Endpoint + subject: one logical polled resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub endpoint: Endpoint,
    pub subject: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.endpoint, self.subject)
    }
}

/// Last known good data for one resource plus its freshness metadata.
///
/// Invariant: a failed poll never touches `data`.
pub struct PolledResource<S> {
    key: ResourceKey,
    data: Option<S>,
    last_fetched_at: Option<DateTime<Utc>>,
    is_stale: bool,
    last_error: Option<FetchError>,
    interval: Duration,
    source: Option<String>,
}

impl<S: SyncState> PolledResource<S> {
    pub fn new(key: ResourceKey, interval: Duration) -> Self {
        Self {
            key,
            data: None,
            last_fetched_at: None,
            is_stale: false,
            last_error: None,
            interval,
            source: None,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn data(&self) -> Option<&S> {
        self.data.as_ref()
    }

    /// State for local edits, created empty if nothing was fetched yet.
    pub fn data_mut(&mut self) -> &mut S {
        self.data.get_or_insert_with(S::default)
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    pub fn last_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.last_fetched_at
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn record_success(
        &mut self,
        payload: S::Payload,
        source: &str,
        now: DateTime<Utc>,
    ) -> ApplyReport {
        let report = self.data_mut().apply_fresh(payload);
        self.last_fetched_at = Some(now);
        self.is_stale = false;
        self.last_error = None;
        self.source = Some(source.to_string());
        report
    }

    pub fn record_failure(&mut self, err: FetchError) {
        self.is_stale = true;
        self.last_error = Some(err);
    }

    pub fn snapshot(&self) -> Snapshot<S::View> {
        Snapshot {
            key: Some(self.key.clone()),
            view: self.data.as_ref().map(S::view),
            last_fetched_at: self.last_fetched_at,
            is_stale: self.is_stale,
            source: self.source.clone(),
            last_error: self.last_error.as_ref().map(|e| e.kind()),
        }
    }
}

/// What consumers of a live resource observe.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot<V> {
    pub key: Option<ResourceKey>,
    /// `None` until something was fetched (or edited locally).
    pub view: Option<V>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
    /// Which fetcher served the current data (`backend`, `public`, ...).
    pub source: Option<String>,
    /// Kind of the most recent failure since the last success.
    pub last_error: Option<&'static str>,
}

impl<V> Snapshot<V> {
    pub fn inactive() -> Self {
        Self {
            key: None,
            view: None,
            last_fetched_at: None,
            is_stale: false,
            source: None,
            last_error: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.view.is_some()
    }
}

struct Shared<S: SyncState> {
    state: Mutex<Option<PolledResource<S>>>,
    view: ViewStore<Snapshot<S::View>>,
    counters: Counters,
}

/// Single-writer holder of one resource's state.
///
/// Poll results arrive through `PollSink::commit`; local optimistic edits
/// through `edit`. Every change is published to the `ViewStore`.
pub struct LiveResource<S: SyncState> {
    inner: Arc<Shared<S>>,
}

impl<S: SyncState> Clone for LiveResource<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SyncState> LiveResource<S> {
    pub fn new(counters: Counters) -> Self {
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(None),
                view: ViewStore::new(Snapshot::inactive()),
                counters,
            }),
        }
    }

    pub fn snapshot(&self) -> Snapshot<S::View> {
        self.inner.view.current()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<Snapshot<S::View>> {
        self.inner.view.subscribe()
    }

    pub fn key(&self) -> Option<ResourceKey> {
        self.inner.state.lock().as_ref().map(|s| s.key().clone())
    }

    pub fn counters(&self) -> &Counters {
        &self.inner.counters
    }

    /// Points the resource at `key`. Data for a different subject is
    /// dropped so it is never shown under the new one.
    pub(crate) fn rebind(&self, key: ResourceKey, interval: Duration) {
        let mut guard = self.inner.state.lock();
        let same = guard.as_ref().is_some_and(|s| s.key() == &key);
        if same {
            return;
        }

        debug!(resource = %key, "resource rebound");
        let fresh = PolledResource::new(key, interval);
        self.inner.view.publish(fresh.snapshot());
        *guard = Some(fresh);
    }

    /// Runs `f` while holding the state lock, so no commit can interleave.
    pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.state.lock();
        f()
    }

    /// Applies a local change and publishes it. `None` if the resource was
    /// never activated.
    pub fn edit<R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        let mut guard = self.inner.state.lock();
        let res = guard.as_mut()?;
        let out = f(res.data_mut());
        self.inner.view.publish(res.snapshot());
        Some(out)
    }

    /// Read-only access to the current state.
    pub fn inspect<R>(&self, f: impl FnOnce(&S) -> R) -> Option<R> {
        let guard = self.inner.state.lock();
        guard.as_ref()?.data().map(f)
    }
}

impl<S: SyncState> PollSink<S::Payload> for LiveResource<S> {
    fn commit(
        &self,
        live: &Liveness,
        outcome: Result<Served<S::Payload>, FetchError>,
    ) -> Commit {
        let counters = &self.inner.counters;
        let mut guard = self.inner.state.lock();

        if !live.is_live() {
            Counters::incr(&counters.polls_discarded, 1);
            debug!("late poll result discarded");
            return Commit::Discarded;
        }

        let Some(res) = guard.as_mut() else {
            Counters::incr(&counters.polls_discarded, 1);
            return Commit::Discarded;
        };

        match outcome {
            Ok(Served { payload, source }) => {
                let report = res.record_success(payload, &source, Utc::now());
                Counters::incr(&counters.polls_ok, 1);
                Counters::incr(&counters.edits_reconciled, report.reconciled as u64);

                if report.reconciled > 0 || report.orphaned > 0 {
                    info!(
                        resource = %res.key(),
                        reconciled = report.reconciled,
                        orphaned = report.orphaned,
                        "optimistic edits settled"
                    );
                }
            }
            Err(err) => {
                Counters::incr(&counters.polls_failed, 1);
                warn!(
                    resource = %res.key(),
                    error = %err,
                    kind = err.kind(),
                    "poll failed; keeping last good data"
                );
                res.record_failure(err);
            }
        }

        self.inner.view.publish(res.snapshot());
        Commit::Applied
    }
}
