use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::fetcher::{Endpoint, FetchParams, ResourceFetcher};
use crate::metrics::Counters;
use crate::resource::{LiveResource, ResourceKey, Snapshot, SyncState};
use crate::scheduler::MIN_POLL_INTERVAL;
use crate::scheduler::poller::{PollHandle, spawn_poller};

struct Active {
    key: ResourceKey,
    params: FetchParams,
    handle: PollHandle,
}

/// One logical polled resource: its state, its fetcher, and at most one
/// running poller.
///
/// `activate` with a new subject stops the old timer before starting the
/// new one; dropping the subscription stops it as well.
pub struct Subscription<S: SyncState> {
    endpoint: Endpoint,
    fetcher: Arc<dyn ResourceFetcher<S::Payload>>,
    interval: Duration,
    resource: LiveResource<S>,
    counters: Counters,
    active: Option<Active>,
}

impl<S: SyncState> Subscription<S> {
    pub fn new(
        endpoint: Endpoint,
        fetcher: Arc<dyn ResourceFetcher<S::Payload>>,
        interval: Duration,
        counters: Counters,
    ) -> Self {
        if interval < MIN_POLL_INTERVAL {
            warn!(endpoint = %endpoint, ?interval, "poll interval too small; raised");
        }
        Self {
            endpoint,
            fetcher,
            interval: interval.max(MIN_POLL_INTERVAL),
            resource: LiveResource::new(counters.clone()),
            counters,
            active: None,
        }
    }

    /// Starts polling for the subject in `params`.
    ///
    /// Returns `false` (and stops any previous poller) when the subject the
    /// endpoint needs is missing. Re-activating with identical params is a
    /// no-op.
    pub fn activate(&mut self, params: FetchParams) -> bool {
        let Some(subject) = self.endpoint.subject(&params) else {
            debug!(endpoint = %self.endpoint, "subject missing; not polling");
            self.deactivate();
            return false;
        };

        let key = ResourceKey {
            endpoint: self.endpoint.clone(),
            subject,
        };

        if let Some(a) = &self.active {
            if a.key == key && a.params == params && a.handle.is_running() {
                return true;
            }
        }

        // Old timer goes first: never two pollers for one logical resource.
        self.deactivate();

        self.resource.rebind(key.clone(), self.interval);
        let sink = Arc::new(self.resource.clone());
        let handle = spawn_poller(
            key.clone(),
            params.clone(),
            self.interval,
            Arc::clone(&self.fetcher),
            sink,
            self.counters.clone(),
        );

        info!(resource = %key, "subscription activated");
        self.active = Some(Active {
            key,
            params,
            handle,
        });
        true
    }

    /// Stops the poller. Results still in flight are discarded; the last
    /// published snapshot stays as it is.
    pub fn deactivate(&mut self) {
        if let Some(active) = self.active.take() {
            self.resource.exclusive(|| active.handle.stop());
            debug!(resource = %active.key, "subscription deactivated");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn key(&self) -> Option<&ResourceKey> {
        self.active.as_ref().map(|a| &a.key)
    }

    pub fn params(&self) -> Option<&FetchParams> {
        self.active.as_ref().map(|a| &a.params)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn resource(&self) -> &LiveResource<S> {
        &self.resource
    }

    pub fn snapshot(&self) -> Snapshot<S::View> {
        self.resource.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<S::View>> {
        self.resource.subscribe()
    }
}

impl<S: SyncState> Drop for Subscription<S> {
    fn drop(&mut self) {
        self.deactivate();
    }
}
