//! Poll loop
//!
//! Fetches immediately on start, then once per interval, and hands each
//! outcome to a `PollSink`. One fetch at a time: the next tick is only
//! awaited after the previous fetch resolved, and ticks missed meanwhile
//! are skipped rather than bunched up.

use std::sync::Arc;
use std::time::Duration;

use common::logger::{TraceId, poll_span, warn_if_slow};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{Instrument, Span, debug, info};

use crate::fetcher::{FetchParams, ResourceFetcher};
use crate::metrics::Counters;
use crate::resource::ResourceKey;
use crate::scheduler::{Commit, Liveness, MIN_POLL_INTERVAL, PollSink};

/// Owner of a running poll loop. Stopping (or dropping) it clears the
/// timer and makes any in-flight result land in the bin.
pub struct PollHandle {
    live: Liveness,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn stop(&self) {
        self.live.kill();
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        self.live.is_live() && !self.task.is_finished()
    }

    pub fn liveness(&self) -> &Liveness {
        &self.live
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns the poll loop for `key` on the current tokio runtime.
pub fn spawn_poller<P, K>(
    key: ResourceKey,
    params: FetchParams,
    every: Duration,
    fetcher: Arc<dyn ResourceFetcher<P>>,
    sink: Arc<K>,
    counters: Counters,
) -> PollHandle
where
    P: Send + 'static,
    K: PollSink<P>,
{
    let live = Liveness::new();
    let trace_id = TraceId::new();
    let span = poll_span(key.endpoint.name(), &key.subject, &trace_id);

    let task = tokio::spawn(
        run_poller(key, params, every, fetcher, sink, counters, live.clone()).instrument(span),
    );

    PollHandle { live, task }
}

async fn run_poller<P, K>(
    key: ResourceKey,
    params: FetchParams,
    every: Duration,
    fetcher: Arc<dyn ResourceFetcher<P>>,
    sink: Arc<K>,
    counters: Counters,
    live: Liveness,
) where
    P: Send + 'static,
    K: PollSink<P>,
{
    let every = every.max(MIN_POLL_INTERVAL);
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        resource = %key,
        every_ms = every.as_millis() as u64,
        "poller started"
    );

    loop {
        ticker.tick().await;
        if !live.is_live() {
            break;
        }

        let started = Instant::now();
        let outcome = warn_if_slow("poll_fetch", every, fetcher.fetch_served(&params)).await;
        let elapsed = started.elapsed();

        let missed = (elapsed.as_millis() / every.as_millis().max(1)) as u64;
        if missed > 0 {
            Counters::incr(&counters.polls_skipped, missed);
            debug!(missed, elapsed_ms = elapsed.as_millis() as u64, "ticks skipped while fetch in flight");
        }

        if let Ok(served) = &outcome {
            Span::current().record("source", served.source.as_str());
        }

        if sink.commit(&live, outcome) == Commit::Discarded {
            break;
        }
    }

    debug!(resource = %key, "poller stopped");
}
