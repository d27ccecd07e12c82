use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub polls_ok: Arc<AtomicU64>,
    pub polls_failed: Arc<AtomicU64>,

    /// Ticks that elapsed while a previous fetch was still in flight.
    pub polls_skipped: Arc<AtomicU64>,
    /// Results that resolved after their poller was stopped.
    pub polls_discarded: Arc<AtomicU64>,

    pub fallbacks_used: Arc<AtomicU64>,
    pub edits_reconciled: Arc<AtomicU64>,
    pub edits_rolled_back: Arc<AtomicU64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub polls_skipped: u64,
    pub polls_discarded: u64,
    pub fallbacks_used: u64,
    pub edits_reconciled: u64,
    pub edits_rolled_back: u64,
}

impl Counters {
    pub fn incr(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let l = |c: &Arc<AtomicU64>| c.load(Ordering::Relaxed);
        CounterSnapshot {
            polls_ok: l(&self.polls_ok),
            polls_failed: l(&self.polls_failed),
            polls_skipped: l(&self.polls_skipped),
            polls_discarded: l(&self.polls_discarded),
            fallbacks_used: l(&self.fallbacks_used),
            edits_reconciled: l(&self.edits_reconciled),
            edits_rolled_back: l(&self.edits_rolled_back),
        }
    }
}
