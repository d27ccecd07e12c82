pub mod poller;
pub mod subscription;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::FetchError;
use crate::fetcher::Served;

pub use poller::{PollHandle, spawn_poller};
pub use subscription::Subscription;

/// Shortest poll interval; smaller values (including zero) are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Shared "still mounted" flag of one poller instance.
///
/// Every activation gets a fresh flag, so results from a previous subject
/// can never be committed under the new one.
#[derive(Clone, Debug)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Commit {
    Applied,
    /// The poller was stopped before the result arrived.
    Discarded,
}

/// Receiver of poll outcomes.
///
/// Implementations must check `live` while holding whatever lock guards
/// their state, and drop the outcome if it is no longer live.
pub trait PollSink<P>: Send + Sync + 'static {
    fn commit(&self, live: &Liveness, outcome: Result<Served<P>, FetchError>) -> Commit;
}
