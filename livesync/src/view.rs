use tokio::sync::watch;

/// Latest view of one live resource, readable by any number of consumers.
///
/// There is exactly one writer: the resource that owns the store.
#[derive(Clone)]
pub struct ViewStore<V> {
    tx: watch::Sender<V>,
}

impl<V: Clone> ViewStore<V> {
    pub fn new(initial: V) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Clone of the current view.
    pub fn current(&self) -> V {
        self.tx.borrow().clone()
    }

    /// Receiver that is notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<V> {
        self.tx.subscribe()
    }

    /// Replace the view. Last write wins; works with no subscribers.
    pub(crate) fn publish(&self, v: V) {
        self.tx.send_replace(v);
    }
}
