use crate::merge::{EditId, Mergeable, PendingEdits, merge};
use crate::resource::{ApplyReport, SyncState};

/// A polled collection together with the local edits layered on top of it.
///
/// `server` is the last successfully fetched payload, `view` is what the
/// user sees (`server` plus still-pending edits).
#[derive(Debug)]
pub struct LiveCollection<M: Mergeable> {
    server: Vec<M>,
    pending: PendingEdits<M>,
    view: Vec<M>,
}

impl<M: Mergeable> Default for LiveCollection<M> {
    fn default() -> Self {
        Self {
            server: Vec::new(),
            pending: PendingEdits::new(),
            view: Vec::new(),
        }
    }
}

impl<M: Mergeable> LiveCollection<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &[M] {
        &self.view
    }

    pub fn server(&self) -> &[M] {
        &self.server
    }

    pub fn pending(&self) -> &PendingEdits<M> {
        &self.pending
    }

    pub fn get(&self, key: &M::Key) -> Option<&M> {
        self.view.iter().find(|m| &m.key() == key)
    }

    /// Folds a fresh server payload in. Returns how many edits were settled.
    pub fn apply_fresh(&mut self, fresh: Vec<M>) -> ApplyReport {
        let pending = std::mem::take(&mut self.pending);
        let out = merge(&self.view, fresh.clone(), pending);

        self.server = fresh;
        self.view = out.items;
        self.pending = out.pending;

        ApplyReport {
            reconciled: out.reconciled,
            orphaned: out.orphaned,
        }
    }

    /// Applies an edit locally ahead of server confirmation.
    ///
    /// Returns `None` when the edit targets an unknown item and cannot
    /// create one.
    pub fn apply_local(&mut self, key: M::Key, edit: M::Edit, issued_at_ms: u64) -> Option<EditId> {
        if let Some(item) = self.view.iter_mut().find(|m| m.key() == key) {
            item.apply(&edit);
        } else {
            let item = M::materialize(&key, &edit)?;
            self.view.push(item);
        }

        Some(self.pending.push(key, edit, issued_at_ms))
    }

    /// Withdraws an edit the server refused and rebuilds the view from the
    /// last server payload.
    pub fn rollback(&mut self, id: EditId) -> bool {
        if !self.pending.remove(id) {
            return false;
        }

        let pending = std::mem::take(&mut self.pending);
        let out = merge(&self.view, self.server.clone(), pending);
        self.view = out.items;
        self.pending = out.pending;
        true
    }
}

impl<M: Mergeable> SyncState for LiveCollection<M>
where
    M: std::fmt::Debug,
{
    type Payload = Vec<M>;
    type View = Vec<M>;

    fn apply_fresh(&mut self, payload: Vec<M>) -> ApplyReport {
        LiveCollection::apply_fresh(self, payload)
    }

    fn view(&self) -> Vec<M> {
        self.view.clone()
    }
}
