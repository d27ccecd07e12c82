//! View State Merger
//!
//! Folds a freshly fetched collection into local view state while keeping
//! optimistic edits alive until the server catches up with them.
//!
//! Rules:
//! - the fresh payload decides which items exist (an empty payload empties
//!   the view)
//! - an edit whose target is reflected by the fresh item is reconciled
//!   (dropped); otherwise it is re-applied on top of the fresh item
//! - edits that create items (`Mergeable::materialize`) keep their item
//!   visible, after the fresh items, until the server returns it, either
//!   under the same key or as a new item that `Mergeable::echoes` the edit
//! - edits for items the server no longer returns are dropped

pub mod collection;

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

pub use collection::LiveCollection;

/// An item of a polled collection that local edits can target.
pub trait Mergeable: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    type Edit: Clone + Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;

    /// Applies the edit's target state to this item. Must be idempotent.
    fn apply(&mut self, edit: &Self::Edit);

    /// True once this (server) item already carries the edit's target state.
    fn reflects(&self, edit: &Self::Edit) -> bool;

    /// Builds a local-only item for edits that create one (e.g. a message
    /// that has been sent but not yet returned by the server).
    fn materialize(_key: &Self::Key, _edit: &Self::Edit) -> Option<Self> {
        None
    }

    /// True if this server item, new since the last merge, is what the
    /// item-creating `edit` turned into under a server-assigned key.
    fn echoes(&self, _edit: &Self::Edit) -> bool {
        false
    }
}

/// Identifier handed out for each local edit, used to roll it back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EditId(pub u64);

#[derive(Debug)]
pub struct OptimisticEdit<M: Mergeable> {
    pub id: EditId,
    pub key: M::Key,
    pub edit: M::Edit,
    pub issued_at_ms: u64,
}

impl<M: Mergeable> Clone for OptimisticEdit<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            key: self.key.clone(),
            edit: self.edit.clone(),
            issued_at_ms: self.issued_at_ms,
        }
    }
}

/// Edits applied locally and not yet reflected by a poll, in issue order.
#[derive(Debug)]
pub struct PendingEdits<M: Mergeable> {
    edits: Vec<OptimisticEdit<M>>,
    next_id: u64,
}

impl<M: Mergeable> Default for PendingEdits<M> {
    fn default() -> Self {
        Self {
            edits: Vec::new(),
            next_id: 1,
        }
    }
}

impl<M: Mergeable> Clone for PendingEdits<M> {
    fn clone(&self) -> Self {
        Self {
            edits: self.edits.clone(),
            next_id: self.next_id,
        }
    }
}

impl<M: Mergeable> PendingEdits<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: M::Key, edit: M::Edit, issued_at_ms: u64) -> EditId {
        let id = EditId(self.next_id);
        self.next_id += 1;
        self.edits.push(OptimisticEdit {
            id,
            key,
            edit,
            issued_at_ms,
        });
        id
    }

    /// Removes an edit; returns whether it was still pending.
    pub fn remove(&mut self, id: EditId) -> bool {
        let before = self.edits.len();
        self.edits.retain(|e| e.id != id);
        self.edits.len() != before
    }

    pub fn contains_key(&self, key: &M::Key) -> bool {
        self.edits.iter().any(|e| &e.key == key)
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptimisticEdit<M>> {
        self.edits.iter()
    }

    fn retain(&mut self, f: impl FnMut(&OptimisticEdit<M>) -> bool) {
        self.edits.retain(f);
    }
}

/// Result of one merge pass.
#[derive(Debug)]
pub struct MergeOutcome<M: Mergeable> {
    pub items: Vec<M>,
    pub pending: PendingEdits<M>,
    /// Edits dropped because the server now reflects them.
    pub reconciled: usize,
    /// Edits dropped because their item disappeared from the server.
    pub orphaned: usize,
}

/// `merge(current, fresh, pending) -> new state`.
///
/// `current` is only consulted for local-only items, so that an item created
/// by an edit keeps any local state it has accumulated.
pub fn merge<M: Mergeable>(
    current: &[M],
    fresh: Vec<M>,
    mut pending: PendingEdits<M>,
) -> MergeOutcome<M> {
    let fresh_keys: HashSet<M::Key> = fresh.iter().map(M::key).collect();
    let creating: Vec<&OptimisticEdit<M>> = pending
        .iter()
        .filter(|e| !fresh_keys.contains(&e.key))
        .filter(|e| M::materialize(&e.key, &e.edit).is_some())
        .collect();

    // Creating edits the server returned under its own key. Each new fresh
    // item settles at most one edit, oldest edit first.
    let known_keys: HashSet<M::Key> = current.iter().map(M::key).collect();
    let mut claimed = vec![false; fresh.len()];
    let mut echoed: HashSet<EditId> = HashSet::new();
    for e in &creating {
        let hit = fresh.iter().enumerate().position(|(i, m)| {
            !claimed[i] && !known_keys.contains(&m.key()) && m.echoes(&e.edit)
        });
        if let Some(i) = hit {
            claimed[i] = true;
            echoed.insert(e.id);
        }
    }

    let local_keys: HashSet<M::Key> = creating
        .iter()
        .filter(|e| !echoed.contains(&e.id))
        .map(|e| e.key.clone())
        .collect();

    // Reconcile against the untouched server items first.
    let mut reconciled = 0;
    let mut orphaned = 0;
    pending.retain(|e| {
        if echoed.contains(&e.id) {
            reconciled += 1;
            return false;
        }
        if let Some(server) = fresh.iter().find(|m| m.key() == e.key) {
            if server.reflects(&e.edit) {
                reconciled += 1;
                return false;
            }
            return true;
        }
        if local_keys.contains(&e.key) {
            return true;
        }
        orphaned += 1;
        false
    });

    let mut items = fresh;
    for item in items.iter_mut() {
        let key = item.key();
        for e in pending.iter().filter(|e| e.key == key) {
            item.apply(&e.edit);
        }
    }

    // Local-only items, in the order their creating edit was issued.
    let mut seen: HashSet<M::Key> = fresh_keys;
    for e in pending.iter() {
        if seen.contains(&e.key) {
            continue;
        }
        let local = current
            .iter()
            .find(|m| m.key() == e.key)
            .cloned()
            .or_else(|| M::materialize(&e.key, &e.edit));
        if let Some(mut local) = local {
            for later in pending.iter().filter(|x| x.key == e.key && x.id > e.id) {
                local.apply(&later.edit);
            }
            seen.insert(e.key.clone());
            items.push(local);
        }
    }

    MergeOutcome {
        items,
        pending,
        reconciled,
        orphaned,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Minimal mergeable used by merge and collection tests.
    #[derive(Clone, Debug, PartialEq)]
    pub struct Flag {
        pub id: &'static str,
        pub on: bool,
        pub local: bool,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub enum FlagEdit {
        TurnOn,
        Create,
    }

    impl Mergeable for Flag {
        type Key = &'static str;
        type Edit = FlagEdit;

        fn key(&self) -> Self::Key {
            self.id
        }

        fn apply(&mut self, edit: &FlagEdit) {
            if *edit == FlagEdit::TurnOn {
                self.on = true;
            }
        }

        fn reflects(&self, edit: &FlagEdit) -> bool {
            match edit {
                FlagEdit::TurnOn => self.on,
                FlagEdit::Create => true,
            }
        }

        fn materialize(key: &&'static str, edit: &FlagEdit) -> Option<Self> {
            (*edit == FlagEdit::Create).then_some(Flag {
                id: *key,
                on: false,
                local: true,
            })
        }
    }

    pub fn flag(id: &'static str, on: bool) -> Flag {
        Flag {
            id,
            on,
            local: false,
        }
    }
}
