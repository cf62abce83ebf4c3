//! ConflictStore - the session-scoped registry of unresolved conflicts.
//!
//! Conflicts are inserted at detection time and removed the moment their
//! resolution is persisted. Nothing here is written to disk; a new session
//! rebuilds the store by running detection again.
//!
//! Status changes for one id are serialized on that id's map entry, so two
//! callers racing to resolve the same conflict cannot both claim it.

use crate::{error::Result, ConflictId, ConflictStatus, Error, ResolutionOutcome, SyncConflict};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of registering a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegisterOutcome {
    Inserted,
    /// Already registered; the existing entry and its status were kept
    AlreadyOpen,
    /// Already resolved this session; not registered again
    AlreadyResolved,
}

#[derive(Debug)]
struct StoredConflict {
    seq: u64,
    conflict: SyncConflict,
}

/// Thread-safe conflict registry, shared via `Arc`.
#[derive(Debug, Default)]
pub struct ConflictStore {
    conflicts: DashMap<ConflictId, StoredConflict>,
    history: DashMap<ConflictId, ResolutionOutcome>,
    next_seq: AtomicU64,
}

impl ConflictStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn register(&self, conflict: SyncConflict) -> RegisterOutcome {
        match self.conflicts.entry(conflict.id()) {
            Entry::Occupied(_) => RegisterOutcome::AlreadyOpen,
            Entry::Vacant(_) if self.history.contains_key(&conflict.id()) => {
                RegisterOutcome::AlreadyResolved
            }
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(StoredConflict { seq, conflict });
                RegisterOutcome::Inserted
            }
        }
    }

    pub fn get(&self, id: ConflictId) -> Option<SyncConflict> {
        self.conflicts.get(&id).map(|e| e.conflict.clone())
    }

    pub fn contains(&self, id: ConflictId) -> bool {
        self.conflicts.contains_key(&id)
    }

    /// Drop a conflict without recording a resolution.
    pub fn remove(&self, id: ConflictId) -> Option<SyncConflict> {
        self.conflicts.remove(&id).map(|(_, e)| e.conflict)
    }

    /// Every unresolved conflict, in registration order.
    pub fn active_conflicts(&self) -> Vec<SyncConflict> {
        let mut entries: Vec<(u64, SyncConflict)> = self
            .conflicts
            .iter()
            .map(|e| (e.seq, e.conflict.clone()))
            .collect();
        entries.sort_unstable_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, c)| c).collect()
    }

    /// Mark a conflict as `resolving` for the caller.
    ///
    /// Returns the conflict as it was before the claim, so the previous status
    /// can be handed back to [`release`](Self::release).
    pub fn claim(&self, id: ConflictId) -> Result<SyncConflict> {
        match self.conflicts.entry(id) {
            Entry::Occupied(mut slot) => {
                let stored = slot.get_mut();
                if !stored.conflict.status().accepts_resolution() {
                    return Err(Error::AlreadyResolved(id));
                }
                let before = stored.conflict.clone();
                stored.conflict.set_status(ConflictStatus::Resolving);
                Ok(before)
            }
            Entry::Vacant(_) => Err(self.missing(id)),
        }
    }

    /// Undo a claim, restoring `status`.
    pub fn release(&self, id: ConflictId, status: ConflictStatus) {
        if let Some(mut stored) = self.conflicts.get_mut(&id) {
            if *stored.conflict.status() == ConflictStatus::Resolving {
                stored.conflict.set_status(status);
            }
        }
    }

    /// Record a persisted resolution and remove its conflict.
    pub fn complete(&self, outcome: ResolutionOutcome) -> Option<SyncConflict> {
        match self.conflicts.entry(outcome.conflict_id) {
            Entry::Occupied(slot) => {
                self.history.insert(outcome.conflict_id, outcome);
                let mut conflict = slot.remove().conflict;
                conflict.set_status(ConflictStatus::Resolved);
                Some(conflict)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Mark a claimed conflict as failed. It stays visible for another attempt.
    pub fn fail(&self, id: ConflictId, error: impl Into<String>) {
        if let Some(mut stored) = self.conflicts.get_mut(&id) {
            stored.conflict.set_status(ConflictStatus::Failed {
                error: error.into(),
            });
        }
    }

    /// Return a failed conflict to `open`.
    pub fn reopen(&self, id: ConflictId) -> Result<SyncConflict> {
        match self.conflicts.entry(id) {
            Entry::Occupied(mut slot) => {
                let stored = slot.get_mut();
                match stored.conflict.status() {
                    ConflictStatus::Resolving | ConflictStatus::Resolved => {
                        Err(Error::AlreadyResolved(id))
                    }
                    ConflictStatus::Open | ConflictStatus::Failed { .. } => {
                        stored.conflict.set_status(ConflictStatus::Open);
                        Ok(stored.conflict.clone())
                    }
                }
            }
            Entry::Vacant(_) => Err(self.missing(id)),
        }
    }

    fn missing(&self, id: ConflictId) -> Error {
        if self.history.contains_key(&id) {
            Error::AlreadyResolved(id)
        } else {
            Error::ConflictNotFound(id)
        }
    }

    /// How a conflict was resolved this session.
    pub fn history(&self, id: ConflictId) -> Option<ResolutionOutcome> {
        self.history.get(&id).map(|e| e.value().clone())
    }

    pub fn resolved_count(&self) -> usize {
        self.history.len()
    }

    /// Number of unresolved conflicts.
    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Forget all conflicts and history.
    pub fn clear(&self) {
        self.conflicts.clear();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ConflictResolution, ConflictType, ConflictVersion, DeviceInfo, EntitySnapshot, EntityType,
    };
    use serde_json::json;

    fn conflict(entity_id: &str) -> SyncConflict {
        let version = |name: &str, at: u64, device: &str| {
            ConflictVersion::new(
                EntitySnapshot::new(entity_id, EntityType::Item, json!({ "name": name })),
                at,
                DeviceInfo::new(device),
            )
        };
        SyncConflict::new(
            EntityType::Item,
            ConflictType::Update,
            version("Lamp", 1000, "phone"),
            version("Desk Lamp", 2000, "ipad"),
            3000,
        )
    }

    fn outcome(conflict: &SyncConflict) -> ResolutionOutcome {
        ResolutionOutcome {
            conflict_id: conflict.id(),
            entity_type: conflict.entity_type(),
            entity_id: conflict.entity_id().clone(),
            resolution: ConflictResolution::KeepLocal,
            merged: conflict.local().snapshot.clone(),
            resolved_at: 4000,
        }
    }

    #[test]
    fn register_and_get() {
        let store = ConflictStore::new();
        let c = conflict("item-1");

        assert_eq!(store.register(c.clone()), RegisterOutcome::Inserted);
        assert_eq!(store.register(c.clone()), RegisterOutcome::AlreadyOpen);
        assert_eq!(store.get(c.id()), Some(c));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn active_conflicts_keep_registration_order() {
        let store = ConflictStore::new();
        let ids: Vec<_> = ["item-3", "item-1", "item-2"]
            .into_iter()
            .map(|id| {
                let c = conflict(id);
                store.register(c.clone());
                c.id()
            })
            .collect();

        let active: Vec<_> = store.active_conflicts().iter().map(|c| c.id()).collect();
        assert_eq!(active, ids);
    }

    #[test]
    fn claim_is_exclusive() {
        let store = ConflictStore::new();
        let c = conflict("item-1");
        store.register(c.clone());

        let claimed = store.claim(c.id()).unwrap();
        assert!(claimed.status().is_open());
        assert_eq!(store.get(c.id()).unwrap().status(), &ConflictStatus::Resolving);

        assert_eq!(store.claim(c.id()), Err(Error::AlreadyResolved(c.id())));
    }

    #[test]
    fn release_restores_previous_status() {
        let store = ConflictStore::new();
        let c = conflict("item-1");
        store.register(c.clone());

        store.claim(c.id()).unwrap();
        store.fail(c.id(), "offline");
        let before = store.claim(c.id()).unwrap();
        store.release(c.id(), before.status().clone());

        assert_eq!(
            store.get(c.id()).unwrap().status(),
            &ConflictStatus::Failed {
                error: "offline".into()
            }
        );
    }

    #[test]
    fn complete_moves_conflict_to_history() {
        let store = ConflictStore::new();
        let c = conflict("item-1");
        store.register(c.clone());
        store.claim(c.id()).unwrap();

        let removed = store.complete(outcome(&c)).unwrap();
        assert_eq!(removed.status(), &ConflictStatus::Resolved);
        assert!(store.is_empty());
        assert_eq!(store.history(c.id()).map(|o| o.resolved_at), Some(4000));

        assert_eq!(store.claim(c.id()), Err(Error::AlreadyResolved(c.id())));
        assert_eq!(store.register(c.clone()), RegisterOutcome::AlreadyResolved);
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_ids() {
        let store = ConflictStore::new();
        let id = conflict("item-1").id();
        assert_eq!(store.claim(id), Err(Error::ConflictNotFound(id)));
        assert_eq!(store.reopen(id), Err(Error::ConflictNotFound(id)));
        assert_eq!(store.get(id), None);
    }

    #[test]
    fn reopen_failed_conflict() {
        let store = ConflictStore::new();
        let c = conflict("item-1");
        store.register(c.clone());
        store.claim(c.id()).unwrap();
        assert_eq!(store.reopen(c.id()), Err(Error::AlreadyResolved(c.id())));

        store.fail(c.id(), "disk full");
        let reopened = store.reopen(c.id()).unwrap();
        assert!(reopened.status().is_open());
    }

    #[test]
    fn remove_and_clear() {
        let store = ConflictStore::new();
        let a = conflict("item-1");
        let b = conflict("item-2");
        store.register(a.clone());
        store.register(b.clone());

        assert_eq!(store.remove(a.id()).map(|c| c.id()), Some(a.id()));
        assert_eq!(store.remove(a.id()), None);
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.resolved_count(), 0);
    }
}
