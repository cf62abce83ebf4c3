//! ConflictResolutionEngine - turns a resolution instruction into a persisted entity.
//!
//! # Resolving one conflict
//!
//! 1. Claim the conflict in the store (`open | failed -> resolving`)
//! 2. Build the merged entity; every validation error is raised here
//! 3. Save it through the entity type's repository (the only suspension point)
//! 4. On success remove the conflict and record the outcome; on failure mark
//!    it `failed` and return the repository error unchanged
//!
//! If the resolve future is dropped mid-save, the claim is released and the
//! conflict keeps its previous status.

use crate::batch::{BatchResolver, BatchResult};
use crate::detect::{system_clock, Clock, ConflictDetector, DetectionInput};
use crate::merge::{FieldMergeEngine, FieldPlan};
use crate::store::{ConflictStore, RegisterOutcome};
use crate::{
    error::Result, ConflictDetails, ConflictEvent, ConflictId, ConflictResolution,
    ConflictStatus, EngineConfig, EntitySnapshot, Error, EventBus, FieldResolution,
    FieldResolutionType, MergeStrategy, RepositoryRegistry, ResolutionOutcome, Schema,
    SyncConflict,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Consumer-facing entry point: detection, inspection and resolution of conflicts.
#[derive(Debug)]
pub struct ConflictResolutionEngine {
    store: Arc<ConflictStore>,
    repositories: RepositoryRegistry,
    merger: FieldMergeEngine,
    detector: ConflictDetector,
    events: EventBus,
    clock: Clock,
}

impl ConflictResolutionEngine {
    pub fn new(schema: Schema, repositories: RepositoryRegistry, config: EngineConfig) -> Self {
        Self {
            store: ConflictStore::new_shared(),
            repositories,
            events: EventBus::new(config.event_capacity),
            merger: FieldMergeEngine::new(schema, config),
            detector: ConflictDetector::new(),
            clock: system_clock,
        }
    }

    /// Use an existing store instead of a fresh one.
    pub fn with_store(mut self, store: Arc<ConflictStore>) -> Self {
        self.store = store;
        self
    }

    /// Clock for `detected_at` and `resolved_at`.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.detector = ConflictDetector::with_clock(clock);
        self
    }

    pub fn store(&self) -> &Arc<ConflictStore> {
        &self.store
    }

    pub fn repositories(&self) -> &RepositoryRegistry {
        &self.repositories
    }

    pub fn merger(&self) -> &FieldMergeEngine {
        &self.merger
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConflictEvent> {
        self.events.subscribe()
    }

    pub fn active_conflicts(&self) -> Vec<SyncConflict> {
        self.store.active_conflicts()
    }

    pub fn conflict(&self, id: ConflictId) -> Option<SyncConflict> {
        self.store.get(id)
    }

    pub fn history(&self, id: ConflictId) -> Option<ResolutionOutcome> {
        self.store.history(id)
    }

    pub fn conflict_details(&self, conflict: &SyncConflict) -> ConflictDetails {
        self.merger.details(conflict)
    }

    /// Add a detected conflict to the store.
    pub fn register(&self, conflict: SyncConflict) -> RegisterOutcome {
        let id = conflict.id();
        let entity_type = conflict.entity_type();
        let entity_id = conflict.entity_id().clone();
        let conflict_type = conflict.conflict_type();

        let outcome = self.store.register(conflict);
        if outcome == RegisterOutcome::Inserted {
            tracing::info!(
                conflict_id = %id,
                entity_type = %entity_type,
                entity_id = %entity_id,
                conflict_type = %conflict_type,
                "Registered conflict"
            );
            self.events.publish(ConflictEvent::Registered {
                conflict_id: id,
                entity_type,
                entity_id,
                conflict_type,
            });
        }
        outcome
    }

    /// Detect and register in one step.
    ///
    /// Returns the stored conflict, or `None` when there is nothing to resolve.
    pub fn detect_and_register(&self, input: DetectionInput) -> Result<Option<SyncConflict>> {
        let Some(conflict) =
            self.detector
                .detect(input.local, input.remote, input.entity_type, input.baseline)?
        else {
            return Ok(None);
        };

        let id = conflict.id();
        match self.register(conflict) {
            RegisterOutcome::AlreadyResolved => {
                tracing::debug!(conflict_id = %id, "Conflict already resolved this session");
                Ok(None)
            }
            RegisterOutcome::Inserted | RegisterOutcome::AlreadyOpen => Ok(self.store.get(id)),
        }
    }

    /// Return a failed conflict to `open`.
    pub fn reopen(&self, id: ConflictId) -> Result<SyncConflict> {
        let conflict = self.store.reopen(id)?;
        tracing::info!(conflict_id = %id, "Reopened conflict");
        self.events.publish(ConflictEvent::Reopened { conflict_id: id });
        Ok(conflict)
    }

    /// Resolve a conflict and persist the merged entity.
    pub async fn resolve_conflict(
        &self,
        conflict: &SyncConflict,
        resolution: ConflictResolution,
    ) -> Result<EntitySnapshot> {
        self.resolve(conflict.id(), resolution).await
    }

    /// Resolve a conflict by id.
    pub async fn resolve(
        &self,
        id: ConflictId,
        resolution: ConflictResolution,
    ) -> Result<EntitySnapshot> {
        let conflict = self.store.claim(id)?;
        let mut claim = ClaimGuard {
            store: &self.store,
            id,
            previous: Some(conflict.status().clone()),
        };

        let repository = self
            .repositories
            .get(conflict.entity_type())
            .cloned()
            .ok_or(Error::UnsupportedEntityType(conflict.entity_type()))?;
        let merged = self.plan(&conflict, &resolution)?;

        tracing::debug!(
            conflict_id = %id,
            entity_type = %conflict.entity_type(),
            entity_id = %conflict.entity_id(),
            resolution = %resolution.display_name(),
            "Saving merged entity"
        );

        let saved = repository.save(merged.clone()).await;
        claim.disarm();

        match saved {
            Ok(()) => {
                self.store.complete(ResolutionOutcome {
                    conflict_id: id,
                    entity_type: conflict.entity_type(),
                    entity_id: conflict.entity_id().clone(),
                    resolution,
                    merged: merged.clone(),
                    resolved_at: (self.clock)(),
                });
                tracing::info!(
                    conflict_id = %id,
                    entity_type = %conflict.entity_type(),
                    entity_id = %conflict.entity_id(),
                    "Resolved conflict"
                );
                self.events.publish(ConflictEvent::Resolved {
                    conflict_id: id,
                    entity_type: conflict.entity_type(),
                    entity_id: conflict.entity_id().clone(),
                });
                Ok(merged)
            }
            Err(e) => {
                self.store.fail(id, e.to_string());
                tracing::warn!(conflict_id = %id, error = %e, "Failed to persist resolution");
                self.events.publish(ConflictEvent::Failed {
                    conflict_id: id,
                    error: e.to_string(),
                });
                Err(Error::Persistence(e))
            }
        }
    }

    /// Resolve every unresolved conflict with one resolution, in registration order.
    pub async fn resolve_all_conflicts(
        &self,
        strategy: &ConflictResolution,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let conflicts: Vec<SyncConflict> = self
            .store
            .active_conflicts()
            .into_iter()
            .filter(|c| c.status().accepts_resolution())
            .collect();

        BatchResolver::new(self)
            .resolve_all(conflicts, strategy, cancel)
            .await
    }

    /// Compute the merged entity without side effects.
    pub fn plan(
        &self,
        conflict: &SyncConflict,
        resolution: &ConflictResolution,
    ) -> Result<EntitySnapshot> {
        let local = conflict.local();
        let remote = conflict.remote();
        let whole_record = !conflict.conflict_type().allows_field_merge();

        let field_plan = match resolution {
            ConflictResolution::KeepLocal => return Ok(local.snapshot.clone()),
            ConflictResolution::KeepRemote => return Ok(remote.snapshot.clone()),

            ConflictResolution::Merge(MergeStrategy::LatestWins) if whole_record => {
                let newer = if remote.is_newer_than(local) { remote } else { local };
                return Ok(newer.snapshot.clone());
            }
            ConflictResolution::Merge(MergeStrategy::LocalPriority) if whole_record => {
                return Ok(local.snapshot.clone());
            }
            ConflictResolution::Merge(MergeStrategy::RemotePriority) if whole_record => {
                return Ok(remote.snapshot.clone());
            }
            ConflictResolution::Merge(MergeStrategy::FieldLevel(_))
            | ConflictResolution::Custom(_)
                if whole_record =>
            {
                return Err(Error::FieldMergeUnsupported(conflict.conflict_type()));
            }

            ConflictResolution::Merge(strategy) => {
                let changes = self.merger.diff(local, remote);
                changes
                    .into_iter()
                    .map(|change| {
                        let resolution = match strategy {
                            MergeStrategy::LatestWins => FieldResolutionType::Latest,
                            MergeStrategy::LocalPriority => FieldResolutionType::UseLocal,
                            MergeStrategy::RemotePriority => FieldResolutionType::UseRemote,
                            MergeStrategy::FieldLevel(entries) => find_entry(entries, &change)
                                .cloned()
                                .unwrap_or(FieldResolutionType::UseLocal),
                        };
                        FieldPlan { change, resolution }
                    })
                    .collect::<Vec<_>>()
            }

            ConflictResolution::Custom(entries) => {
                let changes = self.merger.diff(local, remote);
                let missing: Vec<String> = changes
                    .iter()
                    .filter(|c| find_entry(entries, c).is_none())
                    .map(|c| c.field_name.clone())
                    .collect();
                if !missing.is_empty() {
                    return Err(Error::NonExhaustiveCustomResolution { missing });
                }
                changes
                    .into_iter()
                    .filter_map(|change| {
                        let resolution = find_entry(entries, &change)?.clone();
                        Some(FieldPlan { change, resolution })
                    })
                    .collect()
            }
        };

        self.merger.merge(local, remote, &field_plan)
    }
}

fn find_entry<'a>(
    entries: &'a [FieldResolution],
    change: &crate::FieldChange,
) -> Option<&'a FieldResolutionType> {
    entries
        .iter()
        .find(|e| e.field_name == change.field_name)
        .map(|e| &e.resolution)
}

/// Restores a claimed conflict's status unless disarmed.
struct ClaimGuard<'a> {
    store: &'a ConflictStore,
    id: ConflictId,
    previous: Option<ConflictStatus>,
}

impl ClaimGuard<'_> {
    fn disarm(&mut self) {
        self.previous = None;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if let Some(status) = self.previous.take() {
            self.store.release(self.id, status);
        }
    }
}
