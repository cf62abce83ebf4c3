//! Best-effort batch resolution.
//!
//! Conflicts are resolved one after another in input order. A failing item is
//! recorded and the batch moves on. Cancellation is checked before each item:
//! an item that has started always finishes, and nothing resolved earlier is
//! rolled back.

use crate::engine::ConflictResolutionEngine;
use crate::{ConflictEvent, ConflictId, ConflictResolution, Error, SyncConflict};
use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;

/// A conflict the batch could not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub conflict_id: ConflictId,
    #[serde(serialize_with = "error_message")]
    pub error: Error,
}

fn error_message<S: Serializer>(error: &Error, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Outcome of a batch, possibly partial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Conflicts handed to the batch
    pub total: usize,
    /// Resolved conflicts, in processing order
    pub resolved_ids: Vec<ConflictId>,
    pub failed: Vec<BatchFailure>,
    /// Stopped before every conflict was attempted
    pub cancelled: bool,
}

impl BatchResult {
    /// Number of conflicts attempted.
    pub fn processed(&self) -> usize {
        self.resolved_ids.len() + self.failed.len()
    }

    /// Every conflict was attempted.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.processed() == self.total
    }

    pub fn failed_ids(&self) -> impl Iterator<Item = ConflictId> + '_ {
        self.failed.iter().map(|f| f.conflict_id)
    }
}

/// Applies one resolution to many conflicts.
pub struct BatchResolver<'a> {
    engine: &'a ConflictResolutionEngine,
}

impl<'a> BatchResolver<'a> {
    pub fn new(engine: &'a ConflictResolutionEngine) -> Self {
        Self { engine }
    }

    pub async fn resolve_all(
        &self,
        conflicts: Vec<SyncConflict>,
        strategy: &ConflictResolution,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let events = self.engine.events();
        let mut result = BatchResult {
            total: conflicts.len(),
            ..BatchResult::default()
        };

        tracing::info!(
            total = result.total,
            resolution = %strategy.display_name(),
            "Starting batch resolution"
        );
        events.publish(ConflictEvent::BatchStarted {
            total: result.total,
        });

        for conflict in &conflicts {
            if cancel.is_cancelled() {
                result.cancelled = true;
                tracing::info!(
                    processed = result.processed(),
                    total = result.total,
                    "Batch cancelled"
                );
                break;
            }

            match self
                .engine
                .resolve_conflict(conflict, strategy.clone())
                .await
            {
                Ok(_) => result.resolved_ids.push(conflict.id()),
                Err(error) => {
                    tracing::warn!(
                        conflict_id = %conflict.id(),
                        error = %error,
                        "Batch item failed"
                    );
                    result.failed.push(BatchFailure {
                        conflict_id: conflict.id(),
                        error,
                    });
                }
            }

            events.publish(ConflictEvent::BatchProgress {
                completed: result.processed(),
                total: result.total,
                conflict_id: conflict.id(),
            });
        }

        tracing::info!(
            resolved = result.resolved_ids.len(),
            failed = result.failed.len(),
            cancelled = result.cancelled,
            "Finished batch resolution"
        );
        events.publish(ConflictEvent::BatchFinished {
            resolved: result.resolved_ids.len(),
            failed: result.failed.len(),
            cancelled: result.cancelled,
        });

        result
    }
}
