//! Conflict detection.
//!
//! The detector classifies a pair of versions of the same record. It does not
//! register anything: callers hand the result to the store, which keeps batched
//! detection over many entities a plain loop.

use crate::{
    error::Result, ConflictType, ConflictVersion, EntityType, Error, SyncConflict, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of `detected_at` timestamps.
pub type Clock = fn() -> Timestamp;

/// Milliseconds since the Unix epoch.
pub fn system_clock() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or_default()
}

/// What the snapshot provider knows about the last common state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "camelCase")]
pub enum SyncBaseline {
    /// No baseline tracked; any divergence counts as concurrent
    #[default]
    Untracked,
    /// The record has never been synced, so both sides created it
    NeverSynced,
    /// Time of the last successful sync of this record
    LastSynced(Timestamp),
}

/// One record to run detection on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionInput {
    pub entity_type: EntityType,
    pub local: ConflictVersion,
    pub remote: ConflictVersion,
    #[serde(default)]
    pub baseline: SyncBaseline,
}

/// Classifies divergences between local and remote versions.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector {
    clock: Clock,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictDetector {
    pub fn new() -> Self {
        Self {
            clock: system_clock,
        }
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self { clock }
    }

    /// Detect a conflict between two versions of one record.
    ///
    /// Returns `Ok(None)` when the versions agree or when the divergence is a
    /// fast-forward relative to `baseline`.
    pub fn detect(
        &self,
        local: ConflictVersion,
        remote: ConflictVersion,
        entity_type: EntityType,
        baseline: SyncBaseline,
    ) -> Result<Option<SyncConflict>> {
        check_snapshot(&local, entity_type, "local")?;
        check_snapshot(&remote, entity_type, "remote")?;
        if local.snapshot.id != remote.snapshot.id {
            return Err(Error::InvalidSnapshot(format!(
                "local snapshot is '{}' but remote snapshot is '{}'",
                local.snapshot.id, remote.snapshot.id
            )));
        }

        let conflict_type = match (local.snapshot.deleted, remote.snapshot.deleted) {
            (true, true) => None,
            (true, false) | (false, true) => Some(ConflictType::Delete),
            (false, false) if local.snapshot.same_fields(&remote.snapshot) => None,
            (false, false) => match baseline {
                SyncBaseline::Untracked => Some(ConflictType::Update),
                SyncBaseline::NeverSynced => Some(ConflictType::Create),
                SyncBaseline::LastSynced(at) => {
                    (local.modified_at > at && remote.modified_at > at)
                        .then_some(ConflictType::Update)
                }
            },
        };

        let Some(conflict_type) = conflict_type else {
            tracing::debug!(
                entity_type = %entity_type,
                entity_id = %local.snapshot.id,
                "No conflict"
            );
            return Ok(None);
        };

        let conflict = SyncConflict::new(entity_type, conflict_type, local, remote, (self.clock)());
        tracing::debug!(
            conflict_id = %conflict.id(),
            entity_type = %entity_type,
            entity_id = %conflict.entity_id(),
            conflict_type = %conflict_type,
            "Detected conflict"
        );
        Ok(Some(conflict))
    }

    /// Run detection over many records, keeping only actual conflicts.
    pub fn detect_all(
        &self,
        inputs: impl IntoIterator<Item = DetectionInput>,
    ) -> Result<Vec<SyncConflict>> {
        inputs
            .into_iter()
            .filter_map(|input| {
                self.detect(input.local, input.remote, input.entity_type, input.baseline)
                    .transpose()
            })
            .collect()
    }
}

fn check_snapshot(version: &ConflictVersion, entity_type: EntityType, side: &str) -> Result<()> {
    if version.snapshot.entity_type != entity_type {
        return Err(Error::InvalidSnapshot(format!(
            "{side} snapshot is a {} but a {} was expected",
            version.snapshot.entity_type, entity_type
        )));
    }
    if !version.snapshot.payload.is_object() {
        return Err(Error::InvalidSnapshot(format!(
            "{side} payload must be an object"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeviceInfo, EntitySnapshot};
    use serde_json::{json, Value};

    fn fixed_clock() -> Timestamp {
        42
    }

    fn detector() -> ConflictDetector {
        ConflictDetector::with_clock(fixed_clock)
    }

    fn version(payload: Value, modified_at: Timestamp, device: &str) -> ConflictVersion {
        ConflictVersion::new(
            EntitySnapshot::new("item-1", EntityType::Item, payload),
            modified_at,
            DeviceInfo::new(device),
        )
    }

    fn tombstone(modified_at: Timestamp) -> ConflictVersion {
        ConflictVersion::new(
            EntitySnapshot::tombstone("item-1", EntityType::Item, json!({"name": "Lamp"})),
            modified_at,
            DeviceInfo::new("ipad"),
        )
    }

    #[test]
    fn identical_snapshots_are_not_conflicts() {
        let result = detector()
            .detect(
                version(json!({"name": "Lamp"}), 1000, "phone"),
                version(json!({"name": "Lamp", "notes": null}), 2000, "ipad"),
                EntityType::Item,
                SyncBaseline::Untracked,
            )
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn numbers_compare_by_value() {
        let result = detector()
            .detect(
                version(json!({"name": "Lamp", "purchasePrice": 10}), 1000, "phone"),
                version(json!({"name": "Lamp", "purchasePrice": 10.0}), 2000, "ipad"),
                EntityType::Item,
                SyncBaseline::Untracked,
            )
            .unwrap();
        assert!(result.is_none());

        let result = detector()
            .detect(
                version(json!({"name": "Lamp", "purchasePrice": 10}), 1000, "phone"),
                version(json!({"name": "Lamp", "purchasePrice": 10.5}), 2000, "ipad"),
                EntityType::Item,
                SyncBaseline::Untracked,
            )
            .unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn concurrent_edit_is_update() {
        let conflict = detector()
            .detect(
                version(json!({"name": "Lamp"}), 1000, "phone"),
                version(json!({"name": "Desk Lamp"}), 2000, "ipad"),
                EntityType::Item,
                SyncBaseline::Untracked,
            )
            .unwrap()
            .unwrap();
        assert_eq!(conflict.conflict_type(), ConflictType::Update);
        assert_eq!(conflict.detected_at(), 42);
        assert!(conflict.status().is_open());
    }

    #[test]
    fn baseline_separates_fast_forward_from_conflict() {
        let local = || version(json!({"name": "Lamp"}), 1000, "phone");
        let remote = || version(json!({"name": "Desk Lamp"}), 2000, "ipad");

        let concurrent = detector()
            .detect(local(), remote(), EntityType::Item, SyncBaseline::LastSynced(500))
            .unwrap();
        assert_eq!(
            concurrent.map(|c| c.conflict_type()),
            Some(ConflictType::Update)
        );

        // local has not changed since the last sync
        let fast_forward = detector()
            .detect(local(), remote(), EntityType::Item, SyncBaseline::LastSynced(1500))
            .unwrap();
        assert!(fast_forward.is_none());
    }

    #[test]
    fn never_synced_is_create() {
        let conflict = detector()
            .detect(
                version(json!({"name": "Lamp"}), 1000, "phone"),
                version(json!({"name": "Desk Lamp"}), 2000, "ipad"),
                EntityType::Item,
                SyncBaseline::NeverSynced,
            )
            .unwrap()
            .unwrap();
        assert_eq!(conflict.conflict_type(), ConflictType::Create);
    }

    #[test]
    fn one_tombstone_is_delete() {
        let conflict = detector()
            .detect(
                version(json!({"name": "Lamp"}), 1000, "phone"),
                tombstone(2000),
                EntityType::Item,
                SyncBaseline::Untracked,
            )
            .unwrap()
            .unwrap();
        assert_eq!(conflict.conflict_type(), ConflictType::Delete);

        let both_deleted = detector()
            .detect(tombstone(1000), tombstone(2000), EntityType::Item, SyncBaseline::Untracked)
            .unwrap();
        assert!(both_deleted.is_none());
    }

    #[test]
    fn mismatched_snapshots_are_rejected() {
        let other = ConflictVersion::new(
            EntitySnapshot::new("item-2", EntityType::Item, json!({"name": "Lamp"})),
            2000,
            DeviceInfo::new("ipad"),
        );
        let result = detector().detect(
            version(json!({"name": "Lamp"}), 1000, "phone"),
            other,
            EntityType::Item,
            SyncBaseline::Untracked,
        );
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));

        let result = detector().detect(
            version(json!({"name": "Lamp"}), 1000, "phone"),
            version(json!({"name": "Desk"}), 2000, "ipad"),
            EntityType::Receipt,
            SyncBaseline::Untracked,
        );
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn detect_all_skips_agreeing_records() {
        let inputs = vec![
            DetectionInput {
                entity_type: EntityType::Item,
                local: version(json!({"name": "Lamp"}), 1000, "phone"),
                remote: version(json!({"name": "Lamp"}), 2000, "ipad"),
                baseline: SyncBaseline::Untracked,
            },
            DetectionInput {
                entity_type: EntityType::Item,
                local: version(json!({"name": "Lamp"}), 1000, "phone"),
                remote: version(json!({"name": "Desk Lamp"}), 2000, "ipad"),
                baseline: SyncBaseline::Untracked,
            },
        ];

        let conflicts = detector().detect_all(inputs).unwrap();
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn baseline_wire_format() {
        assert_eq!(
            serde_json::to_value(SyncBaseline::LastSynced(1000)).unwrap(),
            json!({"kind": "lastSynced", "at": 1000})
        );
        let parsed: SyncBaseline = serde_json::from_value(json!({"kind": "untracked"})).unwrap();
        assert_eq!(parsed, SyncBaseline::Untracked);
    }
}
