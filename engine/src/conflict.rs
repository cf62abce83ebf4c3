//! Conflict records and the instructions that resolve them.

use crate::{ConflictVersion, EntityId, EntitySnapshot, EntityType, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a conflict, stable across detection passes.
pub type ConflictId = Uuid;

/// Namespace for deriving conflict ids. Changing it changes every id.
const CONFLICT_NAMESPACE: Uuid = Uuid::from_u128(0x5f0c_2b7e_9a41_4d2c_b1e3_6a8d_0c7f_3e19);

/// Derive the id of the divergence between `local` and `remote`.
///
/// The key covers both versions' provenance and content, so two edits that
/// share a timestamp and device still get distinct ids.
pub fn conflict_id(
    entity_type: EntityType,
    local: &ConflictVersion,
    remote: &ConflictVersion,
) -> ConflictId {
    let key = format!(
        "{}:{}:{}@{}:{}@{}:{}:{}",
        entity_type.as_str(),
        local.snapshot.id,
        local.modified_at,
        local.device.device_id,
        remote.modified_at,
        remote.device.device_id,
        content_key(&local.snapshot),
        content_key(&remote.snapshot),
    );
    Uuid::new_v5(&CONFLICT_NAMESPACE, key.as_bytes())
}

/// Canonical text of a snapshot's content; object keys serialize sorted.
fn content_key(snapshot: &EntitySnapshot) -> String {
    let marker = if snapshot.deleted { "deleted" } else { "active" };
    format!("{marker}{}", snapshot.payload)
}

/// Classification of a divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictType {
    /// Both sides modified
    Update,
    /// One side deleted, the other modified
    Delete,
    /// Created independently on several devices
    Create,
}

impl ConflictType {
    pub fn display_name(&self) -> &'static str {
        match self {
            ConflictType::Update => "Update Conflict",
            ConflictType::Delete => "Delete Conflict",
            ConflictType::Create => "Duplicate Creation",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConflictType::Update => "This item was modified in multiple places",
            ConflictType::Delete => {
                "This item was deleted on one device but modified on another"
            }
            ConflictType::Create => "This item was created on multiple devices",
        }
    }

    /// A deletion cannot be combined field by field with an edit.
    pub fn allows_field_merge(&self) -> bool {
        !matches!(self, ConflictType::Delete)
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Lifecycle state of a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ConflictStatus {
    Open,
    /// A resolution is in flight
    Resolving,
    Resolved,
    /// Persisting the last resolution failed; can be resolved again
    Failed { error: String },
}

impl ConflictStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, ConflictStatus::Open)
    }

    /// Whether a new resolution may start from this state.
    pub fn accepts_resolution(&self) -> bool {
        matches!(self, ConflictStatus::Open | ConflictStatus::Failed { .. })
    }
}

/// A detected divergence between a local and a remote version of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    id: ConflictId,
    entity_type: EntityType,
    entity_id: EntityId,
    conflict_type: ConflictType,
    local: ConflictVersion,
    remote: ConflictVersion,
    status: ConflictStatus,
    detected_at: Timestamp,
}

impl SyncConflict {
    /// Create an open conflict. The id is derived from both versions.
    pub fn new(
        entity_type: EntityType,
        conflict_type: ConflictType,
        local: ConflictVersion,
        remote: ConflictVersion,
        detected_at: Timestamp,
    ) -> Self {
        Self {
            id: conflict_id(entity_type, &local, &remote),
            entity_type,
            entity_id: local.snapshot.id.clone(),
            conflict_type,
            local,
            remote,
            status: ConflictStatus::Open,
            detected_at,
        }
    }

    pub fn id(&self) -> ConflictId {
        self.id
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn conflict_type(&self) -> ConflictType {
        self.conflict_type
    }

    pub fn local(&self) -> &ConflictVersion {
        &self.local
    }

    pub fn remote(&self) -> &ConflictVersion {
        &self.remote
    }

    pub fn status(&self) -> &ConflictStatus {
        &self.status
    }

    pub fn detected_at(&self) -> Timestamp {
        self.detected_at
    }

    pub(crate) fn set_status(&mut self, status: ConflictStatus) {
        self.status = status;
    }
}

/// How a single field is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FieldResolutionType {
    UseLocal,
    UseRemote,
    /// Numeric mean (numeric fields only)
    Average,
    /// `local + separator + remote` (text fields only)
    Concatenate { separator: String },
    /// Value from the more recently modified version
    Latest,
}

impl FieldResolutionType {
    pub fn display_name(&self) -> &'static str {
        match self {
            FieldResolutionType::UseLocal => "Use Local",
            FieldResolutionType::UseRemote => "Use Remote",
            FieldResolutionType::Average => "Average",
            FieldResolutionType::Concatenate { .. } => "Concatenate",
            FieldResolutionType::Latest => "Latest",
        }
    }
}

/// Resolution instruction for a named field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldResolution {
    pub field_name: String,
    pub resolution: FieldResolutionType,
}

impl FieldResolution {
    pub fn new(field_name: impl Into<String>, resolution: FieldResolutionType) -> Self {
        Self {
            field_name: field_name.into(),
            resolution,
        }
    }

    pub fn use_local(field_name: impl Into<String>) -> Self {
        Self::new(field_name, FieldResolutionType::UseLocal)
    }

    pub fn use_remote(field_name: impl Into<String>) -> Self {
        Self::new(field_name, FieldResolutionType::UseRemote)
    }

    pub fn average(field_name: impl Into<String>) -> Self {
        Self::new(field_name, FieldResolutionType::Average)
    }

    pub fn concatenate(field_name: impl Into<String>, separator: impl Into<String>) -> Self {
        Self::new(
            field_name,
            FieldResolutionType::Concatenate {
                separator: separator.into(),
            },
        )
    }

    pub fn latest(field_name: impl Into<String>) -> Self {
        Self::new(field_name, FieldResolutionType::Latest)
    }
}

/// How `merge` picks values when no per-field instruction is given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "resolutions", rename_all = "camelCase")]
pub enum MergeStrategy {
    /// The more recently modified version wins
    LatestWins,
    LocalPriority,
    RemotePriority,
    /// Same as [`ConflictResolution::Custom`], fields without an entry keep the local value
    FieldLevel(Vec<FieldResolution>),
}

impl MergeStrategy {
    pub fn display_name(&self) -> &'static str {
        match self {
            MergeStrategy::LatestWins => "Latest Changes Win",
            MergeStrategy::LocalPriority => "Local Priority",
            MergeStrategy::RemotePriority => "Remote Priority",
            MergeStrategy::FieldLevel(_) => "Field-by-Field",
        }
    }
}

/// Instruction a caller supplies to resolve one conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ConflictResolution {
    KeepLocal,
    KeepRemote,
    Merge(MergeStrategy),
    /// Must cover every conflicting field
    Custom(Vec<FieldResolution>),
}

impl ConflictResolution {
    pub fn display_name(&self) -> String {
        match self {
            ConflictResolution::KeepLocal => "Keep Local Version".to_string(),
            ConflictResolution::KeepRemote => "Keep Remote Version".to_string(),
            ConflictResolution::Merge(strategy) => format!("Merge ({})", strategy.display_name()),
            ConflictResolution::Custom(_) => "Custom Resolution".to_string(),
        }
    }
}

/// One field that differs between the two versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field_name: String,
    pub display_name: String,
    /// Local value, display-ready
    pub old_value: Option<String>,
    /// Remote value, display-ready
    pub new_value: Option<String>,
    pub is_conflicting: bool,
}

/// Every field change of a conflict. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetails {
    pub conflict_id: ConflictId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub conflict_type: ConflictType,
    pub changes: Vec<FieldChange>,
}

impl ConflictDetails {
    pub fn conflicting_fields(&self) -> impl Iterator<Item = &str> {
        self.changes
            .iter()
            .filter(|c| c.is_conflicting)
            .map(|c| c.field_name.as_str())
    }
}

/// Record of a successfully persisted resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOutcome {
    pub conflict_id: ConflictId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub resolution: ConflictResolution,
    pub merged: EntitySnapshot,
    pub resolved_at: Timestamp,
}
