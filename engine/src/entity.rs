//! Entity snapshots and the versions that make up a conflict.

use crate::merge::same_value;
use crate::{DeviceId, EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

static NULL: Value = Value::Null;

/// The closed set of synchronizable record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Item,
    Receipt,
    Location,
    Collection,
    Warranty,
    Document,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Item,
        EntityType::Receipt,
        EntityType::Location,
        EntityType::Collection,
        EntityType::Warranty,
        EntityType::Document,
    ];

    /// Wire name, as used in serialized payloads and URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Item => "item",
            EntityType::Receipt => "receipt",
            EntityType::Location => "location",
            EntityType::Collection => "collection",
            EntityType::Warranty => "warranty",
            EntityType::Document => "document",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EntityType::Item => "Item",
            EntityType::Receipt => "Receipt",
            EntityType::Location => "Location",
            EntityType::Collection => "Collection",
            EntityType::Warranty => "Warranty",
            EntityType::Document => "Document",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown entity type: {s}"))
    }
}

/// Full field set of a record at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    /// Identifier of the logical record
    pub id: EntityId,
    /// Kind of record
    pub entity_type: EntityType,
    /// Field values, always a JSON object
    pub payload: Value,
    /// Tombstone flag
    #[serde(default)]
    pub deleted: bool,
}

impl EntitySnapshot {
    /// Create an active snapshot.
    pub fn new(id: impl Into<EntityId>, entity_type: EntityType, payload: Value) -> Self {
        Self {
            id: id.into(),
            entity_type,
            payload,
            deleted: false,
        }
    }

    /// Create a tombstone carrying the last known payload.
    pub fn tombstone(id: impl Into<EntityId>, entity_type: EntityType, payload: Value) -> Self {
        let mut snapshot = Self::new(id, entity_type, payload);
        snapshot.mark_deleted();
        snapshot
    }

    pub fn is_active(&self) -> bool {
        !self.deleted
    }

    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// The payload as an object, if it is one.
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.payload.as_object()
    }

    /// Value of a field. A missing key reads as `null`.
    pub fn field(&self, name: &str) -> &Value {
        self.fields().and_then(|f| f.get(name)).unwrap_or(&NULL)
    }

    /// Every key present on either snapshot, sorted.
    pub fn field_names_with<'a>(&'a self, other: &'a EntitySnapshot) -> BTreeSet<&'a str> {
        self.fields()
            .into_iter()
            .chain(other.fields())
            .flat_map(|f| f.keys().map(String::as_str))
            .collect()
    }

    /// Field-for-field equality, treating missing keys as `null` and
    /// comparing numbers by value.
    pub fn same_fields(&self, other: &EntitySnapshot) -> bool {
        self.field_names_with(other)
            .into_iter()
            .all(|name| same_value(self.field(name), other.field(name)))
    }
}

/// Provenance of a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Stable device identifier, the secondary recency tie-break
    pub device_id: DeviceId,
    /// Human-readable name for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

impl DeviceInfo {
    pub fn new(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: None,
        }
    }

    pub fn named(device_id: impl Into<DeviceId>, device_name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: Some(device_name.into()),
        }
    }

    /// Name to show a user, falling back to the identifier.
    pub fn label(&self) -> &str {
        self.device_name.as_deref().unwrap_or(&self.device_id)
    }
}

/// One side of a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictVersion {
    /// Entity state at the time of the edit
    pub snapshot: EntitySnapshot,
    /// When the edit was made (milliseconds since epoch)
    pub modified_at: Timestamp,
    /// Device that made the edit
    pub device: DeviceInfo,
    /// User that made the edit, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
}

impl ConflictVersion {
    pub fn new(snapshot: EntitySnapshot, modified_at: Timestamp, device: DeviceInfo) -> Self {
        Self {
            snapshot,
            modified_at,
            device,
            modified_by: None,
        }
    }

    pub fn with_modified_by(mut self, user: impl Into<String>) -> Self {
        self.modified_by = Some(user.into());
        self
    }

    /// Order by `modified_at`, then by device id.
    pub fn recency_cmp(&self, other: &ConflictVersion) -> Ordering {
        match self.modified_at.cmp(&other.modified_at) {
            Ordering::Equal => self.device.device_id.cmp(&other.device.device_id),
            other => other,
        }
    }

    pub fn is_newer_than(&self, other: &ConflictVersion) -> bool {
        self.recency_cmp(other) == Ordering::Greater
    }
}
