//! # Stockpile Engine
//!
//! Conflict detection and resolution for a local-first home inventory.
//!
//! When the same record was edited on two devices, the sync layer hands this
//! crate both versions. The engine detects whether they actually conflict,
//! shows what differs, and persists whatever the user (or an automated policy)
//! decides.
//!
//! ## Design Principles
//!
//! - **No transport**: remote snapshots arrive pre-populated from the caller
//! - **One suspension point**: resolving a conflict awaits a single repository `save`
//! - **No partial merges**: every instruction is validated before anything is saved
//! - **One outcome per conflict**: concurrent resolutions of the same id are serialized
//!
//! ## Core Concepts
//!
//! ### Conflicts
//!
//! A [`SyncConflict`] pairs a local and a remote [`ConflictVersion`] of one
//! entity. The [`ConflictDetector`] classifies divergences as
//! [`ConflictType::Update`], [`ConflictType::Delete`] or [`ConflictType::Create`].
//!
//! ### Resolutions
//!
//! A [`ConflictResolution`] collapses the two versions into one entity:
//! - [`ConflictResolution::KeepLocal`] / [`ConflictResolution::KeepRemote`] - whole record
//! - [`ConflictResolution::Merge`] - automatic, per [`MergeStrategy`]
//! - [`ConflictResolution::Custom`] - explicit [`FieldResolution`] for every changed field
//!
//! Field-level merges are computed by the [`FieldMergeEngine`] against the
//! [`Schema`], which decides where `average` and `concatenate` are legal.
//!
//! ### Lifecycle
//!
//! Unresolved conflicts live in the [`ConflictStore`]. A conflict leaves the
//! store once its merged entity is saved; if saving fails it stays, marked
//! `failed`, so it can be resolved again.
//!
//! ## Quick Start
//!
//! ```rust
//! use stockpile_engine::{
//!     ConflictResolution, ConflictResolutionEngine, ConflictVersion, DetectionInput,
//!     DeviceInfo, EngineConfig, EntitySnapshot, EntityType, FieldResolution,
//!     InMemoryRepository, RepositoryRegistry, Schema, SyncBaseline,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), stockpile_engine::Error> {
//! let items = InMemoryRepository::new_shared(EntityType::Item);
//! let engine = ConflictResolutionEngine::new(
//!     Schema::inventory(),
//!     RepositoryRegistry::new().with(items.clone()),
//!     EngineConfig::default(),
//! );
//!
//! let local = ConflictVersion::new(
//!     EntitySnapshot::new("item-1", EntityType::Item, json!({"name": "Lamp", "quantity": 1})),
//!     1_706_745_600_000,
//!     DeviceInfo::named("phone", "Sam's iPhone"),
//! );
//! let remote = ConflictVersion::new(
//!     EntitySnapshot::new("item-1", EntityType::Item, json!({"name": "Desk Lamp", "quantity": 3})),
//!     1_706_745_900_000,
//!     DeviceInfo::named("ipad", "Kitchen iPad"),
//! );
//!
//! let conflict = engine
//!     .detect_and_register(DetectionInput {
//!         entity_type: EntityType::Item,
//!         local,
//!         remote,
//!         baseline: SyncBaseline::Untracked,
//!     })?
//!     .expect("versions differ");
//!
//! let details = engine.conflict_details(&conflict);
//! assert_eq!(details.conflicting_fields().collect::<Vec<_>>(), ["name", "quantity"]);
//!
//! let merged = engine
//!     .resolve_conflict(
//!         &conflict,
//!         ConflictResolution::Custom(vec![
//!             FieldResolution::use_remote("name"),
//!             FieldResolution::average("quantity"),
//!         ]),
//!     )
//!     .await?;
//!
//! assert_eq!(merged.payload, json!({"name": "Desk Lamp", "quantity": 2}));
//! assert!(engine.active_conflicts().is_empty());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod conflict;
pub mod detect;
pub mod engine;
pub mod entity;
pub mod error;
pub mod events;
pub mod merge;
pub mod repository;
pub mod schema;
pub mod store;

// Re-export main types at crate root
pub use batch::{BatchFailure, BatchResolver, BatchResult};
pub use config::{ConfigError, EngineConfig, RoundingMode};
pub use conflict::{
    conflict_id, ConflictDetails, ConflictId, ConflictResolution, ConflictStatus, ConflictType,
    FieldChange, FieldResolution, FieldResolutionType, MergeStrategy, ResolutionOutcome,
    SyncConflict,
};
pub use detect::{system_clock, Clock, ConflictDetector, DetectionInput, SyncBaseline};
pub use engine::ConflictResolutionEngine;
pub use entity::{ConflictVersion, DeviceInfo, EntitySnapshot, EntityType};
pub use error::{Error, ErrorCategory};
pub use events::{ConflictEvent, EventBus};
pub use merge::{display_value, FieldMergeEngine, FieldPlan};
pub use repository::{InMemoryRepository, Repository, RepositoryError, RepositoryRegistry};
pub use schema::{EntitySchema, FieldDef, FieldType, Schema};
pub use store::{ConflictStore, RegisterOutcome};
pub use tokio_util::sync::CancellationToken;

/// Type aliases for clarity
pub type EntityId = String;
pub type DeviceId = String;
pub type Timestamp = u64;
