//! JSON contract of the HTTP and WebSocket bodies.
//!
//! Clients build these bodies by hand, so the shapes are pinned here.

use serde_json::json;
use stockpile_engine::{
    ConflictEvent, ConflictResolution, DetectionInput, FieldResolutionType, MergeStrategy,
    SyncBaseline,
};
use uuid::Uuid;

// ============================================================================
// Resolution bodies
// ============================================================================

#[test]
fn test_whole_record_resolutions() {
    let keep_local: ConflictResolution = serde_json::from_value(json!({"type": "keepLocal"})).unwrap();
    assert_eq!(keep_local, ConflictResolution::KeepLocal);

    let keep_remote: ConflictResolution =
        serde_json::from_value(json!({"type": "keepRemote"})).unwrap();
    assert_eq!(keep_remote, ConflictResolution::KeepRemote);
}

#[test]
fn test_merge_strategies() {
    let latest: ConflictResolution =
        serde_json::from_value(json!({"type": "merge", "value": {"type": "latestWins"}})).unwrap();
    assert_eq!(latest, ConflictResolution::Merge(MergeStrategy::LatestWins));

    let field_level: ConflictResolution = serde_json::from_value(json!({
        "type": "merge",
        "value": {
            "type": "fieldLevel",
            "resolutions": [{"fieldName": "quantity", "resolution": {"type": "latest"}}]
        }
    }))
    .unwrap();
    match field_level {
        ConflictResolution::Merge(MergeStrategy::FieldLevel(resolutions)) => {
            assert_eq!(resolutions.len(), 1);
            assert_eq!(resolutions[0].field_name, "quantity");
            assert_eq!(resolutions[0].resolution, FieldResolutionType::Latest);
        }
        other => panic!("Expected field-level merge, got {:?}", other),
    }
}

#[test]
fn test_custom_resolution() {
    let custom: ConflictResolution = serde_json::from_value(json!({
        "type": "custom",
        "value": [
            {"fieldName": "notes", "resolution": {"type": "concatenate", "separator": " / "}},
            {"fieldName": "value", "resolution": {"type": "average"}}
        ]
    }))
    .unwrap();

    let ConflictResolution::Custom(resolutions) = custom else {
        panic!("Expected custom resolution");
    };
    assert_eq!(
        resolutions[0].resolution,
        FieldResolutionType::Concatenate {
            separator: " / ".to_string()
        }
    );
    assert_eq!(resolutions[1].resolution, FieldResolutionType::Average);
}

#[test]
fn test_unknown_resolution_is_rejected() {
    let result = serde_json::from_value::<ConflictResolution>(json!({"type": "keepBoth"}));
    assert!(result.is_err());
}

// ============================================================================
// Detection bodies
// ============================================================================

#[test]
fn test_detection_input_defaults_to_untracked_baseline() {
    let input: DetectionInput = serde_json::from_value(json!({
        "entityType": "item",
        "local": {
            "snapshot": {"id": "lamp", "entityType": "item", "payload": {"name": "Lamp"}},
            "modifiedAt": 1000,
            "device": {"deviceId": "phone"}
        },
        "remote": {
            "snapshot": {"id": "lamp", "entityType": "item", "payload": {"name": "Lamp"}, "deleted": true},
            "modifiedAt": 2000,
            "device": {"deviceId": "tablet", "deviceName": "Tablet"},
            "modifiedBy": "sam"
        }
    }))
    .unwrap();

    assert_eq!(input.baseline, SyncBaseline::Untracked);
    assert!(!input.local.snapshot.deleted);
    assert!(input.remote.snapshot.deleted);
    assert_eq!(input.remote.device.label(), "Tablet");
    assert_eq!(input.remote.modified_by.as_deref(), Some("sam"));
}

#[test]
fn test_baseline_shapes() {
    let last: SyncBaseline = serde_json::from_value(json!({"kind": "lastSynced", "at": 500})).unwrap();
    assert_eq!(last, SyncBaseline::LastSynced(500));

    let never: SyncBaseline = serde_json::from_value(json!({"kind": "neverSynced"})).unwrap();
    assert_eq!(never, SyncBaseline::NeverSynced);
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_event_shapes() {
    let id = Uuid::nil();

    let progress = serde_json::to_value(ConflictEvent::BatchProgress {
        completed: 1,
        total: 4,
        conflict_id: id,
    })
    .unwrap();
    assert_eq!(
        progress,
        json!({"type": "batch_progress", "completed": 1, "total": 4, "conflictId": id})
    );

    let failed = serde_json::to_value(ConflictEvent::Failed {
        conflict_id: id,
        error: "disk full".to_string(),
    })
    .unwrap();
    assert_eq!(failed["type"], "failed");
    assert_eq!(failed["error"], "disk full");
}
