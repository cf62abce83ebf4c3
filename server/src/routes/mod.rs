//! HTTP route definitions.

mod conflicts;
mod entities;
mod events;
mod health;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(conflicts::routes())
        .merge(entities::routes())
        .merge(events::routes())
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::{build_app, websocket, AppState};
    use serde_json::{json, Value};

    async fn spawn_server() -> String {
        let state = AppState::new(Config::default());
        websocket::spawn_event_forwarder(state.engine.subscribe(), state.conn_manager.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_app(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_health_over_http() {
        let base = spawn_server().await;

        let health: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["activeConflicts"], 0);
        assert_eq!(health["connections"], 0);
        assert_eq!(health["batchRunning"], false);
        assert_eq!(health["rounding"], "halfUp");
    }

    #[tokio::test]
    async fn test_delete_conflict_over_http() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let detection = json!({
            "entityType": "receipt",
            "local": {
                "snapshot": {"id": "r-1", "entityType": "receipt", "payload": {"storeName": "Hardware Co"}, "deleted": true},
                "modifiedAt": 5_000,
                "device": {"deviceId": "phone", "deviceName": "Phone"}
            },
            "remote": {
                "snapshot": {"id": "r-1", "entityType": "receipt", "payload": {"storeName": "Hardware Co", "totalAmount": 42.10}},
                "modifiedAt": 4_000,
                "device": {"deviceId": "laptop"}
            }
        });
        let conflict: Value = client
            .post(format!("{base}/conflicts/detect"))
            .json(&detection)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(conflict["conflictType"], "delete");
        let id = conflict["id"].as_str().unwrap();

        // Field-level merging cannot apply to a deletion
        let response = client
            .post(format!("{base}/conflicts/{id}/resolve"))
            .json(&json!({"type": "merge", "value": {"type": "fieldLevel", "resolutions": []}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

        let response = client
            .post(format!("{base}/conflicts/{id}/resolve"))
            .json(&json!({"type": "keepRemote"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let entity: Value = client
            .get(format!("{base}/entities/receipt/r-1"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(entity["deleted"], false);
        assert_eq!(entity["payload"]["totalAmount"], json!(42.10));
    }
}
