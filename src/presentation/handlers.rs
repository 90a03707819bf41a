// HTTP request handlers
use crate::domain::error::IngestError;
use crate::infrastructure::sse::sse_from_receiver;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct StreamQuery {
    pub user_id: String,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Ingest one raw reading and return its classification
pub async fn submit_reading(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    match state.ingest_service.ingest(payload).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(e),
    }
}

/// Recent classified records for a sensor, newest first
pub async fn sensor_history(
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);

    match state.ingest_service.history(&id, limit).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(e),
    }
}

/// Live alert notifications for one user
pub async fn notification_stream(
    Query(query): Query<StreamQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.notifications.subscribe();
    sse_from_receiver(rx, query.user_id, state.shutdown.child_token())
}

fn error_response(error: IngestError) -> Response {
    let status = match &error {
        IngestError::MissingIdentifier => StatusCode::BAD_REQUEST,
        IngestError::UnknownSensor(_) => StatusCode::NOT_FOUND,
        IngestError::Store(e) => {
            tracing::error!("Store failure while handling request: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::classifier::Classifier;
    use crate::application::ingest_service::IngestService;
    use crate::infrastructure::config::ClassifierSettings;
    use crate::infrastructure::dispatcher::BroadcastDispatcher;
    use crate::infrastructure::memory_store::InMemoryStore;
    use tokio_util::sync::CancellationToken;

    async fn state() -> Arc<AppState> {
        let store = Arc::new(InMemoryStore::new());
        store.register_sensor("s1", &["alice"]).await;
        let notifications = BroadcastDispatcher::new(16);
        let ingest_service = IngestService::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(notifications.clone()),
            Classifier::new(ClassifierSettings::default()),
        );
        Arc::new(AppState {
            ingest_service,
            notifications,
            shutdown: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn test_submit_reading_status_codes() {
        let state = state().await;

        let ok = submit_reading(
            State(state.clone()),
            Json(json!({"sensor_id": "s1", "temperature": 24.0})),
        )
        .await;
        assert_eq!(ok.status(), StatusCode::OK);

        let missing = submit_reading(State(state.clone()), Json(json!({"temperature": 24.0}))).await;
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let unknown = submit_reading(State(state), Json(json!({"sensor_id": "nope"}))).await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_history_for_unknown_sensor_is_not_found() {
        let state = state().await;
        let response = sensor_history(
            Path("nope".to_string()),
            Query(HistoryQuery { limit: None }),
            State(state),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_history_returns_records() {
        let state = state().await;
        submit_reading(
            State(state.clone()),
            Json(json!({"sensor_id": "s1", "temperature": 24.0})),
        )
        .await;

        let records = state.ingest_service.history("s1", 5).await.unwrap();
        assert_eq!(records.len(), 1);

        let response = sensor_history(
            Path("s1".to_string()),
            Query(HistoryQuery { limit: Some(5) }),
            State(state),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
