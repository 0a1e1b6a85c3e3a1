use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use hostrun_core::events::encode_frame;
use hostrun_core::types::ProjectId;
use hostrun_notify::{notification_for_outcome, RunOutcome};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::error::WebError;
use crate::state::WebState;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteQuery {
    pub token: Option<String>,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/projects/{project_id}/execute", get(execute_project))
        .route(
            "/api/projects/{project_id}/execution-failed",
            get(execution_failed),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

/// Starts a run and streams its events, one JSON object per line. The run
/// keeps going if the client disconnects.
async fn execute_project(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
    Query(query): Query<ExecuteQuery>,
) -> Result<Response, WebError> {
    state.authorize(query.token.as_deref())?;
    let project_id = ProjectId::new(project_id);
    let graph = state
        .project(&project_id)
        .await
        .ok_or_else(|| WebError::NotFound {
            resource: format!("project:{project_id}"),
        })?;

    info!(project_id = %project_id, "execution stream opened");
    let (tx, rx) = mpsc::channel(state.stream_buffer());
    let coordinator = state.coordinator().clone();
    let notifier = state.notifier();
    tokio::spawn(async move {
        let outcome = match coordinator.run(&graph, tx).await {
            Ok(summary) => RunOutcome::Completed(summary),
            Err(err) => RunOutcome::Failed {
                reason: err.to_string(),
            },
        };
        notifier.dispatch(&notification_for_outcome(Some(&graph.project_id), &outcome));
    });

    let frames = ReceiverStream::new(rx).filter_map(|event| match encode_frame(&event) {
        Ok(line) => Some(Ok::<_, Infallible>(line)),
        Err(err) => {
            warn!(error = %err, "dropping event that failed to encode");
            None
        }
    });

    Ok((
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(frames),
    )
        .into_response())
}

async fn execution_failed(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, WebError> {
    let project_id = ProjectId::new(project_id);
    if state.project(&project_id).await.is_none() {
        return Err(WebError::NotFound {
            resource: format!("project:{project_id}"),
        });
    }

    let failures = state.record_execution_failed(&project_id).await;
    warn!(project_id = %project_id, failures, "client received no execution events");
    state
        .notifier()
        .dispatch(&notification_for_outcome(Some(&project_id), &RunOutcome::ExecutionFailed));
    Ok(Json(serde_json::json!({ "ok": true })))
}
