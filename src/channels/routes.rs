//! HTTP webhook for inbound mail relays.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::PipelineError;
use crate::pipeline::processor::{Envelope, ReceiptProcessor};
use crate::pipeline::types::CorrelationId;

/// Largest raw message accepted by `POST /inbound`.
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Shared state for webhook routes.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<ReceiptProcessor>,
}

/// Envelope addresses passed by the relay as query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct InboundQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// GET /
async fn hello() -> &'static str {
    "Hello World!"
}

/// POST /inbound?from=&to=
///
/// Body is the raw RFC 5322 message.
async fn inbound(
    State(state): State<AppState>,
    Query(query): Query<InboundQuery>,
    body: Bytes,
) -> impl IntoResponse {
    let correlation_id = CorrelationId::generate();
    let envelope = Envelope {
        from: query.from,
        to: query.to,
    };

    match state.processor.handle(&body, &envelope, &correlation_id).await {
        Ok(outcome) => (StatusCode::OK, Json(serde_json::json!(outcome))).into_response(),
        Err(e) => {
            let status = status_for(&e);
            if status == StatusCode::UNPROCESSABLE_ENTITY {
                warn!(correlation_id = %correlation_id, error = %e, "Rejected malformed email");
            } else {
                error!(correlation_id = %correlation_id, error = %e, "Inbound email failed");
            }
            (
                status,
                Json(serde_json::json!({
                    "correlation_id": correlation_id,
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Email(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Classifier(_)
        | PipelineError::InconsistentClassification
        | PipelineError::Reply(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Build the webhook routes. Inbound bodies up to `max_body_bytes` are accepted.
pub fn inbound_routes(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/inbound", post(inbound))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
