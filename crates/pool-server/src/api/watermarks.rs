//! Watermark API handlers

use super::{ratelimit_headers, ClientId, LimitQuery};
use crate::models::{CollectRequest, CollectResponse};
use crate::ranking::{self, DEFAULT_READ_LIMIT};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tracing::error;

pub async fn recent_watermarks(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    Query(query): Query<LimitQuery>,
) -> Response {
    let admission = state.governor.admit(&client);
    let headers = ratelimit_headers(&admission);
    if !admission.allowed {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            Json(serde_json::json!({ "error": "rate limit exceeded" })),
        )
            .into_response();
    }

    let limit = query.limit.unwrap_or(DEFAULT_READ_LIMIT);
    match ranking::recent_watermarks(state.store.as_ref(), limit).await {
        Ok(views) => (StatusCode::OK, headers, Json(views)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to load recent watermarks");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}

pub async fn watermark_detail(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    Path(block_height): Path<u64>,
) -> Response {
    let admission = state.governor.admit(&client);
    let headers = ratelimit_headers(&admission);
    if !admission.allowed {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            Json(serde_json::json!({ "error": "rate limit exceeded" })),
        )
            .into_response();
    }

    match ranking::watermark_detail(state.store.as_ref(), block_height).await {
        Ok(Some(view)) => (StatusCode::OK, headers, Json(view)).into_response(),
        // Not collected yet: a normal outcome, distinct from bad input.
        Ok(None) => (
            StatusCode::NOT_FOUND,
            headers,
            Json(serde_json::json!({ "error": "no watermark for block" })),
        )
            .into_response(),
        Err(e) => {
            error!(block_height, error = %e, "failed to load watermark");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}

/// On-demand backfill for blocks the UI discovered missing. The batch is
/// capped and the deadline short; blocks that miss the deadline report
/// failed and finish in the background.
pub async fn trigger_collection(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    Json(request): Json<CollectRequest>,
) -> Response {
    let admission = state.governor.admit(&client);
    let headers = ratelimit_headers(&admission);
    if !admission.allowed {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            Json(serde_json::json!({ "error": "rate limit exceeded" })),
        )
            .into_response();
    }

    if request.block_heights.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            headers,
            Json(serde_json::json!({ "error": "block_heights must not be empty" })),
        )
            .into_response();
    }
    if request.block_heights.len() > state.collect.max_batch {
        return (
            StatusCode::BAD_REQUEST,
            headers,
            Json(serde_json::json!({
                "error": format!("at most {} blocks per request", state.collect.max_batch)
            })),
        )
            .into_response();
    }

    let results = state
        .collector
        .collect_many(
            &request.block_heights,
            state.collect.max_concurrent,
            state.collect.deadline,
        )
        .await;
    (StatusCode::OK, headers, Json(CollectResponse { results })).into_response()
}
