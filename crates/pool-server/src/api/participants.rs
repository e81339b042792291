//! Per-participant history API handlers
//!
//! A non-public participant gets the same empty 200 as an address the pool
//! has never seen, so the response shape cannot confirm or deny that an
//! address exists.

use super::{ratelimit_headers, ClientId, LimitQuery};
use crate::ranking::{self, DEFAULT_READ_LIMIT};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tracing::error;

/// Cheap shape check; full address validation belongs to the wallet layer.
fn is_plausible_address(address: &str) -> bool {
    !address.is_empty()
        && address.len() <= 100
        && address.chars().all(|c| c.is_ascii_alphanumeric())
}

pub async fn watermark_history(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    Path(address): Path<String>,
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

    if !is_plausible_address(&address) {
        return (
            StatusCode::BAD_REQUEST,
            headers,
            Json(serde_json::json!({ "error": "invalid address" })),
        )
            .into_response();
    }

    let limit = query.limit.unwrap_or(DEFAULT_READ_LIMIT);
    match ranking::participant_watermark_history(state.store.as_ref(), &address, limit).await {
        Ok(views) => (StatusCode::OK, headers, Json(views)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to load watermark history");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}

pub async fn submission_history(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    Path(address): Path<String>,
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

    if !is_plausible_address(&address) {
        return (
            StatusCode::BAD_REQUEST,
            headers,
            Json(serde_json::json!({ "error": "invalid address" })),
        )
            .into_response();
    }

    let limit = query.limit.unwrap_or(DEFAULT_READ_LIMIT);
    match ranking::participant_submission_history(state.store.as_ref(), &address, limit).await {
        Ok(views) => (StatusCode::OK, headers, Json(views)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to load submission history");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}
