//! Leaderboard API handlers

use super::{ratelimit_headers, ClientId, LimitQuery};
use crate::ranking::{self, DEFAULT_READ_LIMIT};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tracing::error;

/// Win-count leaderboard: blocks won per public participant.
pub async fn win_leaderboard(
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
    match ranking::watermark_leaderboard(state.store.as_ref(), limit).await {
        Ok(rows) => (StatusCode::OK, headers, Json(rows)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to load win leaderboard");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}

/// Combined leaderboard: best difficulty and total wins ranked
/// independently, then averaged.
pub async fn combined_leaderboard(
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
    match ranking::combined_leaderboard(state.store.as_ref(), limit).await {
        Ok(rows) => (StatusCode::OK, headers, Json(rows)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to load combined leaderboard");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}
