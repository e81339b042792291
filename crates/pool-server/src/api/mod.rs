//! Public API handlers
//!
//! Every read endpoint is governed: the admission check runs before the
//! store is touched, and the window metadata rides on the response whether
//! the request was admitted or denied.

pub mod leaderboard;
pub mod participants;
pub mod watermarks;

use crate::ratelimit::Admission;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderName;
use serde::Deserialize;
use std::convert::Infallible;

/// Query parameter shared by all listing endpoints.
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Rate-limit identity for an inbound request: the first forwarded-for hop,
/// else a shared fallback bucket. Opaque to the governor.
pub struct ClientId(pub String);

fn client_id_from_header(forwarded_for: Option<&str>) -> String {
    forwarded_for
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok());
        Ok(ClientId(client_id_from_header(forwarded)))
    }
}

/// Window metadata attached to every governed response.
pub fn ratelimit_headers(admission: &Admission) -> [(HeaderName, String); 3] {
    [
        (
            HeaderName::from_static("x-ratelimit-limit"),
            admission.limit.to_string(),
        ),
        (
            HeaderName::from_static("x-ratelimit-remaining"),
            admission.remaining.to_string(),
        ),
        (
            HeaderName::from_static("x-ratelimit-reset"),
            admission.reset_at.to_string(),
        ),
    ]
}
