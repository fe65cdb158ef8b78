//! Bearer token authentication for the repair endpoints

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
};
use std::sync::Arc;
use tracing::warn;

use crate::AppState;

/// Handlers taking this extractor only run for requests carrying
/// `Authorization: Bearer <api key>`. `/health` does not take it.
pub struct ApiKeyAuth;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

impl FromRequestParts<Arc<AppState>> for ApiKeyAuth {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(&parts.headers) {
            Some(token) if token == state.api_key => Ok(ApiKeyAuth),
            Some(_) => {
                warn!("Rejected {} with wrong API key", parts.uri.path());
                Err((StatusCode::UNAUTHORIZED, "invalid API key"))
            }
            None => {
                warn!("Rejected {} without bearer token", parts.uri.path());
                Err((StatusCode::UNAUTHORIZED, "missing bearer token"))
            }
        }
    }
}
