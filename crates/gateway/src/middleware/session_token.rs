//! Bearer session-token extractor for embedded API routes.
//!
//! Requests from the embedded app carry `Authorization: Bearer <jwt>`;
//! the token is validated against the app credentials and resolves to a
//! shop plus user id. Any validation failure is a 401 with no detail
//! beyond the logged reason.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::session_token::VerifiedSession;
use crate::state::AppState;

/// Extractor yielding the validated session for a bearer token.
pub struct BearerSession(pub VerifiedSession);

/// Rejection for a missing or invalid bearer token.
pub struct BearerRejection;

impl IntoResponse for BearerRejection {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
    }
}

impl FromRequestParts<AppState> for BearerSession {
    type Rejection = BearerRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(BearerRejection)?;

        let session = state
            .session_tokens()
            .validate(token, Utc::now())
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected session token");
                BearerRejection
            })?;

        Ok(Self(session))
    }
}
