//! Authentication extractors for merchant sessions.
//!
//! Cookie sessions identify merchants on browser-facing routes (billing
//! pages, the embedded app shell). In-context API routes use
//! [`super::BearerSession`] instead.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::models::CurrentMerchant;

/// Extractor that requires a signed-in merchant.
///
/// If no merchant session exists, browser routes redirect into the
/// install flow and API routes get a plain 401.
pub struct RequireMerchant(pub CurrentMerchant);

/// Rejection for a missing merchant session.
pub enum AuthRejection {
    /// Redirect to the install page (for HTML requests).
    RedirectToInstall,
    /// Unauthorized response (for API requests).
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToInstall => Redirect::to("/install").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for RequireMerchant
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Get the session from extensions (set by SessionManagerLayer)
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AuthRejection::Unauthorized)?;

        let merchant: CurrentMerchant = session
            .get(CurrentMerchant::SESSION_KEY)
            .await
            .ok()
            .flatten()
            .ok_or_else(|| {
                let is_api = parts.uri.path().starts_with("/api/");
                if is_api {
                    AuthRejection::Unauthorized
                } else {
                    AuthRejection::RedirectToInstall
                }
            })?;

        crate::error::set_sentry_merchant(merchant.merchant_id.as_i32(), merchant.shop.as_str());

        Ok(Self(merchant))
    }
}

/// Helper to set the current merchant in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_merchant(
    session: &Session,
    merchant: &CurrentMerchant,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(CurrentMerchant::SESSION_KEY, merchant).await
}

/// Helper to clear the current merchant from the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_merchant(
    session: &Session,
) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentMerchant>(CurrentMerchant::SESSION_KEY)
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use shopgate_core::{MerchantId, ShopDomain};

    use super::*;

    fn test_session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn test_set_then_clear_current_merchant() {
        let session = test_session();
        let merchant = CurrentMerchant {
            merchant_id: MerchantId::new(7),
            shop: ShopDomain::parse("acme").unwrap(),
        };

        set_current_merchant(&session, &merchant).await.unwrap();
        let stored: Option<CurrentMerchant> =
            session.get(CurrentMerchant::SESSION_KEY).await.unwrap();
        assert_eq!(stored.unwrap().merchant_id, MerchantId::new(7));

        clear_current_merchant(&session).await.unwrap();
        let stored: Option<CurrentMerchant> =
            session.get(CurrentMerchant::SESSION_KEY).await.unwrap();
        assert!(stored.is_none());
    }
}
