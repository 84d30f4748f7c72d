//! Session token validation for embedded in-context requests.
//!
//! The embedding host issues a short-lived HS256 JWT (signed with the app
//! client secret) on every in-context request. Validation is a pure
//! function of (token, current time, expected claim set): signature,
//! expiry window, audience (the app client id), and the issuer/destination
//! pair naming the shop. A token failing any check is invalid - callers
//! must not proceed with a partially-validated identity.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use shopgate_core::ShopDomain;

/// Clock skew tolerance, in seconds.
const LEEWAY_SECS: i64 = 5;

/// Errors from session token validation.
#[derive(Debug, thiserror::Error)]
pub enum SessionTokenError {
    /// Token `exp` is in the past.
    #[error("session token expired")]
    Expired,
    /// Token `nbf` is in the future.
    #[error("session token not yet valid")]
    NotYetValid,
    /// `aud` does not name this app.
    #[error("session token audience mismatch")]
    AudienceMismatch,
    /// `iss`/`dest` disagree or do not name a valid shop.
    #[error("session token issuer/destination mismatch")]
    IssuerMismatch,
    /// Bad signature, malformed token, or missing claims.
    #[error("invalid session token: {0}")]
    Invalid(String),
}

/// Raw claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokenClaims {
    /// Issuer: `https://{shop}/admin`.
    pub iss: String,
    /// Destination: `https://{shop}`.
    pub dest: String,
    /// Audience: the app client id.
    pub aud: String,
    /// Subject: the platform user id.
    pub sub: String,
    /// Expiry (unix seconds).
    pub exp: i64,
    /// Not-before (unix seconds).
    pub nbf: i64,
    /// Issued-at (unix seconds).
    pub iat: i64,
    /// Token id.
    pub jti: String,
    /// Embedded session id.
    #[serde(default)]
    pub sid: Option<String>,
}

/// A validated session identity.
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    /// The shop the request belongs to.
    pub shop: ShopDomain,
    /// The platform user id (`sub` claim).
    pub user_id: String,
}

/// Stateless validator for session tokens.
#[derive(Clone)]
pub struct SessionTokenValidator {
    decoding_key: DecodingKey,
    client_id: String,
}

impl SessionTokenValidator {
    /// Create a validator from the app credentials.
    #[must_use]
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(client_secret.as_bytes()),
            client_id: client_id.to_owned(),
        }
    }

    /// Validate a session token at `now`.
    ///
    /// # Errors
    ///
    /// Returns a `SessionTokenError` describing the first failed check;
    /// any error means the identity must be discarded wholesale.
    pub fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedSession, SessionTokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time claims are checked below against the injected clock so the
        // validator stays a pure function of (token, now).
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

        let data = decode::<SessionTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| SessionTokenError::Invalid(e.to_string()))?;
        let claims = data.claims;

        let ts = now.timestamp();
        if claims.exp < ts - LEEWAY_SECS {
            return Err(SessionTokenError::Expired);
        }
        if claims.nbf > ts + LEEWAY_SECS {
            return Err(SessionTokenError::NotYetValid);
        }

        if claims.aud != self.client_id {
            return Err(SessionTokenError::AudienceMismatch);
        }

        // dest is `https://{shop}` and iss must be dest + `/admin`; both
        // must resolve to the same, valid shop domain.
        let shop_host = claims
            .dest
            .strip_prefix("https://")
            .ok_or(SessionTokenError::IssuerMismatch)?;
        let shop = ShopDomain::parse(shop_host).map_err(|_| SessionTokenError::IssuerMismatch)?;
        if shop.as_str() != shop_host {
            return Err(SessionTokenError::IssuerMismatch);
        }
        if claims.iss != format!("{}/admin", claims.dest) {
            return Err(SessionTokenError::IssuerMismatch);
        }

        Ok(VerifiedSession {
            shop,
            user_id: claims.sub,
        })
    }
}

impl std::fmt::Debug for SessionTokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenValidator")
            .field("client_id", &self.client_id)
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const CLIENT_ID: &str = "test-client-id";
    const CLIENT_SECRET: &str = "test-client-secret";

    fn validator() -> SessionTokenValidator {
        SessionTokenValidator::new(CLIENT_ID, CLIENT_SECRET)
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn claims_for(shop: &str) -> SessionTokenClaims {
        let ts = now().timestamp();
        SessionTokenClaims {
            iss: format!("https://{shop}/admin"),
            dest: format!("https://{shop}"),
            aud: CLIENT_ID.to_owned(),
            sub: "42".to_owned(),
            exp: ts + 60,
            nbf: ts - 10,
            iat: ts - 10,
            jti: "token-1".to_owned(),
            sid: Some("session-1".to_owned()),
        }
    }

    fn sign(claims: &SessionTokenClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token() {
        let token = sign(&claims_for("acme.myshopify.com"), CLIENT_SECRET);
        let session = validator().validate(&token, now()).unwrap();
        assert_eq!(session.shop.as_str(), "acme.myshopify.com");
        assert_eq!(session.user_id, "42");
    }

    #[test]
    fn test_bad_signature() {
        let token = sign(&claims_for("acme.myshopify.com"), "wrong-secret");
        assert!(matches!(
            validator().validate(&token, now()),
            Err(SessionTokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_expired_token() {
        let mut claims = claims_for("acme.myshopify.com");
        claims.exp = now().timestamp() - 120;
        let token = sign(&claims, CLIENT_SECRET);
        assert!(matches!(
            validator().validate(&token, now()),
            Err(SessionTokenError::Expired)
        ));
    }

    #[test]
    fn test_not_yet_valid_token() {
        let mut claims = claims_for("acme.myshopify.com");
        claims.nbf = now().timestamp() + 120;
        let token = sign(&claims, CLIENT_SECRET);
        assert!(matches!(
            validator().validate(&token, now()),
            Err(SessionTokenError::NotYetValid)
        ));
    }

    #[test]
    fn test_audience_mismatch() {
        let mut claims = claims_for("acme.myshopify.com");
        claims.aud = "some-other-app".to_owned();
        let token = sign(&claims, CLIENT_SECRET);
        assert!(matches!(
            validator().validate(&token, now()),
            Err(SessionTokenError::AudienceMismatch)
        ));
    }

    #[test]
    fn test_issuer_dest_mismatch() {
        let mut claims = claims_for("acme.myshopify.com");
        claims.iss = "https://evil.myshopify.com/admin".to_owned();
        let token = sign(&claims, CLIENT_SECRET);
        assert!(matches!(
            validator().validate(&token, now()),
            Err(SessionTokenError::IssuerMismatch)
        ));
    }

    #[test]
    fn test_foreign_dest_rejected() {
        let mut claims = claims_for("acme.myshopify.com");
        claims.dest = "https://acme.example.com".to_owned();
        claims.iss = "https://acme.example.com/admin".to_owned();
        let token = sign(&claims, CLIENT_SECRET);
        assert!(matches!(
            validator().validate(&token, now()),
            Err(SessionTokenError::IssuerMismatch)
        ));
    }

    #[test]
    fn test_leeway_tolerates_small_skew() {
        let mut claims = claims_for("acme.myshopify.com");
        claims.exp = now().timestamp() - 2; // within leeway
        let token = sign(&claims, CLIENT_SECRET);
        assert!(validator().validate(&token, now()).is_ok());
    }
}
