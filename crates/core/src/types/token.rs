//! Platform access token type.

/// Token prefixes issued by the platform.
///
/// `shpat_` - offline (per-install) tokens, `shpua_` - online (per-user)
/// tokens, `shpca_` - custom app tokens.
const TOKEN_PREFIXES: &[&str] = &["shpat_", "shpua_", "shpca_"];

/// Length bounds for the random part after the prefix.
const MIN_BODY_LENGTH: usize = 32;
const MAX_BODY_LENGTH: usize = 64;

/// Errors that can occur when parsing an [`AccessToken`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum AccessTokenError {
    /// The input string is empty.
    #[error("access token cannot be empty")]
    Empty,
    /// The input does not start with a known token prefix.
    #[error("access token has an unrecognized prefix")]
    UnknownPrefix,
    /// The part after the prefix has the wrong length.
    #[error("access token body must be {min}-{max} characters (got {got})")]
    BadLength {
        /// Minimum allowed body length.
        min: usize,
        /// Maximum allowed body length.
        max: usize,
        /// Actual body length.
        got: usize,
    },
    /// The part after the prefix contains a non-alphanumeric character.
    #[error("access token body contains invalid characters")]
    InvalidCharacter,
}

/// A platform Admin API access token.
///
/// The known plaintext shape (`shpat_`/`shpua_`/`shpca_` prefix followed by
/// 32-64 alphanumeric characters) is what the credential vault uses to tell
/// a stored plaintext token apart from ciphertext.
///
/// `Debug` is implemented manually so the token never reaches logs.
/// The type deliberately has no `Display` or serde impls.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Parse an `AccessToken`, enforcing the platform's plaintext shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty, carries an unknown prefix,
    /// or has a body outside the expected length/charset.
    pub fn parse(s: &str) -> Result<Self, AccessTokenError> {
        if s.is_empty() {
            return Err(AccessTokenError::Empty);
        }

        let body = TOKEN_PREFIXES
            .iter()
            .find_map(|p| s.strip_prefix(p))
            .ok_or(AccessTokenError::UnknownPrefix)?;

        if body.len() < MIN_BODY_LENGTH || body.len() > MAX_BODY_LENGTH {
            return Err(AccessTokenError::BadLength {
                min: MIN_BODY_LENGTH,
                max: MAX_BODY_LENGTH,
                got: body.len(),
            });
        }

        if !body.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AccessTokenError::InvalidCharacter);
        }

        Ok(Self(s.to_owned()))
    }

    /// Whether a stored value already matches the plaintext token shape.
    #[must_use]
    pub fn matches_shape(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Returns the token as a string slice.
    ///
    /// Callers must not write the returned value to logs or responses.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consumes the token and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AccessToken").field(&"[REDACTED]").finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> String {
        format!("shpat_{}", "a1".repeat(16))
    }

    #[test]
    fn test_parse_valid_prefixes() {
        assert!(AccessToken::parse(&sample()).is_ok());
        assert!(AccessToken::parse(&format!("shpua_{}", "b2".repeat(16))).is_ok());
        assert!(AccessToken::parse(&format!("shpca_{}", "c3".repeat(16))).is_ok());
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(AccessToken::parse(""), Err(AccessTokenError::Empty)));
    }

    #[test]
    fn test_parse_unknown_prefix() {
        assert!(matches!(
            AccessToken::parse(&format!("tok_{}", "a".repeat(32))),
            Err(AccessTokenError::UnknownPrefix)
        ));
    }

    #[test]
    fn test_parse_body_too_short() {
        assert!(matches!(
            AccessToken::parse("shpat_abc"),
            Err(AccessTokenError::BadLength { .. })
        ));
    }

    #[test]
    fn test_parse_body_too_long() {
        let long = format!("shpat_{}", "a".repeat(65));
        assert!(matches!(
            AccessToken::parse(&long),
            Err(AccessTokenError::BadLength { .. })
        ));
    }

    #[test]
    fn test_parse_invalid_characters() {
        let bad = format!("shpat_{}!", "a".repeat(31));
        assert!(matches!(
            AccessToken::parse(&bad),
            Err(AccessTokenError::InvalidCharacter)
        ));
    }

    #[test]
    fn test_matches_shape() {
        assert!(AccessToken::matches_shape(&sample()));
        // Base64 ciphertext does not match the plaintext shape.
        assert!(!AccessToken::matches_shape("bm9uY2VjaXBoZXJ0ZXh0Cg=="));
    }

    #[test]
    fn test_debug_redacts() {
        let token = AccessToken::parse(&sample()).unwrap();
        let debug = format!("{token:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("shpat_"));
    }
}
