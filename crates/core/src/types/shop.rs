//! Shop domain type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Canonical domain suffix for Shopify shops.
const SHOP_DOMAIN_SUFFIX: &str = ".myshopify.com";

/// Errors that can occur when parsing a [`ShopDomain`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum ShopDomainError {
    /// The input string is empty.
    #[error("shop domain cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("shop domain must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The handle contains a character outside `[a-z0-9-]`.
    #[error("shop domain contains invalid character '{0}'")]
    InvalidCharacter(char),
    /// The input names a host outside `*.myshopify.com`.
    ///
    /// The most common cause is a merchant pasting their app's own URL or
    /// custom storefront domain instead of the `.myshopify.com` domain.
    #[error(
        "'{0}' does not look like a valid store domain - check you didn't paste your app's own URL"
    )]
    ForeignDomain(String),
}

/// A merchant shop domain on the platform (`{handle}.myshopify.com`).
///
/// This is the canonical identifier for a storefront. Parsing normalizes
/// the input:
///
/// - a bare handle (`acme`) gets the canonical suffix appended
/// - an `http://`/`https://` prefix and trailing slash are stripped
/// - the host is lowercased
///
/// Anything that does not resolve to `{handle}.myshopify.com` with a
/// well-formed handle is rejected.
///
/// ## Examples
///
/// ```
/// use shopgate_core::ShopDomain;
///
/// let shop = ShopDomain::parse("acme").unwrap();
/// assert_eq!(shop.as_str(), "acme.myshopify.com");
///
/// let shop = ShopDomain::parse("https://acme.myshopify.com/").unwrap();
/// assert_eq!(shop.handle(), "acme");
///
/// assert!(ShopDomain::parse("acme.example.com").is_err());
/// assert!(ShopDomain::parse("").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ShopDomain(String);

impl ShopDomain {
    /// Maximum length of a shop domain (DNS host limit).
    pub const MAX_LENGTH: usize = 253;

    /// Parse and normalize a `ShopDomain` from merchant or platform input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, too long, names a host
    /// outside `*.myshopify.com`, or has a handle with characters outside
    /// `[a-z0-9-]`.
    pub fn parse(s: &str) -> Result<Self, ShopDomainError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ShopDomainError::Empty);
        }

        if trimmed.len() > Self::MAX_LENGTH {
            return Err(ShopDomainError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        // Merchants paste URLs; strip scheme, path and trailing slash.
        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let host = without_scheme
            .split('/')
            .next()
            .unwrap_or(without_scheme)
            .to_ascii_lowercase();

        let handle = if let Some(h) = host.strip_suffix(SHOP_DOMAIN_SUFFIX) {
            if h.is_empty() {
                return Err(ShopDomainError::ForeignDomain(host));
            }
            h.to_owned()
        } else if host.contains('.') {
            // A bare handle has no dots; anything else with dots is some
            // other host and must not be silently rewritten.
            return Err(ShopDomainError::ForeignDomain(host));
        } else if host.is_empty() {
            return Err(ShopDomainError::Empty);
        } else {
            host
        };

        if let Some(c) = handle
            .chars()
            .find(|&c| !matches!(c, 'a'..='z' | '0'..='9' | '-'))
        {
            return Err(ShopDomainError::InvalidCharacter(c));
        }

        Ok(Self(format!("{handle}{SHOP_DOMAIN_SUFFIX}")))
    }

    /// Returns the full shop domain as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `ShopDomain` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Returns the store handle (the part before `.myshopify.com`).
    #[must_use]
    pub fn handle(&self) -> &str {
        self.0.strip_suffix(SHOP_DOMAIN_SUFFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for ShopDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ShopDomain {
    type Err = ShopDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ShopDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for ShopDomain {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ShopDomain {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // Database values are assumed valid
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for ShopDomain {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_handle_appends_suffix() {
        let shop = ShopDomain::parse("acme").unwrap();
        assert_eq!(shop.as_str(), "acme.myshopify.com");
        assert_eq!(shop.handle(), "acme");
    }

    #[test]
    fn test_parse_full_domain() {
        let shop = ShopDomain::parse("acme.myshopify.com").unwrap();
        assert_eq!(shop.as_str(), "acme.myshopify.com");
    }

    #[test]
    fn test_parse_strips_scheme_and_path() {
        let shop = ShopDomain::parse("https://acme.myshopify.com/admin").unwrap();
        assert_eq!(shop.as_str(), "acme.myshopify.com");

        let shop = ShopDomain::parse("http://acme.myshopify.com/").unwrap();
        assert_eq!(shop.as_str(), "acme.myshopify.com");
    }

    #[test]
    fn test_parse_lowercases() {
        let shop = ShopDomain::parse("Acme.MyShopify.com").unwrap();
        assert_eq!(shop.as_str(), "acme.myshopify.com");
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(ShopDomain::parse(""), Err(ShopDomainError::Empty)));
        assert!(matches!(
            ShopDomain::parse("   "),
            Err(ShopDomainError::Empty)
        ));
    }

    #[test]
    fn test_parse_foreign_domain_rejected() {
        assert!(matches!(
            ShopDomain::parse("acme.example.com"),
            Err(ShopDomainError::ForeignDomain(_))
        ));
        // An app pasting its own URL is the documented failure mode.
        assert!(matches!(
            ShopDomain::parse("https://my-app.fly.dev/install"),
            Err(ShopDomainError::ForeignDomain(_))
        ));
    }

    #[test]
    fn test_parse_scheme_without_host_rejected() {
        assert!(matches!(
            ShopDomain::parse("https:///"),
            Err(ShopDomainError::Empty)
        ));
    }

    #[test]
    fn test_parse_bare_suffix_rejected() {
        assert!(matches!(
            ShopDomain::parse(".myshopify.com"),
            Err(ShopDomainError::ForeignDomain(_))
        ));
    }

    #[test]
    fn test_parse_invalid_characters() {
        assert!(matches!(
            ShopDomain::parse("ac me"),
            Err(ShopDomainError::InvalidCharacter(' '))
        ));
        assert!(matches!(
            ShopDomain::parse("acme_store"),
            Err(ShopDomainError::InvalidCharacter('_'))
        ));
    }

    #[test]
    fn test_parse_too_long() {
        let long = "a".repeat(300);
        assert!(matches!(
            ShopDomain::parse(&long),
            Err(ShopDomainError::TooLong { .. })
        ));
    }

    #[test]
    fn test_display_and_from_str() {
        let shop: ShopDomain = "acme".parse().unwrap();
        assert_eq!(format!("{shop}"), "acme.myshopify.com");
    }

    #[test]
    fn test_serde_roundtrip() {
        let shop = ShopDomain::parse("acme").unwrap();
        let json = serde_json::to_string(&shop).unwrap();
        assert_eq!(json, "\"acme.myshopify.com\"");

        let parsed: ShopDomain = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, shop);
    }
}
