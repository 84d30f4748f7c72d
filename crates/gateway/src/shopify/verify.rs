//! HMAC verification for platform-signed requests.
//!
//! Two signature schemes share one secret (the app client secret):
//!
//! - webhooks carry `X-Shopify-Hmac-Sha256`: base64 HMAC-SHA256 over the
//!   *exact raw bytes* of the request body - never a re-serialized form,
//!   so verification must run before anything consumes or parses the body
//! - OAuth callbacks carry `hmac` in the query string: hex HMAC-SHA256
//!   over the remaining query parameters sorted by key
//!
//! All comparisons are constant-time, never `==` on the digest.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use base64::{Engine, engine::general_purpose::STANDARD};

type HmacSha256 = Hmac<Sha256>;

/// Verify a webhook signature over the raw request body.
///
/// `signature_header` is the base64 digest from `X-Shopify-Hmac-Sha256`.
#[must_use]
pub fn verify_webhook_hmac(raw_body: &[u8], signature_header: &str, secret: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);

    let computed = STANDARD.encode(mac.finalize().into_bytes());

    constant_time_compare(&computed, signature_header)
}

/// Verify the OAuth callback signature over the sorted query parameters.
///
/// `params` holds the decoded query pairs *excluding* `hmac` and
/// `signature`; pairs are sorted by key and joined as `k=v&k=v`.
#[must_use]
pub fn verify_callback_hmac(
    params: &[(String, String)],
    provided_hmac: &str,
    secret: &str,
) -> bool {
    let mut pairs: Vec<&(String, String)> = params.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let message: String = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message.as_bytes());

    let computed = hex::encode(mac.finalize().into_bytes());

    constant_time_compare(&computed, provided_hmac)
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "test-client-secret";

    fn sign_body(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    fn sign_query(message: &str, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_webhook_hmac_valid() {
        let body = br#"{"id":12345,"topic":"app/uninstalled"}"#;
        let header = sign_body(body, SECRET);
        assert!(verify_webhook_hmac(body, &header, SECRET));
    }

    #[test]
    fn test_webhook_hmac_body_mutation_flips_result() {
        let body = br#"{"id":12345}"#.to_vec();
        let header = sign_body(&body, SECRET);

        for i in 0..body.len() {
            let mut mutated = body.clone();
            let byte = mutated.get_mut(i).unwrap();
            *byte ^= 0x01;
            assert!(
                !verify_webhook_hmac(&mutated, &header, SECRET),
                "single-byte mutation at {i} must invalidate the signature"
            );
        }
    }

    #[test]
    fn test_webhook_hmac_header_mutation_flips_result() {
        let body = br#"{"id":12345}"#;
        let header = sign_body(body, SECRET);
        let flipped = if header.starts_with('A') {
            header.replacen('A', "B", 1)
        } else {
            let tail = header.get(1..).unwrap();
            format!("A{tail}")
        };
        assert_ne!(header, flipped);
        assert!(!verify_webhook_hmac(body, &flipped, SECRET));
    }

    #[test]
    fn test_webhook_hmac_whitespace_is_significant() {
        // Raw bytes are load-bearing: a pretty-printed equivalent of the
        // same JSON does not verify.
        let raw = br#"{"id":1,"shop":"acme.myshopify.com"}"#;
        let pretty = br#"{ "id": 1, "shop": "acme.myshopify.com" }"#;
        let header = sign_body(raw, SECRET);
        assert!(verify_webhook_hmac(raw, &header, SECRET));
        assert!(!verify_webhook_hmac(pretty, &header, SECRET));
    }

    #[test]
    fn test_webhook_hmac_wrong_secret() {
        let body = br#"{"id":12345}"#;
        let header = sign_body(body, SECRET);
        assert!(!verify_webhook_hmac(body, &header, "other-secret"));
    }

    #[test]
    fn test_callback_hmac_sorted_params() {
        let params = vec![
            ("shop".to_owned(), "acme.myshopify.com".to_owned()),
            ("code".to_owned(), "abc123".to_owned()),
            ("timestamp".to_owned(), "1700000000".to_owned()),
            ("state".to_owned(), "nonce-value".to_owned()),
        ];
        // Platform signs the alphabetically sorted pairs.
        let message =
            "code=abc123&shop=acme.myshopify.com&state=nonce-value&timestamp=1700000000";
        let hmac = sign_query(message, SECRET);

        assert!(verify_callback_hmac(&params, &hmac, SECRET));
    }

    #[test]
    fn test_callback_hmac_param_tampering() {
        let params = vec![
            ("code".to_owned(), "abc123".to_owned()),
            ("shop".to_owned(), "acme.myshopify.com".to_owned()),
        ];
        let hmac = sign_query("code=abc123&shop=acme.myshopify.com", SECRET);
        assert!(verify_callback_hmac(&params, &hmac, SECRET));

        let tampered = vec![
            ("code".to_owned(), "abc123".to_owned()),
            ("shop".to_owned(), "evil.myshopify.com".to_owned()),
        ];
        assert!(!verify_callback_hmac(&tampered, &hmac, SECRET));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(constant_time_compare("", ""));
        assert!(!constant_time_compare("hello", "hellp"));
        assert!(!constant_time_compare("hello", "hello2"));
    }
}
