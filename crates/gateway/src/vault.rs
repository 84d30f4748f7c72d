//! Credential vault for platform access tokens.
//!
//! Tokens are sealed with AES-256-GCM under a deployment-wide key and
//! stored as `base64(nonce || ciphertext)`. Opening a stored value first
//! tests it against the plaintext token shape: accounts created before a
//! key was configured (or running without one) keep working, at the cost
//! of every call site tolerating either form.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::Rng;

use shopgate_core::AccessToken;

/// Nonce length for AES-GCM.
const NONCE_LEN: usize = 12;

/// Errors from sealing or opening a stored token.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The stored value is ciphertext but no encryption key is configured.
    #[error("token is encrypted but no encryption key is configured")]
    EncryptionUnavailable,

    /// The stored value is neither a plaintext-shaped token nor
    /// ciphertext this vault can open. Treated as data corruption, never
    /// masked as a plain auth failure.
    #[error("stored token failed decryption or shape validation: {0}")]
    CorruptedSecret(String),

    /// The cipher itself failed (should not happen with a well-formed key).
    #[error("cipher failure: {0}")]
    Cipher(String),
}

/// Result of sealing a token for storage.
///
/// `was_encrypted` is false when the vault fell back to plaintext because
/// no key is configured; callers must persist `value` either way.
#[derive(Clone)]
pub struct SealedToken {
    /// The value to persist.
    pub value: String,
    /// Whether `value` is ciphertext.
    pub was_encrypted: bool,
}

impl std::fmt::Debug for SealedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedToken")
            .field("value", &"[REDACTED]")
            .field("was_encrypted", &self.was_encrypted)
            .finish()
    }
}

/// Symmetric vault for access tokens.
///
/// Pure computation, no locking; cheap to clone.
#[derive(Clone)]
pub struct TokenVault {
    key: Option<[u8; 32]>,
}

impl TokenVault {
    /// Create a vault. `None` disables encryption (fail-open mode).
    #[must_use]
    pub const fn new(key: Option<[u8; 32]>) -> Self {
        Self { key }
    }

    /// Seal a token for persistence.
    ///
    /// Fails open: with no key configured the plaintext is returned with
    /// `was_encrypted: false` and a warning is logged, rather than
    /// blocking account creation.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Cipher` if encryption itself fails.
    pub fn seal(&self, token: &AccessToken) -> Result<SealedToken, VaultError> {
        let Some(key) = &self.key else {
            tracing::warn!("no token encryption key configured, persisting token in plaintext");
            return Ok(SealedToken {
                value: token.expose().to_owned(),
                was_encrypted: false,
            });
        };

        let nonce_bytes: [u8; NONCE_LEN] = rand::rng().random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| VaultError::Cipher(format!("cipher init failed: {e}")))?;
        let ciphertext = cipher
            .encrypt(nonce, token.expose().as_bytes())
            .map_err(|e| VaultError::Cipher(format!("encryption failed: {e}")))?;

        let mut stored = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        stored.extend_from_slice(&nonce_bytes);
        stored.extend_from_slice(&ciphertext);

        Ok(SealedToken {
            value: STANDARD.encode(stored),
            was_encrypted: true,
        })
    }

    /// Open a stored value back into an access token.
    ///
    /// A value already matching the plaintext token shape is returned
    /// unchanged without touching the cipher. Only non-plaintext-shaped
    /// values are decrypted; a decrypted value that still fails the shape
    /// check is corruption, not a valid token.
    ///
    /// # Errors
    ///
    /// - `VaultError::EncryptionUnavailable` - ciphertext but no key.
    /// - `VaultError::CorruptedSecret` - undecryptable or wrong shape.
    pub fn open(&self, stored: &str) -> Result<AccessToken, VaultError> {
        // Plaintext fast path: pre-encryption accounts and keyless deployments.
        if let Ok(token) = AccessToken::parse(stored) {
            return Ok(token);
        }

        let Some(key) = &self.key else {
            return Err(VaultError::EncryptionUnavailable);
        };

        let raw = STANDARD
            .decode(stored)
            .map_err(|e| VaultError::CorruptedSecret(format!("not base64: {e}")))?;
        if raw.len() <= NONCE_LEN {
            return Err(VaultError::CorruptedSecret(
                "stored value shorter than nonce".to_owned(),
            ));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| VaultError::Cipher(format!("cipher init failed: {e}")))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| VaultError::CorruptedSecret("decryption failed".to_owned()))?;

        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| VaultError::CorruptedSecret("decrypted value is not UTF-8".to_owned()))?;

        AccessToken::parse(&plaintext).map_err(|e| {
            VaultError::CorruptedSecret(format!("decrypted value failed shape check: {e}"))
        })
    }
}

impl std::fmt::Debug for TokenVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVault")
            .field("key", &self.key.map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_token() -> AccessToken {
        AccessToken::parse(&format!("shpat_{}", "ab12".repeat(8))).unwrap()
    }

    fn keyed_vault() -> TokenVault {
        TokenVault::new(Some([7u8; 32]))
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let vault = keyed_vault();
        let token = sample_token();

        let sealed = vault.seal(&token).unwrap();
        assert!(sealed.was_encrypted);
        assert_ne!(sealed.value, token.expose());
        // Ciphertext must not look like a plaintext token.
        assert!(!AccessToken::matches_shape(&sealed.value));

        let opened = vault.open(&sealed.value).unwrap();
        assert_eq!(opened, token);
    }

    #[test]
    fn test_open_plaintext_passthrough() {
        // Dual-path: a plaintext-shaped value is returned unchanged even
        // by a keyed vault (pre-encryption account).
        let vault = keyed_vault();
        let token = sample_token();
        let opened = vault.open(token.expose()).unwrap();
        assert_eq!(opened, token);

        // And by a keyless vault.
        let keyless = TokenVault::new(None);
        let opened = keyless.open(token.expose()).unwrap();
        assert_eq!(opened, token);
    }

    #[test]
    fn test_seal_without_key_fails_open() {
        let vault = TokenVault::new(None);
        let token = sample_token();
        let sealed = vault.seal(&token).unwrap();
        assert!(!sealed.was_encrypted);
        assert_eq!(sealed.value, token.expose());
    }

    #[test]
    fn test_open_ciphertext_without_key() {
        let sealed = keyed_vault().seal(&sample_token()).unwrap();
        let keyless = TokenVault::new(None);
        assert!(matches!(
            keyless.open(&sealed.value),
            Err(VaultError::EncryptionUnavailable)
        ));
    }

    #[test]
    fn test_open_tampered_ciphertext_is_corruption() {
        let vault = keyed_vault();
        let sealed = vault.seal(&sample_token()).unwrap();
        let mut bytes = STANDARD.decode(&sealed.value).unwrap();
        let last = bytes.last_mut().unwrap();
        *last ^= 0xff;
        let tampered = STANDARD.encode(bytes);
        assert!(matches!(
            vault.open(&tampered),
            Err(VaultError::CorruptedSecret(_))
        ));
    }

    #[test]
    fn test_open_wrong_key_is_corruption() {
        let sealed = keyed_vault().seal(&sample_token()).unwrap();
        let other = TokenVault::new(Some([9u8; 32]));
        assert!(matches!(
            other.open(&sealed.value),
            Err(VaultError::CorruptedSecret(_))
        ));
    }

    #[test]
    fn test_open_garbage_is_corruption() {
        let vault = keyed_vault();
        assert!(matches!(
            vault.open("not-base64!!!"),
            Err(VaultError::CorruptedSecret(_))
        ));
        assert!(matches!(
            vault.open(&STANDARD.encode([0u8; 4])),
            Err(VaultError::CorruptedSecret(_))
        ));
    }

    #[test]
    fn test_decrypted_non_token_is_corruption() {
        // Seal arbitrary non-token bytes with the same key and format.
        let key = [7u8; 32];
        let vault = TokenVault::new(Some(key));
        let nonce_bytes = [1u8; NONCE_LEN];
        let cipher = Aes256Gcm::new_from_slice(&key).unwrap();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), b"definitely-not-a-token".as_ref())
            .unwrap();
        let mut stored = nonce_bytes.to_vec();
        stored.extend_from_slice(&ciphertext);

        assert!(matches!(
            vault.open(&STANDARD.encode(stored)),
            Err(VaultError::CorruptedSecret(_))
        ));
    }

    #[test]
    fn test_debug_redacts() {
        let vault = keyed_vault();
        let sealed = vault.seal(&sample_token()).unwrap();
        assert!(format!("{sealed:?}").contains("[REDACTED]"));
        assert!(format!("{vault:?}").contains("[REDACTED]"));
    }
}
