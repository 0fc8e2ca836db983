//! Shared-secret checks for incoming webhooks.
//!
//! Two header styles are accepted, whichever the sender uses:
//!
//! | Header | Check |
//! |--------|-------|
//! | `X-Hub-Signature-256` | HMAC-SHA256 of the raw body, `sha256=<hex>` |
//! | `X-Gitlab-Token` | Token equal to the secret |
//!
//! Both comparisons run in constant time.

use hmac::{Hmac, Mac};
use hook_relay_core::RequestHeaders;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::instrument;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
pub const TOKEN_HEADER: &str = "X-Gitlab-Token";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("request carries neither X-Hub-Signature-256 nor X-Gitlab-Token")]
    Missing,

    #[error("signature is not valid hex")]
    MalformedSignature,

    #[error("secret cannot be used as HMAC key")]
    InvalidSecret,

    #[error("HMAC-SHA256 digest does not match")]
    SignatureMismatch,

    #[error("token does not match")]
    TokenMismatch,
}

/// Validates webhooks against one configured secret.
pub struct SharedSecretValidator {
    secret: String,
}

impl SharedSecretValidator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Check the request's signature or token header.
    ///
    /// The signature header wins when both are present.
    #[instrument(skip(self, headers, body), fields(body_len = body.len()))]
    pub fn validate(&self, headers: &RequestHeaders, body: &[u8]) -> Result<(), SignatureError> {
        if let Some(signature) = headers.get(SIGNATURE_HEADER) {
            return self.verify_signature(body, signature);
        }
        if let Some(token) = headers.get(TOKEN_HEADER) {
            return self.verify_token(token);
        }
        Err(SignatureError::Missing)
    }

    fn verify_signature(&self, body: &[u8], signature: &str) -> Result<(), SignatureError> {
        type HmacSha256 = Hmac<Sha256>;

        let hex_part = signature.strip_prefix("sha256=").unwrap_or(signature);
        let sig_bytes = hex::decode(hex_part).map_err(|_| SignatureError::MalformedSignature)?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(body);

        mac.verify_slice(&sig_bytes)
            .map_err(|_| SignatureError::SignatureMismatch)
    }

    fn verify_token(&self, token: &str) -> Result<(), SignatureError> {
        if bool::from(token.as_bytes().ct_eq(self.secret.as_bytes())) {
            Ok(())
        } else {
            Err(SignatureError::TokenMismatch)
        }
    }
}

impl std::fmt::Debug for SharedSecretValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecretValidator")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
