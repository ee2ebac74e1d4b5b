//! Request signing.
//!
//! Every authenticated request carries three headers: the key id, a
//! millisecond timestamp, and an RSA-PSS (SHA-256) signature over
//! `timestamp + METHOD + path`, base64 encoded.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::BlindedSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use sha2::Sha256;

use super::error::ClientError;

/// Header carrying the API key id.
pub const KEY_HEADER: &str = "KALSHI-ACCESS-KEY";

/// Header carrying the millisecond timestamp.
pub const TIMESTAMP_HEADER: &str = "KALSHI-ACCESS-TIMESTAMP";

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "KALSHI-ACCESS-SIGNATURE";

/// Environment variable holding the API key id.
pub const ENV_KEY_ID: &str = "KALSHI_API_KEY_ID";

/// Environment variable holding PEM key material inline.
pub const ENV_PRIVATE_KEY: &str = "KALSHI_PRIVATE_KEY";

/// Environment variable holding a path to a PEM key file.
pub const ENV_PRIVATE_KEY_PATH: &str = "KALSHI_PRIVATE_KEY_PATH";

/// Signed header values for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    /// API key id.
    pub key_id: String,
    /// Milliseconds since the Unix epoch, as sent.
    pub timestamp: String,
    /// Base64 signature.
    pub signature: String,
}

impl AuthHeaders {
    /// Returns the headers as `(name, value)` pairs.
    #[must_use]
    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            (KEY_HEADER, self.key_id.as_str()),
            (TIMESTAMP_HEADER, self.timestamp.as_str()),
            (SIGNATURE_HEADER, self.signature.as_str()),
        ]
    }
}

/// API credentials: key id plus signing key.
///
/// Cheap to clone; the key material is shared and read-only.
#[derive(Clone)]
pub struct Credentials {
    key_id: String,
    signing_key: Arc<BlindedSigningKey<Sha256>>,
}

impl Credentials {
    /// Creates credentials from an already parsed key.
    #[must_use]
    pub fn from_private_key(key_id: impl Into<String>, key: RsaPrivateKey) -> Self {
        Self {
            key_id: key_id.into(),
            signing_key: Arc::new(BlindedSigningKey::<Sha256>::new(key)),
        }
    }

    /// Creates credentials from PEM text (PKCS#8 or PKCS#1).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidCredentials` if the key id is empty or
    /// the key cannot be parsed.
    pub fn from_pem(key_id: impl Into<String>, pem: &str) -> Result<Self, ClientError> {
        let key_id = key_id.into();
        if key_id.trim().is_empty() {
            return Err(ClientError::InvalidCredentials(
                "key id cannot be empty".to_string(),
            ));
        }

        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| ClientError::InvalidCredentials(format!("unreadable private key: {}", e)))?;

        Ok(Self::from_private_key(key_id, key))
    }

    /// Creates credentials from a PEM file.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidCredentials` if the file cannot be read
    /// or parsed.
    pub fn from_pem_file(key_id: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|e| {
            ClientError::InvalidCredentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_pem(key_id, &pem)
    }

    /// Loads credentials from `KALSHI_API_KEY_ID` and either
    /// `KALSHI_PRIVATE_KEY` or `KALSHI_PRIVATE_KEY_PATH`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidCredentials` if a variable is missing or
    /// the key cannot be loaded.
    pub fn from_env() -> Result<Self, ClientError> {
        let key_id = std::env::var(ENV_KEY_ID)
            .map_err(|_| ClientError::InvalidCredentials(format!("{} is not set", ENV_KEY_ID)))?;

        if let Ok(pem) = std::env::var(ENV_PRIVATE_KEY) {
            return Self::from_pem(key_id, &pem);
        }

        let path = std::env::var(ENV_PRIVATE_KEY_PATH).map_err(|_| {
            ClientError::InvalidCredentials(format!(
                "neither {} nor {} is set",
                ENV_PRIVATE_KEY, ENV_PRIVATE_KEY_PATH
            ))
        })?;
        Self::from_pem_file(key_id, path)
    }

    /// Returns the API key id.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Signs `timestamp + method + path` and returns the base64 signature.
    #[must_use]
    pub fn sign(&self, timestamp_ms: i64, method: &str, path: &str) -> String {
        let message = format!("{}{}{}", timestamp_ms, method.to_ascii_uppercase(), path);
        let signature = self
            .signing_key
            .sign_with_rng(&mut rand::thread_rng(), message.as_bytes());
        BASE64.encode(signature.to_bytes())
    }

    /// Builds the auth headers for a request at the current time.
    ///
    /// `path` must be the full URL path without the query string.
    #[must_use]
    pub fn headers(&self, method: &str, path: &str) -> AuthHeaders {
        let timestamp = chrono::Utc::now().timestamp_millis();
        AuthHeaders {
            key_id: self.key_id.clone(),
            timestamp: timestamp.to_string(),
            signature: self.sign(timestamp, method, path),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::pss::{Signature, VerifyingKey};
    use rsa::signature::Verifier;

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("key generation")
    }

    #[test]
    fn test_signature_verifies() {
        let key = test_key();
        let verifying = VerifyingKey::<Sha256>::new(key.to_public_key());
        let creds = Credentials::from_private_key("key-1", key);

        let sig_b64 = creds.sign(1_700_000_000_000, "get", "/trade-api/v2/portfolio/balance");
        let bytes = BASE64.decode(sig_b64).expect("base64");
        let signature = Signature::try_from(bytes.as_slice()).expect("signature");

        verifying
            .verify(b"1700000000000GET/trade-api/v2/portfolio/balance", &signature)
            .expect("signature must verify");
        assert!(verifying
            .verify(b"1700000000000GET/trade-api/v2/portfolio/orders", &signature)
            .is_err());
    }

    #[test]
    fn test_from_pem_roundtrip() {
        let key = test_key();
        let pem = key.to_pkcs8_pem(LineEnding::LF).expect("encode pem");
        let creds = Credentials::from_pem("key-1", &pem).expect("parse pem");
        assert_eq!(creds.key_id(), "key-1");
    }

    #[test]
    fn test_from_pem_rejects_garbage() {
        let err = Credentials::from_pem("key-1", "not a key").expect_err("must fail");
        assert!(matches!(err, ClientError::InvalidCredentials(_)));
    }

    #[test]
    fn test_from_pem_rejects_empty_key_id() {
        let err = Credentials::from_pem("  ", "irrelevant").expect_err("must fail");
        assert!(matches!(err, ClientError::InvalidCredentials(_)));
    }

    #[test]
    fn test_from_pem_file_missing() {
        let err = Credentials::from_pem_file("key-1", "/nonexistent/kalshi.pem").expect_err("must fail");
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn test_headers_and_redacted_debug() {
        let creds = Credentials::from_private_key("key-1", test_key());
        let headers = creds.headers("POST", "/trade-api/v2/portfolio/orders");
        assert_eq!(headers.key_id, "key-1");
        assert!(headers.timestamp.parse::<i64>().is_ok());
        assert!(!headers.signature.is_empty());
        assert_eq!(headers.pairs()[0].0, KEY_HEADER);

        let debug = format!("{:?}", creds);
        assert!(debug.contains("<redacted>"));
    }
}
