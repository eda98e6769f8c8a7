//! # Token Module
//!
//! HS256 JSON Web Tokens for access and refresh.
//!
//! Tokens are `base64url(header).base64url(claims).base64url(signature)`
//! without padding. Only `HS256` is accepted; any other `alg` is rejected
//! before the signature is checked.
//!
//! Time is passed in explicitly (seconds since the Unix epoch) so expiry
//! behaviour is testable without a clock.

use crate::model::{UserId, UserRole};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD as B64URL};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

// =============================================================================
// CLAIMS
// =============================================================================

/// Purpose of a token. Carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Payload of every TaskNest token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: UserId,
    pub email: String,
    pub role: UserRole,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Unique token id. For refresh tokens this is the session id.
    pub jti: Uuid,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
}

impl Claims {
    /// Build claims valid for `ttl_secs` starting at `now`.
    #[must_use]
    pub fn new(
        sub: UserId,
        email: impl Into<String>,
        role: UserRole,
        kind: TokenKind,
        now: i64,
        ttl_secs: i64,
    ) -> Self {
        Self {
            sub,
            email: email.into(),
            role,
            kind,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Reasons a token is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid token signature")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("token has been revoked")]
    Revoked,

    /// A refresh token whose session was already revoked was presented again.
    #[error("refresh token reuse detected")]
    Reused,

    #[error("invalid token type: expected '{}', got '{}'", .expected.as_str(), .found.as_str())]
    WrongKind {
        expected: TokenKind,
        found: TokenKind,
    },

    #[error("unsupported token algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("token could not be encoded: {0}")]
    Encoding(String),
}

// =============================================================================
// CODEC
// =============================================================================

/// Signs and verifies tokens with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    key: Vec<u8>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").field("key", &"<redacted>").finish()
    }
}

impl TokenCodec {
    /// Create a codec from the signing secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    /// Serialize and sign a set of claims.
    pub fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let header = serde_json::to_vec(&header).map_err(|e| TokenError::Encoding(e.to_string()))?;
        let payload = serde_json::to_vec(claims).map_err(|e| TokenError::Encoding(e.to_string()))?;

        let signing_input = format!("{}.{}", B64URL.encode(header), B64URL.encode(payload));
        let signature = self.sign(signing_input.as_bytes())?;

        Ok(format!("{}.{}", signing_input, B64URL.encode(signature)))
    }

    /// Verify a token and return its claims.
    ///
    /// Checks, in order: structure, algorithm, signature, expiry, kind.
    pub fn decode(&self, token: &str, expected: TokenKind, now: i64) -> Result<Claims, TokenError> {
        let (signing_input, header, payload, signature) = split(token)?;

        let header: Header = decode_json(header, "header")?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signature = B64URL
            .decode(signature)
            .map_err(|_| TokenError::Malformed("signature is not base64url".into()))?;
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = decode_json(payload, "claims")?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }
        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                found: claims.kind,
            });
        }

        Ok(claims)
    }

    fn sign(&self, input: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac = self.mac()?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| TokenError::Encoding(e.to_string()))
    }
}

/// Read the `exp` claim without checking the signature.
///
/// Only for diagnostics; never base an access decision on it.
pub fn peek_expiry(token: &str) -> Result<i64, TokenError> {
    let (_, _, payload, _) = split(token)?;
    let claims: serde_json::Value = decode_json(payload, "claims")?;
    claims
        .get("exp")
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| TokenError::Malformed("claims: missing exp".into()))
}

fn split(token: &str) -> Result<(&str, &str, &str, &str), TokenError> {
    let token = token.trim();
    let (signing_input, signature) = token
        .rsplit_once('.')
        .ok_or_else(|| TokenError::Malformed("expected three segments".into()))?;
    let (header, payload) = signing_input
        .split_once('.')
        .ok_or_else(|| TokenError::Malformed("expected three segments".into()))?;
    if payload.contains('.') || header.is_empty() || payload.is_empty() || signature.is_empty() {
        return Err(TokenError::Malformed("expected three segments".into()));
    }
    Ok((signing_input, header, payload, signature))
}

fn decode_json<T: serde::de::DeserializeOwned>(segment: &str, what: &str) -> Result<T, TokenError> {
    let bytes = B64URL
        .decode(segment)
        .map_err(|_| TokenError::Malformed(format!("{} is not base64url", what)))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(format!("{}: {}", what, e)))
}

// =============================================================================
// TESTS
// =============================================================================
