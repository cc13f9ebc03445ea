//! Token Hash Value Object
//!
//! Storage key of a token record: SHA-256 of the plaintext token as 64
//! lowercase hex characters. The full value never appears in logs or audit
//! events; `Display` and `Debug` print the 8-character reference only.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of a hex-encoded SHA-256 digest
pub const TOKEN_HASH_LEN: usize = 64;

/// Length of the reference used in logs and audit events
pub const TOKEN_REF_LEN: usize = 8;

/// Token hash validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenHashError {
    #[error("Token hash must be 64 characters, got {0}")]
    InvalidLength(usize),

    #[error("Token hash must be lowercase hex")]
    InvalidCharacter,
}

/// Validated token hash
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenHash(String);

impl TokenHash {
    /// Wrap a hex digest, rejecting anything that is not 64 lowercase hex chars
    pub fn parse(value: impl Into<String>) -> Result<Self, TokenHashError> {
        let value = value.into();
        if value.len() != TOKEN_HASH_LEN {
            return Err(TokenHashError::InvalidLength(value.len()));
        }
        if !value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(TokenHashError::InvalidCharacter);
        }
        Ok(Self(value))
    }

    /// Wrap the output of a SHA-256 hex encoder without re-validating
    pub(crate) fn from_digest_hex(digest: String) -> Self {
        debug_assert_eq!(digest.len(), TOKEN_HASH_LEN);
        Self(digest)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated reference safe for logs and audit events
    #[inline]
    pub fn short_ref(&self) -> &str {
        &self.0[..TOKEN_REF_LEN]
    }
}

impl TryFrom<String> for TokenHash {
    type Error = TokenHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TokenHash> for String {
    fn from(hash: TokenHash) -> Self {
        hash.0
    }
}

impl fmt::Display for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_ref())
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenHash({}…)", self.short_ref())
    }
}
