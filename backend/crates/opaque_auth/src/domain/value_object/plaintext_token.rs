//! Plaintext Token
//!
//! The bearer credential handed to the client exactly once. It is wiped
//! from memory on drop and cannot be logged or serialized.

use std::fmt;
use zeroize::Zeroizing;

/// Opaque bearer token (43 base64url characters)
#[derive(Clone, PartialEq, Eq)]
pub struct PlaintextToken(Zeroizing<String>);

impl PlaintextToken {
    pub(crate) fn new(value: String) -> Self {
        Self(Zeroizing::new(value))
    }

    /// Expose the token for transmission to the client
    #[inline]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PlaintextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlaintextToken([REDACTED])")
    }
}
