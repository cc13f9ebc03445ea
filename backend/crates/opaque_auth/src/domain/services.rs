//! Domain Services
//!
//! Token generation and hashing.

use platform::crypto;

use crate::domain::value_object::{PlaintextToken, TokenHash};

/// Random bytes per token (256 bits)
pub const TOKEN_BYTES: usize = 32;

/// Encoded token length (unpadded base64url of 32 bytes)
pub const TOKEN_ENCODED_LEN: usize = 43;

/// Opaque token codec
///
/// Tokens carry no structure: 32 bytes from the OS CSPRNG, base64url
/// encoded without padding. Only the SHA-256 of the encoded string is ever
/// stored.
pub struct TokenCodec;

impl TokenCodec {
    /// Generate a new token and its storage hash
    ///
    /// The plaintext must be handed to the client exactly once.
    pub fn issue() -> (PlaintextToken, TokenHash) {
        let bytes = crypto::random_bytes(TOKEN_BYTES);
        let plaintext = PlaintextToken::new(crypto::to_base64url(&bytes));
        let hash = Self::hash(plaintext.expose());
        (plaintext, hash)
    }

    /// Storage hash of a presented token
    pub fn hash(plaintext: &str) -> TokenHash {
        TokenHash::from_digest_hex(crypto::sha256_hex(plaintext.as_bytes()))
    }

    /// Cheap shape check before any store lookup
    ///
    /// Callers still hash and look up malformed input so the response time
    /// does not reveal the check.
    pub fn is_well_formed(plaintext: &str) -> bool {
        plaintext.len() == TOKEN_ENCODED_LEN
            && crypto::from_base64url(plaintext).is_ok_and(|bytes| bytes.len() == TOKEN_BYTES)
    }
}
