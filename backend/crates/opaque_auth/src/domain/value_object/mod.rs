//! Value Object Module

pub mod plaintext_token;
pub mod principal_status;
pub mod session_kind;
pub mod token_hash;

pub use kernel::id::PrincipalId;
pub use plaintext_token::PlaintextToken;
pub use principal_status::PrincipalStatus;
pub use session_kind::SessionKind;
pub use token_hash::TokenHash;
