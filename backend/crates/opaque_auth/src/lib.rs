//! Opaque Token Authentication Engine
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, lockout policy, store traits
//! - `application/` - Engine components (store, validator, lockout, revocation)
//! - `infra/` - Store implementations and audit sinks
//!
//! ## Security Model
//! - Tokens are 32 random bytes; only their SHA-256 digest is ever stored
//! - Sessions slide on use; API tokens keep their fixed lifetime
//! - Lockout durations grow exponentially with every threshold breach
//! - Any store failure on a validation path denies access
//! - Audit events and logs carry an 8-character token reference, never the token

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;

// Re-exports for convenience
pub use application::config::EngineConfig;
pub use application::engine::{AuthEngine, EngineStores};
pub use error::{AuthError, AuthResult};
pub use infra::postgres::PgAuthRepository;

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

pub mod config {
    pub use crate::application::config::*;
}

pub mod models {
    pub use crate::domain::audit::{AuditEvent, AuditEventType, AuditOutcome};
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
}

pub mod store {
    pub use crate::infra::postgres::PgAuthRepository as DurableStore;
}

#[cfg(test)]
mod tests;
