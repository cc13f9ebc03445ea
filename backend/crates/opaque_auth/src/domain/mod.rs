//! Domain Layer
//!
//! Contains entities, value objects, policies and repository traits.

pub mod audit;
pub mod entity;
pub mod policy;
pub mod repository;
pub mod services;
pub mod value_object;

// Re-exports
pub use audit::{AuditEvent, AuditEventType, AuditOutcome, AuditSink};
pub use entity::{LockoutState, LoginAttempt, LoginFailureReason, Principal, TokenRecord};
pub use policy::LockoutPolicy;
pub use repository::{
    DurableTokenTier, LockoutStore, LoginAttemptLog, PrimaryTokenTier, PrincipalDirectory,
    PurgeCounts, RevokeOutcome, TouchOutcome,
};
pub use services::TokenCodec;
