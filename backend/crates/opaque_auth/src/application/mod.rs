//! Application Layer
//!
//! Engine components and their configuration.

pub mod authenticator;
pub mod config;
pub mod engine;
pub mod issuer;
pub mod lockout_guard;
pub mod retention;
pub mod revocation;
pub mod session_query;
pub mod session_validator;
pub mod token_store;

// Re-exports
pub use authenticator::{Authenticator, LoginRequest};
pub use config::EngineConfig;
pub use engine::{AuthEngine, EngineStores};
pub use issuer::{IssuedToken, TokenIssuer};
pub use lockout_guard::{LockoutDecision, LockoutGuard};
pub use retention::{PurgeReport, RetentionJob};
pub use revocation::{RevocationManager, RevocationReason};
pub use session_query::{SessionInfo, SessionQueries, TokenInfo};
pub use session_validator::{SessionValidator, ValidatedSession};
pub use token_store::{SweepReport, TokenStore};
