//! Platform Crate - Technical Infrastructure
//!
//! Shared technical foundations for the authentication engine:
//! - Cryptographic utilities (CSPRNG, SHA-256, hex, base64url)
//! - Clock abstraction (system clock, manual clock for tests)
//! - Request context (client IP, User-Agent, correlation id)
//! - Rate limiting decisions handed in by the edge

pub mod client;
pub mod clock;
pub mod crypto;
pub mod rate_limit;
