//! Infrastructure Layer
//!
//! Store implementations and audit sinks.

pub mod audit;
pub mod memory;
pub mod postgres;
#[cfg(feature = "redis")]
pub mod redis;

pub use audit::{ChannelAuditSink, MemoryAuditSink, TracingAuditSink};
pub use memory::{
    InMemoryLockoutStore, InMemoryLoginAttemptLog, InMemoryPrincipalDirectory,
    InMemoryTokenArchive, InMemoryTokenTier,
};
pub use postgres::PgAuthRepository;
#[cfg(feature = "redis")]
pub use redis::{RedisTierConfig, RedisTokenTier};
