//! Shared Kernel
//!
//! Vocabulary shared by every crate of the authentication engine:
//! - Typed identifiers ([`id::Id`])
//! - Error classification ([`error::kind::ErrorKind`]) and the caller-facing
//!   [`error::app_error::AppError`]
//!
//! Only things whose meaning is fixed across the whole engine live here.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;
