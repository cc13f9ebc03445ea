//! Entity Module

pub mod lockout_state;
pub mod login_attempt;
pub mod principal;
pub mod token_record;

pub use lockout_state::{FailureOutcome, LockoutState};
pub use login_attempt::{LoginAttempt, LoginFailureReason};
pub use principal::Principal;
pub use token_record::TokenRecord;
