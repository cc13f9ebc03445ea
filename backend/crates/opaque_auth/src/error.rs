//! Auth Error Types
//!
//! Engine failures as typed results. Each variant maps onto a
//! `kernel::error::kind::ErrorKind`; messages are safe to forward to an
//! unauthenticated client and never mention whether an account exists.

use std::time::Duration;

use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown token, or token of a disabled/deleted principal
    #[error("Invalid token")]
    InvalidToken,

    /// Token past its expiry
    #[error("Token expired")]
    ExpiredToken,

    /// Token revoked
    #[error("Token revoked")]
    RevokedToken,

    /// Principal is locked out
    #[error("Account is temporarily locked")]
    UserLockedOut { retry_after: Duration },

    /// Rejected by the edge rate limiter (propagated unchanged)
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Duration },

    /// Unknown principal, wrong credentials or disabled account
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token generation collided twice in a row
    #[error("Token generation failed")]
    TokenGeneration,

    /// A backing store could not be reached
    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::RevokedToken
            | AuthError::InvalidCredentials => ErrorKind::Unauthorized,
            AuthError::UserLockedOut { .. } => ErrorKind::Locked,
            AuthError::RateLimited { .. } => ErrorKind::TooManyRequests,
            AuthError::StoreUnavailable(_) | AuthError::Database(_) => {
                ErrorKind::ServiceUnavailable
            }
            AuthError::TokenGeneration | AuthError::Config(_) | AuthError::Internal(_) => {
                ErrorKind::InternalServerError
            }
        }
    }

    /// Stable machine-readable code, used as the audit outcome reason
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidToken => "invalid_token",
            AuthError::ExpiredToken => "expired_token",
            AuthError::RevokedToken => "revoked_token",
            AuthError::UserLockedOut { .. } => "user_locked_out",
            AuthError::RateLimited { .. } => "rate_limited",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::TokenGeneration => "token_generation",
            AuthError::StoreUnavailable(_) => "store_unavailable",
            AuthError::Config(_) => "config",
            AuthError::Database(_) => "database",
            AuthError::Internal(_) => "internal",
        }
    }

    /// Remaining wait for lockout / rate limit rejections
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AuthError::UserLockedOut { retry_after } | AuthError::RateLimited { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    /// Whether the failure came from infrastructure rather than the credential
    pub fn is_infrastructure(&self) -> bool {
        self.kind().is_server_error()
    }

    /// Convert to the caller-facing error
    ///
    /// Infrastructure details stay in the logs; the caller only sees the
    /// classification.
    pub fn to_app_error(&self) -> AppError {
        let message = if self.is_infrastructure() {
            self.kind().as_str().to_string()
        } else {
            self.to_string()
        };
        match self {
            AuthError::UserLockedOut { retry_after } => AppError::locked(message, *retry_after),
            AuthError::RateLimited { retry_after } => {
                AppError::too_many_requests(message).with_retry_after(*retry_after)
            }
            AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::RevokedToken
            | AuthError::InvalidCredentials => AppError::unauthorized(message),
            _ => AppError::new(self.kind(), message),
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::StoreUnavailable(msg) => {
                tracing::error!(message = %msg, "Credential store unavailable, failing closed");
            }
            AuthError::Internal(msg) | AuthError::Config(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::TokenGeneration => {
                tracing::error!("Token hash collided twice, refusing to issue");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!("Invalid login attempt");
            }
            AuthError::UserLockedOut { retry_after } => {
                tracing::warn!(retry_after_secs = retry_after.as_secs(), "Attempt on locked account");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        err.log();
        err.to_app_error()
    }
}
