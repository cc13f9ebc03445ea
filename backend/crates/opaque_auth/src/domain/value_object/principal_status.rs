//! Principal Status Value Object
//!
//! Account status as read from the user directory. The engine never writes
//! it; lockout expiry is tracked separately in the lockout store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Principal account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum PrincipalStatus {
    /// Normal account
    #[default]
    Active = 0,

    /// Locked by the directory; paired with a lockout expiry
    Locked = 1,

    /// Disabled account, all tokens rejected
    Disabled = 2,

    /// Registered but not yet verified
    PendingVerification = 3,
}

impl PrincipalStatus {
    /// Get numeric ID for database storage
    #[inline]
    pub const fn id(&self) -> i16 {
        *self as i16
    }

    /// Get string code for serialization/API
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Locked => "locked",
            Self::Disabled => "disabled",
            Self::PendingVerification => "pending_verification",
        }
    }

    /// Create from numeric ID
    #[inline]
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(Self::Active),
            1 => Some(Self::Locked),
            2 => Some(Self::Disabled),
            3 => Some(Self::PendingVerification),
            _ => None,
        }
    }

    /// Create from string code
    #[inline]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "active" => Some(Self::Active),
            "locked" => Some(Self::Locked),
            "disabled" => Some(Self::Disabled),
            "pending_verification" => Some(Self::PendingVerification),
            _ => None,
        }
    }
}

impl fmt::Display for PrincipalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
