//! Principal Snapshot
//!
//! Read-only view of an account as returned by the user directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_object::{PrincipalId, PrincipalStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub status: PrincipalStatus,
    /// Soft-deleted in the directory
    pub deleted: bool,
    pub lockout_expiry: Option<DateTime<Utc>>,
}

/// What the directory state means for a presented credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalAccess {
    Allowed,
    Denied,
    LockedUntil(DateTime<Utc>),
}

impl Principal {
    pub fn active(id: PrincipalId) -> Self {
        Self {
            id,
            status: PrincipalStatus::Active,
            deleted: false,
            lockout_expiry: None,
        }
    }

    /// Evaluate the principal at `now`
    ///
    /// A lock whose expiry has passed counts as active. A lock without an
    /// expiry is indefinite and treated like a disabled account.
    pub fn access_at(&self, now: DateTime<Utc>) -> PrincipalAccess {
        if self.deleted {
            return PrincipalAccess::Denied;
        }
        match self.status {
            PrincipalStatus::Active | PrincipalStatus::PendingVerification => {
                PrincipalAccess::Allowed
            }
            PrincipalStatus::Disabled => PrincipalAccess::Denied,
            PrincipalStatus::Locked => match self.lockout_expiry {
                Some(until) if until > now => PrincipalAccess::LockedUntil(until),
                Some(_) => PrincipalAccess::Allowed,
                None => PrincipalAccess::Denied,
            },
        }
    }
}
