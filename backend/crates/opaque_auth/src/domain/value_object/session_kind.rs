//! Session Kind Value Object

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a token was issued for
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionKind {
    /// Interactive login session
    #[default]
    Web,
    /// Named long-lived API token with a fixed lifetime
    Api { name: String },
    /// Session established through an external identity provider
    #[serde(rename = "oauth")]
    OAuth { provider: String },
}

impl SessionKind {
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Api { .. } => "api",
            Self::OAuth { .. } => "oauth",
        }
    }

    /// Label stored next to the code (API token name or provider)
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Web => None,
            Self::Api { name } => Some(name),
            Self::OAuth { provider } => Some(provider),
        }
    }

    /// Rebuild from the stored (code, label) pair
    pub fn from_parts(code: &str, label: Option<String>) -> Option<Self> {
        match code {
            "web" => Some(Self::Web),
            "api" => Some(Self::Api {
                name: label.unwrap_or_default(),
            }),
            "oauth" => Some(Self::OAuth {
                provider: label.unwrap_or_default(),
            }),
            _ => None,
        }
    }

    /// Whether validation pushes the expiry forward
    ///
    /// API tokens keep the lifetime they were issued with.
    #[inline]
    pub const fn slides(&self) -> bool {
        !matches!(self, Self::Api { .. })
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => write!(f, "{}:{}", self.code(), label),
            None => f.write_str(self.code()),
        }
    }
}
