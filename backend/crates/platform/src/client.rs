//! Request context
//!
//! Identity of the calling client, passed explicitly into every engine
//! operation. Nothing in the engine reads ambient per-request state.

use serde::Serialize;
use std::net::IpAddr;
use uuid::Uuid;

/// Longest User-Agent kept for storage and audit
pub const MAX_USER_AGENT_LEN: usize = 512;

/// Longest caller-supplied correlation id accepted as-is
pub const MAX_CORRELATION_ID_LEN: usize = 128;

/// Per-request client context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    /// Correlation id linking engine events to the inbound request
    pub correlation_id: String,
    /// Client IP address (from X-Forwarded-For or direct connection)
    pub client_ip: Option<IpAddr>,
    /// User-Agent string, truncated to [`MAX_USER_AGENT_LEN`]
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Create a context
    ///
    /// An empty, oversized or non-printable correlation id is replaced by a
    /// fresh UUID so that audit events always carry a usable reference.
    pub fn new(
        correlation_id: Option<&str>,
        client_ip: Option<IpAddr>,
        user_agent: Option<&str>,
    ) -> Self {
        let correlation_id = correlation_id
            .filter(|id| is_valid_correlation_id(id))
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            correlation_id,
            client_ip,
            user_agent: user_agent.map(truncate_user_agent),
        }
    }

    /// Context for engine-internal work (retention job, admin tooling)
    pub fn system() -> Self {
        Self::new(None, None, Some("system"))
    }

    /// Get IP as string (for storage)
    pub fn ip_string(&self) -> Option<String> {
        self.client_ip.map(|ip| ip.to_string())
    }
}

fn is_valid_correlation_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_CORRELATION_ID_LEN
        && id.chars().all(|c| c.is_ascii_graphic())
}

fn truncate_user_agent(user_agent: &str) -> String {
    if user_agent.len() <= MAX_USER_AGENT_LEN {
        return user_agent.to_string();
    }
    let mut end = MAX_USER_AGENT_LEN;
    while !user_agent.is_char_boundary(end) {
        end -= 1;
    }
    user_agent[..end].to_string()
}

/// Resolve the client IP
///
/// Takes the first entry of an X-Forwarded-For value (reverse proxy
/// setups), falling back to the direct connection address.
pub fn resolve_client_ip(forwarded_for: Option<&str>, direct_ip: Option<IpAddr>) -> Option<IpAddr> {
    forwarded_for
        .and_then(|xff| xff.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
        .or(direct_ip)
}
