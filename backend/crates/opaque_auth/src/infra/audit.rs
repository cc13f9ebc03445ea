//! Audit Sink Implementations

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::domain::audit::{AuditEvent, AuditEventType, AuditSink};

/// Writes audit events as structured log lines under target `audit`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let principal_id = event.principal_id.map(|id| id.to_string());
        tracing::info!(
            target: "audit",
            event_type = %event.event_type,
            outcome = %event.outcome,
            principal_id = principal_id.as_deref(),
            correlation_id = %event.correlation_id,
            client_ip = event.client_ip.as_deref(),
            user_agent = event.user_agent.as_deref(),
            reason = event.reason.as_deref(),
            token_ref = event.token_ref.as_deref(),
            count = event.count,
            timestamp = %event.timestamp,
            "Audit event"
        );
    }
}

/// Forwards events to a bounded channel
///
/// A full or closed channel drops the event with a warning; the caller is
/// never blocked.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl ChannelAuditSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl AuditSink for ChannelAuditSink {
    fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.tx.try_send(event) {
            let (reason, event) = match e {
                mpsc::error::TrySendError::Full(event) => ("full", event),
                mpsc::error::TrySendError::Closed(event) => ("closed", event),
            };
            tracing::warn!(
                reason,
                event_type = %event.event_type,
                correlation_id = %event.correlation_id,
                "Audit event dropped"
            );
        }
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn of_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn count(&self, event_type: AuditEventType) -> usize {
        self.of_type(event_type).len()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
