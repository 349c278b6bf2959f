//! Audit trail of governance events

use accredo_core::{GovernanceEvent, StoreError, WalletAddress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_type: String,
    pub subject: Option<WalletAddress>,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn from_event(event: &GovernanceEvent, recorded_at: DateTime<Utc>) -> Self {
        Self {
            event_type: event.name().to_string(),
            subject: event.subject(),
            payload: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
            recorded_at,
        }
    }
}

#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError>;

    /// Newest first
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .push(entry);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}

/// Write every event to the `audit` log target and the sink until the bus
/// closes
pub async fn run_audit_log(sink: Arc<dyn AuditSink>, mut events: broadcast::Receiver<GovernanceEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let entry = AuditEntry::from_event(&event, Utc::now());
                tracing::info!(
                    target: "audit",
                    event = %entry.event_type,
                    subject = ?entry.subject.map(|s| s.to_string()),
                    payload = %entry.payload,
                    "governance event"
                );
                if let Err(e) = sink.append(entry).await {
                    tracing::error!(error = %e, "failed to persist audit entry");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(target: "audit", skipped, "audit log lagged; events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accredo_core::{EventBus, ProposalId};

    #[tokio::test]
    async fn test_events_are_recorded_in_order() {
        let bus = EventBus::new(16);
        let sink = Arc::new(InMemoryAuditLog::new());
        let task = tokio::spawn(run_audit_log(sink.clone(), bus.subscribe()));

        let uni = WalletAddress::from_bytes([4u8; 20]);
        bus.publish(GovernanceEvent::IssuerRegistered { address: uni });
        bus.publish(GovernanceEvent::ProposalExecuted {
            id: ProposalId::from_bytes([1u8; 32]),
        });
        drop(bus);
        task.await.unwrap();

        let recent = sink.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type, "proposal_executed");
        assert_eq!(recent[1].subject, Some(uni));
        assert_eq!(recent[1].payload["event"], "issuer_registered");
    }
}
