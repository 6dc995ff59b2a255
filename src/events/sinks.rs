//! In-process event sinks

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::info;

use super::{DomainEvent, EventSink};
use crate::error::LedgerError;

/// Writes every event to the tracing log as a JSON payload
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn publish(&self, event: DomainEvent) -> Result<(), LedgerError> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| LedgerError::Storage(format!("event encoding failed: {}", e)))?;
        info!(
            event_type = event.event_type(),
            aggregate_id = %event.aggregate_id(),
            occurred_at = %event.occurred_at(),
            payload = %payload,
            "Domain event"
        );
        Ok(())
    }
}

/// Captures published events in order
///
/// Can be switched into a failing mode to exercise publish error paths.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<DomainEvent>>,
    fail_publish: AtomicBool,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Event type names in publish order
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(DomainEvent::event_type).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn publish(&self, event: DomainEvent) -> Result<(), LedgerError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage("event sink unavailable".to_string()));
        }
        self.events
            .lock()
            .map_err(|_| LedgerError::Storage("event sink lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}
