//! Channel-backed event sink
//!
//! Decouples event consumers from the request path using a bounded tokio
//! mpsc channel. The coordinator publishes, a background task drains the
//! [`EventReceiver`].

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{DomainEvent, EventSink};
use crate::error::LedgerError;

/// Create a bounded event channel
pub fn event_channel(buffer: usize) -> (ChannelEventSink, EventReceiver) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (ChannelEventSink { tx }, EventReceiver { rx })
}

/// Sender half, cloneable across coordinators and services
#[derive(Clone)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<DomainEvent>,
}

#[async_trait]
impl EventSink for ChannelEventSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn publish(&self, event: DomainEvent) -> Result<(), LedgerError> {
        let event_type = event.event_type();
        self.tx.send(event).await.map_err(|_| {
            warn!(event_type, "Event channel closed");
            LedgerError::Storage("event channel closed".to_string())
        })?;
        debug!(event_type, "Event queued");
        Ok(())
    }
}

/// Receiver half
pub struct EventReceiver {
    rx: mpsc::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (async)
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        self.rx.recv().await
    }

    /// Try to receive without blocking
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}
