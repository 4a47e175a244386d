//! Fire-and-forget event publication. The transport (webhook, internal bus,
//! whatever the embedder wires up) is out of scope; this crate only defines
//! the contract and the event kinds it emits.

use async_trait::async_trait;
use serde_json::Value;

pub const EVENT_PAYMENT_SENT: &str = "payment_sent";
pub const EVENT_PAYMENT_RECEIVED: &str = "payment_received";
pub const EVENT_PAYMENT_FAILED: &str = "payment_failed";
pub const EVENT_PERMISSION_DENIED: &str = "permission_denied";

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event_kind: &str, properties: Value);
}

/// An [`EventPublisher`] that drops every event. Useful for tests and for
/// embedders that don't want an event bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventPublisher;

#[async_trait]
impl EventPublisher for NullEventPublisher {
    async fn publish(&self, _event_kind: &str, _properties: Value) {}
}

/// Records every publish call, for assertions in tests.
#[derive(Default)]
pub struct RecordingEventPublisher {
    pub events: tokio::sync::Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, event_kind: &str, properties: Value) {
        self.events
            .lock()
            .await
            .push((event_kind.to_owned(), properties));
    }
}
