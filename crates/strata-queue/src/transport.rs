//! The boundary a consumer implements to actually deliver queued messages.

use async_trait::async_trait;

use crate::message::OutboxMessage;

/// Whether a failed send should be retried or is terminal. Network failures
/// and server-side retry-later responses are `Retryable`; a non-retryable
/// application error from the server is `Fatal`.
#[derive(Debug, Clone)]
pub enum TransportError {
    Retryable(String),
    Fatal(String),
}

/// Delivers one outbox message to its consumer. Implementations decode
/// `message.payload` themselves (they know the concrete object type this
/// queue instance was built for).
#[async_trait]
pub trait TransportSender: Send + Sync {
    async fn send(&self, message: &OutboxMessage) -> Result<(), TransportError>;
}

/// Drain-loop lifecycle events a queue emits for observability. The
/// notification payload posted alongside the message rides back out here
/// untouched.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    Sent {
        object_id: strata_unit::ObjectId,
        notification: Option<Vec<u8>>,
    },
    Failed {
        object_id: strata_unit::ObjectId,
        reason: String,
        notification: Option<Vec<u8>>,
    },
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: QueueEvent);
}

/// A sink that drops every event — the default when nobody cares.
pub struct NullNotificationSink;

impl NotificationSink for NullNotificationSink {
    fn notify(&self, _event: QueueEvent) {}
}
