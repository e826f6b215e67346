//! Producer-side outbox queue: posting rules, coalescing, and the
//! per-topic drain loop that hands messages to a transport.

mod error;
mod message;
mod queue;
mod transport;

pub use error::{QueueError, Result};
pub use message::{OutboxMessage, OutboxOp};
pub use queue::ProducerQueue;
pub use transport::{NotificationSink, NullNotificationSink, QueueEvent, TransportError, TransportSender};
