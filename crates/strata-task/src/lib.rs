//! Shared task runtime for the Strata workspace: per-thread FIFO queues, a
//! mapped thread pool, topic routing, a delay-based scheduler, the
//! task-local logging context, and tracing setup.

mod config;
mod error;
mod log_context;
mod pool;
mod queue;
mod router;
mod scheduler;
mod telemetry;

pub use config::{DbConfig, ProducerConfig, StrataConfig, ThreadGroupConfig};
pub use error::{Result, TaskError};
pub use log_context::{current as log_context, depth as log_context_depth, with_context, ContextGuard};
pub use pool::ThreadPool;
pub use queue::TaskQueue;
pub use router::{RoutingMode, TopicRouter};
pub use scheduler::Scheduler;
pub use telemetry::{init_tracing, TelemetryOptions};
