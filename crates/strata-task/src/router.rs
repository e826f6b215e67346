//! Topic-to-worker routing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::pool::ThreadPool;
use crate::queue::TaskQueue;

/// How a [`TopicRouter`] maps topics onto workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// No mapping: callers choose their own thread. Used when a client
    /// embeds the store directly rather than via the async facade.
    Caller,
    /// Every topic is routed to a single fixed worker.
    Default,
    /// Topics are hashed across the whole pool.
    Mapped,
}

/// Routes a topic identifier to a worker in a [`ThreadPool`], guaranteeing
/// the same topic always lands on the same worker for as long as the pool's
/// size doesn't change.
pub struct TopicRouter {
    mode: RoutingMode,
    default_worker: usize,
    round_robin: AtomicUsize,
}

impl TopicRouter {
    /// Build a router in `Caller` mode: callers are expected to run work
    /// directly rather than through a pool.
    pub fn caller() -> Self {
        Self {
            mode: RoutingMode::Caller,
            default_worker: 0,
            round_robin: AtomicUsize::new(0),
        }
    }

    /// Build a router that always routes to a single worker.
    pub fn default_worker(worker_index: usize) -> Self {
        Self {
            mode: RoutingMode::Default,
            default_worker: worker_index,
            round_robin: AtomicUsize::new(0),
        }
    }

    /// Build a router that hashes topics across the whole pool.
    pub fn mapped() -> Self {
        Self {
            mode: RoutingMode::Mapped,
            default_worker: 0,
            round_robin: AtomicUsize::new(0),
        }
    }

    /// The routing mode this router was built with.
    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    /// Resolve `topic` to a worker in `pool`.
    ///
    /// `Caller` mode still needs to resolve to *some* worker to satisfy the
    /// [`TaskQueue`]-returning signature; it behaves like `Default` pointed
    /// at worker 0, but callers in `Caller` mode are expected to bypass
    /// routing entirely and invoke store methods directly instead.
    pub fn route<'a>(&self, pool: &'a ThreadPool, topic: &str) -> &'a TaskQueue {
        match self.mode {
            RoutingMode::Caller | RoutingMode::Default => pool.worker(self.default_worker),
            RoutingMode::Mapped => pool.worker(hash_topic(topic)),
        }
    }

    /// Pick a worker for a topic-less operation, cycling through the
    /// pool on each call.
    pub fn round_robin<'a>(&self, pool: &'a ThreadPool) -> &'a TaskQueue {
        let index = self.round_robin.fetch_add(1, Ordering::Relaxed);
        pool.worker(index)
    }
}

fn hash_topic(topic: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    topic.hash(&mut hasher);
    hasher.finish() as usize
}
