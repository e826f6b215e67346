//! A named, mapped pool of [`TaskQueue`] workers.

use crate::config::ThreadGroupConfig;
use crate::queue::TaskQueue;

/// A pool of worker threads, optionally organized into named groups, each
/// group declaring `{count_percent, min_count, id_prefix, tags[]}`.
pub struct ThreadPool {
    workers: Vec<TaskQueue>,
}

impl ThreadPool {
    /// Build a pool of `count` anonymous workers (`worker-0`, `worker-1`,
    /// ...). `count == 0` derives the worker count from the available
    /// parallelism minus `reserve_thread_count`, with a floor of
    /// one worker.
    pub fn new(count: usize, reserve_thread_count: usize) -> Self {
        let count = if count == 0 {
            let available = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            available.saturating_sub(reserve_thread_count).max(1)
        } else {
            count
        };

        let workers = (0..count)
            .map(|i| TaskQueue::spawn(format!("worker-{i}")))
            .collect();
        Self { workers }
    }

    /// Build a pool from named thread groups; each group contributes
    /// `max(min_count, round(total * count_percent / 100))` workers named
    /// `{id_prefix}-{n}`.
    pub fn from_groups(groups: &[ThreadGroupConfig], total_hint: usize) -> Self {
        let mut workers = Vec::new();
        for group in groups {
            let by_percent = (total_hint as f64 * group.count_percent / 100.0).round() as usize;
            let count = by_percent.max(group.min_count).max(1);
            for i in 0..count {
                workers.push(TaskQueue::spawn(format!("{}-{i}", group.id_prefix)));
            }
        }
        if workers.is_empty() {
            workers.push(TaskQueue::spawn("worker-0"));
        }
        Self { workers }
    }

    /// Number of workers in the pool.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the pool has no workers (never true after construction via
    /// the constructors above, which always guarantee at least one).
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Borrow the worker at `index`, wrapping modulo the pool size.
    pub fn worker(&self, index: usize) -> &TaskQueue {
        &self.workers[index % self.workers.len()]
    }
}
