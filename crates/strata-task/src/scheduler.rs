//! Delay-based job scheduling with cancellation.
//!
//! The scheduler itself only knows how to run a closure after a delay and
//! how to cancel a still-pending one; the producer queue builds its
//! per-topic "at most one in-flight job" rule on top
//! using its own `topic_jobs` set, since that invariant is specific to
//! outbox draining rather than something every scheduled job needs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

/// A table of named, cancellable delayed jobs.
#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<HashMap<String, JobHandle>>,
    stopped: Arc<AtomicBool>,
}

struct JobHandle {
    handle: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `job` to run after `delay`, replacing any job previously
    /// scheduled under `name` (the replaced job is cancelled).
    ///
    /// Returns immediately; `job` runs on the Tokio runtime this call is
    /// made from. If [`Scheduler::stop`] was already called, the job is
    /// still registered but will observe its cancellation flag set before
    /// it fires, and will not run.
    pub fn schedule_after(
        &self,
        name: impl Into<String>,
        delay: Duration,
        job: impl FnOnce() + Send + 'static,
    ) {
        let name = name.into();
        let cancel = Arc::new(AtomicBool::new(self.stopped.load(Ordering::SeqCst)));
        let cancel_for_task = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !cancel_for_task.load(Ordering::SeqCst) {
                job();
            }
        });

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(previous) = jobs.insert(name, JobHandle { handle, cancel }) {
            previous.cancel.store(true, Ordering::SeqCst);
            previous.handle.abort();
        }
    }

    /// Schedule `job` to run every `period`, starting one period from now,
    /// until cancelled by name or the scheduler stops. Replaces any job
    /// previously scheduled under `name`.
    pub fn schedule_every(
        &self,
        name: impl Into<String>,
        period: Duration,
        job: impl Fn() + Send + Sync + 'static,
    ) {
        let name = name.into();
        let cancel = Arc::new(AtomicBool::new(self.stopped.load(Ordering::SeqCst)));
        let cancel_for_task = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick of a tokio interval fires immediately; consume
            // it so the first run lands one period out, matching
            // schedule_after's shape.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if cancel_for_task.load(Ordering::SeqCst) {
                    break;
                }
                job();
            }
        });

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(previous) = jobs.insert(name, JobHandle { handle, cancel }) {
            previous.cancel.store(true, Ordering::SeqCst);
            previous.handle.abort();
        }
    }

    /// Cancel a job by name if it hasn't run yet. Returns whether a job was
    /// found and cancelled.
    pub fn cancel(&self, name: &str) -> bool {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.remove(name) {
            job.cancel.store(true, Ordering::SeqCst);
            job.handle.abort();
            true
        } else {
            false
        }
    }

    /// Whether a job is currently registered under `name` (it may already
    /// have fired; entries are only removed by [`Scheduler::cancel`] or
    /// replacement).
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.jobs.lock().unwrap().contains_key(name)
    }

    /// Mark the scheduler stopped: every job scheduled from now on is
    /// registered but suppressed, and jobs already pending are cancelled.
    /// In-flight work that already started running is allowed to finish.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut jobs = self.jobs.lock().unwrap();
        for (_, job) in jobs.drain() {
            job.cancel.store(true, Ordering::SeqCst);
            job.handle.abort();
        }
    }
}
