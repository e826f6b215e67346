//! A single-thread FIFO task queue.
//!
//! A [`TaskQueue`] owns exactly one OS thread draining a channel of boxed
//! closures in posting order; tasks never block on anything but the backend
//! KV store, and never suspend mid-task — a task that needs a continuation
//! posts a new task rather than yielding.

use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use crate::error::{Result, TaskError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A FIFO queue of closures drained by one dedicated worker thread.
pub struct TaskQueue {
    sender: Sender<Job>,
    handle: Option<JoinHandle<()>>,
    name: String,
}

impl TaskQueue {
    /// Spawn a new worker thread named `name` and start draining its queue.
    pub fn spawn(name: impl Into<String>) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
                tracing::debug!(worker = %thread_name, "task queue worker exiting");
            })
            .expect("failed to spawn task queue worker thread");

        Self {
            sender,
            handle: Some(handle),
            name,
        }
    }

    /// Name of the worker thread, used for log context and diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue `job` to run on this queue's worker thread, in posting
    /// order relative to every other job posted to the same queue.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        self.sender
            .send(Box::new(job))
            .map_err(|_| TaskError::QueueClosed)
    }

    /// Stop accepting new work and wait for the worker thread to drain and
    /// exit. Jobs already posted are run to completion first.
    pub fn shutdown(mut self) {
        drop(self.sender.clone());
        // Dropping `self` (and therefore the real sender) after this call
        // closes the channel; the explicit clone+drop above is just to make
        // the "last sender closes the channel" behavior visible at the call
        // site without relying on drop order of struct fields.
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // The Sender side is dropped first (normal field drop order),
            // which closes the channel and lets the worker loop exit.
            let _ = handle.join();
        }
    }
}
