//! Executor seam between work producers and the threads that run it.

use parking_lot::Mutex;
use std::collections::VecDeque;
use thiserror::Error;

/// A unit of background work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Errors returned when a task cannot be accepted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecuteError {
    /// The executor is shutting down and no longer accepts work
    #[error("executor is shut down")]
    ShutDown,
}

/// Something that runs tasks, usually on other threads.
///
/// Implementations must never run a task more than once. A rejected task is
/// dropped without running.
pub trait Executor: Send + Sync {
    /// Hand a task to the executor.
    fn execute(&self, task: Task) -> Result<(), ExecuteError>;
}

/// Runs every task immediately on the calling thread.
///
/// Useful for deterministic tests and for command-line drivers that do not
/// need a worker pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecuteError> {
        task();
        Ok(())
    }
}

/// Queues tasks until the owner asks for them to run.
///
/// Lets a single-threaded host decide when background work happens, and
/// makes interleavings reproducible in tests.
#[derive(Default)]
pub struct DeferredExecutor {
    pending: Mutex<VecDeque<Task>>,
}

impl DeferredExecutor {
    /// Create an empty executor
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run the oldest pending task, returning `false` if there was none
    pub fn run_next(&self) -> bool {
        // Pop first so a task may queue more work without deadlocking.
        let task = self.pending.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run pending tasks, including ones queued while running, until empty
    ///
    /// Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Executor for DeferredExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecuteError> {
        self.pending.lock().push_back(task);
        Ok(())
    }
}

impl std::fmt::Debug for DeferredExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}
