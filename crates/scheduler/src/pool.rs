//! Render worker pool for background task execution.
//!
//! This module provides a fixed pool of worker threads that pull tasks from a
//! shared FIFO queue and run them. A panicking task is caught and logged so a
//! single bad render never takes a worker down with it.

use crate::executor::{ExecuteError, Executor, Task};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while starting a pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The configuration asked for zero workers
    #[error("worker pool needs at least one worker")]
    NoWorkers,

    /// The OS refused to spawn a worker thread
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Configuration for the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads to spawn.
    /// Default: number of logical CPU cores.
    pub num_workers: usize,

    /// Longest time an idle worker sleeps before re-checking for shutdown.
    /// Default: 100ms.
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Set the poll interval for idle workers.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Counters describing pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks accepted by `execute`
    pub submitted: u64,

    /// Tasks that ran to completion
    pub completed: u64,

    /// Tasks that panicked
    pub panicked: u64,

    /// Tasks waiting in the queue
    pub queued: usize,
}

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    available: Condvar,
    shutdown: AtomicBool,
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// Worker pool running background tasks.
///
/// Tasks are queued FIFO and picked up by whichever worker is free. Dropping
/// the pool signals shutdown, discards queued tasks, and joins the workers.
///
/// # Example
///
/// ```
/// use pagestrip_scheduler::{Executor, PoolConfig, TaskPool};
/// use std::sync::mpsc;
///
/// let pool = TaskPool::new(PoolConfig::new(2)).unwrap();
/// let (tx, rx) = mpsc::channel();
///
/// pool.execute(Box::new(move || {
///     tx.send(42).unwrap();
/// }))
/// .unwrap();
///
/// assert_eq!(rx.recv().unwrap(), 42);
/// pool.shutdown();
/// ```
pub struct TaskPool {
    shared: Arc<Shared>,
    workers: Vec<Worker>,
}

impl TaskPool {
    /// Create and start a new pool.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        if config.num_workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(config.num_workers),
        };
        for id in 0..config.num_workers {
            // On error the partially built pool is dropped, which joins the
            // workers already started.
            let worker = Worker::spawn(id, pool.shared.clone(), config.poll_interval)?;
            pool.workers.push(worker);
        }

        info!("started render pool with {} workers", config.num_workers);
        Ok(pool)
    }

    /// Get the number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Check if the pool is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
            queued: self.shared.queue.lock().len(),
        }
    }

    /// Shut the pool down and wait for the workers to exit.
    ///
    /// Tasks still queued are dropped without running; tasks already running
    /// finish first.
    pub fn shutdown(self) {
        drop(self);
    }

    fn signal_shutdown(&self) -> usize {
        self.shared.shutdown.store(true, Ordering::Release);
        // Dropped outside the lock; a task may own values with their own Drop.
        let discarded = std::mem::take(&mut *self.shared.queue.lock());
        self.shared.available.notify_all();
        discarded.len()
    }
}

impl Executor for TaskPool {
    fn execute(&self, task: Task) -> Result<(), ExecuteError> {
        if self.is_shutting_down() {
            return Err(ExecuteError::ShutDown);
        }
        self.shared.queue.lock().push_back(task);
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.available.notify_one();
        Ok(())
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        let discarded = self.signal_shutdown();
        if discarded > 0 {
            debug!("render pool dropped {} queued tasks on shutdown", discarded);
        }

        // The last handle can be released from inside a task; never join
        // the thread we are running on.
        let me = thread::current().id();
        for worker in self.workers.drain(..) {
            worker.join(me);
        }
        info!("render pool stopped");
    }
}

/// A single worker thread in the pool.
struct Worker {
    id: usize,
    thread_id: ThreadId,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(id: usize, shared: Arc<Shared>, poll_interval: Duration) -> Result<Self, PoolError> {
        let thread = thread::Builder::new()
            .name(format!("pagestrip-render-{}", id))
            .spawn(move || Self::run(id, shared, poll_interval))?;

        Ok(Self {
            id,
            thread_id: thread.thread().id(),
            thread: Some(thread),
        })
    }

    /// Main worker loop.
    ///
    /// Pops tasks until shutdown is signalled, parking on the condvar with a
    /// timeout while the queue is empty.
    fn run(id: usize, shared: Arc<Shared>, poll_interval: Duration) {
        loop {
            let task = {
                let mut queue = shared.queue.lock();
                loop {
                    if shared.shutdown.load(Ordering::Acquire) {
                        return;
                    }
                    if let Some(task) = queue.pop_front() {
                        break task;
                    }
                    shared.available.wait_for(&mut queue, poll_interval);
                }
            };

            match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(()) => {
                    shared.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(payload) => {
                    shared.panicked.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "render worker {} caught a panicking task: {}",
                        id,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
    }

    fn join(mut self, current: ThreadId) {
        if self.thread_id == current {
            return;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("render worker {} exited abnormally", self.id);
            }
        }
    }
}

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Get the number of logical CPU cores.
///
/// This is used as the default number of worker threads.
fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert!(config.num_workers > 0);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new(4).with_poll_interval(Duration::from_millis(50));
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_pool_rejects_zero_workers() {
        assert!(matches!(
            TaskPool::new(PoolConfig::new(0)),
            Err(PoolError::NoWorkers)
        ));
    }

    #[test]
    fn test_pool_creation() {
        let pool = TaskPool::new(PoolConfig::new(2)).unwrap();
        assert_eq!(pool.num_workers(), 2);
        assert!(!pool.is_shutting_down());
        pool.shutdown();
    }

    #[test]
    fn test_pool_executes_tasks() {
        let pool = TaskPool::new(PoolConfig::new(2)).unwrap();
        let executed = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        for _ in 0..5 {
            let executed = executed.clone();
            let tx = tx.clone();
            pool.execute(Box::new(move || {
                executed.fetch_add(1, Ordering::SeqCst);
                tx.send(()).unwrap();
            }))
            .unwrap();
        }

        for _ in 0..5 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(executed.load(Ordering::SeqCst), 5);
        assert_eq!(pool.stats().submitted, 5);

        pool.shutdown();
    }

    #[test]
    fn test_single_worker_runs_fifo() {
        let pool = TaskPool::new(PoolConfig::new(1)).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel();

        for i in 0..4 {
            let order = order.clone();
            let tx = tx.clone();
            pool.execute(Box::new(move || {
                order.lock().push(i);
                tx.send(()).unwrap();
            }))
            .unwrap();
        }

        for _ in 0..4 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let pool = TaskPool::new(PoolConfig::new(1)).unwrap();
        let (tx, rx) = mpsc::channel();

        pool.execute(Box::new(|| panic!("render exploded"))).unwrap();
        pool.execute(Box::new(move || tx.send("alive").unwrap()))
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "alive");
        assert_eq!(pool.stats().panicked, 1);
    }

    #[test]
    fn test_execute_after_shutdown_signal_is_rejected() {
        let pool = TaskPool::new(PoolConfig::new(1)).unwrap();
        pool.signal_shutdown();

        let result = pool.execute(Box::new(|| {}));
        assert_eq!(result, Err(ExecuteError::ShutDown));
    }

    #[test]
    fn test_drop_from_inside_task_does_not_deadlock() {
        let pool = Arc::new(TaskPool::new(PoolConfig::new(1)).unwrap());
        let (tx, rx) = mpsc::channel();
        let inner = pool.clone();

        pool.execute(Box::new(move || {
            // Give the outer handle time to go away so this drop is the last.
            thread::sleep(Duration::from_millis(50));
            drop(inner);
            tx.send(()).unwrap();
        }))
        .unwrap();
        drop(pool);

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_num_cpus() {
        let cpus = num_cpus();
        assert!(cpus > 0);
    }
}
