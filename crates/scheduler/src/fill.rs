//! Background-fill cycles
//!
//! A fill cycle walks a list of work items on a background task, visiting
//! them in order until the list is exhausted or the cycle is superseded.
//! Every call to [`BackgroundFill::reschedule`] cancels the cycle before it,
//! so at most one cycle is ever logically active no matter how quickly the
//! caller reschedules (fast scrolling, bursts of edits).

use crate::cancel::{CancellationToken, CurrentToken};
use crate::executor::Executor;
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::ops::ControlFlow;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

/// Lifecycle of one fill cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleState {
    /// No cycle has been started yet
    Idle,

    /// Handed to the executor, not yet running
    Scheduled,

    /// Iterating over its work items
    Running,

    /// Visited every work item
    Completed,

    /// Stopped early, either superseded or asked to stop by the visitor
    Cancelled,
}

impl CycleState {
    /// Whether the cycle has reached a terminal state
    pub fn is_finished(self) -> bool {
        matches!(self, CycleState::Completed | CycleState::Cancelled)
    }
}

struct CycleInner {
    id: u64,
    token: CancellationToken,
    state: Mutex<CycleState>,
    changed: Condvar,
    visited: AtomicUsize,
    total: usize,
}

/// Handle to a single fill cycle
///
/// Cheap to clone; all clones observe the same cycle.
#[derive(Clone)]
pub struct FillCycle {
    inner: Arc<CycleInner>,
}

impl FillCycle {
    fn new(id: u64, token: CancellationToken, total: usize) -> Self {
        Self {
            inner: Arc::new(CycleInner {
                id,
                token,
                state: Mutex::new(CycleState::Scheduled),
                changed: Condvar::new(),
                visited: AtomicUsize::new(0),
                total,
            }),
        }
    }

    /// Monotonic identifier, newer cycles have larger ids
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current state of the cycle
    pub fn state(&self) -> CycleState {
        *self.inner.state.lock()
    }

    /// Number of work items visited so far
    pub fn visited(&self) -> usize {
        self.inner.visited.load(Ordering::Acquire)
    }

    /// Number of work items the cycle was started with
    pub fn total(&self) -> usize {
        self.inner.total
    }

    /// Whether this cycle has been superseded or cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Whether the cycle is still expected to do work
    ///
    /// A cycle is active while it is scheduled or running and its token has
    /// not been cancelled.
    pub fn is_active(&self) -> bool {
        !self.state().is_finished() && !self.is_cancelled()
    }

    /// Block until the cycle finishes or `timeout` elapses
    ///
    /// Returns the state observed when waiting stopped.
    pub fn wait(&self, timeout: Duration) -> CycleState {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.is_finished() {
            if self
                .inner
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        *state
    }

    fn set_state(&self, next: CycleState) {
        let mut state = self.inner.state.lock();
        if !state.is_finished() {
            *state = next;
        }
        drop(state);
        self.inner.changed.notify_all();
    }
}

impl std::fmt::Debug for FillCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillCycle")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("visited", &self.visited())
            .field("total", &self.total())
            .finish()
    }
}

/// Fill statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillStats {
    /// Cycles handed to the executor
    pub started: u64,

    /// Cycles that visited all their work
    pub completed: u64,

    /// Cycles that stopped early
    pub cancelled: u64,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
}

/// Reschedulable background fill
///
/// # Example
///
/// ```
/// use pagestrip_scheduler::{BackgroundFill, CycleState, InlineExecutor};
/// use std::ops::ControlFlow;
/// use std::sync::{Arc, Mutex};
///
/// let fill = BackgroundFill::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
///
/// let cycle = fill.reschedule(&InlineExecutor, vec![3, 4, 5], move |index, _| {
///     sink.lock().unwrap().push(index);
///     ControlFlow::Continue(())
/// });
///
/// assert_eq!(cycle.state(), CycleState::Completed);
/// assert_eq!(*seen.lock().unwrap(), vec![3, 4, 5]);
/// ```
pub struct BackgroundFill {
    current: CurrentToken,
    next_id: AtomicU64,
    latest: Mutex<Option<FillCycle>>,
    counters: Arc<Counters>,
}

impl BackgroundFill {
    /// Create an idle fill scheduler
    pub fn new() -> Self {
        Self {
            current: CurrentToken::new(),
            next_id: AtomicU64::new(1),
            latest: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Start a new cycle over `work`, cancelling the previous one
    ///
    /// `visit` runs on the executor for each item in iteration order and is
    /// handed the cycle's token, which may be cancelled at any point during
    /// the call. The cycle checks the token before every item and stops as
    /// soon as it is cancelled; `visit` may also stop it by returning
    /// `ControlFlow::Break`.
    pub fn reschedule<I, F>(&self, executor: &dyn Executor, work: I, mut visit: F) -> FillCycle
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator + Send + 'static,
        F: FnMut(I::Item, &CancellationToken) -> ControlFlow<()> + Send + 'static,
    {
        let work = work.into_iter();
        let token = self.current.replace();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cycle = FillCycle::new(id, token.clone(), work.len());

        // Publish before executing so an inline executor finishing the
        // cycle synchronously is still observable as the latest one.
        *self.latest.lock() = Some(cycle.clone());
        self.counters.started.fetch_add(1, Ordering::Relaxed);
        debug!("fill cycle {} scheduled over {} items", id, cycle.total());

        let task_cycle = cycle.clone();
        let counters = self.counters.clone();
        let task = Box::new(move || {
            if token.is_cancelled() {
                finish(&task_cycle, &counters, CycleState::Cancelled);
                return;
            }
            task_cycle.set_state(CycleState::Running);

            for item in work {
                if token.is_cancelled() {
                    finish(&task_cycle, &counters, CycleState::Cancelled);
                    return;
                }
                let flow = visit(item, &token);
                task_cycle.inner.visited.fetch_add(1, Ordering::AcqRel);
                if flow.is_break() {
                    finish(&task_cycle, &counters, CycleState::Cancelled);
                    return;
                }
            }
            finish(&task_cycle, &counters, CycleState::Completed);
        });

        if let Err(err) = executor.execute(task) {
            debug!("fill cycle {} rejected: {}", id, err);
            cycle.inner.token.cancel();
            finish(&cycle, &self.counters, CycleState::Cancelled);
        }

        cycle
    }

    /// Cancel the active cycle, if any
    pub fn cancel(&self) {
        self.current.cancel();
    }

    /// The most recently scheduled cycle
    pub fn latest(&self) -> Option<FillCycle> {
        self.latest.lock().clone()
    }

    /// State of the most recent cycle, or `Idle` if none was ever started
    pub fn state(&self) -> CycleState {
        self.latest
            .lock()
            .as_ref()
            .map(FillCycle::state)
            .unwrap_or(CycleState::Idle)
    }

    /// Snapshot of the fill counters
    pub fn stats(&self) -> FillStats {
        FillStats {
            started: self.counters.started.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
        }
    }
}

impl Default for BackgroundFill {
    fn default() -> Self {
        Self::new()
    }
}

fn finish(cycle: &FillCycle, counters: &Counters, state: CycleState) {
    if cycle.state().is_finished() {
        return;
    }
    match state {
        CycleState::Completed => counters.completed.fetch_add(1, Ordering::Relaxed),
        _ => counters.cancelled.fetch_add(1, Ordering::Relaxed),
    };
    debug!(
        "fill cycle {} finished as {:?} after {}/{} items",
        cycle.id(),
        state,
        cycle.visited(),
        cycle.total()
    );
    cycle.set_state(state);
}
