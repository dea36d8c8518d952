//! pagestrip scheduler library
//!
//! Background execution primitives for the thumbnail pipeline.
//!
//! This crate provides cancellation tokens, an [`Executor`] seam with a
//! thread-backed [`TaskPool`], and [`BackgroundFill`], which walks the
//! currently visible range of a strip on a background task and is
//! superseded every time the viewport or the strip changes.
//!
//! # Example
//!
//! ```
//! use pagestrip_scheduler::{BackgroundFill, CycleState, PoolConfig, TaskPool};
//! use std::ops::ControlFlow;
//! use std::time::Duration;
//!
//! let pool = TaskPool::new(PoolConfig::new(2)).unwrap();
//! let fill = BackgroundFill::new();
//!
//! // Scrolling: each new range replaces the previous cycle.
//! let stale = fill.reschedule(&pool, 0..20, |_index, _| ControlFlow::Continue(()));
//! let fresh = fill.reschedule(&pool, 10..30, |_index, _| ControlFlow::Continue(()));
//!
//! assert!(stale.is_cancelled());
//! assert_eq!(fresh.wait(Duration::from_secs(5)), CycleState::Completed);
//! ```

mod cancel;
mod executor;
mod fill;
mod pool;

// Re-export public API
pub use cancel::{CancellationToken, CurrentToken};
pub use executor::{DeferredExecutor, ExecuteError, Executor, InlineExecutor, Task};
pub use fill::{BackgroundFill, CycleState, FillCycle, FillStats};
pub use pool::{panic_message, PoolConfig, PoolError, PoolStats, TaskPool};
