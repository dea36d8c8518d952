//! Cancellation tokens for background work
//!
//! Provides cancellation tokens that let background loops stop cooperatively,
//! and a swappable "current" token so that starting a new unit of work always
//! supersedes the previous one.

use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

/// Cancellation token for cooperative cancellation
///
/// Background loops periodically check `is_cancelled()` to determine if they
/// should stop. Clones share the same underlying cancellation state.
///
/// # Example
///
/// ```
/// use pagestrip_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this token
    ///
    /// All clones observe the cancellation. Calling it again is a no-op.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if this token (or any clone) has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Check whether two tokens share the same cancellation state
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// The single "current" token of a stream of work
///
/// `replace()` installs a fresh token and cancels whatever was current, under
/// one lock, so at most one token handed out by a `CurrentToken` is ever
/// live at a time.
///
/// # Example
///
/// ```
/// use pagestrip_scheduler::CurrentToken;
///
/// let current = CurrentToken::new();
/// let first = current.replace();
/// let second = current.replace();
///
/// assert!(first.is_cancelled());
/// assert!(!second.is_cancelled());
/// ```
#[derive(Debug)]
pub struct CurrentToken {
    current: Mutex<CancellationToken>,
    generation: AtomicU64,
}

impl CurrentToken {
    /// Create a holder whose initial token is live
    pub fn new() -> Self {
        Self {
            current: Mutex::new(CancellationToken::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Swap in a new token, cancelling the previous one
    ///
    /// Returns a clone of the new token.
    pub fn replace(&self) -> CancellationToken {
        let next = CancellationToken::new();
        let previous = {
            let mut current = self.current.lock();
            std::mem::replace(&mut *current, next.clone())
        };
        previous.cancel();
        self.generation.fetch_add(1, Ordering::AcqRel);
        next
    }

    /// Cancel the current token without installing a new one
    pub fn cancel(&self) {
        self.current.lock().cancel();
    }

    /// Get a clone of the current token
    pub fn token(&self) -> CancellationToken {
        self.current.lock().clone()
    }

    /// Number of times the token has been replaced
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Default for CurrentToken {
    fn default() -> Self {
        Self::new()
    }
}
