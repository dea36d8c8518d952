//! Asynchronous memoizing cache
//!
//! `CacheCollection` maps keys to values that are expensive to compute.
//! A lookup either returns the completed value or schedules the creation on
//! an [`Executor`] and returns `None` right away; callers treat `None` as
//! "not yet, draw a placeholder". At most one creation per key is ever in
//! flight, and a value whose key was evicted while it was being computed is
//! handed to the disposer instead of being stored.

use crate::observer::{Observers, SubscriptionId};
use log::{debug, warn};
use pagestrip_scheduler::{panic_message, CancellationToken, ExecuteError, Executor};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Error type creation functions may return
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a creation did not produce a cache entry
#[derive(Debug, Error)]
pub enum CacheError {
    /// The creation function returned an error
    #[error("creation failed: {0}")]
    Create(#[source] BoxError),

    /// The creation function finished without a value
    #[error("creation produced no value")]
    NoValue,

    /// The creation function panicked
    #[error("creation panicked: {0}")]
    Panicked(String),

    /// The executor refused the creation task
    #[error("creation could not be scheduled: {0}")]
    Rejected(#[from] ExecuteError),
}

/// Notification raised when a creation finishes
#[derive(Debug, Clone)]
pub enum CacheEvent<K, V> {
    /// A value was stored for `key`
    Created { key: K, value: V },

    /// Creation for `key` failed; the key stays absent and may be retried.
    ///
    /// Not raised when a newer creation for the same key is in flight.
    Failed { key: K, error: Arc<CacheError> },
}

impl<K, V> CacheEvent<K, V> {
    /// Key the event refers to
    pub fn key(&self) -> &K {
        match self {
            CacheEvent::Created { key, .. } | CacheEvent::Failed { key, .. } => key,
        }
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Completed entries currently stored
    pub entries: usize,

    /// Keys currently being created
    pub inflight: usize,

    /// Lookups answered with a completed value
    pub hits: u64,

    /// Lookups that found no completed value
    pub misses: u64,

    /// Creations handed to the executor
    pub scheduled: u64,

    /// Creations that produced a stored value
    pub created: u64,

    /// Creations that failed
    pub failed: u64,

    /// Outcomes thrown away because their key was evicted mid-flight or a
    /// newer creation for the key replaced them
    pub discarded: u64,

    /// Completed values removed by `remove` or `clear`
    pub evicted: u64,
}

impl CacheStats {
    /// Calculate the lookup hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Creation ticket; a completion only lands if its ticket is still the one
/// recorded as in flight for the key.
type Ticket = u64;

type Disposer<K, V> = Arc<dyn Fn(&K, V) + Send + Sync>;

struct CacheState<K, V> {
    created: HashMap<K, V>,
    inflight: HashMap<K, Ticket>,
    next_ticket: Ticket,
    stats: CacheStats,
}

impl<K: Eq + Hash, V> CacheState<K, V> {
    fn new() -> Self {
        Self {
            created: HashMap::new(),
            inflight: HashMap::new(),
            next_ticket: 1,
            stats: CacheStats::default(),
        }
    }

    fn sync_sizes(&mut self) {
        self.stats.entries = self.created.len();
        self.stats.inflight = self.inflight.len();
    }
}

struct Inner<K, V> {
    state: Mutex<CacheState<K, V>>,
    observers: Observers<CacheEvent<K, V>>,
    disposer: Option<Disposer<K, V>>,
}

impl<K, V> Inner<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn complete(&self, key: K, ticket: Ticket, result: Result<V, CacheError>) {
        match result {
            Ok(value) => {
                let stored = {
                    let mut state = self.state.lock();
                    let stored = if state.inflight.get(&key) == Some(&ticket) {
                        state.inflight.remove(&key);
                        state.created.insert(key.clone(), value.clone());
                        state.stats.created += 1;
                        true
                    } else {
                        state.stats.discarded += 1;
                        false
                    };
                    state.sync_sizes();
                    stored
                };

                if stored {
                    self.observers.notify(&CacheEvent::Created { key, value });
                } else {
                    debug!("discarding value for evicted key {:?}", key);
                    self.dispose(&key, value);
                }
            }
            Err(error) => {
                let superseded = {
                    let mut state = self.state.lock();
                    let superseded = match state.inflight.get(&key) {
                        Some(current) if *current == ticket => {
                            state.inflight.remove(&key);
                            false
                        }
                        Some(_) => true,
                        None => false,
                    };
                    if superseded {
                        state.stats.discarded += 1;
                    } else {
                        state.stats.failed += 1;
                    }
                    state.sync_sizes();
                    superseded
                };

                if superseded {
                    debug!("ignoring failure of superseded creation for {:?}: {}", key, error);
                    return;
                }
                warn!("cache creation for {:?} failed: {}", key, error);
                self.observers.notify(&CacheEvent::Failed {
                    key,
                    error: Arc::new(error),
                });
            }
        }
    }

    fn dispose(&self, key: &K, value: V) {
        if let Some(disposer) = &self.disposer {
            disposer(key, value);
        }
    }
}

/// Asynchronous memoizing cache with at-most-one creation in flight per key
///
/// Thread-safe: lookups, removals and completions may race freely. Events are
/// raised on whichever thread completes the creation; owners that need them
/// on a particular thread forward them through a channel.
///
/// # Example
///
/// ```
/// use pagestrip_cache::CacheCollection;
/// use pagestrip_scheduler::DeferredExecutor;
/// use std::sync::Arc;
///
/// let executor = Arc::new(DeferredExecutor::new());
/// let cache: CacheCollection<u32, String> = CacheCollection::new(executor.clone());
///
/// // First lookup schedules the creation and reports "not yet".
/// assert!(cache.get_or_create(7, |key| Ok(Some(format!("page {}", key)))).is_none());
///
/// executor.run_pending();
/// assert_eq!(cache.try_get_value(&7).as_deref(), Some("page 7"));
/// ```
pub struct CacheCollection<K, V> {
    inner: Arc<Inner<K, V>>,
    executor: Arc<dyn Executor>,
}

impl<K, V> CacheCollection<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache that runs creations on `executor`
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self::build(executor, None)
    }

    /// Create a cache that passes every dropped value to `disposer`
    ///
    /// The disposer sees values removed by `remove`/`clear` and values
    /// computed for keys that were evicted while in flight.
    pub fn with_disposer<D>(executor: Arc<dyn Executor>, disposer: D) -> Self
    where
        D: Fn(&K, V) + Send + Sync + 'static,
    {
        Self::build(executor, Some(Arc::new(disposer)))
    }

    fn build(executor: Arc<dyn Executor>, disposer: Option<Disposer<K, V>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState::new()),
                observers: Observers::new(),
                disposer,
            }),
            executor,
        }
    }

    /// Return the completed value for `key`, or schedule `create` for it
    ///
    /// Never blocks on the creation. If `key` already has a creation in
    /// flight, `create` is dropped without running.
    pub fn get_or_create<F>(&self, key: K, create: F) -> Option<V>
    where
        F: FnOnce(&K) -> Result<Option<V>, BoxError> + Send + 'static,
    {
        self.lookup(key, None, create)
    }

    /// Like [`get_or_create`](Self::get_or_create), but schedules nothing
    /// once `token` is cancelled.
    ///
    /// The token is checked under the cache lock. A caller that cancels
    /// the token before calling [`remove`](Self::remove) or
    /// [`clear`](Self::clear) is guaranteed that no creation started under
    /// the token can land after the eviction.
    pub fn get_or_create_unless_cancelled<F>(
        &self,
        key: K,
        token: &CancellationToken,
        create: F,
    ) -> Option<V>
    where
        F: FnOnce(&K) -> Result<Option<V>, BoxError> + Send + 'static,
    {
        self.lookup(key, Some(token), create)
    }

    fn lookup<F>(&self, key: K, token: Option<&CancellationToken>, create: F) -> Option<V>
    where
        F: FnOnce(&K) -> Result<Option<V>, BoxError> + Send + 'static,
    {
        let ticket = {
            let mut state = self.inner.state.lock();
            if let Some(value) = state.created.get(&key) {
                let value = value.clone();
                state.stats.hits += 1;
                return Some(value);
            }
            if token.is_some_and(CancellationToken::is_cancelled) {
                debug!("not scheduling {:?}: lookup was cancelled", key);
                return None;
            }
            state.stats.misses += 1;
            if state.inflight.contains_key(&key) {
                return None;
            }

            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.inflight.insert(key.clone(), ticket);
            state.stats.scheduled += 1;
            state.sync_sizes();
            ticket
        };

        let inner = self.inner.clone();
        let task_key = key.clone();
        let task = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| create(&task_key)));
            let result = match outcome {
                Ok(Ok(Some(value))) => Ok(value),
                Ok(Ok(None)) => Err(CacheError::NoValue),
                Ok(Err(error)) => Err(CacheError::Create(error)),
                Err(payload) => Err(CacheError::Panicked(panic_message(payload.as_ref()))),
            };
            inner.complete(task_key, ticket, result);
        });

        if let Err(error) = self.executor.execute(task) {
            self.inner.complete(key, ticket, Err(CacheError::Rejected(error)));
        }
        None
    }

    /// Completed value for `key`, without scheduling anything
    pub fn try_get_value(&self, key: &K) -> Option<V> {
        self.inner.state.lock().created.get(key).cloned()
    }

    /// Whether `key` has a completed value
    pub fn contains(&self, key: &K) -> bool {
        self.inner.state.lock().created.contains_key(key)
    }

    /// Whether `key` has a creation in flight
    pub fn is_inflight(&self, key: &K) -> bool {
        self.inner.state.lock().inflight.contains_key(key)
    }

    /// Forget `key`: drop its in-flight marker and its completed value
    ///
    /// Returns `true` if a completed value was removed (and disposed).
    pub fn remove(&self, key: &K) -> bool {
        let removed = {
            let mut state = self.inner.state.lock();
            state.inflight.remove(key);
            let removed = state.created.remove(key);
            if removed.is_some() {
                state.stats.evicted += 1;
            }
            state.sync_sizes();
            removed
        };

        match removed {
            Some(value) => {
                self.inner.dispose(key, value);
                true
            }
            None => false,
        }
    }

    /// Forget every key, disposing all completed values
    ///
    /// Returns the number of completed values removed.
    pub fn clear(&self) -> usize {
        let removed: Vec<(K, V)> = {
            let mut state = self.inner.state.lock();
            state.inflight.clear();
            let removed: Vec<(K, V)> = state.created.drain().collect();
            state.stats.evicted += removed.len() as u64;
            state.sync_sizes();
            removed
        };

        let count = removed.len();
        for (key, value) in removed {
            self.inner.dispose(&key, value);
        }
        if count > 0 {
            debug!("cache cleared {} entries", count);
        }
        count
    }

    /// Number of completed values
    pub fn len(&self) -> usize {
        self.inner.state.lock().created.len()
    }

    /// Whether there are no completed values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of creations in flight
    pub fn inflight_len(&self) -> usize {
        self.inner.state.lock().inflight.len()
    }

    /// Keys that have a completed value
    pub fn keys(&self) -> Vec<K> {
        self.inner.state.lock().created.keys().cloned().collect()
    }

    /// Register an observer for `Created`/`Failed` events
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent<K, V>) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(observer)
    }

    /// Remove an observer
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.inner.state.lock().stats
    }

    /// Keys recorded both as created and in flight; always empty
    #[cfg(test)]
    fn overlapping_keys(&self) -> Vec<K> {
        let state = self.inner.state.lock();
        state
            .inflight
            .keys()
            .filter(|key| state.created.contains_key(*key))
            .cloned()
            .collect()
    }
}
