//! pagestrip cache library
//!
//! Asynchronous memoizing cache used to hold rendered thumbnails, plus the
//! observer lists the rest of the pipeline uses for change notification.

pub mod collection;
pub mod observer;

pub use collection::{BoxError, CacheCollection, CacheError, CacheEvent, CacheStats};
pub use observer::{Observers, SubscriptionId};
