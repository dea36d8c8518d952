//! Shared set of selected items

use pagestrip_cache::{Observers, SubscriptionId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::hash::Hash;

/// A change to a [`Selection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionChange<T> {
    Added(T),
    Removed(T),
    /// Every member was dropped
    Cleared(Vec<T>),
}

/// Set of selected members.
///
/// Owned jointly by a collection and its items; an item is selected exactly
/// when its id is a member. Observers run on the thread that changed the
/// selection.
#[derive(Debug)]
pub struct Selection<T> {
    members: Mutex<HashSet<T>>,
    observers: Observers<SelectionChange<T>>,
}

impl<T> Selection<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            members: Mutex::new(HashSet::new()),
            observers: Observers::new(),
        }
    }

    /// Add `member`, returning whether it was newly added
    pub fn add(&self, member: T) -> bool {
        let added = self.members.lock().insert(member.clone());
        if added {
            self.observers.notify(&SelectionChange::Added(member));
        }
        added
    }

    /// Remove `member`, returning whether it was present
    pub fn remove(&self, member: &T) -> bool {
        let removed = self.members.lock().remove(member);
        if removed {
            self.observers.notify(&SelectionChange::Removed(member.clone()));
        }
        removed
    }

    pub fn contains(&self, member: &T) -> bool {
        self.members.lock().contains(member)
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Drop every member, returning how many there were
    pub fn clear(&self) -> usize {
        let dropped: Vec<T> = self.members.lock().drain().collect();
        let count = dropped.len();
        if count > 0 {
            self.observers.notify(&SelectionChange::Cleared(dropped));
        }
        count
    }

    /// Snapshot of the members in no particular order
    pub fn members(&self) -> Vec<T> {
        self.members.lock().iter().cloned().collect()
    }

    /// Positions of the members, ascending.
    ///
    /// `position_of` maps a member to its position; members it cannot place
    /// are skipped.
    pub fn indices<F>(&self, position_of: F) -> Vec<usize>
    where
        F: Fn(&T) -> Option<usize>,
    {
        let mut indices: Vec<usize> = self.members().iter().filter_map(position_of).collect();
        indices.sort_unstable();
        indices
    }

    /// Lowest member position, if any
    pub fn first<F>(&self, position_of: F) -> Option<usize>
    where
        F: Fn(&T) -> Option<usize>,
    {
        self.members().iter().filter_map(position_of).min()
    }

    /// Highest member position, if any
    pub fn last<F>(&self, position_of: F) -> Option<usize>
    where
        F: Fn(&T) -> Option<usize>,
    {
        self.members().iter().filter_map(position_of).max()
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&SelectionChange<T>) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }
}

impl<T> Default for Selection<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
