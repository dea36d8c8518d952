//! Reversible edits
//!
//! Every structural change to a collection returns an [`EditRecord`]: the
//! edit as applied plus the edit that undoes it. Applying `inverse` restores
//! the page order and rotations; items are recreated, so their ids change.

use crate::item::PageEntry;
use crate::page::Rotation;

#[derive(Debug, Clone)]
pub enum Edit {
    /// Insert pages before `index`
    Insert { index: usize, entries: Vec<PageEntry> },
    /// Remove the items at `indices`
    Remove { indices: Vec<usize> },
    /// Shift the items at `indices` by `delta` positions
    Move { indices: Vec<usize>, delta: isize },
    /// Rotate the items at `indices` by `rotation`
    Rotate { indices: Vec<usize>, rotation: Rotation },
    /// Rearrange so that new position `i` holds the item at `order[i]`
    Reorder { order: Vec<usize> },
    /// Put removed pages back; positions ascend
    Restore { entries: Vec<(usize, PageEntry)> },
}

impl Edit {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Edit::Insert { .. } => "insert",
            Edit::Remove { .. } => "remove",
            Edit::Move { .. } => "move",
            Edit::Rotate { .. } => "rotate",
            Edit::Reorder { .. } => "reorder",
            Edit::Restore { .. } => "restore",
        }
    }
}

/// An applied edit and its inverse
#[derive(Debug, Clone)]
pub struct EditRecord {
    pub forward: Edit,
    pub inverse: Edit,
}
