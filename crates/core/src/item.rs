//! Items of the strip
//!
//! An [`ImageItem`] is one page as shown in the strip: its position, its
//! thumbnail size and any extra rotation applied by the user. Items are
//! owned by an [`ImageCollection`](crate::ImageCollection), which keeps
//! their indices current.

use crate::page::{PageRef, PageSize, Rotation};
use crate::preference::ImagePreference;
use crate::render::ThumbnailSize;
use crate::selection::Selection;
use pagestrip_cache::{Observers, SubscriptionId};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique item identity; never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemId(u64);

impl ItemId {
    fn next() -> Self {
        ItemId(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which item property changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemProperty {
    Index,
    Size,
    /// The displayed image should be fetched again
    Image,
    Selected,
    Rotation,
    Page,
}

/// A page plus the extra rotation the user applied to it
#[derive(Debug, Clone)]
pub struct PageEntry {
    pub page: PageRef,
    pub rotation: Rotation,
}

impl PageEntry {
    pub fn new(page: PageRef) -> Self {
        Self {
            page,
            rotation: Rotation::NONE,
        }
    }
}

/// One page in the strip
pub struct ImageItem {
    id: ItemId,
    index: usize,
    size: ThumbnailSize,
    page: PageRef,
    rotation: Rotation,
    selection: Arc<Selection<ItemId>>,
    observers: Observers<ItemProperty>,
    disposed: bool,
}

impl ImageItem {
    pub(crate) fn new(
        entry: PageEntry,
        index: usize,
        selection: Arc<Selection<ItemId>>,
        preference: &ImagePreference,
    ) -> Self {
        let mut item = Self {
            id: ItemId::next(),
            index,
            size: ThumbnailSize::default(),
            page: entry.page,
            rotation: entry.rotation,
            selection,
            observers: Observers::new(),
            disposed: false,
        };
        item.size = preference.thumbnail_size(item.view_size());
        item
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Position in the owning collection
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn size(&self) -> ThumbnailSize {
        self.size
    }

    pub fn page(&self) -> &PageRef {
        &self.page
    }

    pub fn label(&self) -> String {
        self.page.label()
    }

    /// Rotation applied on top of the page's own
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Rotation the thumbnail is rendered with
    pub fn total_rotation(&self) -> Rotation {
        self.page.rotation().add(self.rotation)
    }

    /// Page size in points as displayed
    pub fn view_size(&self) -> PageSize {
        self.page.size().rotated(self.total_rotation())
    }

    pub fn entry(&self) -> PageEntry {
        PageEntry {
            page: self.page.clone(),
            rotation: self.rotation,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.selection.contains(&self.id)
    }

    /// Add to or remove from the shared selection.
    ///
    /// The `Selected` notification is raised when the owning collection
    /// dispatches selection changes.
    pub fn set_selected(&self, selected: bool) -> bool {
        if self.disposed {
            return false;
        }
        if selected {
            self.selection.add(self.id)
        } else {
            self.selection.remove(&self.id)
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&ItemProperty) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        if self.index != index {
            self.index = index;
            self.notify(ItemProperty::Index);
        }
    }

    /// Recompute the thumbnail size, then ask for a fresh image
    pub(crate) fn update_size(&mut self, preference: &ImagePreference) {
        let size = preference.thumbnail_size(self.view_size());
        if size != self.size {
            self.size = size;
            self.notify(ItemProperty::Size);
        }
        self.refresh();
    }

    pub(crate) fn set_page(&mut self, page: PageRef, preference: &ImagePreference) {
        self.page = page;
        self.notify(ItemProperty::Page);
        self.update_size(preference);
    }

    pub(crate) fn rotate(&mut self, rotation: Rotation, preference: &ImagePreference) {
        if rotation == Rotation::NONE {
            return;
        }
        self.rotation = self.rotation.add(rotation);
        self.notify(ItemProperty::Rotation);
        self.update_size(preference);
    }

    pub(crate) fn refresh(&self) {
        self.notify(ItemProperty::Image);
    }

    pub(crate) fn notify(&self, property: ItemProperty) {
        if !self.disposed {
            self.observers.notify(&property);
        }
    }

    /// Leave the selection and drop observers; safe to call twice
    pub(crate) fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.selection.remove(&self.id);
        self.observers.clear();
    }
}

impl Drop for ImageItem {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for ImageItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageItem")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("size", &self.size)
            .field("rotation", &self.rotation)
            .field("page", &self.page)
            .finish()
    }
}
