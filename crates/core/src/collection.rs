//! The page strip
//!
//! [`ImageCollection`] owns the ordered items, the thumbnail cache, the
//! selection and the display preferences. It is driven from a single owning
//! thread: every edit runs there, and cache and selection notifications
//! raised on render workers are queued until the owner calls
//! [`ImageCollection::dispatch_events`].
//!
//! Each edit or preference change starts a new background fill over the
//! visible window, cancelling the previous one. The fill asks the cache for
//! every visible item in ascending order; the cache renders missing
//! thumbnails on the executor.

use crate::config::StripConfig;
use crate::edit::{Edit, EditRecord};
use crate::error::StripResult;
use crate::item::{ImageItem, ItemId, ItemProperty, PageEntry};
use crate::page::{PageRef, Rotation};
use crate::preference::ImagePreference;
use crate::render::{placeholder, RenderedImage, Renderer, ThumbnailSize};
use crate::selection::{Selection, SelectionChange};
use log::{debug, info};
use pagestrip_cache::{
    BoxError, CacheCollection, CacheError, CacheEvent, Observers, SubscriptionId,
};
use pagestrip_scheduler::{BackgroundFill, CycleState, Executor, FillCycle, FillStats, TaskPool};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::{ControlFlow, Range};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

/// Thumbnails keyed by item
pub type ThumbnailCache = CacheCollection<ItemId, Arc<RenderedImage>>;

type ThumbnailEvent = CacheEvent<ItemId, Arc<RenderedImage>>;

/// Structural change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange {
    /// `count` items were inserted starting at `index`
    Inserted { index: usize, count: usize },
    /// Items at these former positions were removed
    Removed { indices: Vec<usize> },
    /// One item moved from `from` to `to`
    Moved { from: usize, to: usize },
    /// Anything else; re-read the whole sequence
    Reset,
}

/// A thumbnail that could not be rendered
#[derive(Debug, Clone)]
pub struct RenderFailure {
    pub id: ItemId,
    /// Position of the item when the failure was dispatched, if it still
    /// exists
    pub index: Option<usize>,
    pub error: Arc<CacheError>,
}

/// What the view should draw for an item
#[derive(Debug, Clone)]
pub enum ItemImage {
    Rendered(Arc<RenderedImage>),
    /// Shown until the thumbnail is ready
    Placeholder(Arc<RenderedImage>),
    /// Outline-only mode; draw an empty frame of this size
    Frame(ThumbnailSize),
}

/// How the view should fit an item's image into its box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stretch {
    /// The image already has the item's size
    None,
    /// Scale preserving aspect ratio
    Uniform,
}

/// Input for one background render
struct RenderRequest {
    id: ItemId,
    page: PageRef,
    rotation: Rotation,
    size: ThumbnailSize,
}

impl RenderRequest {
    fn for_item(item: &ImageItem) -> Self {
        Self {
            id: item.id(),
            page: item.page().clone(),
            rotation: item.total_rotation(),
            size: item.size(),
        }
    }
}

/// Ordered, cached, selectable page thumbnails.
///
/// # Example
///
/// ```
/// use pagestrip_core::{BlankRenderer, ImageCollection, ImagePreference, PageSize, StaticPage};
/// use pagestrip_scheduler::DeferredExecutor;
/// use std::sync::Arc;
///
/// let executor = Arc::new(DeferredExecutor::new());
/// let mut strip = ImageCollection::new(
///     Arc::new(BlankRenderer::default()),
///     executor.clone(),
///     ImagePreference::default(),
/// );
///
/// let pages = ["A", "B", "C"]
///     .into_iter()
///     .map(|label| StaticPage::new(label, PageSize::letter()).into_ref())
///     .collect();
/// strip.add(pages);
/// strip.set_visible_range(0, 3);
///
/// executor.run_pending();
/// strip.dispatch_events();
/// assert!(strip.thumbnail(1).is_some());
/// ```
pub struct ImageCollection {
    items: Vec<ImageItem>,
    preference: ImagePreference,
    selection: Arc<Selection<ItemId>>,
    cache: Arc<ThumbnailCache>,
    renderer: Arc<dyn Renderer>,
    executor: Arc<dyn Executor>,
    fill: BackgroundFill,
    cache_events: Receiver<ThumbnailEvent>,
    selection_events: Receiver<SelectionChange<ItemId>>,
    cache_subscription: SubscriptionId,
    selection_subscription: SubscriptionId,
    changes: Observers<CollectionChange>,
    failures: Observers<RenderFailure>,
    placeholders: Mutex<HashMap<ThumbnailSize, Arc<RenderedImage>>>,
    disposed: Arc<AtomicBool>,
}

impl ImageCollection {
    /// Create an empty strip rendering with `renderer` on `executor`
    pub fn new(
        renderer: Arc<dyn Renderer>,
        executor: Arc<dyn Executor>,
        preference: ImagePreference,
    ) -> Self {
        let cache = Arc::new(ThumbnailCache::with_disposer(
            executor.clone(),
            |id: &ItemId, image: Arc<RenderedImage>| {
                debug!("released thumbnail {} ({})", id, image.size());
            },
        ));

        let (cache_tx, cache_events) = mpsc::channel();
        let cache_tx = Mutex::new(cache_tx);
        let cache_subscription = cache.subscribe(move |event: &ThumbnailEvent| {
            // The receiver is gone only after the collection was dropped.
            let _ = cache_tx.lock().send(event.clone());
        });

        let selection = Arc::new(Selection::new());
        let (selection_tx, selection_events) = mpsc::channel();
        let selection_tx = Mutex::new(selection_tx);
        let selection_subscription = selection.subscribe(move |change: &SelectionChange<ItemId>| {
            let _ = selection_tx.lock().send(change.clone());
        });

        Self {
            items: Vec::new(),
            preference,
            selection,
            cache,
            renderer,
            executor,
            fill: BackgroundFill::new(),
            cache_events,
            selection_events,
            cache_subscription,
            selection_subscription,
            changes: Observers::new(),
            failures: Observers::new(),
            placeholders: Mutex::new(HashMap::new()),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a strip with its own render pool sized from `config`
    pub fn from_config(config: &StripConfig, renderer: Arc<dyn Renderer>) -> StripResult<Self> {
        config.validate()?;
        let pool = TaskPool::new(config.pool_config())?;
        info!(
            "page strip started with {} render workers",
            pool.num_workers()
        );
        Ok(Self::new(
            renderer,
            Arc::new(pool),
            ImagePreference::from_config(config),
        ))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ImageItem> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[ImageItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageItem> {
        self.items.iter()
    }

    /// Current position of the item with `id`
    pub fn position_of(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    fn positions(&self) -> HashMap<ItemId, usize> {
        self.items.iter().map(|item| (item.id(), item.index())).collect()
    }

    pub fn preference(&self) -> &ImagePreference {
        &self.preference
    }

    pub fn selection(&self) -> &Arc<Selection<ItemId>> {
        &self.selection
    }

    pub fn cache(&self) -> &ThumbnailCache {
        &self.cache
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------

    /// Append one item per page
    pub fn add(&mut self, pages: Vec<PageRef>) -> Option<EditRecord> {
        let len = self.items.len();
        self.insert(len, pages)
    }

    /// Insert one item per page starting at `index`, clamped to the length
    pub fn insert(&mut self, index: usize, pages: Vec<PageRef>) -> Option<EditRecord> {
        self.insert_entries(index, pages.into_iter().map(PageEntry::new).collect())
    }

    fn insert_entries(&mut self, index: usize, entries: Vec<PageEntry>) -> Option<EditRecord> {
        if self.is_disposed() || entries.is_empty() {
            return None;
        }
        let index = index.min(self.items.len());
        let count = entries.len();

        let new_items: Vec<ImageItem> = entries
            .iter()
            .cloned()
            .enumerate()
            .map(|(offset, entry)| {
                ImageItem::new(entry, index + offset, self.selection.clone(), &self.preference)
            })
            .collect();
        self.items.splice(index..index, new_items);
        self.restamp(index + count..self.items.len());

        debug!("inserted {} items at {}", count, index);
        self.changes.notify(&CollectionChange::Inserted { index, count });
        self.reschedule();

        Some(EditRecord {
            forward: Edit::Insert { index, entries },
            inverse: Edit::Remove {
                indices: (index..index + count).collect(),
            },
        })
    }

    /// Remove the items at `indices`; out-of-range and repeated indices are
    /// ignored
    pub fn remove(&mut self, indices: &[usize]) -> Option<EditRecord> {
        let targets = self.valid_indices(indices);
        if self.is_disposed() || targets.is_empty() {
            return None;
        }

        self.fill.cancel();
        let mut removed = Vec::with_capacity(targets.len());
        for &index in targets.iter().rev() {
            let mut item = self.items.remove(index);
            self.cache.remove(&item.id());
            removed.push((index, item.entry()));
            item.dispose();
        }
        removed.reverse();
        self.restamp(targets[0]..self.items.len());

        debug!("removed {} items", targets.len());
        self.changes.notify(&CollectionChange::Removed {
            indices: targets.clone(),
        });
        self.reschedule();

        Some(EditRecord {
            forward: Edit::Remove { indices: targets },
            inverse: Edit::Restore { entries: removed },
        })
    }

    /// Put pages back at the positions they were removed from
    fn restore(&mut self, entries: Vec<(usize, PageEntry)>) -> Option<EditRecord> {
        if self.is_disposed() || entries.is_empty() {
            return None;
        }

        let mut positions = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().cloned() {
            let index = index.min(self.items.len());
            let item = ImageItem::new(entry, index, self.selection.clone(), &self.preference);
            self.items.insert(index, item);
            positions.push(index);
        }
        let start = positions.iter().copied().min().unwrap_or(0);
        self.restamp(start..self.items.len());

        for &index in &positions {
            self.changes
                .notify(&CollectionChange::Inserted { index, count: 1 });
        }
        self.reschedule();

        Some(EditRecord {
            forward: Edit::Restore { entries },
            inverse: Edit::Remove { indices: positions },
        })
    }

    /// Shift the items at `indices` by `delta` positions.
    ///
    /// Items move one at a time, nearest the destination first, and never
    /// pass each other, so the moved items keep their relative order.
    /// Destinations are clamped to the sequence.
    pub fn move_items(&mut self, indices: &[usize], delta: isize) -> Option<EditRecord> {
        let targets = self.valid_indices(indices);
        if self.is_disposed() || targets.is_empty() || delta == 0 {
            return None;
        }

        let before: Vec<ItemId> = self.items.iter().map(ImageItem::id).collect();
        let mut moves = Vec::with_capacity(targets.len());

        if delta < 0 {
            let mut floor = 0;
            for &from in &targets {
                let to = from.saturating_add_signed(delta).max(floor);
                moves.push((from, to));
                floor = to + 1;
            }
        } else {
            let mut ceiling = self.items.len() - 1;
            for &from in targets.iter().rev() {
                let to = from.saturating_add_signed(delta).min(ceiling);
                moves.push((from, to));
                ceiling = to.saturating_sub(1);
            }
        }

        let mut touched: Option<(usize, usize)> = None;
        for &(from, to) in &moves {
            if from == to {
                continue;
            }
            let item = self.items.remove(from);
            self.items.insert(to, item);
            let (low, high) = (from.min(to), from.max(to));
            touched = Some(match touched {
                Some((min, max)) => (min.min(low), max.max(high)),
                None => (low, high),
            });
            self.changes.notify(&CollectionChange::Moved { from, to });
        }

        let (min, max) = touched?;
        self.restamp(min..max + 1);
        debug!("moved {} items by {}", targets.len(), delta);
        self.reschedule();

        let position: HashMap<ItemId, usize> = self
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| (item.id(), index))
            .collect();
        let order = before
            .iter()
            .filter_map(|id| position.get(id).copied())
            .collect();

        Some(EditRecord {
            forward: Edit::Move {
                indices: targets,
                delta,
            },
            inverse: Edit::Reorder { order },
        })
    }

    /// Rearrange so that new position `i` holds the item now at `order[i]`.
    ///
    /// `order` must be a permutation of `0..len`; anything else is ignored.
    pub fn reorder(&mut self, order: &[usize]) -> Option<EditRecord> {
        if self.is_disposed() || order.len() != self.items.len() || order.is_empty() {
            return None;
        }
        let mut seen = vec![false; order.len()];
        for &index in order {
            if index >= seen.len() || std::mem::replace(&mut seen[index], true) {
                debug!("ignoring reorder that is not a permutation");
                return None;
            }
        }

        let mut slots: Vec<Option<ImageItem>> = self.items.drain(..).map(Some).collect();
        self.items = order.iter().filter_map(|&index| slots[index].take()).collect();
        self.restamp(0..self.items.len());

        let mut inverse = vec![0; order.len()];
        for (position, &index) in order.iter().enumerate() {
            inverse[index] = position;
        }

        self.changes.notify(&CollectionChange::Reset);
        self.reschedule();

        Some(EditRecord {
            forward: Edit::Reorder {
                order: order.to_vec(),
            },
            inverse: Edit::Reorder { order: inverse },
        })
    }

    /// Rotate the items at `indices` by `degrees`, rounded down to a quarter
    /// turn, and render them again
    pub fn rotate(&mut self, indices: &[usize], degrees: i32) -> Option<EditRecord> {
        self.rotate_by(indices, Rotation::from_degrees(degrees))
    }

    fn rotate_by(&mut self, indices: &[usize], rotation: Rotation) -> Option<EditRecord> {
        let targets = self.valid_indices(indices);
        if self.is_disposed() || targets.is_empty() || rotation == Rotation::NONE {
            return None;
        }

        self.reschedule_with(|this| {
            for &index in &targets {
                let item = &mut this.items[index];
                this.cache.remove(&item.id());
                item.rotate(rotation, &this.preference);
            }
        });

        Some(EditRecord {
            forward: Edit::Rotate {
                indices: targets.clone(),
                rotation,
            },
            inverse: Edit::Rotate {
                indices: targets,
                rotation: rotation.inverse(),
            },
        })
    }

    /// Apply an edit, typically the inverse of an earlier one
    pub fn apply(&mut self, edit: &Edit) -> Option<EditRecord> {
        debug!("applying {} edit", edit.kind());
        match edit.clone() {
            Edit::Insert { index, entries } => self.insert_entries(index, entries),
            Edit::Remove { indices } => self.remove(&indices),
            Edit::Move { indices, delta } => self.move_items(&indices, delta),
            Edit::Rotate { indices, rotation } => self.rotate_by(&indices, rotation),
            Edit::Reorder { order } => self.reorder(&order),
            Edit::Restore { entries } => self.restore(entries),
        }
    }

    /// Swap the page shown by the item at `index`
    pub fn replace_page(&mut self, index: usize, page: PageRef) -> bool {
        if self.is_disposed() || index >= self.items.len() {
            return false;
        }
        self.reschedule_with(|this| {
            let item = &mut this.items[index];
            this.cache.remove(&item.id());
            item.set_page(page, &this.preference);
        });
        true
    }

    /// Dispose every item and empty the strip
    pub fn clear(&mut self) {
        if self.is_disposed() {
            return;
        }
        self.reschedule_with(|this| {
            this.cache.clear();
            for mut item in this.items.drain(..) {
                item.dispose();
            }
            this.selection.clear();
            this.changes.notify(&CollectionChange::Reset);
        });
        info!("page strip cleared");
    }

    // ------------------------------------------------------------------
    // Rendering inputs
    // ------------------------------------------------------------------

    /// Step the item size by `offset`; drops every cached thumbnail
    pub fn zoom(&mut self, offset: isize) -> bool {
        if self.is_disposed() {
            return false;
        }
        let mut changed = false;
        self.reschedule_with(|this| {
            this.invalidate_all();
            changed = this.preference.adjust_item_size_index(offset);
            this.update_sizes();
        });
        debug!(
            "zoom {:+} -> item size {}",
            offset,
            self.preference.item_size()
        );
        changed
    }

    /// Drop every cached thumbnail and render the visible ones again
    pub fn redraw(&mut self) {
        if self.is_disposed() {
            return;
        }
        self.reschedule_with(|this| {
            this.invalidate_all();
            for item in &this.items {
                item.refresh();
            }
        });
    }

    /// Change the caption height; resizes items and renders again
    pub fn set_text_height(&mut self, height: u32) -> bool {
        if self.is_disposed() || self.preference.text_height() == height {
            return false;
        }
        self.reschedule_with(|this| {
            this.invalidate_all();
            this.preference.set_text_height(height);
            this.update_sizes();
        });
        true
    }

    /// Switch outline-only mode; no thumbnails are rendered while it is on
    pub fn set_frame_only(&mut self, frame_only: bool) -> bool {
        if self.is_disposed() || self.preference.frame_only() == frame_only {
            return false;
        }
        self.reschedule_with(|this| {
            this.preference.set_frame_only(frame_only);
            for item in &this.items {
                item.refresh();
            }
        });
        true
    }

    /// Record the positions the view shows, `last` exclusive, and fill them
    pub fn set_visible_range(&mut self, first: i64, last: i64) -> Option<FillCycle> {
        if self.is_disposed() || !self.preference.set_visible(first, last) {
            return None;
        }
        self.reschedule()
    }

    /// Positions the next fill covers
    pub fn visible_range(&self) -> Range<usize> {
        self.preference.visible_range(self.items.len())
    }

    // ------------------------------------------------------------------
    // Background fill
    // ------------------------------------------------------------------

    /// Cancel the running fill and start a new one over the visible range
    pub fn reschedule(&mut self) -> Option<FillCycle> {
        self.reschedule_with(|_| {})
    }

    fn reschedule_with<F>(&mut self, pre_action: F) -> Option<FillCycle>
    where
        F: FnOnce(&mut Self),
    {
        if self.is_disposed() {
            return None;
        }
        self.fill.cancel();
        pre_action(self);
        Some(self.start_fill())
    }

    fn start_fill(&self) -> FillCycle {
        let work: Vec<RenderRequest> = if self.preference.frame_only() {
            Vec::new()
        } else {
            self.items[self.visible_range()]
                .iter()
                .filter(|item| !item.size().is_empty())
                .map(RenderRequest::for_item)
                .collect()
        };

        let cache = self.cache.clone();
        let renderer = self.renderer.clone();
        let disposed = self.disposed.clone();
        self.fill
            .reschedule(self.executor.as_ref(), work, move |request: RenderRequest, token| {
                if disposed.load(Ordering::Acquire) {
                    return ControlFlow::Break(());
                }
                // Edits cancel the cycle before evicting, so a request captured
                // with an outdated size or rotation is never scheduled after
                // its key was evicted.
                let renderer = renderer.clone();
                cache.get_or_create_unless_cancelled(request.id, token, move |_| {
                    renderer
                        .render(request.page.as_ref(), request.rotation, request.size)
                        .map(|image| image.map(Arc::new))
                        .map_err(BoxError::from)
                });
                ControlFlow::Continue(())
            })
    }

    /// The most recent fill cycle
    pub fn current_fill(&self) -> Option<FillCycle> {
        self.fill.latest()
    }

    pub fn fill_state(&self) -> CycleState {
        self.fill.state()
    }

    pub fn fill_stats(&self) -> FillStats {
        self.fill.stats()
    }

    /// Block until the latest fill finishes or `timeout` passes.
    ///
    /// Only the fill loop is awaited; renders it started may still be
    /// running.
    pub fn wait_for_fill(&self, timeout: Duration) -> CycleState {
        match self.fill.latest() {
            Some(cycle) => cycle.wait(timeout),
            None => CycleState::Idle,
        }
    }

    /// Deliver queued cache and selection notifications on this thread.
    ///
    /// Finished thumbnails make their item raise `Image`, failures go to
    /// failure observers, and selection changes make items raise
    /// `Selected`. Returns the number of notifications handled.
    pub fn dispatch_events(&mut self) -> usize {
        if self.is_disposed() {
            return 0;
        }
        let mut handled = 0;
        // Dispatch never changes the item order.
        let positions = self.positions();

        while let Ok(event) = self.cache_events.try_recv() {
            handled += 1;
            match event {
                CacheEvent::Created { key, .. } => match positions.get(&key).copied() {
                    Some(index) => self.items[index].refresh(),
                    None => {
                        self.cache.remove(&key);
                    }
                },
                CacheEvent::Failed { key, error } => {
                    let failure = RenderFailure {
                        id: key,
                        index: positions.get(&key).copied(),
                        error,
                    };
                    self.failures.notify(&failure);
                }
            }
        }

        while let Ok(change) = self.selection_events.try_recv() {
            handled += 1;
            let ids = match change {
                SelectionChange::Added(id) | SelectionChange::Removed(id) => vec![id],
                SelectionChange::Cleared(ids) => ids,
            };
            for id in ids {
                if let Some(&index) = positions.get(&id) {
                    self.items[index].notify(ItemProperty::Selected);
                }
            }
        }

        handled
    }

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    /// What to draw for the item at `index`
    pub fn image(&self, index: usize) -> Option<ItemImage> {
        let item = self.items.get(index)?;
        if self.preference.frame_only() {
            return Some(ItemImage::Frame(item.size()));
        }
        Some(match self.cache.try_get_value(&item.id()) {
            Some(image) => ItemImage::Rendered(image),
            None => ItemImage::Placeholder(self.placeholder(item.size())),
        })
    }

    /// The rendered thumbnail for `index`, if it is ready
    pub fn thumbnail(&self, index: usize) -> Option<Arc<RenderedImage>> {
        let item = self.items.get(index)?;
        self.cache.try_get_value(&item.id())
    }

    /// How the image for `index` should be fitted into its box
    pub fn stretch(&self, index: usize) -> Option<Stretch> {
        let item = self.items.get(index)?;
        Some(match self.image(index)? {
            ItemImage::Rendered(image) if image.size() == item.size() => Stretch::None,
            ItemImage::Frame(_) => Stretch::None,
            _ => Stretch::Uniform,
        })
    }

    fn placeholder(&self, size: ThumbnailSize) -> Arc<RenderedImage> {
        self.placeholders
            .lock()
            .entry(size)
            .or_insert_with(|| Arc::new(placeholder(size)))
            .clone()
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub fn set_selected(&self, index: usize, selected: bool) -> bool {
        match self.items.get(index) {
            Some(item) => item.set_selected(selected),
            None => false,
        }
    }

    pub fn select_all(&self) {
        for item in &self.items {
            item.set_selected(true);
        }
    }

    pub fn clear_selection(&self) -> usize {
        self.selection.clear()
    }

    /// Selected positions, ascending
    pub fn selected_indices(&self) -> Vec<usize> {
        let positions = self.positions();
        self.selection.indices(|id| positions.get(id).copied())
    }

    pub fn first_selected(&self) -> Option<usize> {
        let positions = self.positions();
        self.selection.first(|id| positions.get(id).copied())
    }

    pub fn last_selected(&self) -> Option<usize> {
        let positions = self.positions();
        self.selection.last(|id| positions.get(id).copied())
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    pub fn subscribe_changes<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&CollectionChange) + Send + Sync + 'static,
    {
        self.changes.subscribe(observer)
    }

    pub fn unsubscribe_changes(&self, id: SubscriptionId) -> bool {
        self.changes.unsubscribe(id)
    }

    /// Observe thumbnails that failed to render; called from
    /// [`dispatch_events`](Self::dispatch_events)
    pub fn subscribe_failures<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&RenderFailure) + Send + Sync + 'static,
    {
        self.failures.subscribe(observer)
    }

    pub fn unsubscribe_failures(&self, id: SubscriptionId) -> bool {
        self.failures.unsubscribe(id)
    }

    // ------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------

    /// Cancel background work, drop every thumbnail and item, and turn all
    /// further operations into no-ops. Safe to call more than once.
    pub fn close(&mut self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.fill.cancel();
        self.cache.unsubscribe(self.cache_subscription);
        self.selection.unsubscribe(self.selection_subscription);
        self.cache.clear();
        for mut item in self.items.drain(..) {
            item.dispose();
        }
        self.changes.clear();
        self.failures.clear();
        info!("page strip closed");
    }

    fn invalidate_all(&mut self) {
        let dropped = self.cache.clear();
        self.placeholders.lock().clear();
        debug!("dropped {} cached thumbnails", dropped);
    }

    fn update_sizes(&mut self) {
        for item in &mut self.items {
            item.update_size(&self.preference);
        }
    }

    fn restamp(&mut self, range: Range<usize>) {
        for index in range {
            self.items[index].set_index(index);
        }
    }

    /// Valid, distinct indices in ascending order
    fn valid_indices(&self, indices: &[usize]) -> Vec<usize> {
        let mut valid: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&index| index < self.items.len())
            .collect();
        valid.sort_unstable();
        valid.dedup();
        if valid.len() != indices.len() {
            debug!(
                "ignored {} out-of-range or repeated indices",
                indices.len() - valid.len()
            );
        }
        valid
    }
}

impl Drop for ImageCollection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ImageCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCollection")
            .field("len", &self.items.len())
            .field("item_size", &self.preference.item_size())
            .field("cached", &self.cache.len())
            .field("fill", &self.fill.state())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::page::{Page, PageSize, StaticPage};
    use crate::render::BlankRenderer;
    use pagestrip_scheduler::{DeferredExecutor, InlineExecutor, PoolConfig};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::atomic::AtomicUsize;

    fn pages(labels: &[&str]) -> Vec<PageRef> {
        labels
            .iter()
            .map(|label| StaticPage::new(*label, PageSize::letter()).into_ref())
            .collect()
    }

    fn strip(executor: Arc<dyn Executor>) -> ImageCollection {
        ImageCollection::new(
            Arc::new(BlankRenderer::default()),
            executor,
            ImagePreference::default(),
        )
    }

    fn strip_with(labels: &[&str]) -> (ImageCollection, Arc<DeferredExecutor>) {
        let executor = Arc::new(DeferredExecutor::new());
        let mut strip = strip(executor.clone());
        strip.add(pages(labels));
        executor.run_pending();
        (strip, executor)
    }

    fn labels(strip: &ImageCollection) -> Vec<String> {
        strip.iter().map(ImageItem::label).collect()
    }

    fn assert_indices(strip: &ImageCollection) {
        for (position, item) in strip.iter().enumerate() {
            assert_eq!(item.index(), position, "item {} out of place", item.label());
        }
    }

    /// Renderer that counts calls and can be told to fail
    struct CountingRenderer {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl CountingRenderer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Renderer for CountingRenderer {
        fn render(
            &self,
            page: &dyn Page,
            rotation: Rotation,
            size: ThumbnailSize,
        ) -> Result<Option<RenderedImage>, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RenderError::Page(format!("cannot draw {}", page.label())));
            }
            BlankRenderer::default().render(page, rotation, size)
        }
    }

    #[test]
    fn test_add_assigns_indices() {
        let (strip, _) = strip_with(&["A", "B", "C"]);
        assert_eq!(labels(&strip), ["A", "B", "C"]);
        assert_indices(&strip);
    }

    #[test]
    fn test_insert_in_middle() {
        let (mut strip, _) = strip_with(&["A", "B", "C"]);
        let record = strip.insert(1, pages(&["D", "E"])).unwrap();

        assert_eq!(labels(&strip), ["A", "D", "E", "B", "C"]);
        assert_indices(&strip);
        assert!(matches!(record.inverse, Edit::Remove { ref indices } if *indices == vec![1, 2]));
    }

    #[test]
    fn test_insert_clamps_index() {
        let (mut strip, _) = strip_with(&["A"]);
        strip.insert(10, pages(&["B"]));
        assert_eq!(labels(&strip), ["A", "B"]);
        assert!(strip.insert(0, Vec::new()).is_none());
    }

    #[test]
    fn test_remove_reindexes() {
        let (mut strip, _) = strip_with(&["A", "B", "C", "D"]);
        strip.remove(&[0, 2]).unwrap();

        assert_eq!(labels(&strip), ["B", "D"]);
        assert_indices(&strip);
    }

    #[test]
    fn test_remove_ignores_invalid_indices() {
        let (mut strip, _) = strip_with(&["A", "B"]);
        assert!(strip.remove(&[5, 9]).is_none());

        let record = strip.remove(&[1, 1, 7]).unwrap();
        assert_eq!(labels(&strip), ["A"]);
        assert!(matches!(record.forward, Edit::Remove { ref indices } if *indices == vec![1]));
    }

    #[test]
    fn test_remove_then_restore() {
        let (mut strip, _) = strip_with(&["A", "B", "C", "D", "E"]);
        strip.rotate(&[2], 90);
        let record = strip.remove(&[1, 2, 4]).unwrap();
        assert_eq!(labels(&strip), ["A", "D"]);

        strip.apply(&record.inverse).unwrap();
        assert_eq!(labels(&strip), ["A", "B", "C", "D", "E"]);
        assert_eq!(strip.get(2).unwrap().rotation(), Rotation::CW_90);
        assert_indices(&strip);
    }

    #[test]
    fn test_move_forward() {
        let (mut strip, _) = strip_with(&["A", "B", "C"]);
        strip.move_items(&[0], 2).unwrap();

        assert_eq!(labels(&strip), ["B", "C", "A"]);
        assert_indices(&strip);
    }

    #[test]
    fn test_move_keeps_relative_order() {
        let (mut strip, _) = strip_with(&["A", "B", "C", "D", "E"]);
        strip.move_items(&[0, 1], 10).unwrap();
        assert_eq!(labels(&strip), ["C", "D", "E", "A", "B"]);

        strip.move_items(&[3, 4], -10).unwrap();
        assert_eq!(labels(&strip), ["A", "B", "C", "D", "E"]);

        strip.move_items(&[1, 3], -1).unwrap();
        assert_eq!(labels(&strip), ["B", "A", "D", "C", "E"]);
        assert_indices(&strip);
    }

    #[test]
    fn test_move_at_edge_is_noop() {
        let (mut strip, _) = strip_with(&["A", "B", "C"]);
        assert!(strip.move_items(&[2], 1).is_none());
        assert!(strip.move_items(&[0], 0).is_none());
        assert_eq!(labels(&strip), ["A", "B", "C"]);
    }

    #[test]
    fn test_move_inverse_restores_order() {
        let (mut strip, _) = strip_with(&["A", "B", "C", "D", "E", "F"]);
        let record = strip.move_items(&[0, 2, 5], 2).unwrap();
        assert_ne!(labels(&strip), ["A", "B", "C", "D", "E", "F"]);

        strip.apply(&record.inverse).unwrap();
        assert_eq!(labels(&strip), ["A", "B", "C", "D", "E", "F"]);
        assert_indices(&strip);
    }

    #[test]
    fn test_reorder_rejects_non_permutation() {
        let (mut strip, _) = strip_with(&["A", "B", "C"]);
        assert!(strip.reorder(&[0, 0, 1]).is_none());
        assert!(strip.reorder(&[0, 1]).is_none());
        assert!(strip.reorder(&[2, 0, 1]).is_some());
        assert_eq!(labels(&strip), ["C", "A", "B"]);
    }

    #[test]
    fn test_change_notifications() {
        let (mut strip, _) = strip_with(&["A", "B", "C"]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        strip.subscribe_changes(move |change| seen_clone.lock().push(change.clone()));

        strip.insert(0, pages(&["D"]));
        strip.remove(&[1, 3]);
        strip.move_items(&[0], 1);

        assert_eq!(
            *seen.lock(),
            vec![
                CollectionChange::Inserted { index: 0, count: 1 },
                CollectionChange::Removed {
                    indices: vec![1, 3]
                },
                CollectionChange::Moved { from: 0, to: 1 },
            ]
        );
    }

    #[test]
    fn test_random_edits_keep_indices() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let executor = Arc::new(DeferredExecutor::new());
        let mut strip = strip(executor.clone());
        strip.add(pages(&["A", "B", "C", "D"]));
        strip.set_visible_range(0, 8);

        for step in 0..500 {
            let len = strip.len();
            match rng.gen_range(0..4) {
                0 => {
                    let index = rng.gen_range(0..=len);
                    strip.insert(index, pages(&["N"; 2]));
                }
                1 if len > 0 => {
                    let picks: Vec<usize> = (0..3).map(|_| rng.gen_range(0..len + 2)).collect();
                    strip.remove(&picks);
                }
                2 if len > 0 => {
                    let picks: Vec<usize> = (0..2).map(|_| rng.gen_range(0..len)).collect();
                    strip.move_items(&picks, rng.gen_range(-3..=3));
                }
                _ => {
                    strip.rotate(&[rng.gen_range(0..len + 1)], 90);
                }
            }
            if step % 7 == 0 {
                executor.run_pending();
                strip.dispatch_events();
            }
            assert_indices(&strip);
            for key in strip.cache().keys() {
                assert!(strip.position_of(key).is_some(), "cached key for removed item");
            }
        }
    }

    #[test]
    fn test_fill_renders_visible_range_only() {
        let renderer = CountingRenderer::new();
        let executor = Arc::new(DeferredExecutor::new());
        let mut strip = ImageCollection::new(
            renderer.clone(),
            executor.clone(),
            ImagePreference::default(),
        );
        strip.add(pages(&["A", "B", "C", "D", "E"]));
        strip.set_visible_range(1, 3);
        executor.run_pending();

        assert_eq!(renderer.calls(), 2);
        assert!(strip.thumbnail(0).is_none());
        assert!(strip.thumbnail(1).is_some());
        assert!(strip.thumbnail(2).is_some());
        assert!(strip.thumbnail(3).is_none());
        assert_eq!(strip.fill_state(), CycleState::Completed);

        // Already cached; nothing new to render.
        strip.reschedule();
        executor.run_pending();
        assert_eq!(renderer.calls(), 2);
    }

    #[test]
    fn test_created_event_refreshes_item() {
        let (mut strip, executor) = strip_with(&["A", "B"]);
        let refreshed = Arc::new(AtomicUsize::new(0));
        let refreshed_clone = refreshed.clone();
        strip.get(1).unwrap().subscribe(move |property| {
            if *property == ItemProperty::Image {
                refreshed_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        strip.set_visible_range(0, 2);
        executor.run_pending();
        assert_eq!(refreshed.load(Ordering::SeqCst), 0);

        assert_eq!(strip.dispatch_events(), 2);
        assert_eq!(refreshed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_image_falls_back_to_placeholder() {
        let (mut strip, executor) = strip_with(&["A"]);
        strip.set_visible_range(0, 1);

        let pending = strip.image(0).unwrap();
        let item_size = strip.get(0).unwrap().size();
        assert!(matches!(pending, ItemImage::Placeholder(ref image) if image.size() == item_size));
        assert_eq!(strip.stretch(0), Some(Stretch::Uniform));

        executor.run_pending();
        assert!(matches!(strip.image(0), Some(ItemImage::Rendered(_))));
        assert_eq!(strip.stretch(0), Some(Stretch::None));
        assert!(strip.image(1).is_none());
    }

    #[test]
    fn test_frame_only_skips_rendering() {
        let renderer = CountingRenderer::new();
        let executor = Arc::new(DeferredExecutor::new());
        let mut strip = ImageCollection::new(
            renderer.clone(),
            executor.clone(),
            ImagePreference::default(),
        );
        strip.add(pages(&["A", "B"]));
        assert!(strip.set_frame_only(true));
        strip.set_visible_range(0, 2);
        executor.run_pending();

        assert_eq!(renderer.calls(), 0);
        let item_size = strip.get(0).unwrap().size();
        assert!(matches!(strip.image(0), Some(ItemImage::Frame(size)) if size == item_size));

        assert!(strip.set_frame_only(false));
        executor.run_pending();
        assert_eq!(renderer.calls(), 2);
    }

    #[test]
    fn test_zoom_clears_cache() {
        let (mut strip, executor) = strip_with(&["A", "B", "C"]);
        strip.set_visible_range(0, 3);
        executor.run_pending();
        let ids: Vec<ItemId> = strip.iter().map(ImageItem::id).collect();
        assert!(ids.iter().all(|id| strip.cache().contains(id)));
        let width = strip.get(0).unwrap().width();

        assert!(strip.zoom(1));
        for id in &ids {
            assert!(strip.cache().try_get_value(id).is_none());
        }
        assert!(strip.get(0).unwrap().width() > width);

        executor.run_pending();
        let rendered = strip.thumbnail(0).unwrap();
        assert_eq!(rendered.size(), strip.get(0).unwrap().size());
    }

    #[test]
    fn test_zoom_at_limit_still_clears() {
        let (mut strip, executor) = strip_with(&["A"]);
        strip.set_visible_range(0, 1);
        executor.run_pending();
        strip.zoom(-100);
        executor.run_pending();
        let id = strip.get(0).unwrap().id();
        assert!(strip.cache().contains(&id));

        assert!(!strip.zoom(-1));
        assert!(!strip.cache().contains(&id));
    }

    #[test]
    fn test_redraw_renders_again() {
        let renderer = CountingRenderer::new();
        let mut strip = ImageCollection::new(
            renderer.clone(),
            Arc::new(InlineExecutor),
            ImagePreference::default(),
        );
        strip.add(pages(&["A", "B"]));
        strip.set_visible_range(0, 2);
        assert_eq!(renderer.calls(), 2);

        strip.redraw();
        assert_eq!(renderer.calls(), 4);
    }

    #[test]
    fn test_rotate_rerenders_rotated_items() {
        let (mut strip, executor) = strip_with(&["A", "B"]);
        strip.set_visible_range(0, 2);
        executor.run_pending();
        let before = strip.thumbnail(0).unwrap();

        let record = strip.rotate(&[0, 9], 90).unwrap();
        assert!(strip.thumbnail(0).is_none());
        assert!(strip.thumbnail(1).is_some());
        assert_eq!(strip.get(0).unwrap().total_rotation(), Rotation::CW_90);

        executor.run_pending();
        let after = strip.thumbnail(0).unwrap();
        assert_eq!(before.size(), ThumbnailSize::new(99, 128));
        assert_eq!(after.size(), ThumbnailSize::new(148, 114));

        strip.apply(&record.inverse).unwrap();
        assert_eq!(strip.get(0).unwrap().rotation(), Rotation::NONE);
        assert!(strip.rotate(&[0], 0).is_none());
    }

    #[test]
    fn test_text_height_resizes() {
        let (mut strip, _) = strip_with(&["A"]);
        let height = strip.get(0).unwrap().height();
        assert!(strip.set_text_height(40));
        assert!(!strip.set_text_height(40));
        assert_eq!(strip.get(0).unwrap().height(), height - 20);
    }

    #[test]
    fn test_remove_evicts_and_discards_inflight() {
        let executor = Arc::new(DeferredExecutor::new());
        let mut strip = strip(executor.clone());
        strip.add(pages(&["A", "B"]));
        executor.run_pending();
        strip.set_visible_range(0, 2);

        // Run only the fill loop; renders are still queued.
        assert!(executor.run_next());
        let removed = strip.get(0).unwrap().id();
        assert!(strip.cache().is_inflight(&removed));

        strip.remove(&[0]);
        assert!(!strip.cache().is_inflight(&removed));

        executor.run_pending();
        assert!(strip.cache().try_get_value(&removed).is_none());
        assert!(strip.cache().stats().discarded >= 1);
        assert_eq!(strip.cache().len(), 1);
    }

    #[test]
    fn test_rapid_reschedule_keeps_one_active_cycle() {
        let (mut strip, executor) = strip_with(&["A", "B", "C", "D", "E", "F"]);
        let mut cycles = Vec::new();
        for last in 1..=6 {
            cycles.push(strip.set_visible_range(0, last).unwrap());
            let active = cycles.iter().filter(|cycle| cycle.is_active()).count();
            assert_eq!(active, 1);
        }

        executor.run_pending();
        let (latest, stale) = cycles.split_last().unwrap();
        assert_eq!(latest.state(), CycleState::Completed);
        assert_eq!(latest.visited(), 6);
        for cycle in stale {
            assert_eq!(cycle.state(), CycleState::Cancelled);
            assert_eq!(cycle.visited(), 0);
        }
    }

    #[test]
    fn test_failure_reported_and_retried() {
        let renderer = CountingRenderer::new();
        renderer.fail.store(true, Ordering::SeqCst);
        let executor = Arc::new(DeferredExecutor::new());
        let mut strip = ImageCollection::new(
            renderer.clone(),
            executor.clone(),
            ImagePreference::default(),
        );
        let failures = Arc::new(Mutex::new(Vec::new()));
        let failures_clone = failures.clone();
        strip.subscribe_failures(move |failure| failures_clone.lock().push(failure.clone()));

        strip.add(pages(&["A", "B"]));
        strip.set_visible_range(0, 2);
        executor.run_pending();
        strip.dispatch_events();

        {
            let failures = failures.lock();
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].index, Some(0));
            assert!(matches!(*failures[0].error, CacheError::Create(_)));
        }
        assert!(strip.cache().is_empty());

        renderer.fail.store(false, Ordering::SeqCst);
        strip.reschedule();
        executor.run_pending();
        assert_eq!(strip.cache().len(), 2);
        assert_eq!(renderer.calls(), 4);
    }

    #[test]
    fn test_empty_render_counts_as_failure() {
        let renderer = |_: &dyn Page,
                        _: Rotation,
                        _: ThumbnailSize|
         -> Result<Option<RenderedImage>, RenderError> { Ok(None) };
        let mut strip = ImageCollection::new(
            Arc::new(renderer),
            Arc::new(InlineExecutor),
            ImagePreference::default(),
        );
        let failed = Arc::new(AtomicUsize::new(0));
        let failed_clone = failed.clone();
        strip.subscribe_failures(move |failure| {
            assert!(matches!(*failure.error, CacheError::NoValue));
            failed_clone.fetch_add(1, Ordering::SeqCst);
        });

        strip.add(pages(&["A"]));
        strip.set_visible_range(0, 1);
        strip.dispatch_events();
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert!(matches!(strip.image(0), Some(ItemImage::Placeholder(_))));
    }

    #[test]
    fn test_selection_stays_consistent() {
        let (mut strip, _) = strip_with(&["A", "B", "C", "D"]);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let index = rng.gen_range(0..strip.len());
            let id = strip.get(index).unwrap().id();
            match rng.gen_range(0..4) {
                0 => {
                    strip.set_selected(index, true);
                }
                1 => {
                    strip.set_selected(index, false);
                }
                2 => {
                    strip.selection().add(id);
                }
                _ => {
                    strip.selection().remove(&id);
                }
            }
            for item in strip.iter() {
                assert_eq!(item.is_selected(), strip.selection().contains(&item.id()));
            }
        }

        strip.clear_selection();
        strip.set_selected(1, true);
        strip.set_selected(3, true);
        strip.move_items(&[3], -3);
        assert_eq!(strip.selected_indices(), vec![0, 2]);
        assert_eq!(strip.first_selected(), Some(0));
        assert_eq!(strip.last_selected(), Some(2));

        strip.remove(&[0]);
        assert_eq!(strip.selection().len(), 1);
        assert_eq!(strip.selected_indices(), vec![1]);
    }

    #[test]
    fn test_selected_indices_follow_reorders() {
        let labels: Vec<String> = (0..500).map(|i| format!("P{}", i)).collect();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        let (mut strip, _) = strip_with(&labels);
        let mut rng = StdRng::seed_from_u64(11);

        for index in (0..500).step_by(7) {
            strip.set_selected(index, true);
        }
        for _ in 0..50 {
            let from = rng.gen_range(0..strip.len());
            strip.move_items(&[from], rng.gen_range(-40..40));

            let expected: Vec<usize> = strip
                .iter()
                .filter(|item| item.is_selected())
                .map(ImageItem::index)
                .collect();
            assert_eq!(strip.selected_indices(), expected);
            assert_eq!(strip.first_selected(), expected.first().copied());
            assert_eq!(strip.last_selected(), expected.last().copied());
        }
    }

    #[test]
    fn test_selection_changes_notify_items() {
        let (mut strip, _) = strip_with(&["A", "B"]);
        let notified = Arc::new(AtomicUsize::new(0));
        let notified_clone = notified.clone();
        strip.get(0).unwrap().subscribe(move |property| {
            if *property == ItemProperty::Selected {
                notified_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        strip.select_all();
        assert_eq!(strip.selection().len(), 2);
        strip.clear_selection();
        strip.dispatch_events();
        assert_eq!(notified.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_disposes_items() {
        let (mut strip, executor) = strip_with(&["A", "B"]);
        strip.set_visible_range(0, 2);
        executor.run_pending();
        strip.select_all();

        strip.clear();
        assert!(strip.is_empty());
        assert!(strip.cache().is_empty());
        assert!(strip.selection().is_empty());

        strip.add(pages(&["C"]));
        executor.run_pending();
        assert_eq!(strip.cache().len(), 1);
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let (mut strip, executor) = strip_with(&["A", "B"]);
        strip.set_visible_range(0, 2);
        let cycle = strip.current_fill().unwrap();

        strip.close();
        strip.close();
        assert!(strip.is_disposed());
        assert!(strip.is_empty());
        assert!(cycle.is_cancelled());

        executor.run_pending();
        assert!(strip.cache().is_empty());
        assert!(strip.add(pages(&["C"])).is_none());
        assert!(!strip.zoom(1));
        assert_eq!(strip.dispatch_events(), 0);
        assert!(strip.reschedule().is_none());
    }

    #[test]
    fn test_replace_page() {
        let (mut strip, executor) = strip_with(&["A"]);
        strip.set_visible_range(0, 1);
        executor.run_pending();

        let wide = StaticPage::new("W", PageSize::new(792.0, 612.0)).into_ref();
        assert!(strip.replace_page(0, wide));
        assert!(strip.thumbnail(0).is_none());
        executor.run_pending();
        assert_eq!(strip.thumbnail(0).unwrap().size(), ThumbnailSize::new(148, 114));
        assert!(!strip.replace_page(3, pages(&["X"]).remove(0)));
    }

    #[test]
    fn test_wait_for_fill_on_pool() {
        let config = PoolConfig::new(2).with_poll_interval(Duration::from_millis(5));
        let pool = TaskPool::new(config).unwrap();
        let mut strip = strip(Arc::new(pool));
        assert_eq!(strip.wait_for_fill(Duration::from_millis(1)), CycleState::Idle);

        strip.add(pages(&["A", "B", "C"]));
        strip.set_visible_range(0, 3);
        assert_eq!(strip.wait_for_fill(Duration::from_secs(5)), CycleState::Completed);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut dispatched = 0;
        while dispatched < 3 && std::time::Instant::now() < deadline {
            dispatched += strip.dispatch_events();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(dispatched, 3);
        assert_eq!(strip.cache().len(), 3);
    }

    #[test]
    fn test_zoom_during_running_fill_never_caches_old_size() {
        let config = PoolConfig::new(4).with_poll_interval(Duration::from_millis(5));
        let pool = TaskPool::new(config).unwrap();
        let mut strip = strip(Arc::new(pool));
        let labels: Vec<String> = (0..120).map(|i| format!("P{}", i)).collect();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        strip.add(pages(&labels));
        let mut rng = StdRng::seed_from_u64(81);

        for round in 0..60 {
            strip.set_visible_range(0, 120 - (round % 2) as i64);
            std::thread::sleep(Duration::from_micros(rng.gen_range(0..120)));
            strip.zoom(if round % 2 == 0 { 1 } else { -1 });

            assert_eq!(strip.wait_for_fill(Duration::from_secs(10)), CycleState::Completed);
            let deadline = std::time::Instant::now() + Duration::from_secs(10);
            while strip.cache().inflight_len() > 0 && std::time::Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
            strip.dispatch_events();

            for (index, item) in strip.iter().enumerate() {
                if let Some(image) = strip.thumbnail(index) {
                    assert_eq!(
                        image.size(),
                        item.size(),
                        "round {}: item {} cached at an outdated size",
                        round,
                        index
                    );
                }
            }
        }
    }

    #[test]
    fn test_from_config() {
        let config = StripConfig {
            size_index: 0,
            render_workers: 1,
            ..StripConfig::default()
        };
        let strip =
            ImageCollection::from_config(&config, Arc::new(BlankRenderer::default())).unwrap();
        assert_eq!(strip.preference().item_size(), 64);

        let bad = StripConfig {
            item_sizes: Vec::new(),
            ..StripConfig::default()
        };
        assert!(ImageCollection::from_config(&bad, Arc::new(BlankRenderer::default())).is_err());
    }
}
