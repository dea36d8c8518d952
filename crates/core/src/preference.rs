//! Display preferences shared by every item in a strip

use crate::config::StripConfig;
use crate::page::PageSize;
use crate::render::ThumbnailSize;
use pagestrip_cache::{Observers, SubscriptionId};
use std::ops::Range;

/// Which preference changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceProperty {
    ItemSizeIndex,
    FrameOnly,
    TextHeight,
    VisibleRange,
}

/// Item size, caption height, outline mode and the visible window.
///
/// Setters return whether the value changed and notify observers only
/// when it did.
#[derive(Debug)]
pub struct ImagePreference {
    item_sizes: Vec<u32>,
    item_size_index: usize,
    h_margin: u32,
    v_margin: u32,
    text_height: u32,
    frame_only: bool,
    visible_first: i64,
    visible_last: i64,
    observers: Observers<PreferenceProperty>,
}

impl ImagePreference {
    /// Build preferences from a validated configuration
    pub fn from_config(config: &StripConfig) -> Self {
        let item_sizes = if config.item_sizes.is_empty() {
            crate::config::DEFAULT_ITEM_SIZES.to_vec()
        } else {
            config.item_sizes.clone()
        };
        let item_size_index = config.size_index.min(item_sizes.len() - 1);
        Self {
            item_sizes,
            item_size_index,
            h_margin: config.h_margin,
            v_margin: config.v_margin,
            text_height: config.text_height,
            frame_only: config.frame_only,
            visible_first: 0,
            visible_last: 0,
            observers: Observers::new(),
        }
    }

    pub fn item_sizes(&self) -> &[u32] {
        &self.item_sizes
    }

    pub fn item_size_index(&self) -> usize {
        self.item_size_index
    }

    /// Current item edge length in pixels
    pub fn item_size(&self) -> u32 {
        self.item_sizes[self.item_size_index]
    }

    /// Set the size index, clamped to the available sizes
    pub fn set_item_size_index(&mut self, index: usize) -> bool {
        let index = index.min(self.item_sizes.len() - 1);
        self.update(PreferenceProperty::ItemSizeIndex, |pref| {
            std::mem::replace(&mut pref.item_size_index, index) != index
        })
    }

    /// Move the size index by `offset` steps, clamped at both ends
    pub fn adjust_item_size_index(&mut self, offset: isize) -> bool {
        let index = self.item_size_index.saturating_add_signed(offset);
        self.set_item_size_index(index)
    }

    pub fn text_height(&self) -> u32 {
        self.text_height
    }

    pub fn set_text_height(&mut self, height: u32) -> bool {
        self.update(PreferenceProperty::TextHeight, |pref| {
            std::mem::replace(&mut pref.text_height, height) != height
        })
    }

    pub fn frame_only(&self) -> bool {
        self.frame_only
    }

    pub fn set_frame_only(&mut self, frame_only: bool) -> bool {
        self.update(PreferenceProperty::FrameOnly, |pref| {
            std::mem::replace(&mut pref.frame_only, frame_only) != frame_only
        })
    }

    pub fn margins(&self) -> (u32, u32) {
        (self.h_margin, self.v_margin)
    }

    /// First and last visible positions as reported by the view
    pub fn visible(&self) -> (i64, i64) {
        (self.visible_first, self.visible_last)
    }

    /// Record the visible window; `last` is exclusive
    pub fn set_visible(&mut self, first: i64, last: i64) -> bool {
        self.update(PreferenceProperty::VisibleRange, |pref| {
            let changed = pref.visible_first != first || pref.visible_last != last;
            pref.visible_first = first;
            pref.visible_last = last;
            changed
        })
    }

    /// Visible window clamped to a sequence of `len` items
    pub fn visible_range(&self, len: usize) -> Range<usize> {
        let len = i64::try_from(len).unwrap_or(i64::MAX);
        let first = self.visible_first.clamp(0, len);
        let last = self.visible_last.clamp(first, len);
        first as usize..last as usize
    }

    /// Thumbnail size for a page whose rotated size is `view`.
    ///
    /// The page is scaled uniformly to fit the item minus its margins and
    /// the caption. Degenerate pages get an empty size.
    pub fn thumbnail_size(&self, view: PageSize) -> ThumbnailSize {
        if !view.is_valid() {
            return ThumbnailSize::default();
        }
        let item = self.item_size() as f32;
        let avail_w = (item - self.h_margin as f32).max(0.0);
        let avail_h = (item - self.v_margin as f32 - self.text_height as f32).max(0.0);
        let scale = (avail_w / view.width).min(avail_h / view.height).max(0.0);

        ThumbnailSize::new(
            (view.width * scale).round() as u32,
            (view.height * scale).round() as u32,
        )
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&PreferenceProperty) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn update(
        &mut self,
        property: PreferenceProperty,
        apply: impl FnOnce(&mut Self) -> bool,
    ) -> bool {
        let changed = apply(self);
        if changed {
            self.observers.notify(&property);
        }
        changed
    }
}

impl Default for ImagePreference {
    fn default() -> Self {
        Self::from_config(&StripConfig::default())
    }
}
