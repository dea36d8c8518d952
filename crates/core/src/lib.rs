//! pagestrip core library
//!
//! The page thumbnail strip: an ordered collection of page items with
//! cached, asynchronously rendered thumbnails, a shared selection and
//! observable display preferences.

pub mod collection;
pub mod config;
pub mod edit;
pub mod error;
pub mod item;
pub mod page;
pub mod preference;
pub mod render;
pub mod selection;

pub use collection::{
    CollectionChange, ImageCollection, ItemImage, RenderFailure, Stretch, ThumbnailCache,
};
pub use config::{StripConfig, DEFAULT_ITEM_SIZES};
pub use edit::{Edit, EditRecord};
pub use error::{ConfigError, RenderError, StripError, StripResult};
pub use item::{ImageItem, ItemId, ItemProperty, PageEntry};
pub use page::{Page, PageRef, PageSize, Rotation, StaticPage};
pub use preference::{ImagePreference, PreferenceProperty};
pub use render::{placeholder, BlankRenderer, RenderedImage, Renderer, ThumbnailSize};
pub use selection::{Selection, SelectionChange};
