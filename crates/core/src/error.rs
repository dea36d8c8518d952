//! Error types for the page strip

use pagestrip_scheduler::PoolError;
use thiserror::Error;

/// Failure while producing a thumbnail
#[derive(Debug, Error)]
pub enum RenderError {
    /// The page could not be read or rasterized
    #[error("page could not be rendered: {0}")]
    Page(String),

    /// The requested thumbnail has no area
    #[error("invalid thumbnail size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    /// Encoding or decoding the image failed
    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Invalid or unreadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable or field had a value that could not be used
    #[error("invalid value for {0}")]
    InvalidValue(String),

    /// The configuration is self-inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised while building an [`ImageCollection`](crate::ImageCollection)
#[derive(Debug, Error)]
pub enum StripError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The render worker pool could not be started
    #[error("render pool: {0}")]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Result alias for collection construction
pub type StripResult<T> = Result<T, StripError>;
