//! Thumbnail rendering
//!
//! [`Renderer`] is the seam to whatever rasterizes pages. The strip calls it
//! from render workers with the page, the total rotation to apply and the
//! pixel size of the thumbnail.

use crate::error::RenderError;
use crate::page::{Page, Rotation};
use image::{ImageFormat, Rgba, RgbaImage};
use std::fmt;
use std::path::Path;

/// Pixel size of a thumbnail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ThumbnailSize {
    pub width: u32,
    pub height: u32,
}

impl ThumbnailSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether the thumbnail has no pixels
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for ThumbnailSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A rendered thumbnail in RGBA8
#[derive(Clone, PartialEq)]
pub struct RenderedImage {
    pixels: RgbaImage,
}

impl RenderedImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn size(&self) -> ThumbnailSize {
        ThumbnailSize::new(self.width(), self.height())
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }

    /// Bytes held by the pixel buffer
    pub fn memory_size(&self) -> usize {
        self.pixels.as_raw().len()
    }

    /// Write the thumbnail as a PNG file
    pub fn save_png(&self, path: &Path) -> Result<(), RenderError> {
        self.pixels.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

impl fmt::Debug for RenderedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Something that rasterizes pages into thumbnails
///
/// Called concurrently from render workers. Returning `Ok(None)` means the
/// page had nothing to show; the strip treats it like a failure and keeps
/// the placeholder.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        page: &dyn Page,
        rotation: Rotation,
        size: ThumbnailSize,
    ) -> Result<Option<RenderedImage>, RenderError>;
}

impl<F> Renderer for F
where
    F: Fn(&dyn Page, Rotation, ThumbnailSize) -> Result<Option<RenderedImage>, RenderError>
        + Send
        + Sync,
{
    fn render(
        &self,
        page: &dyn Page,
        rotation: Rotation,
        size: ThumbnailSize,
    ) -> Result<Option<RenderedImage>, RenderError> {
        self(page, rotation, size)
    }
}

/// Draws a blank sheet with a border and a band along the page's top edge
///
/// The band follows the rotation, which makes it a handy stand-in renderer
/// for demos and tests where no rasterizer is available.
#[derive(Debug, Clone, Copy)]
pub struct BlankRenderer {
    pub paper: Rgba<u8>,
    pub ink: Rgba<u8>,
}

impl Default for BlankRenderer {
    fn default() -> Self {
        Self {
            paper: Rgba([255, 255, 255, 255]),
            ink: Rgba([64, 64, 64, 255]),
        }
    }
}

impl Renderer for BlankRenderer {
    fn render(
        &self,
        _page: &dyn Page,
        rotation: Rotation,
        size: ThumbnailSize,
    ) -> Result<Option<RenderedImage>, RenderError> {
        if size.is_empty() {
            return Err(RenderError::InvalidSize {
                width: size.width,
                height: size.height,
            });
        }

        let (width, height) = (size.width, size.height);
        let band = (width.min(height) / 8).max(1);
        let mut pixels = RgbaImage::from_pixel(width, height, self.paper);

        for (x, y, pixel) in pixels.enumerate_pixels_mut() {
            let border = x == 0 || y == 0 || x == width - 1 || y == height - 1;
            let header = match rotation.degrees() {
                90 => x >= width - band,
                180 => y >= height - band,
                270 => x < band,
                _ => y < band,
            };
            if border || header {
                *pixel = self.ink;
            }
        }

        Ok(Some(RenderedImage::new(pixels)))
    }
}

/// Light checkerboard shown while a thumbnail is pending
pub fn placeholder(size: ThumbnailSize) -> RenderedImage {
    const CELL: u32 = 8;
    let light = Rgba([240, 240, 240, 255]);
    let dark = Rgba([224, 224, 224, 255]);

    let pixels = RgbaImage::from_fn(size.width.max(1), size.height.max(1), |x, y| {
        if (x / CELL + y / CELL) % 2 == 0 {
            light
        } else {
            dark
        }
    });
    RenderedImage::new(pixels)
}
