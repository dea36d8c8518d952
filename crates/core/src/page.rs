//! Page abstraction
//!
//! A page is whatever the host document exposes: a size in points and the
//! rotation the document itself applies. The strip never reads page
//! content directly; it hands pages to a [`Renderer`](crate::Renderer).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A clockwise rotation in quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub struct Rotation(u16);

impl Rotation {
    /// No rotation
    pub const NONE: Rotation = Rotation(0);
    /// A quarter turn clockwise
    pub const CW_90: Rotation = Rotation(90);
    /// A half turn
    pub const HALF: Rotation = Rotation(180);
    /// A quarter turn counter-clockwise
    pub const CW_270: Rotation = Rotation(270);

    /// Normalize any angle to a quarter turn in `[0, 360)`
    ///
    /// Angles that are not a multiple of 90 are rounded down to one.
    pub fn from_degrees(degrees: i32) -> Self {
        let normalized = degrees.rem_euclid(360);
        Rotation((normalized - normalized % 90) as u16)
    }

    /// Angle in degrees, one of 0, 90, 180 or 270
    pub fn degrees(self) -> i32 {
        i32::from(self.0)
    }

    /// Compose two rotations
    pub fn add(self, other: Rotation) -> Rotation {
        Rotation::from_degrees(self.degrees() + other.degrees())
    }

    /// The rotation that undoes this one
    pub fn inverse(self) -> Rotation {
        Rotation::from_degrees(-self.degrees())
    }

    /// Whether width and height trade places under this rotation
    pub fn is_quarter_turn(self) -> bool {
        self.0 == 90 || self.0 == 270
    }
}

impl From<Rotation> for i32 {
    fn from(rotation: Rotation) -> i32 {
        rotation.degrees()
    }
}

impl TryFrom<i32> for Rotation {
    type Error = String;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        if degrees % 90 != 0 {
            return Err(format!("rotation {} is not a multiple of 90", degrees));
        }
        Ok(Rotation::from_degrees(degrees))
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.0)
    }
}

/// Page dimensions in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// US Letter, 612x792 points
    pub fn letter() -> Self {
        Self::new(612.0, 792.0)
    }

    /// Size as seen after applying `rotation`
    pub fn rotated(self, rotation: Rotation) -> Self {
        if rotation.is_quarter_turn() {
            Self::new(self.height, self.width)
        } else {
            self
        }
    }

    /// Whether both sides are positive and finite
    pub fn is_valid(self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// A page the strip can show
pub trait Page: Send + Sync + fmt::Debug {
    /// Unrotated size in points
    fn size(&self) -> PageSize;

    /// Rotation applied by the document itself
    fn rotation(&self) -> Rotation {
        Rotation::NONE
    }

    /// Caption shown under the thumbnail
    fn label(&self) -> String {
        String::new()
    }
}

/// Shared handle to a page
pub type PageRef = Arc<dyn Page>;

/// A page described only by its geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticPage {
    pub label: String,
    pub size: PageSize,
    #[serde(default)]
    pub rotation: Rotation,
}

impl StaticPage {
    pub fn new(label: impl Into<String>, size: PageSize) -> Self {
        Self {
            label: label.into(),
            size,
            rotation: Rotation::NONE,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Wrap in a shared page handle
    pub fn into_ref(self) -> PageRef {
        Arc::new(self)
    }
}

impl Page for StaticPage {
    fn size(&self) -> PageSize {
        self.size
    }

    fn rotation(&self) -> Rotation {
        self.rotation
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_normalizes() {
        assert_eq!(Rotation::from_degrees(0), Rotation::NONE);
        assert_eq!(Rotation::from_degrees(450), Rotation::CW_90);
        assert_eq!(Rotation::from_degrees(-90), Rotation::CW_270);
        assert_eq!(Rotation::from_degrees(-720), Rotation::NONE);
        assert_eq!(Rotation::from_degrees(135), Rotation::CW_90);
    }

    #[test]
    fn test_rotation_compose_and_inverse() {
        assert_eq!(Rotation::CW_270.add(Rotation::HALF), Rotation::CW_90);
        assert_eq!(Rotation::CW_90.inverse(), Rotation::CW_270);
        assert_eq!(Rotation::HALF.inverse(), Rotation::HALF);
        assert_eq!(Rotation::NONE.inverse(), Rotation::NONE);
    }

    #[test]
    fn test_rotated_size() {
        let size = PageSize::letter();
        assert_eq!(size.rotated(Rotation::CW_90), PageSize::new(792.0, 612.0));
        assert_eq!(size.rotated(Rotation::HALF), size);
        assert!(size.is_valid());
        assert!(!PageSize::new(0.0, 10.0).is_valid());
    }

    #[test]
    fn test_rotation_serde() {
        let page = StaticPage::new("A", PageSize::letter()).with_rotation(Rotation::CW_270);
        let json = serde_json::to_string(&page).unwrap();
        assert!(json.contains("\"rotation\":270"));

        let back: StaticPage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, page);

        let bad = r#"{"label":"B","size":{"width":1.0,"height":1.0},"rotation":45}"#;
        assert!(serde_json::from_str::<StaticPage>(bad).is_err());
    }
}
