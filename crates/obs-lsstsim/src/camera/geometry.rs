//! Integer pixel boxes.

use serde::{Deserialize, Serialize};

/// An integer pixel position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point2I {
    /// Column.
    pub x: i64,
    /// Row.
    pub y: i64,
}

impl Point2I {
    /// Create a point.
    #[must_use]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// An integer size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent2I {
    /// Width.
    pub x: i64,
    /// Height.
    pub y: i64,
}

impl Extent2I {
    /// Create an extent.
    #[must_use]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// An inclusive box of pixels. A box with zero width or height is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Box2I {
    /// Lower-left corner.
    pub min: Point2I,
    /// Size.
    pub extent: Extent2I,
}

impl Box2I {
    /// Box spanning two inclusive corners.
    #[must_use]
    pub fn from_corners(min: Point2I, max: Point2I) -> Self {
        Self {
            min,
            extent: Extent2I::new(max.x - min.x + 1, max.y - min.y + 1),
        }
    }

    /// Box with a corner and a size.
    #[must_use]
    pub fn from_extent(min: Point2I, extent: Extent2I) -> Self {
        Self { min, extent }
    }

    /// Upper-right corner, inclusive.
    #[must_use]
    pub fn max(&self) -> Point2I {
        Point2I::new(self.min.x + self.extent.x - 1, self.min.y + self.extent.y - 1)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> i64 {
        self.extent.x
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> i64 {
        self.extent.y
    }

    /// Whether the box holds no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extent.x <= 0 || self.extent.y <= 0
    }

    /// Swap the x and y axes.
    #[must_use]
    pub fn transposed(&self) -> Self {
        Self {
            min: Point2I::new(self.min.y, self.min.x),
            extent: Extent2I::new(self.extent.y, self.extent.x),
        }
    }

    /// Whether the two boxes share at least one pixel.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let (a, b) = (self.max(), other.max());
        self.min.x <= b.x && other.min.x <= a.x && self.min.y <= b.y && other.min.y <= a.y
    }
}
