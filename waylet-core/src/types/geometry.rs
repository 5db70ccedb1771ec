//! Integer geometry types.
//!
//! All coordinates in the presentation layer are integer surface-local
//! pixels, matching the Wayland wire protocol. Floating point geometry
//! belongs to the renderer, not here.

use serde::{Deserialize, Serialize};

/// A point in surface-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A two-dimensional pixel extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Whether both dimensions are strictly positive.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// An axis-aligned rectangle in surface-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub const fn from_size(size: Size) -> Self {
        Self { x: 0, y: 0, width: size.width, height: size.height }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Fixed per-edge insets, used for client-side decoration accounting.
///
/// The renderer always works in content coordinates; the compositor
/// negotiates the decorated outer size. `Insets` is the translation
/// between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Insets {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
}

impl Insets {
    pub const NONE: Insets = Insets { top: 0, bottom: 0, left: 0, right: 0 };

    pub const fn new(top: i32, bottom: i32, left: i32, right: i32) -> Self {
        Self { top, bottom, left, right }
    }

    /// Total horizontal thickness added by the insets.
    pub const fn horizontal(&self) -> i32 {
        self.left + self.right
    }

    /// Total vertical thickness added by the insets.
    pub const fn vertical(&self) -> i32 {
        self.top + self.bottom
    }

    /// Grows a content size to the decorated outer size.
    pub fn outer_size(&self, content: Size) -> Size {
        Size::new(content.width + self.horizontal(), content.height + self.vertical())
    }

    /// Shrinks a decorated outer size back to the content size.
    pub fn content_size(&self, outer: Size) -> Size {
        Size::new(outer.width - self.horizontal(), outer.height - self.vertical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_validity() {
        assert!(Size::new(480, 272).is_valid());
        assert!(!Size::new(0, 272).is_valid());
        assert!(!Size::new(480, -1).is_valid());
    }

    #[test]
    fn rect_from_size() {
        let r = Rect::from_size(Size::new(320, 240));
        assert_eq!(r, Rect::new(0, 0, 320, 240));
        assert!(!r.is_empty());
        assert!(Rect::new(5, 5, 0, 10).is_empty());
    }

    #[test]
    fn insets_round_trip() {
        let insets = Insets::new(26, 2, 2, 2);
        let content = Size::new(800, 600);
        let outer = insets.outer_size(content);
        assert_eq!(outer, Size::new(804, 628));
        assert_eq!(insets.content_size(outer), content);
    }

    #[test]
    fn zero_insets_are_identity() {
        let content = Size::new(480, 272);
        assert_eq!(Insets::NONE.outer_size(content), content);
        assert_eq!(Insets::NONE.content_size(content), content);
    }
}
