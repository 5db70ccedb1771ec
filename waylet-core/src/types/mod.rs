//! Core data types shared across the waylet workspace.

pub mod color;
pub mod geometry;

pub use color::ColorFormat;
pub use geometry::{Insets, Point, Rect, Size};
