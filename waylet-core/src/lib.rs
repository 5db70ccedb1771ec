//! # Waylet Core Library (`waylet-core`)
//!
//! Foundational crate for the waylet presentation layer. It provides the
//! small set of shared building blocks the Wayland integration crate is
//! built on:
//!
//! - **Error handling**: a unified error base through [`CoreError`] and
//!   the [`ConfigError`] it wraps, defined with `thiserror`.
//! - **Core data types**: integer geometry (`Point`, `Size`, `Rect`,
//!   `Insets`) and the renderer pixel formats (`ColorFormat`).
//! - **Logging**: a `tracing`-based bring-up helper suitable for early
//!   startup and tests.
//!
//! Key types are re-exported at the crate root for ease of use.

pub mod error;
pub mod logging;
pub mod types;

pub use error::{ConfigError, CoreError};
pub use types::color::ColorFormat;
pub use types::geometry::{Insets, Point, Rect, Size};
