//! Wayland presentation layer for a retained-mode GUI renderer.
//!
//! The crate bridges a renderer that owns its own frame clock with a
//! Wayland compositor: it manages the connection and its globals,
//! window surfaces with optional client-drawn decorations and the
//! xdg-shell configure/ack state machine, pixel buffers over shared
//! memory or DMABUF import, frame-callback-paced flushing, and the
//! translation of seat input into renderer-consumable events.
//!
//! Everything hangs off a [`WaylandContext`]:
//!
//! ```no_run
//! use waylet_core::{Rect, Size};
//! use waylet_wayland::{WaylandConfig, WaylandContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ctx = WaylandContext::connect(WaylandConfig::default())?;
//! let window = ctx.create_window(Size::new(800, 600), "demo", None)?;
//! loop {
//!     ctx.refresh_start()?;
//!     if !ctx.is_window_open(Some(window)) {
//!         break;
//!     }
//!     if let Some((pixels, geometry)) = ctx.frame_buffer(window) {
//!         pixels.fill(0xFF);
//!         let full = Rect::from_size(geometry.size);
//!         ctx.flush(window, full, true)?;
//!     }
//!     ctx.refresh_end()?;
//!     ctx.wait_flush(window)?;
//! }
//! # Ok(())
//! # }
//! ```

mod backend;
mod config;
mod context;
mod error;
mod seat;
mod state;
mod window;
mod xdg_shell;

pub use backend::dmabuf::{DmabufAllocator, DmabufPlane, DmabufSlab, SharedDmabufAllocator};
pub use backend::BufferGeometry;
pub use config::{BackendKind, WaylandConfig, DISABLE_DECORATIONS_ENV};
pub use context::{FlushStatus, WaylandContext};
pub use error::{BackendError, ConnectError, WindowError};
pub use seat::{InputEvent, PointerButton};
pub use state::OutputInfo;
pub use window::{CloseCallback, CloseDecision, WindowId};
