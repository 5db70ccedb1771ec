//! Buffer backends.
//!
//! A [`BackendSession`] supplies pixel storage for one window and
//! attaches it to compositor surfaces. Two implementations exist:
//! single-plane shared memory ([`shm`]) and multi-plane DMABUF
//! ([`dmabuf`]). Window code only talks to the trait, so the two paths
//! share every piece of lifecycle and flush logic.

pub(crate) mod dmabuf;
pub(crate) mod shm;

use wayland_client::protocol::wl_buffer::WlBuffer;
use wayland_client::protocol::wl_shm;
use wayland_client::protocol::wl_surface::WlSurface;
use waylet_core::{ColorFormat, Size};

use crate::error::BackendError;
use crate::window::WindowId;

/// Maximum planes an imported DMABUF may carry.
pub(crate) const MAX_BUFFER_PLANES: usize = 4;
/// Slots in the shared decoration scratch ring.
pub(crate) const DECORATION_SCRATCH_SLOTS: usize = 8;

/// How a backend signals that a flushed frame has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushCompletion {
    /// Complete when the compositor releases the committed buffer.
    OnBufferRelease,
    /// Complete when the frame callback for the commit fires.
    OnFrameCallback,
}

/// Dimensions and row stride of the currently allocated body buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferGeometry {
    pub size: Size,
    pub stride: usize,
}

/// Identifies which window buffer a `wl_buffer` release refers to.
/// Attached as typed user data on every buffer the crate creates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferId {
    pub(crate) window: WindowId,
    pub(crate) slot: usize,
    pub(crate) kind: BufferKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BufferKind {
    Body,
    DecorationScratch,
}

/// Per-window pixel storage.
///
/// Sessions own their protocol objects and release them in `deinit`;
/// dropping a session without calling `deinit` leaks compositor-side
/// resources until the connection closes.
pub(crate) trait BackendSession {
    /// Allocates body buffers for the given content size. Called once
    /// from the initial configure and again after every resize.
    fn init_display(&mut self, size: Size) -> Result<(), BackendError>;

    /// Reallocates body buffers for a new content size. New storage is
    /// created and installed before the old storage is retired, so a
    /// failed allocation leaves the previous buffers intact.
    fn resize(&mut self, size: Size) -> Result<(), BackendError>;

    /// Destroys all protocol objects and storage owned by the session.
    fn deinit(&mut self);

    /// Claims a free body buffer slot for drawing, or `None` when all
    /// buffers are still held by the compositor.
    fn acquire(&mut self) -> Option<usize>;

    /// Writable pixel bytes of an acquired slot.
    fn frame_bytes(&mut self, slot: usize) -> Option<&mut [u8]>;

    /// Attaches the slot's buffer to the body surface.
    fn attach_body(&mut self, slot: usize, surface: &WlSurface);

    /// Records that the compositor released a body buffer.
    fn mark_released(&mut self, slot: usize);

    /// Records that the compositor released a decoration scratch
    /// buffer. The proxy disambiguates a retired buffer from its
    /// replacement in the same slot.
    fn mark_scratch_released(&mut self, slot: usize, buffer: &WlBuffer);

    /// Adopts a completed DMABUF import into the matching body slot.
    /// Imports that belong to a retired buffer generation are
    /// destroyed.
    fn adopt_imported(&mut self, _slot: usize, _generation: u64, buffer: WlBuffer) {
        buffer.destroy();
    }

    /// Records a rejected DMABUF import; the slot is skipped from then
    /// on.
    fn import_failed(&mut self, _slot: usize, _generation: u64) {}

    /// Fills and attaches one decoration surface. `index` selects the
    /// decoration's colour (title bar vs. border vs. button).
    fn attach_decoration(
        &mut self,
        role: crate::window::SurfaceRole,
        surface: &WlSurface,
        size: Size,
    ) -> Result<(), BackendError>;

    /// Whether presentation must wait for an xdg configure ack after a
    /// geometry change.
    fn requires_configure_ack(&self) -> bool;

    /// The flush completion signal this backend uses.
    fn completion(&self) -> FlushCompletion;

    /// Geometry of the currently allocated body buffers, if any.
    fn geometry(&self) -> Option<BufferGeometry>;
}

/// Installs freshly allocated storage and returns the storage it
/// replaces, which the caller then retires. Keeping this ordering in
/// one place guarantees the old buffers outlive the allocation of the
/// new ones.
pub(crate) fn swap_active<T>(active: &mut Option<T>, fresh: T) -> Option<T> {
    active.replace(fresh)
}

/// Maps a renderer colour format onto the `wl_shm` wire format.
pub(crate) fn shm_format(format: ColorFormat) -> wl_shm::Format {
    match format {
        ColorFormat::Argb8888 => wl_shm::Format::Argb8888,
        ColorFormat::Xrgb8888 => wl_shm::Format::Xrgb8888,
        ColorFormat::Rgb565 => wl_shm::Format::Rgb565,
    }
}

/// Maps a renderer colour format onto its DRM fourcc code.
pub(crate) fn drm_fourcc(format: ColorFormat) -> u32 {
    match format {
        // 'AR24'
        ColorFormat::Argb8888 => 0x3432_5241,
        // 'XR24'
        ColorFormat::Xrgb8888 => 0x3432_5258,
        // 'RG16'
        ColorFormat::Rgb565 => 0x3631_4752,
    }
}

/// Flat colours for decoration surfaces.
pub(crate) fn decoration_color(role: crate::window::SurfaceRole) -> u32 {
    use crate::window::SurfaceRole;
    match role {
        SurfaceRole::TitleBar => 0xFF37_3737,
        SurfaceRole::ButtonClose => 0xFFB0_4040,
        SurfaceRole::ButtonMaximize | SurfaceRole::ButtonMinimize => 0xFF60_6060,
        _ => 0xFF1F_1F1F,
    }
}

/// Fills a pixel buffer with one colour in the given format.
pub(crate) fn fill_pixels(bytes: &mut [u8], format: ColorFormat, argb: u32) {
    match format {
        ColorFormat::Argb8888 | ColorFormat::Xrgb8888 => {
            for px in bytes.chunks_exact_mut(4) {
                px.copy_from_slice(&argb.to_le_bytes());
            }
        }
        ColorFormat::Rgb565 => {
            let r = ((argb >> 16) & 0xFF) as u16;
            let g = ((argb >> 8) & 0xFF) as u16;
            let b = (argb & 0xFF) as u16;
            let packed = ((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3);
            for px in bytes.chunks_exact_mut(2) {
                px.copy_from_slice(&packed.to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_installs_new_before_returning_old() {
        let mut active = Some("old");
        let retired = swap_active(&mut active, "new");
        assert_eq!(active, Some("new"));
        assert_eq!(retired, Some("old"));

        let mut empty: Option<&str> = None;
        assert_eq!(swap_active(&mut empty, "first"), None);
        assert_eq!(empty, Some("first"));
    }

    #[test]
    fn old_generation_outlives_new_allocation() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Generation {
            name: &'static str,
            log: Rc<RefCell<Vec<String>>>,
        }
        impl Drop for Generation {
            fn drop(&mut self) {
                self.log.borrow_mut().push(format!("destroy {}", self.name));
            }
        }

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut active = Some(Generation {
            name: "480x272",
            log: log.clone(),
        });
        log.borrow_mut().push("alloc 320x240".to_owned());
        let fresh = Generation {
            name: "320x240",
            log: log.clone(),
        };
        if let Some(old) = swap_active(&mut active, fresh) {
            drop(old);
        }
        drop(active);
        assert_eq!(
            *log.borrow(),
            ["alloc 320x240", "destroy 480x272", "destroy 320x240"]
        );
    }

    #[test]
    fn fourcc_codes_match_drm_names() {
        assert_eq!(drm_fourcc(ColorFormat::Argb8888).to_le_bytes(), *b"AR24");
        assert_eq!(drm_fourcc(ColorFormat::Xrgb8888).to_le_bytes(), *b"XR24");
        assert_eq!(drm_fourcc(ColorFormat::Rgb565).to_le_bytes(), *b"RG16");
    }

    #[test]
    fn rgb565_fill_packs_components() {
        let mut buf = [0u8; 4];
        fill_pixels(&mut buf, ColorFormat::Rgb565, 0xFFFF_0000);
        let px = u16::from_le_bytes([buf[0], buf[1]]);
        assert_eq!(px, 0b11111_000000_00000);
    }
}
