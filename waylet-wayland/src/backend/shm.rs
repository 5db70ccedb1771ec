//! Shared-memory buffer backend.
//!
//! Body buffers for one window live in a single anonymous file mapped
//! into the client and shared with the compositor through a
//! `wl_shm_pool`. Decoration surfaces draw from a small scratch ring of
//! per-role buffers that only changes on resize.

use std::fs::File;
use std::os::fd::AsFd;

use memmap2::MmapMut;
use tracing::{debug, trace};
use wayland_client::protocol::wl_buffer::WlBuffer;
use wayland_client::protocol::wl_shm::WlShm;
use wayland_client::protocol::wl_shm_pool::WlShmPool;
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::{Proxy, QueueHandle};
use waylet_core::{ColorFormat, Size};

use crate::error::BackendError;
use crate::state::WayletState;
use crate::window::{SurfaceRole, WindowId, DECORATION_ROLES};

use super::{
    decoration_color, fill_pixels, shm_format, swap_active, BackendSession, BufferGeometry,
    BufferId, BufferKind, FlushCompletion, DECORATION_SCRATCH_SLOTS,
};

/// Byte layout of a multi-buffer shm pool. Pure arithmetic, computed
/// before any file or protocol object is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ShmLayout {
    pub(crate) stride: usize,
    pub(crate) buffer_len: usize,
    pub(crate) total_len: usize,
}

impl ShmLayout {
    pub(crate) fn compute(
        size: Size,
        format: ColorFormat,
        buffer_count: usize,
    ) -> Result<Self, BackendError> {
        if !size.is_valid() || buffer_count == 0 {
            return Err(BackendError::InvalidDimensions(size.width, size.height));
        }
        let stride = format.min_stride(size.width) as usize;
        let buffer_len = stride * size.height as usize;
        Ok(Self {
            stride,
            buffer_len,
            total_len: buffer_len * buffer_count,
        })
    }
}

struct SlotBuffer {
    wl: WlBuffer,
    /// Held by the compositor between attach and release.
    busy: bool,
    offset: usize,
    len: usize,
}

/// One generation of body storage: file, mapping, pool and per-slot
/// buffers. Replaced wholesale on resize.
struct ShmBufferSet {
    _file: File,
    map: MmapMut,
    pool: WlShmPool,
    slots: Vec<SlotBuffer>,
    geometry: BufferGeometry,
}

impl ShmBufferSet {
    fn destroy(self) {
        for slot in &self.slots {
            slot.wl.destroy();
        }
        self.pool.destroy();
    }
}

struct ScratchBuffer {
    _file: File,
    map: MmapMut,
    pool: WlShmPool,
    wl: WlBuffer,
    size: Size,
    busy: bool,
}

impl ScratchBuffer {
    fn destroy(self) {
        self.wl.destroy();
        self.pool.destroy();
    }
}

/// Whether a scratch buffer must be replaced rather than refilled in
/// place: the compositor is still reading it, or its size no longer
/// matches the decoration.
fn scratch_needs_replacement(busy: bool, size_matches: bool) -> bool {
    busy || !size_matches
}

pub(crate) struct ShmSession {
    shm: WlShm,
    qh: QueueHandle<WayletState>,
    window: WindowId,
    format: ColorFormat,
    buffer_count: usize,
    active: Option<ShmBufferSet>,
    scratch: Vec<Option<ScratchBuffer>>,
    /// Replaced scratch buffers the compositor still holds; destroyed
    /// on their release.
    retired_scratch: Vec<ScratchBuffer>,
}

impl ShmSession {
    pub(crate) fn new(
        shm: WlShm,
        qh: QueueHandle<WayletState>,
        window: WindowId,
        format: ColorFormat,
        buffer_count: usize,
    ) -> Self {
        let mut scratch = Vec::with_capacity(DECORATION_SCRATCH_SLOTS);
        scratch.resize_with(DECORATION_SCRATCH_SLOTS, || None);
        Self {
            shm,
            qh,
            window,
            format,
            buffer_count,
            active: None,
            scratch,
            retired_scratch: Vec::new(),
        }
    }

    fn allocate_set(&self, size: Size) -> Result<ShmBufferSet, BackendError> {
        let layout = ShmLayout::compute(size, self.format, self.buffer_count)?;
        let file = tempfile::tempfile().map_err(BackendError::BackingFile)?;
        file.set_len(layout.total_len as u64)
            .map_err(BackendError::BackingFile)?;
        // Safety: the file is freshly created, anonymous and sized above.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(BackendError::Map)?;

        let pool = self
            .shm
            .create_pool(file.as_fd(), layout.total_len as i32, &self.qh, ());
        let mut slots = Vec::with_capacity(self.buffer_count);
        for slot in 0..self.buffer_count {
            let offset = slot * layout.buffer_len;
            let wl = pool.create_buffer(
                offset as i32,
                size.width,
                size.height,
                layout.stride as i32,
                shm_format(self.format),
                &self.qh,
                BufferId {
                    window: self.window,
                    slot,
                    kind: BufferKind::Body,
                },
            );
            slots.push(SlotBuffer {
                wl,
                busy: false,
                offset,
                len: layout.buffer_len,
            });
        }
        debug!(
            window = %self.window,
            width = size.width,
            height = size.height,
            stride = layout.stride,
            buffers = self.buffer_count,
            "allocated shm pool"
        );
        Ok(ShmBufferSet {
            _file: file,
            map,
            pool,
            slots,
            geometry: BufferGeometry {
                size,
                stride: layout.stride,
            },
        })
    }
}

impl BackendSession for ShmSession {
    fn init_display(&mut self, size: Size) -> Result<(), BackendError> {
        let fresh = self.allocate_set(size)?;
        if let Some(old) = swap_active(&mut self.active, fresh) {
            old.destroy();
        }
        Ok(())
    }

    fn resize(&mut self, size: Size) -> Result<(), BackendError> {
        // Same swap discipline: the old set stays valid until the new
        // one is installed, so a failed allocation changes nothing.
        self.init_display(size)
    }

    fn deinit(&mut self) {
        if let Some(set) = self.active.take() {
            set.destroy();
        }
        for slot in self.scratch.iter_mut() {
            if let Some(buf) = slot.take() {
                buf.destroy();
            }
        }
        for buf in self.retired_scratch.drain(..) {
            buf.destroy();
        }
    }

    fn acquire(&mut self) -> Option<usize> {
        let set = self.active.as_ref()?;
        set.slots.iter().position(|s| !s.busy)
    }

    fn frame_bytes(&mut self, slot: usize) -> Option<&mut [u8]> {
        let set = self.active.as_mut()?;
        let s = set.slots.get(slot)?;
        set.map.get_mut(s.offset..s.offset + s.len)
    }

    fn attach_body(&mut self, slot: usize, surface: &WlSurface) {
        if let Some(set) = self.active.as_mut() {
            if let Some(s) = set.slots.get_mut(slot) {
                surface.attach(Some(&s.wl), 0, 0);
                s.busy = true;
            }
        }
    }

    fn mark_released(&mut self, slot: usize) {
        if let Some(set) = self.active.as_mut() {
            if let Some(s) = set.slots.get_mut(slot) {
                s.busy = false;
                trace!(window = %self.window, slot, "shm buffer released");
            }
        }
    }

    fn mark_scratch_released(&mut self, slot: usize, buffer: &WlBuffer) {
        if let Some(Some(buf)) = self.scratch.get_mut(slot) {
            if buf.wl.id() == buffer.id() {
                buf.busy = false;
                return;
            }
        }
        // A release for a replaced buffer; destroy it now.
        if let Some(pos) = self
            .retired_scratch
            .iter()
            .position(|b| b.wl.id() == buffer.id())
        {
            self.retired_scratch.remove(pos).destroy();
        }
    }

    fn attach_decoration(
        &mut self,
        role: SurfaceRole,
        surface: &WlSurface,
        size: Size,
    ) -> Result<(), BackendError> {
        let index = DECORATION_ROLES
            .iter()
            .position(|r| *r == role)
            .ok_or(BackendError::InvalidDimensions(size.width, size.height))?;

        let needs_realloc = match &self.scratch[index] {
            Some(buf) => scratch_needs_replacement(buf.busy, buf.size == size),
            None => true,
        };
        if needs_realloc {
            let layout = ShmLayout::compute(size, self.format, 1)?;
            let file = tempfile::tempfile().map_err(BackendError::BackingFile)?;
            file.set_len(layout.total_len as u64)
                .map_err(BackendError::BackingFile)?;
            // Safety: freshly created anonymous file, sized above.
            let map = unsafe { MmapMut::map_mut(&file) }.map_err(BackendError::Map)?;
            let pool = self
                .shm
                .create_pool(file.as_fd(), layout.total_len as i32, &self.qh, ());
            let wl = pool.create_buffer(
                0,
                size.width,
                size.height,
                layout.stride as i32,
                shm_format(self.format),
                &self.qh,
                BufferId {
                    window: self.window,
                    slot: index,
                    kind: BufferKind::DecorationScratch,
                },
            );
            if let Some(old) = self.scratch[index].replace(ScratchBuffer {
                _file: file,
                map,
                pool,
                wl,
                size,
                busy: false,
            }) {
                if old.busy {
                    self.retired_scratch.push(old);
                } else {
                    old.destroy();
                }
            }
        }

        // Unwrap-free by construction: the slot was filled above.
        if let Some(buf) = self.scratch[index].as_mut() {
            fill_pixels(&mut buf.map, self.format, decoration_color(role));
            surface.attach(Some(&buf.wl), 0, 0);
            surface.damage(0, 0, size.width, size.height);
            surface.commit();
            buf.busy = true;
        }
        Ok(())
    }

    fn requires_configure_ack(&self) -> bool {
        false
    }

    fn completion(&self) -> FlushCompletion {
        FlushCompletion::OnBufferRelease
    }

    fn geometry(&self) -> Option<BufferGeometry> {
        self.active.as_ref().map(|s| s.geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_accounts_for_every_buffer() {
        let layout = ShmLayout::compute(Size::new(800, 600), ColorFormat::Xrgb8888, 2).unwrap();
        assert_eq!(layout.stride, 800 * 4);
        assert_eq!(layout.buffer_len, 800 * 4 * 600);
        assert_eq!(layout.total_len, layout.buffer_len * 2);
    }

    #[test]
    fn layout_respects_bytes_per_pixel() {
        let rgb565 = ShmLayout::compute(Size::new(320, 240), ColorFormat::Rgb565, 1).unwrap();
        assert_eq!(rgb565.stride, 320 * 2);
        let argb = ShmLayout::compute(Size::new(320, 240), ColorFormat::Argb8888, 1).unwrap();
        assert_eq!(argb.stride, 320 * 4);
    }

    #[test]
    fn layout_rejects_degenerate_input() {
        assert!(ShmLayout::compute(Size::new(0, 240), ColorFormat::Xrgb8888, 1).is_err());
        assert!(ShmLayout::compute(Size::new(320, -1), ColorFormat::Xrgb8888, 1).is_err());
        assert!(ShmLayout::compute(Size::new(320, 240), ColorFormat::Xrgb8888, 0).is_err());
    }

    #[test]
    fn busy_scratch_is_replaced_not_refilled() {
        // A buffer the compositor still reads must never be mutated or
        // re-attached, even when the decoration size is unchanged.
        assert!(scratch_needs_replacement(true, true));
        assert!(scratch_needs_replacement(true, false));
        assert!(scratch_needs_replacement(false, false));
        assert!(!scratch_needs_replacement(false, true));
    }
}
