//! DMABUF buffer backend.
//!
//! Body buffers are allocated by an application-installed
//! [`DmabufAllocator`] (typically backed by a GPU or 2D-blit driver)
//! and imported through `zwp_linux_dmabuf_v1`. The session always runs
//! double-buffered and gates presentation on xdg configure
//! acknowledgement, since an imported buffer cannot be resized in
//! place. Decoration surfaces still draw through a small shm scratch
//! ring; only the body takes the DMABUF path.

use std::cell::RefCell;
use std::os::fd::{AsFd, OwnedFd};
use std::rc::Rc;
use std::sync::OnceLock;

use tracing::{debug, trace};
use wayland_client::protocol::wl_buffer::WlBuffer;
use wayland_client::protocol::wl_shm::WlShm;
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::QueueHandle;
use wayland_protocols::wp::linux_dmabuf::zv1::client::zwp_linux_buffer_params_v1;
use wayland_protocols::wp::linux_dmabuf::zv1::client::zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1;
use waylet_core::{ColorFormat, Size};

use crate::error::BackendError;
use crate::state::WayletState;
use crate::window::{SurfaceRole, WindowId};

use super::shm::ShmSession;
use super::{
    drm_fourcc, swap_active, BackendSession, BufferGeometry, BufferId, BufferKind,
    FlushCompletion, MAX_BUFFER_PLANES,
};

/// One plane of an allocator-provided DMABUF.
pub struct DmabufPlane {
    pub fd: OwnedFd,
    pub offset: u32,
    pub stride: u32,
}

/// An allocator-provided buffer: up to [`MAX_BUFFER_PLANES`] planes
/// sharing one format modifier.
pub struct DmabufSlab {
    pub planes: Vec<DmabufPlane>,
    pub modifier: u64,
}

/// Produces DMABUF storage for body buffers. Implemented by the
/// application; the crate never allocates device memory itself.
pub trait DmabufAllocator {
    /// Allocates one buffer of the given size and DRM fourcc format.
    fn allocate(&mut self, size: Size, fourcc: u32) -> Result<DmabufSlab, BackendError>;
}

/// Allocator handle shared between the context and its sessions.
pub type SharedDmabufAllocator = Rc<RefCell<dyn DmabufAllocator>>;

/// User data of a pending buffer import: the body slot it fills and the
/// buffer-set generation the request was issued for.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DmabufImportData {
    pub(crate) id: BufferId,
    pub(crate) generation: u64,
}

/// User data of an imported dmabuf `wl_buffer`. The identity is filled
/// in when the `created` event delivers the buffer.
#[derive(Debug, Default)]
pub(crate) struct DmabufBufferData {
    pub(crate) id: OnceLock<BufferId>,
}

/// One body slot of a set. The buffer arrives asynchronously once the
/// compositor answers the import request.
struct ImportSlot<B> {
    buffer: Option<B>,
    busy: bool,
    failed: bool,
}

impl<B> ImportSlot<B> {
    fn pending() -> Self {
        Self {
            buffer: None,
            busy: false,
            failed: false,
        }
    }

    fn ready(&self) -> bool {
        self.buffer.is_some() && !self.busy && !self.failed
    }
}

fn first_ready<B>(slots: &[ImportSlot<B>]) -> Option<usize> {
    slots.iter().position(ImportSlot::ready)
}

/// Stores a completed import, or hands the buffer back for disposal
/// when it belongs to a retired buffer generation or an unknown slot.
fn accept_import<B>(
    slots: &mut [ImportSlot<B>],
    slot: usize,
    generation: u64,
    current: u64,
    buffer: B,
) -> Option<B> {
    if generation != current {
        return Some(buffer);
    }
    match slots.get_mut(slot) {
        Some(s) => {
            s.buffer = Some(buffer);
            None
        }
        None => Some(buffer),
    }
}

struct DmabufSet {
    slots: Vec<ImportSlot<WlBuffer>>,
    generation: u64,
    geometry: BufferGeometry,
}

impl DmabufSet {
    fn destroy(self) {
        for slot in &self.slots {
            if let Some(wl) = &slot.buffer {
                wl.destroy();
            }
        }
    }
}

pub(crate) struct DmabufSession {
    dmabuf: ZwpLinuxDmabufV1,
    qh: QueueHandle<WayletState>,
    window: WindowId,
    format: ColorFormat,
    buffer_count: usize,
    allocator: SharedDmabufAllocator,
    active: Option<DmabufSet>,
    /// Monotonic count of buffer sets ever requested. Late `created`
    /// events carrying an older generation are destroyed on arrival.
    generation: u64,
    /// Decoration scratch buffers stay on the shm path.
    scratch: ShmSession,
}

impl DmabufSession {
    pub(crate) fn new(
        dmabuf: ZwpLinuxDmabufV1,
        shm: WlShm,
        qh: QueueHandle<WayletState>,
        window: WindowId,
        format: ColorFormat,
        buffer_count: usize,
        allocator: SharedDmabufAllocator,
    ) -> Self {
        let scratch = ShmSession::new(shm, qh.clone(), window, format, 1);
        Self {
            dmabuf,
            qh,
            window,
            format,
            buffer_count,
            allocator,
            active: None,
            generation: 0,
            scratch,
        }
    }

    /// Sends an import request for one slab. The compositor answers
    /// with `created` or `failed`; the params object is destroyed in
    /// that handler.
    fn request_import(
        &self,
        slab: &DmabufSlab,
        size: Size,
        slot: usize,
        generation: u64,
    ) -> Result<(), BackendError> {
        if slab.planes.is_empty() || slab.planes.len() > MAX_BUFFER_PLANES {
            return Err(BackendError::TooManyPlanes(
                slab.planes.len(),
                MAX_BUFFER_PLANES,
            ));
        }
        let params = self.dmabuf.create_params(
            &self.qh,
            DmabufImportData {
                id: BufferId {
                    window: self.window,
                    slot,
                    kind: BufferKind::Body,
                },
                generation,
            },
        );
        for (index, plane) in slab.planes.iter().enumerate() {
            params.add(
                plane.fd.as_fd(),
                index as u32,
                plane.offset,
                plane.stride,
                (slab.modifier >> 32) as u32,
                slab.modifier as u32,
            );
        }
        params.create(
            size.width,
            size.height,
            drm_fourcc(self.format),
            zwp_linux_buffer_params_v1::Flags::empty(),
        );
        Ok(())
    }

    /// Allocates and requests imports for a full set. When this fails
    /// part-way, imports already in flight carry a generation no set
    /// ever adopts, so their buffers are destroyed as they arrive.
    fn allocate_set(&mut self, size: Size) -> Result<DmabufSet, BackendError> {
        if !size.is_valid() {
            return Err(BackendError::InvalidDimensions(size.width, size.height));
        }
        let fourcc = drm_fourcc(self.format);
        self.generation += 1;
        let generation = self.generation;
        let mut slots = Vec::with_capacity(self.buffer_count);
        let mut stride = self.format.min_stride(size.width) as usize;
        for slot in 0..self.buffer_count {
            let slab = self
                .allocator
                .borrow_mut()
                .allocate(size, fourcc)?;
            self.request_import(&slab, size, slot, generation)?;
            if let Some(first) = slab.planes.first() {
                stride = first.stride as usize;
            }
            slots.push(ImportSlot::pending());
        }
        debug!(
            window = %self.window,
            width = size.width,
            height = size.height,
            buffers = self.buffer_count,
            generation,
            fourcc = format_args!("{:#010x}", fourcc),
            "requested dmabuf imports"
        );
        Ok(DmabufSet {
            slots,
            generation,
            geometry: BufferGeometry { size, stride },
        })
    }
}

impl BackendSession for DmabufSession {
    fn init_display(&mut self, size: Size) -> Result<(), BackendError> {
        let fresh = self.allocate_set(size)?;
        if let Some(old) = swap_active(&mut self.active, fresh) {
            old.destroy();
        }
        Ok(())
    }

    fn resize(&mut self, size: Size) -> Result<(), BackendError> {
        self.init_display(size)
    }

    fn deinit(&mut self) {
        if let Some(set) = self.active.take() {
            set.destroy();
        }
        self.scratch.deinit();
    }

    fn acquire(&mut self) -> Option<usize> {
        let set = self.active.as_ref()?;
        first_ready(&set.slots)
    }

    fn frame_bytes(&mut self, _slot: usize) -> Option<&mut [u8]> {
        // Device memory is written through the allocator's own mapping;
        // there is no CPU-visible byte view on this path.
        None
    }

    fn attach_body(&mut self, slot: usize, surface: &WlSurface) {
        if let Some(set) = self.active.as_mut() {
            if let Some(s) = set.slots.get_mut(slot) {
                if let Some(wl) = &s.buffer {
                    surface.attach(Some(wl), 0, 0);
                    s.busy = true;
                }
            }
        }
    }

    fn mark_released(&mut self, slot: usize) {
        if let Some(set) = self.active.as_mut() {
            if let Some(s) = set.slots.get_mut(slot) {
                s.busy = false;
                trace!(window = %self.window, slot, "dmabuf buffer released");
            }
        }
    }

    fn mark_scratch_released(&mut self, slot: usize, buffer: &WlBuffer) {
        self.scratch.mark_scratch_released(slot, buffer);
    }

    fn adopt_imported(&mut self, slot: usize, generation: u64, buffer: WlBuffer) {
        let Some(set) = self.active.as_mut() else {
            buffer.destroy();
            return;
        };
        let current = set.generation;
        match accept_import(&mut set.slots, slot, generation, current, buffer) {
            None => {
                trace!(window = %self.window, slot, generation, "dmabuf buffer imported");
            }
            Some(stale) => {
                trace!(
                    window = %self.window,
                    slot,
                    generation,
                    "discarding import for a retired buffer set"
                );
                stale.destroy();
            }
        }
    }

    fn import_failed(&mut self, slot: usize, generation: u64) {
        if let Some(set) = self.active.as_mut() {
            if set.generation == generation {
                if let Some(s) = set.slots.get_mut(slot) {
                    s.failed = true;
                }
            }
        }
    }

    fn attach_decoration(
        &mut self,
        role: SurfaceRole,
        surface: &WlSurface,
        size: Size,
    ) -> Result<(), BackendError> {
        self.scratch.attach_decoration(role, surface, size)
    }

    fn requires_configure_ack(&self) -> bool {
        true
    }

    fn completion(&self) -> FlushCompletion {
        FlushCompletion::OnFrameCallback
    }

    fn geometry(&self) -> Option<BufferGeometry> {
        self.active.as_ref().map(|s| s.geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_skips_pending_busy_and_failed_slots() {
        let mut slots: Vec<ImportSlot<u32>> = vec![ImportSlot::pending(), ImportSlot::pending()];
        // Nothing acquirable while imports are in flight.
        assert_eq!(first_ready(&slots), None);
        assert!(accept_import(&mut slots, 1, 7, 7, 11u32).is_none());
        assert_eq!(first_ready(&slots), Some(1));
        slots[1].busy = true;
        assert_eq!(first_ready(&slots), None);
        slots[1].busy = false;
        slots[1].failed = true;
        assert_eq!(first_ready(&slots), None);
    }

    #[test]
    fn stale_generation_import_is_handed_back_for_disposal() {
        let mut slots: Vec<ImportSlot<u32>> = vec![ImportSlot::pending()];
        // An import issued for a superseded buffer set must never land
        // in the current one; the caller destroys the returned buffer.
        assert_eq!(accept_import(&mut slots, 0, 3, 4, 42u32), Some(42));
        assert!(slots[0].buffer.is_none());
        assert_eq!(accept_import(&mut slots, 0, 4, 4, 42u32), None);
        assert_eq!(slots[0].buffer, Some(42));
        // Out-of-range slots are rejected the same way.
        assert_eq!(accept_import(&mut slots, 5, 4, 4, 9u32), Some(9));
    }
}
