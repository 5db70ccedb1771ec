//! Central dispatch state: bound globals, the output registry, the
//! window arena and the event plumbing shared by every protocol
//! handler.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, error, trace, warn};
use wayland_client::globals::{GlobalList, GlobalListContents};
use wayland_client::protocol::wl_buffer::{self, WlBuffer};
use wayland_client::protocol::wl_callback::{self, WlCallback};
use wayland_client::protocol::wl_compositor::WlCompositor;
use wayland_client::protocol::wl_output::{self, WlOutput};
use wayland_client::protocol::wl_registry::{self, WlRegistry};
use wayland_client::protocol::wl_seat::WlSeat;
use wayland_client::protocol::wl_shm::{self, WlShm};
use wayland_client::protocol::wl_shm_pool::WlShmPool;
use wayland_client::protocol::wl_subcompositor::WlSubcompositor;
use wayland_client::protocol::wl_subsurface::WlSubsurface;
use wayland_client::protocol::wl_surface::{self, WlSurface};
use wayland_client::{
    delegate_noop, event_created_child, Connection, Dispatch, Proxy, QueueHandle, WEnum,
};
use wayland_protocols::wp::linux_dmabuf::zv1::client::zwp_linux_buffer_params_v1::{
    self, ZwpLinuxBufferParamsV1,
};
use wayland_protocols::wp::linux_dmabuf::zv1::client::zwp_linux_dmabuf_v1::{
    self, ZwpLinuxDmabufV1,
};
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;
use waylet_core::Size;

use crate::backend::dmabuf::{DmabufBufferData, DmabufImportData, SharedDmabufAllocator};
use crate::backend::{BufferId, BufferKind, FlushCompletion};
use crate::config::WaylandConfig;
use crate::error::ConnectError;
use crate::seat::{InputEvent, SeatState};
use crate::window::{SurfaceData, WindowArena, WindowId};

/// Upper bound on tracked outputs; extra outputs are ignored.
pub(crate) const MAX_OUTPUTS: usize = 8;

/// Properties of one compositor output, filled in incrementally until
/// the output's `done` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputInfo {
    pub model: Option<String>,
    pub resolution: Option<Size>,
    /// Refresh rate of the current mode, in mHz.
    pub refresh: i32,
    pub scale: i32,
    pub done: bool,
}

struct OutputSlot<H> {
    handle: H,
    registry_name: u32,
    info: OutputInfo,
}

/// Fixed-capacity registry of outputs. Slot indices are handed to the
/// application as output identifiers and stay stable until the output
/// is unplugged.
pub(crate) struct OutputRegistry<H> {
    slots: Vec<Option<OutputSlot<H>>>,
}

impl<H> OutputRegistry<H> {
    pub(crate) fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_OUTPUTS);
        slots.resize_with(MAX_OUTPUTS, || None);
        Self { slots }
    }

    /// Registers an output, returning its slot index, or `None` when
    /// all slots are taken.
    pub(crate) fn add(&mut self, registry_name: u32, handle: H) -> Option<usize> {
        let index = self.slots.iter().position(Option::is_none)?;
        self.slots[index] = Some(OutputSlot {
            handle,
            registry_name,
            info: OutputInfo {
                scale: 1,
                ..OutputInfo::default()
            },
        });
        Some(index)
    }

    /// Drops the output announced under `registry_name`, returning its
    /// handle and slot index.
    pub(crate) fn remove_by_name(&mut self, registry_name: u32) -> Option<(usize, H)> {
        let index = self
            .slots
            .iter()
            .position(|s| matches!(s, Some(slot) if slot.registry_name == registry_name))?;
        self.slots[index].take().map(|slot| (index, slot.handle))
    }

    pub(crate) fn handle(&self, index: usize) -> Option<&H> {
        self.slots.get(index)?.as_ref().map(|s| &s.handle)
    }

    pub(crate) fn info_mut(&mut self, registry_name: u32) -> Option<&mut OutputInfo> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|s| s.registry_name == registry_name)
            .map(|s| &mut s.info)
    }

    pub(crate) fn infos(&self) -> impl Iterator<Item = (usize, &OutputInfo)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|slot| (i, &slot.info)))
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

/// Globals bound during bring-up, at pinned protocol versions.
pub(crate) struct BoundGlobals {
    pub(crate) compositor: WlCompositor,
    pub(crate) subcompositor: Option<WlSubcompositor>,
    pub(crate) shm: WlShm,
    pub(crate) wm_base: XdgWmBase,
    pub(crate) dmabuf: Option<ZwpLinuxDmabufV1>,
}

/// Dispatch target for the whole connection.
pub(crate) struct WayletState {
    pub(crate) config: WaylandConfig,
    pub(crate) globals: BoundGlobals,
    pub(crate) outputs: OutputRegistry<WlOutput>,
    pub(crate) windows: WindowArena,
    pub(crate) seat: SeatState,
    pub(crate) input_queue: VecDeque<InputEvent>,
    /// A cursor commit is waiting for the next flush to the socket.
    pub(crate) cursor_flush_pending: bool,
    pub(crate) decorations_enabled: bool,
    pub(crate) shm_formats: Vec<wl_shm::Format>,
    pub(crate) dmabuf_formats: HashSet<u32>,
    pub(crate) allocator: Option<SharedDmabufAllocator>,
}

impl WayletState {
    /// Binds all required globals from the initial registry listing.
    /// Versions are pinned to what the integration actually speaks.
    pub(crate) fn bind(
        config: WaylandConfig,
        globals: &GlobalList,
        qh: &QueueHandle<Self>,
    ) -> Result<Self, ConnectError> {
        let compositor = globals
            .bind::<WlCompositor, _, _>(qh, 1..=1, ())
            .map_err(|_| ConnectError::GlobalMissing("wl_compositor"))?;
        let shm = globals
            .bind::<WlShm, _, _>(qh, 1..=1, ())
            .map_err(|_| ConnectError::GlobalMissing("wl_shm"))?;
        let wm_base = globals
            .bind::<XdgWmBase, _, _>(qh, 2..=2, ())
            .map_err(|_| ConnectError::GlobalMissing("xdg_wm_base"))?;
        let subcompositor = globals.bind::<WlSubcompositor, _, _>(qh, 1..=1, ()).ok();
        if subcompositor.is_none() {
            warn!("wl_subcompositor not advertised, decorations unavailable");
        }
        let dmabuf = globals
            .bind::<ZwpLinuxDmabufV1, _, _>(qh, 3..=3, ())
            .ok();

        let mut seat = SeatState::default();
        seat.wl_seat = globals.bind::<WlSeat, _, _>(qh, 5..=5, ()).ok();
        if seat.wl_seat.is_none() {
            warn!("wl_seat not advertised, input disabled");
        }

        let mut outputs = OutputRegistry::new();
        let registry = globals.registry();
        for global in globals.contents().clone_list() {
            if global.interface == "wl_output" {
                bind_output(&mut outputs, registry, qh, global.name, global.version);
            }
        }
        debug!(outputs = outputs.len(), "initial globals bound");

        let decorations_enabled = config.effective_decorations() && subcompositor.is_some();
        Ok(Self {
            config,
            globals: BoundGlobals {
                compositor,
                subcompositor,
                shm,
                wm_base,
                dmabuf,
            },
            outputs,
            windows: WindowArena::new(),
            seat,
            input_queue: VecDeque::new(),
            cursor_flush_pending: false,
            decorations_enabled,
            shm_formats: Vec::new(),
            dmabuf_formats: HashSet::new(),
            allocator: None,
        })
    }
}

fn bind_output(
    outputs: &mut OutputRegistry<WlOutput>,
    registry: &WlRegistry,
    qh: &QueueHandle<WayletState>,
    name: u32,
    advertised_version: u32,
) {
    if outputs.len() >= MAX_OUTPUTS {
        warn!(name, "ignoring output beyond the tracked maximum");
        return;
    }
    let version = advertised_version.min(2);
    let output = registry.bind::<WlOutput, _, _>(name, version, qh, name);
    if outputs.add(name, output).is_none() {
        warn!(name, "ignoring output beyond the tracked maximum");
    }
}

impl Dispatch<WlRegistry, GlobalListContents> for WayletState {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => match interface.as_str() {
                "wl_output" => {
                    debug!(name, "output plugged");
                    bind_output(&mut state.outputs, registry, qh, name, version);
                }
                "wl_seat" if state.seat.wl_seat.is_none() => {
                    if version >= 5 {
                        state.seat.wl_seat =
                            Some(registry.bind::<WlSeat, _, _>(name, 5, qh, ()));
                    } else {
                        warn!(name, version, "seat version too old, input disabled");
                    }
                }
                _ => {}
            },
            wl_registry::Event::GlobalRemove { name } => {
                // wl_output v2 has no release request; dropping the
                // proxy is all the cleanup there is.
                if let Some((index, _output)) = state.outputs.remove_by_name(name) {
                    debug!(name, index, "output unplugged");
                    // Windows pinned to the vanished output fall back to
                    // compositor placement.
                    for window in state.windows.iter_mut() {
                        if window.core.assigned_output == Some(index) {
                            window.core.assigned_output = None;
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<WlOutput, u32> for WayletState {
    fn event(
        state: &mut Self,
        _output: &WlOutput,
        event: wl_output::Event,
        data: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let Some(info) = state.outputs.info_mut(*data) else {
            return;
        };
        match event {
            wl_output::Event::Geometry { model, .. } => {
                info.model = Some(model);
            }
            wl_output::Event::Mode {
                flags,
                width,
                height,
                refresh,
            } => {
                if matches!(flags, WEnum::Value(f) if f.contains(wl_output::Mode::Current)) {
                    info.resolution = Some(Size::new(width, height));
                    info.refresh = refresh;
                }
            }
            wl_output::Event::Scale { factor } => {
                info.scale = factor;
            }
            wl_output::Event::Done => {
                info.done = true;
                trace!(name = data, ?info, "output description complete");
            }
            _ => {}
        }
    }
}

impl Dispatch<WlShm, ()> for WayletState {
    fn event(
        state: &mut Self,
        _shm: &WlShm,
        event: wl_shm::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_shm::Event::Format {
            format: WEnum::Value(format),
        } = event
        {
            state.shm_formats.push(format);
        }
    }
}

impl Dispatch<ZwpLinuxDmabufV1, ()> for WayletState {
    fn event(
        state: &mut Self,
        _dmabuf: &ZwpLinuxDmabufV1,
        event: zwp_linux_dmabuf_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            zwp_linux_dmabuf_v1::Event::Format { format } => {
                state.dmabuf_formats.insert(format);
            }
            zwp_linux_dmabuf_v1::Event::Modifier { format, .. } => {
                state.dmabuf_formats.insert(format);
            }
            _ => {}
        }
    }
}

impl Dispatch<ZwpLinuxBufferParamsV1, DmabufImportData> for WayletState {
    fn event(
        state: &mut Self,
        params: &ZwpLinuxBufferParamsV1,
        event: zwp_linux_buffer_params_v1::Event,
        data: &DmabufImportData,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            zwp_linux_buffer_params_v1::Event::Created { buffer } => {
                if let Some(udata) = buffer.data::<DmabufBufferData>() {
                    let _ = udata.id.set(data.id);
                }
                match state.windows.get_mut(data.id.window) {
                    Some(window) => {
                        window
                            .session
                            .adopt_imported(data.id.slot, data.generation, buffer);
                    }
                    None => buffer.destroy(),
                }
                params.destroy();
            }
            zwp_linux_buffer_params_v1::Event::Failed => {
                // A rejected import only disables its slot; the window
                // and the connection carry on.
                error!(
                    window = %data.id.window,
                    slot = data.id.slot,
                    "compositor rejected a dmabuf import, skipping the buffer"
                );
                if let Some(window) = state.windows.get_mut(data.id.window) {
                    window.session.import_failed(data.id.slot, data.generation);
                }
                params.destroy();
            }
            _ => {}
        }
    }

    event_created_child!(WayletState, ZwpLinuxBufferParamsV1, [
        zwp_linux_buffer_params_v1::EVT_CREATED_OPCODE => (WlBuffer, DmabufBufferData::default()),
    ]);
}

impl Dispatch<WlBuffer, DmabufBufferData> for WayletState {
    fn event(
        state: &mut Self,
        _buffer: &WlBuffer,
        event: wl_buffer::Event,
        data: &DmabufBufferData,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let wl_buffer::Event::Release = event else {
            return;
        };
        let Some(id) = data.id.get().copied() else {
            return;
        };
        if let Some(window) = state.windows.get_mut(id.window) {
            window.session.mark_released(id.slot);
        }
    }
}

impl Dispatch<WlBuffer, BufferId> for WayletState {
    fn event(
        state: &mut Self,
        buffer: &WlBuffer,
        event: wl_buffer::Event,
        data: &BufferId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let wl_buffer::Event::Release = event else {
            return;
        };
        let Some(window) = state.windows.get_mut(data.window) else {
            return;
        };
        match data.kind {
            BufferKind::Body => {
                window.session.mark_released(data.slot);
                if window.session.completion() == FlushCompletion::OnBufferRelease {
                    window.core.flush.mark_complete();
                }
            }
            BufferKind::DecorationScratch => {
                window.session.mark_scratch_released(data.slot, buffer);
            }
        }
    }
}

impl Dispatch<WlCallback, WindowId> for WayletState {
    fn event(
        state: &mut Self,
        _callback: &WlCallback,
        event: wl_callback::Event,
        data: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let wl_callback::Event::Done { .. } = event else {
            return;
        };
        let Some(window) = state.windows.get_mut(*data) else {
            return;
        };
        window.core.flush.frame_done();
        if window.session.completion() == FlushCompletion::OnFrameCallback {
            window.core.flush.mark_complete();
        }
        trace!(
            window = %data,
            frame = window.core.flush.frame_counter,
            "frame callback"
        );
    }
}

impl Dispatch<WlSurface, SurfaceData> for WayletState {
    fn event(
        _state: &mut Self,
        _surface: &WlSurface,
        event: wl_surface::Event,
        data: &SurfaceData,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Output enter/leave could drive per-output scale later; today
        // it is only traced.
        if let wl_surface::Event::Enter { .. } = event {
            trace!(window = %data.window, role = ?data.role, "surface entered an output");
        }
    }
}

delegate_noop!(WayletState: ignore WlShmPool);
delegate_noop!(WayletState: ignore WlSubsurface);
delegate_noop!(WayletState: ignore WlCompositor);
delegate_noop!(WayletState: ignore WlSubcompositor);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_registry_caps_at_maximum() {
        let mut reg: OutputRegistry<()> = OutputRegistry::new();
        for name in 0..MAX_OUTPUTS as u32 {
            assert!(reg.add(name, ()).is_some());
        }
        assert_eq!(reg.len(), MAX_OUTPUTS);
        assert!(reg.add(99, ()).is_none());
    }

    #[test]
    fn removed_output_frees_its_slot() {
        let mut reg: OutputRegistry<()> = OutputRegistry::new();
        let a = reg.add(10, ()).unwrap();
        let b = reg.add(11, ()).unwrap();
        assert_ne!(a, b);
        let (index, _) = reg.remove_by_name(10).unwrap();
        assert_eq!(index, a);
        assert!(reg.remove_by_name(10).is_none());
        // The freed slot is reused for the next output.
        assert_eq!(reg.add(12, ()), Some(a));
    }

    #[test]
    fn output_info_is_keyed_by_registry_name() {
        let mut reg: OutputRegistry<()> = OutputRegistry::new();
        reg.add(7, ()).unwrap();
        let info = reg.info_mut(7).unwrap();
        info.resolution = Some(Size::new(1920, 1080));
        info.done = true;
        assert!(reg.info_mut(8).is_none());
        let collected: Vec<_> = reg.infos().collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].1.resolution, Some(Size::new(1920, 1080)));
    }
}
