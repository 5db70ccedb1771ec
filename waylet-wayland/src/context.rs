//! The renderer-facing connection handle.
//!
//! [`WaylandContext`] owns the compositor connection, its event queue
//! and every window created through it. All methods run on the caller's
//! thread; the only blocking points are the window-creation round-trip
//! and [`WaylandContext::wait_flush`].

use std::io;
use std::os::fd::{AsRawFd, RawFd};

use tracing::{debug, error, info, trace, warn};
use wayland_client::backend::WaylandError;
use wayland_client::globals::registry_queue_init;
use wayland_client::{Connection, DispatchError, EventQueue, QueueHandle};
use waylet_core::{Rect, Size};

use crate::backend::dmabuf::{DmabufSession, SharedDmabufAllocator};
use crate::backend::shm::ShmSession;
use crate::backend::{drm_fourcc, BackendSession, BufferGeometry};
use crate::config::{BackendKind, WaylandConfig};
use crate::error::{BackendError, ConnectError, Result, WindowError};
use crate::seat::InputEvent;
use crate::state::{OutputInfo, WayletState};
use crate::window::{
    CloseCallback, Surface, SurfaceData, SurfaceRole, Window, WindowCore, WindowId,
    DECORATION_ROLES,
};
use crate::xdg_shell::sync_decorations;

/// Outcome of a [`WaylandContext::flush`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Damage recorded; the commit is deferred (more flushes expected
    /// this frame, no free buffer yet, or a configure ack is pending).
    Deferred,
    /// Buffer attached, damage applied and the frame committed.
    Committed,
}

/// Connection handle owning all protocol state.
pub struct WaylandContext {
    conn: Connection,
    queue: EventQueue<WayletState>,
    qh: QueueHandle<WayletState>,
    state: WayletState,
    shut_down: bool,
}

impl WaylandContext {
    /// Connects to the compositor named by the environment and binds
    /// all required globals. One round-trip collects formats, outputs
    /// and seat capabilities before this returns.
    pub fn connect(config: WaylandConfig) -> Result<Self, ConnectError> {
        config.validate()?;
        let conn = Connection::connect_to_env()?;
        let (globals, mut queue) = registry_queue_init::<WayletState>(&conn)?;
        let qh = queue.handle();
        let mut state = WayletState::bind(config, &globals, &qh)?;
        queue.roundtrip(&mut state)?;

        if state.config.backend == BackendKind::Dmabuf {
            if state.globals.dmabuf.is_none() {
                return Err(ConnectError::GlobalMissing("zwp_linux_dmabuf_v1"));
            }
            let fourcc = drm_fourcc(state.config.color_format);
            if !state.dmabuf_formats.contains(&fourcc) {
                return Err(ConnectError::DmabufFormatMissing(fourcc));
            }
        }
        info!(
            backend = ?state.config.backend,
            format = ?state.config.color_format,
            decorations = state.decorations_enabled,
            outputs = state.outputs.len(),
            "connected to Wayland compositor"
        );
        Ok(Self {
            conn,
            queue,
            qh,
            state,
            shut_down: false,
        })
    }

    /// [`connect`](Self::connect) plus a DMABUF allocator, for the
    /// DMABUF backend.
    pub fn connect_with_allocator(
        config: WaylandConfig,
        allocator: SharedDmabufAllocator,
    ) -> Result<Self, ConnectError> {
        let mut ctx = Self::connect(config)?;
        ctx.state.allocator = Some(allocator);
        Ok(ctx)
    }

    /// Installs or replaces the DMABUF allocator. Affects windows
    /// created afterwards.
    pub fn set_dmabuf_allocator(&mut self, allocator: SharedDmabufAllocator) {
        self.state.allocator = Some(allocator);
    }

    /// Creates a window of the given content size and blocks until its
    /// first configure has been processed and buffers exist. A missing
    /// first configure is fatal to the creation and rolls everything
    /// back.
    pub fn create_window(
        &mut self,
        size: Size,
        title: &str,
        close_cb: Option<CloseCallback>,
    ) -> Result<WindowId> {
        let id = self.state.windows.reserve();
        let compositor = self.state.globals.compositor.clone();
        let body_surface = compositor.create_surface(
            &self.qh,
            SurfaceData {
                window: id,
                role: SurfaceRole::Body,
            },
        );

        let mut decorations = Vec::new();
        if self.state.decorations_enabled {
            if let Some(subcompositor) = self.state.globals.subcompositor.clone() {
                for role in DECORATION_ROLES {
                    let wl_surface = compositor.create_surface(
                        &self.qh,
                        SurfaceData { window: id, role },
                    );
                    let subsurface =
                        subcompositor.get_subsurface(&wl_surface, &body_surface, &self.qh, ());
                    subsurface.set_desync();
                    decorations.push(Surface {
                        wl_surface,
                        subsurface: Some(subsurface),
                        role,
                        size: Size::default(),
                    });
                }
            }
        }

        let xdg_surface = self
            .state
            .globals
            .wm_base
            .get_xdg_surface(&body_surface, &self.qh, id);
        let xdg_toplevel = xdg_surface.get_toplevel(&self.qh, id);
        xdg_toplevel.set_title(title.to_owned());
        xdg_toplevel.set_app_id(title.to_owned());

        let session = match self.new_session(id) {
            Ok(session) => session,
            Err(err) => {
                xdg_toplevel.destroy();
                xdg_surface.destroy();
                for surface in &decorations {
                    surface.destroy();
                }
                body_surface.destroy();
                self.state.windows.remove(id);
                return Err(err.into());
            }
        };

        let mut core = WindowCore::new(id, size, self.state.decorations_enabled);
        core.close_cb = close_cb;
        self.state.windows.install(
            id,
            Window {
                core,
                body: Surface {
                    wl_surface: body_surface.clone(),
                    subsurface: None,
                    role: SurfaceRole::Body,
                    size,
                },
                decorations,
                xdg_surface,
                xdg_toplevel,
                session,
            },
        );

        // Commit with no buffer so the compositor sends the first
        // configure, and wait for it in-line. A dispatch failure here
        // rolls the half-built window back like a missing configure.
        body_surface.commit();
        if let Err(err) = self.queue.roundtrip(&mut self.state) {
            if let Some(window) = self.state.windows.remove(id) {
                Self::teardown_window(window);
            }
            return Err(err.into());
        }

        let configured = self
            .state
            .windows
            .get(id)
            .map(|w| w.core.configured)
            .unwrap_or(false);
        if !configured {
            error!(window = %id, "no initial configure, rolling the window back");
            if let Some(window) = self.state.windows.remove(id) {
                Self::teardown_window(window);
            }
            return Err(WindowError::InitialConfigure);
        }
        debug!(window = %id, title, "window created");
        Ok(id)
    }

    fn new_session(&self, id: WindowId) -> Result<Box<dyn BackendSession>, BackendError> {
        let config = &self.state.config;
        match config.backend {
            BackendKind::Shm => Ok(Box::new(ShmSession::new(
                self.state.globals.shm.clone(),
                self.qh.clone(),
                id,
                config.color_format,
                config.buffer_count,
            ))),
            BackendKind::Dmabuf => {
                let dmabuf = self
                    .state
                    .globals
                    .dmabuf
                    .clone()
                    .ok_or(BackendError::NoAllocator)?;
                let allocator = self
                    .state
                    .allocator
                    .clone()
                    .ok_or(BackendError::NoAllocator)?;
                Ok(Box::new(DmabufSession::new(
                    dmabuf,
                    self.state.globals.shm.clone(),
                    self.qh.clone(),
                    id,
                    config.color_format,
                    config.buffer_count,
                    allocator,
                )))
            }
        }
    }

    /// Requests a window close. The close callback runs (and may veto)
    /// at the next [`refresh_start`](Self::refresh_start).
    pub fn close_window(&mut self, id: WindowId) -> Result<()> {
        let window = self
            .state
            .windows
            .get_mut(id)
            .ok_or(WindowError::UnknownWindow)?;
        window.core.shall_close = true;
        Ok(())
    }

    pub fn set_maximized(&mut self, id: WindowId, maximized: bool) -> Result<()> {
        let window = self
            .state
            .windows
            .get_mut(id)
            .ok_or(WindowError::UnknownWindow)?;
        if maximized {
            window.xdg_toplevel.set_maximized();
        } else {
            window.xdg_toplevel.unset_maximized();
        }
        Ok(())
    }

    /// Requests fullscreen on the window's assigned output, or lets the
    /// compositor pick one.
    pub fn set_fullscreen(&mut self, id: WindowId, fullscreen: bool) -> Result<()> {
        let assigned = self
            .state
            .windows
            .get(id)
            .ok_or(WindowError::UnknownWindow)?
            .core
            .assigned_output;
        let output = assigned.and_then(|i| self.state.outputs.handle(i)).cloned();
        let window = self
            .state
            .windows
            .get_mut(id)
            .ok_or(WindowError::UnknownWindow)?;
        if fullscreen {
            window.xdg_toplevel.set_fullscreen(output.as_ref());
        } else {
            window.xdg_toplevel.unset_fullscreen();
        }
        Ok(())
    }

    pub fn set_minimized(&mut self, id: WindowId) -> Result<()> {
        let window = self
            .state
            .windows
            .get_mut(id)
            .ok_or(WindowError::UnknownWindow)?;
        window.xdg_toplevel.set_minimized();
        Ok(())
    }

    /// Pins the window to one of the advertised outputs for subsequent
    /// fullscreen requests.
    pub fn assign_output(&mut self, id: WindowId, output: usize) -> Result<()> {
        if self.state.outputs.handle(output).is_none() {
            return Err(WindowError::UnknownWindow);
        }
        let window = self
            .state
            .windows
            .get_mut(id)
            .ok_or(WindowError::UnknownWindow)?;
        window.core.assigned_output = Some(output);
        Ok(())
    }

    pub fn unassign_output(&mut self, id: WindowId) -> Result<()> {
        let window = self
            .state
            .windows
            .get_mut(id)
            .ok_or(WindowError::UnknownWindow)?;
        window.core.assigned_output = None;
        Ok(())
    }

    /// Name the compositor advertised for the seat, if any.
    pub fn seat_name(&self) -> Option<&str> {
        self.state.seat.name.as_deref()
    }

    /// Whether the compositor advertised shm support for the given
    /// renderer format. Populated during the connect round-trip.
    pub fn supports_color_format(&self, format: waylet_core::ColorFormat) -> bool {
        self.state
            .shm_formats
            .contains(&crate::backend::shm_format(format))
    }

    /// Known outputs and their advertised properties.
    pub fn outputs(&self) -> Vec<(usize, OutputInfo)> {
        self.state
            .outputs
            .infos()
            .map(|(i, info)| (i, info.clone()))
            .collect()
    }

    /// With an id: whether that window is still open. Without: whether
    /// any window is.
    pub fn is_window_open(&self, id: Option<WindowId>) -> bool {
        match id {
            Some(id) => self.state.windows.get(id).is_some(),
            None => !self.state.windows.is_empty(),
        }
    }

    /// Content size the renderer should draw at.
    pub fn content_size(&self, id: WindowId) -> Option<Size> {
        self.state.windows.get(id).map(|w| w.core.content_size)
    }

    /// Transport descriptor for integration into an external poll loop.
    pub fn poll_fd(&self) -> RawFd {
        let backend = self.conn.backend();
        backend.poll_fd().as_raw_fd()
    }

    /// Flushes requests, reads whatever the socket holds without
    /// blocking, and dispatches the buffered events.
    pub fn dispatch_pending(&mut self) -> Result<usize> {
        self.flush_socket()?;
        if let Some(guard) = self.queue.prepare_read() {
            match guard.read() {
                Ok(_) => {}
                Err(WaylandError::Io(ref e)) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => return Err(DispatchError::Backend(err).into()),
            }
        }
        Ok(self.queue.dispatch_pending(&mut self.state)?)
    }

    /// Renderer refresh-start hook: drains protocol events, then
    /// applies deferred closes (running veto callbacks) and deferred
    /// resizes at a consistent point of the frame cycle.
    pub fn refresh_start(&mut self) -> Result<()> {
        self.dispatch_pending()?;
        for id in self.state.windows.ids() {
            let close_now = match self.state.windows.get_mut(id) {
                Some(window) => window.core.decide_close(),
                None => continue,
            };
            if close_now {
                if let Some(window) = self.state.windows.remove(id) {
                    debug!(window = %id, "closing window");
                    Self::teardown_window(window);
                }
                continue;
            }
            if let Some(window) = self.state.windows.get_mut(id) {
                apply_pending_resize(window);
            }
        }
        Ok(())
    }

    /// Renderer refresh-end hook: pushes any commits still sitting in
    /// the send buffer (window frames and the cursor surface) out to
    /// the compositor.
    pub fn refresh_end(&mut self) -> Result<()> {
        let mut pending = self.state.cursor_flush_pending;
        for window in self.state.windows.iter_mut() {
            pending |= window.core.flush.flush_pending;
        }
        if !pending {
            return Ok(());
        }
        self.flush_socket()?;
        self.state.cursor_flush_pending = false;
        for window in self.state.windows.iter_mut() {
            window.core.flush.flush_pending = false;
        }
        Ok(())
    }

    /// Next drawable byte region of the window, with its geometry.
    /// `None` when every buffer is still held by the compositor or the
    /// backend has no CPU-visible storage (DMABUF). The slot handed out
    /// here is pinned so the committing flush attaches exactly this
    /// buffer, no matter which releases are dispatched in between.
    pub fn frame_buffer(&mut self, id: WindowId) -> Option<(&mut [u8], BufferGeometry)> {
        let window = self.state.windows.get_mut(id)?;
        let geometry = window.session.geometry()?;
        let session = &mut window.session;
        let slot = window.core.pin_slot(|| session.acquire())?;
        let bytes = window.session.frame_bytes(slot)?;
        Some((bytes, geometry))
    }

    /// Reports a damaged region. Intermediate calls only record damage;
    /// the call with `last = true` attaches the next free buffer,
    /// applies all cached damage, registers a frame callback and
    /// commits.
    pub fn flush(&mut self, id: WindowId, area: Rect, last: bool) -> Result<FlushStatus> {
        let qh = self.qh.clone();
        let window = self
            .state
            .windows
            .get_mut(id)
            .ok_or(WindowError::UnknownWindow)?;
        if !window.core.configured {
            return Err(WindowError::NotConfigured);
        }
        window.core.damage.push(area);
        if !last {
            return Ok(FlushStatus::Deferred);
        }
        if window.core.damage.is_empty() {
            return Ok(FlushStatus::Deferred);
        }
        if window.session.requires_configure_ack() && window.core.pending_configure_ack {
            trace!(window = %id, "flush deferred, configure not acknowledged");
            return Ok(FlushStatus::Deferred);
        }
        let session = &mut window.session;
        let Some(slot) = window.core.take_slot(|| session.acquire()) else {
            trace!(window = %id, "flush deferred, all buffers busy");
            return Ok(FlushStatus::Deferred);
        };
        window.session.attach_body(slot, &window.body.wl_surface);
        let content = window.core.content_size;
        for rect in window.core.damage.drain(content) {
            window
                .body
                .wl_surface
                .damage(rect.x, rect.y, rect.width, rect.height);
        }
        window.body.wl_surface.frame(&qh, id);
        window.body.wl_surface.commit();
        window.core.flush.commit_submitted();
        trace!(window = %id, slot, "frame committed");
        Ok(FlushStatus::Committed)
    }

    /// Consumes the flush-completion latch: `true` once per completed
    /// flush cycle.
    pub fn poll_flush_complete(&mut self, id: WindowId) -> bool {
        self.state
            .windows
            .get_mut(id)
            .map(|w| w.core.flush.take_complete())
            .unwrap_or(false)
    }

    /// Blocks until the window's frame counter advances, interleaving
    /// dispatch on the connection. A no-op before the first frame has
    /// ever completed or when no frame is in flight.
    pub fn wait_flush(&mut self, id: WindowId) -> Result<()> {
        let (start, in_flight) = match self.state.windows.get(id) {
            Some(w) => (w.core.flush.frame_counter, w.core.flush.frames_in_flight()),
            None => return Err(WindowError::UnknownWindow),
        };
        if start == 0 || in_flight == 0 {
            return Ok(());
        }
        loop {
            self.flush_socket()?;
            self.queue.blocking_dispatch(&mut self.state)?;
            match self.state.windows.get(id) {
                Some(w) if w.core.flush.frame_counter != start => return Ok(()),
                Some(_) => {}
                None => return Ok(()),
            }
        }
    }

    /// Drains the queued input events in arrival order.
    pub fn drain_input(&mut self) -> impl Iterator<Item = InputEvent> + '_ {
        self.state.input_queue.drain(..)
    }

    /// Destroys every window and releases the seat and shell globals.
    /// Called from `Drop`; explicit calls are idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        for id in self.state.windows.ids() {
            if let Some(window) = self.state.windows.remove(id) {
                Self::teardown_window(window);
            }
        }
        self.state.seat.release();
        if let Some(dmabuf) = self.state.globals.dmabuf.take() {
            dmabuf.destroy();
        }
        if let Some(subcompositor) = self.state.globals.subcompositor.take() {
            subcompositor.destroy();
        }
        self.state.globals.wm_base.destroy();
        if let Err(err) = self.conn.flush() {
            warn!(%err, "final flush failed");
        }
        info!("disconnected from Wayland compositor");
    }

    fn flush_socket(&self) -> Result<()> {
        self.conn
            .flush()
            .map_err(|err| WindowError::Dispatch(DispatchError::Backend(err)))
    }

    /// Releases everything a window owns, bottom-up: shell objects,
    /// surfaces, then backend storage.
    fn teardown_window(mut window: Window) {
        window.xdg_toplevel.destroy();
        window.xdg_surface.destroy();
        for surface in &window.decorations {
            surface.destroy();
        }
        window.body.destroy();
        window.session.deinit();
    }
}

impl Drop for WaylandContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Applies a deferred resize if one is ready: reallocate buffers first
/// (new before old), then adopt the content size and re-sync the
/// decorations.
fn apply_pending_resize(window: &mut Window) {
    if !window.core.resize_ready(window.session.requires_configure_ack()) {
        return;
    }
    let Some(outer) = window.core.resize_pending.take() else {
        return;
    };
    let content = window.core.insets().content_size(outer);
    if content == window.core.content_size || !content.is_valid() {
        return;
    }
    match window.session.resize(content) {
        Ok(()) => {
            debug!(
                window = %window.core.id,
                width = content.width,
                height = content.height,
                "window resized"
            );
            window.core.content_size = content;
            window.body.size = content;
            // A pinned slot indexes into the retired buffer set.
            window.core.acquired_slot = None;
            if window.core.decorated() {
                if let Err(err) = sync_decorations(window) {
                    warn!(window = %window.core.id, %err, "decoration resize failed");
                }
            }
        }
        Err(err) => {
            // The previous buffer generation is still installed; the
            // window keeps its old size.
            error!(window = %window.core.id, %err, "resize allocation failed");
        }
    }
}
