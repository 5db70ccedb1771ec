//! Pointer handling: motion, buttons, scroll and the cursor surface.

use tracing::{trace, warn};
use wayland_client::protocol::wl_compositor::WlCompositor;
use wayland_client::protocol::wl_pointer::{self, ButtonState, WlPointer};
use wayland_client::protocol::wl_seat::WlSeat;
use wayland_client::protocol::wl_shm::WlShm;
use wayland_client::protocol::wl_surface::{self, WlSurface};
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle, WEnum};
use wayland_cursor::CursorTheme;
use waylet_core::Point;

use crate::state::WayletState;
use crate::window::{SurfaceData, SurfaceRole};
use crate::xdg_shell::{cursor_name, handle_decoration_press};

use super::{clamp_to_surface, surface_extent, InputEvent, PointerButton};

/// User data of the cursor surface, distinguishing it from window
/// surfaces in dispatch.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CursorSurfaceData;

const CURSOR_SIZE: u32 = 32;

pub(crate) struct PointerState {
    device: WlPointer,
    cursor_surface: WlSurface,
    theme: Option<CursorTheme>,
    /// Name of the cursor currently shown, to skip redundant attaches.
    current_cursor: Option<&'static str>,
    pub(crate) position: Point,
    pub(crate) focus: Option<SurfaceData>,
    enter_serial: u32,
}

impl PointerState {
    pub(crate) fn new(
        compositor: &WlCompositor,
        shm: WlShm,
        seat: &WlSeat,
        conn: &Connection,
        qh: &QueueHandle<WayletState>,
    ) -> Self {
        let device = seat.get_pointer(qh, ());
        let cursor_surface = compositor.create_surface(qh, CursorSurfaceData);
        let theme = match CursorTheme::load(conn, shm, CURSOR_SIZE) {
            Ok(theme) => Some(theme),
            Err(err) => {
                warn!(%err, "cursor theme unavailable, cursor will not be drawn");
                None
            }
        };
        Self {
            device,
            cursor_surface,
            theme,
            current_cursor: None,
            position: Point::new(0, 0),
            focus: None,
            enter_serial: 0,
        }
    }

    pub(crate) fn release(self) {
        self.device.release();
        self.cursor_surface.destroy();
    }
}

/// Attaches the named cursor image to the cursor surface. A commit on
/// the cursor surface must reach the compositor before the next frame,
/// so the caller-visible `cursor_flush_pending` flag is raised.
fn show_cursor(state: &mut WayletState, name: &'static str, serial: u32) {
    let Some(ptr) = state.seat.pointer.as_mut() else {
        return;
    };
    if ptr.current_cursor == Some(name) {
        return;
    }
    let Some(theme) = ptr.theme.as_mut() else {
        return;
    };
    let Some(cursor) = theme.get_cursor(name) else {
        trace!(name, "cursor shape missing from theme");
        return;
    };
    let frame = &cursor[0];
    let (w, h) = frame.dimensions();
    let (hx, hy) = frame.hotspot();
    ptr.device
        .set_cursor(serial, Some(&ptr.cursor_surface), hx as i32, hy as i32);
    ptr.cursor_surface.attach(Some(&**frame), 0, 0);
    ptr.cursor_surface.damage(0, 0, w as i32, h as i32);
    ptr.cursor_surface.commit();
    ptr.current_cursor = Some(name);
    state.cursor_flush_pending = true;
}

impl Dispatch<WlPointer, ()> for WayletState {
    fn event(
        state: &mut Self,
        _pointer: &WlPointer,
        event: wl_pointer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_pointer::Event::Enter {
                serial,
                surface,
                surface_x,
                surface_y,
            } => {
                let data = surface.data::<SurfaceData>().copied();
                if let Some(ptr) = state.seat.pointer.as_mut() {
                    ptr.focus = data;
                    ptr.enter_serial = serial;
                    ptr.current_cursor = None;
                }
                if let Some(data) = data {
                    let extent = surface_extent(state, data.window, data.role);
                    let position = clamp_to_surface(surface_x, surface_y, extent);
                    if let Some(ptr) = state.seat.pointer.as_mut() {
                        ptr.position = position;
                    }
                    let maximized = state
                        .windows
                        .get(data.window)
                        .map(|w| w.core.maximized)
                        .unwrap_or(false);
                    show_cursor(
                        state,
                        cursor_name(data.role, position, extent, maximized),
                        serial,
                    );
                }
            }
            wl_pointer::Event::Leave { .. } => {
                if let Some(ptr) = state.seat.pointer.as_mut() {
                    ptr.focus = None;
                }
            }
            wl_pointer::Event::Motion {
                surface_x,
                surface_y,
                ..
            } => {
                let Some(data) = state.seat.pointer.as_ref().and_then(|p| p.focus) else {
                    return;
                };
                let extent = surface_extent(state, data.window, data.role);
                let position = clamp_to_surface(surface_x, surface_y, extent);
                let serial = match state.seat.pointer.as_mut() {
                    Some(ptr) => {
                        ptr.position = position;
                        ptr.enter_serial
                    }
                    None => return,
                };
                if data.role == SurfaceRole::Body {
                    state.input_queue.push_back(InputEvent::PointerMotion {
                        window: data.window,
                        position,
                    });
                } else {
                    // Border cursors change by corner proximity.
                    let maximized = state
                        .windows
                        .get(data.window)
                        .map(|w| w.core.maximized)
                        .unwrap_or(false);
                    show_cursor(
                        state,
                        cursor_name(data.role, position, extent, maximized),
                        serial,
                    );
                }
            }
            wl_pointer::Event::Button {
                serial,
                button,
                state: button_state,
                ..
            } => {
                let Some(data) = state.seat.pointer.as_ref().and_then(|p| p.focus) else {
                    return;
                };
                let pressed = matches!(button_state, WEnum::Value(ButtonState::Pressed));
                let position = state
                    .seat
                    .pointer
                    .as_ref()
                    .map(|p| p.position)
                    .unwrap_or(Point::new(0, 0));
                if data.role == SurfaceRole::Body {
                    if let Some(button) = PointerButton::from_raw(button) {
                        state.input_queue.push_back(InputEvent::PointerButton {
                            window: data.window,
                            button,
                            pressed,
                            position,
                        });
                    }
                } else if pressed && button == super::BTN_LEFT {
                    handle_decoration_press(state, data.window, data.role, position, serial);
                }
            }
            wl_pointer::Event::Axis { axis, value, .. } => {
                if !matches!(axis, WEnum::Value(wl_pointer::Axis::VerticalScroll)) {
                    return;
                }
                let Some(data) = state.seat.pointer.as_ref().and_then(|p| p.focus) else {
                    return;
                };
                if data.role == SurfaceRole::Body {
                    state.input_queue.push_back(InputEvent::PointerAxis {
                        window: data.window,
                        delta: value,
                    });
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<WlSurface, CursorSurfaceData> for WayletState {
    fn event(
        _state: &mut Self,
        _surface: &WlSurface,
        _event: wl_surface::Event,
        _data: &CursorSurfaceData,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Output enter/leave on the cursor surface is irrelevant.
    }
}
