//! Seat handling and the input event queue.
//!
//! Input devices are created and released lazily from the seat's
//! capability announcements. Events targeting a window body are
//! translated into [`InputEvent`]s and queued for the application;
//! events on decoration surfaces drive shell gestures (drag, resize,
//! title-bar buttons) and never reach the queue.

pub(crate) mod keyboard;
pub(crate) mod pointer;
pub(crate) mod touch;

use tracing::{debug, trace};
use wayland_client::protocol::wl_seat::{self, Capability, WlSeat};
use wayland_client::{Connection, Dispatch, QueueHandle, WEnum};
use waylet_core::{Point, Size};

use crate::state::WayletState;
use crate::window::{SurfaceRole, WindowId};

pub(crate) use keyboard::KeyboardState;
pub(crate) use pointer::PointerState;
pub(crate) use touch::TouchState;

/// Pointer buttons reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

pub(crate) const BTN_LEFT: u32 = 0x110;
pub(crate) const BTN_RIGHT: u32 = 0x111;
pub(crate) const BTN_MIDDLE: u32 = 0x112;

impl PointerButton {
    pub(crate) fn from_raw(code: u32) -> Option<Self> {
        match code {
            BTN_LEFT => Some(PointerButton::Left),
            BTN_RIGHT => Some(PointerButton::Right),
            BTN_MIDDLE => Some(PointerButton::Middle),
            _ => None,
        }
    }
}

/// An input event targeting a window's content area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerMotion {
        window: WindowId,
        position: Point,
    },
    PointerButton {
        window: WindowId,
        button: PointerButton,
        pressed: bool,
        position: Point,
    },
    /// Vertical scroll; positive values scroll down.
    PointerAxis {
        window: WindowId,
        delta: f64,
    },
    TouchDown {
        window: WindowId,
        id: i32,
        position: Point,
    },
    TouchMotion {
        window: WindowId,
        id: i32,
        position: Point,
    },
    TouchUp {
        window: WindowId,
        id: i32,
    },
    /// Raw evdev keycode; no keymap translation is applied.
    Key {
        window: WindowId,
        raw_code: u32,
        pressed: bool,
    },
}

/// Devices bound from the seat, present only while the seat advertises
/// the matching capability.
#[derive(Default)]
pub(crate) struct SeatState {
    pub(crate) wl_seat: Option<WlSeat>,
    pub(crate) name: Option<String>,
    pub(crate) pointer: Option<PointerState>,
    pub(crate) touch: Option<TouchState>,
    pub(crate) keyboard: Option<KeyboardState>,
}

impl SeatState {
    pub(crate) fn release(&mut self) {
        if let Some(p) = self.pointer.take() {
            p.release();
        }
        if let Some(t) = self.touch.take() {
            t.release();
        }
        if let Some(k) = self.keyboard.take() {
            k.release();
        }
        if let Some(seat) = self.wl_seat.take() {
            seat.release();
        }
    }
}

impl Dispatch<WlSeat, ()> for WayletState {
    fn event(
        state: &mut Self,
        seat: &WlSeat,
        event: wl_seat::Event,
        _data: &(),
        conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_seat::Event::Capabilities {
                capabilities: WEnum::Value(caps),
            } => {
                debug!(?caps, "seat capabilities");
                if caps.contains(Capability::Pointer) {
                    if state.seat.pointer.is_none() {
                        let compositor = state.globals.compositor.clone();
                        let shm = state.globals.shm.clone();
                        state.seat.pointer =
                            Some(PointerState::new(&compositor, shm, seat, conn, qh));
                    }
                } else if let Some(p) = state.seat.pointer.take() {
                    p.release();
                }
                if caps.contains(Capability::Touch) {
                    if state.seat.touch.is_none() {
                        state.seat.touch = Some(TouchState::new(seat, qh));
                    }
                } else if let Some(t) = state.seat.touch.take() {
                    t.release();
                }
                if caps.contains(Capability::Keyboard) {
                    if state.seat.keyboard.is_none() {
                        state.seat.keyboard = Some(KeyboardState::new(seat, qh));
                    }
                } else if let Some(k) = state.seat.keyboard.take() {
                    k.release();
                }
            }
            wl_seat::Event::Name { name } => {
                trace!(%name, "seat name");
                state.seat.name = Some(name);
            }
            _ => {}
        }
    }
}

/// Clamps a device position to the hovered surface's bounds, matching
/// how the window content is addressed.
pub(crate) fn clamp_to_surface(x: f64, y: f64, size: Size) -> Point {
    let clamp = |v: f64, max: i32| -> i32 {
        let max = (max - 1).max(0);
        (v as i32).clamp(0, max)
    };
    Point::new(clamp(x, size.width), clamp(y, size.height))
}

/// Size of the surface a `SurfaceData` refers to: the content area for
/// the body, the decoration's own extent otherwise.
pub(crate) fn surface_extent(
    state: &WayletState,
    window: WindowId,
    role: SurfaceRole,
) -> Size {
    let Some(win) = state.windows.get(window) else {
        return Size::new(0, 0);
    };
    match role {
        SurfaceRole::Body => win.core.content_size,
        _ => win
            .decorations
            .iter()
            .find(|s| s.role == role)
            .map(|s| s.size)
            .unwrap_or(win.core.content_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_clamp_to_surface_bounds() {
        let size = Size::new(800, 600);
        assert_eq!(clamp_to_surface(-5.0, -5.0, size), Point::new(0, 0));
        assert_eq!(clamp_to_surface(400.5, 300.5, size), Point::new(400, 300));
        assert_eq!(clamp_to_surface(900.0, 700.0, size), Point::new(799, 599));
    }

    #[test]
    fn raw_button_codes_map_to_known_buttons() {
        assert_eq!(PointerButton::from_raw(BTN_LEFT), Some(PointerButton::Left));
        assert_eq!(PointerButton::from_raw(BTN_RIGHT), Some(PointerButton::Right));
        assert_eq!(
            PointerButton::from_raw(BTN_MIDDLE),
            Some(PointerButton::Middle)
        );
        assert_eq!(PointerButton::from_raw(0x113), None);
    }
}
