//! Keyboard handling. Keycodes are forwarded raw (evdev codes); keymap
//! interpretation is left to the application.

use tracing::trace;
use wayland_client::protocol::wl_keyboard::{self, KeyState, WlKeyboard};
use wayland_client::protocol::wl_seat::WlSeat;
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle, WEnum};

use crate::state::WayletState;
use crate::window::{SurfaceData, SurfaceRole, WindowId};

use super::InputEvent;

pub(crate) struct KeyboardState {
    device: WlKeyboard,
    focus: Option<WindowId>,
}

impl KeyboardState {
    pub(crate) fn new(seat: &WlSeat, qh: &QueueHandle<WayletState>) -> Self {
        Self {
            device: seat.get_keyboard(qh, ()),
            focus: None,
        }
    }

    pub(crate) fn release(self) {
        self.device.release();
    }
}

impl Dispatch<WlKeyboard, ()> for WayletState {
    fn event(
        state: &mut Self,
        _keyboard: &WlKeyboard,
        event: wl_keyboard::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_keyboard::Event::Keymap { .. } => {
                // The mapping fd is dropped with the event; raw codes
                // are passed through untranslated.
            }
            wl_keyboard::Event::Enter { surface, .. } => {
                let window = surface
                    .data::<SurfaceData>()
                    .filter(|d| d.role == SurfaceRole::Body)
                    .map(|d| d.window);
                if let Some(k) = state.seat.keyboard.as_mut() {
                    k.focus = window;
                }
            }
            wl_keyboard::Event::Leave { .. } => {
                if let Some(k) = state.seat.keyboard.as_mut() {
                    k.focus = None;
                }
            }
            wl_keyboard::Event::Key {
                key,
                state: key_state,
                ..
            } => {
                let Some(window) = state.seat.keyboard.as_ref().and_then(|k| k.focus) else {
                    return;
                };
                let pressed = matches!(key_state, WEnum::Value(KeyState::Pressed));
                state.input_queue.push_back(InputEvent::Key {
                    window,
                    raw_code: key,
                    pressed,
                });
            }
            wl_keyboard::Event::Modifiers { mods_depressed, .. } => {
                trace!(mods_depressed, "modifier state");
            }
            _ => {}
        }
    }
}
