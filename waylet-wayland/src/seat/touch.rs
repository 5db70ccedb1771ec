//! Touch handling. Contacts on the body reach the input queue;
//! contacts on decorations trigger the same shell gestures as pointer
//! presses, so decorated windows stay usable on touch-only devices.

use wayland_client::protocol::wl_seat::WlSeat;
use wayland_client::protocol::wl_touch::{self, WlTouch};
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle};

use crate::state::WayletState;
use crate::window::{SurfaceData, SurfaceRole};
use crate::xdg_shell::handle_decoration_press;

use super::{clamp_to_surface, surface_extent, InputEvent};

pub(crate) struct TouchState {
    device: WlTouch,
    /// Surface of the most recent contact; all live contacts are routed
    /// through it.
    focus: Option<SurfaceData>,
}

impl TouchState {
    pub(crate) fn new(seat: &WlSeat, qh: &QueueHandle<WayletState>) -> Self {
        Self {
            device: seat.get_touch(qh, ()),
            focus: None,
        }
    }

    pub(crate) fn release(self) {
        self.device.release();
    }
}

impl Dispatch<WlTouch, ()> for WayletState {
    fn event(
        state: &mut Self,
        _touch: &WlTouch,
        event: wl_touch::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_touch::Event::Down {
                serial,
                surface,
                id,
                x,
                y,
                ..
            } => {
                let data = surface.data::<SurfaceData>().copied();
                if let Some(t) = state.seat.touch.as_mut() {
                    t.focus = data;
                }
                let Some(data) = data else { return };
                let extent = surface_extent(state, data.window, data.role);
                let position = clamp_to_surface(x, y, extent);
                if data.role == SurfaceRole::Body {
                    state.input_queue.push_back(InputEvent::TouchDown {
                        window: data.window,
                        id,
                        position,
                    });
                } else {
                    handle_decoration_press(state, data.window, data.role, position, serial);
                }
            }
            wl_touch::Event::Up { id, .. } => {
                let Some(data) = state.seat.touch.as_ref().and_then(|t| t.focus) else {
                    return;
                };
                if data.role == SurfaceRole::Body {
                    state.input_queue.push_back(InputEvent::TouchUp {
                        window: data.window,
                        id,
                    });
                }
            }
            wl_touch::Event::Motion { id, x, y, .. } => {
                let Some(data) = state.seat.touch.as_ref().and_then(|t| t.focus) else {
                    return;
                };
                if data.role == SurfaceRole::Body {
                    let extent = surface_extent(state, data.window, data.role);
                    state.input_queue.push_back(InputEvent::TouchMotion {
                        window: data.window,
                        id,
                        position: clamp_to_surface(x, y, extent),
                    });
                }
            }
            wl_touch::Event::Cancel => {
                if let Some(t) = state.seat.touch.as_mut() {
                    t.focus = None;
                }
            }
            _ => {}
        }
    }
}
