//! xdg-shell integration: configure/ack handling, ping/pong, close
//! requests and the pointer gestures on client-drawn decorations.

use tracing::{debug, error, trace, warn};
use wayland_client::{Connection, Dispatch, QueueHandle};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};
use waylet_core::{Point, Size};

use crate::error::BackendError;
use crate::state::WayletState;
use crate::window::{
    decoration_geometry, SurfaceRole, Window, WindowId, RESIZE_CORNER_MARGIN,
};

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for WayletState {
    fn event(
        _state: &mut Self,
        wm_base: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            trace!(serial, "shell ping");
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, WindowId> for WayletState {
    fn event(
        state: &mut Self,
        xdg_surface: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        data: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let xdg_surface::Event::Configure { serial } = event else {
            return;
        };
        // Every configure is acknowledged immediately; the size it
        // carried was already recorded by the toplevel handler and is
        // applied at the next refresh-start.
        xdg_surface.ack_configure(serial);
        let Some(window) = state.windows.get_mut(*data) else {
            return;
        };
        window.core.pending_configure_ack = false;

        if !window.core.configured {
            let size = window.core.initial_content_size();
            if let Err(err) = window.session.init_display(size) {
                error!(window = %data, %err, "initial buffer allocation failed");
                return;
            }
            window.core.content_size = size;
            if window.core.decorated() {
                if let Err(err) = sync_decorations(window) {
                    warn!(window = %data, %err, "decoration setup failed");
                }
            }
            window.core.configured = true;
            debug!(
                window = %data,
                width = size.width,
                height = size.height,
                "initial configure complete"
            );
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, WindowId> for WayletState {
    fn event(
        state: &mut Self,
        _toplevel: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        data: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let Some(window) = state.windows.get_mut(*data) else {
            return;
        };
        match event {
            xdg_toplevel::Event::Configure {
                width,
                height,
                states,
            } => {
                let mut maximized = false;
                let mut fullscreen = false;
                for raw in states.chunks_exact(4) {
                    let value = u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]);
                    match xdg_toplevel::State::try_from(value) {
                        Ok(xdg_toplevel::State::Maximized) => maximized = true,
                        Ok(xdg_toplevel::State::Fullscreen) => fullscreen = true,
                        _ => {}
                    }
                }
                window.core.maximized = maximized;
                let was_fullscreen = window.core.fullscreen;
                window.core.fullscreen = fullscreen;
                // Fullscreen windows keep their decoration surfaces
                // detached; the flip is applied before the size is
                // interpreted so insets stay consistent.
                if window.core.decorations_enabled && was_fullscreen != fullscreen {
                    if fullscreen {
                        detach_decorations(window);
                    } else if window.core.configured {
                        if let Err(err) = sync_decorations(window) {
                            warn!(window = %data, %err, "decoration reattach failed");
                        }
                    }
                }
                window.core.propose_size(width, height);
            }
            xdg_toplevel::Event::Close => {
                debug!(window = %data, "close requested by compositor");
                window.core.shall_close = true;
            }
            _ => {}
        }
    }
}

/// Positions, fills and attaches every decoration surface for the
/// window's current content size.
pub(crate) fn sync_decorations(window: &mut Window) -> Result<(), BackendError> {
    let content = window.core.content_size;
    for surface in window.decorations.iter_mut() {
        if let Some((pos, size)) = decoration_geometry(surface.role, content) {
            if let Some(sub) = &surface.subsurface {
                sub.set_position(pos.x, pos.y);
            }
            window
                .session
                .attach_decoration(surface.role, &surface.wl_surface, size)?;
            surface.size = size;
        }
    }
    Ok(())
}

/// Detaches all decoration surfaces, leaving only the body mapped.
pub(crate) fn detach_decorations(window: &mut Window) {
    for surface in &window.decorations {
        surface.wl_surface.attach(None, 0, 0);
        surface.wl_surface.commit();
    }
}

/// Interactive resize edge for a press on a border surface, taking
/// corner proximity into account. `local` is in the border surface's
/// own coordinates.
pub(crate) fn resize_edge(
    role: SurfaceRole,
    local: Point,
    surface_size: Size,
) -> Option<xdg_toplevel::ResizeEdge> {
    use xdg_toplevel::ResizeEdge;
    let near_start = |coord: i32| coord < RESIZE_CORNER_MARGIN;
    let near_end = |coord: i32, len: i32| coord > len - RESIZE_CORNER_MARGIN;
    let edge = match role {
        SurfaceRole::BorderTop => {
            if near_start(local.x) {
                ResizeEdge::TopLeft
            } else if near_end(local.x, surface_size.width) {
                ResizeEdge::TopRight
            } else {
                ResizeEdge::Top
            }
        }
        SurfaceRole::BorderBottom => {
            if near_start(local.x) {
                ResizeEdge::BottomLeft
            } else if near_end(local.x, surface_size.width) {
                ResizeEdge::BottomRight
            } else {
                ResizeEdge::Bottom
            }
        }
        SurfaceRole::BorderLeft => {
            if near_start(local.y) {
                ResizeEdge::TopLeft
            } else if near_end(local.y, surface_size.height) {
                ResizeEdge::BottomLeft
            } else {
                ResizeEdge::Left
            }
        }
        SurfaceRole::BorderRight => {
            if near_start(local.y) {
                ResizeEdge::TopRight
            } else if near_end(local.y, surface_size.height) {
                ResizeEdge::BottomRight
            } else {
                ResizeEdge::Right
            }
        }
        _ => return None,
    };
    Some(edge)
}

/// Cursor shape name shown while hovering a window surface. Resize
/// cursors are suppressed while maximized, matching the disabled
/// resize gesture.
pub(crate) fn cursor_name(
    role: SurfaceRole,
    local: Point,
    surface_size: Size,
    maximized: bool,
) -> &'static str {
    if maximized {
        return "left_ptr";
    }
    match resize_edge(role, local, surface_size) {
        Some(xdg_toplevel::ResizeEdge::Top) => "top_side",
        Some(xdg_toplevel::ResizeEdge::Bottom) => "bottom_side",
        Some(xdg_toplevel::ResizeEdge::Left) => "left_side",
        Some(xdg_toplevel::ResizeEdge::Right) => "right_side",
        Some(xdg_toplevel::ResizeEdge::TopLeft) => "top_left_corner",
        Some(xdg_toplevel::ResizeEdge::TopRight) => "top_right_corner",
        Some(xdg_toplevel::ResizeEdge::BottomLeft) => "bottom_left_corner",
        Some(xdg_toplevel::ResizeEdge::BottomRight) => "bottom_right_corner",
        _ => "left_ptr",
    }
}

/// Reacts to a primary-button press (pointer or touch) on a decoration
/// surface: drag, resize, or one of the title-bar buttons.
pub(crate) fn handle_decoration_press(
    state: &mut WayletState,
    window_id: WindowId,
    role: SurfaceRole,
    local: Point,
    serial: u32,
) {
    let Some(seat) = state.seat.wl_seat.clone() else {
        return;
    };
    let Some(window) = state.windows.get_mut(window_id) else {
        return;
    };
    match role {
        SurfaceRole::TitleBar => {
            trace!(window = %window_id, "decoration drag start");
            window.xdg_toplevel._move(&seat, serial);
        }
        SurfaceRole::ButtonClose => {
            window.core.shall_close = true;
        }
        SurfaceRole::ButtonMaximize => {
            if window.core.maximized {
                window.xdg_toplevel.unset_maximized();
            } else {
                window.xdg_toplevel.set_maximized();
            }
        }
        SurfaceRole::ButtonMinimize => {
            window.xdg_toplevel.set_minimized();
        }
        SurfaceRole::BorderTop
        | SurfaceRole::BorderBottom
        | SurfaceRole::BorderLeft
        | SurfaceRole::BorderRight => {
            if window.core.maximized {
                return;
            }
            let surface_size = window
                .decorations
                .iter()
                .find(|s| s.role == role)
                .map(|s| s.size)
                .unwrap_or_default();
            if let Some(edge) = resize_edge(role, local, surface_size) {
                trace!(window = %window_id, ?edge, "decoration resize start");
                window.xdg_toplevel.resize(&seat, serial, edge);
            }
        }
        SurfaceRole::Body | SurfaceRole::Cursor => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::BORDER_SIZE;

    #[test]
    fn border_press_maps_to_matching_edge() {
        let size = Size::new(404, BORDER_SIZE);
        assert_eq!(
            resize_edge(SurfaceRole::BorderTop, Point::new(200, 1), size),
            Some(xdg_toplevel::ResizeEdge::Top)
        );
        assert_eq!(
            resize_edge(SurfaceRole::BorderBottom, Point::new(200, 1), size),
            Some(xdg_toplevel::ResizeEdge::Bottom)
        );
        let vertical = Size::new(BORDER_SIZE, 324);
        assert_eq!(
            resize_edge(SurfaceRole::BorderLeft, Point::new(1, 160), vertical),
            Some(xdg_toplevel::ResizeEdge::Left)
        );
        assert_eq!(
            resize_edge(SurfaceRole::BorderRight, Point::new(1, 160), vertical),
            Some(xdg_toplevel::ResizeEdge::Right)
        );
    }

    #[test]
    fn border_ends_grab_corners() {
        let size = Size::new(404, BORDER_SIZE);
        assert_eq!(
            resize_edge(SurfaceRole::BorderTop, Point::new(2, 1), size),
            Some(xdg_toplevel::ResizeEdge::TopLeft)
        );
        assert_eq!(
            resize_edge(SurfaceRole::BorderTop, Point::new(402, 1), size),
            Some(xdg_toplevel::ResizeEdge::TopRight)
        );
        assert_eq!(
            resize_edge(SurfaceRole::BorderBottom, Point::new(402, 1), size),
            Some(xdg_toplevel::ResizeEdge::BottomRight)
        );
    }

    #[test]
    fn non_border_surfaces_have_no_resize_edge() {
        let size = Size::new(400, 24);
        assert_eq!(resize_edge(SurfaceRole::TitleBar, Point::new(10, 10), size), None);
        assert_eq!(resize_edge(SurfaceRole::Body, Point::new(10, 10), size), None);
    }

    #[test]
    fn cursor_names_follow_hover_position() {
        let size = Size::new(404, BORDER_SIZE);
        assert_eq!(
            cursor_name(SurfaceRole::BorderTop, Point::new(200, 1), size, false),
            "top_side"
        );
        assert_eq!(
            cursor_name(SurfaceRole::BorderTop, Point::new(2, 1), size, false),
            "top_left_corner"
        );
        assert_eq!(
            cursor_name(SurfaceRole::TitleBar, Point::new(10, 10), size, false),
            "left_ptr"
        );
        assert_eq!(
            cursor_name(SurfaceRole::Body, Point::new(10, 10), size, false),
            "left_ptr"
        );
    }

    #[test]
    fn maximized_windows_show_no_resize_cursor() {
        let size = Size::new(404, BORDER_SIZE);
        assert_eq!(
            cursor_name(SurfaceRole::BorderTop, Point::new(200, 1), size, true),
            "left_ptr"
        );
    }
}
