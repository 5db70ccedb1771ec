//! Window and surface lifecycle.
//!
//! A window owns one body surface, optional decoration sub-surfaces, an
//! xdg surface/toplevel pair and one buffer backend session. Its
//! lifetime follows `Unconfigured → AwaitingInitialConfigure →
//! Configured → (ResizePending ⇄ Configured) → Closing → Destroyed`:
//! protocol callbacks only record intent (resize target, close request),
//! and the renderer's refresh-start hook applies it, so buffers are
//! never reallocated from inside a protocol callback.
//!
//! The renderer always sees content size; the compositor negotiates the
//! decorated outer size. [`decoration_insets`] is the single source of
//! truth for the translation.

pub(crate) mod damage;
pub(crate) mod flush;

use wayland_client::protocol::wl_subsurface::WlSubsurface;
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_protocols::xdg::shell::client::xdg_surface::XdgSurface;
use wayland_protocols::xdg::shell::client::xdg_toplevel::XdgToplevel;
use waylet_core::{Insets, Point, Size};

use crate::backend::BackendSession;
use damage::DamageCache;
use flush::FlushTracker;

/// Title bar height of client-drawn decorations, in pixels.
pub(crate) const TITLE_BAR_HEIGHT: i32 = 24;
/// Border thickness of client-drawn decorations, in pixels.
pub(crate) const BORDER_SIZE: i32 = 2;
/// Margin around title-bar buttons.
pub(crate) const BUTTON_MARGIN: i32 = if TITLE_BAR_HEIGHT / 6 > BORDER_SIZE {
    TITLE_BAR_HEIGHT / 6
} else {
    BORDER_SIZE
};
/// Edge length of the square title-bar buttons.
pub(crate) const BUTTON_SIZE: i32 = TITLE_BAR_HEIGHT - 2 * BUTTON_MARGIN;
/// Distance from a border end within which a press grabs the corner
/// rather than the edge.
pub(crate) const RESIZE_CORNER_MARGIN: i32 = BORDER_SIZE * 5;

/// Stable identifier of a window slot in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub(crate) usize);

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

/// Role of a compositor surface within a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRole {
    Body,
    TitleBar,
    ButtonClose,
    ButtonMaximize,
    ButtonMinimize,
    BorderTop,
    BorderBottom,
    BorderLeft,
    BorderRight,
    Cursor,
}

impl SurfaceRole {
    pub(crate) fn is_decoration(self) -> bool {
        !matches!(self, SurfaceRole::Body | SurfaceRole::Cursor)
    }
}

/// Decoration surfaces of a decorated window, in creation order.
pub(crate) const DECORATION_ROLES: [SurfaceRole; 8] = [
    SurfaceRole::TitleBar,
    SurfaceRole::ButtonClose,
    SurfaceRole::ButtonMaximize,
    SurfaceRole::ButtonMinimize,
    SurfaceRole::BorderTop,
    SurfaceRole::BorderBottom,
    SurfaceRole::BorderLeft,
    SurfaceRole::BorderRight,
];

/// Typed user data attached to every window surface, letting dispatch
/// resolve the owning window and role without opaque pointer casts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SurfaceData {
    pub(crate) window: WindowId,
    pub(crate) role: SurfaceRole,
}

/// A compositor surface plus its optional sub-surface link. The
/// positional offset is meaningful only when `subsurface` is present.
#[derive(Debug)]
pub(crate) struct Surface {
    pub(crate) wl_surface: WlSurface,
    pub(crate) subsurface: Option<WlSubsurface>,
    pub(crate) role: SurfaceRole,
    pub(crate) size: Size,
}

impl Surface {
    pub(crate) fn destroy(&self) {
        if let Some(sub) = &self.subsurface {
            sub.destroy();
        }
        self.wl_surface.destroy();
    }
}

/// Decision returned by a window close callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Close,
    Veto,
}

/// Callback invoked from the refresh-start hook when a window has been
/// asked to close. Returning [`CloseDecision::Veto`] keeps it open.
pub type CloseCallback = Box<dyn FnMut(WindowId) -> CloseDecision + 'static>;

/// Insets added around the content area by client-drawn decorations.
pub(crate) fn decoration_insets(decorated: bool) -> Insets {
    if decorated {
        Insets::new(
            TITLE_BAR_HEIGHT + BORDER_SIZE,
            BORDER_SIZE,
            BORDER_SIZE,
            BORDER_SIZE,
        )
    } else {
        Insets::NONE
    }
}

/// Position (relative to the body surface) and size of one decoration
/// surface for a window of the given content size.
pub(crate) fn decoration_geometry(role: SurfaceRole, content: Size) -> Option<(Point, Size)> {
    let w = content.width;
    let h = content.height;
    let geom = match role {
        SurfaceRole::TitleBar => (
            Point::new(0, -TITLE_BAR_HEIGHT),
            Size::new(w, TITLE_BAR_HEIGHT),
        ),
        SurfaceRole::ButtonClose => (
            Point::new(w - BUTTON_MARGIN - BUTTON_SIZE, -TITLE_BAR_HEIGHT + BUTTON_MARGIN),
            Size::new(BUTTON_SIZE, BUTTON_SIZE),
        ),
        SurfaceRole::ButtonMaximize => (
            Point::new(
                w - 2 * (BUTTON_MARGIN + BUTTON_SIZE),
                -TITLE_BAR_HEIGHT + BUTTON_MARGIN,
            ),
            Size::new(BUTTON_SIZE, BUTTON_SIZE),
        ),
        SurfaceRole::ButtonMinimize => (
            Point::new(
                w - 3 * (BUTTON_MARGIN + BUTTON_SIZE),
                -TITLE_BAR_HEIGHT + BUTTON_MARGIN,
            ),
            Size::new(BUTTON_SIZE, BUTTON_SIZE),
        ),
        SurfaceRole::BorderTop => (
            Point::new(-BORDER_SIZE, -TITLE_BAR_HEIGHT - BORDER_SIZE),
            Size::new(w + 2 * BORDER_SIZE, BORDER_SIZE),
        ),
        SurfaceRole::BorderBottom => (
            Point::new(-BORDER_SIZE, h),
            Size::new(w + 2 * BORDER_SIZE, BORDER_SIZE),
        ),
        SurfaceRole::BorderLeft => (
            Point::new(-BORDER_SIZE, -TITLE_BAR_HEIGHT),
            Size::new(BORDER_SIZE, h + TITLE_BAR_HEIGHT),
        ),
        SurfaceRole::BorderRight => (
            Point::new(w, -TITLE_BAR_HEIGHT),
            Size::new(BORDER_SIZE, h + TITLE_BAR_HEIGHT),
        ),
        SurfaceRole::Body | SurfaceRole::Cursor => return None,
    };
    Some(geom)
}

/// Outcome of interpreting a toplevel configure size proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigureAction {
    /// Protocol violation (negative dimensions); skip the resize.
    Ignore,
    /// Size matches the current outer size; nothing to do.
    Keep,
    /// Adopt this outer size as the pending resize target.
    Resize(Size),
}

/// Interprets a toplevel configure size proposal. `(0, 0)` is
/// compositor shorthand for "keep the current size" and is translated
/// to the current outer dimensions, never treated as a literal request.
pub(crate) fn resolve_configure_size(
    width: i32,
    height: i32,
    current_outer: Size,
) -> ConfigureAction {
    if width < 0 || height < 0 {
        return ConfigureAction::Ignore;
    }
    if width == 0 && height == 0 {
        return ConfigureAction::Resize(current_outer);
    }
    let proposed = Size::new(width, height);
    if proposed == current_outer {
        ConfigureAction::Keep
    } else {
        ConfigureAction::Resize(proposed)
    }
}

/// Protocol-free window state: sizes, lifecycle flags, flush and damage
/// accounting. Kept separate from the protocol handles so the state
/// machine is testable without a compositor.
pub(crate) struct WindowCore {
    pub(crate) id: WindowId,
    /// Content size originally requested by the renderer.
    pub(crate) requested_size: Size,
    /// Current content size (what the renderer sees).
    pub(crate) content_size: Size,
    /// Pending resize target, in outer (decorated) dimensions.
    pub(crate) resize_pending: Option<Size>,
    /// First configure received and buffers allocated.
    pub(crate) configured: bool,
    /// A configure proposing new geometry has not been acknowledged yet.
    /// Gates buffer presentation and reallocation on the DMABUF path.
    pub(crate) pending_configure_ack: bool,
    pub(crate) maximized: bool,
    pub(crate) fullscreen: bool,
    pub(crate) shall_close: bool,
    /// Decorations compiled in and not disabled by the environment.
    pub(crate) decorations_enabled: bool,
    pub(crate) assigned_output: Option<usize>,
    /// Body slot handed to the renderer for drawing, pinned until it is
    /// committed or the buffer set it indexes into is replaced.
    pub(crate) acquired_slot: Option<usize>,
    pub(crate) flush: FlushTracker,
    pub(crate) damage: DamageCache,
    pub(crate) close_cb: Option<CloseCallback>,
}

impl WindowCore {
    pub(crate) fn new(id: WindowId, requested: Size, decorations_enabled: bool) -> Self {
        Self {
            id,
            requested_size: requested,
            content_size: requested,
            resize_pending: None,
            configured: false,
            pending_configure_ack: false,
            maximized: false,
            fullscreen: false,
            shall_close: false,
            decorations_enabled,
            assigned_output: None,
            acquired_slot: None,
            flush: FlushTracker::new(),
            damage: DamageCache::new(),
            close_cb: None,
        }
    }

    /// Whether decorations are currently drawn. Fullscreen windows keep
    /// their decoration surfaces detached so the committed geometry
    /// never exceeds the configured fullscreen state.
    pub(crate) fn decorated(&self) -> bool {
        self.decorations_enabled && !self.fullscreen
    }

    pub(crate) fn insets(&self) -> Insets {
        decoration_insets(self.decorated())
    }

    /// Size advertised to the compositor: content plus insets.
    pub(crate) fn outer_size(&self) -> Size {
        self.insets().outer_size(self.content_size)
    }

    /// Records a toplevel size proposal, returning the action taken.
    pub(crate) fn propose_size(&mut self, width: i32, height: i32) -> ConfigureAction {
        let action = resolve_configure_size(width, height, self.outer_size());
        match action {
            ConfigureAction::Ignore => {
                tracing::warn!(
                    window = %self.id,
                    width,
                    height,
                    "ignoring configure with negative dimensions"
                );
            }
            ConfigureAction::Keep => {}
            ConfigureAction::Resize(outer) => {
                self.resize_pending = Some(outer);
                self.pending_configure_ack = true;
            }
        }
        action
    }

    /// Content size to allocate on the first configure: the recorded
    /// compositor proposal when one arrived early (e.g. the window was
    /// maximized at creation), otherwise the originally requested size.
    pub(crate) fn initial_content_size(&mut self) -> Size {
        match self.resize_pending.take() {
            Some(outer) => self.insets().content_size(outer),
            None => self.requested_size,
        }
    }

    /// Whether the deferred resize may run this refresh cycle.
    pub(crate) fn resize_ready(&self, backend_requires_ack: bool) -> bool {
        self.resize_pending.is_some()
            && (!backend_requires_ack || !self.pending_configure_ack)
    }

    /// Slot the renderer is drawing into, acquiring one through
    /// `acquire` on first use. Releases dispatched between the draw and
    /// the committing flush free other slots; pinning keeps the commit
    /// on the slot that was actually drawn into.
    pub(crate) fn pin_slot(&mut self, acquire: impl FnOnce() -> Option<usize>) -> Option<usize> {
        if let Some(slot) = self.acquired_slot {
            return Some(slot);
        }
        let slot = acquire()?;
        self.acquired_slot = Some(slot);
        Some(slot)
    }

    /// Consumes the pinned slot for committing, falling back to a fresh
    /// acquisition when nothing was drawn through `frame_buffer`.
    pub(crate) fn take_slot(&mut self, acquire: impl FnOnce() -> Option<usize>) -> Option<usize> {
        match self.acquired_slot.take() {
            Some(slot) => Some(slot),
            None => acquire(),
        }
    }

    /// Runs the close callback, returning `true` when teardown should
    /// proceed. A veto clears the close request.
    pub(crate) fn decide_close(&mut self) -> bool {
        if !self.shall_close {
            return false;
        }
        let mut cb = self.close_cb.take();
        let decision = cb
            .as_mut()
            .map(|f| f(self.id))
            .unwrap_or(CloseDecision::Close);
        self.close_cb = cb;
        match decision {
            CloseDecision::Close => true,
            CloseDecision::Veto => {
                self.shall_close = false;
                false
            }
        }
    }
}

/// A live window: protocol handles plus the protocol-free core.
pub(crate) struct Window {
    pub(crate) core: WindowCore,
    pub(crate) body: Surface,
    pub(crate) decorations: Vec<Surface>,
    pub(crate) xdg_surface: XdgSurface,
    pub(crate) xdg_toplevel: XdgToplevel,
    pub(crate) session: Box<dyn BackendSession>,
}

/// Append-only arena of windows. Slots are never reused and removal
/// marks a slot free, so iteration order is always creation order and
/// `WindowId`s stay stable for the process lifetime.
#[derive(Default)]
pub(crate) struct WindowArena {
    slots: Vec<Option<Window>>,
}

impl WindowArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserves a slot, yielding the id before the window is built so
    /// protocol user data can reference it.
    pub(crate) fn reserve(&mut self) -> WindowId {
        self.slots.push(None);
        WindowId(self.slots.len() - 1)
    }

    pub(crate) fn install(&mut self, id: WindowId, window: Window) {
        self.slots[id.0] = Some(window);
    }

    /// Frees a reserved or occupied slot.
    pub(crate) fn remove(&mut self, id: WindowId) -> Option<Window> {
        self.slots.get_mut(id.0).and_then(Option::take)
    }

    pub(crate) fn get(&self, id: WindowId) -> Option<&Window> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Live window ids in creation order.
    pub(crate) fn ids(&self) -> Vec<WindowId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| WindowId(i)))
            .collect()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Window> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(content: Size, decorated: bool) -> WindowCore {
        WindowCore::new(WindowId(0), content, decorated)
    }

    #[test]
    fn content_plus_insets_equals_outer() {
        // Every {decorations, fullscreen} combination.
        for (decorations, fullscreen) in
            [(true, false), (true, true), (false, false), (false, true)]
        {
            let mut c = core(Size::new(800, 600), decorations);
            c.fullscreen = fullscreen;
            let outer = c.outer_size();
            assert_eq!(
                c.insets().content_size(outer),
                c.content_size,
                "decorations={decorations} fullscreen={fullscreen}"
            );
            if decorations && !fullscreen {
                assert_eq!(outer, Size::new(804, 628));
            } else {
                assert_eq!(outer, Size::new(800, 600));
            }
        }
    }

    #[test]
    fn zero_size_configure_keeps_current_size() {
        let mut c = core(Size::new(800, 600), false);
        c.configured = true;
        assert_eq!(
            c.propose_size(0, 0),
            ConfigureAction::Resize(Size::new(800, 600))
        );
        // Applying the pending target results in no content-size change.
        let outer = c.resize_pending.take().unwrap();
        assert_eq!(c.insets().content_size(outer), Size::new(800, 600));
    }

    #[test]
    fn negative_configure_is_ignored() {
        let mut c = core(Size::new(800, 600), true);
        assert_eq!(c.propose_size(-1, 600), ConfigureAction::Ignore);
        assert!(c.resize_pending.is_none());
        assert!(!c.pending_configure_ack);
    }

    #[test]
    fn matching_configure_sets_no_pending_resize() {
        let mut c = core(Size::new(800, 600), true);
        let outer = c.outer_size();
        assert_eq!(c.propose_size(outer.width, outer.height), ConfigureAction::Keep);
        assert!(c.resize_pending.is_none());
    }

    #[test]
    fn differing_configure_records_target() {
        let mut c = core(Size::new(480, 272), false);
        assert_eq!(
            c.propose_size(320, 240),
            ConfigureAction::Resize(Size::new(320, 240))
        );
        assert_eq!(c.resize_pending, Some(Size::new(320, 240)));
        assert!(c.pending_configure_ack);
    }

    #[test]
    fn initial_size_prefers_early_compositor_proposal() {
        let mut c = core(Size::new(480, 272), false);
        assert_eq!(c.initial_content_size(), Size::new(480, 272));

        let mut c = core(Size::new(480, 272), false);
        c.propose_size(1920, 1080);
        assert_eq!(c.initial_content_size(), Size::new(1920, 1080));
        assert!(c.resize_pending.is_none());
    }

    #[test]
    fn resize_waits_for_ack_when_backend_requires_it() {
        let mut c = core(Size::new(480, 272), false);
        c.propose_size(320, 240);
        assert!(c.resize_ready(false));
        assert!(!c.resize_ready(true));
        c.pending_configure_ack = false;
        assert!(c.resize_ready(true));
    }

    #[test]
    fn pinned_slot_survives_interleaved_releases() {
        let mut c = core(Size::new(480, 272), false);
        assert_eq!(c.pin_slot(|| Some(1)), Some(1));
        // A lower slot freed by dispatch in between must not change
        // which buffer the commit uses.
        assert_eq!(c.pin_slot(|| Some(0)), Some(1));
        assert_eq!(c.take_slot(|| Some(0)), Some(1));
        // Consumed: the next cycle acquires fresh.
        assert_eq!(c.take_slot(|| Some(0)), Some(0));
        assert!(c.acquired_slot.is_none());
    }

    #[test]
    fn pin_slot_reports_exhaustion_without_pinning() {
        let mut c = core(Size::new(480, 272), false);
        assert_eq!(c.pin_slot(|| None), None);
        assert!(c.acquired_slot.is_none());
    }

    #[test]
    fn close_veto_clears_flag_and_keeps_window() {
        let mut c = core(Size::new(100, 100), false);
        c.shall_close = true;
        c.close_cb = Some(Box::new(|_| CloseDecision::Veto));
        assert!(!c.decide_close());
        assert!(!c.shall_close);
        // The callback survives for the next close request.
        assert!(c.close_cb.is_some());

        c.shall_close = true;
        c.close_cb = Some(Box::new(|_| CloseDecision::Close));
        assert!(c.decide_close());
    }

    #[test]
    fn close_without_callback_proceeds() {
        let mut c = core(Size::new(100, 100), false);
        c.shall_close = true;
        assert!(c.decide_close());
    }

    #[test]
    fn decoration_geometry_spans_the_frame() {
        let content = Size::new(400, 300);
        let (pos, size) = decoration_geometry(SurfaceRole::TitleBar, content).unwrap();
        assert_eq!(pos, Point::new(0, -TITLE_BAR_HEIGHT));
        assert_eq!(size, Size::new(400, TITLE_BAR_HEIGHT));

        let (pos, size) = decoration_geometry(SurfaceRole::BorderBottom, content).unwrap();
        assert_eq!(pos, Point::new(-BORDER_SIZE, 300));
        assert_eq!(size.width, 400 + 2 * BORDER_SIZE);

        assert!(decoration_geometry(SurfaceRole::Body, content).is_none());
    }

    #[test]
    fn decoration_buttons_sit_inside_the_title_bar() {
        let content = Size::new(400, 300);
        for role in [
            SurfaceRole::ButtonClose,
            SurfaceRole::ButtonMaximize,
            SurfaceRole::ButtonMinimize,
        ] {
            let (pos, size) = decoration_geometry(role, content).unwrap();
            assert!(pos.y >= -TITLE_BAR_HEIGHT);
            assert!(pos.y + size.height <= 0);
            assert!(pos.x >= 0 && pos.x + size.width <= content.width);
        }
    }
}
