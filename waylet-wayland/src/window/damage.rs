//! Bounded per-window damage cache.
//!
//! When the renderer flushes partial regions, the damaged rectangles
//! must be re-applied to the compositor surface on the commit that
//! finally rotates the buffer. The cache is a fixed-capacity ring;
//! overflowing it degrades to a single full-surface invalidation so
//! damage is never dropped silently and never grows without bound.

use waylet_core::{Rect, Size};

/// Fixed capacity of the damage ring.
pub(crate) const DAMAGE_CACHE_CAPACITY: usize = 32;

#[derive(Debug)]
pub(crate) struct DamageCache {
    rects: Vec<Rect>,
    capacity: usize,
    overflowed: bool,
}

impl DamageCache {
    pub(crate) fn new() -> Self {
        Self::with_capacity(DAMAGE_CACHE_CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self { rects: Vec::with_capacity(capacity), capacity, overflowed: false }
    }

    /// Records a damaged region. On overflow all pending entries are
    /// replaced by a full-surface invalidation.
    pub(crate) fn push(&mut self, rect: Rect) {
        if self.overflowed || rect.is_empty() {
            return;
        }
        if self.rects.len() == self.capacity {
            self.rects.clear();
            self.overflowed = true;
            tracing::debug!("damage cache overflow, degrading to full-surface invalidation");
            return;
        }
        self.rects.push(rect);
    }

    pub(crate) fn len(&self) -> usize {
        self.rects.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0 && !self.overflowed
    }

    /// Takes all pending damage for a surface of `surface_size`,
    /// leaving the cache empty.
    pub(crate) fn drain(&mut self, surface_size: Size) -> Vec<Rect> {
        if self.overflowed {
            self.overflowed = false;
            self.rects.clear();
            return vec![Rect::from_size(surface_size)];
        }
        std::mem::take(&mut self.rects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_rects_up_to_capacity() {
        let mut cache = DamageCache::with_capacity(4);
        for i in 0..4 {
            cache.push(Rect::new(i, i, 10, 10));
        }
        assert_eq!(cache.len(), 4);
        let rects = cache.drain(Size::new(100, 100));
        assert_eq!(rects.len(), 4);
        assert!(cache.is_empty());
    }

    #[test]
    fn overflow_degrades_to_full_surface() {
        let mut cache = DamageCache::with_capacity(4);
        for i in 0..10 {
            cache.push(Rect::new(i, 0, 1, 1));
        }
        // Size never exceeds capacity.
        assert!(cache.len() <= 4);
        let rects = cache.drain(Size::new(480, 272));
        assert_eq!(rects, vec![Rect::new(0, 0, 480, 272)]);
        // Drained cache starts collecting again.
        cache.push(Rect::new(1, 1, 2, 2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn empty_rects_are_ignored() {
        let mut cache = DamageCache::new();
        cache.push(Rect::new(0, 0, 0, 10));
        assert!(cache.is_empty());
    }
}
