//! Flush and frame-callback accounting.
//!
//! A frame may be synthesized from several partial flush calls before a
//! single commit, so completion is tracked per frame (count-based), not
//! per buffer. The frame counter only ever advances when the compositor
//! fires the one-shot frame callback for a committed frame.

#[derive(Debug, Default)]
pub(crate) struct FlushTracker {
    /// Number of frames the compositor has finished consuming.
    pub(crate) frame_counter: u32,
    /// A commit happened and the transport still needs flushing.
    pub(crate) flush_pending: bool,
    /// Frame callbacks registered but not yet fired.
    frames_in_flight: u32,
    /// Renderer-visible completion latch.
    complete: bool,
}

impl FlushTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records that a buffer was attached and committed with a frame
    /// callback registered.
    pub(crate) fn commit_submitted(&mut self) {
        self.frames_in_flight += 1;
        self.flush_pending = true;
        self.complete = false;
    }

    /// Handles the compositor's frame callback.
    pub(crate) fn frame_done(&mut self) {
        self.frame_counter = self.frame_counter.wrapping_add(1);
        self.frames_in_flight = self.frames_in_flight.saturating_sub(1);
    }

    /// Marks the current flush complete towards the renderer. Driven by
    /// the frame callback, or by buffer release on the SHM path.
    pub(crate) fn mark_complete(&mut self) {
        self.complete = true;
    }

    /// Consumes the completion latch.
    pub(crate) fn take_complete(&mut self) -> bool {
        std::mem::replace(&mut self.complete, false)
    }

    pub(crate) fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_advances_only_on_frame_callback() {
        let mut t = FlushTracker::new();
        t.commit_submitted();
        assert_eq!(t.frame_counter, 0);

        // A second commit without the callback firing must not advance
        // the counter.
        t.commit_submitted();
        assert_eq!(t.frame_counter, 0);
        assert_eq!(t.frames_in_flight(), 2);

        t.frame_done();
        assert_eq!(t.frame_counter, 1);
        t.frame_done();
        assert_eq!(t.frame_counter, 2);
        assert_eq!(t.frames_in_flight(), 0);
    }

    #[test]
    fn completion_latch_is_consumed_once() {
        let mut t = FlushTracker::new();
        t.commit_submitted();
        assert!(!t.take_complete());
        t.frame_done();
        t.mark_complete();
        assert!(t.take_complete());
        assert!(!t.take_complete());
    }

    #[test]
    fn new_commit_clears_completion() {
        let mut t = FlushTracker::new();
        t.commit_submitted();
        t.frame_done();
        t.mark_complete();
        t.commit_submitted();
        assert!(!t.take_complete());
    }
}
