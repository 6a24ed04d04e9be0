//! Collaborator traits and data exchanged with a [`FrameClock`](super::FrameClock).

use bitflags::bitflags;

/// Outcome of a frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameResult {
    /// Content was submitted; the clock waits for `notify_presented`.
    PendingPresented,
    /// Nothing was submitted; the clock goes straight back to idle.
    Idle,
}

bitflags! {
    /// Properties of a presented frame as reported by the backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameInfoFlags: u32 {
        /// Timestamp comes from the display hardware clock.
        const HW_CLOCK = 1 << 0;
        /// Client buffer was scanned out directly.
        const ZERO_COPY = 1 << 1;
        /// Presentation was synchronized to vertical blank.
        const VSYNC = 1 << 2;
    }
}

/// Presentation report for one view frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Frame counter of the view at the time of painting.
    pub view_frame_counter: i64,
    /// Monotonic presentation time in microseconds.
    pub presentation_time_us: i64,
    /// Refresh rate of the output in Hz.
    pub refresh_rate: f32,
    pub flags: FrameInfoFlags,
    /// Hardware vblank sequence, meaningful with `VSYNC`.
    pub sequence: u32,
}

/// Handle given to listener callbacks.
///
/// Update requests made from inside a callback are applied once the
/// callback has returned.
#[derive(Debug, Clone)]
pub struct FrameContext {
    frame_count: i64,
    target_presentation_time_us: Option<i64>,
    pub(super) reschedule: bool,
    pub(super) reschedule_now: bool,
}

impl FrameContext {
    pub(super) fn new(frame_count: i64, target_presentation_time_us: Option<i64>) -> Self {
        Self {
            frame_count,
            target_presentation_time_us,
            reschedule: false,
            reschedule_now: false,
        }
    }

    pub fn frame_count(&self) -> i64 {
        self.frame_count
    }

    /// Predicted presentation time of the frame being painted.
    pub fn target_presentation_time_us(&self) -> Option<i64> {
        self.target_presentation_time_us
    }

    /// Ask for another frame at the next eligible update time.
    pub fn schedule_update(&mut self) {
        self.reschedule = true;
    }

    /// Ask for another frame as soon as the clock is idle again.
    pub fn schedule_update_now(&mut self) {
        self.reschedule = true;
        self.reschedule_now = true;
    }
}

/// The paint side of a frame clock.
pub trait FrameListener {
    /// Runs before `frame` for every dispatch.
    fn before_frame(&mut self, _ctx: &mut FrameContext, _frame_count: i64) {}

    fn frame(&mut self, ctx: &mut FrameContext, frame_count: i64, time_us: i64) -> FrameResult;
}

/// External source of dispatch timing.
///
/// When a driver is installed the clock does not compute its own ready time
/// for polling; the driver is told to arm and disarm and calls
/// `FrameClock::dispatch` itself.
pub trait FrameClockDriver {
    fn schedule_update(&mut self);
    fn unschedule_update(&mut self);
}
