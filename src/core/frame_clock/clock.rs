use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::driver::{FrameClockDriver, FrameContext, FrameInfo, FrameListener, FrameResult};
use crate::core::time::{is_valid_refresh_rate, refresh_interval_us, MonotonicClock};

/// Default margin between the end of rendering and the vblank.
pub const DEFAULT_SYNC_DELAY_US: i64 = 2_000;

/// Rate used when a clock is created with an unusable one.
pub const FALLBACK_REFRESH_RATE: f32 = 60.0;

/// Scheduling state of a [`FrameClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClockState {
    Init,
    Idle,
    Scheduled,
    Dispatching,
    PendingPresentation,
    Inhibited,
}

/// Result of a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDispatch {
    pub frame_count: i64,
    pub result: FrameResult,
}

/// Frame clock shared between a view and the objects that observe it.
pub type SharedFrameClock = Rc<RefCell<FrameClock>>;

/// Per-view frame clock.
///
/// Decides when the next frame is painted and drives the listener through
/// `before_frame` and `frame`. A frame that submits content keeps the clock
/// in `PendingPresentation` until the backend reports it with
/// `notify_presented` or `notify_ready`.
pub struct FrameClock {
    refresh_rate: f32,
    refresh_interval_us: i64,
    sync_delay_us: i64,

    state: FrameClockState,
    frame_count: i64,
    inhibit_count: u32,
    pending_reschedule: bool,
    pending_reschedule_now: bool,

    last_presentation_time_us: Option<i64>,
    last_dispatch_time_us: Option<i64>,
    ready_time_us: Option<i64>,
    next_presentation_time_us: Option<i64>,

    driver: Option<Box<dyn FrameClockDriver>>,
    listener: Option<Box<dyn FrameListener>>,
    time_source: Rc<dyn MonotonicClock>,

    destroy_handlers: Vec<Box<dyn FnOnce()>>,
    destroyed: bool,
}

impl FrameClock {
    pub fn new(
        refresh_rate: f32,
        listener: Box<dyn FrameListener>,
        time_source: Rc<dyn MonotonicClock>,
    ) -> Self {
        let refresh_rate = if is_valid_refresh_rate(refresh_rate) {
            refresh_rate
        } else {
            tracing::warn!("Invalid refresh rate {}, using {}", refresh_rate, FALLBACK_REFRESH_RATE);
            FALLBACK_REFRESH_RATE
        };
        Self {
            refresh_rate,
            refresh_interval_us: refresh_interval_us(refresh_rate),
            sync_delay_us: DEFAULT_SYNC_DELAY_US,
            state: FrameClockState::Init,
            frame_count: 0,
            inhibit_count: 0,
            pending_reschedule: false,
            pending_reschedule_now: false,
            last_presentation_time_us: None,
            last_dispatch_time_us: None,
            ready_time_us: None,
            next_presentation_time_us: None,
            driver: None,
            listener: Some(listener),
            time_source,
            destroy_handlers: Vec::new(),
            destroyed: false,
        }
    }

    pub fn new_shared(
        refresh_rate: f32,
        listener: Box<dyn FrameListener>,
        time_source: Rc<dyn MonotonicClock>,
    ) -> SharedFrameClock {
        Rc::new(RefCell::new(Self::new(refresh_rate, listener, time_source)))
    }

    pub fn with_sync_delay(mut self, sync_delay_us: i64) -> Self {
        self.sync_delay_us = sync_delay_us.max(0);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> FrameClockState {
        self.state
    }

    /// Counter that the next dispatch will hand to the listener.
    pub fn frame_count(&self) -> i64 {
        self.frame_count
    }

    pub fn refresh_rate(&self) -> f32 {
        self.refresh_rate
    }

    pub fn refresh_interval_us(&self) -> i64 {
        self.refresh_interval_us
    }

    pub fn is_inhibited(&self) -> bool {
        self.inhibit_count > 0
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn has_driver(&self) -> bool {
        self.driver.is_some()
    }

    pub fn last_presentation_time_us(&self) -> Option<i64> {
        self.last_presentation_time_us
    }

    pub fn last_dispatch_time_us(&self) -> Option<i64> {
        self.last_dispatch_time_us
    }

    /// Time at which a timer-driven clock wants to be dispatched.
    pub fn ready_time_us(&self) -> Option<i64> {
        if self.state == FrameClockState::Scheduled {
            self.ready_time_us
        } else {
            None
        }
    }

    /// Predicted presentation time of the scheduled frame.
    pub fn next_presentation_time_us(&self) -> Option<i64> {
        self.next_presentation_time_us
    }

    /// Whether the event loop should dispatch a timer-driven clock now.
    pub fn is_due(&self, now_us: i64) -> bool {
        self.driver.is_none() && self.ready_time_us().is_some_and(|ready| ready <= now_us)
    }

    pub fn set_refresh_rate(&mut self, refresh_rate: f32) {
        if !is_valid_refresh_rate(refresh_rate) {
            tracing::warn!("Ignoring invalid refresh rate {}", refresh_rate);
            return;
        }
        self.refresh_rate = refresh_rate;
        self.refresh_interval_us = refresh_interval_us(refresh_rate);
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Request a frame at the next update time.
    pub fn schedule_update(&mut self) {
        if self.destroyed {
            return;
        }
        if self.inhibit_count > 0 {
            self.pending_reschedule = true;
            return;
        }

        match self.state {
            FrameClockState::Init | FrameClockState::Idle | FrameClockState::Inhibited => {
                let now = self.time_source.now_us();
                let (update_time, presentation_time) = self.compute_next_update_time(now);
                self.arm(update_time, presentation_time);
            }
            FrameClockState::Scheduled => {}
            FrameClockState::Dispatching | FrameClockState::PendingPresentation => {
                self.pending_reschedule = true;
            }
        }
    }

    /// Request a frame as soon as possible.
    pub fn schedule_update_now(&mut self) {
        if self.destroyed {
            return;
        }
        if self.inhibit_count > 0 {
            self.pending_reschedule = true;
            self.pending_reschedule_now = true;
            return;
        }

        match self.state {
            FrameClockState::Init
            | FrameClockState::Idle
            | FrameClockState::Inhibited
            | FrameClockState::Scheduled => {
                if self.state == FrameClockState::Scheduled {
                    self.unschedule();
                }
                let now = self.time_source.now_us();
                let presentation_time = now + self.refresh_interval_us;
                self.arm(now, presentation_time);
            }
            FrameClockState::Dispatching | FrameClockState::PendingPresentation => {
                self.pending_reschedule = true;
                self.pending_reschedule_now = true;
            }
        }
    }

    /// Swap the timing driver; an outstanding schedule moves to the new one.
    pub fn set_driver(&mut self, driver: Option<Box<dyn FrameClockDriver>>) {
        let scheduled = self.state == FrameClockState::Scheduled;
        if scheduled {
            if let Some(old) = self.driver.as_mut() {
                old.unschedule_update();
            }
        }
        self.driver = driver;
        if scheduled {
            if let Some(new) = self.driver.as_mut() {
                new.schedule_update();
            }
        }
        tracing::debug!(
            "Frame clock driver replaced (external={}, frame_count={})",
            self.driver.is_some(),
            self.frame_count
        );
    }

    pub fn inhibit(&mut self) {
        self.inhibit_count += 1;
        if self.inhibit_count > 1 {
            return;
        }

        match self.state {
            FrameClockState::Scheduled => {
                self.unschedule();
                self.pending_reschedule = true;
                self.state = FrameClockState::Inhibited;
            }
            FrameClockState::Init | FrameClockState::Idle => {
                self.state = FrameClockState::Inhibited;
            }
            // In-flight frames still resolve through notify_presented.
            FrameClockState::Dispatching
            | FrameClockState::PendingPresentation
            | FrameClockState::Inhibited => {}
        }
    }

    pub fn uninhibit(&mut self) {
        assert!(self.inhibit_count > 0, "frame clock uninhibited more often than inhibited");
        self.inhibit_count -= 1;
        if self.inhibit_count > 0 {
            return;
        }

        if self.state == FrameClockState::Inhibited {
            self.state = FrameClockState::Idle;
        }
        self.maybe_reschedule_update();
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Paint one frame.
    ///
    /// Panics when the clock is not scheduled or is inhibited. Returns `None`
    /// once the clock has been destroyed.
    pub fn dispatch(&mut self, time_us: i64) -> Option<FrameDispatch> {
        if self.destroyed {
            tracing::warn!("Dispatch on a destroyed frame clock ignored");
            return None;
        }
        assert!(self.inhibit_count == 0, "frame clock dispatched while inhibited");
        assert_eq!(
            self.state,
            FrameClockState::Scheduled,
            "frame clock dispatched outside of the scheduled state"
        );

        let frame_count = self.frame_count;
        self.frame_count += 1;
        self.state = FrameClockState::Dispatching;
        self.ready_time_us = None;
        self.last_dispatch_time_us = Some(time_us);

        let mut ctx = FrameContext::new(frame_count, self.next_presentation_time_us);
        let result = match self.listener.as_mut() {
            Some(listener) => {
                listener.before_frame(&mut ctx, frame_count);
                listener.frame(&mut ctx, frame_count, time_us)
            }
            None => FrameResult::Idle,
        };

        if ctx.reschedule {
            self.pending_reschedule = true;
        }
        if ctx.reschedule_now {
            self.pending_reschedule_now = true;
        }

        match result {
            FrameResult::PendingPresented => {
                self.state = FrameClockState::PendingPresentation;
            }
            FrameResult::Idle => {
                self.state = FrameClockState::Idle;
                self.maybe_reschedule_update();
            }
        }

        Some(FrameDispatch { frame_count, result })
    }

    /// The frame submitted by the last dispatch reached the screen.
    pub fn notify_presented(&mut self, frame_info: &FrameInfo) {
        if frame_info.presentation_time_us > 0 {
            self.last_presentation_time_us = Some(frame_info.presentation_time_us);
        }
        if frame_info.refresh_rate > 1.0
            && (frame_info.refresh_rate - self.refresh_rate).abs() > f32::EPSILON
        {
            self.set_refresh_rate(frame_info.refresh_rate);
        }
        self.finish_frame("presented");
    }

    /// The submitted frame completed without presentation timing.
    pub fn notify_ready(&mut self) {
        self.finish_frame("ready");
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Register a callback that runs once when the clock is destroyed.
    pub fn connect_destroy(&mut self, handler: impl FnOnce() + 'static) {
        if self.destroyed {
            tracing::debug!("Destroy handler connected to an already destroyed frame clock");
            return;
        }
        self.destroy_handlers.push(Box::new(handler));
    }

    /// Tear the clock down. Safe to call more than once; dropping the clock
    /// calls it too.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if self.state == FrameClockState::Scheduled {
            self.unschedule();
        }
        self.listener = None;

        for handler in self.destroy_handlers.drain(..) {
            handler();
        }
        tracing::debug!("Frame clock destroyed after {} frames", self.frame_count);
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn finish_frame(&mut self, how: &str) {
        match self.state {
            FrameClockState::Dispatching | FrameClockState::PendingPresentation => {
                self.state = if self.inhibit_count > 0 {
                    FrameClockState::Inhibited
                } else {
                    FrameClockState::Idle
                };
                self.maybe_reschedule_update();
            }
            state => {
                tracing::warn!("Frame clock notified {} in unexpected state {:?}", how, state);
            }
        }
    }

    fn maybe_reschedule_update(&mut self) {
        if !self.pending_reschedule && !self.pending_reschedule_now {
            return;
        }
        let now = self.pending_reschedule_now;
        self.pending_reschedule = false;
        self.pending_reschedule_now = false;

        if now {
            self.schedule_update_now();
        } else {
            self.schedule_update();
        }
    }

    fn arm(&mut self, update_time_us: i64, presentation_time_us: i64) {
        self.ready_time_us = Some(update_time_us);
        self.next_presentation_time_us = Some(presentation_time_us);
        self.state = FrameClockState::Scheduled;
        if let Some(driver) = self.driver.as_mut() {
            driver.schedule_update();
        }
    }

    fn unschedule(&mut self) {
        self.ready_time_us = None;
        if let Some(driver) = self.driver.as_mut() {
            driver.unschedule_update();
        }
    }

    /// Returns `(update_time, presentation_time)`.
    ///
    /// The presentation time is the first vblank after the last presentation
    /// that still leaves half a refresh interval of render time; the update
    /// happens one render time before it.
    fn compute_next_update_time(&self, now_us: i64) -> (i64, i64) {
        let interval = self.refresh_interval_us;
        let Some(last_presentation) = self.last_presentation_time_us else {
            return (now_us, now_us + interval);
        };

        let max_render_time = (interval - self.sync_delay_us).max(0);
        let min_render_time = (interval / 2).min(max_render_time);

        let mut next_presentation = last_presentation + interval;
        if next_presentation < now_us {
            let missed = (now_us - next_presentation) / interval;
            next_presentation += missed * interval;
        }
        while next_presentation < now_us + min_render_time {
            next_presentation += interval;
        }

        (next_presentation - max_render_time, next_presentation)
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameClock")
            .field("state", &self.state)
            .field("frame_count", &self.frame_count)
            .field("refresh_rate", &self.refresh_rate)
            .field("inhibit_count", &self.inhibit_count)
            .field("ready_time_us", &self.ready_time_us)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
