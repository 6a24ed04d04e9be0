//! Runtime and event loop integration.
//!
//! The runtime owns one stage view per output, each with its own frame
//! clock. Every `tick` it:
//! - runs deferred tasks
//! - resolves headless vblanks (presentation feedback, fifo barriers)
//! - turns coalesced redraw requests into frame clock updates
//! - dispatches the clocks that are due
//!
//! Real display backends report presentation through `notify_presented`
//! instead of the headless vblank.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::config::FrameClockConfig;
use crate::core::frame_clock::{
    FrameClock, FrameClockState, FrameContext, FrameInfo, FrameInfoFlags, FrameListener, FrameResult,
};
use crate::core::output::{Output, OutputId};
use crate::core::state::CompositorState;
use crate::core::time::MonotonicClock;

// ============================================================================
// Task System
// ============================================================================

/// A task to be executed by the runtime
pub type Task = Box<dyn FnOnce(&mut CompositorState)>;

/// Task queue for deferred execution
#[derive(Default)]
pub struct TaskQueue {
    tasks: RefCell<VecDeque<Task>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }

    pub fn take_all(&self) -> Vec<Task> {
        self.tasks.borrow_mut().drain(..).collect()
    }

    pub fn has_tasks(&self) -> bool {
        !self.tasks.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_tasks()
    }
}

/// Single-shot coalescing flag: any number of requests before the flush
/// collapse into one.
#[derive(Debug, Default)]
pub struct DeferredFlush {
    queued: Cell<bool>,
    flushes: Cell<u64>,
}

impl DeferredFlush {
    /// Returns true if this request queued a new flush.
    pub fn queue(&self) -> bool {
        !self.queued.replace(true)
    }

    pub fn is_queued(&self) -> bool {
        self.queued.get()
    }

    /// Returns true if a flush was queued, and consumes it.
    pub fn take(&self) -> bool {
        let queued = self.queued.replace(false);
        if queued {
            self.flushes.set(self.flushes.get() + 1);
        }
        queued
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes.get()
    }
}

// ============================================================================
// Stage Views
// ============================================================================

/// Frame listener of a stage view. Paints when the view has damage.
struct StagePainter {
    view: OutputId,
    damaged: Rc<Cell<bool>>,
}

impl FrameListener for StagePainter {
    fn frame(&mut self, _ctx: &mut FrameContext, frame_count: i64, time_us: i64) -> FrameResult {
        if !self.damaged.replace(false) {
            return FrameResult::Idle;
        }
        tracing::trace!("Painting {} frame {} at {}", self.view, frame_count, time_us);
        FrameResult::PendingPresented
    }
}

/// A submitted headless frame waiting for its simulated vblank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingVblank {
    frame_count: i64,
    presentation_time_us: i64,
}

/// The part of the stage that paints one output.
pub struct StageView {
    id: OutputId,
    clock: FrameClock,
    damaged: Rc<Cell<bool>>,
    headless: bool,
    pending_vblank: Option<PendingVblank>,
    vblank_sequence: u32,
}

impl StageView {
    fn new(output: &Output, config: &FrameClockConfig, time_source: Rc<dyn MonotonicClock>, headless: bool) -> Self {
        let damaged = Rc::new(Cell::new(false));
        let painter = StagePainter { view: output.id, damaged: damaged.clone() };
        let refresh_rate = if output.refresh_rate > 0.0 {
            output.refresh_rate
        } else {
            config.refresh_rate
        };
        let clock = FrameClock::new(refresh_rate, Box::new(painter), time_source)
            .with_sync_delay(config.sync_delay_us);
        Self {
            id: output.id,
            clock,
            damaged,
            headless,
            pending_vblank: None,
            vblank_sequence: 0,
        }
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut FrameClock {
        &mut self.clock
    }

    pub fn is_headless(&self) -> bool {
        self.headless
    }

    fn damage(&mut self) {
        self.damaged.set(true);
        self.clock.schedule_update();
    }

    /// Earliest time this view needs the event loop again.
    fn next_wakeup_us(&self) -> Option<i64> {
        let vblank = self.pending_vblank.map(|v| v.presentation_time_us);
        let ready = self.clock.ready_time_us();
        match (vblank, ready) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn vblank_frame_info(&mut self, vblank: PendingVblank) -> FrameInfo {
        self.vblank_sequence = self.vblank_sequence.wrapping_add(1).max(1);
        FrameInfo {
            view_frame_counter: vblank.frame_count,
            presentation_time_us: vblank.presentation_time_us,
            refresh_rate: self.clock.refresh_rate(),
            flags: FrameInfoFlags::VSYNC,
            sequence: self.vblank_sequence,
        }
    }
}

// ============================================================================
// Main Runtime
// ============================================================================

/// The compositor runtime.
///
/// Platform adapters should:
/// 1. Call `tick()` whenever `time_until_next_frame()` elapses or clients
///    were dispatched
/// 2. Call `notify_presented()` for views that are not headless
pub struct Runtime {
    tasks: TaskQueue,
    redraw: DeferredFlush,
    views: Vec<StageView>,
    time_source: Rc<dyn MonotonicClock>,
    frame_clock_config: FrameClockConfig,
}

impl Runtime {
    pub fn new(time_source: Rc<dyn MonotonicClock>, frame_clock_config: FrameClockConfig) -> Self {
        Self {
            tasks: TaskQueue::new(),
            redraw: DeferredFlush::default(),
            views: Vec::new(),
            time_source,
            frame_clock_config,
        }
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Create the stage view of an output.
    pub fn add_view(&mut self, output: &Output, headless: bool) {
        if self.view(output.id).is_some() {
            tracing::warn!("{} already has a stage view", output.id);
            return;
        }
        let view = StageView::new(output, &self.frame_clock_config, self.time_source.clone(), headless);
        crate::wlog!(crate::util::logging::RUNTIME, "Stage view for {} at {} Hz", output.id, view.clock.refresh_rate());
        self.views.push(view);
    }

    /// Tear down the view of an output. Its clock is destroyed and feedback
    /// waiting on its frames is discarded.
    pub fn remove_view(&mut self, id: OutputId, state: &mut CompositorState) {
        let Some(index) = self.views.iter().position(|view| view.id == id) else {
            return;
        };
        let mut view = self.views.remove(index);
        view.clock.destroy();
        state.presentation.discard_view(id);
        tracing::info!("Removed stage view for {}", id);
    }

    pub fn view(&self, id: OutputId) -> Option<&StageView> {
        self.views.iter().find(|view| view.id == id)
    }

    pub fn view_mut(&mut self, id: OutputId) -> Option<&mut StageView> {
        self.views.iter_mut().find(|view| view.id == id)
    }

    pub fn views(&self) -> &[StageView] {
        &self.views
    }

    // =========================================================================
    // Task Management
    // =========================================================================

    pub fn queue_task<F>(&self, task: F)
    where
        F: FnOnce(&mut CompositorState) + 'static,
    {
        self.tasks.push(Box::new(task));
    }

    pub fn execute_tasks(&mut self, state: &mut CompositorState) {
        for task in self.tasks.take_all() {
            task(state);
        }
    }

    // =========================================================================
    // Frame Scheduling
    // =========================================================================

    /// Request a redraw on every view. Coalesced until the next tick.
    pub fn request_redraw(&self) {
        self.redraw.queue();
    }

    /// Run one iteration of the loop. Returns the number of frames painted.
    pub fn tick(&mut self, state: &mut CompositorState) -> usize {
        self.execute_tasks(state);
        let now = self.time_source.now_us();

        for index in 0..self.views.len() {
            self.resolve_headless_vblank(index, now, state);
        }

        if state.take_redraw_request() {
            self.redraw.queue();
        }
        if self.redraw.take() {
            for view in &mut self.views {
                view.damage();
            }
        }

        let mut painted = 0;
        for view in &mut self.views {
            if !view.clock.is_due(now) {
                continue;
            }
            let target = view.clock.next_presentation_time_us().unwrap_or(now);
            state.release_held_commits(view.id, target);

            let Some(dispatch) = view.clock.dispatch(now) else {
                continue;
            };
            if dispatch.result != FrameResult::PendingPresented {
                continue;
            }
            state.after_paint(view.id, dispatch.frame_count);
            // Held commits need further frames to reach their target.
            if state.has_held_commits() {
                view.damage();
            }
            if view.headless {
                view.pending_vblank = Some(PendingVblank {
                    frame_count: dispatch.frame_count,
                    presentation_time_us: target.max(now),
                });
            }
            painted += 1;
        }
        painted
    }

    fn resolve_headless_vblank(&mut self, index: usize, now: i64, state: &mut CompositorState) {
        let view = &mut self.views[index];
        let Some(vblank) = view.pending_vblank else {
            return;
        };
        if vblank.presentation_time_us > now {
            return;
        }
        view.pending_vblank = None;
        let frame_info = view.vblank_frame_info(vblank);
        let id = view.id;
        self.notify_presented(id, &frame_info, state);
    }

    /// A frame of `id` reached the screen.
    pub fn notify_presented(&mut self, id: OutputId, frame_info: &FrameInfo, state: &mut CompositorState) {
        let Some(view) = self.view_mut(id) else {
            tracing::warn!("Presentation reported for {} without a stage view", id);
            return;
        };
        if view.clock.state() != FrameClockState::PendingPresentation {
            tracing::warn!("Presentation reported for {} while its clock is {:?}", id, view.clock.state());
        }
        view.clock.notify_presented(frame_info);
        state.present_feedbacks(id, frame_info);
        state.clear_fifo_barriers(id);
    }

    /// Time until the loop has work to do, `None` when fully idle.
    pub fn time_until_next_frame(&self) -> Option<Duration> {
        if self.redraw.is_queued() || self.tasks.has_tasks() {
            return Some(Duration::ZERO);
        }
        let now = self.time_source.now_us();
        self.views
            .iter()
            .filter_map(StageView::next_wakeup_us)
            .min()
            .map(|wakeup| Duration::from_micros((wakeup - now).max(0) as u64))
    }
}

// ============================================================================
// Tests
// ============================================================================
