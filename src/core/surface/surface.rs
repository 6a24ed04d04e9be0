use std::fmt;
use std::sync::Arc;

use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_surface::WlSurface;

use super::buffer::{Buffer, Transform};
use super::commit::{apply_state, AppliedChanges, CommitOutcome, HoldReason};
use super::pending::{FrameCallback, PendingState};
use super::viewport::{check_viewport, BufferViewport, ViewportSource};
use crate::core::color::ColorState;
use crate::core::errors::{ProtocolError, ProtocolResult};
use crate::core::output::OutputId;
use crate::core::presentation::{PresentationFeedback, PresentationSequence};

/// Strongly-typed surface key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The state currently visible to the compositor.
#[derive(Debug, Clone)]
pub struct AppliedState {
    pub buffer: Option<Buffer>,
    pub scale: i32,
    pub transform: Transform,
    pub viewport: BufferViewport,
    pub color_state: Arc<ColorState>,
    /// Target time of the applied content, if the client gave one.
    pub target_time_us: Option<i64>,
}

impl AppliedState {
    fn new(color_state: Arc<ColorState>) -> Self {
        Self {
            buffer: None,
            scale: 1,
            transform: Transform::Normal,
            viewport: BufferViewport::default(),
            color_state,
            target_time_us: None,
        }
    }
}

/// Which per-surface extension objects exist; each may exist once.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurfaceExtensions {
    pub viewport: bool,
    pub fifo: bool,
    pub commit_timer: bool,
    pub fractional_scale: bool,
}

/// Represents a Wayland Surface.
pub struct Surface {
    pub id: SurfaceId,
    pub client_id: Option<ClientId>,

    /// The Wayland resource handle
    pub resource: Option<WlSurface>,

    /// The state currently visible to the compositor
    pub current: AppliedState,
    /// The state being built by client requests, to be applied on commit
    pub pending: PendingState,
    /// A commit waiting for a fifo barrier or a target time
    held: Option<PendingState>,

    fifo_barrier: bool,
    /// Feedback for the applied content, not yet collected by a paint
    presentation_feedback: Vec<PresentationFeedback>,
    pub presentation_sequence: PresentationSequence,
    /// Callbacks of the applied content, fired after its next presented frame
    frame_callbacks: Vec<FrameCallback>,

    /// Output the surface is primarily shown on
    pub main_output: Option<OutputId>,
    pub extensions: SurfaceExtensions,

    commit_count: u64,
}

impl Surface {
    pub fn new(
        id: SurfaceId,
        client_id: Option<ClientId>,
        resource: Option<WlSurface>,
        default_color_state: Arc<ColorState>,
    ) -> Self {
        Self {
            id,
            client_id,
            resource,
            current: AppliedState::new(default_color_state),
            pending: PendingState::new(),
            held: None,
            fifo_barrier: false,
            presentation_feedback: Vec::new(),
            presentation_sequence: PresentationSequence::default(),
            frame_callbacks: Vec::new(),
            main_output: None,
            extensions: SurfaceExtensions::default(),
            commit_count: 0,
        }
    }

    // =========================================================================
    // Derived state
    // =========================================================================

    /// Effective width in surface-local coordinates.
    pub fn width(&self) -> i32 {
        let viewport = &self.current.viewport;
        if let Some((width, _)) = viewport.destination {
            return width;
        }
        if let Some(source) = viewport.source {
            return source.width.ceil() as i32;
        }
        self.buffer_surface_size().map_or(0, |(width, _)| width)
    }

    /// Effective height in surface-local coordinates.
    pub fn height(&self) -> i32 {
        let viewport = &self.current.viewport;
        if let Some((_, height)) = viewport.destination {
            return height;
        }
        if let Some(source) = viewport.source {
            return source.height.ceil() as i32;
        }
        self.buffer_surface_size().map_or(0, |(_, height)| height)
    }

    fn buffer_surface_size(&self) -> Option<(i32, i32)> {
        self.current
            .buffer
            .as_ref()
            .map(|buffer| buffer.surface_size(self.current.scale, self.current.transform))
    }

    pub fn commit_count(&self) -> u64 {
        self.commit_count
    }

    pub fn has_held_commit(&self) -> bool {
        self.held.is_some()
    }

    pub fn fifo_barrier_active(&self) -> bool {
        self.fifo_barrier
    }

    pub fn has_presentation_feedback(&self) -> bool {
        !self.presentation_feedback.is_empty()
    }

    // =========================================================================
    // Pending state
    // =========================================================================

    /// Stage a buffer; `None` detaches.
    pub fn attach(&mut self, buffer: Option<Buffer>) {
        if let Some(mut replaced) = std::mem::replace(&mut self.pending.buffer, buffer) {
            if self.pending.buffer.as_ref().map(|b| b.id) != Some(replaced.id) {
                replaced.release();
            }
        }
        self.pending.newly_attached = true;
    }

    pub fn set_buffer_scale(&mut self, scale: i32) -> ProtocolResult<()> {
        if scale < 1 {
            return Err(ProtocolError::InvalidScale(scale));
        }
        self.pending.scale = Some(scale);
        Ok(())
    }

    pub fn set_buffer_transform(&mut self, transform: Transform) {
        self.pending.buffer_transform = Some(transform);
    }

    /// Viewport the next change builds on: staged, held, or applied.
    fn viewport_base(&self) -> BufferViewport {
        if self.pending.has_new_buffer_viewport {
            return self.pending.buffer_viewport;
        }
        match &self.held {
            Some(held) if held.has_new_buffer_viewport => held.buffer_viewport,
            _ => self.current.viewport,
        }
    }

    pub fn set_viewport_source(&mut self, source: Option<ViewportSource>) {
        let mut viewport = self.viewport_base();
        viewport.source = source;
        self.pending.buffer_viewport = viewport;
        self.pending.has_new_buffer_viewport = true;
    }

    pub fn set_viewport_destination(&mut self, destination: Option<(i32, i32)>) {
        let mut viewport = self.viewport_base();
        viewport.destination = destination;
        self.pending.buffer_viewport = viewport;
        self.pending.has_new_buffer_viewport = true;
    }

    /// The viewport object went away; crop and scale are unset on the next
    /// commit.
    pub fn reset_viewport(&mut self) {
        self.pending.buffer_viewport = BufferViewport::default();
        self.pending.has_new_buffer_viewport = true;
    }

    /// Stage a color state; `None` selects the default.
    pub fn set_color_state(&mut self, color_state: Option<Arc<ColorState>>) {
        self.pending.color_state = color_state;
        self.pending.has_new_color_state = true;
    }

    pub fn set_target_time(&mut self, target_time_us: i64) -> ProtocolResult<()> {
        if self.pending.has_target_time {
            return Err(ProtocolError::TimestampExists);
        }
        self.pending.target_time_us = target_time_us;
        self.pending.has_target_time = true;
        Ok(())
    }

    pub fn set_fifo_barrier(&mut self) {
        self.pending.fifo_barrier = true;
    }

    pub fn set_fifo_wait(&mut self) {
        self.pending.fifo_wait = true;
    }

    pub fn add_presentation_feedback(&mut self, feedback: PresentationFeedback) {
        self.pending.presentation_feedback_list.push(feedback);
    }

    pub fn add_frame_callback(&mut self, callback: FrameCallback) {
        self.pending.frame_callbacks.push(callback);
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Commit the pending state.
    ///
    /// The staged record is consumed whatever the outcome. While a commit is
    /// held, later commits are merged into it so content updates stay in
    /// order.
    pub fn commit(&mut self, now_us: i64, default_color_state: &Arc<ColorState>) -> ProtocolResult<CommitOutcome> {
        self.check_pending()?;
        let state = std::mem::take(&mut self.pending);
        self.commit_count += 1;

        if let Some(held) = self.held.as_mut() {
            held.merge_from(state);
            tracing::trace!("Surface {} commit merged into held commit", self.id);
            return Ok(CommitOutcome::Merged);
        }

        if let Some(reason) = self.hold_reason(&state, now_us) {
            tracing::trace!("Surface {} commit held: {:?}", self.id, reason);
            self.held = Some(state);
            return Ok(CommitOutcome::Held(reason));
        }

        let changes = apply_state(self, state, default_color_state);
        tracing::debug!(
            "Surface {} committed: {}x{}, buffer={:?}",
            self.id,
            self.width(),
            self.height(),
            self.current.buffer.as_ref().map(|b| b.id)
        );
        Ok(CommitOutcome::Applied(changes))
    }

    /// Apply the held commit if nothing blocks it any more for a frame
    /// presented at `presentation_time_us`.
    pub fn release_held(
        &mut self,
        presentation_time_us: i64,
        default_color_state: &Arc<ColorState>,
    ) -> Option<AppliedChanges> {
        let blocked = self
            .held
            .as_ref()
            .map(|held| self.hold_reason(held, presentation_time_us).is_some())?;
        if blocked {
            return None;
        }

        let held = self.held.take()?;
        let changes = apply_state(self, held, default_color_state);
        tracing::debug!("Surface {} applied held commit", self.id);
        Some(changes)
    }

    fn hold_reason(&self, state: &PendingState, now_us: i64) -> Option<HoldReason> {
        // A surface that is not on any output has no vblank to clear its
        // barrier, so it never waits.
        if state.fifo_wait && self.fifo_barrier && self.main_output.is_some() {
            return Some(HoldReason::FifoBarrier);
        }
        if state.has_target_time && state.target_time_us > now_us {
            return Some(HoldReason::TargetTime(state.target_time_us));
        }
        None
    }

    fn check_pending(&self) -> ProtocolResult<()> {
        if !self.pending.has_new_buffer_viewport && !self.pending.newly_attached {
            return Ok(());
        }
        // Validate against what will be shown: staged, then held, then
        // applied values.
        let held = self.held.as_ref();
        let viewport = self.viewport_base();
        let scale = self
            .pending
            .scale
            .or_else(|| held.and_then(|held| held.scale))
            .unwrap_or(self.current.scale);
        let transform = self
            .pending
            .buffer_transform
            .or_else(|| held.and_then(|held| held.buffer_transform))
            .unwrap_or(self.current.transform);
        let buffer = match held {
            _ if self.pending.newly_attached => self.pending.buffer.as_ref(),
            Some(held) if held.newly_attached => held.buffer.as_ref(),
            _ => self.current.buffer.as_ref(),
        };
        check_viewport(&viewport, buffer.map(|b| b.surface_size(scale, transform)))
    }

    // =========================================================================
    // Fifo and feedback
    // =========================================================================

    pub(super) fn set_fifo_barrier_active(&mut self) {
        self.fifo_barrier = true;
    }

    /// Clear the barrier on vblank. Returns whether one was active.
    pub fn clear_fifo_barrier(&mut self) -> bool {
        std::mem::replace(&mut self.fifo_barrier, false)
    }

    pub(super) fn replace_presentation_feedback(&mut self, feedback: Vec<PresentationFeedback>) {
        for old in self.presentation_feedback.drain(..) {
            old.discard();
        }
        self.presentation_feedback = feedback;
    }

    /// Hand the in-flight feedback to the frame that painted it.
    pub fn take_presentation_feedback(&mut self) -> Vec<PresentationFeedback> {
        std::mem::take(&mut self.presentation_feedback)
    }

    pub(super) fn queue_frame_callbacks(&mut self, callbacks: Vec<FrameCallback>) {
        self.frame_callbacks.extend(callbacks);
    }

    /// Callbacks of applied content, handed out once its frame is presented.
    pub fn take_frame_callbacks(&mut self) -> Vec<FrameCallback> {
        std::mem::take(&mut self.frame_callbacks)
    }

    pub fn frame_callback_count(&self) -> usize {
        self.frame_callbacks.len()
    }

    /// Discard every feedback the surface still owns.
    pub fn discard_all_feedback(&mut self) {
        self.pending.discard_presentation_feedback();
        if let Some(held) = self.held.as_mut() {
            held.discard_presentation_feedback();
        }
        for feedback in self.presentation_feedback.drain(..) {
            feedback.discard();
        }
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("size", &(self.width(), self.height()))
            .field("held", &self.held.is_some())
            .field("fifo_barrier", &self.fifo_barrier)
            .field("main_output", &self.main_output)
            .finish()
    }
}
