use std::fmt;
use std::sync::Arc;

use super::buffer::{Buffer, Transform};
use super::viewport::BufferViewport;
use crate::core::color::ColorState;
use crate::core::presentation::PresentationFeedback;

/// Receiver of `done`, usually a `wl_callback` from `wl_surface.frame`.
pub trait FrameCallbackSink {
    fn done(&self, time_ms: u32);
}

/// A frame callback travelling with the content update it was requested for.
pub struct FrameCallback(Box<dyn FrameCallbackSink>);

impl FrameCallback {
    pub fn new(sink: Box<dyn FrameCallbackSink>) -> Self {
        Self(sink)
    }

    pub fn done(self, time_ms: u32) {
        self.0.done(time_ms);
    }
}

impl fmt::Debug for FrameCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FrameCallback")
    }
}

/// State staged by client requests and applied atomically on commit.
///
/// The `has_*` flags distinguish "not touched" from "set to the default";
/// only touched fields overwrite the applied state.
#[derive(Debug, Default)]
pub struct PendingState {
    pub newly_attached: bool,
    pub buffer: Option<Buffer>,
    pub scale: Option<i32>,
    pub buffer_transform: Option<Transform>,

    pub has_new_buffer_viewport: bool,
    pub buffer_viewport: BufferViewport,

    pub has_new_color_state: bool,
    /// `None` selects the process-wide default color state.
    pub color_state: Option<Arc<ColorState>>,

    pub has_target_time: bool,
    pub target_time_us: i64,

    pub fifo_barrier: bool,
    pub fifo_wait: bool,

    /// In arrival order.
    pub presentation_feedback_list: Vec<PresentationFeedback>,
    pub frame_callbacks: Vec<FrameCallback>,
}

impl PendingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a newer commit into this (held) one. Later values win; the
    /// content this state described never reaches the screen, so its
    /// feedback is discarded and its replaced buffer released.
    pub fn merge_from(&mut self, mut newer: PendingState) {
        if newer.newly_attached {
            let new_id = newer.buffer.as_ref().map(|buffer| buffer.id);
            if let Some(mut replaced) = std::mem::replace(&mut self.buffer, newer.buffer.take()) {
                if Some(replaced.id) != new_id {
                    replaced.release();
                }
            }
            self.newly_attached = true;
        }

        if newer.scale.is_some() {
            self.scale = newer.scale;
        }
        if newer.buffer_transform.is_some() {
            self.buffer_transform = newer.buffer_transform;
        }

        if newer.has_new_buffer_viewport {
            self.buffer_viewport = newer.buffer_viewport;
            self.has_new_buffer_viewport = true;
        }

        if newer.has_new_color_state {
            self.color_state = newer.color_state.take();
            self.has_new_color_state = true;
        }

        if newer.has_target_time {
            self.target_time_us = newer.target_time_us;
            self.has_target_time = true;
        }

        self.fifo_barrier |= newer.fifo_barrier;
        self.fifo_wait |= newer.fifo_wait;

        self.discard_presentation_feedback();
        self.presentation_feedback_list = std::mem::take(&mut newer.presentation_feedback_list);
        // Every callback still wants the frame that shows the merged result.
        self.frame_callbacks.append(&mut newer.frame_callbacks);
    }

    pub fn discard_presentation_feedback(&mut self) {
        for feedback in self.presentation_feedback_list.drain(..) {
            feedback.discard();
        }
    }
}
