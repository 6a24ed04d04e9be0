//! Presentation-time feedback.
//!
//! A feedback request travels pending state → surface (in flight for the
//! applied content) → per-view frame map (after paint) → presented or
//! discarded. Every feedback ends in exactly one of the two terminal events.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bitflags::bitflags;

use crate::core::frame_clock::{FrameInfo, FrameInfoFlags};
use crate::core::output::{Output, OutputId};
use crate::core::surface::{Surface, SurfaceId};
use crate::core::time::{refresh_interval_ns, split_timestamp};

bitflags! {
    /// `wp_presentation_feedback.kind` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PresentationFlags: u32 {
        const VSYNC = 0x1;
        const HW_CLOCK = 0x2;
        const HW_COMPLETION = 0x4;
        const ZERO_COPY = 0x8;
    }
}

impl From<FrameInfoFlags> for PresentationFlags {
    fn from(info: FrameInfoFlags) -> Self {
        let mut flags = PresentationFlags::HW_COMPLETION;
        if info.contains(FrameInfoFlags::HW_CLOCK) {
            flags |= PresentationFlags::HW_CLOCK;
        }
        if info.contains(FrameInfoFlags::ZERO_COPY) {
            flags |= PresentationFlags::ZERO_COPY;
        }
        if info.contains(FrameInfoFlags::VSYNC) {
            flags |= PresentationFlags::VSYNC;
        }
        flags
    }
}

/// Arguments of a `presented` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentedEvent {
    pub output: OutputId,
    pub tv_sec_hi: u32,
    pub tv_sec_lo: u32,
    pub tv_nsec: u32,
    pub refresh_ns: u32,
    pub seq_hi: u32,
    pub seq_lo: u32,
    pub flags: PresentationFlags,
}

/// Receiver of feedback events, usually a `wp_presentation_feedback`.
pub trait FeedbackSink {
    /// Protocol version of the feedback object.
    fn version(&self) -> u32 {
        1
    }

    fn presented(&self, event: &PresentedEvent);

    fn discarded(&self);
}

/// One feedback request, resolved exactly once.
///
/// `present` and `discard` consume the feedback; dropping it unresolved
/// sends `discarded`.
pub struct PresentationFeedback {
    surface: SurfaceId,
    sink: Option<Box<dyn FeedbackSink>>,
}

impl PresentationFeedback {
    pub fn new(surface: SurfaceId, sink: Box<dyn FeedbackSink>) -> Self {
        Self { surface, sink: Some(sink) }
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    fn version(&self) -> u32 {
        self.sink.as_ref().map_or(1, |sink| sink.version())
    }

    pub fn present(mut self, event: &PresentedEvent) {
        if let Some(sink) = self.sink.take() {
            sink.presented(event);
        }
    }

    pub fn discard(mut self) {
        if let Some(sink) = self.sink.take() {
            sink.discarded();
        }
    }
}

impl Drop for PresentationFeedback {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.discarded();
        }
    }
}

impl fmt::Debug for PresentationFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationFeedback")
            .field("surface", &self.surface)
            .field("resolved", &self.sink.is_none())
            .finish()
    }
}

/// Per-surface presentation sequence counter.
///
/// Kept monotonic across output changes: moving to another output or an
/// untrustworthy hardware sequence advances by one.
#[derive(Debug, Clone, Default)]
pub struct PresentationSequence {
    sequence: u64,
    last_output: Option<OutputId>,
    last_view_frame_counter: Option<i64>,
    last_output_sequence: u32,
    is_last_output_sequence_valid: bool,
}

impl PresentationSequence {
    pub fn value(&self) -> u64 {
        self.sequence
    }

    pub fn update(&mut self, output: OutputId, frame_info: &FrameInfo) -> u64 {
        if self.last_output == Some(output)
            && self.last_view_frame_counter == Some(frame_info.view_frame_counter)
        {
            return self.sequence;
        }
        self.last_view_frame_counter = Some(frame_info.view_frame_counter);

        let vsync = frame_info.flags.contains(FrameInfoFlags::VSYNC);
        // A zero sequence is only plausible right after a 32-bit wrap.
        let wrapped = self.is_last_output_sequence_valid && self.last_output_sequence == u32::MAX;
        if !vsync || (frame_info.sequence == 0 && !wrapped) {
            if vsync {
                tracing::warn!("Invalid sequence for vsync frame info on {}", output);
            }
            self.sequence += 1;
            self.last_output = Some(output);
            self.is_last_output_sequence_valid = false;
            return self.sequence;
        }

        let delta = if self.is_last_output_sequence_valid && self.last_output == Some(output) {
            frame_info.sequence.wrapping_sub(self.last_output_sequence)
        } else {
            1
        };

        self.sequence += delta as u64;
        self.last_output = Some(output);
        self.last_output_sequence = frame_info.sequence;
        self.is_last_output_sequence_valid = true;
        self.sequence
    }
}

/// Feedback waiting for presentation, per view and per view frame.
#[derive(Debug, Default)]
pub struct PresentationTime {
    /// Surfaces with in-flight feedback not yet collected by a paint.
    feedback_surfaces: Vec<SurfaceId>,
    feedbacks: HashMap<OutputId, BTreeMap<i64, Vec<PresentationFeedback>>>,
}

impl PresentationTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that `surface` has in-flight feedback.
    pub fn add_feedback_surface(&mut self, surface: SurfaceId) {
        if !self.feedback_surfaces.contains(&surface) {
            self.feedback_surfaces.push(surface);
        }
    }

    pub fn remove_feedback_surface(&mut self, surface: SurfaceId) {
        self.feedback_surfaces.retain(|id| *id != surface);
    }

    pub fn feedback_surfaces(&self) -> &[SurfaceId] {
        &self.feedback_surfaces
    }

    /// Number of feedbacks waiting on a view.
    pub fn pending_count(&self, view: OutputId) -> usize {
        self.feedbacks
            .get(&view)
            .map_or(0, |frames| frames.values().map(Vec::len).sum())
    }

    /// Collect in-flight feedback of the surfaces painted primarily on
    /// `view` into the map entry of `view_frame_counter`.
    pub fn after_paint(
        &mut self,
        view: OutputId,
        view_frame_counter: i64,
        surfaces: &mut HashMap<SurfaceId, Surface>,
    ) {
        let mut collected = Vec::new();
        self.feedback_surfaces.retain(|id| {
            let Some(surface) = surfaces.get_mut(id) else {
                return false;
            };
            if surface.main_output != Some(view) {
                return true;
            }
            collected.extend(surface.take_presentation_feedback());
            false
        });

        if collected.is_empty() {
            return;
        }
        tracing::trace!(
            "Collected {} presentation feedbacks for {} frame {}",
            collected.len(),
            view,
            view_frame_counter
        );
        self.feedbacks
            .entry(view)
            .or_default()
            .entry(view_frame_counter)
            .or_default()
            .extend(collected);
    }

    /// Resolve feedback for a presented view frame.
    ///
    /// Entries of the presented frame are presented, older entries were
    /// never shown and are discarded, newer entries stay queued.
    pub fn present_feedbacks(
        &mut self,
        output: &Output,
        frame_info: &FrameInfo,
        surfaces: &mut HashMap<SurfaceId, Surface>,
    ) {
        let Some(frames) = self.feedbacks.get_mut(&output.id) else {
            return;
        };

        let newer = frames.split_off(&(frame_info.view_frame_counter + 1));
        let done = std::mem::replace(frames, newer);

        for (counter, feedbacks) in done {
            if counter != frame_info.view_frame_counter {
                for feedback in feedbacks {
                    feedback.discard();
                }
                continue;
            }
            for feedback in feedbacks {
                let sequence = match surfaces.get_mut(&feedback.surface()) {
                    Some(surface) => surface.presentation_sequence.update(output.id, frame_info),
                    None => {
                        feedback.discard();
                        continue;
                    }
                };
                let event = presented_event(output, frame_info, sequence, feedback.version());
                feedback.present(&event);
            }
        }
    }

    /// Drop everything queued for a view that went away.
    pub fn discard_view(&mut self, view: OutputId) {
        if let Some(frames) = self.feedbacks.remove(&view) {
            for feedback in frames.into_values().flatten() {
                feedback.discard();
            }
        }
    }

    /// Monitors were reconfigured and all views were recreated.
    pub fn clear(&mut self) {
        let views: Vec<OutputId> = self.feedbacks.keys().copied().collect();
        for view in views {
            self.discard_view(view);
        }
    }
}

fn presented_event(
    output: &Output,
    frame_info: &FrameInfo,
    sequence: u64,
    version: u32,
) -> PresentedEvent {
    let (tv_sec_hi, tv_sec_lo, tv_nsec) = split_timestamp(frame_info.presentation_time_us);
    // Version 1 feedback requires a zero refresh for variable refresh rate.
    let refresh_ns = if output.vrr && version == 1 {
        0
    } else {
        refresh_interval_ns(frame_info.refresh_rate)
    };

    PresentedEvent {
        output: output.id,
        tv_sec_hi,
        tv_sec_lo,
        tv_nsec,
        refresh_ns,
        seq_hi: (sequence >> 32) as u32,
        seq_lo: (sequence & 0xffff_ffff) as u32,
        flags: frame_info.flags.into(),
    }
}
