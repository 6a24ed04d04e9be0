use std::sync::Arc;

use super::pending::PendingState;
use super::surface::Surface;
use crate::core::color::ColorState;

/// Side effects of applying one pending state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppliedChanges {
    pub buffer_changed: bool,
    pub size_changed: bool,
    pub color_state_changed: bool,
    pub fifo_barrier_set: bool,
    /// The surface now has in-flight presentation feedback.
    pub has_presentation_feedback: bool,
}

/// Why a commit was not applied immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    FifoBarrier,
    TargetTime(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied(AppliedChanges),
    Held(HoldReason),
    /// Folded into the commit that was already held.
    Merged,
}

/// Performs the atomic update of a surface from a pending state.
pub fn apply_state(
    surface: &mut Surface,
    mut state: PendingState,
    default_color_state: &Arc<ColorState>,
) -> AppliedChanges {
    let old_size = (surface.width(), surface.height());
    let mut changes = AppliedChanges::default();

    if state.newly_attached {
        let new_id = state.buffer.as_ref().map(|buffer| buffer.id);
        if let Some(mut old) = std::mem::replace(&mut surface.current.buffer, state.buffer.take()) {
            if Some(old.id) != new_id {
                old.release();
            }
        }
        changes.buffer_changed = true;
    }

    if let Some(scale) = state.scale {
        surface.current.scale = scale;
    }
    if let Some(transform) = state.buffer_transform {
        surface.current.transform = transform;
    }

    if state.has_new_buffer_viewport {
        surface.current.viewport = state.buffer_viewport;
    }

    if state.has_new_color_state {
        let color_state = state
            .color_state
            .take()
            .unwrap_or_else(|| default_color_state.clone());
        changes.color_state_changed = !color_state.equals(&surface.current.color_state);
        surface.current.color_state = color_state;
    }

    if state.has_target_time {
        surface.current.target_time_us = Some(state.target_time_us);
    }

    if state.fifo_barrier {
        surface.set_fifo_barrier_active();
        changes.fifo_barrier_set = true;
    }

    // A new content update means the previous one will never be shown.
    surface.replace_presentation_feedback(std::mem::take(&mut state.presentation_feedback_list));
    changes.has_presentation_feedback = surface.has_presentation_feedback();
    surface.queue_frame_callbacks(std::mem::take(&mut state.frame_callbacks));

    changes.size_changed = old_size != (surface.width(), surface.height());
    changes
}
