//! Hooks the runtime calls around every frame of a view.

use super::CompositorState;
use crate::core::frame_clock::FrameInfo;
use crate::core::output::OutputId;
use crate::core::surface::SurfaceId;

impl CompositorState {
    /// Whether a surface is painted by `view`. Unplaced surfaces go with
    /// every view so their held commits can still be released.
    fn painted_by(&self, id: SurfaceId, view: OutputId) -> bool {
        self.surfaces
            .get(&id)
            .is_some_and(|surface| surface.main_output.map_or(true, |output| output == view))
    }

    /// Apply held commits that may be shown in a frame presenting at
    /// `presentation_time_us`. Returns the number applied.
    pub fn release_held_commits(&mut self, view: OutputId, presentation_time_us: i64) -> usize {
        let default = self.color_management.default_color_state().clone();
        let held: Vec<SurfaceId> = self
            .surfaces
            .values()
            .filter(|surface| surface.has_held_commit())
            .map(|surface| surface.id)
            .filter(|id| self.painted_by(*id, view))
            .collect();

        let mut applied = 0;
        for id in held {
            let Some(surface) = self.surfaces.get_mut(&id) else {
                continue;
            };
            if let Some(changes) = surface.release_held(presentation_time_us, &default) {
                self.handle_applied(id, changes);
                applied += 1;
            }
        }
        if applied > 0 {
            tracing::trace!("Released {} held commits for {}", applied, view);
        }
        applied
    }

    pub fn has_held_commits(&self) -> bool {
        self.surfaces.values().any(|surface| surface.has_held_commit())
    }

    /// Collect in-flight feedback of the surfaces just painted on `view`.
    pub fn after_paint(&mut self, view: OutputId, view_frame_counter: i64) {
        self.presentation
            .after_paint(view, view_frame_counter, &mut self.surfaces);
    }

    /// A frame of `view` reached the screen.
    pub fn present_feedbacks(&mut self, view: OutputId, frame_info: &FrameInfo) {
        let Some(output) = self.outputs.get(&view) else {
            tracing::warn!("Presentation reported for unknown {}", view);
            return;
        };
        self.presentation
            .present_feedbacks(output, frame_info, &mut self.surfaces);
        self.fire_frame_callbacks(view, frame_info.presentation_time_us);
    }

    /// Vblank on `view`: clear the fifo barriers of the surfaces shown there.
    ///
    /// Requests a redraw when a commit waiting on a barrier can now proceed.
    pub fn clear_fifo_barriers(&mut self, view: OutputId) -> bool {
        let mut unblocked = false;
        for surface in self.surfaces.values_mut() {
            if surface.main_output != Some(view) {
                continue;
            }
            if surface.clear_fifo_barrier() && surface.has_held_commit() {
                unblocked = true;
            }
        }
        if unblocked {
            self.request_redraw();
        }
        unblocked
    }

    /// Send `wl_callback.done` to the callbacks of applied content on
    /// surfaces painted by `view`.
    fn fire_frame_callbacks(&mut self, view: OutputId, time_us: i64) {
        let time_ms = (time_us / 1000) as u32;
        let painted: Vec<SurfaceId> = self
            .surfaces
            .keys()
            .copied()
            .filter(|id| self.painted_by(*id, view))
            .collect();

        for id in painted {
            let Some(surface) = self.surfaces.get_mut(&id) else {
                continue;
            };
            for callback in surface.take_frame_callbacks() {
                callback.done(time_ms);
            }
        }
    }

    /// Committed callbacks waiting for a presented frame.
    pub fn pending_frame_callbacks(&self) -> usize {
        self.surfaces.values().map(|surface| surface.frame_callback_count()).sum()
    }
}
