//! Surface lifecycle, pending-state requests and per-surface extension
//! objects.

use std::sync::Arc;

use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_surface::WlSurface;

use super::CompositorState;
use crate::core::color::{ColorState, ImageDescription, PreferredColorSink, SinkToken};
use crate::core::errors::{ProtocolError, ProtocolResult};
use crate::core::fractional_scale::ScaleSink;
use crate::core::presentation::PresentationFeedback;
use crate::core::surface::viewport::{parse_destination, parse_source};
use crate::core::surface::{AppliedChanges, Buffer, CommitOutcome, FrameCallback, Surface, SurfaceId, Transform};
use crate::core::time::join_timestamp;

const VIEWPORT: &str = "wp_viewport";
const FIFO: &str = "wp_fifo_v1";
const COMMIT_TIMER: &str = "wp_commit_timer_v1";
const COLOR_SURFACE: &str = "wp_color_management_surface_v1";
const COLOR_FEEDBACK: &str = "wp_color_management_surface_feedback_v1";

impl CompositorState {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn create_surface(&mut self, client_id: Option<ClientId>, resource: Option<WlSurface>) -> SurfaceId {
        let id = SurfaceId(self.next_surface_id);
        self.next_surface_id += 1;
        let default = self.color_management.default_color_state().clone();
        self.surfaces.insert(id, Surface::new(id, client_id, resource, default));
        tracing::debug!("Created surface {}", id);
        id
    }

    /// Drop a surface and everything hanging off it. Outstanding feedback is
    /// discarded.
    pub fn destroy_surface(&mut self, id: SurfaceId) {
        let Some(mut surface) = self.surfaces.remove(&id) else {
            return;
        };
        surface.discard_all_feedback();
        self.presentation.remove_feedback_surface(id);
        self.color_management.remove_surface(id);
        self.fractional_scales.destroy(id);
        tracing::debug!("Destroyed surface {} after {} commits", id, surface.commit_count());
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    fn live_surface(&mut self, id: SurfaceId, interface: &'static str) -> ProtocolResult<&mut Surface> {
        self.surfaces.get_mut(&id).ok_or(ProtocolError::inert(interface))
    }

    // =========================================================================
    // wl_surface
    // =========================================================================

    pub fn attach_buffer(&mut self, id: SurfaceId, buffer: Option<Buffer>) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.attach(buffer);
        }
    }

    pub fn set_buffer_scale(&mut self, id: SurfaceId, scale: i32) -> ProtocolResult<()> {
        match self.surfaces.get_mut(&id) {
            Some(surface) => surface.set_buffer_scale(scale),
            None => Ok(()),
        }
    }

    pub fn set_buffer_transform(&mut self, id: SurfaceId, transform: Transform) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.set_buffer_transform(transform);
        }
    }

    pub fn add_frame_callback(&mut self, id: SurfaceId, callback: FrameCallback) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.add_frame_callback(callback);
        }
    }

    /// Commit the pending state of a surface.
    pub fn commit_surface(&mut self, id: SurfaceId) -> ProtocolResult<CommitOutcome> {
        let now = self.now_us();
        let default = self.color_management.default_color_state().clone();
        let outcome = self.live_surface(id, "wl_surface")?.commit(now, &default)?;

        if let CommitOutcome::Applied(changes) = outcome {
            self.handle_applied(id, changes);
        }
        // Held commits need a frame to be released.
        self.request_redraw();
        Ok(outcome)
    }

    /// Bookkeeping after a pending state became current.
    pub(super) fn handle_applied(&mut self, id: SurfaceId, changes: AppliedChanges) {
        if changes.has_presentation_feedback {
            self.presentation.add_feedback_surface(id);
        }
        if !changes.buffer_changed {
            return;
        }
        let Some(surface) = self.surfaces.get(&id) else {
            return;
        };
        let mapped = surface.current.buffer.is_some();
        let placed = surface.main_output.is_some();
        if mapped && !placed {
            if let Some(primary) = self.primary_output() {
                self.set_surface_main_output(id, Some(primary));
            }
        } else if !mapped && placed {
            self.set_surface_main_output(id, None);
        }
    }

    // =========================================================================
    // wp_viewport
    // =========================================================================

    pub fn create_viewport(&mut self, id: SurfaceId) -> ProtocolResult<()> {
        let surface = self.live_surface(id, "wp_viewporter")?;
        if surface.extensions.viewport {
            return Err(ProtocolError::ViewportExists);
        }
        surface.extensions.viewport = true;
        Ok(())
    }

    /// The viewport is gone; crop and scale are unset on the next commit.
    pub fn destroy_viewport(&mut self, id: SurfaceId) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.extensions.viewport = false;
            surface.reset_viewport();
        }
    }

    pub fn set_viewport_source(&mut self, id: SurfaceId, x: f64, y: f64, width: f64, height: f64) -> ProtocolResult<()> {
        let source = parse_source(x, y, width, height)?;
        self.live_surface(id, VIEWPORT)?.set_viewport_source(source);
        Ok(())
    }

    pub fn set_viewport_destination(&mut self, id: SurfaceId, width: i32, height: i32) -> ProtocolResult<()> {
        let destination = parse_destination(width, height)?;
        self.live_surface(id, VIEWPORT)?.set_viewport_destination(destination);
        Ok(())
    }

    // =========================================================================
    // wp_fifo_v1
    // =========================================================================

    pub fn create_fifo(&mut self, id: SurfaceId) -> ProtocolResult<()> {
        let surface = self.live_surface(id, "wp_fifo_manager_v1")?;
        if surface.extensions.fifo {
            return Err(ProtocolError::FifoExists);
        }
        surface.extensions.fifo = true;
        Ok(())
    }

    pub fn destroy_fifo(&mut self, id: SurfaceId) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.extensions.fifo = false;
        }
    }

    pub fn fifo_set_barrier(&mut self, id: SurfaceId) -> ProtocolResult<()> {
        self.live_surface(id, FIFO)?.set_fifo_barrier();
        Ok(())
    }

    pub fn fifo_wait_barrier(&mut self, id: SurfaceId) -> ProtocolResult<()> {
        self.live_surface(id, FIFO)?.set_fifo_wait();
        Ok(())
    }

    // =========================================================================
    // wp_commit_timer_v1
    // =========================================================================

    pub fn create_commit_timer(&mut self, id: SurfaceId) -> ProtocolResult<()> {
        let surface = self.live_surface(id, "wp_commit_timing_manager_v1")?;
        if surface.extensions.commit_timer {
            return Err(ProtocolError::CommitTimerExists);
        }
        surface.extensions.commit_timer = true;
        Ok(())
    }

    pub fn destroy_commit_timer(&mut self, id: SurfaceId) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.extensions.commit_timer = false;
        }
    }

    pub fn commit_timer_set_timestamp(
        &mut self,
        id: SurfaceId,
        tv_sec_hi: u32,
        tv_sec_lo: u32,
        tv_nsec: u32,
    ) -> ProtocolResult<()> {
        let surface = self.live_surface(id, COMMIT_TIMER)?;
        let target = join_timestamp(tv_sec_hi, tv_sec_lo, tv_nsec)?;
        surface.set_target_time(target)
    }

    // =========================================================================
    // wp_fractional_scale_v1
    // =========================================================================

    pub fn create_fractional_scale(&mut self, id: SurfaceId, sink: Box<dyn ScaleSink>) -> ProtocolResult<()> {
        let scale = self.surface_scale(id);
        let surface = self.live_surface(id, "wp_fractional_scale_manager_v1")?;
        if surface.extensions.fractional_scale {
            return Err(ProtocolError::FractionalScaleExists);
        }
        surface.extensions.fractional_scale = true;
        self.fractional_scales.create(id, sink, scale)
    }

    pub fn destroy_fractional_scale(&mut self, id: SurfaceId) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.extensions.fractional_scale = false;
        }
        self.fractional_scales.destroy(id);
    }

    // =========================================================================
    // wp_presentation
    // =========================================================================

    /// Stage a feedback request. On a dead surface it is discarded at once.
    pub fn add_presentation_feedback(&mut self, id: SurfaceId, feedback: PresentationFeedback) {
        match self.surfaces.get_mut(&id) {
            Some(surface) => surface.add_presentation_feedback(feedback),
            None => feedback.discard(),
        }
    }

    // =========================================================================
    // wp_color_management_surface_v1
    // =========================================================================

    pub fn create_color_surface(&mut self, id: SurfaceId) -> ProtocolResult<()> {
        self.live_surface(id, "wp_color_manager_v1")?;
        self.color_management.create_color_surface(id)
    }

    /// The color surface is gone; the image description is unset on the next
    /// commit.
    pub fn destroy_color_surface(&mut self, id: SurfaceId) {
        self.color_management.destroy_color_surface(id);
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.set_color_state(None);
        }
    }

    pub fn set_surface_image_description(
        &mut self,
        id: SurfaceId,
        description: &ImageDescription,
        render_intent: u32,
    ) -> ProtocolResult<()> {
        self.live_surface(id, COLOR_SURFACE)?;
        let color_state = self
            .color_management
            .image_description_color_state(description, render_intent)?;
        self.live_surface(id, COLOR_SURFACE)?.set_color_state(Some(color_state));
        Ok(())
    }

    pub fn unset_surface_image_description(&mut self, id: SurfaceId) -> ProtocolResult<()> {
        self.live_surface(id, COLOR_SURFACE)?.set_color_state(None);
        Ok(())
    }

    /// Register a surface feedback object and compute the initial preferred
    /// color state.
    pub fn add_color_feedback(&mut self, id: SurfaceId, sink: Box<dyn PreferredColorSink>) -> SinkToken {
        let output = self.surface_output(id);
        let token = self.color_management.add_feedback(id, sink);
        self.color_management.preferred_color_state(id, output);
        token
    }

    pub fn remove_color_feedback(&mut self, id: SurfaceId, token: SinkToken) {
        self.color_management.remove_feedback(id, token);
    }

    pub fn preferred_image_description(&mut self, id: SurfaceId) -> ProtocolResult<ImageDescription> {
        if !self.surfaces.contains_key(&id) {
            return Err(ProtocolError::inert(COLOR_FEEDBACK));
        }
        let output = self.surface_output(id);
        let color_state = self.color_management.preferred_color_state(id, output);
        Ok(ImageDescription::ready(color_state, true))
    }

    pub fn surface_color_state(&self, id: SurfaceId) -> Option<Arc<ColorState>> {
        self.surfaces.get(&id).map(|surface| surface.current.color_state.clone())
    }
}
