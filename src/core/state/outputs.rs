//! Outputs and surface placement.

use std::sync::Arc;

use wayland_server::backend::ObjectId;
use wayland_server::protocol::wl_output::WlOutput;
use wayland_server::Resource;

use super::CompositorState;
use crate::core::color::ColorState;
use crate::core::output::{Output, OutputId};
use crate::core::surface::SurfaceId;

impl CompositorState {
    /// Add an output. The first output becomes the primary one.
    pub fn add_output(&mut self, name: impl Into<String>, width: i32, height: i32, refresh_rate: f32) -> OutputId {
        let id = OutputId(self.next_output_id);
        self.next_output_id += 1;

        let mut output = Output::new(id, name, width, height);
        output.refresh_rate = refresh_rate;
        tracing::info!("Added {} ({}x{} @ {} Hz)", id, width, height, refresh_rate);
        self.outputs.insert(id, output);

        if self.primary_output.is_none() {
            self.primary_output = Some(id);
        }
        id
    }

    /// Remove an output. Surfaces shown on it lose their placement and
    /// feedback queued for its frames is discarded.
    pub fn remove_output(&mut self, id: OutputId) {
        if self.outputs.remove(&id).is_none() {
            return;
        }
        self.presentation.discard_view(id);
        self.color_management.remove_output(id);
        self.output_resources.remove(&id);

        if self.primary_output == Some(id) {
            self.primary_output = self.outputs.keys().min().copied();
        }

        let placed: Vec<SurfaceId> = self
            .surfaces
            .values()
            .filter(|surface| surface.main_output == Some(id))
            .map(|surface| surface.id)
            .collect();
        for surface in placed {
            self.set_surface_main_output(surface, self.primary_output);
        }
        tracing::info!("Removed {}", id);
    }

    pub fn output(&self, id: OutputId) -> Option<&Output> {
        self.outputs.get(&id)
    }

    pub fn primary_output(&self) -> Option<OutputId> {
        self.primary_output
    }

    pub fn set_output_scale(&mut self, id: OutputId, scale: f64) {
        let Some(output) = self.outputs.get_mut(&id) else {
            return;
        };
        output.scale = scale;
        for surface in self.surfaces_on(id) {
            self.fractional_scales.update(surface, scale);
        }
    }

    pub fn set_output_refresh_rate(&mut self, id: OutputId, refresh_rate: f32, vrr: bool) {
        if let Some(output) = self.outputs.get_mut(&id) {
            output.refresh_rate = refresh_rate;
            output.vrr = vrr;
        }
    }

    /// Change the color state of an output and tell the surfaces shown on it.
    pub fn set_output_color_state(&mut self, id: OutputId, color_state: Arc<ColorState>) {
        if !self.color_management.set_output_color_state(id, color_state) {
            return;
        }
        for surface in self.surfaces_on(id) {
            if self.color_management.tracks_surface(surface) {
                self.color_management.update_preferred(surface, Some(id));
            }
        }
    }

    // =========================================================================
    // wl_output resources
    // =========================================================================

    pub fn add_output_resource(&mut self, id: OutputId, resource: WlOutput) {
        self.output_resources.entry(id).or_default().push(resource);
    }

    pub fn remove_output_resource(&mut self, id: OutputId, resource: &WlOutput) {
        if let Some(resources) = self.output_resources.get_mut(&id) {
            resources.retain(|r| r != resource);
        }
    }

    /// `wl_output` resources of `id` bound by the client owning `object`.
    pub fn client_output_resources(&self, id: OutputId, object: &ObjectId) -> Vec<WlOutput> {
        self.output_resources
            .get(&id)
            .map(|resources| {
                resources
                    .iter()
                    .filter(|r| r.id().same_client_as(object))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Output a surface is judged against: its main output, or the primary
    /// output when it has none.
    pub fn surface_output(&self, id: SurfaceId) -> Option<OutputId> {
        self.surfaces
            .get(&id)
            .and_then(|surface| surface.main_output)
            .or(self.primary_output)
    }

    /// Scale of the output the surface is judged against.
    pub fn surface_scale(&self, id: SurfaceId) -> f64 {
        self.surface_output(id)
            .and_then(|output| self.outputs.get(&output))
            .map_or(1.0, |output| output.scale)
    }

    fn surfaces_on(&self, id: OutputId) -> Vec<SurfaceId> {
        self.surfaces
            .values()
            .filter(|surface| self.surface_output(surface.id) == Some(id))
            .map(|surface| surface.id)
            .collect()
    }

    /// Move a surface to another output. Returns whether it moved.
    pub fn set_surface_main_output(&mut self, id: SurfaceId, output: Option<OutputId>) -> bool {
        let Some(surface) = self.surfaces.get_mut(&id) else {
            return false;
        };
        if surface.main_output == output {
            return false;
        }
        let previous = std::mem::replace(&mut surface.main_output, output);

        if let Some(resource) = surface.resource.clone() {
            let surface_object = resource.id();
            let bound_on = |output: Option<OutputId>| -> Vec<WlOutput> {
                output.map_or_else(Vec::new, |o| self.client_output_resources(o, &surface_object))
            };
            for wl_output in bound_on(previous) {
                resource.leave(&wl_output);
            }
            for wl_output in bound_on(output) {
                resource.enter(&wl_output);
            }
        }

        let effective = self.surface_output(id);
        if self.color_management.tracks_surface(id) {
            self.color_management.update_preferred(id, effective);
        }
        let scale = self.surface_scale(id);
        self.fractional_scales.update(id, scale);
        tracing::debug!("Surface {} main output: {:?} -> {:?}", id, previous, output);
        true
    }
}
