//! Color management registry: default and per-output color states, and the
//! preferred color state of every surface that asked for one.

use std::collections::HashMap;
use std::sync::Arc;

use super::color_state::ColorState;
use super::image_description::{FailureCause, ImageDescription};
use super::wire;
use crate::core::errors::{ProtocolError, ProtocolResult};
use crate::core::output::OutputId;
use crate::core::surface::SurfaceId;

/// Receiver of `preferred_changed` for one surface feedback object.
pub trait PreferredColorSink {
    fn preferred_changed(&self, identity: u32);
}

/// Receiver of `image_description_changed` for one color-management output.
pub trait OutputColorSink {
    fn image_description_changed(&self);
}

/// Handle returned when registering a sink, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkToken(u64);

#[derive(Default)]
struct ColorSurface {
    has_color_surface: bool,
    preferred: Option<Arc<ColorState>>,
    feedbacks: Vec<(SinkToken, Box<dyn PreferredColorSink>)>,
}

pub struct ColorManagement {
    default_color_state: Arc<ColorState>,
    output_color_states: HashMap<OutputId, Arc<ColorState>>,
    output_sinks: HashMap<OutputId, Vec<(SinkToken, Box<dyn OutputColorSink>)>>,
    surfaces: HashMap<SurfaceId, ColorSurface>,
    next_token: u64,
}

impl ColorManagement {
    pub fn new(default_color_state: Arc<ColorState>) -> Self {
        Self {
            default_color_state,
            output_color_states: HashMap::new(),
            output_sinks: HashMap::new(),
            surfaces: HashMap::new(),
            next_token: 1,
        }
    }

    pub fn default_color_state(&self) -> &Arc<ColorState> {
        &self.default_color_state
    }

    /// Color state of an output, or the default when the output has none.
    pub fn output_color_state(&self, output: OutputId) -> &Arc<ColorState> {
        self.output_color_states
            .get(&output)
            .unwrap_or(&self.default_color_state)
    }

    fn next_token(&mut self) -> SinkToken {
        let token = SinkToken(self.next_token);
        self.next_token += 1;
        token
    }

    // =========================================================================
    // Advertisement
    // =========================================================================

    pub fn supported_intents(&self) -> &'static [u32] {
        &[wire::RENDER_INTENT_PERCEPTUAL]
    }

    pub fn supported_features(&self) -> &'static [u32] {
        &[wire::FEATURE_ICC_V2_V4, wire::FEATURE_PARAMETRIC, wire::FEATURE_SET_LUMINANCES]
    }

    pub fn supported_tf_named(&self) -> &'static [u32] {
        &[wire::TF_SRGB, wire::TF_ST2084_PQ]
    }

    pub fn supported_primaries_named(&self) -> &'static [u32] {
        &[wire::PRIMARIES_SRGB, wire::PRIMARIES_BT2020]
    }

    // =========================================================================
    // Outputs
    // =========================================================================

    pub fn add_output_sink(&mut self, output: OutputId, sink: Box<dyn OutputColorSink>) -> SinkToken {
        let token = self.next_token();
        self.output_sinks.entry(output).or_default().push((token, sink));
        token
    }

    pub fn remove_output_sink(&mut self, output: OutputId, token: SinkToken) {
        if let Some(sinks) = self.output_sinks.get_mut(&output) {
            sinks.retain(|(t, _)| *t != token);
        }
    }

    /// Change the color state of an output. Returns whether it changed.
    pub fn set_output_color_state(&mut self, output: OutputId, color_state: Arc<ColorState>) -> bool {
        if self.output_color_state(output).equals(&color_state) {
            self.output_color_states.insert(output, color_state);
            return false;
        }
        self.output_color_states.insert(output, color_state);

        if let Some(sinks) = self.output_sinks.get(&output) {
            for (_, sink) in sinks {
                sink.image_description_changed();
            }
        }
        tracing::debug!("Color state of {} changed", output);
        true
    }

    pub fn remove_output(&mut self, output: OutputId) {
        self.output_color_states.remove(&output);
        self.output_sinks.remove(&output);
    }

    /// Image description for a color-management output object.
    pub fn output_image_description(&self, output: Option<OutputId>) -> ImageDescription {
        match output {
            Some(output) => ImageDescription::ready(self.output_color_state(output).clone(), true),
            None => ImageDescription::failed(FailureCause::NoOutput, "the output has been removed"),
        }
    }

    // =========================================================================
    // Surfaces
    // =========================================================================

    /// Create the color-management surface object for `surface`.
    pub fn create_color_surface(&mut self, surface: SurfaceId) -> ProtocolResult<()> {
        let entry = self.surfaces.entry(surface).or_default();
        if entry.has_color_surface {
            return Err(ProtocolError::ColorSurfaceExists);
        }
        entry.has_color_surface = true;
        Ok(())
    }

    pub fn destroy_color_surface(&mut self, surface: SurfaceId) {
        if let Some(entry) = self.surfaces.get_mut(&surface) {
            entry.has_color_surface = false;
        }
    }

    /// Validate a `set_image_description` request and return the color state
    /// to stage as pending.
    pub fn image_description_color_state(
        &self,
        description: &ImageDescription,
        render_intent: u32,
    ) -> ProtocolResult<Arc<ColorState>> {
        let color_state = description.ready_color_state()?;
        if render_intent != wire::RENDER_INTENT_PERCEPTUAL {
            return Err(ProtocolError::RenderIntent(render_intent));
        }
        Ok(color_state.clone())
    }

    pub fn add_feedback(&mut self, surface: SurfaceId, sink: Box<dyn PreferredColorSink>) -> SinkToken {
        let token = self.next_token();
        self.surfaces.entry(surface).or_default().feedbacks.push((token, sink));
        token
    }

    pub fn remove_feedback(&mut self, surface: SurfaceId, token: SinkToken) {
        if let Some(entry) = self.surfaces.get_mut(&surface) {
            entry.feedbacks.retain(|(t, _)| *t != token);
        }
    }

    /// Preferred color state of a surface, computed on first use.
    pub fn preferred_color_state(&mut self, surface: SurfaceId, output: Option<OutputId>) -> Arc<ColorState> {
        let has_preferred = self
            .surfaces
            .get(&surface)
            .is_some_and(|entry| entry.preferred.is_some());
        if !has_preferred {
            self.update_preferred(surface, output);
        }
        self.surfaces
            .get(&surface)
            .and_then(|entry| entry.preferred.clone())
            .unwrap_or_else(|| self.default_color_state.clone())
    }

    /// Recompute the preferred color state from the surface's output.
    ///
    /// Feedback objects are told about changes, except for the very first
    /// computation.
    pub fn update_preferred(&mut self, surface: SurfaceId, output: Option<OutputId>) {
        let color_state = match output {
            Some(output) => self.output_color_state(output).clone(),
            None => self.default_color_state.clone(),
        };

        let entry = self.surfaces.entry(surface).or_default();
        let initial = match &entry.preferred {
            Some(current) if current.equals(&color_state) => return,
            Some(_) => false,
            None => true,
        };

        let identity = color_state.id();
        entry.preferred = Some(color_state);
        if initial {
            return;
        }

        tracing::debug!("Preferred color state of surface {} changed to {}", surface, identity);
        for (_, sink) in &entry.feedbacks {
            sink.preferred_changed(identity);
        }
    }

    /// Whether `update_preferred` would have anything to notify.
    pub fn tracks_surface(&self, surface: SurfaceId) -> bool {
        self.surfaces.contains_key(&surface)
    }

    /// The wl_surface is gone.
    pub fn remove_surface(&mut self, surface: SurfaceId) {
        self.surfaces.remove(&surface);
    }
}
