//! Global compositor state.
//!
//! `CompositorState` holds all the "business logic" state of the compositor,
//! separate from the Wayland protocol mechanics. Protocol handlers call into
//! it with plain ids; the frame scheduling side calls into it from the
//! runtime around every painted frame.

use std::collections::HashMap;
use std::rc::Rc;

use wayland_server::protocol::wl_output::WlOutput;

use crate::config::CompositorConfig;
use crate::core::color::{ColorManagement, ColorState};
use crate::core::fractional_scale::FractionalScales;
use crate::core::output::{Output, OutputId};
use crate::core::presentation::PresentationTime;
use crate::core::surface::{Surface, SurfaceId};
use crate::core::time::MonotonicClock;

pub mod frames;
pub mod outputs;
pub mod surfaces;


pub struct CompositorState {
    // =========================================================================
    // Surfaces
    // =========================================================================
    pub surfaces: HashMap<SurfaceId, Surface>,
    next_surface_id: u32,

    // =========================================================================
    // Outputs
    // =========================================================================
    pub outputs: HashMap<OutputId, Output>,
    next_output_id: u32,
    primary_output: Option<OutputId>,
    /// Bound `wl_output` resources, used for `wl_surface.enter`/`leave`
    output_resources: HashMap<OutputId, Vec<WlOutput>>,

    // =========================================================================
    // Protocol state
    // =========================================================================
    pub color_management: ColorManagement,
    pub presentation: PresentationTime,
    pub fractional_scales: FractionalScales,

    redraw_requested: bool,
    clock: Rc<dyn MonotonicClock>,
    config: CompositorConfig,
}

impl CompositorState {
    pub fn new(config: CompositorConfig, clock: Rc<dyn MonotonicClock>) -> Self {
        Self {
            surfaces: HashMap::new(),
            next_surface_id: 1,
            outputs: HashMap::new(),
            next_output_id: 1,
            primary_output: None,
            output_resources: HashMap::new(),
            color_management: ColorManagement::new(ColorState::srgb()),
            presentation: PresentationTime::new(),
            fractional_scales: FractionalScales::new(),
            redraw_requested: false,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Current monotonic time.
    pub fn now_us(&self) -> i64 {
        self.clock.now_us()
    }

    pub fn clock(&self) -> Rc<dyn MonotonicClock> {
        self.clock.clone()
    }

    /// Ask for a new frame on every view.
    pub fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }

    /// Returns whether a redraw was requested since the last call.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::replace(&mut self.redraw_requested, false)
    }

    pub fn redraw_requested(&self) -> bool {
        self.redraw_requested
    }
}

impl std::fmt::Debug for CompositorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositorState")
            .field("surfaces", &self.surfaces.len())
            .field("outputs", &self.outputs.len())
            .field("primary_output", &self.primary_output)
            .field("redraw_requested", &self.redraw_requested)
            .finish()
    }
}
