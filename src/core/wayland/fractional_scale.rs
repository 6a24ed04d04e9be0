//! Fractional Scale protocol implementation.
//!
//! Clients receive the scale of the output their surface is shown on, in
//! 120ths (120 = 1.0, 180 = 1.5).

use wayland_protocols::wp::fractional_scale::v1::server::{
    wp_fractional_scale_manager_v1::{self, WpFractionalScaleManagerV1},
    wp_fractional_scale_v1::{self, WpFractionalScaleV1},
};
use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_surface::WlSurface;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource};

use super::{post_error, surface_id};
use crate::core::fractional_scale::ScaleSink;
use crate::core::state::CompositorState;

// ============================================================================
// Data Types
// ============================================================================

/// Data stored with fractional scale object
#[derive(Debug)]
pub struct FractionalScaleData {
    pub surface: WlSurface,
}

impl ScaleSink for WpFractionalScaleV1 {
    fn preferred_scale(&self, scale_120: u32) {
        if self.is_alive() {
            WpFractionalScaleV1::preferred_scale(self, scale_120);
        }
    }
}

// ============================================================================
// wp_fractional_scale_manager_v1
// ============================================================================

impl GlobalDispatch<WpFractionalScaleManagerV1, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WpFractionalScaleManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
        tracing::debug!("Bound wp_fractional_scale_manager_v1");
    }
}

impl Dispatch<WpFractionalScaleManagerV1, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpFractionalScaleManagerV1,
        request: wp_fractional_scale_manager_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wp_fractional_scale_manager_v1::Request::GetFractionalScale { id, surface } => {
                let fractional_scale = data_init.init(id, FractionalScaleData { surface: surface.clone() });
                let Some(surface_id) = surface_id(&surface) else {
                    return;
                };
                if let Err(err) = state.create_fractional_scale(surface_id, Box::new(fractional_scale)) {
                    post_error(
                        resource,
                        wp_fractional_scale_manager_v1::Error::FractionalScaleExists,
                        &err,
                    );
                    return;
                }
                tracing::debug!("Created fractional scale for surface {}", surface_id);
            }
            wp_fractional_scale_manager_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

// ============================================================================
// wp_fractional_scale_v1
// ============================================================================

impl Dispatch<WpFractionalScaleV1, FractionalScaleData> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WpFractionalScaleV1,
        request: wp_fractional_scale_v1::Request,
        _data: &FractionalScaleData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wp_fractional_scale_v1::Request::Destroy => {}
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: ClientId,
        _resource: &WpFractionalScaleV1,
        data: &FractionalScaleData,
    ) {
        if let Some(id) = surface_id(&data.surface) {
            state.destroy_fractional_scale(id);
        }
    }
}

/// Register wp_fractional_scale_manager_v1 global
pub fn register_fractional_scale(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, WpFractionalScaleManagerV1, ()>(1, ())
}
