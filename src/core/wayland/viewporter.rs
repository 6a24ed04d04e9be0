//! Viewporter protocol implementation.
//!
//! Lets clients crop and scale a surface's buffer independently of its
//! buffer scale and transform.

use wayland_protocols::wp::viewporter::server::{
    wp_viewport::{self, WpViewport},
    wp_viewporter::{self, WpViewporter},
};
use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_surface::WlSurface;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource};

use super::{post_error, surface_id, SurfaceData};
use crate::core::errors::ProtocolError;
use crate::core::state::CompositorState;

// ============================================================================
// Data Types
// ============================================================================

/// User data of a `wp_viewport`.
#[derive(Debug)]
pub struct ViewportData {
    pub surface: WlSurface,
}

// ============================================================================
// wp_viewporter
// ============================================================================

impl GlobalDispatch<WpViewporter, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WpViewporter>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
        tracing::debug!("Bound wp_viewporter");
    }
}

impl Dispatch<WpViewporter, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpViewporter,
        request: wp_viewporter::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wp_viewporter::Request::GetViewport { id, surface } => {
                let viewport = data_init.init(id, ViewportData { surface: surface.clone() });
                let Some(surface_id) = surface_id(&surface) else {
                    return;
                };
                if let Err(err) = state.create_viewport(surface_id) {
                    post_error(resource, wp_viewporter::Error::ViewportExists, &err);
                    return;
                }
                if let Some(data) = surface.data::<SurfaceData>() {
                    data.set_viewport(Some(viewport));
                }
                tracing::debug!("Created viewport for surface {}", surface_id);
            }
            wp_viewporter::Request::Destroy => {}
            _ => {}
        }
    }
}

// ============================================================================
// wp_viewport
// ============================================================================

impl Dispatch<WpViewport, ViewportData> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpViewport,
        request: wp_viewport::Request,
        data: &ViewportData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(id) = surface_id(&data.surface) else {
            return;
        };
        let result = match request {
            wp_viewport::Request::SetSource { x, y, width, height } => {
                state.set_viewport_source(id, x, y, width, height)
            }
            wp_viewport::Request::SetDestination { width, height } => {
                state.set_viewport_destination(id, width, height)
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            let code = match err {
                ProtocolError::InertObject { .. } => wp_viewport::Error::NoSurface,
                _ => wp_viewport::Error::BadValue,
            };
            post_error(resource, code, &err);
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, resource: &WpViewport, data: &ViewportData) {
        let Some(id) = surface_id(&data.surface) else {
            return;
        };
        // A rejected duplicate viewport must not tear down the real one.
        let Some(surface_data) = data.surface.data::<SurfaceData>() else {
            return;
        };
        if surface_data.viewport().as_ref() != Some(resource) {
            return;
        }
        surface_data.set_viewport(None);
        state.destroy_viewport(id);
    }
}

/// Register wp_viewporter global
pub fn register_viewporter(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, WpViewporter, ()>(1, ())
}
