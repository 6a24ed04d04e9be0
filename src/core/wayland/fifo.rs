//! FIFO protocol implementation.
//!
//! A commit carrying `wait_barrier` is held until the surface's main output
//! has shown a frame since the barrier was set.

use wayland_protocols::wp::fifo::v1::server::{
    wp_fifo_manager_v1::{self, WpFifoManagerV1},
    wp_fifo_v1::{self, WpFifoV1},
};
use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_surface::WlSurface;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New};

use super::{post_error, surface_id};
use crate::core::state::CompositorState;

// ============================================================================
// Data Types
// ============================================================================

#[derive(Debug)]
pub struct FifoData {
    pub surface: WlSurface,
}

// ============================================================================
// wp_fifo_manager_v1
// ============================================================================

impl GlobalDispatch<WpFifoManagerV1, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WpFifoManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
        tracing::debug!("Bound wp_fifo_manager_v1");
    }
}

impl Dispatch<WpFifoManagerV1, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpFifoManagerV1,
        request: wp_fifo_manager_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wp_fifo_manager_v1::Request::GetFifo { id, surface } => {
                data_init.init(id, FifoData { surface: surface.clone() });
                let Some(surface_id) = surface_id(&surface) else {
                    return;
                };
                if let Err(err) = state.create_fifo(surface_id) {
                    post_error(resource, wp_fifo_manager_v1::Error::AlreadyExists, &err);
                    return;
                }
                tracing::debug!("Created FIFO for surface {}", surface_id);
            }
            wp_fifo_manager_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

// ============================================================================
// wp_fifo_v1
// ============================================================================

impl Dispatch<WpFifoV1, FifoData> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpFifoV1,
        request: wp_fifo_v1::Request,
        data: &FifoData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(id) = surface_id(&data.surface) else {
            return;
        };
        let result = match request {
            wp_fifo_v1::Request::SetBarrier => state.fifo_set_barrier(id),
            wp_fifo_v1::Request::WaitBarrier => state.fifo_wait_barrier(id),
            _ => Ok(()),
        };
        if let Err(err) = result {
            post_error(resource, wp_fifo_v1::Error::SurfaceDestroyed, &err);
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, _resource: &WpFifoV1, data: &FifoData) {
        if let Some(id) = surface_id(&data.surface) {
            state.destroy_fifo(id);
        }
    }
}

/// Register wp_fifo_manager_v1 global
pub fn register_fifo(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, WpFifoManagerV1, ()>(1, ())
}
