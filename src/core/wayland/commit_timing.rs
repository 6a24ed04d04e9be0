//! Commit Timing protocol implementation.
//!
//! A commit carrying a timestamp is not applied before the frame whose
//! presentation time reaches it.

use wayland_protocols::wp::commit_timing::v1::server::{
    wp_commit_timer_v1::{self, WpCommitTimerV1},
    wp_commit_timing_manager_v1::{self, WpCommitTimingManagerV1},
};
use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_surface::WlSurface;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New};

use super::{post_error, surface_id};
use crate::core::errors::ProtocolError;
use crate::core::state::CompositorState;

// ============================================================================
// Data Types
// ============================================================================

#[derive(Debug)]
pub struct CommitTimerData {
    pub surface: WlSurface,
}

// ============================================================================
// wp_commit_timing_manager_v1
// ============================================================================

impl GlobalDispatch<WpCommitTimingManagerV1, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WpCommitTimingManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
        tracing::debug!("Bound wp_commit_timing_manager_v1");
    }
}

impl Dispatch<WpCommitTimingManagerV1, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpCommitTimingManagerV1,
        request: wp_commit_timing_manager_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wp_commit_timing_manager_v1::Request::GetTimer { id, surface } => {
                data_init.init(id, CommitTimerData { surface: surface.clone() });
                let Some(surface_id) = surface_id(&surface) else {
                    return;
                };
                if let Err(err) = state.create_commit_timer(surface_id) {
                    post_error(resource, wp_commit_timing_manager_v1::Error::CommitTimerExists, &err);
                    return;
                }
                tracing::debug!("Created commit timer for surface {}", surface_id);
            }
            wp_commit_timing_manager_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

// ============================================================================
// wp_commit_timer_v1
// ============================================================================

impl Dispatch<WpCommitTimerV1, CommitTimerData> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpCommitTimerV1,
        request: wp_commit_timer_v1::Request,
        data: &CommitTimerData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(id) = surface_id(&data.surface) else {
            return;
        };
        match request {
            wp_commit_timer_v1::Request::SetTimestamp { tv_sec_hi, tv_sec_lo, tv_nsec } => {
                if let Err(err) = state.commit_timer_set_timestamp(id, tv_sec_hi, tv_sec_lo, tv_nsec) {
                    let code = match err {
                        ProtocolError::InertObject { .. } => wp_commit_timer_v1::Error::SurfaceDestroyed,
                        ProtocolError::InvalidTimestamp(_) => wp_commit_timer_v1::Error::InvalidTimestamp,
                        _ => wp_commit_timer_v1::Error::TimestampExists,
                    };
                    post_error(resource, code, &err);
                }
            }
            wp_commit_timer_v1::Request::Destroy => {}
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, _resource: &WpCommitTimerV1, data: &CommitTimerData) {
        if let Some(id) = surface_id(&data.surface) {
            state.destroy_commit_timer(id);
        }
    }
}

/// Register wp_commit_timing_manager_v1 global
pub fn register_commit_timing(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, WpCommitTimingManagerV1, ()>(1, ())
}
