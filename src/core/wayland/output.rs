//! wl_output protocol implementation.
//!
//! Each compositor output gets one global; the bound resources are tracked
//! in the state so surfaces can be told which outputs they are shown on.

use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_output::{self, Subpixel, Transform, WlOutput};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource};

use crate::core::output::{Output, OutputId};
use crate::core::state::CompositorState;

// ============================================================================
// wl_output GlobalDispatch
// ============================================================================

impl GlobalDispatch<WlOutput, OutputId> for CompositorState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<WlOutput>,
        global_data: &OutputId,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let output = data_init.init(resource, *global_data);
        match state.output(*global_data) {
            Some(info) => send_output_info(&output, info),
            None => {
                tracing::warn!("wl_output bound for removed {}", global_data);
                return;
            }
        }
        state.add_output_resource(*global_data, output.clone());
        tracing::debug!(
            "Bound wl_output v{} for {} (client {:?})",
            output.version(),
            global_data,
            client.id()
        );
    }
}

impl Dispatch<WlOutput, OutputId> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WlOutput,
        request: wl_output::Request,
        _data: &OutputId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_output::Request::Release => {}
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, resource: &WlOutput, data: &OutputId) {
        state.remove_output_resource(*data, resource);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Send the full description of `info` to a newly bound resource.
fn send_output_info(output: &WlOutput, info: &Output) {
    output.geometry(
        0,
        0,
        0,
        0,
        Subpixel::Unknown,
        "cadence".to_string(),
        info.name.clone(),
        Transform::Normal,
    );
    output.mode(
        wl_output::Mode::Current | wl_output::Mode::Preferred,
        info.width,
        info.height,
        info.refresh_mhz(),
    );
    if output.version() >= 2 {
        output.scale(info.integer_scale());
    }
    if output.version() >= 4 {
        output.name(info.name.clone());
        output.description(format!("{} ({}x{})", info.name, info.width, info.height));
    }
    if output.version() >= 2 {
        output.done();
    }
}

/// Register the wl_output global of one output
pub fn register_output(display: &DisplayHandle, id: OutputId) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, WlOutput, OutputId>(4, id)
}
