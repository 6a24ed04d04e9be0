//! Presentation Time protocol implementation.
//!
//! Feedback requests are handed to the surface's pending state; the frame
//! side resolves them to `presented` or `discarded`.

use wayland_protocols::wp::presentation_time::server::{
    wp_presentation::{self, WpPresentation},
    wp_presentation_feedback::{self, Kind, WpPresentationFeedback},
};
use wayland_server::protocol::wl_output::WlOutput;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource};

use super::surface_id;
use crate::core::output::OutputId;
use crate::core::presentation::{FeedbackSink, PresentationFeedback, PresentedEvent};
use crate::core::state::CompositorState;

/// `clock_id` advertised to clients.
const CLOCK_MONOTONIC: u32 = 1;

/// Sends feedback events to a `wp_presentation_feedback`.
struct FeedbackResource {
    resource: WpPresentationFeedback,
    /// The client's `wl_output` resources when the request was made
    outputs: Vec<(OutputId, WlOutput)>,
}

impl FeedbackSink for FeedbackResource {
    fn version(&self) -> u32 {
        self.resource.version()
    }

    fn presented(&self, event: &PresentedEvent) {
        if !self.resource.is_alive() {
            return;
        }
        for (_, output) in self.outputs.iter().filter(|(id, _)| *id == event.output) {
            if output.is_alive() {
                self.resource.sync_output(output);
            }
        }
        self.resource.presented(
            event.tv_sec_hi,
            event.tv_sec_lo,
            event.tv_nsec,
            event.refresh_ns,
            event.seq_hi,
            event.seq_lo,
            Kind::from_bits_truncate(event.flags.bits()),
        );
    }

    fn discarded(&self) {
        if self.resource.is_alive() {
            self.resource.discarded();
        }
    }
}

// ============================================================================
// wp_presentation
// ============================================================================

impl GlobalDispatch<WpPresentation, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WpPresentation>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let presentation = data_init.init(resource, ());
        presentation.clock_id(CLOCK_MONOTONIC);
        tracing::debug!("Bound wp_presentation");
    }
}

impl Dispatch<WpPresentation, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &WpPresentation,
        request: wp_presentation::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wp_presentation::Request::Feedback { surface, callback } => {
                let resource = data_init.init(callback, ());
                let object = resource.id();
                let output_ids: Vec<OutputId> = state.outputs.keys().copied().collect();
                let outputs = output_ids
                    .into_iter()
                    .flat_map(|output| {
                        state
                            .client_output_resources(output, &object)
                            .into_iter()
                            .map(move |wl_output| (output, wl_output))
                    })
                    .collect();

                let sink = Box::new(FeedbackResource { resource, outputs });
                match surface_id(&surface) {
                    Some(id) => state.add_presentation_feedback(id, PresentationFeedback::new(id, sink)),
                    None => sink.discarded(),
                }
            }
            wp_presentation::Request::Destroy => {}
            _ => {}
        }
    }
}

impl Dispatch<WpPresentationFeedback, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WpPresentationFeedback,
        _request: wp_presentation_feedback::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

/// Register wp_presentation global
pub fn register_presentation_time(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, WpPresentation, ()>(1, ())
}
