//! Color management protocol implementation.
//!
//! Image descriptions, their parametric and ICC creators, per-output color
//! information and per-surface image descriptions with preferred-state
//! feedback. Validation and bookkeeping live in `core::color`; this module
//! maps requests and errors onto the wire.

use std::fs::File;
use std::sync::{Mutex, PoisonError};

use wayland_protocols::wp::color_management::v1::server::{
    wp_color_management_output_v1::{self, WpColorManagementOutputV1},
    wp_color_management_surface_feedback_v1::{self, WpColorManagementSurfaceFeedbackV1},
    wp_color_management_surface_v1::{self, WpColorManagementSurfaceV1},
    wp_color_manager_v1::{self, WpColorManagerV1},
    wp_image_description_creator_icc_v1::{self, WpImageDescriptionCreatorIccV1},
    wp_image_description_creator_params_v1::{self, WpImageDescriptionCreatorParamsV1},
    wp_image_description_info_v1::{self, WpImageDescriptionInfoV1},
    wp_image_description_v1::{self, WpImageDescriptionV1},
};
use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_surface::WlSurface;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, WEnum};

use super::{post_error, surface_id};
use crate::core::color::{
    Colorspace, CreatorParams, FailureCause, IccCreator, ImageDescription, ImageDescriptionInfo,
    ImageDescriptionState, OutputColorSink, PreferredColorSink, SinkToken,
};
use crate::core::errors::ProtocolError;
use crate::core::output::OutputId;
use crate::core::state::CompositorState;

// ============================================================================
// Data Types
// ============================================================================

/// User data of a `wp_color_management_output_v1`.
#[derive(Debug)]
pub struct ColorOutputData {
    /// `None` when the wl_output was not one of ours
    output: Option<OutputId>,
    token: Mutex<Option<SinkToken>>,
}

/// User data of a `wp_color_management_surface_v1`.
#[derive(Debug)]
pub struct ColorSurfaceData {
    surface: WlSurface,
}

/// User data of a `wp_color_management_surface_feedback_v1`.
#[derive(Debug)]
pub struct ColorFeedbackData {
    surface: WlSurface,
    token: Mutex<Option<SinkToken>>,
}

/// User data of a `wp_image_description_v1`.
#[derive(Debug)]
pub struct ImageDescriptionData {
    description: ImageDescription,
}

/// Creators are consumed by their `create` request.
type CreatorSlot<T> = Mutex<Option<T>>;

fn take_creator<T>(slot: &CreatorSlot<T>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

fn store_token(slot: &Mutex<Option<SinkToken>>, token: SinkToken) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
}

fn stored_token(slot: &Mutex<Option<SinkToken>>) -> Option<SinkToken> {
    *slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OutputColorSink for WpColorManagementOutputV1 {
    fn image_description_changed(&self) {
        if self.is_alive() {
            WpColorManagementOutputV1::image_description_changed(self);
        }
    }
}

impl PreferredColorSink for WpColorManagementSurfaceFeedbackV1 {
    fn preferred_changed(&self, identity: u32) {
        if self.is_alive() {
            WpColorManagementSurfaceFeedbackV1::preferred_changed(self, identity);
        }
    }
}

// ============================================================================
// wp_color_manager_v1
// ============================================================================

impl GlobalDispatch<WpColorManagerV1, ()> for CompositorState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WpColorManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let manager = data_init.init(resource, ());
        let color = &state.color_management;

        for intent in color.supported_intents() {
            if let Ok(intent) = wp_color_manager_v1::RenderIntent::try_from(*intent) {
                manager.supported_intent(intent);
            }
        }
        for feature in color.supported_features() {
            if let Ok(feature) = wp_color_manager_v1::Feature::try_from(*feature) {
                manager.supported_feature(feature);
            }
        }
        for tf in color.supported_tf_named() {
            if let Ok(tf) = wp_color_manager_v1::TransferFunction::try_from(*tf) {
                manager.supported_tf_named(tf);
            }
        }
        for primaries in color.supported_primaries_named() {
            if let Ok(primaries) = wp_color_manager_v1::Primaries::try_from(*primaries) {
                manager.supported_primaries_named(primaries);
            }
        }
        manager.done();
        tracing::debug!("Bound wp_color_manager_v1");
    }
}

impl Dispatch<WpColorManagerV1, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpColorManagerV1,
        request: wp_color_manager_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wp_color_manager_v1::Request::GetOutput { id, output } => {
                let output = output.data::<OutputId>().copied();
                let data = ColorOutputData { output, token: Mutex::new(None) };
                let color_output = data_init.init(id, data);
                if let Some(output) = output {
                    let token = state
                        .color_management
                        .add_output_sink(output, Box::new(color_output.clone()));
                    if let Some(data) = color_output.data::<ColorOutputData>() {
                        store_token(&data.token, token);
                    }
                }
            }
            wp_color_manager_v1::Request::GetSurface { id, surface } => {
                data_init.init(id, ColorSurfaceData { surface: surface.clone() });
                let Some(surface_id) = surface_id(&surface) else {
                    return;
                };
                if let Err(err) = state.create_color_surface(surface_id) {
                    post_error(resource, wp_color_manager_v1::Error::SurfaceExists, &err);
                }
            }
            wp_color_manager_v1::Request::GetSurfaceFeedback { id, surface } => {
                let data = ColorFeedbackData { surface: surface.clone(), token: Mutex::new(None) };
                let feedback = data_init.init(id, data);
                let Some(surface_id) = surface_id(&surface) else {
                    return;
                };
                let token = state.add_color_feedback(surface_id, Box::new(feedback.clone()));
                if let Some(data) = feedback.data::<ColorFeedbackData>() {
                    store_token(&data.token, token);
                }
            }
            wp_color_manager_v1::Request::CreateIccCreator { obj } => {
                data_init.init(obj, Mutex::new(Some(IccCreator::new())));
            }
            wp_color_manager_v1::Request::CreateParametricCreator { obj } => {
                data_init.init(obj, Mutex::new(Some(CreatorParams::new())));
            }
            wp_color_manager_v1::Request::CreateWindowsScrgb { image_description } => {
                data_init.init(
                    image_description,
                    ImageDescriptionData { description: ImageDescription::pending() },
                );
                post_error(
                    resource,
                    wp_color_manager_v1::Error::UnsupportedFeature,
                    &ProtocolError::UnsupportedFeature("windows-scRGB"),
                );
            }
            wp_color_manager_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

// ============================================================================
// wp_color_management_output_v1
// ============================================================================

impl Dispatch<WpColorManagementOutputV1, ColorOutputData> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &WpColorManagementOutputV1,
        request: wp_color_management_output_v1::Request,
        data: &ColorOutputData,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wp_color_management_output_v1::Request::GetImageDescription { image_description } => {
                let output = data.output.filter(|output| state.output(*output).is_some());
                let description = state.color_management.output_image_description(output);
                init_image_description(data_init, image_description, description);
            }
            wp_color_management_output_v1::Request::Destroy => {}
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: ClientId,
        _resource: &WpColorManagementOutputV1,
        data: &ColorOutputData,
    ) {
        if let (Some(output), Some(token)) = (data.output, stored_token(&data.token)) {
            state.color_management.remove_output_sink(output, token);
        }
    }
}

// ============================================================================
// wp_color_management_surface_v1
// ============================================================================

impl Dispatch<WpColorManagementSurfaceV1, ColorSurfaceData> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpColorManagementSurfaceV1,
        request: wp_color_management_surface_v1::Request,
        data: &ColorSurfaceData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(id) = surface_id(&data.surface) else {
            return;
        };
        let result = match request {
            wp_color_management_surface_v1::Request::SetImageDescription {
                image_description,
                render_intent,
            } => {
                let render_intent = match render_intent {
                    WEnum::Value(intent) => u32::from(intent),
                    WEnum::Unknown(intent) => intent,
                };
                match image_description.data::<ImageDescriptionData>() {
                    Some(description) => {
                        state.set_surface_image_description(id, &description.description, render_intent)
                    }
                    None => Err(ProtocolError::ImageDescription("unknown image description")),
                }
            }
            wp_color_management_surface_v1::Request::UnsetImageDescription => {
                state.unset_surface_image_description(id)
            }
            _ => Ok(()),
        };

        if let Err(err) = result {
            let code = match err {
                ProtocolError::InertObject { .. } => wp_color_management_surface_v1::Error::Inert,
                ProtocolError::RenderIntent(_) => wp_color_management_surface_v1::Error::RenderIntent,
                _ => wp_color_management_surface_v1::Error::ImageDescription,
            };
            post_error(resource, code, &err);
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: ClientId,
        _resource: &WpColorManagementSurfaceV1,
        data: &ColorSurfaceData,
    ) {
        if let Some(id) = surface_id(&data.surface) {
            state.destroy_color_surface(id);
        }
    }
}

// ============================================================================
// wp_color_management_surface_feedback_v1
// ============================================================================

impl Dispatch<WpColorManagementSurfaceFeedbackV1, ColorFeedbackData> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpColorManagementSurfaceFeedbackV1,
        request: wp_color_management_surface_feedback_v1::Request,
        data: &ColorFeedbackData,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(id) = surface_id(&data.surface) else {
            return;
        };
        match request {
            wp_color_management_surface_feedback_v1::Request::GetPreferred { image_description }
            | wp_color_management_surface_feedback_v1::Request::GetPreferredParametric {
                image_description,
            } => match state.preferred_image_description(id) {
                Ok(description) => init_image_description(data_init, image_description, description),
                Err(err) => {
                    data_init.init(
                        image_description,
                        ImageDescriptionData { description: ImageDescription::pending() },
                    );
                    post_error(resource, wp_color_management_surface_feedback_v1::Error::Inert, &err);
                }
            },
            wp_color_management_surface_feedback_v1::Request::Destroy => {}
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: ClientId,
        _resource: &WpColorManagementSurfaceFeedbackV1,
        data: &ColorFeedbackData,
    ) {
        if let (Some(id), Some(token)) = (surface_id(&data.surface), stored_token(&data.token)) {
            state.remove_color_feedback(id, token);
        }
    }
}

// ============================================================================
// wp_image_description_creator_params_v1
// ============================================================================

impl Dispatch<WpImageDescriptionCreatorParamsV1, CreatorSlot<CreatorParams>> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        resource: &WpImageDescriptionCreatorParamsV1,
        request: wp_image_description_creator_params_v1::Request,
        data: &CreatorSlot<CreatorParams>,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        use wp_image_description_creator_params_v1::Request;

        let request = match request {
            Request::Create { image_description } => {
                let result = take_creator(data)
                    .ok_or(ProtocolError::AlreadySet("creator"))
                    .and_then(CreatorParams::create);
                match result {
                    Ok(color_state) => init_image_description(
                        data_init,
                        image_description,
                        ImageDescription::ready(color_state, true),
                    ),
                    Err(err) => {
                        data_init.init(
                            image_description,
                            ImageDescriptionData { description: ImageDescription::pending() },
                        );
                        post_error(resource, params_error_code(&err), &err);
                    }
                }
                return;
            }
            request => request,
        };

        let mut guard = data.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(params) = guard.as_mut() else {
            return;
        };
        let result = match request {
            Request::SetTfNamed { tf } => params.set_tf_named(raw_enum(tf)),
            Request::SetTfPower { eexp } => params.set_tf_power(eexp),
            Request::SetPrimariesNamed { primaries } => params.set_primaries_named(raw_enum(primaries)),
            Request::SetPrimaries { .. } => params.set_primaries(),
            Request::SetLuminances { min_lum, max_lum, reference_lum } => {
                params.set_luminances(min_lum, max_lum, reference_lum)
            }
            Request::SetMasteringDisplayPrimaries { .. } => params.set_mastering_display_primaries(),
            Request::SetMasteringLuminance { min_lum, max_lum } => {
                params.set_mastering_luminance(min_lum, max_lum)
            }
            Request::SetMaxCll { max_cll } => {
                params.set_max_cll(max_cll);
                Ok(())
            }
            Request::SetMaxFall { max_fall } => {
                params.set_max_fall(max_fall);
                Ok(())
            }
            _ => Ok(()),
        };
        drop(guard);

        if let Err(err) = result {
            post_error(resource, params_error_code(&err), &err);
        }
    }
}

fn raw_enum<T: Into<u32>>(value: WEnum<T>) -> u32 {
    match value {
        WEnum::Value(value) => value.into(),
        WEnum::Unknown(value) => value,
    }
}

fn params_error_code(err: &ProtocolError) -> wp_image_description_creator_params_v1::Error {
    use wp_image_description_creator_params_v1::Error;
    match err {
        ProtocolError::AlreadySet(_) => Error::AlreadySet,
        ProtocolError::UnsupportedFeature(_) => Error::UnsupportedFeature,
        ProtocolError::InvalidTf(_) => Error::InvalidTf,
        ProtocolError::InvalidPrimariesNamed(_) => Error::InvalidPrimariesNamed,
        ProtocolError::InvalidLuminance(_) => Error::InvalidLuminance,
        _ => Error::IncompleteSet,
    }
}

// ============================================================================
// wp_image_description_creator_icc_v1
// ============================================================================

impl Dispatch<WpImageDescriptionCreatorIccV1, CreatorSlot<IccCreator>> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        resource: &WpImageDescriptionCreatorIccV1,
        request: wp_image_description_creator_icc_v1::Request,
        data: &CreatorSlot<IccCreator>,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        use wp_image_description_creator_icc_v1::{Error, Request};

        let result = match request {
            Request::SetIccFile { icc_profile, offset, length } => {
                let mut guard = data.lock().unwrap_or_else(PoisonError::into_inner);
                match guard.as_mut() {
                    Some(creator) => creator.set_icc_file(File::from(icc_profile), offset, length),
                    None => Ok(()),
                }
            }
            Request::Create { image_description } => {
                let result = take_creator(data)
                    .ok_or(ProtocolError::AlreadySet("creator"))
                    .and_then(IccCreator::create);
                match result {
                    Ok(description) => {
                        init_image_description(data_init, image_description, description);
                        Ok(())
                    }
                    Err(err) => {
                        data_init.init(
                            image_description,
                            ImageDescriptionData { description: ImageDescription::pending() },
                        );
                        Err(err)
                    }
                }
            }
            _ => Ok(()),
        };

        if let Err(err) = result {
            let code = match err {
                ProtocolError::AlreadySet(_) => Error::AlreadySet,
                ProtocolError::IccBadSize(_) => Error::BadSize,
                ProtocolError::IccOutOfFile { .. } => Error::OutOfFile,
                ProtocolError::IccBadFd(_) => Error::BadFd,
                _ => Error::IncompleteSet,
            };
            post_error(resource, code, &err);
        }
    }
}

// ============================================================================
// wp_image_description_v1
// ============================================================================

/// Create the resource for `description` and announce its outcome.
fn init_image_description(
    data_init: &mut DataInit<'_, CompositorState>,
    resource: New<WpImageDescriptionV1>,
    description: ImageDescription,
) {
    let resource = data_init.init(resource, ImageDescriptionData { description });
    let Some(data) = resource.data::<ImageDescriptionData>() else {
        return;
    };
    match data.description.state() {
        ImageDescriptionState::Ready(color_state) => resource.ready(color_state.id()),
        ImageDescriptionState::Failed { cause, message } => {
            resource.failed(failure_cause(*cause), message.clone());
        }
        ImageDescriptionState::Pending => {}
    }
}

fn failure_cause(cause: FailureCause) -> wp_image_description_v1::Cause {
    use wp_image_description_v1::Cause;
    match cause {
        FailureCause::LowVersion => Cause::LowVersion,
        FailureCause::Unsupported => Cause::Unsupported,
        FailureCause::OperatingSystem => Cause::OperatingSystem,
        FailureCause::NoOutput => Cause::NoOutput,
    }
}

impl Dispatch<WpImageDescriptionV1, ImageDescriptionData> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        resource: &WpImageDescriptionV1,
        request: wp_image_description_v1::Request,
        data: &ImageDescriptionData,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wp_image_description_v1::Request::GetInformation { information } => {
                let info = data_init.init(information, ());
                match data.description.information() {
                    Ok(contents) => send_information(&info, &contents),
                    Err(err) => {
                        let code = match err {
                            ProtocolError::ImageDescriptionNotReady => {
                                wp_image_description_v1::Error::NotReady
                            }
                            _ => wp_image_description_v1::Error::NoInformation,
                        };
                        post_error(resource, code, &err);
                    }
                }
            }
            wp_image_description_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

impl Dispatch<WpImageDescriptionInfoV1, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WpImageDescriptionInfoV1,
        _request: wp_image_description_info_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

/// CIE 1931 xy chromaticities of red, green, blue and white, scaled by 10⁶.
fn chromaticities(colorspace: Colorspace) -> [i32; 8] {
    match colorspace {
        Colorspace::Srgb => [640_000, 330_000, 300_000, 600_000, 150_000, 60_000, 312_700, 329_000],
        Colorspace::Bt2020 => [708_000, 292_000, 170_000, 797_000, 131_000, 46_000, 312_700, 329_000],
    }
}

/// Send the information events; the info object is destroyed by `done`.
fn send_information(info: &WpImageDescriptionInfoV1, contents: &ImageDescriptionInfo) {
    let [rx, ry, gx, gy, bx, by, wx, wy] = chromaticities(contents.primaries);
    info.primaries(rx, ry, gx, gy, bx, by, wx, wy);
    if let Ok(primaries) = wp_color_manager_v1::Primaries::try_from(contents.primaries.to_wire()) {
        info.primaries_named(primaries);
    }
    if let Ok(tf) = wp_color_manager_v1::TransferFunction::try_from(contents.transfer_function.to_wire()) {
        info.tf_named(tf);
    }

    let luminance = contents.luminance;
    let min_lum = (luminance.min * 10_000.0).round() as u32;
    let max_lum = luminance.max.round() as u32;
    info.luminances(min_lum, max_lum, luminance.reference.round() as u32);
    info.target_primaries(rx, ry, gx, gy, bx, by, wx, wy);
    info.target_luminance(min_lum, max_lum);
    info.done();
}

/// Register wp_color_manager_v1 global
pub fn register_color_management(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, WpColorManagerV1, ()>(1, ())
}
