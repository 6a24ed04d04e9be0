use std::sync::Arc;

use super::color_state::{ColorState, Colorspace, Luminance, TransferFunction};
use crate::core::errors::{ProtocolError, ProtocolResult};

/// Why an image description could not be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    LowVersion,
    Unsupported,
    OperatingSystem,
    NoOutput,
}

#[derive(Debug, Clone)]
pub enum ImageDescriptionState {
    Pending,
    Ready(Arc<ColorState>),
    Failed { cause: FailureCause, message: String },
}

/// Contents of `get_information`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageDescriptionInfo {
    pub primaries: Colorspace,
    pub transfer_function: TransferFunction,
    pub luminance: Luminance,
}

/// Server side of a `wp_image_description_v1`.
#[derive(Debug, Clone)]
pub struct ImageDescription {
    state: ImageDescriptionState,
    has_info: bool,
}

impl ImageDescription {
    pub fn pending() -> Self {
        Self { state: ImageDescriptionState::Pending, has_info: false }
    }

    pub fn ready(color_state: Arc<ColorState>, has_info: bool) -> Self {
        Self { state: ImageDescriptionState::Ready(color_state), has_info }
    }

    pub fn failed(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            state: ImageDescriptionState::Failed { cause, message: message.into() },
            has_info: false,
        }
    }

    pub fn state(&self) -> &ImageDescriptionState {
        &self.state
    }

    pub fn has_info(&self) -> bool {
        self.has_info
    }

    /// Color state of a ready description.
    pub fn ready_color_state(&self) -> ProtocolResult<&Arc<ColorState>> {
        match &self.state {
            ImageDescriptionState::Ready(color_state) => Ok(color_state),
            _ => Err(ProtocolError::ImageDescription("image description is not ready")),
        }
    }

    pub fn information(&self) -> ProtocolResult<ImageDescriptionInfo> {
        let ImageDescriptionState::Ready(color_state) = &self.state else {
            return Err(ProtocolError::ImageDescriptionNotReady);
        };
        if !self.has_info {
            return Err(ProtocolError::NoInformation);
        }
        // ICC descriptions are never created with information attached.
        let params = color_state.params().ok_or(ProtocolError::NoInformation)?;
        Ok(ImageDescriptionInfo {
            primaries: params.colorspace,
            transfer_function: params.transfer_function,
            luminance: params.luminance,
        })
    }
}
