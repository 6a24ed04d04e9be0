//! Core error types

use thiserror::Error;

use crate::core::output::OutputId;

/// Core compositor errors
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("State error: {0}")]
    StateError(String),

    #[error("Invalid output ID: {0}")]
    InvalidOutputId(OutputId),
}

impl CoreError {
    pub fn state_error(msg: impl Into<String>) -> Self {
        Self::StateError(msg.into())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Client misbehavior detected while handling a protocol request.
///
/// Each variant maps onto exactly one protocol error code; the wayland glue
/// posts it on the offending resource, which disconnects the client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("{interface}: the underlying surface has been destroyed")]
    InertObject { interface: &'static str },

    #[error("commit timestamp already set for this commit")]
    TimestampExists,

    #[error("invalid timestamp: tv_nsec {0} out of range")]
    InvalidTimestamp(u32),

    #[error("surface already has a fifo object")]
    FifoExists,

    #[error("surface already has a commit timer")]
    CommitTimerExists,

    #[error("surface already has a viewport")]
    ViewportExists,

    #[error("surface already has a fractional scale object")]
    FractionalScaleExists,

    #[error("surface already has a color management surface")]
    ColorSurfaceExists,

    #[error("viewport: {0}")]
    ViewportBadValue(String),

    #[error("viewport: {0}")]
    ViewportBadSize(String),

    #[error("viewport: source rectangle extends outside of the buffer")]
    ViewportOutOfBuffer,

    #[error("invalid buffer scale {0}")]
    InvalidScale(i32),

    #[error("unsupported render intent {0}")]
    RenderIntent(u32),

    #[error("image description: {0}")]
    ImageDescription(&'static str),

    #[error("image description is not ready")]
    ImageDescriptionNotReady,

    #[error("image description has no information")]
    NoInformation,

    #[error("incomplete parameter set: {0}")]
    IncompleteSet(&'static str),

    #[error("{0} was already set")]
    AlreadySet(&'static str),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    #[error("unsupported transfer function {0}")]
    InvalidTf(u32),

    #[error("unsupported named primaries {0}")]
    InvalidPrimariesNamed(u32),

    #[error("invalid luminance: {0}")]
    InvalidLuminance(&'static str),

    #[error("ICC profile size {0} out of range")]
    IccBadSize(u32),

    #[error("ICC data range {offset}+{length} is outside of the file")]
    IccOutOfFile { offset: u32, length: u32 },

    #[error("ICC file descriptor is not usable: {0}")]
    IccBadFd(String),
}

impl ProtocolError {
    pub fn inert(interface: &'static str) -> Self {
        Self::InertObject { interface }
    }
}

/// Result type for protocol request handling
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
