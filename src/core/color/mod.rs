//! Color management: color states, image descriptions and their creators.

pub mod color_state;
pub mod icc;
pub mod image_description;
pub mod management;
pub mod params;

pub use color_state::{
    ColorParams, ColorState, ColorStateKind, Colorspace, IccProfile, Luminance, TransferFunction,
};
pub use icc::IccCreator;
pub use image_description::{
    FailureCause, ImageDescription, ImageDescriptionInfo, ImageDescriptionState,
};
pub use management::{ColorManagement, OutputColorSink, PreferredColorSink, SinkToken};
pub use params::CreatorParams;

/// Enum values of the `wp_color_manager_v1` wire protocol.
pub mod wire {
    pub const RENDER_INTENT_PERCEPTUAL: u32 = 0;

    pub const FEATURE_ICC_V2_V4: u32 = 0;
    pub const FEATURE_PARAMETRIC: u32 = 1;
    pub const FEATURE_SET_LUMINANCES: u32 = 4;

    pub const PRIMARIES_SRGB: u32 = 1;
    pub const PRIMARIES_BT2020: u32 = 6;

    pub const TF_EXT_LINEAR: u32 = 5;
    pub const TF_SRGB: u32 = 9;
    pub const TF_ST2084_PQ: u32 = 11;
}

impl Colorspace {
    pub fn to_wire(self) -> u32 {
        match self {
            Colorspace::Srgb => wire::PRIMARIES_SRGB,
            Colorspace::Bt2020 => wire::PRIMARIES_BT2020,
        }
    }
}

impl TransferFunction {
    pub fn to_wire(self) -> u32 {
        match self {
            TransferFunction::Srgb => wire::TF_SRGB,
            TransferFunction::Pq => wire::TF_ST2084_PQ,
            TransferFunction::Linear => wire::TF_EXT_LINEAR,
        }
    }
}
