use std::sync::Arc;

use super::color_state::{ColorParams, ColorState, Colorspace, Luminance, TransferFunction};
use super::wire;
use crate::core::errors::{ProtocolError, ProtocolResult};

/// Parametric image description creator.
///
/// Only named primaries and named transfer functions are supported;
/// mastering display metadata is rejected as an unsupported feature.
#[derive(Debug, Default)]
pub struct CreatorParams {
    colorspace: Option<Colorspace>,
    transfer_function: Option<TransferFunction>,
    luminance: Option<Luminance>,
    max_cll: Option<u32>,
    max_fall: Option<u32>,
}

impl CreatorParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tf_named(&mut self, tf: u32) -> ProtocolResult<()> {
        if self.transfer_function.is_some() {
            return Err(ProtocolError::AlreadySet("transfer function"));
        }
        let tf = match tf {
            wire::TF_SRGB => TransferFunction::Srgb,
            wire::TF_ST2084_PQ => TransferFunction::Pq,
            other => return Err(ProtocolError::InvalidTf(other)),
        };
        self.transfer_function = Some(tf);
        Ok(())
    }

    pub fn set_tf_power(&mut self, _eexp: u32) -> ProtocolResult<()> {
        Err(ProtocolError::UnsupportedFeature("power-law transfer functions"))
    }

    pub fn set_primaries_named(&mut self, primaries: u32) -> ProtocolResult<()> {
        if self.colorspace.is_some() {
            return Err(ProtocolError::AlreadySet("primaries"));
        }
        let colorspace = match primaries {
            wire::PRIMARIES_SRGB => Colorspace::Srgb,
            wire::PRIMARIES_BT2020 => Colorspace::Bt2020,
            other => return Err(ProtocolError::InvalidPrimariesNamed(other)),
        };
        self.colorspace = Some(colorspace);
        Ok(())
    }

    pub fn set_primaries(&mut self) -> ProtocolResult<()> {
        Err(ProtocolError::UnsupportedFeature("custom primaries"))
    }

    /// `min_lum` is in units of 0.0001 cd/m², the others in cd/m².
    pub fn set_luminances(&mut self, min_lum: u32, max_lum: u32, reference_lum: u32) -> ProtocolResult<()> {
        if self.luminance.is_some() {
            return Err(ProtocolError::AlreadySet("luminance"));
        }

        let luminance = Luminance {
            min: min_lum as f32 * 0.0001,
            max: max_lum as f32,
            reference: reference_lum as f32,
        };
        if luminance.max < luminance.reference {
            return Err(ProtocolError::InvalidLuminance(
                "the maximum luminance is smaller than the reference luminance",
            ));
        }
        if luminance.reference <= luminance.min {
            return Err(ProtocolError::InvalidLuminance(
                "the reference luminance is less or equal to the minimum luminance",
            ));
        }

        self.luminance = Some(luminance);
        Ok(())
    }

    pub fn set_mastering_display_primaries(&mut self) -> ProtocolResult<()> {
        Err(ProtocolError::UnsupportedFeature("mastering display primaries"))
    }

    pub fn set_mastering_luminance(&mut self, _min_lum: u32, _max_lum: u32) -> ProtocolResult<()> {
        Err(ProtocolError::UnsupportedFeature("mastering display luminances"))
    }

    /// Accepted but not used for rendering.
    pub fn set_max_cll(&mut self, max_cll: u32) {
        self.max_cll = Some(max_cll);
    }

    /// Accepted but not used for rendering.
    pub fn set_max_fall(&mut self, max_fall: u32) {
        self.max_fall = Some(max_fall);
    }

    pub fn create(self) -> ProtocolResult<Arc<ColorState>> {
        let (Some(colorspace), Some(transfer_function)) = (self.colorspace, self.transfer_function) else {
            return Err(ProtocolError::IncompleteSet(
                "primaries and transfer function must both be set",
            ));
        };

        let mut params = ColorParams::new(colorspace, transfer_function);
        if let Some(luminance) = self.luminance {
            params = params.with_luminance(luminance);
        }
        Ok(ColorState::from_params(params))
    }
}
