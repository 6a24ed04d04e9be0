//! Immutable color states shared between surfaces, outputs and image
//! descriptions.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

static NEXT_COLOR_STATE_ID: AtomicU32 = AtomicU32::new(1);

/// Color primaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Colorspace {
    Srgb,
    Bt2020,
}

/// Transfer characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferFunction {
    Srgb,
    Pq,
    Linear,
}

/// Luminance levels in cd/m².
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Luminance {
    pub min: f32,
    pub max: f32,
    pub reference: f32,
}

impl TransferFunction {
    pub fn default_luminance(self) -> Luminance {
        match self {
            TransferFunction::Srgb => Luminance { min: 0.2, max: 80.0, reference: 80.0 },
            TransferFunction::Pq => Luminance { min: 0.005, max: 10000.0, reference: 203.0 },
            TransferFunction::Linear => Luminance { min: 0.0, max: 80.0, reference: 80.0 },
        }
    }
}

/// Parametric color description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorParams {
    pub colorspace: Colorspace,
    pub transfer_function: TransferFunction,
    pub luminance: Luminance,
}

impl ColorParams {
    pub fn new(colorspace: Colorspace, transfer_function: TransferFunction) -> Self {
        Self {
            colorspace,
            transfer_function,
            luminance: transfer_function.default_luminance(),
        }
    }

    pub fn with_luminance(mut self, luminance: Luminance) -> Self {
        self.luminance = luminance;
        self
    }
}

/// ICC profile contents.
#[derive(Clone, PartialEq, Eq)]
pub struct IccProfile {
    data: Arc<[u8]>,
}

impl IccProfile {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for IccProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IccProfile({} bytes)", self.data.len())
    }
}

/// What a color state is built from.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorStateKind {
    Parametric(ColorParams),
    Icc(IccProfile),
}

/// A color state. Never mutated after creation; the identity is unique per
/// process and is what clients see as the image description identity.
#[derive(Debug)]
pub struct ColorState {
    id: u32,
    kind: ColorStateKind,
}

impl ColorState {
    pub fn new(kind: ColorStateKind) -> Arc<Self> {
        let id = NEXT_COLOR_STATE_ID.fetch_add(1, Ordering::Relaxed);
        Arc::new(Self { id, kind })
    }

    pub fn from_params(params: ColorParams) -> Arc<Self> {
        Self::new(ColorStateKind::Parametric(params))
    }

    /// sRGB with default luminances.
    pub fn srgb() -> Arc<Self> {
        Self::from_params(ColorParams::new(Colorspace::Srgb, TransferFunction::Srgb))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> &ColorStateKind {
        &self.kind
    }

    pub fn params(&self) -> Option<&ColorParams> {
        match &self.kind {
            ColorStateKind::Parametric(params) => Some(params),
            ColorStateKind::Icc(_) => None,
        }
    }

    /// Content equality; identities are ignored.
    pub fn equals(&self, other: &ColorState) -> bool {
        self.id == other.id || self.kind == other.kind
    }
}
