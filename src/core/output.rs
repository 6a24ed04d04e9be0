//! Output (monitor) descriptions.
//!
//! Each output is painted by exactly one stage view, so the output id also
//! identifies the view in frame-clock and presentation bookkeeping.

use std::fmt;

/// Strongly-typed output key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub u32);

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output-{}", self.0)
    }
}

/// Mode and scale of a connected output.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub id: OutputId,
    pub name: String,
    pub width: i32,
    pub height: i32,
    /// Fractional scale applied to client content.
    pub scale: f64,
    pub refresh_rate: f32,
    /// Variable refresh rate mode.
    pub vrr: bool,
}

impl Output {
    pub fn new(id: OutputId, name: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            id,
            name: name.into(),
            width,
            height,
            scale: 1.0,
            refresh_rate: 60.0,
            vrr: false,
        }
    }

    /// Integer scale advertised through `wl_output.scale`.
    pub fn integer_scale(&self) -> i32 {
        self.scale.ceil().max(1.0) as i32
    }

    /// Refresh rate in mHz as used by `wl_output.mode`.
    pub fn refresh_mhz(&self) -> i32 {
        (self.refresh_rate * 1000.0).round() as i32
    }
}
