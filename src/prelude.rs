//! Common imports for code driving the compositor.

pub use crate::config::{CompositorConfig, FrameClockConfig};
pub use crate::core::errors::{CoreError, ProtocolError, ProtocolResult};
pub use crate::core::output::OutputId;
pub use crate::core::surface::SurfaceId;
pub use crate::core::time::{MonotonicClock, SystemClock};
pub use crate::core::{Compositor, CompositorState, Runtime};

pub type Result<T> = std::result::Result<T, crate::core::errors::CoreError>;
