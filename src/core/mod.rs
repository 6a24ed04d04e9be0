pub mod color;
pub mod compositor;
pub mod errors;
pub mod fractional_scale;
pub mod frame_clock;
pub mod output;
pub mod presentation;
pub mod runtime;
pub mod state;
pub mod surface;
pub mod time;
pub mod wayland;

// Re-export key types
pub use compositor::Compositor;
pub use frame_clock::{FrameClock, FrameClockState, FrameInfo};
pub use runtime::{Runtime, StageView};
pub use state::CompositorState;
