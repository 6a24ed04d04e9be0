pub mod buffer;
pub mod commit;
pub mod pending;
pub mod surface;
pub mod viewport;

pub use buffer::{Buffer, Transform};
pub use commit::{apply_state, AppliedChanges, CommitOutcome, HoldReason};
pub use pending::{FrameCallback, FrameCallbackSink, PendingState};
pub use surface::{AppliedState, Surface, SurfaceExtensions, SurfaceId};
pub use viewport::{BufferViewport, ViewportSource};

#[cfg(test)]
pub mod tests;
