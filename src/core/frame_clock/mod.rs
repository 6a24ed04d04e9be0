//! Frame scheduling for output views.

pub mod clock;
pub mod driver;

pub use clock::{
    FrameClock, FrameClockState, FrameDispatch, SharedFrameClock, DEFAULT_SYNC_DELAY_US,
    FALLBACK_REFRESH_RATE,
};
pub use driver::{
    FrameClockDriver, FrameContext, FrameInfo, FrameInfoFlags, FrameListener, FrameResult,
};

#[cfg(test)]
pub mod tests;
