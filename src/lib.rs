// Cadence
//
// Core of a Wayland compositor: per-output frame clocks, the surface commit
// pipeline and the timing protocols built on them (presentation feedback,
// fifo, commit timing, viewporter, fractional scale, color management).

pub mod config;
pub mod core;
pub mod prelude;
pub mod util;

#[cfg(test)]
mod tests;
