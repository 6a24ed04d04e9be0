//! Wayland protocol implementations for the compositor.
//!
//! Each module binds one protocol to `CompositorState`: requests are
//! translated into state calls with plain ids, and `ProtocolError`s coming
//! back are posted on the offending resource. Globals are registered in
//! `core::compositor`.

use wayland_server::protocol::wl_surface::WlSurface;
use wayland_server::Resource;

use crate::core::errors::ProtocolError;
use crate::core::surface::SurfaceId;

// Core protocol implementations
pub mod compositor;
pub mod output;

// Presentation & timing
pub mod color_management;
pub mod commit_timing;
pub mod fifo;
pub mod fractional_scale;
pub mod presentation_time;
pub mod viewporter;

pub use compositor::{BufferData, SurfaceData};

/// Post `err` on `resource` with the given protocol error code. The client
/// is disconnected.
pub(crate) fn post_error<R: Resource>(resource: &R, code: impl Into<u32>, err: &ProtocolError) {
    tracing::warn!("Protocol error on {}: {}", resource.id(), err);
    resource.post_error(code, err.to_string());
}

/// Compositor-side id of a `wl_surface` resource.
pub(crate) fn surface_id(surface: &WlSurface) -> Option<SurfaceId> {
    surface.data::<SurfaceData>().map(|data| data.id)
}
