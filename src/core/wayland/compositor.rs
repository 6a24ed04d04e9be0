//! wl_compositor, wl_surface, wl_region, wl_callback and the wl_shm buffer
//! factory.
//!
//! Buffers only carry their dimensions here; pixel access belongs to the
//! renderer.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, PoisonError};

use wayland_protocols::wp::viewporter::server::wp_viewport::{self, WpViewport};
use wayland_server::backend::ClientId;
use wayland_server::protocol::{
    wl_buffer::{self, WlBuffer},
    wl_callback::{self, WlCallback},
    wl_compositor::{self, WlCompositor},
    wl_region::{self, WlRegion},
    wl_shm::{self, WlShm},
    wl_shm_pool::{self, WlShmPool},
    wl_surface::{self, WlSurface},
};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, WEnum};

use super::post_error;
use crate::core::errors::ProtocolError;
use crate::core::state::CompositorState;
use crate::core::surface::{Buffer, FrameCallback, FrameCallbackSink, SurfaceId, Transform};

// ============================================================================
// Data Types
// ============================================================================

/// User data of a `wl_surface`.
#[derive(Debug)]
pub struct SurfaceData {
    pub id: SurfaceId,
    /// The `wp_viewport` of the surface; viewport errors found at commit
    /// are posted on it.
    viewport: Mutex<Option<WpViewport>>,
}

impl SurfaceData {
    fn new(id: SurfaceId) -> Self {
        Self { id, viewport: Mutex::new(None) }
    }

    pub fn set_viewport(&self, viewport: Option<WpViewport>) {
        *self.viewport.lock().unwrap_or_else(PoisonError::into_inner) = viewport;
    }

    pub fn viewport(&self) -> Option<WpViewport> {
        self.viewport.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// User data of a `wl_buffer`.
#[derive(Debug, Clone, Copy)]
pub struct BufferData {
    pub width: i32,
    pub height: i32,
}

/// User data of a `wl_shm_pool`.
#[derive(Debug)]
pub struct ShmPoolData {
    size: AtomicI32,
}

// ============================================================================
// wl_compositor
// ============================================================================

impl GlobalDispatch<WlCompositor, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<WlCompositor>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
        crate::wlog!(crate::util::logging::COMPOSITOR, "Bound wl_compositor for client {:?}", client.id());
    }
}

impl Dispatch<WlCompositor, ()> for CompositorState {
    fn request(
        state: &mut Self,
        client: &Client,
        _resource: &WlCompositor,
        request: wl_compositor::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_compositor::Request::CreateSurface { id } => {
                // Ids are compositor-wide, not per-client protocol ids.
                let surface_id = state.create_surface(Some(client.id()), None);
                let surface = data_init.init(id, SurfaceData::new(surface_id));
                if let Some(s) = state.surface_mut(surface_id) {
                    s.resource = Some(surface);
                }
            }
            wl_compositor::Request::CreateRegion { id } => {
                data_init.init(id, ());
            }
            _ => {}
        }
    }
}

// ============================================================================
// wl_surface
// ============================================================================

impl Dispatch<WlSurface, SurfaceData> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WlSurface,
        request: wl_surface::Request,
        data: &SurfaceData,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let id = data.id;
        match request {
            wl_surface::Request::Attach { buffer, x, y } => {
                if resource.version() >= 5 && (x != 0 || y != 0) {
                    resource.post_error(
                        wl_surface::Error::InvalidOffset,
                        "non-zero attach offset, use wl_surface.offset",
                    );
                    return;
                }
                let buffer = buffer.map(|buffer| {
                    let size = buffer.data::<BufferData>().copied();
                    let (width, height) = size.map_or((0, 0), |s| (s.width, s.height));
                    Buffer::new(buffer.id().protocol_id(), width, height, Some(buffer))
                });
                state.attach_buffer(id, buffer);
            }
            wl_surface::Request::Frame { callback } => {
                let callback = data_init.init(callback, ());
                state.add_frame_callback(id, FrameCallback::new(Box::new(callback)));
            }
            wl_surface::Request::SetBufferScale { scale } => {
                if let Err(err) = state.set_buffer_scale(id, scale) {
                    post_error(resource, wl_surface::Error::InvalidScale, &err);
                }
            }
            wl_surface::Request::SetBufferTransform { transform } => {
                let transform = match transform {
                    WEnum::Value(value) => Transform::from_raw(u32::from(value)),
                    WEnum::Unknown(_) => None,
                };
                match transform {
                    Some(transform) => state.set_buffer_transform(id, transform),
                    None => resource.post_error(wl_surface::Error::InvalidTransform, "invalid buffer transform"),
                }
            }
            wl_surface::Request::Commit => {
                if let Err(err) = state.commit_surface(id) {
                    post_commit_error(resource, data, &err);
                }
            }
            // Damage and regions do not affect when content is applied.
            wl_surface::Request::Damage { .. }
            | wl_surface::Request::DamageBuffer { .. }
            | wl_surface::Request::SetOpaqueRegion { .. }
            | wl_surface::Request::SetInputRegion { .. }
            | wl_surface::Request::Offset { .. } => {}
            wl_surface::Request::Destroy => {}
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, _resource: &WlSurface, data: &SurfaceData) {
        state.destroy_surface(data.id);
    }
}

/// Viewport checks at commit are reported on the viewport object.
fn post_commit_error(surface: &WlSurface, data: &SurfaceData, err: &ProtocolError) {
    let viewport_code = match err {
        ProtocolError::ViewportBadSize(_) => Some(wp_viewport::Error::BadSize),
        ProtocolError::ViewportOutOfBuffer => Some(wp_viewport::Error::OutOfBuffer),
        _ => None,
    };
    match (viewport_code, data.viewport()) {
        (Some(code), Some(viewport)) => post_error(&viewport, code, err),
        _ => post_error(surface, wl_surface::Error::InvalidSize, err),
    }
}

// ============================================================================
// wl_region
// ============================================================================

impl Dispatch<WlRegion, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WlRegion,
        request: wl_region::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_region::Request::Add { .. } | wl_region::Request::Subtract { .. } => {}
            _ => {}
        }
    }
}

// ============================================================================
// wl_callback
// ============================================================================

impl FrameCallbackSink for WlCallback {
    fn done(&self, time_ms: u32) {
        if self.is_alive() {
            WlCallback::done(self, time_ms);
        }
    }
}

impl Dispatch<WlCallback, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WlCallback,
        _request: wl_callback::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

// ============================================================================
// wl_shm
// ============================================================================

const BYTES_PER_PIXEL: i64 = 4;

impl GlobalDispatch<WlShm, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WlShm>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let shm = data_init.init(resource, ());
        shm.format(wl_shm::Format::Argb8888);
        shm.format(wl_shm::Format::Xrgb8888);
        tracing::debug!("Bound wl_shm");
    }
}

impl Dispatch<WlShm, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        resource: &WlShm,
        request: wl_shm::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_shm::Request::CreatePool { id, fd, size } => {
                if size <= 0 {
                    resource.post_error(wl_shm::Error::InvalidStride, format!("invalid pool size {}", size));
                    return;
                }
                // The pixels are never read here, so the fd is not kept.
                drop(fd);
                data_init.init(id, ShmPoolData { size: AtomicI32::new(size) });
                tracing::debug!("wl_shm.create_pool: size={}", size);
            }
            _ => {}
        }
    }
}

impl Dispatch<WlShmPool, ShmPoolData> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        resource: &WlShmPool,
        request: wl_shm_pool::Request,
        data: &ShmPoolData,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_shm_pool::Request::CreateBuffer { id, offset, width, height, stride, format } => {
                if !matches!(format, WEnum::Value(wl_shm::Format::Argb8888 | wl_shm::Format::Xrgb8888)) {
                    resource.post_error(wl_shm::Error::InvalidFormat, format!("unsupported format {:?}", format));
                    return;
                }
                let pool_size = data.size.load(Ordering::Relaxed);
                if !buffer_fits(pool_size, offset, width, height, stride) {
                    resource.post_error(
                        wl_shm::Error::InvalidStride,
                        format!(
                            "invalid buffer: offset {} size {}x{} stride {} in pool of {} bytes",
                            offset, width, height, stride, pool_size
                        ),
                    );
                    return;
                }
                let buffer = data_init.init(id, BufferData { width, height });
                tracing::debug!("wl_shm_pool.create_buffer: {}x{} ({})", width, height, buffer.id());
            }
            wl_shm_pool::Request::Resize { size } => {
                if size < data.size.load(Ordering::Relaxed) {
                    resource.post_error(wl_shm::Error::InvalidStride, "shrinking a pool is invalid");
                    return;
                }
                data.size.store(size, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

fn buffer_fits(pool_size: i32, offset: i32, width: i32, height: i32, stride: i32) -> bool {
    if offset < 0 || width <= 0 || height <= 0 {
        return false;
    }
    let (offset, width, height, stride) = (offset as i64, width as i64, height as i64, stride as i64);
    stride >= width * BYTES_PER_PIXEL && offset + stride * height <= pool_size as i64
}

impl Dispatch<WlBuffer, BufferData> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WlBuffer,
        request: wl_buffer::Request,
        _data: &BufferData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_buffer::Request::Destroy => {}
            _ => {}
        }
    }
}

/// Register wl_compositor global
pub fn register_compositor(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, WlCompositor, ()>(6, ())
}

/// Register wl_shm global
pub fn register_shm(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, WlShm, ()>(1, ())
}

#[cfg(test)]
mod tests {
    use super::buffer_fits;

    #[test]
    fn test_buffer_fits_pool() {
        assert!(buffer_fits(64 * 64 * 4, 0, 64, 64, 256));
        assert!(!buffer_fits(64 * 64 * 4, 4, 64, 64, 256));
        assert!(!buffer_fits(64 * 64 * 4, 0, 64, 64, 128));
        assert!(!buffer_fits(4096, 0, 0, 16, 0));
        assert!(!buffer_fits(4096, -1, 16, 16, 64));
    }
}
