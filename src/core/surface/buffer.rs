use wayland_server::protocol::wl_buffer::WlBuffer;
use wayland_server::Resource;

/// `wl_output.transform` applied to buffer contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

impl Transform {
    /// Whether width and height swap.
    pub fn is_rotated(self) -> bool {
        matches!(
            self,
            Transform::Rotate90 | Transform::Rotate270 | Transform::Flipped90 | Transform::Flipped270
        )
    }

    pub fn from_raw(value: u32) -> Option<Self> {
        Some(match value {
            0 => Transform::Normal,
            1 => Transform::Rotate90,
            2 => Transform::Rotate180,
            3 => Transform::Rotate270,
            4 => Transform::Flipped,
            5 => Transform::Flipped90,
            6 => Transform::Flipped180,
            7 => Transform::Flipped270,
            _ => return None,
        })
    }
}

/// A client buffer attached to a surface.
///
/// Only the dimensions matter to the commit pipeline; pixel access belongs
/// to the renderer.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub id: u32,
    pub width: i32,
    pub height: i32,
    pub released: bool,
    pub resource: Option<WlBuffer>,
}

impl Buffer {
    pub fn new(id: u32, width: i32, height: i32, resource: Option<WlBuffer>) -> Self {
        Self {
            id,
            width,
            height,
            released: false,
            resource,
        }
    }

    /// Size in surface-local units before viewport cropping.
    pub fn surface_size(&self, scale: i32, transform: Transform) -> (i32, i32) {
        let scale = scale.max(1);
        let (w, h) = if transform.is_rotated() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        };
        (w / scale, h / scale)
    }

    /// Notify the client that the buffer is no longer being used
    pub fn release(&mut self) {
        if self.released {
            return;
        }

        if let Some(resource) = &self.resource {
            if resource.is_alive() {
                resource.release();
                tracing::trace!("wl_buffer.release sent for buffer {}", self.id);
            } else {
                tracing::trace!("Buffer {} resource dead, release not sent", self.id);
            }
        }

        self.released = true;
    }
}
