//! Viewport (crop and scale) values and their validation.

use crate::core::errors::{ProtocolError, ProtocolResult};

/// Source rectangle in surface-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSource {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Crop and scale applied to a surface. `None` means unset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BufferViewport {
    pub source: Option<ViewportSource>,
    pub destination: Option<(i32, i32)>,
}

impl BufferViewport {
    pub fn has_src_rect(&self) -> bool {
        self.source.is_some()
    }

    pub fn has_dst_size(&self) -> bool {
        self.destination.is_some()
    }
}

/// Validate `wp_viewport.set_source`. All four values at -1 unset the source.
pub fn parse_source(x: f64, y: f64, width: f64, height: f64) -> ProtocolResult<Option<ViewportSource>> {
    if x == -1.0 && y == -1.0 && width == -1.0 && height == -1.0 {
        return Ok(None);
    }
    if x < 0.0 || y < 0.0 || width <= 0.0 || height <= 0.0 {
        return Err(ProtocolError::ViewportBadValue(format!(
            "invalid source rectangle ({}, {}) {}x{}",
            x, y, width, height
        )));
    }
    Ok(Some(ViewportSource { x, y, width, height }))
}

/// Validate `wp_viewport.set_destination`. `-1, -1` unsets the destination.
pub fn parse_destination(width: i32, height: i32) -> ProtocolResult<Option<(i32, i32)>> {
    if width == -1 && height == -1 {
        return Ok(None);
    }
    if width <= 0 || height <= 0 {
        return Err(ProtocolError::ViewportBadValue(format!(
            "invalid destination size {}x{}",
            width, height
        )));
    }
    Ok(Some((width, height)))
}

/// Commit-time checks against the buffer the viewport applies to.
///
/// `buffer_size` is the buffer size in surface-local units, or `None` when
/// no buffer is attached (nothing to check against).
pub fn check_viewport(viewport: &BufferViewport, buffer_size: Option<(i32, i32)>) -> ProtocolResult<()> {
    let Some(source) = viewport.source else {
        return Ok(());
    };

    if let Some((buffer_width, buffer_height)) = buffer_size {
        if source.x + source.width > buffer_width as f64 || source.y + source.height > buffer_height as f64 {
            return Err(ProtocolError::ViewportOutOfBuffer);
        }
    }

    if viewport.destination.is_none() && (source.width.fract() != 0.0 || source.height.fract() != 0.0) {
        return Err(ProtocolError::ViewportBadSize(format!(
            "source size {}x{} is not integer and no destination is set",
            source.width, source.height
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        assert_eq!(parse_source(-1.0, -1.0, -1.0, -1.0), Ok(None));
        assert!(parse_source(0.0, 0.0, 10.5, 20.0).unwrap().is_some());
        assert!(matches!(parse_source(-2.0, 0.0, 10.0, 10.0), Err(ProtocolError::ViewportBadValue(_))));
        assert!(matches!(parse_source(0.0, 0.0, 0.0, 10.0), Err(ProtocolError::ViewportBadValue(_))));
        // Partially unset is not unset.
        assert!(parse_source(-1.0, -1.0, -1.0, 5.0).is_err());
    }

    #[test]
    fn test_parse_destination() {
        assert_eq!(parse_destination(-1, -1), Ok(None));
        assert_eq!(parse_destination(640, 480), Ok(Some((640, 480))));
        assert!(matches!(parse_destination(0, 480), Err(ProtocolError::ViewportBadValue(_))));
        assert!(parse_destination(-1, 480).is_err());
    }

    #[test]
    fn test_check_viewport_out_of_buffer() {
        let viewport = BufferViewport {
            source: Some(ViewportSource { x: 50.0, y: 0.0, width: 100.0, height: 10.0 }),
            destination: Some((100, 10)),
        };
        assert_eq!(check_viewport(&viewport, Some((200, 100))), Ok(()));
        assert_eq!(check_viewport(&viewport, Some((120, 100))), Err(ProtocolError::ViewportOutOfBuffer));
        assert_eq!(check_viewport(&viewport, None), Ok(()));
    }

    #[test]
    fn test_check_viewport_fractional_without_destination() {
        let viewport = BufferViewport {
            source: Some(ViewportSource { x: 0.0, y: 0.0, width: 10.5, height: 10.0 }),
            destination: None,
        };
        assert!(matches!(check_viewport(&viewport, None), Err(ProtocolError::ViewportBadSize(_))));
    }
}
