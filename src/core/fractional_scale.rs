//! Preferred fractional scale per surface.

use std::collections::HashMap;

use crate::core::errors::{ProtocolError, ProtocolResult};
use crate::core::surface::SurfaceId;

/// Receiver of `preferred_scale`, usually a `wp_fractional_scale_v1`.
pub trait ScaleSink {
    /// `scale_120` is the scale multiplied by 120.
    fn preferred_scale(&self, scale_120: u32);
}

struct FractionalScaleObject {
    sink: Box<dyn ScaleSink>,
    last_scale: f64,
}

/// Fractional-scale objects, at most one per surface.
#[derive(Default)]
pub struct FractionalScales {
    objects: HashMap<SurfaceId, FractionalScaleObject>,
}

/// Wire encoding of a scale.
pub fn scale_to_wire(scale: f64) -> u32 {
    (scale * 120.0).round().max(0.0) as u32
}

impl FractionalScales {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the object and send the initial scale.
    pub fn create(&mut self, surface: SurfaceId, sink: Box<dyn ScaleSink>, scale: f64) -> ProtocolResult<()> {
        if self.objects.contains_key(&surface) {
            return Err(ProtocolError::FractionalScaleExists);
        }
        sink.preferred_scale(scale_to_wire(scale));
        self.objects.insert(surface, FractionalScaleObject { sink, last_scale: scale });
        Ok(())
    }

    pub fn destroy(&mut self, surface: SurfaceId) {
        self.objects.remove(&surface);
    }

    pub fn contains(&self, surface: SurfaceId) -> bool {
        self.objects.contains_key(&surface)
    }

    /// Send the scale if it changed meaningfully since the last one sent.
    pub fn update(&mut self, surface: SurfaceId, scale: f64) {
        let Some(object) = self.objects.get_mut(&surface) else {
            return;
        };
        if (object.last_scale - scale).abs() < f64::EPSILON {
            return;
        }
        object.last_scale = scale;
        object.sink.preferred_scale(scale_to_wire(scale));
        tracing::debug!("Preferred scale of surface {} is now {}", surface, scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingScale(Rc<RefCell<Vec<u32>>>);

    impl ScaleSink for RecordingScale {
        fn preferred_scale(&self, scale_120: u32) {
            self.0.borrow_mut().push(scale_120);
        }
    }

    #[test]
    fn test_scale_to_wire() {
        assert_eq!(scale_to_wire(1.0), 120);
        assert_eq!(scale_to_wire(1.5), 180);
        assert_eq!(scale_to_wire(1.25), 150);
        assert_eq!(scale_to_wire(2.0), 240);
    }

    #[test]
    fn test_initial_and_changed_scale() {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let mut scales = FractionalScales::new();
        scales.create(SurfaceId(1), Box::new(RecordingScale(sent.clone())), 1.0).unwrap();
        assert_eq!(*sent.borrow(), vec![120]);

        scales.update(SurfaceId(1), 1.0);
        assert_eq!(sent.borrow().len(), 1);

        scales.update(SurfaceId(1), 1.75);
        assert_eq!(*sent.borrow(), vec![120, 210]);
    }

    #[test]
    fn test_one_object_per_surface() {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let mut scales = FractionalScales::new();
        scales.create(SurfaceId(1), Box::new(RecordingScale(sent.clone())), 1.0).unwrap();
        assert_eq!(
            scales.create(SurfaceId(1), Box::new(RecordingScale(sent.clone())), 1.0),
            Err(ProtocolError::FractionalScaleExists)
        );

        scales.destroy(SurfaceId(1));
        assert!(scales.create(SurfaceId(1), Box::new(RecordingScale(sent)), 2.0).is_ok());
    }
}
