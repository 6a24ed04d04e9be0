//! End-to-end scenarios: client-like request sequences driven through the
//! runtime with simulated time.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::config::{CompositorConfig, FrameClockConfig};
use crate::core::color::{ColorParams, ColorState, Colorspace, ImageDescription, PreferredColorSink, TransferFunction};
use crate::core::fractional_scale::ScaleSink;
use crate::core::output::OutputId;
use crate::core::presentation::{FeedbackSink, PresentationFeedback, PresentationFlags, PresentedEvent};
use crate::core::surface::{Buffer, CommitOutcome, HoldReason, SurfaceId};
use crate::core::time::{ManualClock, MonotonicClock};
use crate::core::{CompositorState, Runtime};

const START_US: i64 = 1_000_000;
const INTERVAL_US: i64 = 16667;

#[derive(Default)]
struct Recorder {
    presented: RefCell<Vec<(&'static str, PresentedEvent)>>,
    discarded: RefCell<Vec<&'static str>>,
}

struct NamedFeedback(&'static str, Rc<Recorder>);

impl FeedbackSink for NamedFeedback {
    fn presented(&self, event: &PresentedEvent) {
        self.1.presented.borrow_mut().push((self.0, *event));
    }

    fn discarded(&self) {
        self.1.discarded.borrow_mut().push(self.0);
    }
}

struct Scales(Rc<RefCell<Vec<u32>>>);

impl ScaleSink for Scales {
    fn preferred_scale(&self, scale_120: u32) {
        self.0.borrow_mut().push(scale_120);
    }
}

struct Preferred(Rc<RefCell<Vec<u32>>>);

impl PreferredColorSink for Preferred {
    fn preferred_changed(&self, identity: u32) {
        self.0.borrow_mut().push(identity);
    }
}

struct Harness {
    runtime: Runtime,
    state: CompositorState,
    clock: ManualClock,
    output: OutputId,
}

impl Harness {
    fn new() -> Self {
        let clock = ManualClock::new(START_US);
        let time: Rc<dyn MonotonicClock> = Rc::new(clock.clone());
        let mut state = CompositorState::new(CompositorConfig::default(), time.clone());
        let output = state.add_output("HEADLESS-1", 1920, 1080, 60.0);
        let mut runtime = Runtime::new(time, FrameClockConfig::default());
        runtime.add_view(state.output(output).unwrap(), true);
        Self { runtime, state, clock, output }
    }

    fn add_output(&mut self, name: &str) -> OutputId {
        let output = self.state.add_output(name, 1280, 720, 60.0);
        self.runtime.add_view(self.state.output(output).unwrap(), true);
        output
    }

    /// Sleep as the runtime asks until it goes idle or `end_us` is reached.
    fn run_until(&mut self, end_us: i64) -> usize {
        let mut painted = self.runtime.tick(&mut self.state);
        while let Some(wait) = self.runtime.time_until_next_frame() {
            let next = self.clock.now_us() + wait.as_micros() as i64;
            if next > end_us {
                break;
            }
            self.clock.set(next);
            painted += self.runtime.tick(&mut self.state);
        }
        painted
    }

    fn feedback(&mut self, id: SurfaceId, name: &'static str, recorder: &Rc<Recorder>) {
        let sink = Box::new(NamedFeedback(name, recorder.clone()));
        self.state.add_presentation_feedback(id, PresentationFeedback::new(id, sink));
    }
}

fn hdr() -> Arc<ColorState> {
    ColorState::from_params(ColorParams::new(Colorspace::Bt2020, TransferFunction::Pq))
}

#[test]
fn test_fifo_client_one_frame_ahead() {
    let mut h = Harness::new();
    let recorder = Rc::new(Recorder::default());
    let id = h.state.create_surface(None, None);
    h.state.create_fifo(id).unwrap();

    h.state.attach_buffer(id, Some(Buffer::new(1, 64, 64, None)));
    h.state.fifo_set_barrier(id).unwrap();
    h.feedback(id, "first", &recorder);
    assert!(matches!(h.state.commit_surface(id).unwrap(), CommitOutcome::Applied(_)));

    h.state.attach_buffer(id, Some(Buffer::new(2, 64, 64, None)));
    h.state.fifo_wait_barrier(id).unwrap();
    h.state.fifo_set_barrier(id).unwrap();
    h.feedback(id, "second", &recorder);
    assert_eq!(h.state.commit_surface(id).unwrap(), CommitOutcome::Held(HoldReason::FifoBarrier));

    let painted = h.run_until(START_US + 4 * INTERVAL_US);
    assert_eq!(painted, 2);
    assert!(!h.state.has_held_commits());

    let presented = recorder.presented.borrow();
    let names: Vec<_> = presented.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, ["first", "second"]);

    let (_, first) = presented[0];
    let (_, second) = presented[1];
    assert_eq!((first.tv_sec_lo, first.tv_nsec), (1, 16_667_000));
    assert_eq!((second.tv_sec_lo, second.tv_nsec), (1, 33_334_000));
    assert!(second.seq_lo > first.seq_lo);
    assert!(second.flags.contains(PresentationFlags::VSYNC));
    assert_eq!(second.output, h.output);
    assert!(recorder.discarded.borrow().is_empty());
}

#[test]
fn test_held_commit_applies_buffer_viewport_and_color_together() {
    let mut h = Harness::new();
    let id = h.state.create_surface(None, None);
    h.state.create_fifo(id).unwrap();
    h.state.create_viewport(id).unwrap();
    h.state.create_color_surface(id).unwrap();
    let default_id = h.state.surface_color_state(id).unwrap().id();

    h.state.attach_buffer(id, Some(Buffer::new(1, 100, 100, None)));
    h.state.fifo_set_barrier(id).unwrap();
    h.state.commit_surface(id).unwrap();

    let hdr = hdr();
    h.state.attach_buffer(id, Some(Buffer::new(2, 200, 200, None)));
    h.state.set_viewport_destination(id, 50, 50).unwrap();
    h.state
        .set_surface_image_description(id, &ImageDescription::ready(hdr.clone(), true), 0)
        .unwrap();
    h.state.fifo_wait_barrier(id).unwrap();
    assert!(matches!(h.state.commit_surface(id).unwrap(), CommitOutcome::Held(_)));

    // Only the first frame has been shown: none of the held state is visible.
    h.run_until(START_US + INTERVAL_US - 1);
    assert_eq!(h.state.surface(id).unwrap().width(), 100);
    assert_eq!(h.state.surface_color_state(id).unwrap().id(), default_id);

    h.run_until(START_US + 3 * INTERVAL_US);
    let surface = h.state.surface(id).unwrap();
    assert_eq!(surface.width(), 50);
    assert_eq!(surface.current.buffer.as_ref().map(|b| b.id), Some(2));
    assert_eq!(h.state.surface_color_state(id).unwrap().id(), hdr.id());
}

#[test]
fn test_output_unplug_moves_surface_to_remaining_output() {
    let mut h = Harness::new();
    let second = h.add_output("HEADLESS-2");
    let hdr = hdr();
    h.state.set_output_scale(second, 2.0);
    h.state.set_output_color_state(second, hdr.clone());

    let recorder = Rc::new(Recorder::default());
    let scales = Rc::new(RefCell::new(Vec::new()));
    let preferred = Rc::new(RefCell::new(Vec::new()));

    let id = h.state.create_surface(None, None);
    h.state.create_fractional_scale(id, Box::new(Scales(scales.clone()))).unwrap();
    h.state.add_color_feedback(id, Box::new(Preferred(preferred.clone())));
    h.state.attach_buffer(id, Some(Buffer::new(1, 64, 64, None)));
    h.feedback(id, "in-flight", &recorder);
    h.state.commit_surface(id).unwrap();
    assert_eq!(h.state.surface(id).unwrap().main_output, Some(h.output));

    // Paint on the first output, then unplug it before the vblank.
    h.runtime.tick(&mut h.state);
    let first = h.output;
    h.runtime.remove_view(first, &mut h.state);
    h.state.remove_output(first);

    assert_eq!(*recorder.discarded.borrow(), ["in-flight"]);
    assert_eq!(h.state.surface(id).unwrap().main_output, Some(second));
    assert_eq!(*scales.borrow(), [120, 240]);
    assert_eq!(*preferred.borrow(), [hdr.id()]);

    // The surface keeps getting frames on the remaining output.
    h.feedback(id, "after-unplug", &recorder);
    h.state.commit_surface(id).unwrap();
    h.run_until(h.clock.now_us() + 2 * INTERVAL_US);
    let presented = recorder.presented.borrow();
    assert_eq!(presented.len(), 1);
    assert_eq!(presented[0].0, "after-unplug");
    assert_eq!(presented[0].1.output, second);
}
