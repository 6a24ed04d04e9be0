use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::core::color::{ColorParams, ColorState, Colorspace, TransferFunction};
use crate::core::errors::ProtocolError;
use crate::core::output::OutputId;
use crate::core::presentation::{FeedbackSink, PresentationFeedback, PresentedEvent};
use crate::core::surface::*;

const NOW: i64 = 5_000_000;

#[derive(Default)]
struct FeedbackLog {
    presented: RefCell<u32>,
    discarded: RefCell<u32>,
}

struct LoggingSink(Rc<FeedbackLog>);

impl FeedbackSink for LoggingSink {
    fn presented(&self, _event: &PresentedEvent) {
        *self.0.presented.borrow_mut() += 1;
    }

    fn discarded(&self) {
        *self.0.discarded.borrow_mut() += 1;
    }
}

fn new_surface() -> (Surface, Arc<ColorState>) {
    let default = ColorState::srgb();
    (Surface::new(SurfaceId(1), None, None, default.clone()), default)
}

struct DoneLog(Rc<RefCell<Vec<u32>>>);

impl FrameCallbackSink for DoneLog {
    fn done(&self, time_ms: u32) {
        self.0.borrow_mut().push(time_ms);
    }
}

fn feedback(surface: &Surface, log: &Rc<FeedbackLog>) -> PresentationFeedback {
    PresentationFeedback::new(surface.id, Box::new(LoggingSink(log.clone())))
}

#[test]
fn test_surface_init() {
    let (surface, default) = new_surface();
    assert_eq!(surface.id, SurfaceId(1));
    assert_eq!((surface.width(), surface.height()), (0, 0));
    assert!(Arc::ptr_eq(&surface.current.color_state, &default));
    assert!(!surface.has_held_commit());
}

#[test]
fn test_surface_commit_buffer_size() {
    let (mut surface, default) = new_surface();
    surface.attach(Some(Buffer::new(1, 200, 100, None)));
    surface.set_buffer_scale(2).unwrap();

    // Nothing changes before commit.
    assert_eq!(surface.width(), 0);

    let outcome = surface.commit(NOW, &default).unwrap();
    let CommitOutcome::Applied(changes) = outcome else {
        panic!("commit should apply, got {:?}", outcome);
    };
    assert!(changes.buffer_changed);
    assert!(changes.size_changed);
    assert_eq!((surface.width(), surface.height()), (100, 50));

    // Pending is reset, the applied scale stays.
    assert!(!surface.pending.newly_attached);
    assert_eq!(surface.current.scale, 2);
}

#[test]
fn test_rotated_buffer_swaps_size() {
    let (mut surface, default) = new_surface();
    surface.attach(Some(Buffer::new(1, 200, 100, None)));
    surface.set_buffer_transform(Transform::Rotate90);
    surface.commit(NOW, &default).unwrap();
    assert_eq!((surface.width(), surface.height()), (100, 200));
}

#[test]
fn test_invalid_buffer_scale() {
    let (mut surface, _default) = new_surface();
    assert_eq!(surface.set_buffer_scale(0), Err(ProtocolError::InvalidScale(0)));
}

#[test]
fn test_viewport_destination_wins() {
    let (mut surface, default) = new_surface();
    surface.attach(Some(Buffer::new(1, 200, 100, None)));
    surface.set_viewport_source(Some(ViewportSource { x: 0.0, y: 0.0, width: 50.5, height: 20.25 }));
    surface.set_viewport_destination(Some((320, 240)));
    surface.commit(NOW, &default).unwrap();
    assert_eq!((surface.width(), surface.height()), (320, 240));
    assert!(surface.current.viewport.has_src_rect());
    assert!(surface.current.viewport.has_dst_size());
}

#[test]
fn test_viewport_source_rounds_up() {
    let (mut surface, default) = new_surface();
    surface.attach(Some(Buffer::new(1, 200, 100, None)));
    surface.set_viewport_source(Some(ViewportSource { x: 0.0, y: 0.0, width: 50.0, height: 20.0 }));
    surface.commit(NOW, &default).unwrap();
    assert_eq!((surface.width(), surface.height()), (50, 20));

    // Changing only the destination keeps the applied source.
    surface.set_viewport_destination(Some((64, 48)));
    surface.commit(NOW, &default).unwrap();
    assert_eq!(surface.current.viewport.source.unwrap().width, 50.0);
    assert_eq!((surface.width(), surface.height()), (64, 48));

    surface.reset_viewport();
    surface.commit(NOW, &default).unwrap();
    assert_eq!((surface.width(), surface.height()), (200, 100));
}

#[test]
fn test_viewport_out_of_buffer_rejected_on_commit() {
    let (mut surface, default) = new_surface();
    surface.attach(Some(Buffer::new(1, 100, 100, None)));
    surface.set_viewport_source(Some(ViewportSource { x: 60.0, y: 0.0, width: 50.0, height: 50.0 }));
    assert_eq!(surface.commit(NOW, &default), Err(ProtocolError::ViewportOutOfBuffer));
}

#[test]
fn test_commit_is_atomic() {
    let (mut surface, default) = new_surface();
    let log = Rc::new(FeedbackLog::default());
    let hdr = ColorState::from_params(ColorParams::new(Colorspace::Bt2020, TransferFunction::Pq));

    surface.attach(Some(Buffer::new(1, 64, 64, None)));
    surface.set_viewport_destination(Some((32, 32)));
    surface.set_color_state(Some(hdr.clone()));
    surface.set_fifo_barrier();
    let fb = feedback(&surface, &log);
    surface.add_presentation_feedback(fb);

    // Staged values are invisible until commit.
    assert_eq!(surface.width(), 0);
    assert!(Arc::ptr_eq(&surface.current.color_state, &default));
    assert!(!surface.fifo_barrier_active());
    assert!(!surface.has_presentation_feedback());

    let CommitOutcome::Applied(changes) = surface.commit(NOW, &default).unwrap() else {
        panic!("commit should apply");
    };
    assert!(changes.color_state_changed);
    assert!(changes.fifo_barrier_set);
    assert!(changes.has_presentation_feedback);

    assert_eq!((surface.width(), surface.height()), (32, 32));
    assert!(Arc::ptr_eq(&surface.current.color_state, &hdr));
    assert!(surface.fifo_barrier_active());
    assert!(surface.has_presentation_feedback());
    assert_eq!(*log.discarded.borrow(), 0);
}

#[test]
fn test_unset_color_state_uses_default() {
    let (mut surface, default) = new_surface();
    let hdr = ColorState::from_params(ColorParams::new(Colorspace::Bt2020, TransferFunction::Pq));
    surface.set_color_state(Some(hdr));
    surface.commit(NOW, &default).unwrap();

    surface.set_color_state(None);
    surface.commit(NOW, &default).unwrap();
    assert!(Arc::ptr_eq(&surface.current.color_state, &default));
}

#[test]
fn test_new_commit_discards_unshown_feedback() {
    let (mut surface, default) = new_surface();
    let log = Rc::new(FeedbackLog::default());

    let fb = feedback(&surface, &log);
    surface.add_presentation_feedback(fb);
    surface.commit(NOW, &default).unwrap();

    // Committed again before any paint picked the first content up.
    let fb = feedback(&surface, &log);
    surface.add_presentation_feedback(fb);
    surface.commit(NOW, &default).unwrap();

    assert_eq!(*log.discarded.borrow(), 1);
    assert_eq!(surface.take_presentation_feedback().len(), 1);
}

#[test]
fn test_target_time_rejected_twice() {
    let (mut surface, default) = new_surface();
    surface.set_target_time(NOW).unwrap();
    assert_eq!(surface.set_target_time(NOW + 1), Err(ProtocolError::TimestampExists));

    surface.commit(NOW, &default).unwrap();
    // A new commit cycle accepts a new timestamp.
    assert!(surface.set_target_time(NOW + 2).is_ok());
}

#[test]
fn test_future_target_time_is_held() {
    let (mut surface, default) = new_surface();
    surface.attach(Some(Buffer::new(1, 10, 10, None)));
    surface.set_target_time(NOW + 20_000).unwrap();

    let outcome = surface.commit(NOW, &default).unwrap();
    assert_eq!(outcome, CommitOutcome::Held(HoldReason::TargetTime(NOW + 20_000)));
    assert_eq!(surface.width(), 0);

    // A frame presenting before the target keeps it held.
    assert!(surface.release_held(NOW + 16_667, &default).is_none());
    // Not before: the first frame at or past the target applies it.
    assert!(surface.release_held(NOW + 33_334, &default).is_some());
    assert_eq!(surface.width(), 10);
    assert_eq!(surface.current.target_time_us, Some(NOW + 20_000));
}

#[test]
fn test_past_target_time_applies_immediately() {
    let (mut surface, default) = new_surface();
    surface.set_target_time(NOW - 1).unwrap();
    assert!(matches!(surface.commit(NOW, &default).unwrap(), CommitOutcome::Applied(_)));
}

#[test]
fn test_fifo_wait_holds_until_barrier_clears() {
    let (mut surface, default) = new_surface();
    surface.main_output = Some(OutputId(1));

    surface.attach(Some(Buffer::new(1, 10, 10, None)));
    surface.set_fifo_barrier();
    surface.commit(NOW, &default).unwrap();
    assert!(surface.fifo_barrier_active());

    surface.attach(Some(Buffer::new(2, 20, 20, None)));
    surface.set_fifo_wait();
    surface.set_fifo_barrier();
    assert_eq!(surface.commit(NOW, &default).unwrap(), CommitOutcome::Held(HoldReason::FifoBarrier));
    assert!(surface.release_held(NOW, &default).is_none());

    assert!(surface.clear_fifo_barrier());
    let changes = surface.release_held(NOW, &default).unwrap();
    assert!(changes.fifo_barrier_set);
    assert_eq!(surface.width(), 20);
    assert!(surface.fifo_barrier_active());
}

#[test]
fn test_fifo_wait_without_output_does_not_block() {
    let (mut surface, default) = new_surface();
    surface.set_fifo_barrier();
    surface.commit(NOW, &default).unwrap();

    surface.set_fifo_wait();
    assert!(matches!(surface.commit(NOW, &default).unwrap(), CommitOutcome::Applied(_)));
}

#[test]
fn test_commits_behind_held_commit_merge() {
    let (mut surface, default) = new_surface();
    let log = Rc::new(FeedbackLog::default());
    surface.main_output = Some(OutputId(1));
    surface.set_fifo_barrier();
    surface.commit(NOW, &default).unwrap();

    surface.attach(Some(Buffer::new(1, 10, 10, None)));
    surface.set_fifo_wait();
    let fb = feedback(&surface, &log);
    surface.add_presentation_feedback(fb);
    surface.commit(NOW, &default).unwrap();

    // Later commit: later values win, the superseded feedback is discarded.
    surface.attach(Some(Buffer::new(2, 30, 30, None)));
    surface.set_viewport_destination(Some((15, 15)));
    let fb = feedback(&surface, &log);
    surface.add_presentation_feedback(fb);
    assert_eq!(surface.commit(NOW, &default).unwrap(), CommitOutcome::Merged);
    assert_eq!(*log.discarded.borrow(), 1);

    surface.clear_fifo_barrier();
    surface.release_held(NOW, &default).unwrap();
    assert_eq!(surface.current.buffer.as_ref().unwrap().id, 2);
    assert_eq!((surface.width(), surface.height()), (15, 15));
    assert!(!surface.has_held_commit());
    assert_eq!(surface.take_presentation_feedback().len(), 1);
}

#[test]
fn test_viewport_checked_against_held_buffer() {
    let (mut surface, default) = new_surface();
    surface.main_output = Some(OutputId(1));
    surface.attach(Some(Buffer::new(1, 10, 10, None)));
    surface.set_fifo_barrier();
    surface.commit(NOW, &default).unwrap();

    surface.attach(Some(Buffer::new(2, 100, 100, None)));
    surface.set_fifo_wait();
    assert_eq!(surface.commit(NOW, &default).unwrap(), CommitOutcome::Held(HoldReason::FifoBarrier));

    // Crops the held buffer, which is larger than the one on screen.
    surface.set_viewport_source(Some(ViewportSource { x: 0.0, y: 0.0, width: 50.0, height: 50.0 }));
    assert_eq!(surface.commit(NOW, &default), Ok(CommitOutcome::Merged));

    surface.set_viewport_source(Some(ViewportSource { x: 60.0, y: 0.0, width: 50.0, height: 50.0 }));
    assert_eq!(surface.commit(NOW, &default), Err(ProtocolError::ViewportOutOfBuffer));

    surface.clear_fifo_barrier();
    surface.release_held(NOW, &default).unwrap();
    assert_eq!((surface.width(), surface.height()), (50, 50));
}

#[test]
fn test_held_buffer_scale_used_for_viewport_check() {
    let (mut surface, default) = new_surface();
    surface.main_output = Some(OutputId(1));
    surface.set_fifo_barrier();
    surface.commit(NOW, &default).unwrap();

    surface.attach(Some(Buffer::new(1, 100, 100, None)));
    surface.set_buffer_scale(2).unwrap();
    surface.set_fifo_wait();
    surface.commit(NOW, &default).unwrap();

    // 50x50 in surface coordinates once the held scale applies.
    surface.set_viewport_source(Some(ViewportSource { x: 0.0, y: 0.0, width: 60.0, height: 60.0 }));
    assert_eq!(surface.commit(NOW, &default), Err(ProtocolError::ViewportOutOfBuffer));
}

#[test]
fn test_frame_callbacks_follow_held_commit() {
    let (mut surface, default) = new_surface();
    let done = Rc::new(RefCell::new(Vec::new()));
    surface.main_output = Some(OutputId(1));
    surface.set_fifo_barrier();
    surface.commit(NOW, &default).unwrap();

    surface.attach(Some(Buffer::new(1, 10, 10, None)));
    surface.set_fifo_wait();
    surface.add_frame_callback(FrameCallback::new(Box::new(DoneLog(done.clone()))));
    surface.commit(NOW, &default).unwrap();
    assert_eq!(surface.frame_callback_count(), 0);

    surface.add_frame_callback(FrameCallback::new(Box::new(DoneLog(done.clone()))));
    assert_eq!(surface.commit(NOW, &default).unwrap(), CommitOutcome::Merged);
    assert_eq!(surface.frame_callback_count(), 0);

    surface.clear_fifo_barrier();
    surface.release_held(NOW, &default).unwrap();
    assert_eq!(surface.frame_callback_count(), 2);
    for callback in surface.take_frame_callbacks() {
        callback.done(16);
    }
    assert_eq!(*done.borrow(), [16, 16]);
    assert_eq!(surface.frame_callback_count(), 0);
}

#[test]
fn test_discard_all_feedback() {
    let (mut surface, default) = new_surface();
    let log = Rc::new(FeedbackLog::default());

    let fb = feedback(&surface, &log);
    surface.add_presentation_feedback(fb);
    surface.commit(NOW, &default).unwrap();
    let fb = feedback(&surface, &log);
    surface.add_presentation_feedback(fb);

    surface.discard_all_feedback();
    assert_eq!(*log.discarded.borrow(), 2);
    assert_eq!(*log.presented.borrow(), 0);
}
