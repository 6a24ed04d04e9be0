use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::core::frame_clock::*;
use crate::core::time::{ManualClock, MonotonicClock};

const REFRESH_60HZ_US: i64 = 16667;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    BeforeFrame(i64),
    Frame(i64, i64),
}

/// Listener that records every callback and answers with a fixed result.
struct RecordingListener {
    calls: Rc<RefCell<Vec<Call>>>,
    result: FrameResult,
    reschedule: bool,
}

impl FrameListener for RecordingListener {
    fn before_frame(&mut self, _ctx: &mut FrameContext, frame_count: i64) {
        self.calls.borrow_mut().push(Call::BeforeFrame(frame_count));
    }

    fn frame(&mut self, ctx: &mut FrameContext, frame_count: i64, time_us: i64) -> FrameResult {
        self.calls.borrow_mut().push(Call::Frame(frame_count, time_us));
        if self.reschedule {
            ctx.schedule_update();
        }
        self.result
    }
}

fn make_clock(result: FrameResult, reschedule: bool) -> (FrameClock, ManualClock, Rc<RefCell<Vec<Call>>>) {
    let time = ManualClock::new(1_000_000);
    let calls = Rc::new(RefCell::new(Vec::new()));
    let listener = RecordingListener { calls: calls.clone(), result, reschedule };
    let clock = FrameClock::new(60.0, Box::new(listener), Rc::new(time.clone()));
    (clock, time, calls)
}

fn presented_at(time_us: i64) -> FrameInfo {
    FrameInfo {
        view_frame_counter: 0,
        presentation_time_us: time_us,
        refresh_rate: 60.0,
        flags: FrameInfoFlags::VSYNC | FrameInfoFlags::HW_CLOCK,
        sequence: 0,
    }
}

#[derive(Default)]
struct DriverLog {
    scheduled: Cell<u32>,
    unscheduled: Cell<u32>,
}

struct TestDriver(Rc<DriverLog>);

impl FrameClockDriver for TestDriver {
    fn schedule_update(&mut self) {
        self.0.scheduled.set(self.0.scheduled.get() + 1);
    }

    fn unschedule_update(&mut self) {
        self.0.unscheduled.set(self.0.unscheduled.get() + 1);
    }
}

#[test]
fn test_new_clock_is_init() {
    let (clock, _time, calls) = make_clock(FrameResult::Idle, false);
    assert_eq!(clock.state(), FrameClockState::Init);
    assert_eq!(clock.frame_count(), 0);
    assert_eq!(clock.ready_time_us(), None);
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_first_schedule_is_immediate() {
    let (mut clock, time, _calls) = make_clock(FrameResult::Idle, false);
    clock.schedule_update();
    assert_eq!(clock.state(), FrameClockState::Scheduled);
    // Nothing has been presented yet, so there is no vblank to align to.
    assert_eq!(clock.ready_time_us(), Some(time.now_us()));
    assert!(clock.is_due(time.now_us()));
}

#[test]
fn test_schedule_update_is_idempotent() {
    let (mut clock, time, _calls) = make_clock(FrameResult::Idle, false);
    clock.schedule_update();
    let ready = clock.ready_time_us();
    time.advance(500);
    clock.schedule_update();
    assert_eq!(clock.state(), FrameClockState::Scheduled);
    assert_eq!(clock.ready_time_us(), ready);
}

#[test]
fn test_frame_counter_is_monotonic() {
    let (mut clock, time, calls) = make_clock(FrameResult::Idle, false);
    for expected in 0..5 {
        clock.schedule_update();
        let dispatch = clock.dispatch(time.now_us()).unwrap();
        assert_eq!(dispatch.frame_count, expected);
        assert_eq!(dispatch.result, FrameResult::Idle);
        time.advance(REFRESH_60HZ_US);
    }
    assert_eq!(clock.frame_count(), 5);

    let frames: Vec<i64> = calls
        .borrow()
        .iter()
        .filter_map(|call| match call {
            Call::Frame(n, _) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(frames, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_before_frame_runs_first() {
    let (mut clock, time, calls) = make_clock(FrameResult::Idle, false);
    clock.schedule_update();
    let now = time.now_us();
    clock.dispatch(now);

    assert_eq!(*calls.borrow(), vec![Call::BeforeFrame(0), Call::Frame(0, now)]);
}

#[test]
fn test_pending_presentation_until_presented() {
    let (mut clock, time, _calls) = make_clock(FrameResult::PendingPresented, false);
    clock.schedule_update();
    clock.dispatch(time.now_us());
    assert_eq!(clock.state(), FrameClockState::PendingPresentation);

    // Requests during the in-flight frame are remembered, not acted on.
    clock.schedule_update();
    assert_eq!(clock.state(), FrameClockState::PendingPresentation);

    time.advance(REFRESH_60HZ_US);
    clock.notify_presented(&presented_at(time.now_us()));
    assert_eq!(clock.state(), FrameClockState::Scheduled);
    assert_eq!(clock.last_presentation_time_us(), Some(time.now_us()));
}

#[test]
fn test_notify_ready_returns_to_idle() {
    let (mut clock, time, _calls) = make_clock(FrameResult::PendingPresented, false);
    clock.schedule_update();
    clock.dispatch(time.now_us());
    clock.notify_ready();
    assert_eq!(clock.state(), FrameClockState::Idle);
    assert_eq!(clock.last_presentation_time_us(), None);
}

#[test]
fn test_schedule_from_frame_callback() {
    let (mut clock, time, _calls) = make_clock(FrameResult::Idle, true);
    clock.schedule_update();
    clock.dispatch(time.now_us());
    // The listener asked for another frame; the clock is scheduled again
    // rather than dispatching recursively.
    assert_eq!(clock.state(), FrameClockState::Scheduled);
    assert_eq!(clock.frame_count(), 1);
}

#[test]
fn test_next_update_aligns_to_vblank() {
    let (mut clock, time, _calls) = make_clock(FrameResult::PendingPresented, false);
    clock.schedule_update();
    clock.dispatch(time.now_us());

    let vblank = time.now_us() + REFRESH_60HZ_US;
    time.set(vblank);
    clock.notify_presented(&presented_at(vblank));
    clock.schedule_update();

    let presentation = clock.next_presentation_time_us().unwrap();
    assert_eq!(presentation, vblank + REFRESH_60HZ_US);
    let max_render = REFRESH_60HZ_US - DEFAULT_SYNC_DELAY_US;
    assert_eq!(clock.ready_time_us(), Some(presentation - max_render));
}

#[test]
fn test_next_update_skips_missed_vblanks() {
    let (mut clock, time, _calls) = make_clock(FrameResult::PendingPresented, false);
    clock.schedule_update();
    clock.dispatch(time.now_us());
    let vblank = time.now_us() + REFRESH_60HZ_US;
    clock.notify_presented(&presented_at(vblank));

    // Long idle period: the next presentation lands in the future, never in
    // the past.
    time.set(vblank + 10 * REFRESH_60HZ_US + 100);
    clock.schedule_update();
    let presentation = clock.next_presentation_time_us().unwrap();
    assert!(presentation >= time.now_us() + REFRESH_60HZ_US / 2);
    assert_eq!((presentation - vblank) % REFRESH_60HZ_US, 0);
}

#[test]
fn test_inhibit_unschedules() {
    let (mut clock, _time, _calls) = make_clock(FrameResult::Idle, false);
    clock.schedule_update();
    clock.inhibit();
    assert_eq!(clock.state(), FrameClockState::Inhibited);
    assert_eq!(clock.ready_time_us(), None);

    clock.uninhibit();
    // The schedule that was interrupted is restored.
    assert_eq!(clock.state(), FrameClockState::Scheduled);
}

#[test]
fn test_inhibit_is_reference_counted() {
    let (mut clock, time, _calls) = make_clock(FrameResult::Idle, false);
    clock.inhibit();
    clock.inhibit();
    clock.schedule_update();
    assert_eq!(clock.state(), FrameClockState::Inhibited);

    clock.uninhibit();
    assert!(clock.is_inhibited());
    assert!(!clock.is_due(time.now_us()));
    assert_eq!(clock.state(), FrameClockState::Inhibited);

    clock.uninhibit();
    assert!(!clock.is_inhibited());
    assert_eq!(clock.state(), FrameClockState::Scheduled);
    assert!(clock.dispatch(time.now_us()).is_some());
}

#[test]
fn test_inhibit_during_presentation() {
    let (mut clock, time, _calls) = make_clock(FrameResult::PendingPresented, false);
    clock.schedule_update();
    clock.dispatch(time.now_us());
    clock.inhibit();
    assert_eq!(clock.state(), FrameClockState::PendingPresentation);

    // The in-flight frame still resolves.
    clock.notify_presented(&presented_at(time.now_us() + REFRESH_60HZ_US));
    assert_eq!(clock.state(), FrameClockState::Inhibited);

    clock.uninhibit();
    assert_eq!(clock.state(), FrameClockState::Idle);
}

#[test]
#[should_panic(expected = "uninhibited more often")]
fn test_unbalanced_uninhibit_panics() {
    let (mut clock, _time, _calls) = make_clock(FrameResult::Idle, false);
    clock.uninhibit();
}

#[test]
#[should_panic(expected = "outside of the scheduled state")]
fn test_double_dispatch_panics() {
    let (mut clock, time, _calls) = make_clock(FrameResult::PendingPresented, false);
    clock.schedule_update();
    clock.dispatch(time.now_us());
    clock.dispatch(time.now_us());
}

#[test]
#[should_panic(expected = "dispatched while inhibited")]
fn test_dispatch_while_inhibited_panics() {
    let (mut clock, time, _calls) = make_clock(FrameResult::Idle, false);
    clock.schedule_update();
    clock.inhibit();
    clock.dispatch(time.now_us());
}

#[test]
fn test_schedule_update_now_rearms() {
    let (mut clock, time, _calls) = make_clock(FrameResult::PendingPresented, false);
    clock.schedule_update();
    clock.dispatch(time.now_us());
    clock.notify_presented(&presented_at(time.now_us() + REFRESH_60HZ_US));
    time.advance(REFRESH_60HZ_US + 10);

    clock.schedule_update();
    assert!(clock.ready_time_us().unwrap() > time.now_us());
    clock.schedule_update_now();
    assert_eq!(clock.ready_time_us(), Some(time.now_us()));
}

#[test]
fn test_driver_receives_schedule_requests() {
    let (mut clock, time, _calls) = make_clock(FrameResult::Idle, false);
    let log = Rc::new(DriverLog::default());
    clock.set_driver(Some(Box::new(TestDriver(log.clone()))));

    clock.schedule_update();
    assert_eq!(log.scheduled.get(), 1);
    // Driven clocks are not polled by the event loop.
    assert!(!clock.is_due(time.now_us()));

    clock.inhibit();
    assert_eq!(log.unscheduled.get(), 1);
}

#[test]
fn test_driver_swap_preserves_counter_and_schedule() {
    let (mut clock, time, _calls) = make_clock(FrameResult::Idle, false);
    for _ in 0..3 {
        clock.schedule_update();
        clock.dispatch(time.now_us());
        time.advance(REFRESH_60HZ_US);
    }

    let first = Rc::new(DriverLog::default());
    clock.schedule_update();
    clock.set_driver(Some(Box::new(TestDriver(first.clone()))));
    assert_eq!(first.scheduled.get(), 1);

    let second = Rc::new(DriverLog::default());
    clock.set_driver(Some(Box::new(TestDriver(second.clone()))));
    assert_eq!(first.unscheduled.get(), 1);
    assert_eq!(second.scheduled.get(), 1);

    let dispatch = clock.dispatch(time.now_us()).unwrap();
    assert_eq!(dispatch.frame_count, 3);

    clock.set_driver(None);
    assert_eq!(clock.frame_count(), 4);
}

fn make_shared_clock() -> (SharedFrameClock, Rc<Cell<u32>>) {
    let time = ManualClock::new(1_000_000);
    let listener = RecordingListener {
        calls: Rc::new(RefCell::new(Vec::new())),
        result: FrameResult::Idle,
        reschedule: false,
    };
    let shared = FrameClock::new_shared(60.0, Box::new(listener), Rc::new(time));
    let fired = Rc::new(Cell::new(0));
    let counter = fired.clone();
    shared.borrow_mut().connect_destroy(move || counter.set(counter.get() + 1));
    (shared, fired)
}

#[test]
fn test_destroy_notifies_once_on_drop() {
    let (shared, fired) = make_shared_clock();
    drop(shared);
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_destroy_notifies_once_with_external_reference() {
    let (shared, fired) = make_shared_clock();
    let external = shared.clone();
    shared.borrow_mut().destroy();
    assert_eq!(fired.get(), 1);
    assert!(external.borrow().is_destroyed());

    drop(shared);
    drop(external);
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_destroyed_clock_ignores_requests() {
    let (mut clock, time, calls) = make_clock(FrameResult::Idle, false);
    clock.schedule_update();
    clock.destroy();
    assert!(clock.dispatch(time.now_us()).is_none());
    clock.schedule_update();
    assert!(calls.borrow().is_empty());
}

/// Presents ten frames, then goes idle on the eleventh.
struct TenFramesListener {
    calls: Rc<RefCell<Vec<Call>>>,
}

impl FrameListener for TenFramesListener {
    fn frame(&mut self, ctx: &mut FrameContext, frame_count: i64, time_us: i64) -> FrameResult {
        self.calls.borrow_mut().push(Call::Frame(frame_count, time_us));
        if frame_count < 10 {
            ctx.schedule_update();
            FrameResult::PendingPresented
        } else {
            FrameResult::Idle
        }
    }
}

#[test]
fn test_sixty_hz_run_paces_to_vblank() {
    let time = ManualClock::new(1_000_000);
    let calls = Rc::new(RefCell::new(Vec::new()));
    let listener = TenFramesListener { calls: calls.clone() };
    let mut clock = FrameClock::new(60.0, Box::new(listener), Rc::new(time.clone()));
    let start = time.now_us();
    let mut dispatch_times = Vec::new();

    clock.schedule_update();
    while clock.state() == FrameClockState::Scheduled {
        let ready = clock.ready_time_us().expect("clock should be scheduled");
        if ready > time.now_us() {
            time.set(ready);
        }
        let now = time.now_us();
        let dispatch = clock.dispatch(now).unwrap();
        dispatch_times.push(now);
        if dispatch.result == FrameResult::Idle {
            break;
        }

        // Simulated scanout at the next vblank of a 60 Hz display.
        let vblank = start + ((now - start) / REFRESH_60HZ_US + 1) * REFRESH_60HZ_US;
        time.set(vblank);
        clock.notify_presented(&presented_at(vblank));
    }
    assert_eq!(clock.state(), FrameClockState::Idle);
    assert_eq!(dispatch_times.len(), 11);

    let frames: Vec<i64> = calls
        .borrow()
        .iter()
        .filter_map(|call| match call {
            Call::Frame(n, _) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(frames, (0..=10).collect::<Vec<_>>());

    let elapsed = dispatch_times[10] - dispatch_times[0];
    assert!(elapsed > 10 * REFRESH_60HZ_US, "elapsed {}us", elapsed);
}

#[test]
fn test_unusable_refresh_rate_falls_back() {
    let time = ManualClock::new(1_000_000);
    let listener = RecordingListener {
        calls: Rc::new(RefCell::new(Vec::new())),
        result: FrameResult::PendingPresented,
        reschedule: false,
    };
    let mut clock = FrameClock::new(1.0e7, Box::new(listener), Rc::new(time.clone()));
    assert_eq!(clock.refresh_rate(), FALLBACK_REFRESH_RATE);
    assert!(clock.refresh_interval_us() > 0);

    clock.set_refresh_rate(f32::INFINITY);
    assert_eq!(clock.refresh_rate(), FALLBACK_REFRESH_RATE);

    // A presented frame followed by a new request must schedule normally.
    clock.schedule_update();
    clock.dispatch(time.now_us()).unwrap();
    time.advance(REFRESH_60HZ_US);
    clock.notify_presented(&presented_at(time.now_us()));
    clock.schedule_update();
    assert_eq!(clock.state(), FrameClockState::Scheduled);
    assert!(clock.ready_time_us().is_some());
}
