use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use cadence::config::CompositorConfig;
use cadence::core::time::{MonotonicClock, SystemClock};
use cadence::core::{Compositor, CompositorState, Runtime};
use cadence::util::logging::MAIN;
use cadence::wlog;

/// Longest sleep between two passes of the loop, so new client requests are
/// picked up while every view is idle.
const IDLE_POLL: Duration = Duration::from_millis(4);

fn main() -> Result<()> {
    // Set default log level to info
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,cadence=debug");
    }
    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_ansi(false)
        .init();

    let config = CompositorConfig::from_env();
    let clock: Rc<dyn MonotonicClock> = Rc::new(SystemClock);
    let mut state = CompositorState::new(config.clone(), clock.clone());
    let mut compositor = Compositor::new(config.clone()).context("Failed to create compositor")?;

    let output = compositor.add_output(
        &mut state,
        "HEADLESS-1",
        config.output_width,
        config.output_height,
        config.frame_clock.refresh_rate,
    );
    state.set_output_scale(output, config.output_scale);
    state.set_output_refresh_rate(output, config.frame_clock.refresh_rate, config.vrr);

    let mut runtime = Runtime::new(clock, config.frame_clock.clone());
    if let Some(info) = state.output(output) {
        runtime.add_view(info, true);
    }

    compositor.start(&mut state)?;
    wlog!(MAIN, "WAYLAND_DISPLAY={}", compositor.socket_name());

    loop {
        compositor.dispatch(&mut state)?;
        runtime.tick(&mut state);
        compositor.flush()?;

        let wait = runtime.time_until_next_frame().map_or(IDLE_POLL, |wait| wait.min(IDLE_POLL));
        std::thread::sleep(wait);
    }
}
