//! Headless run loop - drives the pipeline at a fixed frame cadence
//! without a window, for demos, replays, and CI. Handles graceful signal
//! shutdown, an optional exit timer, and periodic status logging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use calloop::EventLoop;
use tracing::{debug, info};

use crate::state::CanvasState;
use crate::tracking::source::{LandmarkSource, SourceFrame};

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Headless loop configuration.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Frame interval in milliseconds (camera cadence is ~33ms).
    pub frame_interval_ms: u64,
    /// Exit after N seconds (for CI).
    pub exit_after: Option<u64>,
    /// Seconds between periodic status log lines.
    pub status_interval_secs: u64,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 33,
            exit_after: None,
            status_interval_secs: 60,
        }
    }
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Run the pipeline until the source is exhausted, the exit timer fires,
/// or a shutdown signal arrives.
pub fn run(
    mut state: CanvasState,
    mut source: Box<dyn LandmarkSource>,
    config: HeadlessConfig,
) -> Result<()> {
    let mut event_loop = EventLoop::<CanvasState>::try_new()?;
    install_signal_handlers();

    let epoch = Instant::now();
    let exit_duration = config.exit_after.map(Duration::from_secs);
    let frame_interval = Duration::from_millis(config.frame_interval_ms);
    let status_interval = Duration::from_secs(config.status_interval_secs);
    let mut last_status_log = Instant::now();
    let mut last_status_line: Option<String> = None;

    info!(
        frame_interval_ms = config.frame_interval_ms,
        "headless loop starting",
    );

    while state.running {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("shutdown signal received, exiting");
            state.running = false;
            break;
        }
        if let Some(dur) = exit_duration {
            if epoch.elapsed() >= dur {
                info!("exit timer fired after {}s", dur.as_secs());
                state.running = false;
                break;
            }
        }

        let now_ms = epoch.elapsed().as_secs_f64() * 1000.0;
        match source.next_frame(now_ms) {
            SourceFrame::Sample(sample) => state.frame(Some(&sample), now_ms),
            SourceFrame::NoHand => state.frame(None, now_ms),
            SourceFrame::Exhausted => {
                state.frame(None, now_ms);
                // Without an exit timer a finished source ends the run.
                if exit_duration.is_none() {
                    info!("landmark source exhausted, exiting");
                    state.running = false;
                }
            }
        }

        // The headless stand-ins for on-screen feedback: log the status
        // line when it changes and the closing pulse while it runs.
        let status_line = state.status(now_ms).map(str::to_string);
        if status_line != last_status_line {
            if let Some(message) = &status_line {
                info!(message = %message, "status line");
            }
            last_status_line = status_line;
        }
        if let Some(progress) = state.router.closing_progress(now_ms) {
            debug!(progress, "closing pulse");
        }

        if last_status_log.elapsed() >= status_interval {
            info!(
                objects = state.objects.len(),
                gesture = state.last_gesture.as_str(),
                grabbed = ?state.router.grabbed(),
                session = state.session.status().as_str(),
                "status",
            );
            last_status_log = Instant::now();
        }

        event_loop.dispatch(Some(frame_interval), &mut state)?;
    }

    source.stop();
    info!(
        objects = state.objects.len(),
        session = state.session.status().as_str(),
        "headless loop shutting down",
    );
    Ok(())
}
