//! Unified run loop
//!
//! One loop, one cadence, whatever backends are active. Each tick advances
//! the toolkit clock, pumps the primary then the auxiliary backend, runs the
//! redraw pass, presents any produced frame on the primary, and yields.

use crate::backend::PumpStatus;
use crate::error::{SimError, SimResult};
use crate::lifecycle::ActiveBackends;
use crate::toolkit::Toolkit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Tunables for the run loop
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Upper bound on the per-tick yield
    pub max_idle: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            max_idle: Duration::from_millis(5),
        }
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuitReason {
    /// A backend asked to quit
    Backend(&'static str),
    /// The stop flag was raised (termination signal)
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks started, including the one that observed the quit
    pub ticks: u64,
    pub reason: QuitReason,
}

/// Drive the toolkit and the active backends until a quit is observed
pub fn run(
    active: &mut ActiveBackends,
    toolkit: &mut dyn Toolkit,
    stop: &AtomicBool,
    options: &RunOptions,
) -> SimResult<RunSummary> {
    for slot in active.slots_mut() {
        slot.mark_running();
    }

    // Selection only admits display-capable primaries
    debug_assert!(active.primary().capability().has_display());
    let mut last = Instant::now();
    let mut ticks: u64 = 0;

    log::info!("Entering run loop");
    loop {
        if stop.load(Ordering::SeqCst) {
            return Ok(finish(ticks, QuitReason::Terminated));
        }
        ticks += 1;

        let now = Instant::now();
        toolkit.tick_inc(now.duration_since(last));
        last = now;

        for slot in active.slots_mut() {
            let status = slot
                .backend_mut()
                .pump(toolkit)
                .map_err(|source| SimError::backend(slot.name(), source))?;
            if status == PumpStatus::Quit {
                return Ok(finish(ticks, QuitReason::Backend(slot.name())));
            }
        }

        let idle = toolkit.timer_handler();

        if let Some(frame) = toolkit.take_frame() {
            let primary = active.primary_mut();
            let name = primary.name();
            primary
                .backend_mut()
                .present(&frame)
                .map_err(|source| SimError::backend(name, source))?;
        }

        let idle = idle.min(options.max_idle);
        if !idle.is_zero() {
            thread::sleep(idle);
        }
    }
}

fn finish(ticks: u64, reason: QuitReason) -> RunSummary {
    log::info!("Run loop finished after {} ticks: {:?}", ticks, reason);
    RunSummary { ticks, reason }
}
