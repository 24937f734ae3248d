//! Termination requests
//!
//! SIGINT and SIGTERM raise a process-wide flag that the run loop polls at
//! the start of every tick.

use std::sync::atomic::{AtomicBool, Ordering};

static TERMINATE: AtomicBool = AtomicBool::new(false);

/// Flag raised by the installed handlers
pub fn stop_flag() -> &'static AtomicBool {
    &TERMINATE
}

#[cfg(unix)]
extern "C" fn on_terminate(_signal: std::ffi::c_int) {
    // Only async-signal-safe work here
    TERMINATE.store(true, Ordering::SeqCst);
}

/// Install SIGINT/SIGTERM handlers
#[cfg(unix)]
pub fn install() -> nix::Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    let action = SigAction::new(
        SigHandler::Handler(on_terminate),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic
        unsafe { sigaction(signal, &action) }?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install() -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_lowered() {
        assert!(!stop_flag().load(Ordering::SeqCst));
    }
}
