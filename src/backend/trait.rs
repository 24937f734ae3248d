//! Backend trait definition
//!
//! This module defines the trait that all display and input backends must
//! implement. A backend bridges the toolkit to one native mechanism: it
//! acquires a surface and/or an input source in `init`, services its native
//! event source in `pump`, and releases everything in `deinit`.

use crate::config::{Settings, MAX_WINDOW_DIMENSION};
use crate::toolkit::{Frame, InputEvent, Toolkit};
use std::error::Error;
use std::fmt;

/// Error type for backend operations
pub type BackendError = Box<dyn Error + Send + Sync>;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// What a backend can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Produces a renderable surface
    Display,
    /// Consumes input events
    Input,
    /// Both
    DisplayAndInput,
}

impl Capability {
    pub fn has_display(self) -> bool {
        matches!(self, Capability::Display | Capability::DisplayAndInput)
    }

    pub fn has_input(self) -> bool {
        matches!(self, Capability::Input | Capability::DisplayAndInput)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Capability::Display => "display",
            Capability::Input => "input",
            Capability::DisplayAndInput => "display+input",
        };
        f.pad(label)
    }
}

/// Outcome of one pump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    Continue,
    /// The backend wants the session to end (e.g. its window was closed)
    Quit,
}

/// Native events after translation, before delivery to the toolkit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendEvent {
    Input(InputEvent),
    /// The native surface changed size
    Resize { width: u32, height: u32 },
    /// The user asked to close the surface
    CloseRequested,
}

/// The main backend trait
///
/// Every method is called from the thread that owns the toolkit. Backends
/// with their own native event thread must hand events over through an
/// [`EventQueue`](super::EventQueue) and only touch the toolkit inside `pump`.
pub trait Backend {
    /// Acquire native resources and bind the surface and/or input source
    fn init(&mut self, settings: &Settings) -> BackendResult<()>;

    /// Release everything acquired by `init`
    fn deinit(&mut self) -> BackendResult<()>;

    /// Service the native event source and deliver events to the toolkit
    ///
    /// Must not block for more than a small, backend-defined budget.
    fn pump(&mut self, toolkit: &mut dyn Toolkit) -> BackendResult<PumpStatus>;

    /// Push a rendered frame to the native surface
    fn present(&mut self, frame: &Frame<'_>) -> BackendResult<()> {
        // Default implementation: nothing to show (input-only backends)
        let _ = frame;
        Ok(())
    }
}

/// Deliver translated events to the toolkit in order
///
/// Delivery stops at the first [`BackendEvent::CloseRequested`]; anything
/// after it in the same batch is dropped.
pub fn deliver<I>(events: I, toolkit: &mut dyn Toolkit) -> PumpStatus
where
    I: IntoIterator<Item = BackendEvent>,
{
    for event in events {
        match event {
            BackendEvent::Input(input) => toolkit.inject(input),
            BackendEvent::Resize { width, height } => {
                let valid = 1..=MAX_WINDOW_DIMENSION;
                if valid.contains(&width) && valid.contains(&height) {
                    toolkit.resize(width, height);
                } else {
                    log::warn!("Ignoring resize to {}x{}", width, height);
                }
            }
            BackendEvent::CloseRequested => return PumpStatus::Quit,
        }
    }
    PumpStatus::Continue
}
