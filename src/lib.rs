/// lvsim - Simulator harness for embedded GUI toolkits
///
/// This library selects one display backend (Wayland, X11, Linux framebuffer
/// or off-screen) from a registry of compiled-in backends, optionally stacks
/// an auxiliary input backend on top of it, and drives the toolkit and the
/// backends from a single run loop.

pub mod backend;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod run_loop;
pub mod signals;
pub mod simulator;
pub mod toolkit;

pub use backend::{Backend, BackendEvent, Capability, PumpStatus};
pub use config::{Settings, SettingsRequest};
pub use error::{ErrorKind, SimError, SimResult};
pub use lifecycle::{ActiveBackends, Selection, SlotState};
pub use registry::{BackendDescriptor, Registry, RegistryBuilder};
pub use run_loop::{QuitReason, RunOptions, RunSummary};
pub use simulator::Simulator;
pub use toolkit::{Frame, InputEvent, Key, Toolkit};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
