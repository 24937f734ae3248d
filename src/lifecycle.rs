//! Backend lifecycle
//!
//! Turns a requested backend name (or none) into an initialized primary
//! backend, optionally stacked with an auxiliary input backend. Everything
//! that can be checked without touching native resources is checked before
//! the first `init`, so a configuration error never leaves partial state.

use crate::backend::{Backend, Capability};
use crate::config::Settings;
use crate::error::{SimError, SimResult};
use crate::registry::{BackendDescriptor, Registry};
use crate::toolkit::Toolkit;

/// Per-slot lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Unselected,
    Selecting,
    Initialized,
    Running,
    Deinitialized,
}

/// Which backends the user asked for
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Explicit primary backend name; the default is chosen when absent
    pub primary: Option<String>,
    /// Auxiliary input backend name, independent of the primary
    pub auxiliary_input: Option<String>,
}

impl Selection {
    pub fn new(primary: Option<String>, auxiliary_input: Option<String>) -> Self {
        Self {
            primary,
            auxiliary_input,
        }
    }
}

/// One initialized backend together with its registry identity
pub struct ActiveBackend {
    name: &'static str,
    capability: Capability,
    state: SlotState,
    backend: Box<dyn Backend>,
}

impl ActiveBackend {
    fn select(descriptor: &BackendDescriptor) -> Self {
        let mut slot = ActiveBackend {
            name: descriptor.name(),
            capability: descriptor.capability(),
            state: SlotState::Unselected,
            backend: descriptor.instantiate(),
        };
        slot.transition(SlotState::Selecting);
        slot
    }

    fn transition(&mut self, next: SlotState) {
        log::debug!("Backend {}: {:?} -> {:?}", self.name, self.state, next);
        self.state = next;
    }

    fn init(&mut self, settings: &Settings) -> SimResult<()> {
        self.backend
            .init(settings)
            .map_err(|source| SimError::Initialization {
                backend: self.name.to_string(),
                source,
            })?;
        self.transition(SlotState::Initialized);
        Ok(())
    }

    fn deinit(&mut self) -> SimResult<()> {
        if matches!(self.state, SlotState::Initialized | SlotState::Running) {
            self.transition(SlotState::Deinitialized);
            self.backend
                .deinit()
                .map_err(|source| SimError::backend(self.name, source))?;
        }
        Ok(())
    }

    pub(crate) fn mark_running(&mut self) {
        if self.state == SlotState::Initialized {
            self.transition(SlotState::Running);
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }
}

/// The primary backend plus the optional auxiliary input backend
pub struct ActiveBackends {
    primary: ActiveBackend,
    auxiliary: Option<ActiveBackend>,
}

impl ActiveBackends {
    pub fn primary(&self) -> &ActiveBackend {
        &self.primary
    }

    pub fn auxiliary(&self) -> Option<&ActiveBackend> {
        self.auxiliary.as_ref()
    }

    pub(crate) fn primary_mut(&mut self) -> &mut ActiveBackend {
        &mut self.primary
    }

    /// Slots in pump order: primary first
    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = &mut ActiveBackend> {
        std::iter::once(&mut self.primary).chain(self.auxiliary.as_mut())
    }

    /// Deinitialize in reverse acquisition order: auxiliary, then primary
    ///
    /// Both slots are released even if the first fails; the first error is
    /// returned.
    pub fn shutdown(mut self) -> SimResult<()> {
        self.release()
    }

    fn release(&mut self) -> SimResult<()> {
        let auxiliary = match self.auxiliary.as_mut() {
            Some(slot) => slot.deinit(),
            None => Ok(()),
        };
        let primary = self.primary.deinit();
        auxiliary.and(primary)
    }
}

impl Drop for ActiveBackends {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Error while releasing backends: {}", e);
        }
    }
}

/// Select, validate and initialize the active backends
///
/// The toolkit is initialized after selection succeeds and before any
/// backend `init`.
pub fn start(
    registry: &Registry,
    settings: &Settings,
    selection: &Selection,
    toolkit: &mut dyn Toolkit,
) -> SimResult<ActiveBackends> {
    let primary = select_primary(registry, selection.primary.as_deref())?;
    let auxiliary = match selection.auxiliary_input.as_deref() {
        Some(name) => Some(select_auxiliary(registry, name, primary)?),
        None => None,
    };

    toolkit.init(settings);

    log::info!("Initializing {} backend", primary.name());
    let mut primary_slot = ActiveBackend::select(primary);
    primary_slot.init(settings)?;

    let auxiliary_slot = match auxiliary {
        Some(descriptor) => {
            log::info!("Initializing {} auxiliary input backend", descriptor.name());
            let mut slot = ActiveBackend::select(descriptor);
            if let Err(e) = slot.init(settings) {
                if let Err(release) = primary_slot.deinit() {
                    log::warn!("Error while releasing {}: {}", primary_slot.name, release);
                }
                return Err(e);
            }
            Some(slot)
        }
        None => None,
    };

    Ok(ActiveBackends {
        primary: primary_slot,
        auxiliary: auxiliary_slot,
    })
}

fn select_primary<'r>(
    registry: &'r Registry,
    requested: Option<&str>,
) -> SimResult<&'r BackendDescriptor> {
    match requested {
        Some(name) => {
            let descriptor = registry
                .lookup(name)
                .ok_or_else(|| SimError::UnknownBackend(name.to_string()))?;
            if !descriptor.capability().has_display() {
                return Err(SimError::Configuration(format!(
                    "backend {} is input-only and cannot drive a display",
                    descriptor.name()
                )));
            }
            Ok(descriptor)
        }
        None => {
            let descriptor = registry
                .default_display()
                .ok_or(SimError::NoDisplayBackend)?;
            log::info!("No backend requested, using default: {}", descriptor.name());
            Ok(descriptor)
        }
    }
}

fn select_auxiliary<'r>(
    registry: &'r Registry,
    name: &str,
    primary: &BackendDescriptor,
) -> SimResult<&'r BackendDescriptor> {
    let descriptor = registry
        .lookup(name)
        .ok_or_else(|| SimError::UnknownBackend(name.to_string()))?;
    if !descriptor.capability().has_input() {
        return Err(SimError::Configuration(format!(
            "backend {} does not provide input",
            descriptor.name()
        )));
    }
    if descriptor.matches(primary.name()) {
        return Err(SimError::InputConflict(descriptor.name().to_string()));
    }
    Ok(descriptor)
}
