//! Simulator context
//!
//! Bundles the sealed registry, the resolved settings and the active
//! backends into one value that is created at startup and passed around
//! explicitly.

use crate::config::Settings;
use crate::error::SimResult;
use crate::lifecycle::{self, ActiveBackends, Selection};
use crate::registry::Registry;
use crate::run_loop::{self, RunOptions, RunSummary};
use crate::toolkit::Toolkit;
use std::sync::atomic::AtomicBool;

pub struct Simulator {
    registry: Registry,
    settings: Settings,
    active: ActiveBackends,
}

impl Simulator {
    /// Select and initialize backends; the toolkit is initialized first
    pub fn start(
        registry: Registry,
        settings: Settings,
        selection: &Selection,
        toolkit: &mut dyn Toolkit,
    ) -> SimResult<Self> {
        let active = lifecycle::start(&registry, &settings, selection, toolkit)?;
        Ok(Simulator {
            registry,
            settings,
            active,
        })
    }

    /// Block in the run loop until a backend quits or `stop` is raised
    pub fn run(
        &mut self,
        toolkit: &mut dyn Toolkit,
        stop: &AtomicBool,
        options: &RunOptions,
    ) -> SimResult<RunSummary> {
        run_loop::run(&mut self.active, toolkit, stop, options)
    }

    /// Release backends in reverse acquisition order
    pub fn shutdown(self) -> SimResult<()> {
        self.active.shutdown()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn active(&self) -> &ActiveBackends {
        &self.active
    }
}
