//! Backend registry
//!
//! An ordered list of backend descriptors. It is filled through a
//! [`RegistryBuilder`] once at startup and is immutable afterwards: a built
//! [`Registry`] has no way to add or remove entries. Registration order is
//! also default-selection priority.

use crate::backend::{Backend, Capability};
use crate::error::{SimError, SimResult};
use std::fmt;

type Factory = Box<dyn Fn() -> Box<dyn Backend>>;

/// Identity and constructor of one backend
pub struct BackendDescriptor {
    name: &'static str,
    capability: Capability,
    description: &'static str,
    factory: Factory,
}

impl BackendDescriptor {
    pub fn new<F>(
        name: &'static str,
        capability: Capability,
        description: &'static str,
        factory: F,
    ) -> Self
    where
        F: Fn() -> Box<dyn Backend> + 'static,
    {
        Self {
            name,
            capability,
            description,
            factory: Box::new(factory),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Case-insensitive name comparison
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Create a fresh, uninitialized instance
    pub(crate) fn instantiate(&self) -> Box<dyn Backend> {
        (self.factory)()
    }
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

/// Collects descriptors before the registry is sealed
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<BackendDescriptor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor; a duplicate or empty name is an integrity error
    /// and leaves the builder unchanged.
    pub fn register(&mut self, descriptor: BackendDescriptor) -> SimResult<&mut Self> {
        if descriptor.name.trim().is_empty() {
            return Err(SimError::EmptyBackendName);
        }
        if self.descriptors.iter().any(|d| d.matches(descriptor.name)) {
            return Err(SimError::DuplicateBackend(descriptor.name.to_string()));
        }
        log::debug!(
            "Registered backend {} ({})",
            descriptor.name,
            descriptor.capability
        );
        self.descriptors.push(descriptor);
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            descriptors: self.descriptors,
        }
    }
}

/// Sealed, read-only backend registry
#[derive(Debug)]
pub struct Registry {
    descriptors: Vec<BackendDescriptor>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn lookup(&self, name: &str) -> Option<&BackendDescriptor> {
        self.descriptors.iter().find(|d| d.matches(name))
    }

    /// Descriptors in registration order
    pub fn list(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.descriptors.iter()
    }

    /// First display-capable descriptor in registration order
    pub fn default_display(&self) -> Option<&BackendDescriptor> {
        self.descriptors.iter().find(|d| d.capability.has_display())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
