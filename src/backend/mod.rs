/// Backend implementations
///
/// This module contains the backend trait and implementations for the
/// supported display and input mechanisms (Wayland, X11, Linux framebuffer,
/// off-screen, kernel input devices).

mod r#trait;
pub use r#trait::*;

pub mod keymap;
pub mod queue;
pub use queue::{EventQueue, EventSink};

pub mod headless;
pub use headless::HeadlessBackend;

// Backend implementations (feature-gated)

#[cfg(all(feature = "backend-wayland", target_os = "linux"))]
pub mod wayland;

#[cfg(all(feature = "backend-x11", target_family = "unix"))]
pub mod x11;

#[cfg(all(feature = "backend-fbdev", target_os = "linux"))]
pub mod fbdev;

#[cfg(all(feature = "backend-evdev", target_os = "linux"))]
pub mod evdev;

use crate::error::SimResult;
use crate::registry::{BackendDescriptor, Registry, RegistryBuilder};

/// Register every compiled-in backend
///
/// Order matters: the first display-capable backend registered is the
/// default when none is requested.
pub fn register_builtin(builder: &mut RegistryBuilder) -> SimResult<()> {
    // Wayland backend is available on Linux when feature is enabled
    #[cfg(all(feature = "backend-wayland", target_os = "linux"))]
    builder.register(BackendDescriptor::new(
        "wayland",
        Capability::DisplayAndInput,
        "Wayland xdg-shell window with shared-memory buffers",
        || Box::new(wayland::WaylandBackend::new()),
    ))?;

    // X11 backend is available on Unix systems when feature is enabled
    #[cfg(all(feature = "backend-x11", target_family = "unix"))]
    builder.register(BackendDescriptor::new(
        "x11",
        Capability::DisplayAndInput,
        "X11 window via x11rb",
        || Box::new(x11::X11Backend::new()),
    ))?;

    // Framebuffer backend is available on Linux when feature is enabled
    #[cfg(all(feature = "backend-fbdev", target_os = "linux"))]
    builder.register(BackendDescriptor::new(
        "fbdev",
        Capability::Display,
        "Linux framebuffer device",
        || Box::new(fbdev::FbdevBackend::from_env()),
    ))?;

    builder.register(BackendDescriptor::new(
        "headless",
        Capability::Display,
        "Off-screen target, nothing is shown",
        || Box::new(HeadlessBackend::from_env()),
    ))?;

    // Kernel input devices, stacked on top of any display backend
    #[cfg(all(feature = "backend-evdev", target_os = "linux"))]
    builder.register(BackendDescriptor::new(
        "evdev",
        Capability::Input,
        "Linux kernel input device",
        || Box::new(evdev::EvdevBackend::from_env()),
    ))?;

    Ok(())
}

/// Registry holding every compiled-in backend
pub fn builtin_registry() -> SimResult<Registry> {
    let mut builder = Registry::builder();
    register_builtin(&mut builder)?;
    Ok(builder.build())
}

/// Auxiliary input backend compiled into this build, if any
pub fn auxiliary_input() -> Option<&'static str> {
    if cfg!(all(feature = "backend-evdev", target_os = "linux")) {
        Some("evdev")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_defaults_to_display() {
        let registry = builtin_registry().unwrap();
        assert!(registry.lookup("headless").is_some());
        let default = registry.default_display().unwrap();
        assert!(default.capability().has_display());
    }

    #[test]
    fn test_auxiliary_input_is_registered() {
        let registry = builtin_registry().unwrap();
        if let Some(name) = auxiliary_input() {
            let descriptor = registry.lookup(name).unwrap();
            assert!(descriptor.capability().has_input());
        }
    }
}
