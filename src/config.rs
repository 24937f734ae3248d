//! Simulator settings
//!
//! Geometry and display-mode flags handed to every backend's `init`.
//! Values are layered: explicit request, then environment, then the
//! built-in default.

/// Environment variable supplying the default window width
pub const ENV_WINDOW_WIDTH: &str = "LV_SIM_WINDOW_WIDTH";

/// Environment variable supplying the default window height
pub const ENV_WINDOW_HEIGHT: &str = "LV_SIM_WINDOW_HEIGHT";

pub const DEFAULT_WINDOW_WIDTH: u32 = 800;
pub const DEFAULT_WINDOW_HEIGHT: u32 = 480;

/// Largest accepted window dimension (X11 signed 16-bit coordinates)
pub const MAX_WINDOW_DIMENSION: u32 = i16::MAX as u32;

/// Explicit overrides, typically collected from the command line
///
/// Geometry is kept as raw text so that malformed input follows the same
/// leniency rule as malformed environment values.
#[derive(Debug, Clone, Default)]
pub struct SettingsRequest {
    pub width: Option<String>,
    pub height: Option<String>,
    pub fullscreen: bool,
    pub maximize: bool,
}

/// Resolved, immutable settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    window_width: u32,
    window_height: u32,
    fullscreen: bool,
    maximize: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            window_width: DEFAULT_WINDOW_WIDTH,
            window_height: DEFAULT_WINDOW_HEIGHT,
            fullscreen: false,
            maximize: false,
        }
    }
}

impl Settings {
    /// Resolve settings against an arbitrary environment lookup
    pub fn resolve<F>(request: &SettingsRequest, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let window_width = resolve_dimension(
            request.width.as_deref(),
            env(ENV_WINDOW_WIDTH).as_deref(),
            DEFAULT_WINDOW_WIDTH,
        );
        let window_height = resolve_dimension(
            request.height.as_deref(),
            env(ENV_WINDOW_HEIGHT).as_deref(),
            DEFAULT_WINDOW_HEIGHT,
        );

        let settings = Settings {
            window_width,
            window_height,
            fullscreen: request.fullscreen,
            maximize: request.maximize,
        };
        log::debug!("Resolved settings: {:?}", settings);
        settings
    }

    /// Resolve settings against the process environment
    pub fn from_env(request: &SettingsRequest) -> Self {
        Self::resolve(request, |key| std::env::var(key).ok())
    }

    pub fn window_width(&self) -> u32 {
        self.window_width
    }

    pub fn window_height(&self) -> u32 {
        self.window_height
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn maximize(&self) -> bool {
        self.maximize
    }
}

/// The explicit value wins over the environment; whichever is chosen must
/// parse as an integer in `1..=MAX_WINDOW_DIMENSION`, otherwise the built-in
/// default applies.
fn resolve_dimension(explicit: Option<&str>, env: Option<&str>, default: u32) -> u32 {
    match explicit.or(env) {
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(value) if (1..=MAX_WINDOW_DIMENSION).contains(&value) => value,
            _ => {
                log::warn!("Ignoring malformed window dimension {:?}, using {}", raw, default);
                default
            }
        },
        None => default,
    }
}
