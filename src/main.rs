//! lvsim - Main entry point
//!
//! Runs the software canvas on the selected display backend

use std::env;
use std::process;

use lvsim::backend;
use lvsim::registry::Registry;
use lvsim::run_loop::RunOptions;
use lvsim::toolkit::SoftCanvas;
use lvsim::{
    signals, ErrorKind, Selection, Settings, SettingsRequest, SimError, SimResult, Simulator,
    VERSION,
};

fn print_usage() {
    println!("lvsim v{}", VERSION);
    println!("Simulator harness for embedded GUI toolkits");
    println!();
    println!("Usage: lvsim [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -b <name>     Display backend (see -B)");
    println!("  -W <width>    Window width (default: $LV_SIM_WINDOW_WIDTH or 800)");
    println!("  -H <height>   Window height (default: $LV_SIM_WINDOW_HEIGHT or 480)");
    println!("  -f            Fullscreen");
    println!("  -m            Maximize");
    println!("  -B            List available backends");
    println!("  -V            Print version");
    println!("  -h            Show this help message");
    println!();
    println!("Examples:");
    println!("  lvsim -b x11 -W 1024 -H 600");
    println!("  LV_LINUX_FBDEV_DEVICE=/dev/fb1 lvsim -b fbdev");
    println!();
}

fn list_backends(registry: &Registry) {
    println!("Available backends:");
    if registry.is_empty() {
        println!("  (none available)");
        return;
    }
    let default = registry.default_display().map(|d| d.name());
    for descriptor in registry.list() {
        let marker = if Some(descriptor.name()) == default {
            " (default)"
        } else {
            ""
        };
        println!(
            "  {:<10} {:<14} {}{}",
            descriptor.name(),
            descriptor.capability(),
            descriptor.description(),
            marker
        );
    }
    println!();
    println!("To build with specific backends only:");
    println!("  cargo build --no-default-features --features backend-fbdev");
}

/// What the command line asks for
#[derive(Debug, PartialEq)]
enum Command {
    Run(Config),
    Help,
    Version,
    ListBackends,
}

#[derive(Debug, Default, PartialEq)]
struct Config {
    backend: Option<String>,
    width: Option<String>,
    height: Option<String>,
    fullscreen: bool,
    maximize: bool,
}

fn parse_args<I>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let mut config = Config::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |option: &str| {
            args.next()
                .ok_or_else(|| format!("Missing value for {}", option))
        };
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-V" => return Ok(Command::Version),
            "-B" => return Ok(Command::ListBackends),
            "-b" => config.backend = Some(value("-b")?),
            "-W" => config.width = Some(value("-W")?),
            "-H" => config.height = Some(value("-H")?),
            "-f" => config.fullscreen = true,
            "-m" => config.maximize = true,
            arg => return Err(format!("Unknown option: {}", arg)),
        }
    }

    Ok(Command::Run(config))
}

/// Follow-up advice printed after an error, if any
fn error_hint(error: &SimError) -> Option<&'static str> {
    match error.kind() {
        ErrorKind::Configuration => Some("Run with -B to list backends, or -h for usage"),
        _ => None,
    }
}

fn run(registry: Registry, config: Config) -> SimResult<()> {
    let request = SettingsRequest {
        width: config.width,
        height: config.height,
        fullscreen: config.fullscreen,
        maximize: config.maximize,
    };
    let settings = Settings::from_env(&request);
    log::info!(
        "Window {}x{} (fullscreen: {}, maximize: {})",
        settings.window_width(),
        settings.window_height(),
        settings.fullscreen(),
        settings.maximize()
    );

    let selection = Selection::new(config.backend, backend::auxiliary_input().map(String::from));
    let mut toolkit = SoftCanvas::new();
    let mut simulator = Simulator::start(registry, settings, &selection, &mut toolkit)?;

    let summary = simulator.run(&mut toolkit, signals::stop_flag(), &RunOptions::default());
    // Release backends even when the loop failed
    let shutdown = simulator.shutdown();
    let summary = summary?;
    shutdown?;

    log::info!(
        "Stopped after {} ticks, {} frames rendered",
        summary.ticks,
        toolkit.frames_rendered()
    );
    Ok(())
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let command = match parse_args(env::args().skip(1)) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("Error: {}", err);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    let registry = match backend::builtin_registry() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    };

    let config = match command {
        Command::Help => {
            print_usage();
            return;
        }
        Command::Version => {
            println!("lvsim {}", VERSION);
            return;
        }
        Command::ListBackends => {
            list_backends(&registry);
            return;
        }
        Command::Run(config) => config,
    };

    if let Err(e) = signals::install() {
        log::warn!("Failed to install termination handlers: {}", e);
    }

    log::info!("lvsim v{}", VERSION);
    if let Err(e) = run(registry, config) {
        eprintln!("Error: {}", e);
        if let Some(hint) = error_hint(&e) {
            eprintln!("{}", hint);
        }
        process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, String> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_no_arguments_runs_defaults() {
        assert_eq!(parse(&[]), Ok(Command::Run(Config::default())));
    }

    #[test]
    fn test_full_command_line() {
        let command = parse(&["-b", "x11", "-W", "1024", "-H", "600", "-f", "-m"]).unwrap();
        assert_eq!(
            command,
            Command::Run(Config {
                backend: Some("x11".to_string()),
                width: Some("1024".to_string()),
                height: Some("600".to_string()),
                fullscreen: true,
                maximize: true,
            })
        );
    }

    #[test]
    fn test_informational_flags() {
        assert_eq!(parse(&["-h"]), Ok(Command::Help));
        assert_eq!(parse(&["-V"]), Ok(Command::Version));
        assert_eq!(parse(&["-f", "-B"]), Ok(Command::ListBackends));
    }

    #[test]
    fn test_missing_value() {
        assert_eq!(
            parse(&["-b"]),
            Err("Missing value for -b".to_string())
        );
        assert!(parse(&["-W"]).is_err());
    }

    #[test]
    fn test_unknown_option() {
        assert_eq!(
            parse(&["-x"]),
            Err("Unknown option: -x".to_string())
        );
    }

    #[test]
    fn test_configuration_errors_carry_a_hint() {
        let unknown = SimError::UnknownBackend("gamma".to_string());
        assert!(error_hint(&unknown).unwrap().contains("-B"));

        let failed = SimError::Initialization {
            backend: "fbdev".to_string(),
            source: "no device".into(),
        };
        assert_eq!(error_hint(&failed), None);
    }

    #[test]
    fn test_malformed_geometry_is_passed_through() {
        // Leniency is applied when settings are resolved
        let command = parse(&["-W", "wide"]).unwrap();
        let Command::Run(config) = command else {
            panic!("expected run");
        };
        assert_eq!(config.width.as_deref(), Some("wide"));
    }
}
