//! Backend orchestration tests
//!
//! Drives the registry, lifecycle controller and run loop with recording
//! backends and a recording toolkit; no native display is touched.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lvsim::backend::{deliver, BackendResult};
use lvsim::lifecycle;
use lvsim::toolkit::{Button, Rect};
use lvsim::{
    Backend, BackendDescriptor, BackendEvent, Capability, ErrorKind, Frame, InputEvent,
    QuitReason, Registry, RunOptions, Selection, Settings, SimError, Simulator, SlotState,
    Toolkit,
};

type Log = Arc<Mutex<Vec<String>>>;

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn record(log: &Log, entry: String) {
    log.lock().unwrap().push(entry);
}

/// Scripted behaviour of one recording backend
#[derive(Clone, Default)]
struct Script {
    fail_init: bool,
    quit_on_pump: Option<u64>,
    /// Record the toolkit size seen on every pump
    report_size: bool,
    /// (pump number, event) pairs, pump numbers start at 1
    events: Vec<(u64, BackendEvent)>,
}

struct RecordingBackend {
    name: &'static str,
    log: Log,
    script: Script,
    pumps: u64,
}

impl Backend for RecordingBackend {
    fn init(&mut self, _settings: &Settings) -> BackendResult<()> {
        record(&self.log, format!("{}.init", self.name));
        if self.script.fail_init {
            return Err("device unavailable".into());
        }
        Ok(())
    }

    fn deinit(&mut self) -> BackendResult<()> {
        record(&self.log, format!("{}.deinit", self.name));
        Ok(())
    }

    fn pump(&mut self, toolkit: &mut dyn Toolkit) -> BackendResult<lvsim::PumpStatus> {
        self.pumps += 1;
        record(&self.log, format!("{}.pump", self.name));
        if self.script.report_size {
            let (width, height) = toolkit.size();
            record(&self.log, format!("{}.sees {}x{}", self.name, width, height));
        }
        let mut events: Vec<BackendEvent> = self
            .script
            .events
            .iter()
            .filter(|(pump, _)| *pump == self.pumps)
            .map(|(_, event)| *event)
            .collect();
        if self.script.quit_on_pump == Some(self.pumps) {
            events.push(BackendEvent::CloseRequested);
        }
        Ok(deliver(events, toolkit))
    }

    fn present(&mut self, frame: &Frame<'_>) -> BackendResult<()> {
        record(
            &self.log,
            format!("{}.present {}x{}", self.name, frame.width, frame.height),
        );
        Ok(())
    }
}

fn descriptor(
    name: &'static str,
    capability: Capability,
    log: &Log,
    script: Script,
) -> BackendDescriptor {
    let log = Arc::clone(log);
    BackendDescriptor::new(name, capability, "recording test backend", move || {
        Box::new(RecordingBackend {
            name,
            log: Arc::clone(&log),
            script: script.clone(),
            pumps: 0,
        })
    })
}

/// Toolkit double: records calls and renders a frame on every redraw pass
struct RecordingToolkit {
    log: Log,
    injected: Vec<InputEvent>,
    size: (u32, u32),
    pixels: Vec<u32>,
    render: bool,
}

impl RecordingToolkit {
    fn new(log: &Log) -> Self {
        Self {
            log: Arc::clone(log),
            injected: Vec::new(),
            size: (0, 0),
            pixels: Vec::new(),
            render: false,
        }
    }
}

impl Toolkit for RecordingToolkit {
    fn init(&mut self, settings: &Settings) {
        record(&self.log, "toolkit.init".to_string());
        self.resize(settings.window_width(), settings.window_height());
    }

    fn tick_inc(&mut self, _elapsed: Duration) {}

    fn timer_handler(&mut self) -> Duration {
        Duration::ZERO
    }

    fn inject(&mut self, event: InputEvent) {
        self.injected.push(event);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.pixels = vec![0; (width * height) as usize];
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn invalidate(&mut self) {}

    fn take_frame(&mut self) -> Option<Frame<'_>> {
        if !self.render {
            return None;
        }
        Some(Frame {
            width: self.size.0,
            height: self.size.1,
            pixels: &self.pixels,
            dirty: Rect::new(0, 0, self.size.0, self.size.1),
        })
    }
}

fn settings() -> Settings {
    Settings::resolve(&Default::default(), |_| None)
}

fn options() -> RunOptions {
    RunOptions {
        max_idle: Duration::ZERO,
    }
}

fn press(button: Button) -> BackendEvent {
    BackendEvent::Input(InputEvent::PointerButton {
        button,
        pressed: true,
    })
}

/// "alpha" and "beta" display, "keys" input-only, registered in that order
fn registry(log: &Log, alpha: Script, keys: Script) -> Registry {
    let mut builder = Registry::builder();
    builder
        .register(descriptor("alpha", Capability::Display, log, alpha))
        .unwrap()
        .register(descriptor("beta", Capability::DisplayAndInput, log, Script::default()))
        .unwrap()
        .register(descriptor("keys", Capability::Input, log, keys))
        .unwrap();
    builder.build()
}

#[test]
fn test_unknown_backend_initializes_nothing() {
    let log = Log::default();
    let registry = registry(&log, Script::default(), Script::default());
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("gamma".to_string()), None);
    let err = lifecycle::start(&registry, &settings(), &selection, &mut toolkit).err().unwrap();

    assert!(matches!(err, SimError::UnknownBackend(ref name) if name == "gamma"));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.exit_code(), 1);
    assert!(entries(&log).is_empty());
}

#[test]
fn test_unknown_auxiliary_initializes_nothing() {
    let log = Log::default();
    let registry = registry(&log, Script::default(), Script::default());
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("alpha".to_string()), Some("mouse".to_string()));
    let err = lifecycle::start(&registry, &settings(), &selection, &mut toolkit).err().unwrap();

    assert!(matches!(err, SimError::UnknownBackend(_)));
    assert!(entries(&log).is_empty());
}

#[test]
fn test_default_is_first_display_backend() {
    let log = Log::default();
    let mut builder = Registry::builder();
    builder
        .register(descriptor("keys", Capability::Input, &log, Script::default()))
        .unwrap()
        .register(descriptor("alpha", Capability::Display, &log, Script::default()))
        .unwrap()
        .register(descriptor("beta", Capability::Display, &log, Script::default()))
        .unwrap();
    let registry = builder.build();
    let mut toolkit = RecordingToolkit::new(&log);

    let active = lifecycle::start(&registry, &settings(), &Selection::default(), &mut toolkit)
        .unwrap();
    assert_eq!(active.primary().name(), "alpha");
    assert!(active.auxiliary().is_none());
}

#[test]
fn test_lookup_ignores_case() {
    let log = Log::default();
    let registry = registry(&log, Script::default(), Script::default());
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("BETA".to_string()), None);
    let active = lifecycle::start(&registry, &settings(), &selection, &mut toolkit).unwrap();
    assert_eq!(active.primary().name(), "beta");
}

#[test]
fn test_init_and_release_order() {
    let log = Log::default();
    let registry = registry(&log, Script::default(), Script::default());
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("alpha".to_string()), Some("keys".to_string()));
    let active = lifecycle::start(&registry, &settings(), &selection, &mut toolkit).unwrap();
    assert_eq!(active.primary().state(), SlotState::Initialized);
    assert_eq!(active.auxiliary().map(|a| a.name()), Some("keys"));

    active.shutdown().unwrap();
    assert_eq!(
        entries(&log),
        ["toolkit.init", "alpha.init", "keys.init", "keys.deinit", "alpha.deinit"]
    );
}

#[test]
fn test_drop_releases_backends() {
    let log = Log::default();
    let registry = registry(&log, Script::default(), Script::default());
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("alpha".to_string()), Some("keys".to_string()));
    let active = lifecycle::start(&registry, &settings(), &selection, &mut toolkit).unwrap();
    drop(active);

    let log = entries(&log);
    assert_eq!(&log[log.len() - 2..], ["keys.deinit", "alpha.deinit"]);
}

#[test]
fn test_primary_failure_skips_auxiliary() {
    let log = Log::default();
    let failing = Script {
        fail_init: true,
        ..Script::default()
    };
    let registry = registry(&log, failing, Script::default());
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("alpha".to_string()), Some("keys".to_string()));
    let err = lifecycle::start(&registry, &settings(), &selection, &mut toolkit).err().unwrap();

    assert_eq!(err.kind(), ErrorKind::Initialization);
    assert!(err.to_string().contains("alpha"));
    assert_eq!(entries(&log), ["toolkit.init", "alpha.init"]);
}

#[test]
fn test_auxiliary_failure_releases_primary() {
    let log = Log::default();
    let failing = Script {
        fail_init: true,
        ..Script::default()
    };
    let registry = registry(&log, Script::default(), failing);
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("alpha".to_string()), Some("keys".to_string()));
    let err = lifecycle::start(&registry, &settings(), &selection, &mut toolkit).err().unwrap();

    assert_eq!(err.kind(), ErrorKind::Initialization);
    assert_eq!(
        entries(&log),
        ["toolkit.init", "alpha.init", "keys.init", "alpha.deinit"]
    );
}

#[test]
fn test_auxiliary_equal_to_primary_conflicts() {
    let log = Log::default();
    let registry = registry(&log, Script::default(), Script::default());
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("beta".to_string()), Some("Beta".to_string()));
    let err = lifecycle::start(&registry, &settings(), &selection, &mut toolkit).err().unwrap();

    assert!(matches!(err, SimError::InputConflict(_)));
    assert!(entries(&log).is_empty());
}

#[test]
fn test_input_only_primary_rejected() {
    let log = Log::default();
    let registry = registry(&log, Script::default(), Script::default());
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("keys".to_string()), None);
    let err = lifecycle::start(&registry, &settings(), &selection, &mut toolkit).err().unwrap();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(entries(&log).is_empty());
}

#[test]
fn test_empty_registry_has_no_default() {
    let log = Log::default();
    let registry = Registry::builder().build();
    let mut toolkit = RecordingToolkit::new(&log);

    let err = lifecycle::start(&registry, &settings(), &Selection::default(), &mut toolkit)
        .err()
        .unwrap();
    assert!(matches!(err, SimError::NoDisplayBackend));
}

#[test]
fn test_quit_stops_after_that_tick() {
    let log = Log::default();
    let alpha = Script {
        quit_on_pump: Some(3),
        ..Script::default()
    };
    let registry = registry(&log, alpha, Script::default());
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("alpha".to_string()), Some("keys".to_string()));
    let mut sim = Simulator::start(registry, settings(), &selection, &mut toolkit).unwrap();
    let stop = AtomicBool::new(false);
    let summary = sim.run(&mut toolkit, &stop, &options()).unwrap();

    assert_eq!(summary.ticks, 3);
    assert_eq!(summary.reason, QuitReason::Backend("alpha"));
    assert_eq!(sim.active().primary().state(), SlotState::Running);

    let log = entries(&log);
    let count = |entry: &str| log.iter().filter(|e| e.as_str() == entry).count();
    assert_eq!(count("alpha.pump"), 3);
    // The primary quit first on tick 3
    assert_eq!(count("keys.pump"), 2);

    sim.shutdown().unwrap();
}

#[test]
fn test_auxiliary_quit_is_honoured() {
    let log = Log::default();
    let keys = Script {
        quit_on_pump: Some(1),
        ..Script::default()
    };
    let registry = registry(&log, Script::default(), keys);
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(None, Some("keys".to_string()));
    let mut sim = Simulator::start(registry, settings(), &selection, &mut toolkit).unwrap();
    let summary = sim
        .run(&mut toolkit, &AtomicBool::new(false), &options())
        .unwrap();

    assert_eq!(summary.ticks, 1);
    assert_eq!(summary.reason, QuitReason::Backend("keys"));
}

#[test]
fn test_events_reach_toolkit_in_pump_order() {
    let log = Log::default();
    let alpha = Script {
        quit_on_pump: Some(2),
        events: vec![(1, press(Button::Left))],
        ..Script::default()
    };
    let keys = Script {
        events: vec![(1, press(Button::Right))],
        ..Script::default()
    };
    let registry = registry(&log, alpha, keys);
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("alpha".to_string()), Some("keys".to_string()));
    let mut sim = Simulator::start(registry, settings(), &selection, &mut toolkit).unwrap();
    sim.run(&mut toolkit, &AtomicBool::new(false), &options())
        .unwrap();

    assert_eq!(
        toolkit.injected,
        [
            InputEvent::PointerButton {
                button: Button::Left,
                pressed: true
            },
            InputEvent::PointerButton {
                button: Button::Right,
                pressed: true
            },
        ]
    );
}

#[test]
fn test_events_after_close_are_not_delivered() {
    let log = Log::default();
    let alpha = Script {
        events: vec![
            (1, BackendEvent::CloseRequested),
            (1, press(Button::Middle)),
        ],
        ..Script::default()
    };
    let registry = registry(&log, alpha, Script::default());
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("alpha".to_string()), None);
    let mut sim = Simulator::start(registry, settings(), &selection, &mut toolkit).unwrap();
    let summary = sim
        .run(&mut toolkit, &AtomicBool::new(false), &options())
        .unwrap();

    assert_eq!(summary.ticks, 1);
    assert!(toolkit.injected.is_empty());
}

#[test]
fn test_stop_flag_terminates_before_pumping() {
    let log = Log::default();
    let registry = registry(&log, Script::default(), Script::default());
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("alpha".to_string()), None);
    let mut sim = Simulator::start(registry, settings(), &selection, &mut toolkit).unwrap();
    let stop = AtomicBool::new(true);
    let summary = sim.run(&mut toolkit, &stop, &options()).unwrap();

    assert_eq!(summary.ticks, 0);
    assert_eq!(summary.reason, QuitReason::Terminated);
    assert!(!entries(&log).iter().any(|e| e.ends_with(".pump")));
}

#[test]
fn test_frames_are_presented_on_primary_after_resize() {
    let log = Log::default();
    let alpha = Script {
        quit_on_pump: Some(2),
        events: vec![(
            1,
            BackendEvent::Resize {
                width: 320,
                height: 240,
            },
        )],
        ..Script::default()
    };
    let registry = registry(&log, alpha, Script::default());
    let mut toolkit = RecordingToolkit::new(&log);
    toolkit.render = true;

    let selection = Selection::new(Some("alpha".to_string()), Some("keys".to_string()));
    let mut sim = Simulator::start(registry, settings(), &selection, &mut toolkit).unwrap();
    sim.run(&mut toolkit, &AtomicBool::new(false), &options())
        .unwrap();

    let log = entries(&log);
    let presents: Vec<&String> = log.iter().filter(|e| e.contains(".present")).collect();
    assert_eq!(presents, ["alpha.present 320x240"]);
}

#[test]
fn test_auxiliary_sees_primary_resize_in_same_tick() {
    let log = Log::default();
    let alpha = Script {
        quit_on_pump: Some(2),
        events: vec![(
            1,
            BackendEvent::Resize {
                width: 1920,
                height: 1080,
            },
        )],
        ..Script::default()
    };
    let keys = Script {
        report_size: true,
        ..Script::default()
    };
    let registry = registry(&log, alpha, keys);
    let mut toolkit = RecordingToolkit::new(&log);

    let selection = Selection::new(Some("alpha".to_string()), Some("keys".to_string()));
    let mut sim = Simulator::start(registry, settings(), &selection, &mut toolkit).unwrap();
    sim.run(&mut toolkit, &AtomicBool::new(false), &options())
        .unwrap();

    let log = entries(&log);
    let seen: Vec<&String> = log.iter().filter(|e| e.starts_with("keys.sees")).collect();
    assert_eq!(seen, ["keys.sees 1920x1080"]);
}

#[test]
fn test_headless_run_to_frame_limit() {
    use lvsim::backend::HeadlessBackend;
    use lvsim::toolkit::SoftCanvas;

    let mut builder = Registry::builder();
    builder
        .register(BackendDescriptor::new(
            "headless",
            Capability::Display,
            "off-screen",
            || Box::new(HeadlessBackend::new().with_frame_limit(Some(2))),
        ))
        .unwrap();
    let mut canvas = SoftCanvas::new();
    let mut sim = Simulator::start(
        builder.build(),
        settings(),
        &Selection::default(),
        &mut canvas,
    )
    .unwrap();

    let summary = sim
        .run(&mut canvas, &AtomicBool::new(false), &RunOptions::default())
        .unwrap();
    assert_eq!(summary.reason, QuitReason::Backend("headless"));
    assert!(canvas.frames_rendered() >= 2);
    sim.shutdown().unwrap();
}
