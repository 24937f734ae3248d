//! Evdev Backend - Linux kernel input devices
//!
//! Reads a pointer, touchscreen or keyboard from `/dev/input/event*` on a
//! dedicated thread. The thread never touches the toolkit: it translates raw
//! kernel events and hands them over through an [`EventQueue`] that `pump`
//! drains on the owning thread.
//!
//! The device is never grabbed, so a window-system primary backend can keep
//! receiving the same device through its own input path.

use super::keymap::LinuxKeymap;
use super::*;
use crate::config::Settings;
use crate::toolkit::{Button, InputEvent, Toolkit};
use ::evdev::{AbsoluteAxisType, Device, InputEventKind, Key, RelativeAxisType};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs;
use std::os::fd::BorrowedFd;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Environment variable selecting the input device
pub const ENV_DEVICE: &str = "LV_LINUX_EVDEV_POINTER_DEVICE";

/// How long the reader thread waits before re-checking the stop flag
const POLL_TIMEOUT_MS: u16 = 100;

const REL_X: u16 = 0x00;
const REL_Y: u16 = 0x01;
const REL_WHEEL: u16 = 0x08;
const ABS_X: u16 = 0x00;
const ABS_Y: u16 = 0x01;
const ABS_MT_POSITION_X: u16 = 0x35;
const ABS_MT_POSITION_Y: u16 = 0x36;
const BTN_LEFT: u16 = 0x110;
const BTN_RIGHT: u16 = 0x111;
const BTN_MIDDLE: u16 = 0x112;
const BTN_TOUCH: u16 = 0x14a;

/// Kernel event reduced to what the tracker needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawEvent {
    Rel { axis: u16, value: i32 },
    Abs { axis: u16, value: i32 },
    Key { code: u16, value: i32 },
    Sync,
}

/// Calibration range of an absolute axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisRange {
    min: i32,
    max: i32,
}

impl AxisRange {
    /// Map a raw value onto `0..extent`
    fn scale(&self, value: i32, extent: i32) -> i32 {
        let last = extent.max(1) - 1;
        if self.max <= self.min {
            return value.clamp(0, last);
        }
        let span = i64::from(self.max) - i64::from(self.min);
        let pos = i64::from(value.clamp(self.min, self.max)) - i64::from(self.min);
        // pos <= 2^32 and last < 2^31, so the product fits
        (pos * i64::from(last) / span) as i32
    }
}

/// Display size shared between the owning thread and the reader thread
///
/// `pump` refreshes it from the toolkit, so absolute devices follow the
/// real surface (a framebuffer's native resolution, a resized window)
/// rather than the configured geometry.
#[derive(Debug, Clone)]
struct DisplaySize(Arc<AtomicU64>);

impl DisplaySize {
    fn new(width: u32, height: u32) -> Self {
        let size = DisplaySize(Arc::new(AtomicU64::new(0)));
        size.set(width, height);
        size
    }

    fn set(&self, width: u32, height: u32) {
        self.0
            .store((u64::from(width) << 32) | u64::from(height), Ordering::Relaxed);
    }

    /// Width and height, each at least 1
    fn get(&self) -> (i32, i32) {
        let packed = self.0.load(Ordering::Relaxed);
        let clamp = |v: u64| v.clamp(1, i32::MAX as u64) as i32;
        (clamp(packed >> 32), clamp(packed & 0xffff_ffff))
    }
}

/// Accumulates kernel events between two SYN_REPORTs
#[derive(Debug)]
struct PointerTracker {
    display: DisplaySize,
    x: i32,
    y: i32,
    abs_x: Option<AxisRange>,
    abs_y: Option<AxisRange>,
    moved: bool,
    touching: bool,
    touch_changed: bool,
    keymap: LinuxKeymap,
    queued: Vec<BackendEvent>,
}

impl PointerTracker {
    fn new(display: DisplaySize) -> Self {
        let (width, height) = display.get();
        Self {
            display,
            x: width / 2,
            y: height / 2,
            abs_x: None,
            abs_y: None,
            moved: false,
            touching: false,
            touch_changed: false,
            keymap: LinuxKeymap::new(),
            queued: Vec::new(),
        }
    }

    fn with_calibration(mut self, abs_x: Option<AxisRange>, abs_y: Option<AxisRange>) -> Self {
        self.abs_x = abs_x;
        self.abs_y = abs_y;
        self
    }

    /// Feed one event; a sync returns everything accumulated since the last
    fn feed(&mut self, event: RawEvent) -> Vec<BackendEvent> {
        match event {
            RawEvent::Rel { axis, value } => match axis {
                REL_X => self.move_to(self.x.saturating_add(value), self.y),
                REL_Y => self.move_to(self.x, self.y.saturating_add(value)),
                REL_WHEEL => self
                    .queued
                    .push(BackendEvent::Input(InputEvent::Wheel { delta: value })),
                _ => {}
            },
            RawEvent::Abs { axis, value } => match axis {
                ABS_X | ABS_MT_POSITION_X => {
                    let (width, _) = self.display.get();
                    let x = self.abs_x.map_or(value, |r| r.scale(value, width));
                    self.move_to(x, self.y);
                }
                ABS_Y | ABS_MT_POSITION_Y => {
                    let (_, height) = self.display.get();
                    let y = self.abs_y.map_or(value, |r| r.scale(value, height));
                    self.move_to(self.x, y);
                }
                _ => {}
            },
            RawEvent::Key { code, value } => self.key(code, value),
            RawEvent::Sync => return self.flush(),
        }
        Vec::new()
    }

    fn move_to(&mut self, x: i32, y: i32) {
        // Out-of-range device data never reaches the toolkit
        let (width, height) = self.display.get();
        self.x = x.clamp(0, width - 1);
        self.y = y.clamp(0, height - 1);
        self.moved = true;
    }

    fn key(&mut self, code: u16, value: i32) {
        let button = match code {
            BTN_LEFT => Some(Button::Left),
            BTN_RIGHT => Some(Button::Right),
            BTN_MIDDLE => Some(Button::Middle),
            _ => None,
        };
        if let Some(button) = button {
            // Autorepeat means nothing for buttons
            if value != 2 {
                self.queued.push(BackendEvent::Input(InputEvent::PointerButton {
                    button,
                    pressed: value == 1,
                }));
            }
            return;
        }
        if code == BTN_TOUCH {
            self.touching = value != 0;
            self.touch_changed = true;
            return;
        }
        if let Some(key) = self.keymap.translate(code, value != 0) {
            self.queued.push(BackendEvent::Input(InputEvent::Key {
                key,
                pressed: value != 0,
            }));
        }
    }

    fn flush(&mut self) -> Vec<BackendEvent> {
        let mut out = Vec::with_capacity(self.queued.len() + 1);
        if self.touch_changed || (self.touching && self.moved) {
            out.push(BackendEvent::Input(InputEvent::Touch {
                slot: 0,
                x: self.x,
                y: self.y,
                pressed: self.touching,
            }));
        } else if self.moved {
            out.push(BackendEvent::Input(InputEvent::PointerMotion {
                x: self.x,
                y: self.y,
            }));
        }
        self.moved = false;
        self.touch_changed = false;
        out.append(&mut self.queued);
        out
    }
}

fn is_pointer_or_keyboard(device: &Device) -> bool {
    let keys = device.supported_keys();
    let has_key = |key: Key| keys.map_or(false, |k| k.contains(key));
    let relative = device.supported_relative_axes().map_or(false, |axes| {
        axes.contains(RelativeAxisType::REL_X) && axes.contains(RelativeAxisType::REL_Y)
    });
    let absolute = device.supported_absolute_axes().map_or(false, |axes| {
        axes.contains(AbsoluteAxisType::ABS_X) && axes.contains(AbsoluteAxisType::ABS_Y)
    });
    relative || absolute || has_key(Key::BTN_TOUCH) || has_key(Key::KEY_ENTER)
}

/// First usable device under /dev/input, in name order
fn discover_device() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir("/dev/input")
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("event"))
        })
        .collect();
    candidates.sort();

    candidates.into_iter().find(|path| match Device::open(path) {
        Ok(device) => {
            let usable = is_pointer_or_keyboard(&device);
            log::debug!(
                "Input device {} ({}): usable={}",
                path.display(),
                device.name().unwrap_or("unknown"),
                usable
            );
            usable
        }
        Err(e) => {
            log::debug!("Failed to open input device {}: {}", path.display(), e);
            false
        }
    })
}

fn calibration(device: &Device) -> (Option<AxisRange>, Option<AxisRange>) {
    let has_abs = device
        .supported_absolute_axes()
        .map_or(false, |axes| axes.contains(AbsoluteAxisType::ABS_X));
    if !has_abs {
        return (None, None);
    }
    match device.get_abs_state() {
        Ok(state) => {
            let x = &state[AbsoluteAxisType::ABS_X.0 as usize];
            let y = &state[AbsoluteAxisType::ABS_Y.0 as usize];
            (
                Some(AxisRange {
                    min: x.minimum,
                    max: x.maximum,
                }),
                Some(AxisRange {
                    min: y.minimum,
                    max: y.maximum,
                }),
            )
        }
        Err(e) => {
            log::warn!("Could not read absolute axis ranges: {}", e);
            (None, None)
        }
    }
}

fn raw_event(event: &::evdev::InputEvent) -> Option<RawEvent> {
    match event.kind() {
        InputEventKind::RelAxis(axis) => Some(RawEvent::Rel {
            axis: axis.0,
            value: event.value(),
        }),
        InputEventKind::AbsAxis(axis) => Some(RawEvent::Abs {
            axis: axis.0,
            value: event.value(),
        }),
        InputEventKind::Key(key) => Some(RawEvent::Key {
            code: key.code(),
            value: event.value(),
        }),
        InputEventKind::Synchronization(_) => Some(RawEvent::Sync),
        _ => None,
    }
}

fn spawn_reader(
    mut device: Device,
    mut tracker: PointerTracker,
    sink: EventSink,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        log::debug!("evdev reader thread started");
        while !stop.load(Ordering::SeqCst) && !sink.is_closed() {
            // SAFETY: the device outlives this borrow
            let fd = unsafe { BorrowedFd::borrow_raw(device.as_raw_fd()) };
            let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    log::error!("evdev poll failed: {}", e);
                    break;
                }
            }
            let revents = fds[0].revents().unwrap_or(PollFlags::empty());
            if revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP) {
                log::error!("Input device went away");
                break;
            }

            match device.fetch_events() {
                Ok(events) => {
                    for event in events {
                        let Some(raw) = raw_event(&event) else {
                            continue;
                        };
                        for translated in tracker.feed(raw) {
                            log::trace!("evdev: {:?}", translated);
                            sink.push(translated);
                        }
                    }
                }
                Err(e) => {
                    log::error!("Error reading evdev events: {}", e);
                    break;
                }
            }
        }
        log::debug!("evdev reader thread stopped");
    })
}

pub struct EvdevBackend {
    path: Option<PathBuf>,
    queue: EventQueue,
    display: DisplaySize,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl EvdevBackend {
    /// Read from `path`, or auto-discover a device when `None`
    pub fn new(path: Option<&Path>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
            queue: EventQueue::default(),
            display: DisplaySize::new(0, 0),
            stop: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    pub fn from_env() -> Self {
        let path = std::env::var_os(ENV_DEVICE).map(PathBuf::from);
        Self::new(path.as_deref())
    }
}

impl Backend for EvdevBackend {
    fn init(&mut self, settings: &Settings) -> BackendResult<()> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => discover_device().ok_or("No usable input device found under /dev/input")?,
        };
        let device = Device::open(&path)
            .map_err(|e| format!("Failed to open input device {}: {}", path.display(), e))?;

        let (abs_x, abs_y) = calibration(&device);
        // Until the first pump reports the real surface size
        self.display
            .set(settings.window_width(), settings.window_height());
        let tracker = PointerTracker::new(self.display.clone()).with_calibration(abs_x, abs_y);

        log::info!(
            "evdev input from {} ({})",
            path.display(),
            device.name().unwrap_or("unknown")
        );

        self.stop.store(false, Ordering::SeqCst);
        self.reader = Some(spawn_reader(
            device,
            tracker,
            self.queue.sink(),
            Arc::clone(&self.stop),
        ));
        self.path = Some(path);
        Ok(())
    }

    fn deinit(&mut self) -> BackendResult<()> {
        self.stop.store(true, Ordering::SeqCst);
        self.queue.close();
        if let Some(reader) = self.reader.take() {
            reader
                .join()
                .map_err(|_| "evdev reader thread panicked")?;
        }
        Ok(())
    }

    fn pump(&mut self, toolkit: &mut dyn Toolkit) -> BackendResult<PumpStatus> {
        // The primary has already applied this tick's resizes
        let (width, height) = toolkit.size();
        if width > 0 && height > 0 {
            self.display.set(width, height);
        }
        Ok(deliver(self.queue.drain(), toolkit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motion(x: i32, y: i32) -> BackendEvent {
        BackendEvent::Input(InputEvent::PointerMotion { x, y })
    }

    #[test]
    fn test_relative_motion_is_clamped() {
        let mut tracker = PointerTracker::new(DisplaySize::new(800, 480));
        assert!(tracker.feed(RawEvent::Rel { axis: REL_X, value: 1000 }).is_empty());
        tracker.feed(RawEvent::Rel { axis: REL_Y, value: -1000 });
        assert_eq!(tracker.feed(RawEvent::Sync), vec![motion(799, 0)]);
        assert!(tracker.feed(RawEvent::Sync).is_empty());
    }

    #[test]
    fn test_absolute_axes_are_calibrated() {
        let range = AxisRange { min: 0, max: 4095 };
        let mut tracker = PointerTracker::new(DisplaySize::new(800, 480)).with_calibration(Some(range), Some(range));
        tracker.feed(RawEvent::Abs { axis: ABS_X, value: 4095 });
        tracker.feed(RawEvent::Abs { axis: ABS_Y, value: 0 });
        assert_eq!(tracker.feed(RawEvent::Sync), vec![motion(799, 0)]);
    }

    #[test]
    fn test_touch_reports_position_and_state() {
        let range = AxisRange { min: 0, max: 99 };
        let mut tracker = PointerTracker::new(DisplaySize::new(100, 100)).with_calibration(Some(range), Some(range));
        tracker.feed(RawEvent::Abs { axis: ABS_X, value: 10 });
        tracker.feed(RawEvent::Abs { axis: ABS_Y, value: 20 });
        tracker.feed(RawEvent::Key { code: BTN_TOUCH, value: 1 });
        assert_eq!(
            tracker.feed(RawEvent::Sync),
            vec![BackendEvent::Input(InputEvent::Touch {
                slot: 0,
                x: 10,
                y: 20,
                pressed: true
            })]
        );

        tracker.feed(RawEvent::Key { code: BTN_TOUCH, value: 0 });
        let released = tracker.feed(RawEvent::Sync);
        assert!(matches!(
            released[0],
            BackendEvent::Input(InputEvent::Touch { pressed: false, .. })
        ));
    }

    #[test]
    fn test_buttons_follow_motion_and_ignore_repeat() {
        let mut tracker = PointerTracker::new(DisplaySize::new(800, 480));
        tracker.feed(RawEvent::Rel { axis: REL_X, value: 5 });
        tracker.feed(RawEvent::Key { code: BTN_LEFT, value: 1 });
        tracker.feed(RawEvent::Key { code: BTN_LEFT, value: 2 });
        let events = tracker.feed(RawEvent::Sync);
        assert_eq!(
            events,
            vec![
                motion(405, 240),
                BackendEvent::Input(InputEvent::PointerButton {
                    button: Button::Left,
                    pressed: true
                }),
            ]
        );
    }

    #[test]
    fn test_keyboard_keys_are_translated() {
        let mut tracker = PointerTracker::new(DisplaySize::new(800, 480));
        tracker.feed(RawEvent::Key { code: 28, value: 1 });
        assert_eq!(
            tracker.feed(RawEvent::Sync),
            vec![BackendEvent::Input(InputEvent::Key {
                key: crate::toolkit::Key::Enter,
                pressed: true
            })]
        );
    }

    #[test]
    fn test_axis_scaling_handles_degenerate_range() {
        let range = AxisRange { min: 5, max: 5 };
        assert_eq!(range.scale(900, 800), 799);
        assert_eq!(AxisRange { min: -100, max: 100 }.scale(0, 201), 100);
    }

    #[test]
    fn test_full_i32_axis_range_does_not_overflow() {
        let range = AxisRange {
            min: i32::MIN,
            max: i32::MAX,
        };
        assert_eq!(range.scale(i32::MIN, 800), 0);
        assert_eq!(range.scale(0, 800), 399);
        assert_eq!(range.scale(i32::MAX, 800), 799);
    }

    #[test]
    fn test_huge_relative_deltas_saturate() {
        let mut tracker = PointerTracker::new(DisplaySize::new(800, 480));
        tracker.feed(RawEvent::Rel { axis: REL_X, value: i32::MAX });
        tracker.feed(RawEvent::Rel { axis: REL_X, value: i32::MAX });
        tracker.feed(RawEvent::Rel { axis: REL_Y, value: i32::MIN });
        assert_eq!(tracker.feed(RawEvent::Sync), vec![motion(799, 0)]);
    }

    #[test]
    fn test_touch_follows_display_resize() {
        let display = DisplaySize::new(800, 480);
        let range = AxisRange { min: 0, max: 4095 };
        let mut tracker =
            PointerTracker::new(display.clone()).with_calibration(Some(range), Some(range));

        // A framebuffer primary reports its native resolution
        display.set(1920, 1080);
        tracker.feed(RawEvent::Abs { axis: ABS_X, value: 4095 });
        tracker.feed(RawEvent::Abs { axis: ABS_Y, value: 4095 });
        tracker.feed(RawEvent::Key { code: BTN_TOUCH, value: 1 });
        assert_eq!(
            tracker.feed(RawEvent::Sync),
            vec![BackendEvent::Input(InputEvent::Touch {
                slot: 0,
                x: 1919,
                y: 1079,
                pressed: true
            })]
        );
    }

    #[test]
    fn test_pump_tracks_toolkit_size() {
        use crate::toolkit::SoftCanvas;

        let mut backend = EvdevBackend::new(None);
        let mut canvas = SoftCanvas::new();
        canvas.resize(1920, 1080);
        assert_eq!(backend.pump(&mut canvas).unwrap(), PumpStatus::Continue);
        assert_eq!(backend.display.get(), (1920, 1080));

        // An unsized toolkit leaves the last known size alone
        let mut unsized_canvas = SoftCanvas::new();
        backend.pump(&mut unsized_canvas).unwrap();
        assert_eq!(backend.display.get(), (1920, 1080));
    }

    #[test]
    fn test_missing_device_fails_init() {
        let mut backend = EvdevBackend::new(Some(Path::new("/nonexistent/event99")));
        assert!(backend.init(&Settings::default()).is_err());
        assert!(backend.deinit().is_ok());
    }
}
