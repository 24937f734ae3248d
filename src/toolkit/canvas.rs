//! Software toolkit stand-in
//!
//! Keeps just enough state to exercise the backend contract end to end:
//! a clock, a refresh period, a pointer marker and dirty-region tracking.

use super::{Frame, InputEvent, Rect, Toolkit};
use crate::config::Settings;
use std::time::Duration;

/// Minimum time between two redraw passes
pub const REFRESH_PERIOD: Duration = Duration::from_millis(33);

const BACKGROUND: u32 = 0x001d_1b1b;
const MARKER_IDLE: u32 = 0x003c_7acc;
const MARKER_PRESSED: u32 = 0x00ff_bb00;
const MARKER_SIZE: u32 = 12;

pub struct SoftCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    now: Duration,
    last_refresh: Option<Duration>,
    dirty: Rect,
    ready: Rect,
    frame_ready: bool,
    pointer: (i32, i32),
    pressed: bool,
    frames: u64,
}

impl SoftCanvas {
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
            now: Duration::ZERO,
            last_refresh: None,
            dirty: Rect::default(),
            ready: Rect::default(),
            frame_ready: false,
            pointer: (0, 0),
            pressed: false,
            frames: 0,
        }
    }

    /// Number of redraw passes that produced a frame
    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    fn full(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    fn marker_rect(&self) -> Rect {
        let half = (MARKER_SIZE / 2) as i32;
        let x = (self.pointer.0 - half).max(0) as u32;
        let y = (self.pointer.1 - half).max(0) as u32;
        Rect::new(x, y, MARKER_SIZE, MARKER_SIZE).clamp_to(self.width, self.height)
    }

    fn mark(&mut self, area: Rect) {
        self.dirty = self.dirty.union(&area);
    }

    fn render(&mut self, area: Rect) {
        for y in area.y..area.bottom() {
            let row = (y * self.width) as usize;
            for x in area.x..area.right() {
                self.pixels[row + x as usize] = BACKGROUND;
            }
        }

        let marker = self.marker_rect();
        let color = if self.pressed {
            MARKER_PRESSED
        } else {
            MARKER_IDLE
        };
        for y in marker.y..marker.bottom() {
            let row = (y * self.width) as usize;
            for x in marker.x..marker.right() {
                self.pixels[row + x as usize] = color;
            }
        }
    }
}

impl Default for SoftCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Toolkit for SoftCanvas {
    fn init(&mut self, settings: &Settings) {
        self.resize(settings.window_width(), settings.window_height());
    }

    fn tick_inc(&mut self, elapsed: Duration) {
        self.now += elapsed;
    }

    fn timer_handler(&mut self) -> Duration {
        if let Some(last) = self.last_refresh {
            let since = self.now.saturating_sub(last);
            if since < REFRESH_PERIOD {
                return REFRESH_PERIOD - since;
            }
        }
        self.last_refresh = Some(self.now);

        let area = self.dirty.clamp_to(self.width, self.height);
        self.dirty = Rect::default();
        if !area.is_empty() {
            // Pointer may have moved since the area was marked
            let area = area.union(&self.marker_rect());
            self.render(area);
            self.ready = if self.frame_ready {
                self.ready.union(&area)
            } else {
                area
            };
            self.frame_ready = true;
            self.frames += 1;
        }
        REFRESH_PERIOD
    }

    fn inject(&mut self, event: InputEvent) {
        log::trace!("Input: {:?}", event);
        match event {
            InputEvent::PointerMotion { x, y } => {
                let before = self.marker_rect();
                self.pointer = (x, y);
                let after = self.marker_rect();
                self.mark(before.union(&after));
            }
            InputEvent::PointerButton { pressed, .. } => {
                self.pressed = pressed;
                let marker = self.marker_rect();
                self.mark(marker);
            }
            InputEvent::Touch { x, y, pressed, .. } => {
                let before = self.marker_rect();
                self.pointer = (x, y);
                self.pressed = pressed;
                let after = self.marker_rect();
                self.mark(before.union(&after));
            }
            InputEvent::Wheel { .. } | InputEvent::Key { .. } => {}
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        log::debug!("Canvas resized to {}x{}", width, height);
        self.width = width;
        self.height = height;
        self.pixels = vec![BACKGROUND; (width as usize) * (height as usize)];
        self.frame_ready = false;
        self.dirty = self.full();
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn invalidate(&mut self) {
        self.dirty = self.full();
    }

    fn take_frame(&mut self) -> Option<Frame<'_>> {
        if !self.frame_ready {
            return None;
        }
        self.frame_ready = false;
        Some(Frame {
            width: self.width,
            height: self.height,
            pixels: &self.pixels,
            dirty: self.ready,
        })
    }
}
