//! Headless Backend - Off-screen target
//!
//! This backend accepts every frame but shows nothing. It keeps a copy of the
//! last presented frame so it can be inspected, and can end the session after
//! a fixed number of frames, which makes it useful for CI and smoke tests
//! without a real display system.

use super::*;
use crate::config::Settings;
use crate::toolkit::{Frame, Rect, Toolkit};

/// Environment variable limiting the number of presented frames
pub const ENV_FRAME_LIMIT: &str = "LV_SIM_HEADLESS_FRAMES";

pub struct HeadlessBackend {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    last_dirty: Rect,
    frames: u64,
    frame_limit: Option<u64>,
    pending: Vec<BackendEvent>,
    initialized: bool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
            last_dirty: Rect::default(),
            frames: 0,
            frame_limit: None,
            pending: Vec::new(),
            initialized: false,
        }
    }

    pub fn from_env() -> Self {
        let limit = std::env::var(ENV_FRAME_LIMIT)
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|&n| n > 0);
        Self::new().with_frame_limit(limit)
    }

    /// Quit once this many frames have been presented
    pub fn with_frame_limit(mut self, limit: Option<u64>) -> Self {
        self.frame_limit = limit;
        self
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    /// Last presented pixels, XRGB8888
    pub fn snapshot(&self) -> &[u32] {
        &self.pixels
    }

    pub fn last_dirty(&self) -> Rect {
        self.last_dirty
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for HeadlessBackend {
    fn init(&mut self, settings: &Settings) -> BackendResult<()> {
        self.width = settings.window_width();
        self.height = settings.window_height();
        self.pixels = vec![0; (self.width as usize) * (self.height as usize)];
        self.initialized = true;
        log::debug!(
            "Headless surface {}x{}, frame limit {:?}",
            self.width,
            self.height,
            self.frame_limit
        );
        Ok(())
    }

    fn deinit(&mut self) -> BackendResult<()> {
        self.initialized = false;
        self.pixels = Vec::new();
        log::debug!("Headless backend presented {} frames", self.frames);
        Ok(())
    }

    fn pump(&mut self, toolkit: &mut dyn Toolkit) -> BackendResult<PumpStatus> {
        if !self.initialized {
            return Err("Backend not initialized".into());
        }
        Ok(deliver(self.pending.drain(..), toolkit))
    }

    fn present(&mut self, frame: &Frame<'_>) -> BackendResult<()> {
        if !self.initialized {
            return Err("Backend not initialized".into());
        }
        if frame.width != self.width || frame.height != self.height {
            self.width = frame.width;
            self.height = frame.height;
            self.pixels = vec![0; (self.width as usize) * (self.height as usize)];
        }

        let dirty = frame.dirty.clamp_to(self.width, self.height);
        for y in dirty.y..dirty.bottom() {
            let start = (y * self.width + dirty.x) as usize;
            let end = start + dirty.width as usize;
            self.pixels[start..end].copy_from_slice(&frame.pixels[start..end]);
        }
        self.last_dirty = dirty;
        self.frames += 1;

        if let Some(limit) = self.frame_limit {
            if self.frames >= limit {
                log::info!("Headless frame limit of {} reached", limit);
                self.pending.push(BackendEvent::CloseRequested);
            }
        }
        Ok(())
    }
}
