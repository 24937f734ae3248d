//! GUI toolkit boundary
//!
//! The orchestration layer never draws anything itself. It talks to the
//! toolkit through the [`Toolkit`] trait: one `init` before any backend comes
//! up, then a timer advance, input injection and a redraw pass every tick.

mod canvas;
pub use canvas::SoftCanvas;

use crate::config::Settings;
use std::time::Duration;

/// Keys understood by the toolkit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Escape,
    Delete,
    Backspace,
    Enter,
    Next,
    Prev,
    Home,
    End,
    Char(char),
}

impl Key {
    /// Numeric key code as seen by the toolkit's keypad input device
    pub fn code(self) -> u32 {
        match self {
            Key::Up => 17,
            Key::Down => 18,
            Key::Right => 19,
            Key::Left => 20,
            Key::Escape => 27,
            Key::Delete => 127,
            Key::Backspace => 8,
            Key::Enter => 10,
            Key::Next => 9,
            Key::Prev => 11,
            Key::Home => 2,
            Key::End => 3,
            Key::Char(c) => c as u32,
        }
    }
}

/// Pointer buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Middle,
    Right,
}

/// Abstract input delivered to the toolkit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Absolute pointer position in display coordinates
    PointerMotion { x: i32, y: i32 },
    PointerButton { button: Button, pressed: bool },
    /// Positive is away from the user
    Wheel { delta: i32 },
    Touch {
        slot: u32,
        x: i32,
        y: i32,
        pressed: bool,
    },
    Key { key: Key, pressed: bool },
}

/// Axis-aligned rectangle in display coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    /// Clip to a `width` x `height` surface
    pub fn clamp_to(&self, width: u32, height: u32) -> Rect {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Rect::new(
            x,
            y,
            self.right().min(width) - x,
            self.bottom().min(height) - y,
        )
    }
}

/// A rendered frame ready for presentation
///
/// `pixels` holds the whole surface in XRGB8888, row-major with no padding;
/// `dirty` is the region redrawn since the previous frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u32],
    pub dirty: Rect,
}

impl<'a> Frame<'a> {
    /// Pixels of one row
    pub fn row(&self, y: u32) -> &'a [u32] {
        let start = (y * self.width) as usize;
        &self.pixels[start..start + self.width as usize]
    }
}

/// Entry points the orchestration layer and backends call on the toolkit
pub trait Toolkit {
    /// Called once, before any backend initializes
    fn init(&mut self, settings: &Settings);

    /// Advance the toolkit's internal clock
    fn tick_inc(&mut self, elapsed: Duration);

    /// Run due timers and the redraw pass; returns how long until the
    /// toolkit next needs service
    fn timer_handler(&mut self) -> Duration;

    /// Deliver one input event
    fn inject(&mut self, event: InputEvent);

    /// The display surface changed size
    fn resize(&mut self, width: u32, height: u32);

    /// Current display size in pixels
    fn size(&self) -> (u32, u32);

    /// Force a full redraw on the next pass
    fn invalidate(&mut self);

    /// Take the frame produced by the last redraw pass, if any
    fn take_frame(&mut self) -> Option<Frame<'_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_union() {
        let a = Rect::new(10, 10, 5, 5);
        let b = Rect::new(0, 12, 4, 10);
        assert_eq!(a.union(&b), Rect::new(0, 10, 15, 12));
        assert_eq!(Rect::default().union(&a), a);
    }

    #[test]
    fn test_rect_clamp() {
        let r = Rect::new(790, 470, 20, 20).clamp_to(800, 480);
        assert_eq!(r, Rect::new(790, 470, 10, 10));
        assert!(Rect::new(900, 0, 10, 10).clamp_to(800, 480).is_empty());
    }

    #[test]
    fn test_key_codes() {
        assert_eq!(Key::Enter.code(), 10);
        assert_eq!(Key::Left.code(), 20);
        assert_eq!(Key::Char('a').code(), 97);
    }
}
