//! X11 Backend - Window on a running X server
//!
//! Opens one top-level window through x11rb and presents frames with
//! `PutImage`, split into strips that fit the server's maximum request size.
//! A dedicated thread blocks on the connection for events, translates them
//! and hands them to the owning thread through an [`EventQueue`].

use super::keymap::keysym_to_key;
use super::*;
use crate::config::Settings;
use crate::toolkit::{Button, Frame, InputEvent, Toolkit};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::xproto::{
    AtomEnum, ConnectionExt as _, CreateGCAux, CreateWindowAux, EventMask, Gcontext, ImageFormat,
    ImageOrder, KeyButMask, PropMode, Window, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::COPY_DEPTH_FROM_PARENT;

const WINDOW_TITLE: &str = "lvsim";

/// PutImage request header size in bytes
const PUT_IMAGE_HEADER: usize = 24;

#[derive(Debug, Clone, Copy)]
struct Atoms {
    wm_protocols: u32,
    wm_delete_window: u32,
    net_wm_state: u32,
    net_wm_state_fullscreen: u32,
    net_wm_state_maximized_vert: u32,
    net_wm_state_maximized_horz: u32,
}

impl Atoms {
    fn intern(conn: &RustConnection) -> BackendResult<Self> {
        let intern = |name: &str| -> BackendResult<u32> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };
        Ok(Atoms {
            wm_protocols: intern("WM_PROTOCOLS")?,
            wm_delete_window: intern("WM_DELETE_WINDOW")?,
            net_wm_state: intern("_NET_WM_STATE")?,
            net_wm_state_fullscreen: intern("_NET_WM_STATE_FULLSCREEN")?,
            net_wm_state_maximized_vert: intern("_NET_WM_STATE_MAXIMIZED_VERT")?,
            net_wm_state_maximized_horz: intern("_NET_WM_STATE_MAXIMIZED_HORZ")?,
        })
    }

    /// `_NET_WM_STATE` atoms for the requested window mode; fullscreen wins
    fn window_state(&self, settings: &Settings) -> Vec<u32> {
        if settings.fullscreen() {
            vec![self.net_wm_state_fullscreen]
        } else if settings.maximize() {
            vec![
                self.net_wm_state_maximized_vert,
                self.net_wm_state_maximized_horz,
            ]
        } else {
            Vec::new()
        }
    }
}

/// Keycode to keysym table fetched once at startup
#[derive(Debug, Clone, Default)]
struct Keysyms {
    min_keycode: u8,
    per_keycode: u8,
    syms: Vec<u32>,
}

impl Keysyms {
    fn fetch(conn: &RustConnection) -> BackendResult<Self> {
        let setup = conn.setup();
        let min = setup.min_keycode;
        let count = setup.max_keycode - min + 1;
        let reply = conn.get_keyboard_mapping(min, count)?.reply()?;
        Ok(Keysyms {
            min_keycode: min,
            per_keycode: reply.keysyms_per_keycode,
            syms: reply.keysyms,
        })
    }

    fn lookup(&self, keycode: u8, shift: bool) -> u32 {
        if keycode < self.min_keycode || self.per_keycode == 0 {
            return 0;
        }
        let base = (keycode - self.min_keycode) as usize * self.per_keycode as usize;
        let plain = self.syms.get(base).copied().unwrap_or(0);
        if !shift {
            return plain;
        }
        match self.syms.get(base + 1).copied() {
            Some(shifted) if shifted != 0 && self.per_keycode > 1 => shifted,
            // No shifted column: letters still uppercase
            _ if (0x61..=0x7a).contains(&plain) => plain - 0x20,
            _ => plain,
        }
    }
}

/// Pointer button number to toolkit event
fn button_event(detail: u8, pressed: bool) -> Option<InputEvent> {
    let button = match detail {
        1 => Button::Left,
        2 => Button::Middle,
        3 => Button::Right,
        4 if pressed => return Some(InputEvent::Wheel { delta: 1 }),
        5 if pressed => return Some(InputEvent::Wheel { delta: -1 }),
        _ => return None,
    };
    Some(InputEvent::PointerButton { button, pressed })
}

/// State shared with the event thread
struct EventContext {
    window: Window,
    atoms: Atoms,
    keysyms: Keysyms,
    exposed: Arc<AtomicBool>,
    size: (u16, u16),
}

impl EventContext {
    fn translate(&mut self, event: Event) -> Option<BackendEvent> {
        match event {
            Event::MotionNotify(e) => Some(BackendEvent::Input(InputEvent::PointerMotion {
                x: i32::from(e.event_x),
                y: i32::from(e.event_y),
            })),
            Event::ButtonPress(e) => button_event(e.detail, true).map(BackendEvent::Input),
            Event::ButtonRelease(e) => button_event(e.detail, false).map(BackendEvent::Input),
            Event::KeyPress(e) => self.key(e.detail, e.state, true),
            Event::KeyRelease(e) => self.key(e.detail, e.state, false),
            Event::Expose(e) if e.count == 0 => {
                self.exposed.store(true, Ordering::SeqCst);
                None
            }
            Event::ConfigureNotify(e) if e.window == self.window => {
                if (e.width, e.height) == self.size {
                    return None;
                }
                self.size = (e.width, e.height);
                Some(BackendEvent::Resize {
                    width: u32::from(e.width),
                    height: u32::from(e.height),
                })
            }
            Event::ClientMessage(e)
                if e.format == 32
                    && e.type_ == self.atoms.wm_protocols
                    && e.data.as_data32()[0] == self.atoms.wm_delete_window =>
            {
                Some(BackendEvent::CloseRequested)
            }
            Event::Error(e) => {
                log::warn!("X11 error: {:?}", e);
                None
            }
            _ => None,
        }
    }

    fn key(&self, detail: u8, state: KeyButMask, pressed: bool) -> Option<BackendEvent> {
        let keysym = self.keysyms.lookup(detail, state.contains(KeyButMask::SHIFT));
        keysym_to_key(keysym).map(|key| BackendEvent::Input(InputEvent::Key { key, pressed }))
    }
}

fn spawn_reader(
    conn: Arc<RustConnection>,
    mut context: EventContext,
    sink: EventSink,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        log::debug!("X11 event thread started");
        loop {
            let event = match conn.wait_for_event() {
                Ok(event) => event,
                Err(e) => {
                    log::error!("X11 connection lost: {}", e);
                    sink.push(BackendEvent::CloseRequested);
                    break;
                }
            };
            if let Event::DestroyNotify(e) = &event {
                if e.window == context.window {
                    break;
                }
            }
            if let Some(translated) = context.translate(event) {
                log::trace!("x11: {:?}", translated);
                sink.push(translated);
            }
            if stop.load(Ordering::SeqCst) {
                break;
            }
        }
        log::debug!("X11 event thread stopped");
    })
}

struct Session {
    conn: Arc<RustConnection>,
    window: Window,
    gc: Gcontext,
    depth: u8,
    byte_order: ImageOrder,
    max_request: usize,
    reader: Option<JoinHandle<()>>,
}

pub struct X11Backend {
    display: Option<String>,
    session: Option<Session>,
    queue: EventQueue,
    exposed: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    scratch: Vec<u8>,
}

impl X11Backend {
    /// Connect to the display named by `$DISPLAY`
    pub fn new() -> Self {
        Self {
            display: None,
            session: None,
            queue: EventQueue::default(),
            exposed: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            scratch: Vec::new(),
        }
    }

    /// Connect to an explicit display such as `:1`
    pub fn with_display(mut self, display: &str) -> Self {
        self.display = Some(display.to_string());
        self
    }

    fn open(&mut self, settings: &Settings) -> BackendResult<Session> {
        let (conn, screen_num) = x11rb::connect(self.display.as_deref())
            .map_err(|e| format!("Failed to connect to X display: {}", e))?;
        let screen = &conn.setup().roots[screen_num];

        let depth = screen.root_depth;
        let bits_per_pixel = conn
            .setup()
            .pixmap_formats
            .iter()
            .find(|f| f.depth == depth)
            .map(|f| f.bits_per_pixel);
        if !matches!(depth, 24 | 32) || bits_per_pixel != Some(32) {
            return Err(format!(
                "Unsupported X visual: depth {} ({:?} bpp)",
                depth, bits_per_pixel
            )
            .into());
        }

        let width = u16::try_from(settings.window_width()).unwrap_or(u16::MAX);
        let height = u16::try_from(settings.window_height()).unwrap_or(u16::MAX);

        let window = conn.generate_id()?;
        conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            window,
            screen.root,
            0,
            0,
            width,
            height,
            0,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &CreateWindowAux::new()
                .background_pixel(screen.black_pixel)
                .event_mask(
                    EventMask::EXPOSURE
                        | EventMask::STRUCTURE_NOTIFY
                        | EventMask::KEY_PRESS
                        | EventMask::KEY_RELEASE
                        | EventMask::BUTTON_PRESS
                        | EventMask::BUTTON_RELEASE
                        | EventMask::POINTER_MOTION,
                ),
        )?;

        let atoms = Atoms::intern(&conn)?;
        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            WINDOW_TITLE.as_bytes(),
        )?;
        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.wm_protocols,
            AtomEnum::ATOM,
            &[atoms.wm_delete_window],
        )?;

        let state = atoms.window_state(settings);
        if !state.is_empty() {
            // Set before mapping so the window manager applies it on map
            conn.change_property32(
                PropMode::REPLACE,
                window,
                atoms.net_wm_state,
                AtomEnum::ATOM,
                &state,
            )?;
        }

        let gc = conn.generate_id()?;
        conn.create_gc(gc, window, &CreateGCAux::new())?;
        let keysyms = Keysyms::fetch(&conn)?;

        conn.map_window(window)?;
        conn.flush()?;

        let byte_order = conn.setup().image_byte_order;
        let max_request = conn.maximum_request_bytes();
        let conn = Arc::new(conn);

        let context = EventContext {
            window,
            atoms,
            keysyms,
            exposed: Arc::clone(&self.exposed),
            size: (width, height),
        };
        self.stop.store(false, Ordering::SeqCst);
        let reader = spawn_reader(
            Arc::clone(&conn),
            context,
            self.queue.sink(),
            Arc::clone(&self.stop),
        );

        log::info!(
            "X11 window 0x{:x} {}x{} (depth {})",
            window,
            width,
            height,
            depth
        );

        Ok(Session {
            conn,
            window,
            gc,
            depth,
            byte_order,
            max_request,
            reader: Some(reader),
        })
    }
}

impl Default for X11Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for X11Backend {
    fn init(&mut self, settings: &Settings) -> BackendResult<()> {
        let session = self.open(settings)?;
        self.session = Some(session);
        Ok(())
    }

    fn deinit(&mut self) -> BackendResult<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        self.stop.store(true, Ordering::SeqCst);
        self.queue.close();

        // Destroying the window wakes the event thread with DestroyNotify
        session.conn.free_gc(session.gc)?;
        session.conn.destroy_window(session.window)?;
        session.conn.flush()?;

        if let Some(reader) = session.reader.take() {
            reader.join().map_err(|_| "X11 event thread panicked")?;
        }
        log::debug!("X11 window 0x{:x} destroyed", session.window);
        Ok(())
    }

    fn pump(&mut self, toolkit: &mut dyn Toolkit) -> BackendResult<PumpStatus> {
        if self.session.is_none() {
            return Err("Backend not initialized".into());
        }
        if self.exposed.swap(false, Ordering::SeqCst) {
            toolkit.invalidate();
        }
        Ok(deliver(self.queue.drain(), toolkit))
    }

    fn present(&mut self, frame: &Frame<'_>) -> BackendResult<()> {
        let session = self.session.as_ref().ok_or("Backend not initialized")?;
        let dirty = frame.dirty.clamp_to(frame.width, frame.height);
        if dirty.is_empty() {
            return Ok(());
        }

        let row_bytes = dirty.width as usize * 4;
        let budget = session.max_request.saturating_sub(PUT_IMAGE_HEADER);
        let rows_per_strip = (budget / row_bytes).max(1) as u32;

        let mut y = dirty.y;
        while y < dirty.bottom() {
            let rows = rows_per_strip.min(dirty.bottom() - y);
            self.scratch.resize(row_bytes * rows as usize, 0);
            for (i, chunk) in self.scratch.chunks_exact_mut(row_bytes).enumerate() {
                let src = &frame.row(y + i as u32)[dirty.x as usize..dirty.right() as usize];
                if session.byte_order == ImageOrder::MSB_FIRST {
                    BigEndian::write_u32_into(src, chunk);
                } else {
                    LittleEndian::write_u32_into(src, chunk);
                }
            }
            session.conn.put_image(
                ImageFormat::Z_PIXMAP,
                session.window,
                session.gc,
                dirty.width as u16,
                rows as u16,
                dirty.x as i16,
                y as i16,
                0,
                session.depth,
                &self.scratch,
            )?;
            y += rows;
        }
        session.conn.flush()?;
        Ok(())
    }
}
