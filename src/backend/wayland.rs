//! Wayland Backend - xdg-shell toplevel with shared-memory buffers
//!
//! The backend owns its event queue and drives it without blocking: each pump
//! flushes requests, reads whatever the socket has, and dispatches into
//! [`WaylandState`], whose handlers collect [`BackendEvent`]s for delivery.
//! Frames are copied into a single memfd-backed `wl_buffer`.

use super::keymap::LinuxKeymap;
use super::*;
use crate::config::Settings;
use crate::toolkit::{Button, Frame, InputEvent, Rect, Toolkit};
use byteorder::{ByteOrder, LittleEndian};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::memfd::{memfd_create, MemFdCreateFlag};
use std::fs::File;
use std::os::fd::AsFd;
use std::os::unix::fs::FileExt;
use wayland_client::backend::WaylandError;
use wayland_client::globals::{registry_queue_init, GlobalListContents};
use wayland_client::protocol::{
    wl_buffer, wl_compositor, wl_keyboard, wl_pointer, wl_registry, wl_seat, wl_shm, wl_shm_pool,
    wl_surface,
};
use wayland_client::{delegate_noop, Connection, Dispatch, EventQueue, Proxy, QueueHandle, WEnum};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

const WINDOW_TITLE: &str = "lvsim";

/// Linux input button codes carried by wl_pointer
const BTN_LEFT: u32 = 0x110;
const BTN_RIGHT: u32 = 0x111;
const BTN_MIDDLE: u32 = 0x112;

fn pointer_button(code: u32) -> Option<Button> {
    match code {
        BTN_LEFT => Some(Button::Left),
        BTN_RIGHT => Some(Button::Right),
        BTN_MIDDLE => Some(Button::Middle),
        _ => None,
    }
}

/// Protocol-side state mutated by the dispatch handlers
pub struct WaylandState {
    pending: Vec<BackendEvent>,
    size: (u32, u32),
    configured: bool,
    buffer_busy: bool,
    needs_redraw: bool,
    keymap: LinuxKeymap,
    pointer: Option<wl_pointer::WlPointer>,
    keyboard: Option<wl_keyboard::WlKeyboard>,
}

impl WaylandState {
    fn new(settings: &Settings) -> Self {
        Self {
            pending: Vec::new(),
            size: (settings.window_width(), settings.window_height()),
            configured: false,
            buffer_busy: false,
            needs_redraw: false,
            keymap: LinuxKeymap::new(),
            pointer: None,
            keyboard: None,
        }
    }

    fn input(&mut self, event: InputEvent) {
        self.pending.push(BackendEvent::Input(event));
    }
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for WaylandState {
    fn event(
        _state: &mut Self,
        _registry: &wl_registry::WlRegistry,
        _event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Globals are bound once at startup
    }
}

delegate_noop!(WaylandState: wl_compositor::WlCompositor);
delegate_noop!(WaylandState: wl_shm_pool::WlShmPool);
delegate_noop!(WaylandState: ignore wl_shm::WlShm);
delegate_noop!(WaylandState: ignore wl_surface::WlSurface);

impl Dispatch<wl_buffer::WlBuffer, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _buffer: &wl_buffer::WlBuffer,
        event: wl_buffer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            state.buffer_busy = false;
        }
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for WaylandState {
    fn event(
        _state: &mut Self,
        wm_base: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, ()> for WaylandState {
    fn event(
        state: &mut Self,
        xdg_surface: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            xdg_surface.ack_configure(serial);
            state.configured = true;
            state.needs_redraw = true;
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _toplevel: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                // Zero means the client picks its own size
                if width <= 0 || height <= 0 {
                    return;
                }
                let size = (width as u32, height as u32);
                if size != state.size {
                    state.size = size;
                    state.pending.push(BackendEvent::Resize {
                        width: size.0,
                        height: size.1,
                    });
                }
            }
            xdg_toplevel::Event::Close => state.pending.push(BackendEvent::CloseRequested),
            _ => {}
        }
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for WaylandState {
    fn event(
        state: &mut Self,
        seat: &wl_seat::WlSeat,
        event: wl_seat::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let wl_seat::Event::Capabilities {
            capabilities: WEnum::Value(capabilities),
        } = event
        {
            if capabilities.contains(wl_seat::Capability::Pointer) && state.pointer.is_none() {
                state.pointer = Some(seat.get_pointer(qh, ()));
            }
            if capabilities.contains(wl_seat::Capability::Keyboard) && state.keyboard.is_none() {
                state.keyboard = Some(seat.get_keyboard(qh, ()));
            }
        }
    }
}

impl Dispatch<wl_pointer::WlPointer, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _pointer: &wl_pointer::WlPointer,
        event: wl_pointer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_pointer::Event::Enter {
                surface_x,
                surface_y,
                ..
            }
            | wl_pointer::Event::Motion {
                surface_x,
                surface_y,
                ..
            } => state.input(InputEvent::PointerMotion {
                x: surface_x as i32,
                y: surface_y as i32,
            }),
            wl_pointer::Event::Button {
                button,
                state: WEnum::Value(button_state),
                ..
            } => {
                if let Some(button) = pointer_button(button) {
                    let pressed = button_state == wl_pointer::ButtonState::Pressed;
                    state.input(InputEvent::PointerButton { button, pressed });
                }
            }
            wl_pointer::Event::Axis {
                axis: WEnum::Value(wl_pointer::Axis::VerticalScroll),
                value,
                ..
            } if value != 0.0 => {
                // Positive values scroll down
                let delta = if value > 0.0 { -1 } else { 1 };
                state.input(InputEvent::Wheel { delta });
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_keyboard::WlKeyboard, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _keyboard: &wl_keyboard::WlKeyboard,
        event: wl_keyboard::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // The compositor keymap fd is dropped; evdev codes are translated directly
        if let wl_keyboard::Event::Key {
            key,
            state: WEnum::Value(key_state),
            ..
        } = event
        {
            let pressed = key_state == wl_keyboard::KeyState::Pressed;
            let Ok(code) = u16::try_from(key) else {
                return;
            };
            if let Some(key) = state.keymap.translate(code, pressed) {
                state.input(InputEvent::Key { key, pressed });
            }
        }
    }
}

/// One memfd-backed buffer and its pool
struct ShmBuffer {
    file: File,
    pool: wl_shm_pool::WlShmPool,
    buffer: wl_buffer::WlBuffer,
    width: u32,
    height: u32,
}

impl ShmBuffer {
    fn create(
        shm: &wl_shm::WlShm,
        qh: &QueueHandle<WaylandState>,
        width: u32,
        height: u32,
    ) -> BackendResult<Self> {
        let stride = width * 4;
        let len = stride as usize * height as usize;
        let pool_size = i32::try_from(len).map_err(|_| "Buffer too large for wl_shm")?;

        let fd = memfd_create(c"lvsim-shm", MemFdCreateFlag::MFD_CLOEXEC)?;
        let file: File = fd.into();
        file.set_len(len as u64)?;

        let pool = shm.create_pool(file.as_fd(), pool_size, qh, ());
        let buffer = pool.create_buffer(
            0,
            width as i32,
            height as i32,
            stride as i32,
            wl_shm::Format::Xrgb8888,
            qh,
            (),
        );
        log::debug!("Created {}x{} shm buffer", width, height);
        Ok(Self {
            file,
            pool,
            buffer,
            width,
            height,
        })
    }

    fn destroy(self) {
        self.buffer.destroy();
        self.pool.destroy();
    }
}

struct Session {
    _conn: Connection,
    queue: EventQueue<WaylandState>,
    state: WaylandState,
    qh: QueueHandle<WaylandState>,
    shm: wl_shm::WlShm,
    surface: wl_surface::WlSurface,
    xdg_surface: xdg_surface::XdgSurface,
    toplevel: xdg_toplevel::XdgToplevel,
    buffer: Option<ShmBuffer>,
}

#[derive(Default)]
pub struct WaylandBackend {
    session: Option<Session>,
    scratch: Vec<u8>,
}

impl WaylandBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for WaylandBackend {
    fn init(&mut self, settings: &Settings) -> BackendResult<()> {
        let conn = Connection::connect_to_env()
            .map_err(|e| format!("Failed to connect to Wayland display: {}", e))?;
        let (globals, mut queue) = registry_queue_init::<WaylandState>(&conn)?;
        let qh = queue.handle();

        let compositor: wl_compositor::WlCompositor = globals.bind(&qh, 1..=4, ())?;
        let shm: wl_shm::WlShm = globals.bind(&qh, 1..=1, ())?;
        let wm_base: xdg_wm_base::XdgWmBase = globals.bind(&qh, 1..=2, ())?;
        match globals.bind::<wl_seat::WlSeat, _, _>(&qh, 1..=5, ()) {
            Ok(_seat) => {}
            Err(e) => log::warn!("No wl_seat, input disabled: {}", e),
        }

        let surface = compositor.create_surface(&qh, ());
        let xdg_surface = wm_base.get_xdg_surface(&surface, &qh, ());
        let toplevel = xdg_surface.get_toplevel(&qh, ());
        toplevel.set_title(WINDOW_TITLE.to_string());
        toplevel.set_app_id(WINDOW_TITLE.to_string());
        if settings.fullscreen() {
            toplevel.set_fullscreen(None);
        } else if settings.maximize() {
            toplevel.set_maximized();
        }
        surface.commit();

        let mut state = WaylandState::new(settings);
        queue.roundtrip(&mut state)?;

        log::info!(
            "Wayland toplevel {}x{} (configured: {})",
            state.size.0,
            state.size.1,
            state.configured
        );

        self.session = Some(Session {
            _conn: conn,
            queue,
            state,
            qh,
            shm,
            surface,
            xdg_surface,
            toplevel,
            buffer: None,
        });
        Ok(())
    }

    fn deinit(&mut self) -> BackendResult<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        if let Some(buffer) = session.buffer.take() {
            buffer.destroy();
        }
        // wl_pointer and wl_keyboard gained release in version 3
        if let Some(pointer) = session.state.pointer.take() {
            if pointer.version() >= 3 {
                pointer.release();
            }
        }
        if let Some(keyboard) = session.state.keyboard.take() {
            if keyboard.version() >= 3 {
                keyboard.release();
            }
        }
        session.toplevel.destroy();
        session.xdg_surface.destroy();
        session.surface.destroy();
        session.queue.flush()?;
        log::debug!("Wayland surface destroyed");
        Ok(())
    }

    fn pump(&mut self, toolkit: &mut dyn Toolkit) -> BackendResult<PumpStatus> {
        let session = self.session.as_mut().ok_or("Backend not initialized")?;
        session.queue.flush()?;

        if let Some(guard) = session.queue.prepare_read() {
            let ready = {
                let mut fds = [PollFd::new(guard.connection_fd(), PollFlags::POLLIN)];
                poll(&mut fds, PollTimeout::ZERO)?
            };
            // Dropping the guard without reading cancels the read
            if ready > 0 {
                match guard.read() {
                    Ok(_) => {}
                    Err(WaylandError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        session.queue.dispatch_pending(&mut session.state)?;

        if std::mem::take(&mut session.state.needs_redraw) {
            toolkit.invalidate();
        }
        Ok(deliver(session.state.pending.drain(..), toolkit))
    }

    fn present(&mut self, frame: &Frame<'_>) -> BackendResult<()> {
        let session = self.session.as_mut().ok_or("Backend not initialized")?;
        if !session.state.configured || session.state.buffer_busy {
            // Retry with a full redraw once the compositor is ready
            session.state.needs_redraw = true;
            return Ok(());
        }

        let mut region = frame.dirty.clamp_to(frame.width, frame.height);
        let stale = session
            .buffer
            .as_ref()
            .map_or(true, |b| (b.width, b.height) != (frame.width, frame.height));
        if stale {
            if let Some(old) = session.buffer.take() {
                old.destroy();
            }
            session.buffer = Some(ShmBuffer::create(
                &session.shm,
                &session.qh,
                frame.width,
                frame.height,
            )?);
            region = Rect::new(0, 0, frame.width, frame.height);
        }
        if region.is_empty() {
            return Ok(());
        }
        let Some(buffer) = session.buffer.as_ref() else {
            return Ok(());
        };

        let stride = u64::from(buffer.width) * 4;
        for y in region.y..region.bottom() {
            let src = &frame.row(y)[region.x as usize..region.right() as usize];
            self.scratch.resize(src.len() * 4, 0);
            LittleEndian::write_u32_into(src, &mut self.scratch);
            let offset = u64::from(y) * stride + u64::from(region.x) * 4;
            buffer.file.write_all_at(&self.scratch, offset)?;
        }

        session.surface.attach(Some(&buffer.buffer), 0, 0);
        session.surface.damage(
            region.x as i32,
            region.y as i32,
            region.width as i32,
            region.height as i32,
        );
        session.surface.commit();
        session.state.buffer_busy = true;
        session.queue.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_button_codes() {
        assert_eq!(pointer_button(0x110), Some(Button::Left));
        assert_eq!(pointer_button(0x111), Some(Button::Right));
        assert_eq!(pointer_button(0x112), Some(Button::Middle));
        assert_eq!(pointer_button(0x113), None);
    }

    #[test]
    fn test_state_starts_at_configured_size() {
        let settings = Settings::default();
        let state = WaylandState::new(&settings);
        assert_eq!(
            state.size,
            (settings.window_width(), settings.window_height())
        );
        assert!(!state.configured);
        assert!(state.pending.is_empty());
    }

    #[test]
    fn test_pump_before_init_fails() {
        let mut backend = WaylandBackend::new();
        let mut toolkit = crate::toolkit::SoftCanvas::new();
        assert!(backend.pump(&mut toolkit).is_err());
    }
}
