//! Native key code translation
//!
//! Linux input codes are shared by evdev devices and Wayland keyboards;
//! X11 delivers keysyms. Both end up as [`Key`].

use crate::toolkit::Key;

const KEY_ESC: u16 = 1;
const KEY_BACKSPACE: u16 = 14;
const KEY_TAB: u16 = 15;
const KEY_ENTER: u16 = 28;
const KEY_LEFTSHIFT: u16 = 42;
const KEY_RIGHTSHIFT: u16 = 54;
const KEY_SPACE: u16 = 57;
const KEY_KPENTER: u16 = 96;
const KEY_HOME: u16 = 102;
const KEY_UP: u16 = 103;
const KEY_LEFT: u16 = 105;
const KEY_RIGHT: u16 = 106;
const KEY_END: u16 = 107;
const KEY_DOWN: u16 = 108;
const KEY_DELETE: u16 = 111;

/// Printable keys by Linux input code: (code, plain, shifted)
const PRINTABLE: &[(u16, char, char)] = &[
    (2, '1', '!'),
    (3, '2', '@'),
    (4, '3', '#'),
    (5, '4', '$'),
    (6, '5', '%'),
    (7, '6', '^'),
    (8, '7', '&'),
    (9, '8', '*'),
    (10, '9', '('),
    (11, '0', ')'),
    (12, '-', '_'),
    (13, '=', '+'),
    (16, 'q', 'Q'),
    (17, 'w', 'W'),
    (18, 'e', 'E'),
    (19, 'r', 'R'),
    (20, 't', 'T'),
    (21, 'y', 'Y'),
    (22, 'u', 'U'),
    (23, 'i', 'I'),
    (24, 'o', 'O'),
    (25, 'p', 'P'),
    (26, '[', '{'),
    (27, ']', '}'),
    (30, 'a', 'A'),
    (31, 's', 'S'),
    (32, 'd', 'D'),
    (33, 'f', 'F'),
    (34, 'g', 'G'),
    (35, 'h', 'H'),
    (36, 'j', 'J'),
    (37, 'k', 'K'),
    (38, 'l', 'L'),
    (39, ';', ':'),
    (40, '\'', '"'),
    (41, '`', '~'),
    (43, '\\', '|'),
    (44, 'z', 'Z'),
    (45, 'x', 'X'),
    (46, 'c', 'C'),
    (47, 'v', 'V'),
    (48, 'b', 'B'),
    (49, 'n', 'N'),
    (50, 'm', 'M'),
    (51, ',', '<'),
    (52, '.', '>'),
    (53, '/', '?'),
];

/// Stateful translator for Linux input key codes
#[derive(Debug, Default)]
pub struct LinuxKeymap {
    shift: bool,
}

impl LinuxKeymap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one key transition; modifiers update state and yield nothing
    pub fn translate(&mut self, code: u16, pressed: bool) -> Option<Key> {
        match code {
            KEY_LEFTSHIFT | KEY_RIGHTSHIFT => {
                self.shift = pressed;
                None
            }
            KEY_ESC => Some(Key::Escape),
            KEY_BACKSPACE => Some(Key::Backspace),
            KEY_TAB if self.shift => Some(Key::Prev),
            KEY_TAB => Some(Key::Next),
            KEY_ENTER | KEY_KPENTER => Some(Key::Enter),
            KEY_SPACE => Some(Key::Char(' ')),
            KEY_HOME => Some(Key::Home),
            KEY_END => Some(Key::End),
            KEY_UP => Some(Key::Up),
            KEY_DOWN => Some(Key::Down),
            KEY_LEFT => Some(Key::Left),
            KEY_RIGHT => Some(Key::Right),
            KEY_DELETE => Some(Key::Delete),
            _ => PRINTABLE
                .iter()
                .find(|(c, _, _)| *c == code)
                .map(|&(_, plain, shifted)| Key::Char(if self.shift { shifted } else { plain })),
        }
    }
}

/// Translate an X11 keysym
pub fn keysym_to_key(keysym: u32) -> Option<Key> {
    match keysym {
        0xff08 => Some(Key::Backspace),
        0xff09 => Some(Key::Next),
        0xfe20 => Some(Key::Prev), // ISO_Left_Tab
        0xff0d | 0xff8d => Some(Key::Enter),
        0xff1b => Some(Key::Escape),
        0xff50 => Some(Key::Home),
        0xff51 => Some(Key::Left),
        0xff52 => Some(Key::Up),
        0xff53 => Some(Key::Right),
        0xff54 => Some(Key::Down),
        0xff57 => Some(Key::End),
        0xffff => Some(Key::Delete),
        // Latin-1 keysyms equal their code points
        0x20..=0x7e | 0xa0..=0xff => char::from_u32(keysym).map(Key::Char),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_navigation_keys() {
        let mut keymap = LinuxKeymap::new();
        assert_eq!(keymap.translate(KEY_UP, true), Some(Key::Up));
        assert_eq!(keymap.translate(KEY_KPENTER, true), Some(Key::Enter));
        assert_eq!(keymap.translate(KEY_TAB, true), Some(Key::Next));
        assert_eq!(keymap.translate(0x2ff, true), None);
    }

    #[test]
    fn test_linux_shift_state() {
        let mut keymap = LinuxKeymap::new();
        assert_eq!(keymap.translate(30, true), Some(Key::Char('a')));
        assert_eq!(keymap.translate(KEY_LEFTSHIFT, true), None);
        assert_eq!(keymap.translate(30, true), Some(Key::Char('A')));
        assert_eq!(keymap.translate(2, true), Some(Key::Char('!')));
        assert_eq!(keymap.translate(KEY_TAB, true), Some(Key::Prev));
        keymap.translate(KEY_LEFTSHIFT, false);
        assert_eq!(keymap.translate(30, false), Some(Key::Char('a')));
    }

    #[test]
    fn test_keysyms() {
        assert_eq!(keysym_to_key(0xff0d), Some(Key::Enter));
        assert_eq!(keysym_to_key(0x41), Some(Key::Char('A')));
        assert_eq!(keysym_to_key(0xffe1), None); // Shift_L
    }
}
