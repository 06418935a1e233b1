#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Char(char),
    Enter,
    Backspace,
    /// Ctrl held with a letter key. Carries the lowercase letter.
    Ctrl(char),
    /// Alt+F1..Alt+F3 selects a terminal. Carries the function key number.
    AltF(u8),
    Unknown,
}

const RELEASE: u8 = 0x80;
const EXTENDED: u8 = 0xE0;

const LSHIFT: u8 = 0x2A;
const RSHIFT: u8 = 0x36;
const CTRL: u8 = 0x1D;
const ALT: u8 = 0x38;
const CAPS_LOCK: u8 = 0x3A;
const ENTER: u8 = 0x1C;
const BACKSPACE: u8 = 0x0E;
const F1: u8 = 0x3B;
const F10: u8 = 0x44;

/// Set 1 make codes 0x00..0x3A: unshifted and shifted characters, NUL where the key has none.
const PLAIN: &[u8; 0x3A] = b"\0\x001234567890-=\0\0qwertyuiop[]\0\0asdfghjkl;'`\0\\zxcvbnm,./\0*\0 ";
const SHIFTED: &[u8; 0x3A] = b"\0\0!@#$%^&*()_+\0\0QWERTYUIOP{}\0\0ASDFGHJKL:\"~\0|ZXCVBNM<>?\0*\0 ";

pub struct KeyboardState {
    shift_pressed: bool,
    ctrl_pressed: bool,
    alt_pressed: bool,
    caps_lock: bool,
    extended_scancode: bool,
}

impl KeyboardState {
    pub const fn new() -> Self {
        Self {
            shift_pressed: false,
            ctrl_pressed: false,
            alt_pressed: false,
            caps_lock: false,
            extended_scancode: false,
        }
    }

    pub fn process_scancode(&mut self, scancode: u8) -> KeyCode {
        if scancode == EXTENDED {
            self.extended_scancode = true;
            return KeyCode::Unknown;
        }
        let is_extended = core::mem::replace(&mut self.extended_scancode, false);

        let pressed = scancode & RELEASE == 0;
        let code = scancode & !RELEASE;
        match code {
            LSHIFT | RSHIFT if !is_extended => {
                self.shift_pressed = pressed;
                return KeyCode::Unknown;
            }
            CTRL => {
                self.ctrl_pressed = pressed;
                return KeyCode::Unknown;
            }
            ALT => {
                self.alt_pressed = pressed;
                return KeyCode::Unknown;
            }
            _ => {}
        }
        // Extended keys (arrows, keypad) and releases produce nothing.
        if is_extended || !pressed {
            return KeyCode::Unknown;
        }

        match code {
            CAPS_LOCK => {
                self.caps_lock = !self.caps_lock;
                KeyCode::Unknown
            }
            ENTER => KeyCode::Enter,
            BACKSPACE => KeyCode::Backspace,
            F1..=F10 if self.alt_pressed => KeyCode::AltF(code - F1 + 1),
            _ => self.translate(code),
        }
    }

    fn translate(&self, code: u8) -> KeyCode {
        let Some(&lower) = PLAIN.get(code as usize) else {
            return KeyCode::Unknown;
        };
        if lower == 0 {
            return KeyCode::Unknown;
        }

        let is_letter = lower.is_ascii_lowercase();
        if is_letter && self.ctrl_pressed {
            return KeyCode::Ctrl(lower as char);
        }
        let shift_active = if is_letter && self.caps_lock {
            !self.shift_pressed
        } else {
            self.shift_pressed
        };
        if shift_active {
            KeyCode::Char(SHIFTED[code as usize] as char)
        } else {
            KeyCode::Char(lower as char)
        }
    }
}
