//! VGA text-mode cells, the live display buffer and off-screen terminal pages.

use volatile::Volatile;

pub const BUFFER_HEIGHT: usize = 25;
pub const BUFFER_WIDTH: usize = 80;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl ColorCode {
    pub const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode((background as u8) << 4 | (foreground as u8))
    }
}

/// Attribute used for all terminal text.
pub const TEXT_COLOR: ColorCode = ColorCode::new(Color::LightGreen, Color::Black);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ScreenChar {
    pub ascii_character: u8,
    pub color_code: ColorCode,
}

impl ScreenChar {
    pub const BLANK: ScreenChar = ScreenChar {
        ascii_character: b' ',
        color_code: TEXT_COLOR,
    };

    pub const fn new(ascii_character: u8) -> ScreenChar {
        ScreenChar {
            ascii_character,
            color_code: TEXT_COLOR,
        }
    }
}

/// Anything that stores an 80x25 grid of text cells.
pub trait TextSurface {
    fn read(&self, row: usize, col: usize) -> ScreenChar;
    fn write(&mut self, row: usize, col: usize, ch: ScreenChar);

    fn clear(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            self.clear_row(row);
        }
    }

    fn clear_row(&mut self, row: usize) {
        for col in 0..BUFFER_WIDTH {
            self.write(row, col, ScreenChar::BLANK);
        }
    }

    /// Shift every row up by one and blank the last row.
    fn scroll_up(&mut self) {
        for row in 1..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                let ch = self.read(row, col);
                self.write(row - 1, col, ch);
            }
        }
        self.clear_row(BUFFER_HEIGHT - 1);
    }
}

/// Copy every cell of `from` into `to`.
pub fn copy_surface(from: &dyn TextSurface, to: &mut dyn TextSurface) {
    for row in 0..BUFFER_HEIGHT {
        for col in 0..BUFFER_WIDTH {
            to.write(row, col, from.read(row, col));
        }
    }
}

/// Layout of the memory-mapped VGA text buffer at 0xB8000.
#[repr(transparent)]
pub struct Buffer {
    chars: [[Volatile<ScreenChar>; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

impl Buffer {
    /// A blank buffer in ordinary memory, used where no display hardware exists.
    pub fn blank() -> Buffer {
        Buffer {
            chars: core::array::from_fn(|_| core::array::from_fn(|_| Volatile::new(ScreenChar::BLANK))),
        }
    }
}

impl TextSurface for Buffer {
    fn read(&self, row: usize, col: usize) -> ScreenChar {
        self.chars[row][col].read()
    }

    fn write(&mut self, row: usize, col: usize, ch: ScreenChar) {
        self.chars[row][col].write(ch);
    }
}

/// Off-screen copy of a terminal's display.
///
/// Page aligned so that the video window can map it in place of VGA memory.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct ScreenPage {
    chars: [[ScreenChar; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

impl ScreenPage {
    pub const fn new() -> ScreenPage {
        ScreenPage {
            chars: [[ScreenChar::BLANK; BUFFER_WIDTH]; BUFFER_HEIGHT],
        }
    }
}

impl TextSurface for ScreenPage {
    fn read(&self, row: usize, col: usize) -> ScreenChar {
        self.chars[row][col]
    }

    fn write(&mut self, row: usize, col: usize, ch: ScreenChar) {
        self.chars[row][col] = ch;
    }
}
