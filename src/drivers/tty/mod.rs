//! Virtual terminals: screen state, line discipline and the terminal table.
//!
//! Exactly one terminal is displayed and owns the live VGA buffer. The others
//! keep their screen in an off-screen page that the video window can map.

use x86_64::PhysAddr;

use crate::config::{LINE_BUFFER_SIZE, TERMINAL_COUNT};
use crate::drivers::keyboard::scancodes::KeyCode;
use crate::machine::Machine;
use crate::process::ProcessId;
use crate::scheduler::context::SavedExecutionContext;
use crate::vga::{copy_surface, ScreenChar, ScreenPage, TextSurface, BUFFER_HEIGHT, BUFFER_WIDTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalId(pub usize);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub row: usize,
    pub col: usize,
}

impl Cursor {
    fn newline(&mut self, surface: &mut dyn TextSurface) {
        self.col = 0;
        if self.row + 1 < BUFFER_HEIGHT {
            self.row += 1;
        } else {
            surface.scroll_up();
        }
    }

    fn put_byte(&mut self, surface: &mut dyn TextSurface, byte: u8) {
        match byte {
            b'\n' | b'\r' => self.newline(surface),
            byte => {
                surface.write(self.row, self.col, ScreenChar::new(byte));
                self.col += 1;
                if self.col == BUFFER_WIDTH {
                    self.newline(surface);
                }
            }
        }
    }

    fn erase(&mut self, surface: &mut dyn TextSurface) {
        if self.col > 0 {
            self.col -= 1;
        } else if self.row > 0 {
            self.row -= 1;
            self.col = BUFFER_WIDTH - 1;
        } else {
            return;
        }
        surface.write(self.row, self.col, ScreenChar::BLANK);
    }
}

pub struct TerminalRecord {
    pub id: TerminalId,
    pub cursor: Cursor,
    line: [u8; LINE_BUFFER_SIZE],
    line_len: usize,
    line_ready: bool,
    /// Kernel flow suspended when this terminal was last scheduled away.
    pub context: SavedExecutionContext,
    /// Process that runs when this terminal is scheduled.
    pub owner: Option<ProcessId>,
    pub process_count: usize,
    pub active: bool,
    page: ScreenPage,
}

impl TerminalRecord {
    pub const fn new() -> Self {
        TerminalRecord {
            id: TerminalId(0),
            cursor: Cursor { row: 0, col: 0 },
            line: [0; LINE_BUFFER_SIZE],
            line_len: 0,
            line_ready: false,
            context: SavedExecutionContext::empty(),
            owner: None,
            process_count: 0,
            active: false,
            page: ScreenPage::new(),
        }
    }

    pub fn pending_line(&self) -> &[u8] {
        &self.line[..self.line_len]
    }

    pub fn line_ready(&self) -> bool {
        self.line_ready
    }

    /// Physical address of the off-screen page, for the video window.
    pub fn page_address(&self) -> PhysAddr {
        PhysAddr::new(&self.page as *const ScreenPage as u64)
    }

    pub fn page(&self) -> &ScreenPage {
        &self.page
    }

    /// Copy the committed line into `buf` and clear it. `None` until Enter was pressed.
    pub fn take_line(&mut self, buf: &mut [u8]) -> Option<usize> {
        if !self.line_ready {
            return None;
        }
        let count = self.line_len.min(buf.len());
        buf[..count].copy_from_slice(&self.line[..count]);
        self.line_len = 0;
        self.line_ready = false;
        Some(count)
    }

    /// Apply one key to the line buffer, echoing onto `surface`.
    fn edit_line(&mut self, surface: &mut dyn TextSurface, key: KeyCode) {
        if self.line_ready {
            return;
        }
        match key {
            KeyCode::Char(c) if c.is_ascii() => {
                // The last byte is reserved for the newline.
                if self.line_len < LINE_BUFFER_SIZE - 1 {
                    self.line[self.line_len] = c as u8;
                    self.line_len += 1;
                    self.cursor.put_byte(surface, c as u8);
                }
            }
            KeyCode::Enter => {
                self.line[self.line_len] = b'\n';
                self.line_len += 1;
                self.line_ready = true;
                self.cursor.put_byte(surface, b'\n');
            }
            KeyCode::Backspace => {
                if self.line_len > 0 {
                    self.line_len -= 1;
                    self.cursor.erase(surface);
                }
            }
            KeyCode::Ctrl('l') => {
                surface.clear();
                self.cursor = Cursor::default();
                for i in 0..self.line_len {
                    self.cursor.put_byte(surface, self.line[i]);
                }
            }
            _ => {}
        }
    }
}

/// Result of feeding a key to the displayed terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Handled,
    SwitchTo(TerminalId),
}

pub struct TerminalTable<'a> {
    records: &'a mut [TerminalRecord; TERMINAL_COUNT],
    scheduled: TerminalId,
    displayed: TerminalId,
}

impl<'a> TerminalTable<'a> {
    pub fn new(records: &'a mut [TerminalRecord; TERMINAL_COUNT]) -> Self {
        for (i, record) in records.iter_mut().enumerate() {
            *record = TerminalRecord::new();
            record.id = TerminalId(i);
        }
        TerminalTable {
            records,
            scheduled: TerminalId(0),
            displayed: TerminalId(0),
        }
    }

    pub fn get(&self, id: TerminalId) -> &TerminalRecord {
        &self.records[id.0]
    }

    pub fn get_mut(&mut self, id: TerminalId) -> &mut TerminalRecord {
        &mut self.records[id.0]
    }

    /// Terminal whose process currently owns the CPU.
    pub fn scheduled(&self) -> TerminalId {
        self.scheduled
    }

    pub fn set_scheduled(&mut self, id: TerminalId) {
        self.scheduled = id;
    }

    /// Terminal shown on the screen.
    pub fn displayed(&self) -> TerminalId {
        self.displayed
    }

    /// First active terminal after `from` in round-robin order. May return `from` itself.
    pub fn next_active(&self, from: TerminalId) -> Option<TerminalId> {
        (1..=TERMINAL_COUNT)
            .map(|step| TerminalId((from.0 + step) % TERMINAL_COUNT))
            .find(|id| self.records[id.0].active)
    }

    /// Page the video window should show for `id`, `None` meaning live VGA memory.
    pub fn video_page(&self, id: TerminalId) -> Option<PhysAddr> {
        if id == self.displayed {
            None
        } else {
            Some(self.records[id.0].page_address())
        }
    }

    /// Print `bytes` on terminal `id` up to the first NUL. Returns the number printed.
    pub fn write<M: Machine>(&mut self, machine: &mut M, id: TerminalId, bytes: &[u8]) -> usize {
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let record = &mut self.records[id.0];
        if id == self.displayed {
            for &byte in &bytes[..len] {
                record.cursor.put_byte(machine.display(), byte);
            }
            machine.move_cursor(record.cursor.row, record.cursor.col);
        } else {
            for &byte in &bytes[..len] {
                record.cursor.put_byte(&mut record.page, byte);
            }
        }
        len
    }

    /// Route a key from the keyboard to the displayed terminal.
    pub fn receive_key<M: Machine>(&mut self, machine: &mut M, key: KeyCode) -> KeyAction {
        if let KeyCode::AltF(n) = key {
            let index = n as usize;
            if (1..=TERMINAL_COUNT).contains(&index) {
                return KeyAction::SwitchTo(TerminalId(index - 1));
            }
            return KeyAction::Handled;
        }
        let record = &mut self.records[self.displayed.0];
        record.edit_line(machine.display(), key);
        machine.move_cursor(record.cursor.row, record.cursor.col);
        KeyAction::Handled
    }

    /// Copy the live screen into the page of `id`.
    pub fn save<M: Machine>(&mut self, machine: &mut M, id: TerminalId) {
        copy_surface(&*machine.display(), &mut self.records[id.0].page);
    }

    /// Copy the page of `id` onto the live screen and restore its cursor.
    pub fn load<M: Machine>(&mut self, machine: &mut M, id: TerminalId) {
        let record = &self.records[id.0];
        copy_surface(&record.page, machine.display());
        machine.move_cursor(record.cursor.row, record.cursor.col);
    }

    /// Show `to` on the screen. The caller remaps the video window.
    pub fn switch_display<M: Machine>(&mut self, machine: &mut M, to: TerminalId) {
        if to == self.displayed {
            return;
        }
        self.save(machine, self.displayed);
        self.load(machine, to);
        self.displayed = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{terminal_records, MockMachine};

    fn line_of(table: &TerminalTable, id: TerminalId) -> Vec<u8> {
        table.get(id).pending_line().to_vec()
    }

    fn row_text(surface: &dyn TextSurface, row: usize, len: usize) -> Vec<u8> {
        (0..len).map(|col| surface.read(row, col).ascii_character).collect()
    }

    #[test]
    fn typed_line_is_echoed_and_committed() {
        let mut machine = MockMachine::new();
        let mut table = TerminalTable::new(terminal_records());
        for key in [KeyCode::Char('l'), KeyCode::Char('x'), KeyCode::Backspace, KeyCode::Char('s'), KeyCode::Enter] {
            table.receive_key(&mut machine, key);
        }
        assert!(table.get(TerminalId(0)).line_ready());
        assert_eq!(line_of(&table, TerminalId(0)), b"ls\n");
        assert_eq!(row_text(machine.screen(), 0, 3), b"ls ");
        assert_eq!(machine.cursor, (1, 0));

        // Keys after a committed line are dropped until it is read.
        table.receive_key(&mut machine, KeyCode::Char('z'));
        let mut buf = [0u8; 2];
        assert_eq!(table.get_mut(TerminalId(0)).take_line(&mut buf), Some(2));
        assert_eq!(&buf, b"ls");
        assert_eq!(table.get_mut(TerminalId(0)).take_line(&mut buf), None);
    }

    #[test]
    fn line_buffer_keeps_room_for_the_newline() {
        let mut machine = MockMachine::new();
        let mut table = TerminalTable::new(terminal_records());
        for _ in 0..LINE_BUFFER_SIZE + 10 {
            table.receive_key(&mut machine, KeyCode::Char('a'));
        }
        table.receive_key(&mut machine, KeyCode::Enter);
        let line = line_of(&table, TerminalId(0));
        assert_eq!(line.len(), LINE_BUFFER_SIZE);
        assert_eq!(line.last(), Some(&b'\n'));
    }

    #[test]
    fn ctrl_l_clears_the_screen_but_keeps_the_line() {
        let mut machine = MockMachine::new();
        let mut table = TerminalTable::new(terminal_records());
        table.write(&mut machine, TerminalId(0), b"old output\n");
        table.receive_key(&mut machine, KeyCode::Char('c'));
        table.receive_key(&mut machine, KeyCode::Ctrl('l'));
        assert_eq!(row_text(machine.screen(), 0, 2), b"c ");
        assert_eq!(table.get(TerminalId(0)).cursor, Cursor { row: 0, col: 1 });
        assert_eq!(line_of(&table, TerminalId(0)), b"c");
    }

    #[test]
    fn writes_to_hidden_terminals_land_in_their_page() {
        let mut machine = MockMachine::new();
        let mut table = TerminalTable::new(terminal_records());
        assert_eq!(table.write(&mut machine, TerminalId(1), b"bg\0ignored"), 2);
        assert_eq!(row_text(table.get(TerminalId(1)).page(), 0, 2), b"bg");
        assert_eq!(row_text(machine.screen(), 0, 2), b"  ");
        assert_eq!(table.video_page(TerminalId(1)), Some(table.get(TerminalId(1)).page_address()));
        assert_eq!(table.video_page(TerminalId(0)), None);
    }

    #[test]
    fn output_wraps_and_scrolls() {
        let mut machine = MockMachine::new();
        let mut table = TerminalTable::new(terminal_records());
        for row in 0..BUFFER_HEIGHT {
            table.write(&mut machine, TerminalId(0), &[b'a' + row as u8, b'\n']);
        }
        assert_eq!(machine.display().read(0, 0).ascii_character, b'b');
        assert_eq!(table.get(TerminalId(0)).cursor, Cursor { row: BUFFER_HEIGHT - 1, col: 0 });

        let long = [b'x'; BUFFER_WIDTH + 1];
        table.write(&mut machine, TerminalId(0), &long);
        assert_eq!(table.get(TerminalId(0)).cursor, Cursor { row: BUFFER_HEIGHT - 1, col: 1 });
    }

    #[test]
    fn save_then_load_restores_the_terminal() {
        let mut machine = MockMachine::new();
        let mut table = TerminalTable::new(terminal_records());
        let id = TerminalId(0);
        table.write(&mut machine, id, b"$ cat frame0.txt\nfish");
        table.receive_key(&mut machine, KeyCode::Char('q'));
        let cursor = table.get(id).cursor;
        let line = line_of(&table, id);
        let screen: Vec<Vec<u8>> = (0..BUFFER_HEIGHT).map(|r| row_text(machine.screen(), r, BUFFER_WIDTH)).collect();

        table.save(&mut machine, id);
        machine.display().clear();
        table.load(&mut machine, id);

        assert_eq!(table.get(id).cursor, cursor);
        assert_eq!(line_of(&table, id), line);
        assert_eq!(machine.cursor, (cursor.row, cursor.col));
        for (r, expected) in screen.iter().enumerate() {
            assert_eq!(&row_text(machine.screen(), r, BUFFER_WIDTH), expected);
        }
    }

    #[test]
    fn switching_display_swaps_screens() {
        let mut machine = MockMachine::new();
        let mut table = TerminalTable::new(terminal_records());
        table.write(&mut machine, TerminalId(0), b"zero");
        table.write(&mut machine, TerminalId(2), b"two");

        assert_eq!(table.receive_key(&mut machine, KeyCode::AltF(3)), KeyAction::SwitchTo(TerminalId(2)));
        table.switch_display(&mut machine, TerminalId(2));
        assert_eq!(table.displayed(), TerminalId(2));
        assert_eq!(row_text(machine.screen(), 0, 4), b"two ");

        table.switch_display(&mut machine, TerminalId(0));
        assert_eq!(row_text(machine.screen(), 0, 4), b"zero");
        assert_eq!(row_text(table.get(TerminalId(2)).page(), 0, 3), b"two");
    }

    #[test]
    fn inactive_terminals_are_skipped() {
        let mut table = TerminalTable::new(terminal_records());
        assert_eq!(table.next_active(TerminalId(0)), None);
        table.get_mut(TerminalId(0)).active = true;
        assert_eq!(table.next_active(TerminalId(0)), Some(TerminalId(0)));
        table.get_mut(TerminalId(2)).active = true;
        assert_eq!(table.next_active(TerminalId(0)), Some(TerminalId(2)));
        assert_eq!(table.next_active(TerminalId(2)), Some(TerminalId(0)));
    }
}
