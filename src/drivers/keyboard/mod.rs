pub mod scancodes;

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use lazy_static::lazy_static;
use scancodes::{KeyCode, KeyboardState};
use spin::Mutex;

const BUFFER_SIZE: usize = 64;

/// Single-producer single-consumer queue between the keyboard IRQ and the
/// code that owns the terminals. Keys survive an IRQ that finds the kernel
/// state busy.
pub struct KeyboardBuffer {
    buffer: [UnsafeCell<KeyCode>; BUFFER_SIZE],
    head: AtomicUsize,
    tail: AtomicUsize,
}

// Only the IRQ handler pushes and only the drain pops.
unsafe impl Sync for KeyboardBuffer {}

impl KeyboardBuffer {
    pub const fn new() -> Self {
        Self {
            buffer: [const { UnsafeCell::new(KeyCode::Unknown) }; BUFFER_SIZE],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Returns `false` when the queue is full and the key was dropped.
    pub fn push(&self, key: KeyCode) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let next_head = (head + 1) % BUFFER_SIZE;
        if next_head == self.tail.load(Ordering::Acquire) {
            return false;
        }
        unsafe { *self.buffer[head].get() = key };
        self.head.store(next_head, Ordering::Release);
        true
    }

    pub fn pop(&self) -> Option<KeyCode> {
        let tail = self.tail.load(Ordering::Acquire);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let key = unsafe { *self.buffer[tail].get() };
        self.tail.store((tail + 1) % BUFFER_SIZE, Ordering::Release);
        Some(key)
    }
}

lazy_static! {
    pub static ref KEYBOARD_BUFFER: KeyboardBuffer = KeyboardBuffer::new();
    pub static ref KEYBOARD_STATE: Mutex<KeyboardState> = Mutex::new(KeyboardState::new());
}

/// Flush the controller's output buffer so the first IRQ is not stale.
#[cfg(target_os = "none")]
pub fn init() {
    use x86_64::instructions::port::Port;

    let mut port: Port<u8> = Port::new(0x60);
    let _scancode = unsafe { port.read() };
    crate::log_info!("PS/2 keyboard driver initialized.");
}

/// Decode a raw scancode and queue the resulting key.
pub fn push_scancode(scancode: u8) {
    let keycode = KEYBOARD_STATE.lock().process_scancode(scancode);
    if let KeyCode::Unknown = keycode {
        return;
    }
    if !KEYBOARD_BUFFER.push(keycode) {
        crate::log_warn!("keyboard buffer full, dropping {:?}", keycode);
    }
}

pub fn try_read_key() -> Option<KeyCode> {
    KEYBOARD_BUFFER.pop()
}
