//! 8253/8254 programmable interval timer, channel 0, drives the scheduler tick.

const PIT_BASE_HZ: u32 = 1_193_182;

/// Reload value for channel 0 to fire `hz` times a second.
pub fn divisor_for(hz: u32) -> u16 {
    (PIT_BASE_HZ / hz.max(1)).min(u16::MAX as u32) as u16
}

/// # Safety
/// Interrupts must be disabled.
#[cfg(target_os = "none")]
pub unsafe fn init(hz: u32) {
    use x86_64::instructions::port::Port;

    let mut command: Port<u8> = Port::new(0x43);
    let mut channel0: Port<u8> = Port::new(0x40);
    let divisor = divisor_for(hz);
    // Channel 0, lobyte/hibyte, mode 3 (square wave).
    command.write(0x36);
    channel0.write((divisor & 0xFF) as u8);
    channel0.write((divisor >> 8) as u8);
    crate::log_info!("PIT programmed at {} Hz (divisor {}).", hz, divisor);
}
