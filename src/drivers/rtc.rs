//! CMOS real-time clock used as a periodic interrupt source (IRQ 8).

use crate::config::{RTC_DEFAULT_HZ, RTC_MAX_HZ};
use crate::machine::Machine;
use crate::syscalls::{SyscallError, SyscallResult};

/// Rate divisor for register A, or `None` if `hz` is not a power of two in 2..=1024.
pub fn rate_for(hz: u32) -> Option<u8> {
    if !hz.is_power_of_two() || !(2..=RTC_MAX_HZ).contains(&hz) {
        return None;
    }
    Some((16 - hz.trailing_zeros()) as u8)
}

pub struct Rtc {
    frequency: u32,
    ticks: u32,
}

impl Rtc {
    pub const fn new() -> Self {
        Rtc {
            frequency: RTC_DEFAULT_HZ,
            ticks: 0,
        }
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Called from the RTC interrupt.
    pub fn tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
    }

    /// Opening the device resets it to the default rate.
    pub fn open<M: Machine>(&mut self, machine: &mut M) {
        self.frequency = RTC_DEFAULT_HZ;
        machine.set_rtc_frequency(RTC_DEFAULT_HZ);
    }

    /// Copy the tick counter (little endian) into `buf`. Never blocks.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let bytes = self.ticks.to_le_bytes();
        let count = bytes.len().min(buf.len());
        buf[..count].copy_from_slice(&bytes[..count]);
        count
    }

    /// Set the rate from a 4-byte little-endian frequency in Hz.
    pub fn write<M: Machine>(&mut self, machine: &mut M, buf: &[u8]) -> SyscallResult<usize> {
        let raw: [u8; 4] = buf.try_into().map_err(|_| SyscallError::InvalidArgument)?;
        let hz = u32::from_le_bytes(raw);
        rate_for(hz).ok_or(SyscallError::InvalidArgument)?;
        self.frequency = hz;
        machine.set_rtc_frequency(hz);
        Ok(raw.len())
    }
}

#[cfg(target_os = "none")]
mod hw {
    use x86_64::instructions::port::Port;

    const RTC_INDEX: u16 = 0x70;
    const RTC_DATA: u16 = 0x71;
    /// Register selectors with NMI disabled.
    const REG_A: u8 = 0x8A;
    const REG_B: u8 = 0x8B;
    const REG_C: u8 = 0x0C;
    const PERIODIC_INTERRUPT: u8 = 0x40;

    unsafe fn modify(register: u8, f: impl FnOnce(u8) -> u8) {
        let mut index: Port<u8> = Port::new(RTC_INDEX);
        let mut data: Port<u8> = Port::new(RTC_DATA);
        index.write(register);
        let prev = data.read();
        index.write(register);
        data.write(f(prev));
    }

    /// # Safety
    /// Interrupts must be disabled.
    pub unsafe fn program_rate(rate: u8) {
        modify(REG_A, |prev| (prev & 0xF0) | (rate & 0x0F));
    }

    /// # Safety
    /// Interrupts must be disabled.
    pub unsafe fn enable_periodic() {
        modify(REG_B, |prev| prev | PERIODIC_INTERRUPT);
    }

    /// Register C must be read after every interrupt or the RTC stops raising them.
    pub unsafe fn acknowledge() {
        let mut index: Port<u8> = Port::new(RTC_INDEX);
        let mut data: Port<u8> = Port::new(RTC_DATA);
        index.write(REG_C);
        let _ = data.read();
    }
}

#[cfg(target_os = "none")]
pub use hw::{acknowledge, enable_periodic, program_rate};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockMachine;

    #[test]
    fn only_powers_of_two_in_range_are_valid() {
        assert_eq!(rate_for(2), Some(15));
        assert_eq!(rate_for(1024), Some(6));
        assert_eq!(rate_for(1), None);
        assert_eq!(rate_for(3), None);
        assert_eq!(rate_for(2048), None);
    }

    #[test]
    fn write_changes_frequency_and_open_resets_it() {
        let mut machine = MockMachine::new();
        let mut rtc = Rtc::new();
        assert_eq!(rtc.write(&mut machine, &64u32.to_le_bytes()), Ok(4));
        assert_eq!(rtc.frequency(), 64);
        assert_eq!(machine.rtc_hz, Some(64));

        assert_eq!(rtc.write(&mut machine, &100u32.to_le_bytes()), Err(SyscallError::InvalidArgument));
        assert_eq!(rtc.write(&mut machine, &[2, 0]), Err(SyscallError::InvalidArgument));
        assert_eq!(rtc.frequency(), 64);

        rtc.open(&mut machine);
        assert_eq!(rtc.frequency(), RTC_DEFAULT_HZ);
        assert_eq!(machine.rtc_hz, Some(RTC_DEFAULT_HZ));
    }

    #[test]
    fn read_reports_the_tick_count() {
        let mut rtc = Rtc::new();
        rtc.tick();
        rtc.tick();
        let mut buf = [0xFFu8; 6];
        assert_eq!(rtc.read(&mut buf), 4);
        assert_eq!(buf, [2, 0, 0, 0, 0xFF, 0xFF]);
    }
}
