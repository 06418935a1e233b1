use x86_64::instructions::port::Port;
use x86_64::{PhysAddr, VirtAddr};

use super::Machine;
use crate::drivers::rtc;
use crate::interrupts::gdt;
use crate::memory::{PROGRAM_SLOT_SIZE, VGA_TEXT_MEMORY};
use crate::vga::{Buffer, BUFFER_WIDTH};

/// The machine we are running on. Physical memory in the first GiB is identity-mapped.
pub struct X86Machine;

impl Machine for X86Machine {
    fn flush_tlb(&mut self) {
        x86_64::instructions::tlb::flush_all();
    }

    fn set_kernel_stack(&mut self, top: VirtAddr) {
        gdt::set_tss_rsp0(top);
    }

    fn stack_pointer(&self) -> VirtAddr {
        let rsp: u64;
        unsafe {
            core::arch::asm!("mov {}, rsp", out(reg) rsp, options(nomem, nostack, preserves_flags));
        }
        VirtAddr::new(rsp)
    }

    fn interrupts_enabled(&self) -> bool {
        x86_64::instructions::interrupts::are_enabled()
    }

    fn program_window(&mut self, slot: PhysAddr) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(slot.as_u64() as *mut u8, PROGRAM_SLOT_SIZE as usize) }
    }

    fn display(&mut self) -> &mut Buffer {
        unsafe { &mut *(VGA_TEXT_MEMORY as *mut Buffer) }
    }

    fn move_cursor(&mut self, row: usize, col: usize) {
        let position = (row * BUFFER_WIDTH + col) as u16;
        let mut index: Port<u8> = Port::new(0x3D4);
        let mut data: Port<u8> = Port::new(0x3D5);
        unsafe {
            index.write(0x0F);
            data.write((position & 0xFF) as u8);
            index.write(0x0E);
            data.write((position >> 8) as u8);
        }
    }

    fn set_rtc_frequency(&mut self, hz: u32) {
        if let Some(rate) = rtc::rate_for(hz) {
            unsafe { rtc::program_rate(rate) };
        }
    }
}
