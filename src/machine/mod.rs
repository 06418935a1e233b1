//! CPU and device side effects the kernel core depends on.

#[cfg(target_os = "none")]
pub mod x86;

use x86_64::{PhysAddr, VirtAddr};

use crate::vga::Buffer;

pub trait Machine {
    /// Invalidate cached translations after a page-table edit.
    fn flush_tlb(&mut self);

    /// Stack the CPU switches to when ring 3 enters the kernel (TSS `rsp0`).
    fn set_kernel_stack(&mut self, top: VirtAddr);

    fn stack_pointer(&self) -> VirtAddr;

    fn interrupts_enabled(&self) -> bool;

    /// Kernel view of the 4 MiB physical program slot starting at `slot`.
    fn program_window(&mut self, slot: PhysAddr) -> &mut [u8];

    /// The live VGA text buffer.
    fn display(&mut self) -> &mut Buffer;

    fn move_cursor(&mut self, row: usize, col: usize);

    fn set_rtc_frequency(&mut self, hz: u32);
}
