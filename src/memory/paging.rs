use x86_64::{
    structures::paging::{PageTable, PageTableFlags},
    PhysAddr,
};

use super::{HUGE_PAGE_SIZE, PROGRAM_WINDOW_START, VGA_TEXT_MEMORY, VIDEO_WINDOW_START};
use crate::machine::Machine;

/// Directory indices of the two huge pages forming the program window.
const PROGRAM_ENTRY: usize = (PROGRAM_WINDOW_START / HUGE_PAGE_SIZE) as usize;
const PROGRAM_ENTRIES: core::ops::Range<usize> = PROGRAM_ENTRY..PROGRAM_ENTRY + 2;

/// Directory index whose page table holds the video window.
const VIDEO_ENTRY: usize = (VIDEO_WINDOW_START / HUGE_PAGE_SIZE) as usize;
const VIDEO_TABLE_INDEX: usize = ((VIDEO_WINDOW_START % HUGE_PAGE_SIZE) / 4096) as usize;

/// Owns the page directory covering the first GiB and multiplexes the
/// program and video windows inside it.
pub struct AddressSpace<'a> {
    directory: &'a mut PageTable,
    video_table: &'a mut PageTable,
}

impl<'a> AddressSpace<'a> {
    /// Identity-map the first GiB for the kernel and leave both windows unmapped.
    pub fn new(directory: &'a mut PageTable, video_table: &'a mut PageTable) -> Self {
        let kernel = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::HUGE_PAGE;
        for (index, entry) in directory.iter_mut().enumerate() {
            if PROGRAM_ENTRIES.contains(&index) || index == VIDEO_ENTRY {
                entry.set_unused();
            } else {
                entry.set_addr(PhysAddr::new(index as u64 * HUGE_PAGE_SIZE), kernel);
            }
        }
        video_table.zero();
        AddressSpace {
            directory,
            video_table,
        }
    }

    /// Map the program window onto the 4 MiB physical `slot`.
    pub fn map_program<M: Machine>(&mut self, machine: &mut M, slot: PhysAddr) {
        debug_assert!(!machine.interrupts_enabled());
        debug_assert!(slot.is_aligned(HUGE_PAGE_SIZE));

        let flags = PageTableFlags::PRESENT
            | PageTableFlags::WRITABLE
            | PageTableFlags::USER_ACCESSIBLE
            | PageTableFlags::HUGE_PAGE;
        for (half, index) in PROGRAM_ENTRIES.enumerate() {
            self.directory[index].set_addr(slot + half as u64 * HUGE_PAGE_SIZE, flags);
        }
        machine.flush_tlb();
    }

    /// Point the video window at a terminal's off-screen page, or at live
    /// VGA memory when `page` is `None`.
    pub fn map_terminal_video<M: Machine>(&mut self, machine: &mut M, page: Option<PhysAddr>) {
        debug_assert!(!machine.interrupts_enabled());

        let user = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
        let target = page.unwrap_or(PhysAddr::new(VGA_TEXT_MEMORY));
        self.video_table[VIDEO_TABLE_INDEX].set_addr(target, user);

        let table = PhysAddr::new(&*self.video_table as *const PageTable as u64);
        self.directory[VIDEO_ENTRY].set_addr(table, user);
        machine.flush_tlb();
    }

    /// Physical slot currently visible through the program window.
    pub fn program_slot(&self) -> Option<PhysAddr> {
        let entry = &self.directory[PROGRAM_ENTRY];
        if entry.flags().contains(PageTableFlags::PRESENT) {
            Some(entry.addr())
        } else {
            None
        }
    }

    /// Physical page currently visible through the video window.
    pub fn video_target(&self) -> Option<PhysAddr> {
        let entry = &self.video_table[VIDEO_TABLE_INDEX];
        if entry.flags().contains(PageTableFlags::PRESENT) {
            Some(entry.addr())
        } else {
            None
        }
    }

    /// Hook the directory below `pml4` and load it into CR3.
    ///
    /// # Safety
    /// The tables must be identity-mapped statics and the kernel must live
    /// inside the first GiB.
    #[cfg(target_os = "none")]
    pub unsafe fn activate(&mut self, pml4: &mut PageTable, pdpt: &mut PageTable) {
        use x86_64::registers::control::{Cr3, Cr3Flags};
        use x86_64::structures::paging::PhysFrame;

        let table = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
        pml4.zero();
        pdpt.zero();
        pdpt[0].set_addr(PhysAddr::new(&*self.directory as *const PageTable as u64), table);
        pml4[0].set_addr(PhysAddr::new(pdpt as *const PageTable as u64), table);

        let frame = PhysFrame::containing_address(PhysAddr::new(pml4 as *const PageTable as u64));
        Cr3::write(frame, Cr3Flags::empty());
    }
}
