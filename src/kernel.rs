//! The kernel's entire mutable state, and the single lock that guards it on hardware.

use crate::drivers::rtc::Rtc;
use crate::drivers::tty::{TerminalId, TerminalTable};
use crate::fs::FileSystem;
use crate::machine::Machine;
use crate::memory::is_user_range;
use crate::memory::paging::AddressSpace;
use crate::process::{ProcessId, ProcessTable};
use crate::scheduler::context::SavedExecutionContext;
use crate::syscalls::{SaveSlot, SyscallError, SyscallResult};

pub struct KernelState<'a> {
    pub address_space: AddressSpace<'a>,
    pub processes: ProcessTable<'a>,
    pub terminals: TerminalTable<'a>,
    pub fs: FileSystem<'a>,
    pub rtc: Rtc,
}

impl<'a> KernelState<'a> {
    pub fn new(
        address_space: AddressSpace<'a>,
        processes: ProcessTable<'a>,
        terminals: TerminalTable<'a>,
        fs: FileSystem<'a>,
    ) -> Self {
        KernelState {
            address_space,
            processes,
            terminals,
            fs,
            rtc: Rtc::new(),
        }
    }

    /// Process whose kernel stack we are running on.
    pub fn current_pid<M: Machine>(&self, machine: &M) -> SyscallResult<ProcessId> {
        self.processes
            .current_pid(machine.stack_pointer())
            .ok_or(SyscallError::InvalidArgument)
    }

    pub fn current_terminal<M: Machine>(&self, machine: &M) -> SyscallResult<TerminalId> {
        let pid = self.current_pid(machine)?;
        self.processes
            .pcb(pid)
            .map(|pcb| pcb.terminal)
            .ok_or(SyscallError::InvalidArgument)
    }

    /// Whether `[addr, addr + len)` is user memory that is mapped right now.
    pub fn user_range(&self, addr: u64, len: u64) -> bool {
        is_user_range(addr, len, self.video_mapped())
    }

    /// The video window has been pointed somewhere since boot.
    pub fn video_mapped(&self) -> bool {
        self.address_space.video_target().is_some()
    }

    /// Storage for a flow that is about to be suspended.
    ///
    /// The pointer stays valid after the kernel lock is released: PCBs and
    /// terminal records live in statics that never move.
    pub fn save_slot(&mut self, slot: SaveSlot) -> Option<*mut SavedExecutionContext> {
        match slot {
            SaveSlot::Parent(pid) => self
                .processes
                .pcb_mut(pid)
                .map(|pcb| &mut pcb.parent_context as *mut SavedExecutionContext),
            SaveSlot::Terminal(id) => Some(&mut self.terminals.get_mut(id).context as *mut SavedExecutionContext),
        }
    }
}

#[cfg(target_os = "none")]
pub use hw::{boot, try_with_kernel, with_kernel};

#[cfg(target_os = "none")]
mod hw {
    use spin::Mutex;
    use x86_64::structures::paging::PageTable;

    use super::KernelState;
    use crate::config::TERMINAL_COUNT;
    use crate::drivers::tty::{TerminalRecord, TerminalTable};
    use crate::fs::FileSystem;
    use crate::machine::x86::X86Machine;
    use crate::memory::paging::AddressSpace;
    use crate::process::{KernelStacks, ProcessTable};
    use crate::syscalls::{SyscallError, SyscallResult};

    static KERNEL: Mutex<Option<KernelState<'static>>> = Mutex::new(None);

    static mut PML4: PageTable = PageTable::new();
    static mut PDPT: PageTable = PageTable::new();
    static mut DIRECTORY: PageTable = PageTable::new();
    static mut VIDEO_TABLE: PageTable = PageTable::new();
    static mut KERNEL_STACKS: KernelStacks = KernelStacks::new();
    static mut TERMINALS: [TerminalRecord; TERMINAL_COUNT] = [const { TerminalRecord::new() }; TERMINAL_COUNT];

    /// Build the kernel state over the boot module holding the filesystem image.
    ///
    /// # Safety
    /// Call once, with interrupts disabled.
    pub unsafe fn boot(fs_image: &'static [u8]) -> Result<(), crate::fs::FsError> {
        let fs = FileSystem::new(fs_image)?;
        let files = fs.dir_count();
        let mut address_space = AddressSpace::new(&mut *(&raw mut DIRECTORY), &mut *(&raw mut VIDEO_TABLE));
        address_space.activate(&mut *(&raw mut PML4), &mut *(&raw mut PDPT));
        let processes = ProcessTable::new(&mut *(&raw mut KERNEL_STACKS));
        let terminals = TerminalTable::new(&mut *(&raw mut TERMINALS));

        *KERNEL.lock() = Some(KernelState::new(address_space, processes, terminals, fs));
        crate::log_info!("Kernel state ready ({} files).", files);
        Ok(())
    }

    /// Run `f` with the kernel state locked. Only for flows that cannot be
    /// interrupted by another holder: syscalls and boot. IRQ handlers use
    /// [`try_with_kernel`].
    pub fn with_kernel<R>(
        f: impl FnOnce(&mut KernelState<'static>, &mut X86Machine) -> SyscallResult<R>,
    ) -> SyscallResult<R> {
        let mut guard = KERNEL.lock();
        let kernel = guard.as_mut().ok_or(SyscallError::InvalidArgument)?;
        f(kernel, &mut X86Machine)
    }

    /// Like [`with_kernel`] but gives up when the state is busy.
    pub fn try_with_kernel<R>(f: impl FnOnce(&mut KernelState<'static>, &mut X86Machine) -> R) -> Option<R> {
        let mut guard = KERNEL.try_lock()?;
        let kernel = guard.as_mut()?;
        Some(f(kernel, &mut X86Machine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn save_slots_point_into_live_records() {
        let mut fx = Fixture::new();
        let shell = fx.start_shell();

        let parent = fx.kernel.save_slot(SaveSlot::Parent(shell)).unwrap();
        unsafe { (*parent).rip = 0x42 };
        assert_eq!(fx.kernel.processes.pcb(shell).unwrap().parent_context.rip, 0x42);

        let terminal = fx.kernel.save_slot(SaveSlot::Terminal(TerminalId(2))).unwrap();
        unsafe { (*terminal).rsp = 0x99 };
        assert_eq!(fx.kernel.terminals.get(TerminalId(2)).context.rsp, 0x99);

        assert!(fx.kernel.save_slot(SaveSlot::Parent(ProcessId(5))).is_none());
    }

    #[test]
    fn video_window_is_user_memory_only_after_vidmap() {
        use crate::memory::{PROGRAM_WINDOW_START, VIDEO_WINDOW_START};

        let mut fx = Fixture::new();
        fx.start_shell();
        assert!(!fx.kernel.video_mapped());
        assert!(!fx.kernel.user_range(VIDEO_WINDOW_START, 16));
        assert!(fx.kernel.user_range(PROGRAM_WINDOW_START, 16));

        fx.kernel.vidmap(&mut fx.machine, PROGRAM_WINDOW_START).unwrap();
        assert!(fx.kernel.video_mapped());
        assert!(fx.kernel.user_range(VIDEO_WINDOW_START, 16));
    }

    #[test]
    fn no_current_process_before_the_first_launch() {
        let mut fx = Fixture::new();
        assert_eq!(fx.kernel.current_pid(&fx.machine), Err(SyscallError::InvalidArgument));
        let shell = fx.start_shell();
        assert_eq!(fx.kernel.current_pid(&fx.machine), Ok(shell));
        assert_eq!(fx.kernel.current_terminal(&fx.machine), Ok(TerminalId(0)));
    }
}
