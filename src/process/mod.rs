//! Process table: a fixed arena of kernel-stack slots, one per pid.
//!
//! Slot `p` spans `[base - (p + 1) * SLOT_SIZE, base - p * SLOT_SIZE)` where
//! `base` is the end of the arena. The PCB sits at the low end of the slot and
//! the kernel stack grows down from the high end, so the running pid can be
//! recovered from the stack pointer alone.

pub mod pcb;

use core::marker::PhantomData;

use bit_field::BitField;
use x86_64::VirtAddr;

use crate::config::MAX_PROCESSES;
use crate::drivers::tty::TerminalId;
pub use pcb::Pcb;

pub const SLOT_SIZE: usize = 8 * 1024;

const _: () = assert!(MAX_PROCESSES <= 8);
const _: () = assert!(core::mem::size_of::<Pcb>() < SLOT_SIZE / 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProcessId(pub usize);

/// Backing storage for every process's PCB and kernel stack.
#[repr(C, align(8192))]
pub struct KernelStacks([u8; MAX_PROCESSES * SLOT_SIZE]);

impl KernelStacks {
    pub const fn new() -> Self {
        KernelStacks([0; MAX_PROCESSES * SLOT_SIZE])
    }
}

pub struct ProcessTable<'a> {
    base: VirtAddr,
    live: u8,
    _stacks: PhantomData<&'a mut KernelStacks>,
}

impl<'a> ProcessTable<'a> {
    pub fn new(stacks: &'a mut KernelStacks) -> Self {
        let start = VirtAddr::from_ptr(stacks as *mut KernelStacks);
        ProcessTable {
            base: start + core::mem::size_of::<KernelStacks>() as u64,
            live: 0,
            _stacks: PhantomData,
        }
    }

    /// Start of the slot owned by `pid`. The only place slot addresses are computed.
    pub fn slot_for(&self, pid: ProcessId) -> VirtAddr {
        debug_assert!(pid.0 < MAX_PROCESSES);
        self.base - ((pid.0 + 1) * SLOT_SIZE) as u64
    }

    pub fn kernel_stack_top(&self, pid: ProcessId) -> VirtAddr {
        self.slot_for(pid) + SLOT_SIZE as u64
    }

    pub fn is_live(&self, pid: ProcessId) -> bool {
        pid.0 < MAX_PROCESSES && self.live.get_bit(pid.0)
    }

    pub fn live_count(&self) -> usize {
        self.live.count_ones() as usize
    }

    /// Claim the lowest free pid and write a fresh PCB into its slot.
    /// A `None` parent makes the new process its own parent.
    pub fn allocate(
        &mut self,
        terminal: TerminalId,
        parent: Option<ProcessId>,
        args: &[u8],
    ) -> Option<ProcessId> {
        let pid = ProcessId((0..MAX_PROCESSES).find(|&i| !self.live.get_bit(i))?);
        let pcb = Pcb::new(pid, parent.unwrap_or(pid), terminal, args);
        unsafe { core::ptr::write(self.slot_for(pid).as_mut_ptr::<Pcb>(), pcb) };
        self.live.set_bit(pid.0, true);
        Some(pid)
    }

    /// Free `pid`. Its slot is garbage from now on.
    pub fn release(&mut self, pid: ProcessId) {
        if pid.0 < MAX_PROCESSES {
            self.live.set_bit(pid.0, false);
        }
    }

    pub fn pcb(&self, pid: ProcessId) -> Option<&Pcb> {
        if !self.is_live(pid) {
            return None;
        }
        Some(unsafe { &*self.slot_for(pid).as_ptr::<Pcb>() })
    }

    pub fn pcb_mut(&mut self, pid: ProcessId) -> Option<&mut Pcb> {
        if !self.is_live(pid) {
            return None;
        }
        Some(unsafe { &mut *self.slot_for(pid).as_mut_ptr::<Pcb>() })
    }

    /// The live process whose kernel stack contains `stack_pointer`.
    pub fn current_pid(&self, stack_pointer: VirtAddr) -> Option<ProcessId> {
        let arena_start = self.base - (MAX_PROCESSES * SLOT_SIZE) as u64;
        if stack_pointer < arena_start || stack_pointer >= self.base {
            return None;
        }
        let slot = stack_pointer.align_down(SLOT_SIZE as u64);
        let pid = ProcessId(((self.base - slot) / SLOT_SIZE as u64) as usize - 1);
        self.is_live(pid).then_some(pid)
    }
}
