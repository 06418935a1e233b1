//! Host-side stand-ins for the hardware and the boot module.

use std::collections::BTreeMap;

use x86_64::structures::paging::PageTable;
use x86_64::{PhysAddr, VirtAddr};

use crate::config::{FILE_NAME_LENGTH, TERMINAL_COUNT};
use crate::drivers::tty::{TerminalId, TerminalRecord, TerminalTable};
use crate::fs::rofs::BLOCK_SIZE;
use crate::fs::FileSystem;
use crate::kernel::KernelState;
use crate::machine::Machine;
use crate::memory::paging::AddressSpace;
use crate::memory::{PROGRAM_LOAD_ADDRESS, PROGRAM_SLOT_SIZE};
use crate::process::{KernelStacks, ProcessId, ProcessTable};
use crate::syscalls::lifecycle::EXECUTABLE_MAGIC;
use crate::scheduler::context::SavedExecutionContext;
use crate::syscalls::{SaveSlot, Transfer};
use crate::vga::{Buffer, TextSurface, BUFFER_HEIGHT, BUFFER_WIDTH};

/// Records every side effect instead of touching hardware.
pub struct MockMachine {
    pub flushes: usize,
    pub kernel_stack: Option<VirtAddr>,
    pub cursor: (usize, usize),
    pub rtc_hz: Option<u32>,
    slots: BTreeMap<u64, Vec<u8>>,
    display: Box<Buffer>,
}

impl MockMachine {
    pub fn new() -> Self {
        MockMachine {
            flushes: 0,
            kernel_stack: None,
            cursor: (0, 0),
            rtc_hz: None,
            slots: BTreeMap::new(),
            display: Box::new(Buffer::blank()),
        }
    }

    pub fn screen(&self) -> &Buffer {
        &self.display
    }
}

impl Machine for MockMachine {
    fn flush_tlb(&mut self) {
        self.flushes += 1;
    }

    fn set_kernel_stack(&mut self, top: VirtAddr) {
        self.kernel_stack = Some(top);
    }

    /// Somewhere inside the stack the last launch or switch selected.
    fn stack_pointer(&self) -> VirtAddr {
        match self.kernel_stack {
            Some(top) => top - 64u64,
            None => VirtAddr::new(0x1000),
        }
    }

    fn interrupts_enabled(&self) -> bool {
        false
    }

    fn program_window(&mut self, slot: PhysAddr) -> &mut [u8] {
        self.slots
            .entry(slot.as_u64())
            .or_insert_with(|| vec![0; PROGRAM_SLOT_SIZE as usize])
    }

    fn display(&mut self) -> &mut Buffer {
        &mut self.display
    }

    fn move_cursor(&mut self, row: usize, col: usize) {
        self.cursor = (row, col);
    }

    fn set_rtc_frequency(&mut self, hz: u32) {
        self.rtc_hz = Some(hz);
    }
}

pub fn page_tables() -> (&'static mut PageTable, &'static mut PageTable) {
    (Box::leak(Box::new(PageTable::new())), Box::leak(Box::new(PageTable::new())))
}

pub fn kernel_stacks() -> &'static mut KernelStacks {
    Box::leak(Box::new(KernelStacks::new()))
}

pub fn terminal_records() -> &'static mut [TerminalRecord; TERMINAL_COUNT] {
    Box::leak(Box::new([const { TerminalRecord::new() }; TERMINAL_COUNT]))
}

/// Lays out a boot filesystem image: boot block, inodes, data blocks.
pub struct FsImageBuilder {
    entries: Vec<([u8; FILE_NAME_LENGTH], u32, u32)>,
    files: Vec<Vec<u8>>,
}

impl FsImageBuilder {
    pub fn new() -> Self {
        FsImageBuilder {
            entries: Vec::new(),
            files: Vec::new(),
        }
    }

    fn entry(mut self, name: &[u8], file_type: u32, inode: u32) -> Self {
        let mut field = [0u8; FILE_NAME_LENGTH];
        let len = name.len().min(FILE_NAME_LENGTH);
        field[..len].copy_from_slice(&name[..len]);
        self.entries.push((field, file_type, inode));
        self
    }

    pub fn rtc(self, name: &[u8]) -> Self {
        self.entry(name, 0, 0)
    }

    pub fn directory(self, name: &[u8]) -> Self {
        self.entry(name, 1, 0)
    }

    pub fn file(mut self, name: &[u8], contents: &[u8]) -> Self {
        let inode = self.files.len() as u32;
        self.files.push(contents.to_vec());
        self.entry(name, 2, inode)
    }

    pub fn build(self) -> Vec<u8> {
        let inode_count = self.files.len();
        let data_blocks: usize = self.files.iter().map(|f| f.len().div_ceil(BLOCK_SIZE)).sum();
        let mut image = vec![0u8; (1 + inode_count + data_blocks) * BLOCK_SIZE];
        let put = |image: &mut [u8], offset: usize, value: u32| {
            image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        };

        put(&mut image, 0, self.entries.len() as u32);
        put(&mut image, 4, inode_count as u32);
        put(&mut image, 8, data_blocks as u32);
        for (index, (name, file_type, inode)) in self.entries.iter().enumerate() {
            let base = 64 + index * 64;
            image[base..base + FILE_NAME_LENGTH].copy_from_slice(name);
            put(&mut image, base + FILE_NAME_LENGTH, *file_type);
            put(&mut image, base + FILE_NAME_LENGTH + 4, *inode);
        }

        let data_base = (1 + inode_count) * BLOCK_SIZE;
        let mut next_block = 0;
        for (inode, contents) in self.files.iter().enumerate() {
            let inode_base = (1 + inode) * BLOCK_SIZE;
            put(&mut image, inode_base, contents.len() as u32);
            for (slot, chunk) in contents.chunks(BLOCK_SIZE).enumerate() {
                put(&mut image, inode_base + 4 + slot * 4, next_block as u32);
                let start = data_base + next_block * BLOCK_SIZE;
                image[start..start + chunk.len()].copy_from_slice(chunk);
                next_block += 1;
            }
        }
        image
    }
}

/// An image `execute` accepts, entering at `entry_offset` past the load address.
pub fn executable(entry_offset: u64, body: &[u8]) -> Vec<u8> {
    let mut image = vec![0u8; 28];
    image[..4].copy_from_slice(&EXECUTABLE_MAGIC);
    image[24..28].copy_from_slice(&((PROGRAM_LOAD_ADDRESS + entry_offset) as u32).to_le_bytes());
    image.extend_from_slice(body);
    image
}

/// A booted kernel over an in-memory filesystem.
pub struct Fixture {
    pub kernel: KernelState<'static>,
    pub machine: MockMachine,
}

impl Fixture {
    pub fn new() -> Self {
        Self::from_builder(
            FsImageBuilder::new()
                .directory(b".")
                .rtc(b"rtc")
                .file(b"shell", &executable(0x100, b"shell body"))
                .file(b"cat", &executable(0x80, b"cat body"))
                .file(b"counter", &executable(0x40, b"counter body"))
                .file(b"frame0.txt", b"hello fish\n")
                .file(b"tiny", &[0x7F, b'E', b'L', b'F', 0, 0]),
        )
    }

    /// Only `.`, `rtc` and whatever `files` adds.
    pub fn with_files(files: impl FnOnce(FsImageBuilder) -> FsImageBuilder) -> Self {
        Self::from_builder(files(FsImageBuilder::new().directory(b".").rtc(b"rtc")))
    }

    fn from_builder(builder: FsImageBuilder) -> Self {
        let image: &'static [u8] = Box::leak(builder.build().into_boxed_slice());
        let fs = FileSystem::new(image).unwrap();
        let (directory, video_table) = page_tables();
        let kernel = KernelState::new(
            AddressSpace::new(directory, video_table),
            ProcessTable::new(kernel_stacks()),
            TerminalTable::new(terminal_records()),
            fs,
        );
        Fixture {
            kernel,
            machine: MockMachine::new(),
        }
    }

    /// Run `command` as if the current process executed it; returns the new pid.
    pub fn launch(&mut self, command: &[u8]) -> ProcessId {
        match self.kernel.execute(&mut self.machine, command) {
            Ok(Transfer::Launch(launch)) => launch.pid,
            other => panic!("{:?} did not launch: {:?}", String::from_utf8_lossy(command), other),
        }
    }

    pub fn start_shell(&mut self) -> ProcessId {
        self.launch(b"shell")
    }

    /// Stand in for the context-switch assembly: park a flow wherever
    /// carrying out `transfer` would save one.
    pub fn settle(&mut self, transfer: Transfer) -> Transfer {
        let parked = match transfer {
            Transfer::Launch(launch) => Some(launch.save),
            Transfer::Switch { from, .. } => Some(SaveSlot::Terminal(from)),
            _ => None,
        };
        if let Some(context) = parked.and_then(|slot| self.kernel.save_slot(slot)) {
            let flow = SavedExecutionContext {
                rsp: 0x2000,
                rip: 0x1000,
                ..SavedExecutionContext::empty()
            };
            unsafe { *context = flow };
        }
        transfer
    }

    pub fn tick(&mut self) -> Transfer {
        let transfer = self.kernel.tick(&mut self.machine);
        self.settle(transfer)
    }

    pub fn switch_terminal(&mut self, to: TerminalId) -> Transfer {
        let transfer = self.kernel.switch_terminal(&mut self.machine, to);
        self.settle(transfer)
    }

    /// What the VGA buffer shows, one line per row.
    pub fn screen_text(&self) -> String {
        let screen = self.machine.screen();
        let mut text = String::new();
        for row in 0..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                text.push(screen.read(row, col).ascii_character as char);
            }
            text.push('\n');
        }
        text
    }
}
