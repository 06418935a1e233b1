//! `execute` and `halt`: starting a program on top of its caller and unwinding back.

use x86_64::VirtAddr;

use super::{Launch, SaveSlot, SyscallError, SyscallResult, Transfer};
use crate::config::{MAX_OPEN_FILES, MAX_PROCESSES, SHELL};
use crate::drivers::tty::TerminalId;
use crate::fs::fd::FileDescriptor;
use crate::fs::FileType;
use crate::kernel::KernelState;
use crate::machine::Machine;
use crate::memory::{program_slot, PROGRAM_LOAD_OFFSET, PROGRAM_SLOT_SIZE, USER_STACK_TOP};

/// First bytes of every executable image.
pub const EXECUTABLE_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
/// Offset of the little-endian 32-bit entry point in the image header.
const ENTRY_POINT_OFFSET: usize = 24;
const HEADER_SIZE: usize = ENTRY_POINT_OFFSET + 4;

pub const PROCESS_LIMIT_MESSAGE: &[u8] = b"Maximum number of processes reached\n";

/// Split a command line into the program name and its argument text.
///
/// The name ends at the first space, NUL or newline. Arguments are whatever
/// follows that single space, up to a NUL or newline.
pub fn parse_command(command: &[u8]) -> (&[u8], &[u8]) {
    let is_end = |b: &u8| *b == 0 || *b == b'\n';
    let name_end = command
        .iter()
        .position(|b| *b == b' ' || is_end(b))
        .unwrap_or(command.len());
    let name = &command[..name_end];
    if command.get(name_end) != Some(&b' ') {
        return (name, &[]);
    }
    let rest = &command[name_end + 1..];
    let args_end = rest.iter().position(is_end).unwrap_or(rest.len());
    (name, &rest[..args_end])
}

impl<'a> KernelState<'a> {
    /// Start `command` on the scheduled terminal, on top of the calling process.
    pub fn execute<M: Machine>(&mut self, machine: &mut M, command: &[u8]) -> SyscallResult<Transfer> {
        let (name, args) = parse_command(command);
        if name == b"exit" {
            return self.halt(machine, 0);
        }
        let terminal = self.terminals.scheduled();
        let launch = self.spawn(machine, terminal, name, args, None)?;
        Ok(Transfer::Launch(launch))
    }

    /// Load `name` into a fresh pid on `terminal` and prepare the switch to ring 3.
    ///
    /// With `save` unset the caller's flow is parked in the new PCB and resumed
    /// by its `halt`. Otherwise it is parked in the given terminal's record.
    pub(crate) fn spawn<M: Machine>(
        &mut self,
        machine: &mut M,
        terminal: TerminalId,
        name: &[u8],
        args: &[u8],
        save: Option<TerminalId>,
    ) -> SyscallResult<Launch> {
        if name.is_empty() {
            return Err(SyscallError::InvalidArgument);
        }
        let entry = self.fs.lookup_by_name(name)?;
        if entry.file_type != FileType::Regular {
            return Err(SyscallError::NotExecutable);
        }
        let length = self.fs.file_length(entry.inode)? as usize;
        if length < HEADER_SIZE || length > PROGRAM_SLOT_SIZE as usize - PROGRAM_LOAD_OFFSET {
            return Err(SyscallError::NotExecutable);
        }
        let mut header = [0u8; HEADER_SIZE];
        self.fs.read_data(entry.inode, 0, &mut header)?;
        if header[..4] != EXECUTABLE_MAGIC {
            return Err(SyscallError::NotExecutable);
        }

        if self.processes.live_count() >= MAX_PROCESSES {
            self.terminals.write(machine, terminal, PROCESS_LIMIT_MESSAGE);
            crate::log_warn!("execute: process limit reached on terminal {}", terminal.0);
            return Err(SyscallError::ResourceExhausted);
        }

        let record = self.terminals.get(terminal);
        let parent = if record.process_count == 0 { None } else { record.owner };
        let pid = self
            .processes
            .allocate(terminal, parent, args)
            .ok_or(SyscallError::ResourceExhausted)?;

        // The slot is identity-mapped for the kernel, so the image can be copied before the window moves.
        let slot = program_slot(pid);
        let image = &mut machine.program_window(slot)[PROGRAM_LOAD_OFFSET..PROGRAM_LOAD_OFFSET + length];
        if let Err(err) = self.fs.read_data(entry.inode, 0, image) {
            self.processes.release(pid);
            return Err(err.into());
        }

        let record = self.terminals.get_mut(terminal);
        record.process_count += 1;
        record.owner = Some(pid);
        record.active = true;

        self.address_space.map_program(machine, slot);
        machine.set_kernel_stack(self.processes.kernel_stack_top(pid));

        let mut raw_entry = [0u8; 4];
        raw_entry.copy_from_slice(&header[ENTRY_POINT_OFFSET..HEADER_SIZE]);
        let entry_point = u32::from_le_bytes(raw_entry) as u64;

        crate::log_info!(
            "execute: pid {} on terminal {} (parent {:?}, entry {:#x})",
            pid.0,
            terminal.0,
            parent.map(|p| p.0),
            entry_point
        );
        Ok(Launch {
            pid,
            entry: VirtAddr::new(entry_point),
            user_stack: VirtAddr::new(USER_STACK_TOP),
            save: save.map_or(SaveSlot::Parent(pid), SaveSlot::Terminal),
        })
    }

    /// Tear down the running process and hand `status` to the `execute` that launched it.
    ///
    /// A terminal never runs out of processes: when its root shell halts a new
    /// shell takes its place.
    pub fn halt<M: Machine>(&mut self, machine: &mut M, status: u8) -> SyscallResult<Transfer> {
        let pid = self.current_pid(machine)?;

        for fd in 2..MAX_OPEN_FILES {
            let descriptor = match self.processes.pcb(pid) {
                Some(pcb) => pcb.files[fd],
                None => break,
            };
            if descriptor.is_open() {
                if let Err(err) = self.close_binding(machine, descriptor.ops) {
                    crate::log_warn!("halt: pid {} fd {} ({:?}) failed to close: {}", pid.0, fd, descriptor.ops, err);
                }
            }
            if let Some(pcb) = self.processes.pcb_mut(pid) {
                pcb.files[fd] = FileDescriptor::CLOSED;
            }
        }

        let (parent, context, terminal) = match self.processes.pcb(pid) {
            Some(pcb) => (pcb.parent, pcb.parent_context, pcb.terminal),
            None => return Err(SyscallError::InvalidArgument),
        };
        self.processes.release(pid);
        let record = self.terminals.get_mut(terminal);
        record.process_count = record.process_count.saturating_sub(1);
        crate::log_info!("halt: pid {} exited with status {}", pid.0, status);

        if record.process_count == 0 || parent == pid {
            return match self.spawn(machine, terminal, SHELL, &[], None) {
                Ok(launch) => Ok(Transfer::Launch(launch)),
                Err(err) => {
                    crate::log_error!("halt: could not restart shell on terminal {}: {}", terminal.0, err);
                    let record = self.terminals.get_mut(terminal);
                    record.active = false;
                    record.owner = None;
                    Ok(Transfer::Idle)
                }
            };
        }

        self.terminals.get_mut(terminal).owner = Some(parent);
        self.address_space.map_program(machine, program_slot(parent));
        machine.set_kernel_stack(self.processes.kernel_stack_top(parent));
        Ok(Transfer::Resume { context, status })
    }
}
