//! File-table syscalls and the per-descriptor dispatch.

use x86_64::VirtAddr;

use super::{SyscallError, SyscallResult};
use crate::config::{MAX_ARGS_LENGTH, MAX_OPEN_FILES};
use crate::fs::fd::{FileDescriptor, FileFlags, FileOps};
use crate::kernel::KernelState;
use crate::machine::Machine;
use crate::memory::{PROGRAM_WINDOW_END, PROGRAM_WINDOW_START, VIDEO_WINDOW_START};

/// First descriptor `open` may hand out. 0 and 1 are the terminal.
const FIRST_FREE_FD: usize = 2;

impl<'a> KernelState<'a> {
    fn descriptor<M: Machine>(&self, machine: &M, fd: usize) -> SyscallResult<FileDescriptor> {
        let pid = self.current_pid(machine)?;
        let pcb = self.processes.pcb(pid).ok_or(SyscallError::InvalidArgument)?;
        let descriptor = *pcb.files.get(fd).ok_or(SyscallError::InvalidArgument)?;
        if !descriptor.is_open() {
            return Err(SyscallError::InvalidArgument);
        }
        Ok(descriptor)
    }

    fn set_position<M: Machine>(&mut self, machine: &M, fd: usize, position: u32) -> SyscallResult<()> {
        let pid = self.current_pid(machine)?;
        let pcb = self.processes.pcb_mut(pid).ok_or(SyscallError::InvalidArgument)?;
        pcb.files[fd].position = position;
        Ok(())
    }

    fn open_binding<M: Machine>(&mut self, machine: &mut M, ops: FileOps) -> SyscallResult<()> {
        match ops {
            FileOps::Rtc => {
                self.rtc.open(machine);
                Ok(())
            }
            FileOps::Directory | FileOps::Regular => Ok(()),
            FileOps::TerminalIn | FileOps::TerminalOut | FileOps::Closed => Err(SyscallError::InvalidArgument),
        }
    }

    pub(crate) fn close_binding<M: Machine>(&mut self, _machine: &mut M, ops: FileOps) -> SyscallResult<()> {
        match ops {
            FileOps::Rtc | FileOps::Directory | FileOps::Regular => Ok(()),
            FileOps::TerminalIn | FileOps::TerminalOut | FileOps::Closed => Err(SyscallError::InvalidArgument),
        }
    }

    /// Bind the lowest free descriptor to the file called `name`.
    pub fn open<M: Machine>(&mut self, machine: &mut M, name: &[u8]) -> SyscallResult<usize> {
        let pid = self.current_pid(machine)?;
        let entry = self.fs.lookup_by_name(name)?;
        let pcb = self.processes.pcb_mut(pid).ok_or(SyscallError::InvalidArgument)?;
        let fd = (FIRST_FREE_FD..MAX_OPEN_FILES)
            .find(|&fd| !pcb.files[fd].is_open())
            .ok_or(SyscallError::ResourceExhausted)?;

        let ops = FileOps::for_type(entry.file_type);
        pcb.files[fd] = FileDescriptor {
            ops,
            flags: FileFlags::OPEN,
            inode: entry.inode,
            position: 0,
        };
        if self.open_binding(machine, ops).is_err() {
            if let Some(pcb) = self.processes.pcb_mut(pid) {
                pcb.files[fd] = FileDescriptor::CLOSED;
            }
            return Err(SyscallError::InvalidArgument);
        }
        Ok(fd)
    }

    pub fn close<M: Machine>(&mut self, machine: &mut M, fd: usize) -> SyscallResult<usize> {
        if fd < FIRST_FREE_FD {
            return Err(SyscallError::InvalidArgument);
        }
        let descriptor = self.descriptor(machine, fd)?;
        self.close_binding(machine, descriptor.ops)?;

        let pid = self.current_pid(machine)?;
        if let Some(pcb) = self.processes.pcb_mut(pid) {
            pcb.files[fd].flags.remove(FileFlags::OPEN);
            pcb.files[fd].ops = FileOps::Closed;
        }
        Ok(0)
    }

    /// Read through descriptor `fd`. Terminal input reports `WouldBlock` until a line is committed.
    pub fn read<M: Machine>(&mut self, machine: &mut M, fd: usize, buf: Option<&mut [u8]>) -> SyscallResult<usize> {
        let descriptor = self.descriptor(machine, fd)?;
        let buf = buf.ok_or(SyscallError::InvalidArgument)?;

        match descriptor.ops {
            FileOps::TerminalIn => {
                let terminal = self.current_terminal(machine)?;
                self.terminals
                    .get_mut(terminal)
                    .take_line(buf)
                    .ok_or(SyscallError::WouldBlock)
            }
            FileOps::Rtc => Ok(self.rtc.read(buf)),
            FileOps::Directory => {
                let index = descriptor.position as usize;
                if index >= self.fs.dir_count() {
                    return Ok(0);
                }
                let entry = self.fs.lookup_by_index(index)?;
                let name = entry.name();
                let count = name.len().min(buf.len());
                buf[..count].copy_from_slice(&name[..count]);
                self.set_position(machine, fd, descriptor.position + 1)?;
                Ok(count)
            }
            FileOps::Regular => {
                let count = self.fs.read_data(descriptor.inode, descriptor.position, buf)?;
                self.set_position(machine, fd, descriptor.position + count as u32)?;
                Ok(count)
            }
            FileOps::TerminalOut | FileOps::Closed => Err(SyscallError::InvalidArgument),
        }
    }

    pub fn write<M: Machine>(&mut self, machine: &mut M, fd: usize, buf: Option<&[u8]>) -> SyscallResult<usize> {
        let descriptor = self.descriptor(machine, fd)?;
        let buf = buf.ok_or(SyscallError::InvalidArgument)?;

        match descriptor.ops {
            FileOps::TerminalOut => {
                let terminal = self.current_terminal(machine)?;
                Ok(self.terminals.write(machine, terminal, buf))
            }
            FileOps::Rtc => self.rtc.write(machine, buf),
            FileOps::TerminalIn | FileOps::Directory | FileOps::Regular | FileOps::Closed => {
                Err(SyscallError::InvalidArgument)
            }
        }
    }

    /// Copy the caller's argument text, zero padded, into `buf`.
    pub fn getargs<M: Machine>(&mut self, machine: &mut M, buf: Option<&mut [u8]>) -> SyscallResult<usize> {
        let buf = buf.ok_or(SyscallError::InvalidArgument)?;
        let pid = self.current_pid(machine)?;
        let pcb = self.processes.pcb(pid).ok_or(SyscallError::InvalidArgument)?;
        if !pcb.has_args() {
            return Err(SyscallError::InvalidArgument);
        }
        let count = buf.len().min(MAX_ARGS_LENGTH);
        buf[..count].copy_from_slice(&pcb.args()[..count]);
        Ok(0)
    }

    /// Map the caller's terminal screen into the video window and return its address.
    ///
    /// `screen_start` is where the caller wants the address stored. It must
    /// lie inside the program window.
    pub fn vidmap<M: Machine>(&mut self, machine: &mut M, screen_start: u64) -> SyscallResult<VirtAddr> {
        let inside = screen_start >= PROGRAM_WINDOW_START
            && screen_start.checked_add(8).is_some_and(|end| end <= PROGRAM_WINDOW_END);
        if !inside {
            return Err(SyscallError::InvalidArgument);
        }
        let terminal = self.current_terminal(machine)?;
        let page = self.terminals.video_page(terminal);
        self.address_space.map_terminal_video(machine, page);
        Ok(VirtAddr::new(VIDEO_WINDOW_START))
    }

    /// Signals are not supported.
    pub fn set_handler(&mut self, _signum: u32, _handler: u64) -> SyscallResult<usize> {
        Err(SyscallError::InvalidArgument)
    }

    pub fn sigreturn(&mut self) -> SyscallResult<usize> {
        Err(SyscallError::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_OPEN_FILES;
    use crate::drivers::keyboard::scancodes::KeyCode;
    use crate::drivers::tty::TerminalId;
    use crate::memory::VGA_TEXT_MEMORY;
    use crate::testing::Fixture;
    use x86_64::PhysAddr;

    #[test]
    fn open_hands_out_the_lowest_free_descriptor() {
        let mut fx = Fixture::new();
        fx.start_shell();
        assert_eq!(fx.kernel.open(&mut fx.machine, b"frame0.txt"), Ok(2));
        assert_eq!(fx.kernel.open(&mut fx.machine, b"."), Ok(3));
        assert_eq!(fx.kernel.close(&mut fx.machine, 2), Ok(0));
        assert_eq!(fx.kernel.open(&mut fx.machine, b"rtc"), Ok(2));
        assert_eq!(fx.kernel.open(&mut fx.machine, b"nope"), Err(SyscallError::NotFound));
    }

    #[test]
    fn open_fails_when_the_table_is_full() {
        let mut fx = Fixture::new();
        fx.start_shell();
        for fd in 2..MAX_OPEN_FILES {
            assert_eq!(fx.kernel.open(&mut fx.machine, b"frame0.txt"), Ok(fd));
        }
        assert_eq!(fx.kernel.open(&mut fx.machine, b"frame0.txt"), Err(SyscallError::ResourceExhausted));
    }

    #[test]
    fn terminal_descriptors_cannot_be_closed() {
        let mut fx = Fixture::new();
        fx.start_shell();
        assert_eq!(fx.kernel.close(&mut fx.machine, 0), Err(SyscallError::InvalidArgument));
        assert_eq!(fx.kernel.close(&mut fx.machine, 1), Err(SyscallError::InvalidArgument));
        assert_eq!(fx.kernel.close(&mut fx.machine, 5), Err(SyscallError::InvalidArgument));
        assert_eq!(fx.kernel.close(&mut fx.machine, MAX_OPEN_FILES), Err(SyscallError::InvalidArgument));
    }

    #[test]
    fn regular_file_reads_advance_and_stop_at_the_end() {
        let mut fx = Fixture::new();
        fx.start_shell();
        let fd = fx.kernel.open(&mut fx.machine, b"frame0.txt").unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(fx.kernel.read(&mut fx.machine, fd, Some(&mut buf[..])), Ok(6));
        assert_eq!(&buf, b"hello ");
        assert_eq!(fx.kernel.read(&mut fx.machine, fd, Some(&mut buf[..])), Ok(5));
        assert_eq!(&buf[..5], b"fish\n");
        assert_eq!(fx.kernel.read(&mut fx.machine, fd, Some(&mut buf[..])), Ok(0));
        assert_eq!(fx.kernel.read(&mut fx.machine, fd, None), Err(SyscallError::InvalidArgument));
        assert_eq!(fx.kernel.write(&mut fx.machine, fd, Some(&b"x"[..])), Err(SyscallError::InvalidArgument));
    }

    #[test]
    fn directory_reads_list_one_name_per_call() {
        let mut fx = Fixture::new();
        fx.start_shell();
        let fd = fx.kernel.open(&mut fx.machine, b".").unwrap();
        let mut names = Vec::new();
        loop {
            let mut buf = [0u8; 32];
            let count = fx.kernel.read(&mut fx.machine, fd, Some(&mut buf[..])).unwrap();
            if count == 0 {
                break;
            }
            names.push(String::from_utf8(buf[..count].to_vec()).unwrap());
        }
        assert_eq!(names.len(), fx.kernel.fs.dir_count());
        assert_eq!(names[0], ".");
        assert!(names.iter().any(|n| n == "frame0.txt"));
    }

    #[test]
    fn terminal_read_waits_for_a_committed_line() {
        let mut fx = Fixture::new();
        fx.start_shell();
        let mut buf = [0u8; 16];
        assert_eq!(fx.kernel.read(&mut fx.machine, 0, Some(&mut buf[..])), Err(SyscallError::WouldBlock));

        for key in [KeyCode::Char('l'), KeyCode::Char('s'), KeyCode::Enter] {
            fx.kernel.handle_key(&mut fx.machine, key);
        }
        assert_eq!(fx.kernel.read(&mut fx.machine, 0, Some(&mut buf[..])), Ok(3));
        assert_eq!(&buf[..3], b"ls\n");
        assert_eq!(fx.kernel.read(&mut fx.machine, 1, Some(&mut buf[..])), Err(SyscallError::InvalidArgument));
    }

    #[test]
    fn terminal_write_stops_at_nul() {
        let mut fx = Fixture::new();
        fx.start_shell();
        assert_eq!(fx.kernel.write(&mut fx.machine, 1, Some(&b"391OS> \0rest"[..])), Ok(7));
        assert!(fx.screen_text().starts_with("391OS> "));
        assert_eq!(fx.kernel.write(&mut fx.machine, 0, Some(&b"x"[..])), Err(SyscallError::InvalidArgument));
        assert_eq!(fx.kernel.write(&mut fx.machine, 1, None), Err(SyscallError::InvalidArgument));
    }

    #[test]
    fn rtc_descriptor_reads_ticks_and_sets_frequency() {
        let mut fx = Fixture::new();
        fx.start_shell();
        fx.kernel.rtc.write(&mut fx.machine, &512u32.to_le_bytes()).unwrap();
        let fd = fx.kernel.open(&mut fx.machine, b"rtc").unwrap();
        assert_eq!(fx.machine.rtc_hz, Some(2));

        assert_eq!(fx.kernel.write(&mut fx.machine, fd, Some(&32u32.to_le_bytes()[..])), Ok(4));
        assert_eq!(fx.machine.rtc_hz, Some(32));
        fx.kernel.rtc.tick();
        let mut buf = [0u8; 4];
        assert_eq!(fx.kernel.read(&mut fx.machine, fd, Some(&mut buf[..])), Ok(4));
        assert_eq!(u32::from_le_bytes(buf), 1);
        assert_eq!(fx.kernel.close(&mut fx.machine, fd), Ok(0));
        assert_eq!(fx.kernel.close(&mut fx.machine, fd), Err(SyscallError::InvalidArgument));
    }

    #[test]
    fn getargs_copies_the_argument_text() {
        let mut fx = Fixture::new();
        fx.start_shell();
        let mut buf = [0xAAu8; 4];
        assert_eq!(fx.kernel.getargs(&mut fx.machine, Some(&mut buf[..])), Err(SyscallError::InvalidArgument));

        fx.launch(b"cat frame0.txt");
        let mut buf = [0xAAu8; 16];
        assert_eq!(fx.kernel.getargs(&mut fx.machine, Some(&mut buf[..])), Ok(0));
        assert_eq!(&buf[..10], b"frame0.txt");
        assert!(buf[10..].iter().all(|&b| b == 0));
        assert_eq!(fx.kernel.getargs(&mut fx.machine, None), Err(SyscallError::InvalidArgument));
    }

    #[test]
    fn vidmap_validates_the_pointer_and_maps_the_screen() {
        let mut fx = Fixture::new();
        fx.start_shell();
        assert_eq!(fx.kernel.vidmap(&mut fx.machine, 0), Err(SyscallError::InvalidArgument));
        assert_eq!(fx.kernel.vidmap(&mut fx.machine, VIDEO_WINDOW_START), Err(SyscallError::InvalidArgument));

        let address = fx.kernel.vidmap(&mut fx.machine, PROGRAM_WINDOW_START + 0x100).unwrap();
        assert_eq!(address.as_u64(), VIDEO_WINDOW_START);
        assert_eq!(fx.kernel.address_space.video_target(), Some(PhysAddr::new(VGA_TEXT_MEMORY)));

        // A background terminal draws into its own page.
        fx.kernel.terminals.switch_display(&mut fx.machine, TerminalId(1));
        fx.kernel.vidmap(&mut fx.machine, PROGRAM_WINDOW_START).unwrap();
        assert_eq!(
            fx.kernel.address_space.video_target(),
            Some(fx.kernel.terminals.get(TerminalId(0)).page_address())
        );
    }

    #[test]
    fn signal_calls_are_unsupported() {
        let mut fx = Fixture::new();
        assert_eq!(fx.kernel.set_handler(2, 0x0804_8000), Err(SyscallError::InvalidArgument));
        assert_eq!(fx.kernel.sigreturn(), Err(SyscallError::InvalidArgument));
    }
}
