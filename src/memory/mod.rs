pub mod paging;

use x86_64::{PhysAddr, VirtAddr};

use crate::process::ProcessId;

// ──────────────────────────────────────────────────────────────
//  Static memory layout
// ──────────────────────────────────────────────────────────────

/// One page-directory entry maps a 2 MiB huge page.
pub const HUGE_PAGE_SIZE: u64 = 2 * 1024 * 1024;

/// Size of a program slot and of the program window (two huge pages).
pub const PROGRAM_SLOT_SIZE: u64 = 4 * 1024 * 1024;

/// Physical address of the slot belonging to pid 0.
pub const PROGRAM_SLOT_BASE: u64 = 8 * 1024 * 1024;

/// Virtual address of the program window.
pub const PROGRAM_WINDOW_START: u64 = 0x0800_0000;
pub const PROGRAM_WINDOW_END: u64 = PROGRAM_WINDOW_START + PROGRAM_SLOT_SIZE;

/// Programs are copied verbatim to this address inside the window.
pub const PROGRAM_LOAD_ADDRESS: u64 = 0x0804_8000;
pub const PROGRAM_LOAD_OFFSET: usize = (PROGRAM_LOAD_ADDRESS - PROGRAM_WINDOW_START) as usize;

/// Initial user stack pointer: the last quadword of the window.
pub const USER_STACK_TOP: u64 = PROGRAM_WINDOW_END - 8;

/// Virtual address handed out by `vidmap`.
pub const VIDEO_WINDOW_START: u64 = PROGRAM_WINDOW_END;
pub const VIDEO_WINDOW_SIZE: u64 = 4096;

/// Physical VGA text memory.
pub const VGA_TEXT_MEMORY: u64 = 0xB8000;

/// Physical slot holding the image and user stack of `pid`.
pub fn program_slot(pid: ProcessId) -> PhysAddr {
    PhysAddr::new(PROGRAM_SLOT_BASE + pid.0 as u64 * PROGRAM_SLOT_SIZE)
}

/// Checks that `[addr, addr + len)` lies inside memory a user program may hand to the kernel.
///
/// The video window only counts while it is mapped: before the first `vidmap`
/// or terminal switch its directory entry is empty.
pub fn is_user_range(addr: u64, len: u64, video_mapped: bool) -> bool {
    let end = match addr.checked_add(len) {
        Some(end) => end,
        None => return false,
    };
    let inside = |start: u64, limit: u64| addr >= start && end <= limit;
    inside(PROGRAM_WINDOW_START, PROGRAM_WINDOW_END)
        || (video_mapped && inside(VIDEO_WINDOW_START, VIDEO_WINDOW_START + VIDEO_WINDOW_SIZE))
}

/// Validate a user buffer and turn it into a slice. A null pointer yields `None`.
///
/// # Safety
/// The program window of the calling process must be mapped, and the video
/// window too when `video_mapped` is set.
pub unsafe fn user_slice<'a>(addr: u64, len: u64, video_mapped: bool) -> Result<Option<&'a mut [u8]>, ()> {
    if addr == 0 {
        return Ok(None);
    }
    if !is_user_range(addr, len, video_mapped) {
        return Err(());
    }
    let ptr = VirtAddr::new(addr).as_mut_ptr::<u8>();
    Ok(Some(core::slice::from_raw_parts_mut(ptr, len as usize)))
}

/// NUL-terminated user string, at most `max` bytes long and never past the end
/// of the window it starts in. The terminator is not included.
///
/// # Safety
/// Same as [`user_slice`].
pub unsafe fn user_c_str<'a>(addr: u64, max: u64, video_mapped: bool) -> Option<&'a [u8]> {
    if !is_user_range(addr, 1, video_mapped) {
        return None;
    }
    let limit = if addr < PROGRAM_WINDOW_END {
        PROGRAM_WINDOW_END
    } else {
        VIDEO_WINDOW_START + VIDEO_WINDOW_SIZE
    };
    let len = max.min(limit - addr) as usize;
    let bytes = core::slice::from_raw_parts(VirtAddr::new(addr).as_ptr::<u8>(), len);
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
    Some(&bytes[..end])
}
