//! Kernel configuration constants.

/// Number of virtual terminals (Alt+F1 .. Alt+F3).
pub const TERMINAL_COUNT: usize = 3;

/// Maximum number of live processes across all terminals.
pub const MAX_PROCESSES: usize = 6;

/// Size of every process's file table. Descriptors 0 and 1 are stdin/stdout.
pub const MAX_OPEN_FILES: usize = 8;

/// Capacity of the argument buffer captured by `execute`.
pub const MAX_ARGS_LENGTH: usize = 128;

/// Capacity of a terminal's line-input buffer, including the trailing newline.
pub const LINE_BUFFER_SIZE: usize = 128;

/// Longest file name stored in a directory entry.
pub const FILE_NAME_LENGTH: usize = 32;

/// Frequency of the scheduler tick (PIT channel 0).
pub const TIMER_HZ: u32 = 20;

/// RTC frequency after boot and after every `open` of the RTC device.
pub const RTC_DEFAULT_HZ: u32 = 2;

/// Highest RTC frequency a user program may request.
pub const RTC_MAX_HZ: u32 = 1024;

/// Program launched on every terminal that has no process left.
pub const SHELL: &[u8] = b"shell";
