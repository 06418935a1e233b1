#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_os = "none", feature(abi_x86_interrupt))]

pub mod config;
pub mod vga;
pub mod serial;
#[cfg(target_os = "none")]
pub mod interrupts;
pub mod machine;
pub mod memory;
pub mod process;
pub mod fs;
pub mod drivers;
pub mod scheduler;
pub mod syscalls;
pub mod kernel;

#[cfg(test)]
mod testing;

#[cfg(not(test))]
use core::panic::PanicInfo;

/// Entered from the multiboot2 loader stub with paging, long mode and the
/// identity map of the first GiB already set up.
#[cfg(target_os = "none")]
#[no_mangle]
pub extern "C" fn _start(multiboot_info_addr: usize) -> ! {
    use crate::drivers::tty::TerminalId;
    use crate::syscalls::Transfer;

    serial::init();
    interrupts::init();
    log_info!("TriadOS kernel started.");

    let boot_info = match unsafe { multiboot2::BootInformation::load(multiboot_info_addr as *const _) } {
        Ok(info) => info,
        Err(err) => panic!("Failed to load Multiboot2 info: {:?}", err),
    };
    let Some(module) = boot_info.module_tags().next() else {
        panic!("No filesystem module was loaded");
    };
    let start = module.start_address() as usize;
    let end = module.end_address() as usize;
    // The module sits in the identity-mapped first GiB and is never freed.
    let image: &'static [u8] = unsafe { core::slice::from_raw_parts(start as *const u8, end - start) };
    log_info!("Filesystem module at {:#x}, {} bytes.", start, end - start);

    if let Err(err) = unsafe { kernel::boot(image) } {
        panic!("Bad filesystem image: {}", err);
    }
    unsafe { drivers::init() };

    let first = TerminalId(0);
    match kernel::with_kernel(|kernel, machine| kernel.spawn(machine, first, config::SHELL, &[], Some(first))) {
        Ok(launch) => {
            interrupts::usermode::perform(Transfer::Launch(launch));
        }
        Err(err) => log_error!("Could not start the first shell: {}", err),
    }

    interrupts::usermode::perform(Transfer::Idle);
    loop {
        x86_64::instructions::hlt();
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log_error!("{}", info);
    loop {
        #[cfg(target_os = "none")]
        x86_64::instructions::hlt();
        #[cfg(not(target_os = "none"))]
        core::hint::spin_loop();
    }
}
