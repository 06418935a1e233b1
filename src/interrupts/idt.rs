use lazy_static::lazy_static;
use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use x86_64::{PrivilegeLevel, VirtAddr};

use super::gdt;
use super::usermode::{perform, syscall_handler_asm};
use crate::drivers::{keyboard, rtc};
use crate::kernel::try_with_kernel;
use crate::syscalls::Transfer;
use crate::{log_error, log_info};

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

/// Vector of the system call gate.
pub const SYSCALL_VECTOR: usize = 0x80;

/// Status handed to the parent of a process killed by an exception.
const EXCEPTION_STATUS: u8 = 255;

pub static PICS: Mutex<ChainedPics> = Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
    Keyboard = PIC_1_OFFSET + 1,
    Rtc = PIC_2_OFFSET,
}

impl InterruptIndex {
    fn as_u8(self) -> u8 {
        self as u8
    }

    fn as_usize(self) -> usize {
        usize::from(self.as_u8())
    }

    fn end_of_interrupt(self) {
        unsafe { PICS.lock().notify_end_of_interrupt(self.as_u8()) };
    }
}

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        unsafe {
            idt.double_fault.set_handler_fn(double_fault_handler)
                .set_stack_index(gdt::DOUBLE_FAULT_IST_INDEX);
        }
        idt.divide_error.set_handler_fn(divide_error_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
        idt[InterruptIndex::Timer.as_usize()]
            .set_handler_fn(timer_interrupt_handler);
        idt[InterruptIndex::Keyboard.as_usize()]
            .set_handler_fn(keyboard_interrupt_handler);
        idt[InterruptIndex::Rtc.as_usize()]
            .set_handler_fn(rtc_interrupt_handler);
        unsafe {
            idt[SYSCALL_VECTOR]
                .set_handler_addr(VirtAddr::new(syscall_handler_asm as usize as u64))
                .set_privilege_level(PrivilegeLevel::Ring3);
        }
        idt
    };
}

pub fn init() {
    IDT.load();
}

/// Unmask the timer, keyboard, cascade and RTC lines; mask everything else.
pub fn unmask_device_irqs() {
    use x86_64::instructions::port::Port;

    let mut master: Port<u8> = Port::new(0x21);
    let mut slave: Port<u8> = Port::new(0xA1);
    unsafe {
        master.write(!0b0000_0111);
        slave.write(!0b0000_0001);
    }
    log_info!("PIC lines 0, 1, 2 and 8 unmasked.");
}

fn from_user_mode(stack_frame: &InterruptStackFrame) -> bool {
    stack_frame.code_segment & 0b11 == PrivilegeLevel::Ring3 as u64
}

/// A fault in ring 3 kills the process; in ring 0 it is a kernel bug.
fn user_fault(name: &str, stack_frame: &InterruptStackFrame) {
    if !from_user_mode(stack_frame) {
        panic!("EXCEPTION: {}\n{:#?}", name, stack_frame);
    }
    log_error!("EXCEPTION: {} at {:?}, terminating process", name, stack_frame.instruction_pointer);
    crate::syscalls::terminate_current(EXCEPTION_STATUS);
}

extern "x86-interrupt" fn breakpoint_handler(
    stack_frame: InterruptStackFrame)
{
    log_info!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame, _error_code: u64) -> !
{
    panic!("EXCEPTION: DOUBLE FAULT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn divide_error_handler(
    stack_frame: InterruptStackFrame)
{
    user_fault("DIVIDE ERROR", &stack_frame);
}

extern "x86-interrupt" fn invalid_opcode_handler(
    stack_frame: InterruptStackFrame)
{
    user_fault("INVALID OPCODE", &stack_frame);
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame, error_code: PageFaultErrorCode)
{
    use x86_64::registers::control::Cr2;
    log_error!("Accessed Address: {:?}", Cr2::read());
    log_error!("Error Code: {:?}", error_code);
    user_fault("PAGE FAULT", &stack_frame);
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame, error_code: u64)
{
    log_error!("Error Code: {}", error_code);
    user_fault("GENERAL PROTECTION FAULT", &stack_frame);
}

extern "x86-interrupt" fn timer_interrupt_handler(
    _stack_frame: InterruptStackFrame)
{
    // EOI first: a switch may not come back here for a while.
    InterruptIndex::Timer.end_of_interrupt();
    if let Some(transfer @ Transfer::Switch { .. }) = try_with_kernel(|kernel, machine| kernel.tick(machine)) {
        perform(transfer);
    }
}

extern "x86-interrupt" fn keyboard_interrupt_handler(
    _stack_frame: InterruptStackFrame)
{
    use x86_64::instructions::port::Port;
    let mut port: Port<u8> = Port::new(0x60);
    let scancode = unsafe { port.read() };
    keyboard::push_scancode(scancode);
    InterruptIndex::Keyboard.end_of_interrupt();

    // Keys stay queued when the kernel is busy; the next IRQ drains them.
    let transfer = try_with_kernel(|kernel, machine| {
        while let Some(key) = keyboard::try_read_key() {
            let transfer = kernel.handle_key(machine, key);
            if transfer != Transfer::Stay {
                return transfer;
            }
        }
        Transfer::Stay
    });
    if let Some(transfer) = transfer {
        if transfer != Transfer::Stay {
            perform(transfer);
        }
    }
}

extern "x86-interrupt" fn rtc_interrupt_handler(
    _stack_frame: InterruptStackFrame)
{
    unsafe { rtc::acknowledge() };
    try_with_kernel(|kernel, _| kernel.rtc.tick());
    InterruptIndex::Rtc.end_of_interrupt();
}
