pub mod keyboard;
pub mod pit;
pub mod rtc;
pub mod tty;

/// Program the timer sources. Their PIC lines are unmasked by the caller.
///
/// # Safety
/// Interrupts must be disabled.
#[cfg(target_os = "none")]
pub unsafe fn init() {
    keyboard::init();
    pit::init(crate::config::TIMER_HZ);
    rtc::enable_periodic();
    if let Some(rate) = rtc::rate_for(crate::config::RTC_DEFAULT_HZ) {
        rtc::program_rate(rate);
    }
    crate::log_info!("Drivers subsystem initialized.");
}
