//! Language items and panic plumbing

// Route defmt output over RTT on the real target
#[cfg(all(feature = "defmt", target_arch = "riscv32"))]
use defmt_rtt as _;

// Panic handler when defmt is enabled: report, then park the hart
#[cfg(all(feature = "defmt", target_arch = "riscv32"))]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    unsafe { riscv::interrupt::disable() };
    defmt::error!("kernel panic");
    loop {
        unsafe { riscv::asm::wfi() };
    }
}

// Panic handler when defmt is disabled
#[cfg(all(not(feature = "defmt"), target_arch = "riscv32"))]
use panic_halt as _;

// Defmt timestamp in kernel ticks
#[cfg(all(feature = "defmt", target_arch = "riscv32"))]
defmt::timestamp!("{=u32}", crate::core::kernel::KERNEL.tick_get());
