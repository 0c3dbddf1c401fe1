//! Port layer - CPU-specific implementations
//!
//! This module provides the hardware abstraction for context switching,
//! the tick timer, the software-interrupt request, and task stack frame
//! initialization. The kernel core uses it only through this contract.

#[cfg(target_arch = "riscv32")]
pub mod riscv32;

#[cfg(target_arch = "riscv32")]
pub use riscv32::*;

// Stub implementations for non-RISC-V targets (for host testing)
#[cfg(not(target_arch = "riscv32"))]
pub mod stub {
    use crate::task::OsTaskFn;
    use crate::types::OsStkElement;

    /// Timebase frequency stand-in for host builds
    pub const MTIME_FREQ_HZ: u32 = 10_000_000;

    pub unsafe fn os_start_high_rdy() {
        panic!("os_start_high_rdy not available on this platform");
    }

    pub fn os_ctx_sw() {
        // No-op for testing
    }

    pub fn os_int_ctx_sw() {
        // No-op for testing
    }

    pub unsafe fn os_task_stk_init(
        _task_fn: OsTaskFn,
        _arg: *mut (),
        stk_base: *mut OsStkElement,
        stk_size: usize,
    ) -> *mut OsStkElement {
        // Return top of stack for testing
        unsafe { stk_base.add(stk_size - 1) }
    }

    pub fn os_cpu_systick_init(_cnts: u32) {
        // No-op for testing
    }
}

#[cfg(not(target_arch = "riscv32"))]
pub use stub::*;
