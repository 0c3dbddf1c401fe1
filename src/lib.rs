//! A real-time operating system kernel for 32-bit RISC-V, providing:
//! - Priority-based preemptive scheduling with per-priority round-robin
//! - Synchronization primitives (semaphores, mutexes, message queues)
//! - Fixed-block memory pools with blocking allocation
//! - Time management with tick-based delays
//! - Trap-driven context switching for RV32 machine mode

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "riscv32")]
mod cs_impl {
    use critical_section::{set_impl, Impl, RawRestoreState};
    use riscv::register::mstatus;

    struct SingleHartCriticalSection;
    set_impl!(SingleHartCriticalSection);

    unsafe impl Impl for SingleHartCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = mstatus::read().mie();
            unsafe { riscv::interrupt::disable() };
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { riscv::interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
#[cfg(feature = "mem")]
pub mod mem;
pub mod port;
pub mod sync;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{OsError, OsResult};
pub use crate::core::kernel;
pub use crate::core::kernel::{os_init, os_int_exit, os_sched_lock, os_sched_unlock, os_start};
pub use crate::core::list;
pub use crate::core::prio;
pub use crate::core::sched;
pub use crate::core::task;
pub use crate::core::task::{os_task_create, os_task_del, OsTcb};
pub use crate::core::time;
pub use crate::core::time::{os_tick_handler, os_time_dly, os_time_dly_hmsm, os_time_get};
pub use crate::core::types;
pub use crate::core::types::*;

#[cfg(feature = "sem")]
pub use crate::sync::sem;
#[cfg(feature = "mutex")]
pub use crate::sync::mutex;
#[cfg(feature = "queue")]
pub use crate::sync::queue;
