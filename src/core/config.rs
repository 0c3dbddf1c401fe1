//! Compile-time configuration for the kernel
//!
//! These constants control the behavior and resource limits of the RTOS.

use crate::types::OsStkElement;

/// Maximum number of priority levels (one bitmap word)
pub const CFG_PRIO_MAX: usize = 32;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Minimum task stack size in words
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Idle task stack size in words
pub const CFG_STK_SIZE_IDLE: usize = 128;

/// Sentinel painted at the low word of every task stack
pub const CFG_STK_MAGIC: OsStkElement = 0xDEAD_BEEF;

/// Enable round-robin scheduling for same-priority tasks
pub const CFG_SCHED_ROUND_ROBIN_EN: bool = true;

/// Idle task priority
pub const CFG_PRIO_IDLE: u8 = (CFG_PRIO_MAX - 1) as u8;
