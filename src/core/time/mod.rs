//! Time management module
//!
//! Provides tick handling and tick-based delays. Sleeping tasks live on a
//! delta-encoded delay list; the tick handler touches one counter per
//! tick no matter how many tasks sleep.

mod dly_list;

pub use dly_list::DelayList;

use core::ptr::NonNull;

use crate::config::{CFG_STK_MAGIC, CFG_TICK_RATE_HZ};
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::task::OsTcb;
use crate::types::{OsTaskState, OsTick};

/// Time delay in ticks
///
/// Delays the calling task for the specified number of system ticks.
/// The task leaves its ready queue and joins the delay list; the tick
/// handler moves it back when the delay expires.
///
/// A delay of zero ticks is a yield: the caller rotates to the tail of
/// its own priority queue and returns once it is scheduled again, which
/// is immediately when it is alone at its priority.
///
/// # Arguments
/// * `ticks` - Number of ticks to delay
///
/// # Returns
/// * `Ok(())` - Delay completed
/// * `Err(OsError::Isr)` - Cannot delay from ISR
/// * `Err(OsError::SchedLocked)` - Scheduler is locked
pub fn os_time_dly(ticks: OsTick) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::Isr);
    }

    if kernel::KERNEL.sched_lock_nesting() > 0 {
        return Err(OsError::SchedLocked);
    }

    if ticks == 0 {
        sched::os_sched_round_robin();
        return Ok(());
    }

    critical_section(|_cs| {
        unsafe {
            if let Some(cur_tcb) = kernel::tcb_cur_ptr() {
                let tcb = &mut *cur_tcb.as_ptr();

                tcb.task_state = OsTaskState::Blocked;
                sched::os_rdy_list_remove(cur_tcb);

                kernel::dly_list().insert(cur_tcb, ticks);
            }
        }
    });

    sched::os_sched();

    Ok(())
}

/// Time delay in hours, minutes, seconds, milliseconds
///
/// # Arguments
/// * `hours` - Hours (0-999)
/// * `minutes` - Minutes (0-59)
/// * `seconds` - Seconds (0-59)
/// * `milliseconds` - Milliseconds (0-999)
pub fn os_time_dly_hmsm(hours: u16, minutes: u8, seconds: u8, milliseconds: u16) -> OsResult<()> {
    if minutes > 59 || seconds > 59 || milliseconds > 999 {
        return Err(OsError::Param);
    }

    let total_ms = (hours as u32) * 3600_000
        + (minutes as u32) * 60_000
        + (seconds as u32) * 1000
        + (milliseconds as u32);

    let ticks = (total_ms / 1000) * CFG_TICK_RATE_HZ + ((total_ms % 1000) * CFG_TICK_RATE_HZ) / 1000;

    os_time_dly(ticks)
}

/// Resume a delayed task before its delay expires
///
/// The task's leftover delta is folded into its successor on the delay
/// list, so other sleepers keep their wake instants.
pub fn os_time_dly_resume(tcb: NonNull<OsTcb>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::Isr);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if !tcb_ref.is_blocked() {
            return Err(OsError::Param);
        }

        unsafe {
            kernel::dly_list().remove(tcb);
        }

        tcb_ref.task_state = OsTaskState::Ready;
        unsafe { sched::os_rdy_list_insert(tcb) };

        sched::os_sched();

        Ok(())
    })
}

/// Get current tick count
#[inline]
pub fn os_time_get() -> OsTick {
    kernel::KERNEL.tick_get()
}

/// Tick handler
///
/// Called from the tick interrupt. Validates the running task's stack,
/// advances the timebase, wakes expired delays, rotates same-priority
/// peers, and leaves the switch request to the ISR exit path.
pub fn os_tick_handler() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    kernel::KERNEL.int_enter();

    critical_section(|_cs| {
        check_running_stack();

        kernel::KERNEL.tick_increment();

        process_delayed_tasks();

        sched::os_sched_round_robin();
    });

    kernel::os_int_exit();
}

/// Validate the running task's stack sentinel and pointer
///
/// The low word of every task stack is painted at creation; a changed
/// word or a stack pointer below the limit is fatal.
fn check_running_stack() {
    unsafe {
        if let Some(cur_tcb) = kernel::tcb_cur_ptr() {
            let tcb = cur_tcb.as_ref();

            if tcb.stk_limit.is_null() {
                return;
            }

            if tcb.stk_limit.read() != CFG_STK_MAGIC || tcb.stk_ptr < tcb.stk_limit {
                kernel::os_fatal(OsError::StkOvf);
            }
        }
    }
}

/// Wake every task whose cumulative delay reached zero on this tick
///
/// Only the head's delta is decremented; zero-delta followers share the
/// head's wake instant and drain in the same pass. The head is
/// null-checked before any delta is touched.
fn process_delayed_tasks() {
    unsafe {
        let dly = kernel::dly_list();

        dly.tick();

        while let Some(tcb_ptr) = dly.pop_expired() {
            let tcb = &mut *tcb_ptr.as_ptr();
            tcb.task_state = OsTaskState::Ready;
            sched::os_rdy_list_insert(tcb_ptr);
        }
    }
}
