//! Task management module
//!
//! Provides task creation and deletion. A task's TCB and stack storage
//! belong to the caller; the kernel borrows both for the task's lifetime.

mod tcb;

pub use tcb::OsTcb;

use core::ptr::NonNull;

use crate::config::{CFG_PRIO_IDLE, CFG_PRIO_MAX, CFG_STK_MAGIC, CFG_STK_SIZE_MIN};
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::types::{OsPrio, OsStkElement, OsTaskState};

/// Task entry point function type
pub type OsTaskFn = fn(*mut ()) -> !;

/// Create a new task
unsafe fn os_task_create_raw(
    tcb: *mut OsTcb,
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_base: *mut OsStkElement,
    stk_size: usize,
) -> OsResult<()> {
    if tcb.is_null() || stk_base.is_null() {
        return Err(OsError::Param);
    }

    if stk_size < CFG_STK_SIZE_MIN {
        return Err(OsError::Param);
    }

    if prio as usize >= CFG_PRIO_MAX {
        return Err(OsError::Param);
    }

    if is_isr_context() {
        return Err(OsError::Isr);
    }

    critical_section(|_cs| {
        unsafe {
            os_task_create_internal(tcb, name, task_fn, arg, prio, stk_base, stk_size)?;
        }

        if kernel::KERNEL.is_running() {
            crate::sched::os_sched();
        }

        Ok(())
    })
}

/// Create a new task using static references
///
/// # Arguments
/// * `tcb` - Static mutable reference to the Task Control Block
/// * `stack` - Static mutable reference to the stack array
/// * `name` - Task name for debugging
/// * `task_fn` - Task entry point function
/// * `arg` - Argument passed to the task function
/// * `prio` - Task priority (0 = highest)
///
/// # Example
/// ```ignore
/// static mut TASK_TCB: OsTcb = OsTcb::new();
/// static mut TASK_STK: [OsStkElement; 256] = [0; 256];
///
/// fn my_task(_: *mut ()) -> ! {
///     loop { /* ... */ }
/// }
///
/// // In main:
/// os_task_create(
///     unsafe { &mut TASK_TCB },
///     unsafe { &mut TASK_STK },
///     "MyTask",
///     my_task,
///     core::ptr::null_mut(),
///     5,
/// ).expect("Task creation failed");
/// ```
pub fn os_task_create(
    tcb: &'static mut OsTcb,
    stack: &'static mut [OsStkElement],
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
) -> OsResult<()> {
    unsafe {
        os_task_create_raw(
            tcb as *mut OsTcb,
            name,
            task_fn,
            arg,
            prio,
            stack.as_mut_ptr(),
            stack.len(),
        )
    }
}

/// Internal task creation for kernel use
///
/// Caller holds a critical section and has validated the arguments.
#[doc(hidden)]
pub unsafe fn os_task_create_internal(
    tcb: *mut OsTcb,
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_base: *mut OsStkElement,
    stk_size: usize,
) -> OsResult<()> {
    if tcb.is_null() || stk_base.is_null() {
        return Err(OsError::Param);
    }

    let tcb_ref = unsafe { &mut *tcb };
    tcb_ref.init();

    tcb_ref.name = name;
    tcb_ref.prio = prio;
    tcb_ref.base_prio = prio;
    tcb_ref.task_state = OsTaskState::Ready;

    // Paint the overflow sentinel at the low end; the tick handler checks
    // it and the stack pointer against stk_limit on every tick.
    unsafe {
        stk_base.write(CFG_STK_MAGIC);
    }

    let stk_ptr = unsafe { crate::port::os_task_stk_init(task_fn, arg, stk_base, stk_size) };
    tcb_ref.stk_ptr = stk_ptr;
    tcb_ref.stk_base = stk_base;
    tcb_ref.stk_size = stk_size;
    tcb_ref.stk_limit = stk_base;

    tcb_ref.task_entry_addr = task_fn as usize;
    tcb_ref.task_entry_arg = arg;

    let tcb_nonnull = unsafe { NonNull::new_unchecked(tcb) };
    unsafe {
        crate::sched::os_rdy_list_insert(tcb_nonnull);
    }

    Ok(())
}

/// Delete a task
///
/// Marks a READY task (or the caller, when `tcb` is `None`) as DELETED and
/// removes it from the ready structures. The TCB and stack storage remain
/// the caller's; nothing is reclaimed. The idle task cannot be deleted.
pub fn os_task_del(tcb: Option<NonNull<OsTcb>>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::Isr);
    }

    critical_section(|_cs| {
        let tcb_ptr = match tcb {
            Some(ptr) => ptr,
            None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::Param)?,
        };

        let tcb_ref = unsafe { &mut *tcb_ptr.as_ptr() };

        if tcb_ref.prio == CFG_PRIO_IDLE {
            return Err(OsError::Param);
        }

        if !tcb_ref.is_ready() {
            return Err(OsError::Param);
        }

        unsafe {
            crate::sched::os_rdy_list_remove(tcb_ptr);
        }
        tcb_ref.task_state = OsTaskState::Deleted;

        let is_current = unsafe { kernel::tcb_cur_ptr() } == Some(tcb_ptr);
        if is_current {
            crate::sched::os_sched();
        }

        Ok(())
    })
}
