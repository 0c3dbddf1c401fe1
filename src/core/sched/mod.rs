//! Scheduler module
//!
//! Priority-based preemptive scheduler with round-robin for same priority.
//! The ready-queue helpers here are the only paths that mutate the
//! priority bitmap, which keeps bit p set exactly when ready queue p is
//! non-empty.

use core::ptr::NonNull;

use crate::config::CFG_SCHED_ROUND_ROBIN_EN;
use crate::critical::{critical_section, is_isr_context, CriticalSection};

use crate::kernel;
use crate::task::OsTcb;
use crate::types::OsPrio;

/// Main scheduling point
///
/// Determines the highest priority ready task and requests a context
/// switch (via the software interrupt) if it differs from the current
/// task. Called after any operation that may change task readiness:
/// blocking, waking, releasing a semaphore/mutex, delay insertion.
///
/// The ready structures always hold at least the idle task, so the
/// lookup cannot come up empty while the kernel runs.
pub fn os_sched() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    if is_isr_context() {
        return;
    }

    if kernel::KERNEL.sched_lock_nesting() > 0 {
        return;
    }

    let _cs = CriticalSection::enter();

    let high_prio = unsafe { kernel::prio_table().get_highest() };

    unsafe {
        if let Some(high_rdy) = kernel::rdy_list(high_prio).head() {
            kernel::set_prio_high_rdy(high_prio);
            kernel::set_tcb_high_rdy_ptr(Some(high_rdy));

            if Some(high_rdy) != kernel::tcb_cur_ptr() {
                crate::port::os_ctx_sw();
            } else {
                // No switch; keep the recorded priority of the running
                // task current (it may have just been restored or boosted)
                kernel::set_prio_cur(high_prio);
            }
        }
    }
}

/// Round-robin scheduling for tasks at the same priority
///
/// Called once per tick. If the running task is still ready and shares
/// its priority queue with at least one other task, it rotates to the
/// tail and the new head becomes the switch target.
pub fn os_sched_round_robin() {
    if !CFG_SCHED_ROUND_ROBIN_EN {
        return;
    }

    if !kernel::KERNEL.is_running() {
        return;
    }

    if kernel::KERNEL.sched_lock_nesting() > 0 {
        return;
    }

    critical_section(|_cs| {
        unsafe {
            if let Some(cur_tcb_ptr) = kernel::tcb_cur_ptr() {
                let cur_tcb = &*cur_tcb_ptr.as_ptr();

                if !cur_tcb.is_ready() {
                    return;
                }

                let prio = cur_tcb.prio;
                let rdy_list = kernel::rdy_list(prio);

                // Only rotate if more than one task at this priority
                if rdy_list.head() != rdy_list.tail() {
                    rdy_list.remove(cur_tcb_ptr);
                    rdy_list.insert_tail(cur_tcb_ptr);

                    if let Some(new_head) = rdy_list.head() {
                        kernel::set_prio_high_rdy(prio);
                        kernel::set_tcb_high_rdy_ptr(Some(new_head));
                    }

                    crate::port::os_ctx_sw();
                }
            }
        }
    });
}

/// Make a task ready
pub(crate) unsafe fn os_rdy_list_insert(tcb: NonNull<OsTcb>) {
    let prio = unsafe { tcb.as_ref() }.prio;

    unsafe {
        kernel::rdy_list(prio).insert_tail(tcb);
        kernel::prio_table().insert(prio);
    }
}

/// Remove a task from its ready queue
pub(crate) unsafe fn os_rdy_list_remove(tcb: NonNull<OsTcb>) {
    let prio = unsafe { tcb.as_ref() }.prio;

    unsafe {
        let rdy_list = kernel::rdy_list(prio);
        rdy_list.remove(tcb);

        if rdy_list.is_empty() {
            kernel::prio_table().remove(prio);
        }
    }
}

/// Move a ready task to a different priority
///
/// Used by priority inheritance: the task is pulled from its old queue
/// (clearing the bit if that queue drained) and appended to the new one,
/// so bitmap and queues stay consistent with the changed priority.
pub(crate) unsafe fn os_rdy_list_change_prio(tcb: NonNull<OsTcb>, new_prio: OsPrio) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };
    let old_prio = tcb_ref.prio;

    if old_prio == new_prio {
        return;
    }

    unsafe {
        let old_rdy_list = kernel::rdy_list(old_prio);
        old_rdy_list.remove(tcb);
        if old_rdy_list.is_empty() {
            kernel::prio_table().remove(old_prio);
        }
    }

    tcb_ref.prio = new_prio;

    unsafe {
        kernel::rdy_list(new_prio).insert_tail(tcb);
        kernel::prio_table().insert(new_prio);
    }
}
