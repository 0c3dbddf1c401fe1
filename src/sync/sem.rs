//! Semaphore implementation
//!
//! Counting semaphores for task synchronization and resource counting.
//! The wait set is strict FIFO: for N posts and N same-priority waiters,
//! the k-th task to wait is the k-th released. Waits are indefinite; the
//! only time-bounded wait in the kernel is `os_time_dly`.

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::list::TcbList;
use crate::sched;
use crate::types::{opt, OsObjType, OsOpt, OsSemCtr, OsTaskState};

/// Counting semaphore
pub struct OsSem {
    /// Object type marker
    obj_type: OsObjType,
    /// FIFO of tasks waiting on this semaphore
    pend_list: TcbList,
    /// Current count
    count: OsSemCtr,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsSem {
    /// Create a new semaphore
    ///
    /// # Arguments
    /// * `count` - Initial count value
    pub const fn new(count: OsSemCtr) -> Self {
        OsSem {
            obj_type: OsObjType::Sem,
            pend_list: TcbList::new(),
            count,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize/create the semaphore
    pub fn create(&mut self, count: OsSemCtr, _name: &'static str) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        critical_section(|_cs| {
            self.obj_type = OsObjType::Sem;
            self.pend_list.init();
            self.count = count;
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    /// Wait on (pend) the semaphore
    ///
    /// # Arguments
    /// * `pend_opt` - `PEND_NON_BLOCKING` to fail instead of blocking
    ///
    /// # Returns
    /// * `Ok(count)` - Semaphore acquired, returns remaining count
    /// * `Err(OsError::Resource)` - Non-blocking and not available
    pub fn pend(&mut self, pend_opt: OsOpt) -> OsResult<OsSemCtr> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        if self.obj_type != OsObjType::Sem {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            if self.count > 0 {
                self.count -= 1;
                return Ok(self.count);
            }

            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::Resource);
            }

            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            // Block current task
            unsafe {
                if let Some(cur_tcb_ptr) = kernel::tcb_cur_ptr() {
                    let cur_tcb = &mut *cur_tcb_ptr.as_ptr();

                    cur_tcb.task_state = OsTaskState::Blocked;
                    sched::os_rdy_list_remove(cur_tcb_ptr);

                    self.pend_list.insert_tail(cur_tcb_ptr);
                }
            }

            sched::os_sched();

            // Resumed by a post; the poster already consumed the token
            // for us, so the count is handed over untouched
            Ok(self.count)
        })
    }

    /// Signal (post) the semaphore
    ///
    /// Releases the head of the wait set if any task is waiting; the
    /// count only grows when nobody waits.
    ///
    /// # Arguments
    /// * `post_opt` - `POST_NO_SCHED` to suppress the immediate reschedule
    ///
    /// # Returns
    /// * `Ok(count)` - Count after the post
    /// * `Err(OsError::SemOvf)` - Count already at its maximum
    pub fn post(&mut self, post_opt: OsOpt) -> OsResult<OsSemCtr> {
        if self.obj_type != OsObjType::Sem {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            if let Some(tcb_ptr) = self.pend_list.pop_head() {
                let tcb = unsafe { &mut *tcb_ptr.as_ptr() };

                tcb.task_state = OsTaskState::Ready;

                unsafe { sched::os_rdy_list_insert(tcb_ptr) };

                if post_opt & opt::POST_NO_SCHED == 0 && !is_isr_context() {
                    sched::os_sched();
                }

                Ok(self.count)
            } else {
                if self.count == OsSemCtr::MAX {
                    return Err(OsError::SemOvf);
                }
                self.count += 1;
                Ok(self.count)
            }
        })
    }

    /// Signal the semaphore from an interrupt handler
    ///
    /// Never invokes the task-level scheduler. When the released task
    /// outranks the running one, `higher_prio_woken` is set and the ISR
    /// exit path performs the switch.
    pub fn post_from_isr(&mut self, higher_prio_woken: &mut bool) -> OsResult<OsSemCtr> {
        if self.obj_type != OsObjType::Sem {
            return Err(OsError::Param);
        }

        *higher_prio_woken = false;

        critical_section(|_cs| {
            if let Some(tcb_ptr) = self.pend_list.pop_head() {
                let tcb = unsafe { &mut *tcb_ptr.as_ptr() };

                tcb.task_state = OsTaskState::Ready;

                unsafe {
                    sched::os_rdy_list_insert(tcb_ptr);
                    *higher_prio_woken = tcb.prio < kernel::prio_cur();
                }

                Ok(self.count)
            } else {
                if self.count == OsSemCtr::MAX {
                    return Err(OsError::SemOvf);
                }
                self.count += 1;
                Ok(self.count)
            }
        })
    }

    /// Get current semaphore count
    #[inline(always)]
    pub fn count(&self) -> OsSemCtr {
        self.count
    }

    /// Check whether any task is waiting
    #[inline(always)]
    pub fn has_waiters(&self) -> bool {
        !self.pend_list.is_empty()
    }
}

impl Default for OsSem {
    fn default() -> Self {
        Self::new(0)
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

pub struct Semaphore {
    inner: UnsafeCell<OsSem>,
}

unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    pub const fn new(count: OsSemCtr) -> Self {
        Semaphore {
            inner: UnsafeCell::new(OsSem::new(count)),
        }
    }

    pub fn create(&self, count: OsSemCtr, name: &'static str) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(count, name) }
    }

    pub fn wait(&self, opt: OsOpt) -> OsResult<OsSemCtr> {
        unsafe { (*self.inner.get()).pend(opt) }
    }

    pub fn signal(&self, opt: OsOpt) -> OsResult<OsSemCtr> {
        unsafe { (*self.inner.get()).post(opt) }
    }

    pub fn signal_from_isr(&self, higher_prio_woken: &mut bool) -> OsResult<OsSemCtr> {
        unsafe { (*self.inner.get()).post_from_isr(higher_prio_woken) }
    }

    #[inline]
    pub fn count(&self) -> OsSemCtr {
        unsafe { (*self.inner.get()).count() }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
