//! Mutex implementation with priority inheritance
//!
//! Mutexes provide recursive mutual exclusion with automatic priority
//! boosting to cap priority inversion. The wait set is priority-ordered,
//! highest first, FIFO among equals. The owner's priority at acquisition
//! is snapshotted in the mutex itself and restored from there at release,
//! so a task holding several mutexes restores correctly when it releases
//! them in LIFO order.

use core::ptr::NonNull;

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::list::TcbList;
use crate::sched;
use crate::task::OsTcb;
use crate::types::{opt, OsNestingCtr, OsObjType, OsOpt, OsPrio, OsTaskState};

/// Mutex with priority inheritance
pub struct OsMutex {
    /// Object type marker
    obj_type: OsObjType,
    /// Priority-ordered list of tasks waiting on this mutex
    pend_list: TcbList,
    /// Task that owns the mutex
    owner: Option<NonNull<OsTcb>>,
    /// Recursion depth
    nesting_ctr: OsNestingCtr,
    /// Owner's effective priority when ownership was granted
    owner_base_prio: OsPrio,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsMutex {
    /// Create a new mutex
    pub const fn new() -> Self {
        OsMutex {
            obj_type: OsObjType::Mutex,
            pend_list: TcbList::new(),
            owner: None,
            nesting_ctr: 0,
            owner_base_prio: 0,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize the mutex
    pub fn create(&mut self, _name: &'static str) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        critical_section(|_cs| {
            self.obj_type = OsObjType::Mutex;
            self.pend_list.init();
            self.owner = None;
            self.nesting_ctr = 0;
            self.owner_base_prio = 0;
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    /// Acquire the mutex
    ///
    /// A free mutex is claimed immediately and re-acquisition by the
    /// owner just deepens the nesting. On contention the caller blocks;
    /// if it outranks the owner, the owner inherits the caller's
    /// priority until release.
    ///
    /// # Arguments
    /// * `pend_opt` - `PEND_NON_BLOCKING` to fail instead of blocking
    ///
    /// # Returns
    /// * `Ok(())` - Mutex acquired
    /// * `Err(OsError::Nesting)` - Recursion depth exhausted
    /// * `Err(OsError::Resource)` - Non-blocking and owned by another task
    pub fn pend(&mut self, pend_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        if self.obj_type != OsObjType::Mutex {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::Param)?;

            if self.owner.is_none() {
                self.owner = Some(cur_tcb_ptr);
                self.nesting_ctr = 1;
                self.owner_base_prio = unsafe { cur_tcb_ptr.as_ref() }.prio;
                return Ok(());
            }

            // Check if current task already owns it
            if self.owner == Some(cur_tcb_ptr) {
                if self.nesting_ctr == OsNestingCtr::MAX {
                    return Err(OsError::Nesting);
                }
                self.nesting_ctr += 1;
                return Ok(());
            }

            // Mutex is owned by another task
            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::Resource);
            }

            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            // Priority inheritance
            let cur_prio = unsafe { cur_tcb_ptr.as_ref() }.prio;

            if let Some(owner_ptr) = self.owner {
                let owner = unsafe { &mut *owner_ptr.as_ptr() };
                if cur_prio < owner.prio {
                    if owner.task_state == OsTaskState::Ready {
                        // Re-home the owner so bitmap and queues track
                        // the boosted priority
                        unsafe { sched::os_rdy_list_change_prio(owner_ptr, cur_prio) };
                    } else {
                        owner.prio = cur_prio;
                    }
                }
            }

            // Block current task
            unsafe {
                let cur_tcb = &mut *cur_tcb_ptr.as_ptr();

                cur_tcb.task_state = OsTaskState::Blocked;
                sched::os_rdy_list_remove(cur_tcb_ptr);

                self.pend_list.insert_by_prio(cur_tcb_ptr);
            }

            sched::os_sched();

            // Resumed: the releasing task made us the owner
            Ok(())
        })
    }

    /// Release the mutex
    ///
    /// Unwinds one level of recursion; at depth zero the owner's
    /// priority is restored from the acquisition snapshot and ownership
    /// passes to the highest-priority waiter, if any.
    ///
    /// # Returns
    /// * `Ok(())` - Released (or recursion unwound one level)
    /// * `Err(OsError::NotOwner)` - Caller does not own the mutex
    pub fn post(&mut self, post_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        if self.obj_type != OsObjType::Mutex {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::Param)?;

            if self.owner != Some(cur_tcb_ptr) {
                return Err(OsError::NotOwner);
            }

            if self.nesting_ctr > 1 {
                self.nesting_ctr -= 1;
                return Ok(());
            }

            // Unlock completely
            self.nesting_ctr = 0;

            // Restore the priority held at acquisition if it was boosted
            let cur_tcb = unsafe { &mut *cur_tcb_ptr.as_ptr() };
            if cur_tcb.prio != self.owner_base_prio {
                if cur_tcb.task_state == OsTaskState::Ready {
                    unsafe { sched::os_rdy_list_change_prio(cur_tcb_ptr, self.owner_base_prio) };
                } else {
                    cur_tcb.prio = self.owner_base_prio;
                }
            }

            if let Some(waiter_ptr) = self.pend_list.pop_head() {
                let waiter = unsafe { &mut *waiter_ptr.as_ptr() };

                waiter.task_state = OsTaskState::Ready;

                self.owner = Some(waiter_ptr);
                self.nesting_ctr = 1;
                self.owner_base_prio = waiter.prio;

                unsafe { sched::os_rdy_list_insert(waiter_ptr) };

                if post_opt & opt::POST_NO_SCHED == 0 {
                    sched::os_sched();
                }
            } else {
                self.owner = None;
            }

            Ok(())
        })
    }

    /// Check if mutex is owned
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    /// Get owner's current priority
    pub fn owner_prio(&self) -> Option<OsPrio> {
        self.owner.map(|ptr| unsafe { ptr.as_ref().prio })
    }

    /// Get recursion depth
    #[inline]
    pub fn nesting(&self) -> OsNestingCtr {
        self.nesting_ctr
    }
}

impl Default for OsMutex {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

pub struct Mutex {
    inner: UnsafeCell<OsMutex>,
}

unsafe impl Sync for Mutex {}
unsafe impl Send for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Mutex {
            inner: UnsafeCell::new(OsMutex::new()),
        }
    }

    pub fn create(&self, name: &'static str) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(name) }
    }

    pub fn lock(&self, opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).pend(opt) }
    }

    pub fn unlock(&self, opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).post(opt) }
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        unsafe { (*self.inner.get()).is_owned() }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
