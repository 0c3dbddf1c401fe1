//! Task Control Block (TCB) definition
//!
//! The TCB contains all the information needed to manage a task. Its
//! storage is provided by the caller of task creation; the kernel borrows
//! it for the task's lifetime and never frees it.

use core::ptr::NonNull;

use crate::types::{OsPrio, OsStkElement, OsTaskState, OsTick};

/// Task Control Block
///
/// `stk_ptr` must stay the first field: the context-switch assembly loads
/// the saved stack pointer from offset 0 of the TCB.
#[repr(C)]
pub struct OsTcb {
    /// Current stack pointer
    pub stk_ptr: *mut OsStkElement,

    // ============ Stack information ============
    /// Base of stack (low address); the overflow sentinel lives here
    pub stk_base: *mut OsStkElement,
    /// Stack limit pointer; the stack pointer must never cross below it
    pub stk_limit: *mut OsStkElement,
    /// Stack size in words
    pub stk_size: usize,

    // ============ Task identification ============
    /// Task name
    pub name: &'static str,

    // ============ List links ============
    // A task is in exactly one list at a time (a ready queue, the delay
    // list, or a wait set), so one link pair serves them all.
    /// Next TCB in the containing list
    pub next_ptr: Option<NonNull<OsTcb>>,
    /// Previous TCB in the containing list
    pub prev_ptr: Option<NonNull<OsTcb>>,

    // ============ Delay ============
    /// Remaining delay ticks; a delta while on the delay list
    pub tick_remain: OsTick,

    // ============ Priority ============
    /// Current (effective) priority; may differ from base during inheritance
    pub prio: OsPrio,
    /// Original priority from task creation
    pub base_prio: OsPrio,

    // ============ State ============
    /// Current task state
    pub task_state: OsTaskState,

    // ============ Task entry point ============
    /// Task function address
    pub task_entry_addr: usize,
    /// Task argument
    pub task_entry_arg: *mut (),
}

impl OsTcb {
    /// Create a new, uninitialized TCB
    pub const fn new() -> Self {
        OsTcb {
            stk_ptr: core::ptr::null_mut(),

            stk_base: core::ptr::null_mut(),
            stk_limit: core::ptr::null_mut(),
            stk_size: 0,

            name: "",

            next_ptr: None,
            prev_ptr: None,

            tick_remain: 0,

            prio: 0,
            base_prio: 0,

            task_state: OsTaskState::Ready,

            task_entry_addr: 0,
            task_entry_arg: core::ptr::null_mut(),
        }
    }

    /// Initialize TCB to default values
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Check if task is ready to run
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.task_state == OsTaskState::Ready
    }

    /// Check if task is blocked (delayed or waiting on an object)
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.task_state == OsTaskState::Blocked
    }
}

impl Default for OsTcb {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsTcb {}
unsafe impl Sync for OsTcb {}
