//! Delay list - delta-encoded sorted list of sleeping tasks
//!
//! Tasks are kept in wakeup order, but each node stores only the gap in
//! ticks between its own wakeup and its predecessor's (the head stores
//! the gap from "now"). The tick handler therefore decrements a single
//! counter per tick regardless of how many tasks sleep. The sum of deltas
//! from the head to any node equals that node's time-until-wake.

use core::ptr::NonNull;

use crate::task::OsTcb;
use crate::types::OsTick;

/// Delta-encoded delay list
#[derive(Debug)]
pub struct DelayList {
    head: Option<NonNull<OsTcb>>,
    tail: Option<NonNull<OsTcb>>,
}

impl DelayList {
    /// Create a new empty delay list
    pub const fn new() -> Self {
        DelayList {
            head: None,
            tail: None,
        }
    }

    /// Initialize/reset the delay list
    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
    }

    /// Get head of list (next task to wake)
    #[inline]
    pub fn head(&self) -> Option<NonNull<OsTcb>> {
        self.head
    }

    /// Check if list is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Insert a task due in `ticks` ticks from now
    ///
    /// Walks the list consuming each node's delta from `ticks`; the task
    /// lands where its leftover is smaller than the next node's delta and
    /// that node's delta is re-normalized. A leftover of zero appends
    /// after a node due at the same instant, preserving FIFO wake order.
    ///
    /// # Safety
    /// Caller must ensure tcb is valid and not already in any list.
    pub fn insert(&mut self, tcb: NonNull<OsTcb>, ticks: OsTick) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        let mut remaining = ticks;

        let mut iter = self.head;
        while let Some(cur_ptr) = iter {
            let cur = unsafe { &mut *cur_ptr.as_ptr() };

            if remaining < cur.tick_remain {
                // Insert before `cur`; its delta shrinks by our leftover
                cur.tick_remain -= remaining;
                tcb_ref.tick_remain = remaining;

                tcb_ref.next_ptr = Some(cur_ptr);
                tcb_ref.prev_ptr = cur.prev_ptr;

                match cur.prev_ptr {
                    Some(prev) => {
                        unsafe { (*prev.as_ptr()).next_ptr = Some(tcb) };
                    }
                    None => {
                        self.head = Some(tcb);
                    }
                }
                cur.prev_ptr = Some(tcb);
                return;
            }

            remaining -= cur.tick_remain;
            iter = cur.next_ptr;
        }

        // End reached: append with the final leftover as delta
        tcb_ref.tick_remain = remaining;
        tcb_ref.next_ptr = None;
        tcb_ref.prev_ptr = self.tail;

        match self.tail {
            Some(tail) => {
                unsafe { (*tail.as_ptr()).next_ptr = Some(tcb) };
            }
            None => {
                self.head = Some(tcb);
            }
        }
        self.tail = Some(tcb);
    }

    /// Remove a task before its delay expires
    ///
    /// The node's remaining delta is folded into its successor so every
    /// other task still wakes at its original instant.
    pub fn remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if let Some(next) = tcb_ref.next_ptr {
            unsafe { (*next.as_ptr()).tick_remain += tcb_ref.tick_remain };
        }

        match tcb_ref.prev_ptr {
            Some(prev) => {
                unsafe { (*prev.as_ptr()).next_ptr = tcb_ref.next_ptr };
            }
            None => {
                self.head = tcb_ref.next_ptr;
            }
        }

        match tcb_ref.next_ptr {
            Some(next) => {
                unsafe { (*next.as_ptr()).prev_ptr = tcb_ref.prev_ptr };
            }
            None => {
                self.tail = tcb_ref.prev_ptr;
            }
        }

        tcb_ref.prev_ptr = None;
        tcb_ref.next_ptr = None;
        tcb_ref.tick_remain = 0;
    }

    /// Advance time by one tick: decrement the head's delta
    pub fn tick(&mut self) {
        if let Some(head) = self.head {
            let head_ref = unsafe { &mut *head.as_ptr() };
            head_ref.tick_remain = head_ref.tick_remain.saturating_sub(1);
        }
    }

    /// Detach and return the head if its delta reached zero
    ///
    /// Called in a loop after [`tick`](Self::tick): zero-delta followers
    /// share their predecessor's wake instant and all come due on the
    /// same tick.
    pub fn pop_expired(&mut self) -> Option<NonNull<OsTcb>> {
        let head = self.head?;

        if unsafe { head.as_ref() }.tick_remain != 0 {
            return None;
        }

        let head_ref = unsafe { &mut *head.as_ptr() };
        self.head = head_ref.next_ptr;
        match head_ref.next_ptr {
            Some(next) => {
                unsafe { (*next.as_ptr()).prev_ptr = None };
            }
            None => {
                self.tail = None;
            }
        }

        head_ref.prev_ptr = None;
        head_ref.next_ptr = None;
        Some(head)
    }
}

impl Default for DelayList {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: DelayList is only modified within critical sections
unsafe impl Send for DelayList {}
unsafe impl Sync for DelayList {}
