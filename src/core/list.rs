//! Intrusive doubly-linked TCB list
//!
//! One list type backs every ready queue and every wait set. The TCB is
//! itself the node: each carries a single prev/next pair and belongs to at
//! most one list at any moment. Removal is O(1) given the node. The list
//! is not thread-safe on its own; callers hold a critical section.

use core::ptr::NonNull;

use crate::task::OsTcb;

/// Intrusive FIFO of TCBs with head and tail
#[derive(Debug)]
pub struct TcbList {
    head: Option<NonNull<OsTcb>>,
    tail: Option<NonNull<OsTcb>>,
}

impl TcbList {
    /// Create a new empty list
    pub const fn new() -> Self {
        TcbList {
            head: None,
            tail: None,
        }
    }

    /// Initialize/reset the list
    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
    }

    /// Get head of list (first to be scheduled / released)
    #[inline]
    pub fn head(&self) -> Option<NonNull<OsTcb>> {
        self.head
    }

    /// Get tail of list
    #[inline]
    pub fn tail(&self) -> Option<NonNull<OsTcb>> {
        self.tail
    }

    /// Check if list is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Insert TCB at the tail of the list (FIFO order)
    ///
    /// # Safety
    /// Caller must ensure tcb is valid and not already in any list.
    pub fn insert_tail(&mut self, tcb: NonNull<OsTcb>) {
        // SAFETY: We have exclusive access via critical section
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

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

    /// Insert in priority order
    ///
    /// Strictly higher priority (lower number) precedes; equal priorities
    /// keep FIFO order of arrival.
    pub fn insert_by_prio(&mut self, tcb: NonNull<OsTcb>) {
        let prio = unsafe { tcb.as_ref() }.prio;

        let mut current = self.head;
        let mut prev: Option<NonNull<OsTcb>> = None;

        while let Some(cur_ptr) = current {
            let cur_ref = unsafe { cur_ptr.as_ref() };
            if prio < cur_ref.prio {
                break;
            }
            prev = current;
            current = cur_ref.next_ptr;
        }

        let tcb_mut = unsafe { &mut *tcb.as_ptr() };
        tcb_mut.prev_ptr = prev;
        tcb_mut.next_ptr = current;

        match prev {
            Some(p) => {
                unsafe { (*p.as_ptr()).next_ptr = Some(tcb) };
            }
            None => {
                self.head = Some(tcb);
            }
        }

        match current {
            Some(c) => {
                unsafe { (*c.as_ptr()).prev_ptr = Some(tcb) };
            }
            None => {
                self.tail = Some(tcb);
            }
        }
    }

    /// Remove a TCB from the list
    ///
    /// # Safety
    /// Caller must ensure tcb is valid and is in this list.
    pub fn remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

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
    }

    /// Detach and return the head of the list
    pub fn pop_head(&mut self) -> Option<NonNull<OsTcb>> {
        let head = self.head?;
        self.remove(head);
        Some(head)
    }
}

impl Default for TcbList {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: TcbList is only modified within critical sections
unsafe impl Send for TcbList {}
unsafe impl Sync for TcbList {}

impl Copy for TcbList {}

impl Clone for TcbList {
    fn clone(&self) -> Self {
        *self
    }
}
