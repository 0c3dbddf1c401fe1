//! Bounded message queue
//!
//! A ring buffer of fixed-size messages copied by value into a
//! caller-provided byte buffer. Senders never block: a full queue is an
//! error. Receivers may block; a send wakes the longest-waiting receiver
//! but leaves the message in the ring for it to copy out on resumption,
//! so the ring stays the single source of truth.

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::list::TcbList;
use crate::sched;
use crate::types::{opt, OsObjType, OsOpt, OsTaskState};

/// Bounded queue of fixed-size messages
pub struct OsQueue {
    /// Object type marker
    obj_type: OsObjType,
    /// FIFO of tasks waiting to receive
    pend_list: TcbList,
    /// Caller-provided message storage
    buf: *mut u8,
    /// Size of one message in bytes
    msg_size: usize,
    /// Capacity in messages
    capacity: usize,
    /// Messages currently stored
    count: usize,
    /// Write index
    head: usize,
    /// Read index
    tail: usize,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsQueue {
    /// Create a new, unconfigured queue
    pub const fn new() -> Self {
        OsQueue {
            obj_type: OsObjType::Queue,
            pend_list: TcbList::new(),
            buf: core::ptr::null_mut(),
            msg_size: 0,
            capacity: 0,
            count: 0,
            head: 0,
            tail: 0,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize the queue over a caller-provided buffer
    ///
    /// The buffer must hold `capacity` messages of `msg_size` bytes; it
    /// is borrowed for the queue's lifetime.
    pub fn create(
        &mut self,
        buf: *mut u8,
        buf_len: usize,
        msg_size: usize,
        capacity: usize,
        _name: &'static str,
    ) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        if buf.is_null() || msg_size == 0 || capacity == 0 {
            return Err(OsError::Param);
        }

        if buf_len < msg_size * capacity {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            self.obj_type = OsObjType::Queue;
            self.pend_list.init();
            self.buf = buf;
            self.msg_size = msg_size;
            self.capacity = capacity;
            self.count = 0;
            self.head = 0;
            self.tail = 0;
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    /// Copy one message into the ring at the write index
    ///
    /// Caller holds a critical section and has checked for space.
    unsafe fn enqueue(&mut self, msg: &[u8]) {
        unsafe {
            core::ptr::copy_nonoverlapping(
                msg.as_ptr(),
                self.buf.add(self.head * self.msg_size),
                self.msg_size,
            );
        }
        self.head = (self.head + 1) % self.capacity;
        self.count += 1;
    }

    /// Copy one message out of the ring at the read index
    ///
    /// Caller holds a critical section and has checked for data.
    unsafe fn dequeue(&mut self, out: &mut [u8]) {
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.buf.add(self.tail * self.msg_size),
                out.as_mut_ptr(),
                self.msg_size,
            );
        }
        self.tail = (self.tail + 1) % self.capacity;
        self.count -= 1;
    }

    /// Send a message (task context, never blocks)
    ///
    /// # Arguments
    /// * `msg` - Exactly one message; length must equal the message size
    /// * `post_opt` - `POST_NO_SCHED` to suppress the immediate reschedule
    ///
    /// # Returns
    /// * `Ok(())` - Message enqueued
    /// * `Err(OsError::QFull)` - Queue is full
    pub fn send(&mut self, msg: &[u8], post_opt: OsOpt) -> OsResult<()> {
        if self.obj_type != OsObjType::Queue || self.buf.is_null() {
            return Err(OsError::Param);
        }

        if msg.len() != self.msg_size {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            if self.count == self.capacity {
                return Err(OsError::QFull);
            }

            unsafe { self.enqueue(msg) };

            // One receiver per message posted; it copies out on resumption
            if let Some(tcb_ptr) = self.pend_list.pop_head() {
                let tcb = unsafe { &mut *tcb_ptr.as_ptr() };

                tcb.task_state = OsTaskState::Ready;
                unsafe { sched::os_rdy_list_insert(tcb_ptr) };

                if post_opt & opt::POST_NO_SCHED == 0 && !is_isr_context() {
                    sched::os_sched();
                }
            }

            Ok(())
        })
    }

    /// Receive a message (task context, may block)
    ///
    /// Blocks while the queue is empty; on each resumption the queue is
    /// re-tested, since another receiver may have drained the message
    /// that triggered the wake.
    ///
    /// # Arguments
    /// * `out` - Destination; length must equal the message size
    /// * `pend_opt` - `PEND_NON_BLOCKING` to fail instead of blocking
    pub fn receive(&mut self, out: &mut [u8], pend_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        if self.obj_type != OsObjType::Queue || self.buf.is_null() {
            return Err(OsError::Param);
        }

        if out.len() != self.msg_size {
            return Err(OsError::Param);
        }

        loop {
            let blocked = critical_section(|_cs| {
                if self.count > 0 {
                    unsafe { self.dequeue(out) };
                    return Ok(false);
                }

                if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                    return Err(OsError::Resource);
                }

                if kernel::KERNEL.sched_lock_nesting() > 0 {
                    return Err(OsError::SchedLocked);
                }

                unsafe {
                    if let Some(cur_tcb_ptr) = kernel::tcb_cur_ptr() {
                        let cur_tcb = &mut *cur_tcb_ptr.as_ptr();

                        cur_tcb.task_state = OsTaskState::Blocked;
                        sched::os_rdy_list_remove(cur_tcb_ptr);

                        self.pend_list.insert_tail(cur_tcb_ptr);
                    }
                }

                sched::os_sched();
                Ok(true)
            })?;

            if !blocked {
                return Ok(());
            }
            // The switch lands here once a sender wakes us; loop and
            // re-test the ring
        }
    }

    /// Send a message from an interrupt handler
    ///
    /// Never invokes the task-level scheduler; a released receiver that
    /// outranks the running task is reported through `higher_prio_woken`
    /// and the ISR exit path performs the switch.
    pub fn send_from_isr(&mut self, msg: &[u8], higher_prio_woken: &mut bool) -> OsResult<()> {
        if self.obj_type != OsObjType::Queue || self.buf.is_null() {
            return Err(OsError::Param);
        }

        if msg.len() != self.msg_size {
            return Err(OsError::Param);
        }

        *higher_prio_woken = false;

        critical_section(|_cs| {
            if self.count == self.capacity {
                return Err(OsError::QFull);
            }

            unsafe { self.enqueue(msg) };

            if let Some(tcb_ptr) = self.pend_list.pop_head() {
                let tcb = unsafe { &mut *tcb_ptr.as_ptr() };

                tcb.task_state = OsTaskState::Ready;

                unsafe {
                    sched::os_rdy_list_insert(tcb_ptr);
                    *higher_prio_woken = tcb.prio < kernel::prio_cur();
                }
            }

            Ok(())
        })
    }

    /// Receive a message from an interrupt handler (never blocks)
    ///
    /// # Returns
    /// * `Err(OsError::Resource)` - Queue is empty
    pub fn receive_from_isr(&mut self, out: &mut [u8]) -> OsResult<()> {
        if self.obj_type != OsObjType::Queue || self.buf.is_null() {
            return Err(OsError::Param);
        }

        if out.len() != self.msg_size {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            if self.count == 0 {
                return Err(OsError::Resource);
            }

            unsafe { self.dequeue(out) };
            Ok(())
        })
    }

    /// Messages currently stored
    #[inline(always)]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Current write index
    #[inline(always)]
    pub fn head(&self) -> usize {
        self.head
    }

    /// Current read index
    #[inline(always)]
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Check if the queue is full
    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }
}

impl Default for OsQueue {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsQueue {}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

pub struct Queue {
    inner: UnsafeCell<OsQueue>,
}

unsafe impl Sync for Queue {}
unsafe impl Send for Queue {}

impl Queue {
    pub const fn new() -> Self {
        Queue {
            inner: UnsafeCell::new(OsQueue::new()),
        }
    }

    pub fn create(
        &self,
        buf: &'static mut [u8],
        msg_size: usize,
        capacity: usize,
        name: &'static str,
    ) -> OsResult<()> {
        let buf_len = buf.len();
        unsafe { (*self.inner.get()).create(buf.as_mut_ptr(), buf_len, msg_size, capacity, name) }
    }

    pub fn send(&self, msg: &[u8], opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).send(msg, opt) }
    }

    pub fn receive(&self, out: &mut [u8], opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).receive(out, opt) }
    }

    pub fn send_from_isr(&self, msg: &[u8], higher_prio_woken: &mut bool) -> OsResult<()> {
        unsafe { (*self.inner.get()).send_from_isr(msg, higher_prio_woken) }
    }

    pub fn receive_from_isr(&self, out: &mut [u8]) -> OsResult<()> {
        unsafe { (*self.inner.get()).receive_from_isr(out) }
    }

    #[inline]
    pub fn count(&self) -> usize {
        unsafe { (*self.inner.get()).count() }
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}
