//! Fixed-block memory pool
//!
//! O(1) allocation and release of uniform blocks with no fragmentation.
//! The free list is threaded through the first machine word of each free
//! block; there is no sidecar metadata. Exhausted pools block requesters
//! on a FIFO wait set with the same block-and-retest discipline as queue
//! receive.

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::list::TcbList;
use crate::sched;
use crate::types::{opt, OsObjType, OsOpt, OsTaskState};

/// Fixed-block memory pool
pub struct OsMemPool {
    /// Object type marker
    obj_type: OsObjType,
    /// FIFO of tasks waiting for a free block
    pend_list: TcbList,
    /// Pool base address
    addr: *mut u8,
    /// Head of the free list (null when exhausted)
    free_list: *mut u8,
    /// Size of one block in bytes
    blk_size: usize,
    /// Total number of blocks
    n_blks: usize,
    /// Number of free blocks
    n_free: usize,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsMemPool {
    /// Create a new, unconfigured pool
    pub const fn new() -> Self {
        OsMemPool {
            obj_type: OsObjType::Mem,
            pend_list: TcbList::new(),
            addr: core::ptr::null_mut(),
            free_list: core::ptr::null_mut(),
            blk_size: 0,
            n_blks: 0,
            n_free: 0,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize the pool over caller-provided storage
    ///
    /// Threads the free list through the blocks. The base address and
    /// the block size must be word-aligned and each block must be able
    /// to hold at least one pointer.
    pub fn create(
        &mut self,
        base: *mut u8,
        n_blks: usize,
        blk_size: usize,
        _name: &'static str,
    ) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        const WORD: usize = core::mem::size_of::<usize>();

        if base.is_null() || n_blks == 0 || blk_size < WORD {
            return Err(OsError::Param);
        }

        if (base as usize) % WORD != 0 || blk_size % WORD != 0 {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            self.obj_type = OsObjType::Mem;
            self.pend_list.init();
            self.addr = base;
            self.blk_size = blk_size;
            self.n_blks = n_blks;
            self.n_free = n_blks;

            // Each free block's first word points at the next; the last
            // terminates the chain
            unsafe {
                for i in 0..n_blks - 1 {
                    let blk = base.add(i * blk_size);
                    (blk as *mut *mut u8).write(base.add((i + 1) * blk_size));
                }
                let last = base.add((n_blks - 1) * blk_size);
                (last as *mut *mut u8).write(core::ptr::null_mut());
            }

            self.free_list = base;
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    /// Get a block (task context, may block)
    ///
    /// Blocks while the pool is exhausted; on each resumption the free
    /// list is re-tested, since another requester may have taken the
    /// block whose release triggered the wake.
    ///
    /// # Arguments
    /// * `pend_opt` - `PEND_NON_BLOCKING` to fail instead of blocking
    ///
    /// # Returns
    /// * `Ok(ptr)` - Pointer to a block of `blk_size` bytes
    /// * `Err(OsError::Resource)` - Non-blocking and no free block
    pub fn get(&mut self, pend_opt: OsOpt) -> OsResult<*mut u8> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        if self.obj_type != OsObjType::Mem || self.addr.is_null() {
            return Err(OsError::Param);
        }

        loop {
            let got = critical_section(|_cs| {
                if self.n_free > 0 {
                    let blk = self.free_list;
                    self.free_list = unsafe { (blk as *const *mut u8).read() };
                    self.n_free -= 1;
                    return Ok(Some(blk));
                }

                if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                    return Err(OsError::Resource);
                }

                // Blocking needs a scheduler; non-blocking gets work even
                // during init
                if !kernel::KERNEL.is_running() {
                    return Err(OsError::OsNotRunning);
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
                Ok(None)
            })?;

            if let Some(blk) = got {
                return Ok(blk);
            }
            // Woken by a put; loop and re-test the free list
        }
    }

    /// Return a block to the pool
    ///
    /// The address is validated before it is linked back: it must lie in
    /// the pool and on a block boundary. One waiter, if any, is released
    /// and re-tests the free list on resumption.
    ///
    /// # Returns
    /// * `Err(OsError::InvalidAddr)` - Address outside the pool
    /// * `Err(OsError::NotAlign)` - Address not block-aligned
    pub fn put(&mut self, blk: *mut u8, post_opt: OsOpt) -> OsResult<()> {
        if self.obj_type != OsObjType::Mem || self.addr.is_null() {
            return Err(OsError::Param);
        }

        let base = self.addr as usize;
        let addr = blk as usize;

        if addr < base || addr >= base + self.n_blks * self.blk_size {
            return Err(OsError::InvalidAddr);
        }

        if (addr - base) % self.blk_size != 0 {
            return Err(OsError::NotAlign);
        }

        critical_section(|_cs| {
            unsafe {
                (blk as *mut *mut u8).write(self.free_list);
            }
            self.free_list = blk;
            self.n_free += 1;

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

    /// Number of free blocks
    #[inline(always)]
    pub fn free_blocks(&self) -> usize {
        self.n_free
    }

    /// Total number of blocks
    #[inline(always)]
    pub fn total_blocks(&self) -> usize {
        self.n_blks
    }

    /// Check if the free list is exhausted
    #[inline(always)]
    pub fn is_exhausted(&self) -> bool {
        self.free_list.is_null()
    }
}

impl Default for OsMemPool {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsMemPool {}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

pub struct MemPool {
    inner: UnsafeCell<OsMemPool>,
}

unsafe impl Sync for MemPool {}
unsafe impl Send for MemPool {}

impl MemPool {
    pub const fn new() -> Self {
        MemPool {
            inner: UnsafeCell::new(OsMemPool::new()),
        }
    }

    pub fn create(
        &self,
        storage: &'static mut [u8],
        n_blks: usize,
        blk_size: usize,
        name: &'static str,
    ) -> OsResult<()> {
        if storage.len() < n_blks * blk_size {
            return Err(OsError::Param);
        }
        unsafe { (*self.inner.get()).create(storage.as_mut_ptr(), n_blks, blk_size, name) }
    }

    pub fn get(&self, opt: OsOpt) -> OsResult<*mut u8> {
        unsafe { (*self.inner.get()).get(opt) }
    }

    pub fn put(&self, blk: *mut u8, opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).put(blk, opt) }
    }

    #[inline]
    pub fn free_blocks(&self) -> usize {
        unsafe { (*self.inner.get()).free_blocks() }
    }
}

impl Default for MemPool {
    fn default() -> Self {
        Self::new()
    }
}
