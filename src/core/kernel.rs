//! Global kernel state and initialization
//!
//! This module manages the global OS state including initialization,
//! starting the scheduler, ISR exit handling, and the fatal-error path.

use core::ptr::NonNull;

use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::config::{CFG_PRIO_MAX, CFG_STK_SIZE_IDLE};
use crate::critical::{critical_section, CriticalSection, CsCell};
use crate::error::{OsError, OsResult};
use crate::list::TcbList;
use crate::prio::PrioTable;
use crate::task::OsTcb;
use crate::time::DelayList;
use crate::types::{OsNestingCtr, OsPrio, OsTick};

// ============ Kernel State Structures ============

/// Atomic kernel flags
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
    int_nesting: AtomicU8,
    sched_lock_nesting: AtomicU8,
    tick_counter: AtomicU32,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            int_nesting: AtomicU8::new(0),
            sched_lock_nesting: AtomicU8::new(0),
            tick_counter: AtomicU32::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.int_nesting.store(0, Ordering::SeqCst);
        self.sched_lock_nesting.store(0, Ordering::SeqCst);
        self.tick_counter.store(0, Ordering::SeqCst);
    }

    /// Check if the OS is running
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if OS is initialized
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Get current tick count
    ///
    /// Single-word read; the counter wraps after 2^32 ticks (49 days at
    /// a 1 ms tick).
    #[inline(always)]
    pub fn tick_get(&self) -> OsTick {
        self.tick_counter.load(Ordering::Relaxed)
    }

    /// Get interrupt nesting level
    #[inline(always)]
    pub fn int_nesting(&self) -> OsNestingCtr {
        self.int_nesting.load(Ordering::Relaxed)
    }

    /// Get scheduler lock nesting level
    #[inline(always)]
    pub fn sched_lock_nesting(&self) -> OsNestingCtr {
        self.sched_lock_nesting.load(Ordering::SeqCst)
    }

    /// Increment and return tick count
    #[inline(always)]
    pub(crate) fn tick_increment(&self) -> OsTick {
        self.tick_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Enter ISR
    #[inline(always)]
    pub(crate) fn int_enter(&self) {
        if self.is_running() {
            let nesting = self.int_nesting.load(Ordering::Relaxed);
            if nesting < OsNestingCtr::MAX {
                self.int_nesting.store(nesting + 1, Ordering::Relaxed);
            }
        }
    }

    /// Set initialized flag
    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    /// Set running flag
    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }

    /// Decrement int nesting
    #[inline(always)]
    pub(crate) fn int_nesting_dec(&self) -> OsNestingCtr {
        let nesting = self.int_nesting.load(Ordering::Relaxed);
        if nesting > 0 {
            self.int_nesting.store(nesting - 1, Ordering::Relaxed);
        }
        nesting.saturating_sub(1)
    }

    /// Lock scheduler
    pub(crate) fn try_sched_lock(&self) -> OsResult<()> {
        let nesting = self.sched_lock_nesting.load(Ordering::SeqCst);
        if nesting == OsNestingCtr::MAX {
            return Err(OsError::LockNestingOvf);
        }
        self.sched_lock_nesting.store(nesting + 1, Ordering::SeqCst);
        Ok(())
    }

    /// Unlock scheduler
    pub(crate) fn try_sched_unlock(&self) -> OsResult<OsNestingCtr> {
        let nesting = self.sched_lock_nesting.load(Ordering::SeqCst);
        if nesting == 0 {
            return Err(OsError::SchedNotLocked);
        }
        self.sched_lock_nesting.store(nesting - 1, Ordering::SeqCst);
        Ok(nesting - 1)
    }
}

// ============ Global Instances ============

/// Global kernel state instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

/// Scheduler state
pub struct SchedState {
    pub(crate) prio_tbl: PrioTable,
    pub(crate) rdy_list: [TcbList; CFG_PRIO_MAX],
    pub(crate) dly_list: DelayList,
}

impl SchedState {
    const fn new() -> Self {
        Self {
            prio_tbl: PrioTable::new(),
            rdy_list: [TcbList::new(); CFG_PRIO_MAX],
            dly_list: DelayList::new(),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.prio_tbl = PrioTable::new();
        self.rdy_list = [TcbList::new(); CFG_PRIO_MAX];
        self.dly_list = DelayList::new();
    }
}

/// Global scheduler state instance
pub(crate) static SCHED: CsCell<SchedState> = CsCell::new(SchedState::new());

/// IDLE task TCB
static mut IDLE_TCB: OsTcb = OsTcb::new();

/// IDLE task stack
static mut IDLE_STK: [crate::types::OsStkElement; CFG_STK_SIZE_IDLE] = [0; CFG_STK_SIZE_IDLE];

// ============ CPU/Context Switch State ============

/// CPU context switch state
///
/// Read and written by the trap assembly in the port; field order is part
/// of that contract.
#[repr(C)]
pub struct CpuState {
    /// Current running task's TCB pointer
    pub tcb_cur: *mut OsTcb,
    /// Designated next task's TCB pointer (scheduler decision)
    pub tcb_high_rdy: *mut OsTcb,
    /// Current running task's priority
    pub prio_cur: OsPrio,
    /// Highest ready priority
    pub prio_high_rdy: OsPrio,
}

impl CpuState {
    pub const fn new() -> Self {
        Self {
            tcb_cur: core::ptr::null_mut(),
            tcb_high_rdy: core::ptr::null_mut(),
            prio_cur: 0,
            prio_high_rdy: 0,
        }
    }

    pub fn reset(&mut self) {
        self.tcb_cur = core::ptr::null_mut();
        self.tcb_high_rdy = core::ptr::null_mut();
        self.prio_cur = 0;
        self.prio_high_rdy = 0;
    }
}

/// Global CPU state instance
#[no_mangle]
#[used]
pub static mut CPU_STATE: CpuState = CpuState::new();

// ============ Initialization ============

/// Internal IDLE task function
fn os_idle_task(_: *mut ()) -> ! {
    loop {
        #[cfg(target_arch = "riscv32")]
        unsafe {
            riscv::asm::wfi()
        };
        #[cfg(not(target_arch = "riscv32"))]
        core::hint::spin_loop();
    }
}

/// Reset global kernel state
#[allow(static_mut_refs)]
unsafe fn os_reset_globals() {
    KERNEL.reset();

    unsafe {
        CPU_STATE.reset();
        SCHED.get_unchecked().reset();
    }
}

// ============ Public API ============

/// Initialize the RTOS kernel
///
/// This must be called before any other OS function.
/// It initializes the priority table, ready queues, and the delay list.
/// The IDLE task is created automatically at the lowest priority, which
/// guarantees the scheduler always finds a ready task.
///
/// # Returns
/// * `Ok(())` - Initialization successful
/// * `Err(OsError::OsRunning)` - OS is already running
#[allow(static_mut_refs)]
pub fn os_init() -> OsResult<()> {
    unsafe {
        os_reset_globals();
    }

    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    critical_section(|cs| {
        let sched = SCHED.get(cs);

        sched.prio_tbl.init();

        for list in sched.rdy_list.iter_mut() {
            list.init();
        }

        sched.dly_list.init();

        unsafe {
            crate::task::os_task_create_internal(
                &raw mut IDLE_TCB,
                "Idle",
                os_idle_task,
                core::ptr::null_mut(),
                crate::config::CFG_PRIO_IDLE,
                IDLE_STK.as_mut_ptr(),
                IDLE_STK.len(),
            )
            .expect("IDLE task creation failed");
        }

        KERNEL.set_initialized(true);
    });

    Ok(())
}

/// Start multitasking
///
/// This function dispatches the highest priority ready task and does not
/// return under normal operation. Before calling this, at least one
/// application task should be created.
///
/// # Returns
/// * `Err(OsError::OsNotInit)` - OS not initialized
/// * `Err(OsError::OsRunning)` - OS is already running
pub fn os_start() -> OsResult<()> {
    if !KERNEL.is_initialized() {
        return Err(OsError::OsNotInit);
    }

    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    critical_section(|cs| {
        let sched = SCHED.get(cs);

        let high_prio = sched.prio_tbl.get_highest();

        unsafe {
            CPU_STATE.prio_high_rdy = high_prio;
            CPU_STATE.prio_cur = high_prio;

            if let Some(head) = sched.rdy_list[high_prio as usize].head() {
                CPU_STATE.tcb_high_rdy = head.as_ptr();
                CPU_STATE.tcb_cur = head.as_ptr();
            } else {
                return;
            }
        }

        KERNEL.set_running(true);
    });

    // Program the periodic tick before the first dispatch
    crate::port::os_cpu_systick_init(crate::port::MTIME_FREQ_HZ / crate::config::CFG_TICK_RATE_HZ);

    unsafe { crate::port::os_start_high_rdy() };

    Ok(())
}

/// Exit ISR
///
/// Called at the tail of every interrupt handler. At the outermost
/// nesting level, re-evaluates the scheduler decision and requests a
/// context switch when a higher-priority task became ready during the
/// interrupt. The swap itself happens in the trap epilogue.
pub fn os_int_exit() {
    if !KERNEL.is_running() {
        return;
    }

    {
        let _cs = CriticalSection::enter();

        let nesting = KERNEL.int_nesting();
        if nesting == 0 {
            return;
        }

        if nesting == 1 && KERNEL.sched_lock_nesting() == 0 {
            let high_prio = unsafe { SCHED.get_unchecked().prio_tbl.get_highest() };

            unsafe {
                if high_prio < CPU_STATE.prio_cur {
                    if let Some(head) = SCHED.get_unchecked().rdy_list[high_prio as usize].head() {
                        CPU_STATE.prio_high_rdy = high_prio;
                        CPU_STATE.tcb_high_rdy = head.as_ptr();
                        crate::port::os_int_ctx_sw();
                    }
                }
            }
        }
    }

    // Dropped the guard while still counted as ISR context so interrupts
    // stay masked until the trap returns
    KERNEL.int_nesting_dec();
}

/// Mark the scheduler live with `tcb` as the running task, skipping the
/// first dispatch
///
/// Bring-up hook for the host test suites: the task-level mutex,
/// semaphore, queue, and pool paths all gate on a running scheduler, and
/// `os_start`'s dispatch sequence only exists on the real target. With
/// the stub port, switch requests are no-ops, so a "blocked" caller
/// keeps executing and the resulting kernel state can be inspected
/// directly. Passing `None` stops the kernel again.
///
/// # Safety
/// `tcb` must point at a created task. Never call this on target
/// hardware; the boot path there is [`os_start`].
#[doc(hidden)]
#[allow(static_mut_refs)]
pub unsafe fn os_set_running_task(tcb: Option<NonNull<OsTcb>>) {
    unsafe {
        CPU_STATE.tcb_cur = tcb.map_or(core::ptr::null_mut(), |p| p.as_ptr());
        CPU_STATE.tcb_high_rdy = CPU_STATE.tcb_cur;
        if let Some(p) = tcb {
            CPU_STATE.prio_cur = p.as_ref().prio;
            CPU_STATE.prio_high_rdy = CPU_STATE.prio_cur;
        }
    }
    KERNEL.set_running(tcb.is_some());
}

/// Lock the scheduler
pub fn os_sched_lock() -> OsResult<()> {
    if !KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if KERNEL.int_nesting() > 0 {
        return Err(OsError::Isr);
    }

    critical_section(|_cs| KERNEL.try_sched_lock())
}

/// Unlock the scheduler
pub fn os_sched_unlock() -> OsResult<()> {
    if !KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if KERNEL.int_nesting() > 0 {
        return Err(OsError::Isr);
    }

    critical_section(|_cs| {
        let remaining = KERNEL.try_sched_unlock()?;
        if remaining == 0 {
            crate::sched::os_sched();
        }
        Ok(())
    })
}

/// Fatal kernel error: disable interrupts and halt
///
/// Used for stack sentinel violations, corrupt kernel structures, and
/// traps the kernel cannot attribute. Never returns and never unwinds.
pub(crate) fn os_fatal(_err: OsError) -> ! {
    #[cfg(target_arch = "riscv32")]
    unsafe {
        riscv::interrupt::disable()
    };

    crate::error!("fatal kernel error: {}", _err as u16);

    loop {
        #[cfg(target_arch = "riscv32")]
        unsafe {
            riscv::asm::wfi()
        };
        #[cfg(not(target_arch = "riscv32"))]
        core::hint::spin_loop();
    }
}

// ============ Internal accessors for other modules ============

/// Get mutable reference to priority table
#[inline(always)]
pub(crate) unsafe fn prio_table() -> &'static mut PrioTable {
    unsafe { &mut SCHED.get_unchecked().prio_tbl }
}

/// Get reference to ready queue for a priority
#[inline(always)]
pub(crate) unsafe fn rdy_list(prio: OsPrio) -> &'static mut TcbList {
    unsafe { &mut SCHED.get_unchecked().rdy_list[prio as usize] }
}

/// Get reference to the delay list
#[inline(always)]
pub(crate) unsafe fn dly_list() -> &'static mut DelayList {
    unsafe { &mut SCHED.get_unchecked().dly_list }
}

/// Get current TCB pointer as Option<NonNull>
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn tcb_cur_ptr() -> Option<NonNull<OsTcb>> {
    unsafe { NonNull::new(CPU_STATE.tcb_cur) }
}

/// Get high ready TCB pointer as Option<NonNull>
#[inline]
#[allow(dead_code, static_mut_refs)]
pub(crate) unsafe fn tcb_high_rdy_ptr() -> Option<NonNull<OsTcb>> {
    unsafe { NonNull::new(CPU_STATE.tcb_high_rdy) }
}

/// Set high ready TCB pointer
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn set_tcb_high_rdy_ptr(tcb: Option<NonNull<OsTcb>>) {
    unsafe { CPU_STATE.tcb_high_rdy = tcb.map_or(core::ptr::null_mut(), |p| p.as_ptr()) }
}

/// Get current priority
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn prio_cur() -> OsPrio {
    unsafe { CPU_STATE.prio_cur }
}

/// Set current priority
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn set_prio_cur(prio: OsPrio) {
    unsafe { CPU_STATE.prio_cur = prio }
}

/// Set high ready priority
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn set_prio_high_rdy(prio: OsPrio) {
    unsafe { CPU_STATE.prio_high_rdy = prio }
}
