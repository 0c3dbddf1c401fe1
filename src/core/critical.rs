//! Critical section handling
//!
//! All kernel data is mutated inside a critical section: a nesting-aware
//! global-interrupt gate. Entering disables interrupts and bumps the
//! nesting counter; the matching exit drops the counter and re-enables
//! interrupts only when it reaches zero. Enter/exit must be exactly
//! balanced per call path.

use core::cell::UnsafeCell;

use portable_atomic::{AtomicU8, Ordering};

/// Global critical-section nesting depth
static CRITICAL_NESTING: AtomicU8 = AtomicU8::new(0);

/// RAII guard for critical sections
///
/// Interrupts are disabled while at least one guard is alive and restored
/// when the outermost guard is dropped.
pub struct CriticalSection {
    _private: (),
}

impl CriticalSection {
    /// Enter a critical section by disabling interrupts.
    #[inline(always)]
    pub fn enter() -> Self {
        #[cfg(target_arch = "riscv32")]
        unsafe {
            riscv::interrupt::disable()
        };

        CRITICAL_NESTING.fetch_add(1, Ordering::Relaxed);
        CriticalSection { _private: () }
    }

    /// Current nesting depth
    #[inline(always)]
    pub fn nesting() -> u8 {
        CRITICAL_NESTING.load(Ordering::Relaxed)
    }

    /// Check if we're currently in a critical section
    #[inline(always)]
    pub fn is_active() -> bool {
        Self::nesting() > 0
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        let prev = CRITICAL_NESTING.fetch_sub(1, Ordering::Relaxed);

        // Interrupt handlers run with interrupts gated by the hardware
        // for their whole duration; only task-level exits re-enable.
        if prev == 1 && !is_isr_context() {
            #[cfg(target_arch = "riscv32")]
            unsafe {
                riscv::interrupt::enable()
            };
        }
    }
}

/// Execute a closure with interrupts disabled
///
/// The closure receives a reference to the critical section guard,
/// which can be used to access [`CsCell`] protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Interior-mutable slot for the scheduler globals
///
/// The ready queues, bitmap, and delay list live in one `static`
/// ([`SCHED`](crate::kernel)) whose lifecycle is init → running → never
/// torn down, and whose every mutation happens with interrupts masked.
/// `CsCell` ties that rule to the type system on the common path: the
/// borrow handed out by [`get`](Self::get) demands a live
/// [`CriticalSection`] guard as a witness.
///
/// On a single hart the guard is the whole story, so the cell costs
/// nothing at runtime.
pub struct CsCell<T>(UnsafeCell<T>);

// SAFETY: single hart; all access goes through the interrupt gate, so
// handing the static across "threads" (task vs. ISR context) is sound.
unsafe impl<T> Sync for CsCell<T> {}

impl<T> CsCell<T> {
    /// Wrap a value for critical-section-gated access
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Borrow the contents; the guard reference proves interrupts are off
    #[inline(always)]
    pub fn get(&self, _cs: &CriticalSection) -> &mut T {
        unsafe { &mut *self.0.get() }
    }

    /// Borrow the contents without a guard witness
    ///
    /// For paths that are already gated some other way: trap handlers
    /// (interrupts masked by hardware) and the kernel-internal accessors
    /// whose callers hold a guard higher up the stack.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self) -> &mut T {
        unsafe { &mut *self.0.get() }
    }
}

/// Check if currently executing in an ISR context
///
/// RV32 machine mode has no equivalent of an exception-number register
/// readable here, so the kernel tracks interrupt nesting itself; the trap
/// dispatcher brackets handlers with `int_enter`/`os_int_exit`.
#[inline]
pub fn is_isr_context() -> bool {
    crate::kernel::KERNEL.int_nesting() > 0
}
