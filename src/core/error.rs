//! Error types
//!
//! Uses Rust's Result pattern instead of C-style error pointers.
//! The numeric values are stable across the API.

/// RTOS error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OsError {
    /// No error
    None = 0,

    // ============ Argument errors ============
    /// Null pointer, out-of-range priority, zero size
    Param = 1001,

    // ============ Wait outcomes ============
    /// Reserved; timed waits are limited to `os_time_dly`
    Timeout = 2001,
    /// Non-blocking variant found no data / no free block
    Resource = 2002,

    // ============ Mutex errors ============
    /// Caller is not the mutex owner
    NotOwner = 3001,
    /// Mutex recursion depth exhausted
    Nesting = 3002,

    // ============ Semaphore errors ============
    /// Post would wrap the counter
    SemOvf = 3101,

    // ============ Queue errors ============
    /// Queue send on a full queue
    QFull = 4001,

    // ============ Memory pool errors ============
    /// Block address outside the pool
    InvalidAddr = 5001,
    /// Block address not block-aligned
    NotAlign = 5002,

    // ============ Context errors ============
    /// Task-level API called from an ISR
    Isr = 6001,

    // ============ OS state errors ============
    /// OS is not running
    OsNotRunning = 7001,
    /// OS is already running
    OsRunning = 7002,
    /// OS not initialized
    OsNotInit = 7003,

    // ============ Scheduler lock errors ============
    /// Scheduler is locked; blocking calls refused
    SchedLocked = 8001,
    /// Scheduler is not locked
    SchedNotLocked = 8002,
    /// Lock nesting overflow
    LockNestingOvf = 8003,

    // ============ Fatal (reported before halt) ============
    /// Stack sentinel violation
    StkOvf = 9001,
    /// Trap the kernel cannot attribute
    FatalTrap = 9002,
}

/// Result type alias for RTOS operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    #[inline]
    pub fn is_ok(self) -> bool {
        self == OsError::None
    }

    #[inline]
    pub fn is_err(self) -> bool {
        self != OsError::None
    }
}
