//! RV32 machine-mode port implementation
//!
//! Context switching rides the trap path: `_start_trap` saves the full
//! integer register file plus `mepc`/`mstatus` on the interrupted task's
//! stack, dispatches in Rust, and restores from whichever TCB is current
//! on the way out. The CLINT provides both the periodic tick (`mtimecmp`)
//! and the software interrupt (`msip`).
//!
//! The `msip` request is level-pending: it stays asserted until the trap
//! handler clears it, so a request raised inside a handler is taken at
//! the next interrupt boundary. A redundant request finds current ==
//! next and degenerates to a no-op swap.

use core::arch::{asm, global_asm};

use riscv::register::mcause::{self, Interrupt, Trap};
use riscv::register::mie;

use crate::error::OsError;
use crate::kernel;
use crate::task::OsTaskFn;
use crate::types::OsStkElement;

// ============ CLINT ============

/// CLINT base address (QEMU virt / SiFive standard layout)
const CLINT_BASE: usize = 0x0200_0000;
/// Hart 0 software-interrupt pending register
const CLINT_MSIP: *mut u32 = CLINT_BASE as *mut u32;
/// Hart 0 timer compare register (64-bit, two 32-bit halves)
const CLINT_MTIMECMP: *mut u32 = (CLINT_BASE + 0x4000) as *mut u32;
/// Timebase register (64-bit, two 32-bit halves)
const CLINT_MTIME: *const u32 = (CLINT_BASE + 0xBFF8) as *const u32;

/// Timebase frequency of the CLINT `mtime` counter
pub const MTIME_FREQ_HZ: u32 = 10_000_000;

/// Tick period in timebase counts, set once at scheduler start
static mut TICK_PERIOD: u64 = 0;

/// Next tick's compare value
static mut NEXT_MTIMECMP: u64 = 0;

/// Read the 64-bit `mtime` counter from its two halves
fn mtime_read() -> u64 {
    loop {
        let hi = unsafe { CLINT_MTIME.add(1).read_volatile() };
        let lo = unsafe { CLINT_MTIME.read_volatile() };
        if hi == unsafe { CLINT_MTIME.add(1).read_volatile() } {
            return ((hi as u64) << 32) | lo as u64;
        }
    }
}

/// Program the 64-bit compare register without spurious matches
///
/// The low half is parked at all-ones while the high half changes.
fn mtimecmp_write(value: u64) {
    unsafe {
        CLINT_MTIMECMP.write_volatile(u32::MAX);
        CLINT_MTIMECMP.add(1).write_volatile((value >> 32) as u32);
        CLINT_MTIMECMP.write_volatile(value as u32);
    }
}

/// Initialize the periodic tick
///
/// # Arguments
/// * `cnts` - Timebase counts per tick
///
/// # Example
/// For a 10 MHz timebase with 1000 Hz tick rate: cnts = 10_000_000 / 1000
pub fn os_cpu_systick_init(cnts: u32) {
    unsafe {
        TICK_PERIOD = cnts as u64;
        NEXT_MTIMECMP = mtime_read() + cnts as u64;
        mtimecmp_write(NEXT_MTIMECMP);

        mie::set_mtimer();
        mie::set_msoft();
    }
}

/// Trigger context switch from task level
#[inline(always)]
pub fn os_ctx_sw() {
    unsafe { CLINT_MSIP.write_volatile(1) };
}

/// Trigger context switch from interrupt level
#[inline(always)]
pub fn os_int_ctx_sw() {
    unsafe { CLINT_MSIP.write_volatile(1) };
}

#[inline(always)]
fn clear_msip() {
    unsafe { CLINT_MSIP.write_volatile(0) };
}

// ============ Task stack frame ============

/// Context structure stored on a task's stack
///
/// Must match the offsets in the `_start_trap` assembly below. 32 words,
/// keeping the stack pointer 16-byte aligned per the RISC-V psABI.
#[repr(C, align(16))]
struct RvStk {
    mstatus: u32,
    mepc: u32,
    ra: u32,
    gp: u32,
    tp: u32,
    t0: u32,
    t1: u32,
    t2: u32,
    s0: u32,
    s1: u32,
    a0: u32,
    a1: u32,
    a2: u32,
    a3: u32,
    a4: u32,
    a5: u32,
    a6: u32,
    a7: u32,
    s2: u32,
    s3: u32,
    s4: u32,
    s5: u32,
    s6: u32,
    s7: u32,
    s8: u32,
    s9: u32,
    s10: u32,
    s11: u32,
    t3: u32,
    t4: u32,
    t5: u32,
    t6: u32,
}
const CONTEXT_STACK_WORDS: usize = 32;

/// mstatus for a fresh task: previous privilege = machine, previous
/// interrupt enable set, so `mret` drops into the task with interrupts on
const MSTATUS_TASK_INIT: u32 = 0x0000_1880;

/// Initialize a task stack
///
/// Builds a register frame at the (16-byte aligned) top of the stack such
/// that the trap-restore sequence enters `task_fn` with `arg` in `a0` and
/// interrupts enabled. The return address points at the task-return trap;
/// task functions must not return.
pub unsafe fn os_task_stk_init(
    task_fn: OsTaskFn,
    arg: *mut (),
    stk_base: *mut OsStkElement,
    stk_size: usize,
) -> *mut OsStkElement {
    // Tasks share the boot-time global and thread pointers
    let gp: u32;
    let tp: u32;
    unsafe {
        asm!("mv {}, gp", out(reg) gp, options(nomem, nostack));
        asm!("mv {}, tp", out(reg) tp, options(nomem, nostack));
    }

    unsafe {
        let stk_top = stk_base.add(stk_size);
        let stk_aligned = ((stk_top as usize) & !15) as *mut u32;

        let frame_ptr = stk_aligned.sub(CONTEXT_STACK_WORDS) as *mut RvStk;

        (*frame_ptr) = RvStk {
            mstatus: MSTATUS_TASK_INIT,
            mepc: task_fn as usize as u32,
            ra: os_task_return as *const () as u32,
            gp,
            tp,
            t0: 0x0505_0505,
            t1: 0x0606_0606,
            t2: 0x0707_0707,
            s0: 0x0808_0808,
            s1: 0x0909_0909,
            a0: arg as u32,
            a1: 0x1111_1111,
            a2: 0x1212_1212,
            a3: 0x1313_1313,
            a4: 0x1414_1414,
            a5: 0x1515_1515,
            a6: 0x1616_1616,
            a7: 0x1717_1717,
            s2: 0x1818_1818,
            s3: 0x1919_1919,
            s4: 0x2020_2020,
            s5: 0x2121_2121,
            s6: 0x2222_2222,
            s7: 0x2323_2323,
            s8: 0x2424_2424,
            s9: 0x2525_2525,
            s10: 0x2626_2626,
            s11: 0x2727_2727,
            t3: 0x2828_2828,
            t4: 0x2929_2929,
            t5: 0x3030_3030,
            t6: 0x3131_3131,
        };

        frame_ptr as *mut OsStkElement
    }
}

// ============ Trap entry and first dispatch ============

global_asm!(
    r#"
    .section .trap, "ax"
    .p2align 2
    .global _start_trap
_start_trap:
    addi sp, sp, -128

    sw ra,   8(sp)
    sw gp,  12(sp)
    sw tp,  16(sp)
    sw t0,  20(sp)
    sw t1,  24(sp)
    sw t2,  28(sp)
    sw s0,  32(sp)
    sw s1,  36(sp)
    sw a0,  40(sp)
    sw a1,  44(sp)
    sw a2,  48(sp)
    sw a3,  52(sp)
    sw a4,  56(sp)
    sw a5,  60(sp)
    sw a6,  64(sp)
    sw a7,  68(sp)
    sw s2,  72(sp)
    sw s3,  76(sp)
    sw s4,  80(sp)
    sw s5,  84(sp)
    sw s6,  88(sp)
    sw s7,  92(sp)
    sw s8,  96(sp)
    sw s9, 100(sp)
    sw s10, 104(sp)
    sw s11, 108(sp)
    sw t3, 112(sp)
    sw t4, 116(sp)
    sw t5, 120(sp)
    sw t6, 124(sp)

    csrr t0, mstatus
    sw t0, 0(sp)
    csrr t0, mepc
    sw t0, 4(sp)

    mv a0, sp
    call os_trap_handler
    mv sp, a0

    lw t0, 0(sp)
    csrw mstatus, t0
    lw t0, 4(sp)
    csrw mepc, t0

    lw ra,   8(sp)
    lw gp,  12(sp)
    lw tp,  16(sp)
    lw t0,  20(sp)
    lw t1,  24(sp)
    lw t2,  28(sp)
    lw s0,  32(sp)
    lw s1,  36(sp)
    lw a0,  40(sp)
    lw a1,  44(sp)
    lw a2,  48(sp)
    lw a3,  52(sp)
    lw a4,  56(sp)
    lw a5,  60(sp)
    lw a6,  64(sp)
    lw a7,  68(sp)
    lw s2,  72(sp)
    lw s3,  76(sp)
    lw s4,  80(sp)
    lw s5,  84(sp)
    lw s6,  88(sp)
    lw s7,  92(sp)
    lw s8,  96(sp)
    lw s9, 100(sp)
    lw s10, 104(sp)
    lw s11, 108(sp)
    lw t3, 112(sp)
    lw t4, 116(sp)
    lw t5, 120(sp)
    lw t6, 124(sp)

    addi sp, sp, 128
    mret

    .p2align 2
    .global _os_start_high_rdy
_os_start_high_rdy:
    la t0, CPU_STATE
    lw t1, 4(t0)            # tcb_high_rdy
    sw t1, 0(t0)            # tcb_cur = tcb_high_rdy
    lbu t2, 9(t0)           # prio_high_rdy
    sb t2, 8(t0)            # prio_cur = prio_high_rdy
    lw sp, 0(t1)            # stk_ptr is the first TCB field

    lw t0, 0(sp)
    csrw mstatus, t0
    lw t0, 4(sp)
    csrw mepc, t0

    lw ra,   8(sp)
    lw gp,  12(sp)
    lw tp,  16(sp)
    lw t0,  20(sp)
    lw t1,  24(sp)
    lw t2,  28(sp)
    lw s0,  32(sp)
    lw s1,  36(sp)
    lw a0,  40(sp)
    lw a1,  44(sp)
    lw a2,  48(sp)
    lw a3,  52(sp)
    lw a4,  56(sp)
    lw a5,  60(sp)
    lw a6,  64(sp)
    lw a7,  68(sp)
    lw s2,  72(sp)
    lw s3,  76(sp)
    lw s4,  80(sp)
    lw s5,  84(sp)
    lw s6,  88(sp)
    lw s7,  92(sp)
    lw s8,  96(sp)
    lw s9, 100(sp)
    lw s10, 104(sp)
    lw s11, 108(sp)
    lw t3, 112(sp)
    lw t4, 116(sp)
    lw t5, 120(sp)
    lw t6, 124(sp)

    addi sp, sp, 128
    mret
"#
);

extern "C" {
    fn _os_start_high_rdy() -> !;
}

/// Dispatch the first task
///
/// Loads the stack pointer from the highest-ready TCB and performs the
/// register-restore return sequence. Never returns.
pub unsafe fn os_start_high_rdy() -> ! {
    unsafe { _os_start_high_rdy() }
}

/// Rust side of the trap path
///
/// Runs on the interrupted task's stack with the full frame already
/// saved at `cur_sp`. Handles the tick and software interrupts, then
/// performs the scheduler's pending swap: the frame pointer returned
/// here is where the assembly restores from.
#[no_mangle]
unsafe extern "C" fn os_trap_handler(cur_sp: *mut OsStkElement) -> *mut OsStkElement {
    match mcause::read().cause() {
        Trap::Interrupt(Interrupt::MachineSoft) => {
            clear_msip();
        }
        Trap::Interrupt(Interrupt::MachineTimer) => {
            unsafe {
                NEXT_MTIMECMP += TICK_PERIOD;
                mtimecmp_write(NEXT_MTIMECMP);
            }
            crate::time::os_tick_handler();
        }
        _ => {
            kernel::os_fatal(OsError::FatalTrap);
        }
    }

    unsafe {
        let cur = kernel::CPU_STATE.tcb_cur;
        let next = kernel::CPU_STATE.tcb_high_rdy;

        if next.is_null() || next == cur {
            return cur_sp;
        }

        if !cur.is_null() {
            (*cur).stk_ptr = cur_sp;
        }

        kernel::CPU_STATE.tcb_cur = next;
        kernel::CPU_STATE.prio_cur = kernel::CPU_STATE.prio_high_rdy;

        (*next).stk_ptr
    }
}

/// Task return handler
///
/// Task functions must not return; a return lands here and parks the
/// hart with interrupts off.
#[no_mangle]
fn os_task_return() -> ! {
    unsafe { riscv::interrupt::disable() };
    crate::error!("task function returned");
    loop {
        unsafe { riscv::asm::wfi() };
    }
}
