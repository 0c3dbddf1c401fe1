//! Unit tests for core RTOS modules
//!
//! These tests run on the host (not the embedded target) to verify
//! the core algorithms work correctly. Paths that need a live scheduler
//! (blocking waits, preemption) are exercised on target hardware; here
//! the data structures and the non-blocking paths are covered.

#[cfg(test)]
mod prio_tests {
    use rvos::config::CFG_PRIO_MAX;
    use rvos::prio::PrioTable;

    #[test]
    fn test_empty_table() {
        let table = PrioTable::new();
        assert!(table.is_empty());
        assert_eq!(table.get_highest(), (CFG_PRIO_MAX - 1) as u8);
    }

    #[test]
    fn test_single_priority() {
        let mut table = PrioTable::new();

        table.insert(5);
        assert!(!table.is_empty());
        assert!(table.is_set(5));
        assert!(!table.is_set(4));
        assert_eq!(table.get_highest(), 5);

        table.remove(5);
        assert!(table.is_empty());
    }

    #[test]
    fn test_multiple_priorities() {
        let mut table = PrioTable::new();

        // Insert in random order
        table.insert(20);
        table.insert(5);
        table.insert(10);
        table.insert(0);
        table.insert(15);

        // Highest (lowest number) should be 0
        assert_eq!(table.get_highest(), 0);

        // Remove in order
        table.remove(0);
        assert_eq!(table.get_highest(), 5);

        table.remove(5);
        assert_eq!(table.get_highest(), 10);

        table.remove(10);
        assert_eq!(table.get_highest(), 15);

        table.remove(15);
        assert_eq!(table.get_highest(), 20);

        table.remove(20);
        assert!(table.is_empty());
    }

    #[test]
    fn test_boundary_priorities() {
        let mut table = PrioTable::new();

        table.insert(0);
        table.insert(31);
        assert_eq!(table.get_highest(), 0);

        table.remove(0);
        assert_eq!(table.get_highest(), 31);
    }

    #[test]
    fn test_all_priorities() {
        let mut table = PrioTable::new();

        for i in 0..CFG_PRIO_MAX {
            table.insert(i as u8);
        }

        assert_eq!(table.get_highest(), 0);

        // Remove from highest to lowest
        for i in 0..CFG_PRIO_MAX {
            assert_eq!(table.get_highest(), i as u8);
            table.remove(i as u8);
        }

        assert!(table.is_empty());
    }
}

#[cfg(test)]
mod list_tests {
    use core::ptr::NonNull;
    use rvos::list::TcbList;
    use rvos::task::OsTcb;

    fn tcb_with_prio(prio: u8) -> OsTcb {
        let mut tcb = OsTcb::new();
        tcb.prio = prio;
        tcb
    }

    #[test]
    fn test_fifo_order() {
        let mut a = OsTcb::new();
        let mut b = OsTcb::new();
        let mut c = OsTcb::new();
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        let mut list = TcbList::new();
        assert!(list.is_empty());

        list.insert_tail(pa);
        list.insert_tail(pb);
        list.insert_tail(pc);

        assert_eq!(list.head(), Some(pa));
        assert_eq!(list.tail(), Some(pc));

        assert_eq!(list.pop_head(), Some(pa));
        assert_eq!(list.pop_head(), Some(pb));
        assert_eq!(list.pop_head(), Some(pc));
        assert_eq!(list.pop_head(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_remove_middle() {
        let mut a = OsTcb::new();
        let mut b = OsTcb::new();
        let mut c = OsTcb::new();
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        let mut list = TcbList::new();
        list.insert_tail(pa);
        list.insert_tail(pb);
        list.insert_tail(pc);

        list.remove(pb);
        assert_eq!(list.head(), Some(pa));
        assert_eq!(unsafe { pa.as_ref() }.next_ptr, Some(pc));
        assert_eq!(unsafe { pc.as_ref() }.prev_ptr, Some(pa));

        // Removed node's links are cleared
        assert_eq!(unsafe { pb.as_ref() }.next_ptr, None);
        assert_eq!(unsafe { pb.as_ref() }.prev_ptr, None);

        list.remove(pa);
        list.remove(pc);
        assert!(list.is_empty());
        assert_eq!(list.tail(), None);
    }

    #[test]
    fn test_insert_by_prio() {
        // Mutex wait-set discipline: highest priority first,
        // FIFO among equals
        let mut h = tcb_with_prio(3);
        let mut m1 = tcb_with_prio(7);
        let mut m2 = tcb_with_prio(7);
        let mut l = tcb_with_prio(12);
        let (ph, pm1, pm2, pl) = (
            NonNull::from(&mut h),
            NonNull::from(&mut m1),
            NonNull::from(&mut m2),
            NonNull::from(&mut l),
        );

        let mut list = TcbList::new();
        list.insert_by_prio(pl);
        list.insert_by_prio(pm1);
        list.insert_by_prio(pm2);
        list.insert_by_prio(ph);

        assert_eq!(list.pop_head(), Some(ph));
        assert_eq!(list.pop_head(), Some(pm1));
        assert_eq!(list.pop_head(), Some(pm2));
        assert_eq!(list.pop_head(), Some(pl));
    }
}

#[cfg(test)]
mod dly_list_tests {
    use core::ptr::NonNull;
    use rvos::task::OsTcb;
    use rvos::time::DelayList;

    fn deltas(list: &DelayList) -> Vec<u32> {
        let mut out = Vec::new();
        let mut iter = list.head();
        while let Some(p) = iter {
            let tcb = unsafe { p.as_ref() };
            out.push(tcb.tick_remain);
            iter = tcb.next_ptr;
        }
        out
    }

    #[test]
    fn test_delta_encoding() {
        // Delays of 30, 10, 50 scheduled in that call order wake at
        // absolute ticks 10, 30, 50; stored deltas are [10, 20, 20]
        let mut t30 = OsTcb::new();
        let mut t10 = OsTcb::new();
        let mut t50 = OsTcb::new();
        let (p30, p10, p50) = (
            NonNull::from(&mut t30),
            NonNull::from(&mut t10),
            NonNull::from(&mut t50),
        );

        let mut list = DelayList::new();
        list.insert(p30, 30);
        list.insert(p10, 10);
        list.insert(p50, 50);

        assert_eq!(deltas(&list), vec![10, 20, 20]);
        assert_eq!(list.head(), Some(p10));
        assert_eq!(unsafe { p10.as_ref() }.next_ptr, Some(p30));
        assert_eq!(unsafe { p30.as_ref() }.next_ptr, Some(p50));
    }

    #[test]
    fn test_tick_expiry_order() {
        let mut t30 = OsTcb::new();
        let mut t10 = OsTcb::new();
        let mut t50 = OsTcb::new();
        let (p30, p10, p50) = (
            NonNull::from(&mut t30),
            NonNull::from(&mut t10),
            NonNull::from(&mut t50),
        );

        let mut list = DelayList::new();
        list.insert(p30, 30);
        list.insert(p10, 10);
        list.insert(p50, 50);

        let mut woken = Vec::new();
        for tick in 1..=50u32 {
            list.tick();
            while let Some(p) = list.pop_expired() {
                woken.push((tick, p));
            }
        }

        assert_eq!(woken, vec![(10, p10), (30, p30), (50, p50)]);
        assert!(list.is_empty());
    }

    #[test]
    fn test_same_instant_wakes_together() {
        // Equal delays become a zero-delta follower; both drain on the
        // same tick, insertion order preserved
        let mut a = OsTcb::new();
        let mut b = OsTcb::new();
        let (pa, pb) = (NonNull::from(&mut a), NonNull::from(&mut b));

        let mut list = DelayList::new();
        list.insert(pa, 5);
        list.insert(pb, 5);

        assert_eq!(deltas(&list), vec![5, 0]);

        for _ in 0..4 {
            list.tick();
            assert_eq!(list.pop_expired(), None);
        }

        list.tick();
        assert_eq!(list.pop_expired(), Some(pa));
        assert_eq!(list.pop_expired(), Some(pb));
        assert_eq!(list.pop_expired(), None);
    }

    #[test]
    fn test_remove_refolds_delta() {
        let mut t30 = OsTcb::new();
        let mut t10 = OsTcb::new();
        let mut t50 = OsTcb::new();
        let (p30, p10, p50) = (
            NonNull::from(&mut t30),
            NonNull::from(&mut t10),
            NonNull::from(&mut t50),
        );

        let mut list = DelayList::new();
        list.insert(p30, 30);
        list.insert(p10, 10);
        list.insert(p50, 50);

        // Cancelling the middle sleeper keeps the last one's wake instant
        list.remove(p30);
        assert_eq!(deltas(&list), vec![10, 40]);

        list.remove(p10);
        assert_eq!(deltas(&list), vec![50]);

        list.remove(p50);
        assert!(list.is_empty());
    }

    #[test]
    fn test_insert_after_partial_elapse() {
        let mut a = OsTcb::new();
        let mut b = OsTcb::new();
        let (pa, pb) = (NonNull::from(&mut a), NonNull::from(&mut b));

        let mut list = DelayList::new();
        list.insert(pa, 20);

        for _ in 0..5 {
            list.tick();
        }

        // Head has 15 left; a new 10-tick sleeper goes in front
        list.insert(pb, 10);
        assert_eq!(deltas(&list), vec![10, 5]);
        assert_eq!(list.head(), Some(pb));
    }
}

#[cfg(test)]
mod queue_tests {
    use rvos::queue::OsQueue;
    use rvos::types::opt;
    use rvos::OsError;

    #[test]
    fn test_send_receive_state() {
        let mut buf = [0u8; 16];
        let mut q = OsQueue::new();
        q.create(buf.as_mut_ptr(), buf.len(), 4, 4, "q").unwrap();

        let msg = 0x1122_3344u32.to_le_bytes();
        q.send(&msg, opt::NONE).unwrap();
        assert_eq!(q.count(), 1);
        assert_eq!(q.head(), 1);
        assert_eq!(q.tail(), 0);

        let mut out = [0u8; 4];
        q.receive_from_isr(&mut out).unwrap();
        assert_eq!(u32::from_le_bytes(out), 0x1122_3344);
        assert_eq!(q.count(), 0);
        assert_eq!(q.head(), 1);
        assert_eq!(q.tail(), 1);
    }

    #[test]
    fn test_capacity_one_alternates() {
        let mut buf = [0u8; 4];
        let mut q = OsQueue::new();
        q.create(buf.as_mut_ptr(), buf.len(), 4, 1, "q1").unwrap();

        let mut out = [0u8; 4];
        for i in 0..5u32 {
            q.send(&i.to_le_bytes(), opt::NONE).unwrap();
            assert!(q.is_full());
            assert_eq!(q.send(&i.to_le_bytes(), opt::NONE), Err(OsError::QFull));

            q.receive_from_isr(&mut out).unwrap();
            assert_eq!(u32::from_le_bytes(out), i);
            assert_eq!(q.count(), 0);
        }
    }

    #[test]
    fn test_full_and_empty() {
        let mut buf = [0u8; 8];
        let mut q = OsQueue::new();
        q.create(buf.as_mut_ptr(), buf.len(), 2, 4, "q2").unwrap();

        for i in 0..4u16 {
            q.send(&i.to_le_bytes(), opt::NONE).unwrap();
        }
        assert_eq!(q.send(&[0, 0], opt::NONE), Err(OsError::QFull));

        let mut out = [0u8; 2];
        for i in 0..4u16 {
            q.receive_from_isr(&mut out).unwrap();
            assert_eq!(u16::from_le_bytes(out), i);
        }
        assert_eq!(q.receive_from_isr(&mut out), Err(OsError::Resource));
    }

    #[test]
    fn test_isr_send_wraps_ring() {
        let mut buf = [0u8; 8];
        let mut q = OsQueue::new();
        q.create(buf.as_mut_ptr(), buf.len(), 4, 2, "q3").unwrap();

        let mut woken = false;
        let mut out = [0u8; 4];

        // Push the indices past a wrap-around
        for i in 0..7u32 {
            q.send_from_isr(&i.to_le_bytes(), &mut woken).unwrap();
            assert!(!woken);
            q.receive_from_isr(&mut out).unwrap();
            assert_eq!(u32::from_le_bytes(out), i);
        }
        assert_eq!(q.count(), 0);
    }

    #[test]
    fn test_create_param_checks() {
        let mut buf = [0u8; 8];
        let mut q = OsQueue::new();

        assert_eq!(
            q.create(core::ptr::null_mut(), 8, 4, 2, "bad"),
            Err(OsError::Param)
        );
        assert_eq!(
            q.create(buf.as_mut_ptr(), buf.len(), 0, 2, "bad"),
            Err(OsError::Param)
        );
        assert_eq!(
            q.create(buf.as_mut_ptr(), buf.len(), 4, 0, "bad"),
            Err(OsError::Param)
        );
        // Buffer too small for capacity * msg_size
        assert_eq!(
            q.create(buf.as_mut_ptr(), buf.len(), 4, 4, "bad"),
            Err(OsError::Param)
        );

        // Message length must match the configured size
        q.create(buf.as_mut_ptr(), buf.len(), 4, 2, "q").unwrap();
        assert_eq!(q.send(&[1, 2], opt::NONE), Err(OsError::Param));
    }
}

#[cfg(test)]
mod mem_tests {
    use rvos::mem::OsMemPool;
    use rvos::types::opt;
    use rvos::OsError;

    #[test]
    fn test_free_list_threading() {
        let mut storage = [0u64; 8]; // 4 blocks of 16 bytes
        let base = storage.as_mut_ptr() as *mut u8;

        let mut pool = OsMemPool::new();
        pool.create(base, 4, 16, "pool").unwrap();

        assert_eq!(pool.free_blocks(), 4);
        assert_eq!(pool.total_blocks(), 4);
        assert!(!pool.is_exhausted());

        // Blocks come off the head in address order after threading
        for i in 0..4 {
            let blk = pool.get(opt::PEND_NON_BLOCKING).unwrap();
            assert_eq!(blk as usize, base as usize + i * 16);
        }
        assert_eq!(pool.free_blocks(), 0);
        assert!(pool.is_exhausted());
        assert_eq!(pool.get(opt::PEND_NON_BLOCKING), Err(OsError::Resource));
    }

    #[test]
    fn test_get_put_inverse() {
        let mut storage = [0u64; 4];
        let base = storage.as_mut_ptr() as *mut u8;

        let mut pool = OsMemPool::new();
        pool.create(base, 2, 16, "pool").unwrap();

        let blk = pool.get(opt::PEND_NON_BLOCKING).unwrap();
        assert_eq!(pool.free_blocks(), 1);

        pool.put(blk, opt::NONE).unwrap();
        assert_eq!(pool.free_blocks(), 2);

        // The released block is the new head
        assert_eq!(pool.get(opt::PEND_NON_BLOCKING).unwrap(), blk);
    }

    #[test]
    fn test_put_validation() {
        let mut storage = [0u64; 4];
        let base = storage.as_mut_ptr() as *mut u8;

        let mut pool = OsMemPool::new();
        pool.create(base, 2, 16, "pool").unwrap();

        let blk = pool.get(opt::PEND_NON_BLOCKING).unwrap();

        unsafe {
            // Inside the pool but not on a block boundary
            assert_eq!(pool.put(base.add(8), opt::NONE), Err(OsError::NotAlign));
            // Past the end of the pool
            assert_eq!(
                pool.put(base.add(2 * 16), opt::NONE),
                Err(OsError::InvalidAddr)
            );
        }
        assert_eq!(
            pool.put((base as usize - 16) as *mut u8, opt::NONE),
            Err(OsError::InvalidAddr)
        );

        pool.put(blk, opt::NONE).unwrap();
        assert_eq!(pool.free_blocks(), 2);
    }

    #[test]
    fn test_create_param_checks() {
        let mut storage = [0u64; 4];
        let base = storage.as_mut_ptr() as *mut u8;

        let mut pool = OsMemPool::new();
        assert_eq!(
            pool.create(core::ptr::null_mut(), 2, 16, "bad"),
            Err(OsError::Param)
        );
        assert_eq!(pool.create(base, 0, 16, "bad"), Err(OsError::Param));
        // Block must hold at least one pointer
        assert_eq!(pool.create(base, 2, 2, "bad"), Err(OsError::Param));
        // Block size must be word-aligned
        assert_eq!(pool.create(base, 2, 17, "bad"), Err(OsError::Param));
        // Base must be word-aligned
        assert_eq!(
            pool.create(unsafe { base.add(1) }, 2, 16, "bad"),
            Err(OsError::Param)
        );
    }
}

#[cfg(test)]
mod sem_tests {
    use rvos::sem::OsSem;
    use rvos::types::opt;
    use rvos::OsError;

    #[test]
    fn test_post_counts_without_waiters() {
        let mut sem = OsSem::new(0);
        assert_eq!(sem.count(), 0);
        assert!(!sem.has_waiters());

        assert_eq!(sem.post(opt::NONE), Ok(1));
        assert_eq!(sem.post(opt::NONE), Ok(2));
        assert_eq!(sem.count(), 2);
    }

    #[test]
    fn test_counter_wrap_guarded() {
        let mut sem = OsSem::new(u32::MAX);
        assert_eq!(sem.post(opt::NONE), Err(OsError::SemOvf));
        assert_eq!(sem.count(), u32::MAX);
    }

    #[test]
    fn test_pend_requires_running_kernel() {
        let mut sem = OsSem::new(1);
        assert_eq!(sem.pend(opt::NONE), Err(OsError::OsNotRunning));
    }

    #[test]
    fn test_isr_post_without_waiters() {
        let mut sem = OsSem::new(0);
        let mut woken = true;
        assert_eq!(sem.post_from_isr(&mut woken), Ok(1));
        assert!(!woken);
    }
}

// Nesting, ownership, and priority-inheritance behavior need a live
// scheduler and run in tests/sync_tests.rs (their own process, since
// they flip the kernel's running state).
#[cfg(test)]
mod mutex_tests {
    use rvos::mutex::OsMutex;
    use rvos::types::opt;
    use rvos::OsError;

    #[test]
    fn test_fresh_mutex_is_free() {
        let mutex = OsMutex::new();
        assert!(!mutex.is_owned());
        assert_eq!(mutex.nesting(), 0);
        assert_eq!(mutex.owner_prio(), None);
    }

    #[test]
    fn test_ops_require_running_kernel() {
        let mut mutex = OsMutex::new();
        assert_eq!(mutex.pend(opt::NONE), Err(OsError::OsNotRunning));
        assert_eq!(mutex.post(opt::NONE), Err(OsError::OsNotRunning));
    }
}

#[cfg(test)]
mod kernel_tests {
    use rvos::OsError;

    #[test]
    fn test_lifecycle_guards() {
        // Task-level APIs refuse to run before the scheduler starts
        assert_eq!(rvos::os_sched_lock(), Err(OsError::OsNotRunning));
        assert_eq!(rvos::os_sched_unlock(), Err(OsError::OsNotRunning));
        assert_eq!(rvos::os_time_dly(10), Err(OsError::OsNotRunning));
        assert_eq!(rvos::os_task_del(None), Err(OsError::OsNotRunning));
        assert_eq!(rvos::os_start(), Err(OsError::OsNotInit));
    }

    #[test]
    fn test_hmsm_param_checks() {
        assert_eq!(rvos::os_time_dly_hmsm(0, 60, 0, 0), Err(OsError::Param));
        assert_eq!(rvos::os_time_dly_hmsm(0, 0, 60, 0), Err(OsError::Param));
        assert_eq!(rvos::os_time_dly_hmsm(0, 0, 0, 1000), Err(OsError::Param));
    }
}

#[cfg(test)]
mod error_tests {
    use rvos::error::OsError;

    #[test]
    fn test_error_variants() {
        assert!(OsError::None.is_ok());
        assert!(!OsError::None.is_err());

        assert!(!OsError::QFull.is_ok());
        assert!(OsError::QFull.is_err());

        assert_eq!(OsError::None, OsError::None);
        assert_ne!(OsError::Resource, OsError::Timeout);
    }

    #[test]
    fn test_error_codes_stable() {
        assert_eq!(OsError::None as u16, 0);
        assert_eq!(OsError::Param as u16, 1001);
        assert_eq!(OsError::QFull as u16, 4001);
        assert_eq!(OsError::InvalidAddr as u16, 5001);
        assert_eq!(OsError::NotAlign as u16, 5002);
    }

    #[test]
    fn test_error_debug() {
        // Ensure errors can be formatted for debugging
        let err = OsError::NotOwner;
        let _ = format!("{:?}", err);
    }
}

#[cfg(test)]
mod types_tests {
    use rvos::types::*;

    #[test]
    fn test_task_state_enum() {
        let state = OsTaskState::Ready;
        assert_eq!(state, OsTaskState::Ready);
        assert_ne!(state, OsTaskState::Blocked);
        assert_ne!(state, OsTaskState::Deleted);
    }

    #[test]
    fn test_option_flags() {
        use rvos::types::opt::*;

        assert_eq!(NONE, 0);
        assert_eq!(PEND_NON_BLOCKING, 0x8000);
        assert_eq!(POST_NO_SCHED, 0x8000);

        let combined = POST_FIFO | POST_NO_SCHED;
        assert_eq!(combined & POST_NO_SCHED, POST_NO_SCHED);
    }
}

#[cfg(test)]
mod config_tests {
    use rvos::config::*;

    #[test]
    fn test_config_values() {
        assert_eq!(CFG_PRIO_MAX, 32, "One bitmap word indexes the queues");

        assert!(CFG_STK_SIZE_MIN >= 32, "Stack too small");
        assert!(CFG_STK_SIZE_IDLE >= CFG_STK_SIZE_MIN);

        assert!(CFG_TICK_RATE_HZ >= 10, "Tick rate too slow");
        assert!(CFG_TICK_RATE_HZ <= 10000, "Tick rate too fast");

        assert_eq!(CFG_STK_MAGIC, 0xDEAD_BEEF);

        // Idle priority should be lowest
        assert_eq!(CFG_PRIO_IDLE, (CFG_PRIO_MAX - 1) as u8);
    }
}
