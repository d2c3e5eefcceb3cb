use radar_health::scheduler::*;

#[test]
fn test_dirty_set_overflow_requests_full_pass() {
    let mut scheduler = UpdateScheduler::new(50);
    for i in 0..(MAX_DIRTY_UNITS + 4) {
        scheduler.schedule_recompute(&format!("UNIT-{i:03}"), 0);
    }
    let pass = scheduler.poll(50).unwrap();
    assert!(pass.full);
    assert_eq!(pass.units.len(), MAX_DIRTY_UNITS);

    // The overflow flag does not leak into the next window
    scheduler.schedule_recompute("UNIT-000", 60);
    let pass = scheduler.poll(110).unwrap();
    assert!(!pass.full);
    assert_eq!(pass.units, vec!["UNIT-000".to_string()]);
}

#[test]
fn test_request_after_fire_opens_new_window() {
    let mut scheduler = UpdateScheduler::new(75);
    scheduler.schedule_recompute("TX-001", 0);
    assert!(scheduler.is_armed());
    assert!(scheduler.poll(75).is_some());
    assert!(!scheduler.is_pending());

    // Never dropped, only delayed to the next window
    scheduler.schedule_recompute("TX-001", 80);
    assert!(scheduler.poll(100).is_none());
    assert!(scheduler.poll(155).is_some());
    assert_eq!(scheduler.get_stats().total_passes, 2);
}

#[test]
fn test_cancel_drops_pending_work() {
    let mut scheduler = UpdateScheduler::new(75);
    scheduler.schedule_recompute("PSU-001", 0);
    scheduler.cancel();
    assert!(!scheduler.is_armed());
    assert!(scheduler.poll(1000).is_none());
    assert_eq!(scheduler.get_stats().currently_dirty, 0);
}

#[test]
fn test_suspend_keeps_dirty_units_for_resume() {
    let mut scheduler = UpdateScheduler::new(75);
    scheduler.schedule_recompute("PSU-001", 0);
    scheduler.suspend();
    assert!(!scheduler.is_armed());
    assert!(scheduler.poll(1000).is_none());

    assert!(scheduler.resume(1000));
    let pass = scheduler.poll(1075).unwrap();
    assert_eq!(pass.units, vec!["PSU-001".to_string()]);
    assert!(!pass.full);

    // Nothing left to re-arm.
    assert!(!scheduler.resume(2000));
    assert!(!scheduler.is_armed());
}

#[test]
fn test_debouncer_cancel_discards_held_signal() {
    let mut debouncer = Debouncer::new(50);
    assert!(debouncer.signal(0));
    assert!(!debouncer.signal(10));
    assert!(debouncer.is_pending());
    debouncer.cancel();
    assert!(!debouncer.poll(100));
}

#[test]
fn test_task_queue_capacity_and_clear() {
    let mut queue: TaskQueue<u32> = TaskQueue::new();
    let mut accepted = 0;
    for i in 0..100 {
        if queue.schedule(i, 1_000 + u64::from(i), 0).is_ok() {
            accepted += 1;
        }
    }
    assert!(accepted < 100);
    assert_eq!(queue.len(), accepted);
    assert!(queue.schedule(999, 5_000, 0).is_err());

    // Ready tasks come out in bounded chunks
    let first = queue.ready(10_000);
    assert_eq!(first.len(), MAX_READY_TASKS);
    assert_eq!(first[0], 0);

    queue.clear_all();
    assert!(queue.is_empty());
    assert_eq!(queue.get_stats().total_cancelled as usize, accepted - MAX_READY_TASKS);
}

#[test]
fn test_equal_deadlines_keep_fifo_order() {
    let mut queue = TaskQueue::new();
    queue.schedule("late", 500, 0).unwrap();
    queue.schedule("first", 100, 0).unwrap();
    queue.schedule("second", 100, 0).unwrap();
    assert_eq!(queue.ready(500).as_slice(), &["first", "second", "late"]);
}
