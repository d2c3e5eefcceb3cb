//! Clock-driven throttle, debounce and delayed-task primitives.
//!
//! Nothing here owns a thread or a timer. Callers pass the current time in
//! milliseconds and poll; a "timer" is just a deadline that fires on the
//! first poll at or after it. Stopping means cancelling the deadlines; work
//! they guarded is re-armed on restart.

use heapless::Vec;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

pub const MAX_DIRTY_UNITS: usize = 16;
const MAX_SCHEDULED_TASKS: usize = 32;
pub const MAX_READY_TASKS: usize = 8;

const_assert!(MAX_READY_TASKS <= MAX_SCHEDULED_TASKS);
const_assert!(MAX_DIRTY_UNITS >= crate::subsystems::MAX_UNITS);

const DEFAULT_TASK_HORIZON_MS: u64 = 3_600_000;

/// Single-shot timer that is only re-armed when idle.
///
/// Any number of requests while armed collapse into the one pending fire.
#[derive(Debug, Clone, Default)]
pub struct Throttle {
    interval_ms: u64,
    deadline: Option<u64>,
    pending: bool,
}

impl Throttle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            deadline: None,
            pending: false,
        }
    }

    /// Marks work pending. Returns `true` when this call armed the timer.
    pub fn request(&mut self, now: u64) -> bool {
        self.pending = true;
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now.saturating_add(self.interval_ms));
        true
    }

    /// Fires once the deadline has passed, clearing the pending flag.
    pub fn fire(&mut self, now: u64) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                std::mem::take(&mut self.pending)
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.pending = false;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }
}

/// Rate limiter for outgoing notifications.
///
/// A signal emits immediately when the previous emission is at least one
/// interval old. Otherwise it is held, and every held signal in the window
/// is flushed as one emission when the window closes.
#[derive(Debug, Clone, Default)]
pub struct Debouncer {
    interval_ms: u64,
    last_emit: Option<u64>,
    deadline: Option<u64>,
}

impl Debouncer {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_emit: None,
            deadline: None,
        }
    }

    /// Returns `true` if the caller should emit now.
    pub fn signal(&mut self, now: u64) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        match self.last_emit {
            Some(last) if now.saturating_sub(last) < self.interval_ms => {
                self.deadline = Some(last.saturating_add(self.interval_ms));
                false
            }
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }

    /// Returns `true` when a held signal is due.
    pub fn poll(&mut self, now: u64) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.last_emit = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub total_requests: u64,
    pub total_passes: u64,
    /// Requests absorbed by an already-armed window.
    pub total_coalesced: u64,
    pub currently_dirty: u8,
}

/// Work released by one throttle window.
#[derive(Debug, Clone, PartialEq)]
pub struct RecomputePass {
    pub units: std::vec::Vec<String>,
    /// Set when more units were dirtied than the set can hold; the caller
    /// recomputes every unit.
    pub full: bool,
}

/// Collapses per-unit recompute requests into one system-wide pass per
/// throttle interval.
#[derive(Debug)]
pub struct UpdateScheduler {
    throttle: Throttle,
    dirty: Vec<String, MAX_DIRTY_UNITS>,
    overflowed: bool,
    stats: SchedulerStats,
}

impl UpdateScheduler {
    pub fn new(throttle_interval_ms: u64) -> Self {
        Self {
            throttle: Throttle::new(throttle_interval_ms),
            dirty: Vec::new(),
            overflowed: false,
            stats: SchedulerStats::default(),
        }
    }

    pub fn schedule_recompute(&mut self, unit_id: &str, now: u64) {
        self.stats.total_requests += 1;
        if !self.dirty.iter().any(|id| id == unit_id) && self.dirty.push(unit_id.to_string()).is_err() {
            self.overflowed = true;
        }
        if !self.throttle.request(now) {
            self.stats.total_coalesced += 1;
        }
        self.stats.currently_dirty = self.dirty.len() as u8;
    }

    /// Releases the pending pass once the throttle window has elapsed.
    pub fn poll(&mut self, now: u64) -> Option<RecomputePass> {
        if !self.throttle.fire(now) {
            return None;
        }

        // NASA Rule 5: Safety assertion for dirty set bound
        debug_assert!(
            self.dirty.len() <= MAX_DIRTY_UNITS,
            "Dirty set length {} exceeds capacity {}",
            self.dirty.len(),
            MAX_DIRTY_UNITS
        );

        let mut units: std::vec::Vec<String> = self.dirty.iter().cloned().collect();
        units.sort();
        self.dirty.clear();
        let full = std::mem::take(&mut self.overflowed);
        self.stats.total_passes += 1;
        self.stats.currently_dirty = 0;
        Some(RecomputePass { units, full })
    }

    pub fn is_pending(&self) -> bool {
        self.throttle.is_pending()
    }

    pub fn is_armed(&self) -> bool {
        self.throttle.is_armed()
    }

    /// Drops the armed window but keeps the dirty set, so nothing already
    /// requested is lost across a stop.
    pub fn suspend(&mut self) {
        self.throttle.cancel();
    }

    /// Re-arms the window for units left dirty by [`suspend`](Self::suspend).
    /// Returns `true` when a pass is now pending.
    pub fn resume(&mut self, now: u64) -> bool {
        if self.dirty.is_empty() && !self.overflowed {
            return false;
        }
        self.throttle.request(now);
        true
    }

    /// Drops the armed window and any pending units.
    pub fn cancel(&mut self) {
        self.throttle.cancel();
        self.dirty.clear();
        self.overflowed = false;
        self.stats.currently_dirty = 0;
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask<T> {
    pub task: T,
    pub execute_at: u64,
    pub scheduled_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskQueueStats {
    pub total_scheduled: u32,
    pub total_executed: u32,
    pub total_cancelled: u32,
    pub currently_scheduled: u8,
}

/// Delayed-task queue ordered by execution time.
#[derive(Debug)]
pub struct TaskQueue<T> {
    tasks: Vec<ScheduledTask<T>, MAX_SCHEDULED_TASKS>,
    stats: TaskQueueStats,
    horizon_ms: u64,
}

impl<T: Clone> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            stats: TaskQueueStats::default(),
            horizon_ms: DEFAULT_TASK_HORIZON_MS,
        }
    }

    pub fn schedule(&mut self, task: T, execute_at: u64, current_time: u64) -> Result<(), &'static str> {
        if execute_at > current_time.saturating_add(self.horizon_ms) {
            return Err("Execution time too far in future");
        }
        if self.tasks.is_full() {
            return Err("Task queue full");
        }

        let scheduled = ScheduledTask {
            task,
            execute_at,
            scheduled_at: current_time,
        };
        let append = self.tasks.last().map_or(true, |last| last.execute_at <= execute_at);
        if self.tasks.push(scheduled).is_err() {
            return Err("Task queue full");
        }
        if !append {
            // Stable sort keeps FIFO order among equal deadlines.
            self.tasks.sort_by_key(|t| t.execute_at);
        }

        self.stats.total_scheduled += 1;
        self.stats.currently_scheduled = self.tasks.len() as u8;
        Ok(())
    }

    /// Removes and returns due tasks, oldest deadline first. Anything beyond
    /// the ready buffer stays queued for the next poll.
    pub fn ready(&mut self, current_time: u64) -> Vec<T, MAX_READY_TASKS> {
        let mut ready: Vec<T, MAX_READY_TASKS> = Vec::new();
        let due = self
            .tasks
            .iter()
            .take_while(|t| t.execute_at <= current_time)
            .count()
            .min(MAX_READY_TASKS);

        for scheduled in self.tasks.iter().take(due) {
            let _ = ready.push(scheduled.task.clone());
        }
        for _ in 0..due {
            self.tasks.remove(0);
            self.stats.total_executed += 1;
        }

        self.stats.currently_scheduled = self.tasks.len() as u8;
        ready
    }

    /// Drops every queued task matching `predicate`; returns how many.
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| !predicate(&t.task));
        let cancelled = before - self.tasks.len();
        self.stats.total_cancelled += cancelled as u32;
        self.stats.currently_scheduled = self.tasks.len() as u8;
        cancelled
    }

    pub fn clear_all(&mut self) {
        self.stats.total_cancelled += self.tasks.len() as u32;
        self.tasks.clear();
        self.stats.currently_scheduled = 0;
    }

    pub fn scheduled(&self) -> &[ScheduledTask<T>] {
        &self.tasks
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.tasks.first().map(|t| t.execute_at)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn set_horizon_ms(&mut self, horizon_ms: u64) {
        self.horizon_ms = horizon_ms;
    }

    pub fn get_stats(&self) -> &TaskQueueStats {
        &self.stats
    }
}

impl<T: Clone> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_rearms_only_when_idle() {
        let mut throttle = Throttle::new(75);
        assert!(throttle.request(1000));
        assert!(!throttle.request(1010));
        assert_eq!(throttle.deadline(), Some(1075));

        assert!(!throttle.fire(1074));
        assert!(throttle.fire(1075));
        assert!(!throttle.is_armed());
        assert!(!throttle.fire(2000));

        assert!(throttle.request(2000));
        assert_eq!(throttle.deadline(), Some(2075));
    }

    #[test]
    fn test_debouncer_holds_inside_window() {
        let mut debouncer = Debouncer::new(50);
        assert!(debouncer.signal(1000));
        assert!(!debouncer.signal(1010));
        assert!(!debouncer.signal(1020));
        assert!(!debouncer.poll(1049));
        assert!(debouncer.poll(1050));
        assert!(!debouncer.poll(1100));
        assert!(debouncer.signal(1200));
    }

    #[test]
    fn test_burst_collapses_into_one_pass() {
        let mut scheduler = UpdateScheduler::new(75);
        for i in 0..50 {
            scheduler.schedule_recompute(if i % 2 == 0 { "TX-001" } else { "RX-001" }, 1000 + i);
        }
        assert!(scheduler.poll(1050).is_none());
        let pass = scheduler.poll(1075).unwrap();
        assert_eq!(pass.units, vec!["RX-001".to_string(), "TX-001".to_string()]);
        assert!(!pass.full);
        assert!(scheduler.poll(1200).is_none());

        let stats = scheduler.get_stats();
        assert_eq!(stats.total_requests, 50);
        assert_eq!(stats.total_passes, 1);
        assert_eq!(stats.total_coalesced, 49);
    }

    #[test]
    fn test_task_queue_orders_by_deadline() {
        let mut queue = TaskQueue::new();
        queue.schedule(3u32, 4000, 1000).unwrap();
        queue.schedule(1u32, 2000, 1000).unwrap();
        queue.schedule(2u32, 3000, 1000).unwrap();

        assert!(queue.ready(1999).is_empty());
        assert_eq!(queue.ready(3000).as_slice(), &[1, 2]);
        assert_eq!(queue.next_deadline(), Some(4000));
        assert_eq!(queue.ready(5000).as_slice(), &[3]);
        assert_eq!(queue.get_stats().total_executed, 3);
    }

    #[test]
    fn test_task_queue_rejects_far_future() {
        let mut queue: TaskQueue<u8> = TaskQueue::new();
        queue.set_horizon_ms(5000);
        assert!(queue.schedule(1, 10_000, 1000).is_err());
        assert!(queue.schedule(1, 6000, 1000).is_ok());
        assert_eq!(queue.cancel_where(|t| *t == 1), 1);
        assert!(queue.is_empty());
    }
}
