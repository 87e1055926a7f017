//! Curse/uncurse task scheduling.
//!
//! One global min-priority queue of `(time, station, kind)` obligations
//! plus the control loop that pops, sleeps, executes and re-schedules.
//! The scheduler owns the queue, the station set, the device backends and
//! the wait controller -- there is no shared global state, so every test
//! gets a fresh scheduler.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::device::{Device, Point};
use crate::error::{ConfigError, CoreError};
use crate::retry::Interactor;
use crate::station::{Station, StationId};
use crate::timefmt;
use crate::waits::WaitOptimizer;

/// What a scheduled obligation does when it comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Curse,
    Uncurse,
}

/// One future obligation. Never mutated -- rescheduling pushes a new
/// task.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledTask {
    /// Epoch seconds at which the task is due.
    pub execution_time: f64,
    pub station: StationId,
    pub kind: TaskKind,
    /// Monotonic tie-breaker: equal execution times pop in insertion
    /// order.
    pub seq: u64,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.execution_time == other.execution_time && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    // Inverted so the std max-heap pops the earliest time first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .execution_time
            .partial_cmp(&self.execution_time)
            .unwrap_or(CmpOrdering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-priority queue keyed by execution time.
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<ScheduledTask>,
    next_seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new obligation. Never fails.
    pub fn schedule(&mut self, execution_time: f64, station: StationId, kind: TaskKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledTask {
            execution_time,
            station,
            kind,
            seq,
        });
    }

    /// The earliest obligation, if any.
    pub fn peek(&self) -> Option<&ScheduledTask> {
        self.heap.peek()
    }

    /// Remove and return the earliest obligation.
    pub fn pop(&mut self) -> Option<ScheduledTask> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Unordered read-only view, used by the conflict scan.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.heap.iter()
    }
}

/// Whether a curse due at `pending_time` should take the instant drone
/// path: true as soon as any other queued curse falls within
/// `threshold` seconds after it. Earlier tasks never count, whatever
/// their distance.
pub fn should_expedite(pending_time: f64, queue: &TaskQueue, threshold: f64) -> bool {
    queue.iter().any(|task| {
        task.kind == TaskKind::Curse && {
            let gap = task.execution_time - pending_time;
            gap > 0.0 && gap <= threshold
        }
    })
}

/// Chunk size for interruptible sleeping: long sleeps are cut into
/// pieces so the stop flag is honoured promptly. The queue head is NOT
/// re-read between chunks of a deep sleep.
const SLEEP_CHUNK: f64 = 30.0;

/// The system's main driver: owns every moving part and runs the
/// protocol loop on a single thread of control.
pub struct Scheduler<D: Device, C: Clock> {
    config: Config,
    queue: TaskQueue,
    stations: Vec<Station>,
    waits: WaitOptimizer,
    device: D,
    clock: C,
    dispatches: u64,
    expedited: u64,
}

impl<D: Device, C: Clock> Scheduler<D, C> {
    /// Build a scheduler. Fails when the config invariants do not hold --
    /// a loop started on a bad window geometry would oversleep or
    /// busy-poll.
    pub fn new(
        config: Config,
        device: D,
        clock: C,
        waits: WaitOptimizer,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            queue: TaskQueue::new(),
            stations: Vec::new(),
            waits,
            device,
            clock,
            dispatches: 0,
            expedited: 0,
        })
    }

    /// Register a discovered station. Ids are 1-based and stable for the
    /// process lifetime.
    pub fn add_station(&mut self, position: Point) -> StationId {
        let id = self.stations.len() as StationId + 1;
        self.stations.push(Station::new(id, position));
        id
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn waits(&self) -> &WaitOptimizer {
        &self.waits
    }

    pub fn waits_mut(&mut self) -> &mut WaitOptimizer {
        &mut self.waits
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Obligations dispatched so far.
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    /// Dispatches that took the drone path.
    pub fn expedited(&self) -> u64 {
        self.expedited
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Measure every registered station and queue its first curse.
    pub fn bootstrap(&mut self) {
        self.device.reach_base_left();
        for idx in 0..self.stations.len() {
            let station = &mut self.stations[idx];
            let mut ix = Interactor::new(&mut self.device, &mut self.waits, &self.clock);
            if !station.initialize(&mut ix, &self.config, &mut self.queue) {
                warn!(station = station.id(), "station failed to initialize; not scheduled");
            }
            self.device.reach_base_left();
        }
    }

    /// Run the protocol loop until the stop flag is raised.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!(
            buffer = self.config.scheduler.execution_buffer,
            conflict_threshold = self.config.scheduler.conflict_threshold,
            stations = self.stations.len(),
            "cursing protocol started"
        );
        while !stop.load(Ordering::Relaxed) {
            if let Err(e) = self.step(stop) {
                error!(error = %e, "protocol error; backing off");
                self.sleep_checked(self.config.scheduler.idle_sleep, stop);
            }
        }
        info!("cursing protocol stopped");
    }

    /// One protocol-loop iteration: sleep toward the queue head or
    /// dispatch it. `run()` drives this; the simulation harness calls it
    /// directly.
    pub fn step(&mut self, stop: &AtomicBool) -> Result<(), CoreError> {
        let Some(head) = self.queue.peek() else {
            debug!(
                idle = self.config.scheduler.idle_sleep,
                "queue empty, checking again later"
            );
            self.sleep_checked(self.config.scheduler.idle_sleep, stop);
            return Ok(());
        };
        let (due_time, kind, station) = (head.execution_time, head.kind, head.station);

        let now = self.clock.now();
        let time_left = due_time - now;
        let buffer = self.config.scheduler.execution_buffer;
        let early_wakeup = self.config.scheduler.early_wakeup;
        let poll_interval = self.config.scheduler.poll_interval;

        if time_left <= buffer {
            if let Some(task) = self.queue.pop() {
                self.dispatch(task)?;
            }
        } else if time_left > early_wakeup {
            // Deep sleep: one long block toward the early-wakeup point.
            info!(
                station,
                kind = ?kind,
                eta = %timefmt::format_eta(now, due_time),
                "next task; deep sleep"
            );
            self.sleep_checked(time_left - early_wakeup, stop);
        } else {
            // Monitoring: bounded increments, re-deriving time_left from
            // the queue head on every iteration.
            self.sleep_checked(poll_interval.min(time_left - buffer), stop);
        }
        Ok(())
    }

    fn dispatch(&mut self, task: ScheduledTask) -> Result<(), CoreError> {
        self.dispatches += 1;

        let Some(idx) = self.stations.iter().position(|s| s.id() == task.station) else {
            warn!(station = task.station, "task for unknown station dropped");
            return Ok(());
        };

        match task.kind {
            TaskKind::Curse => {
                let expedite = should_expedite(
                    task.execution_time,
                    &self.queue,
                    self.config.scheduler.conflict_threshold,
                );
                if expedite {
                    self.expedited += 1;
                    info!(station = task.station, "conflict detected, using drones");
                }
                self.device.reach_base_left();
                let station = &mut self.stations[idx];
                let mut ix = Interactor::new(&mut self.device, &mut self.waits, &self.clock);
                if !station.curse(&mut ix, &self.config, &mut self.queue, expedite) {
                    warn!(
                        station = task.station,
                        "curse transition failed; station stalled"
                    );
                }
            }
            TaskKind::Uncurse => {
                self.device.reach_base_left();
                // Order collection is time-gated: popped early via the
                // buffer window, but never run early.
                let remaining = task.execution_time - self.clock.now();
                if remaining > 0.0 {
                    self.clock.sleep(remaining);
                }
                let station = &mut self.stations[idx];
                let mut ix = Interactor::new(&mut self.device, &mut self.waits, &self.clock);
                if !station.uncurse(&mut ix, &self.config, &mut self.queue) {
                    warn!(
                        station = task.station,
                        "uncurse transition failed; station stalled"
                    );
                }
            }
        }
        Ok(())
    }

    /// Sleep in bounded chunks, bailing out early when the stop flag is
    /// raised.
    fn sleep_checked(&self, secs: f64, stop: &AtomicBool) {
        let mut remaining = secs;
        while remaining > 0.0 && !stop.load(Ordering::Relaxed) {
            let chunk = remaining.min(SLEEP_CHUNK);
            self.clock.sleep(chunk);
            remaining -= chunk;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use crate::simulation::SimDevice;

    // ── Queue ────────────────────────────────────────────────────────

    #[test]
    fn pop_always_returns_minimum_time() {
        let mut queue = TaskQueue::new();
        for &t in &[50.0, 10.0, 30.0, 20.0, 40.0, 15.0] {
            queue.schedule(t, 1, TaskKind::Curse);
        }
        let mut popped = Vec::new();
        while let Some(task) = queue.pop() {
            popped.push(task.execution_time);
        }
        let mut sorted = popped.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(popped, sorted);
    }

    #[test]
    fn equal_times_pop_in_insertion_order() {
        let mut queue = TaskQueue::new();
        queue.schedule(100.0, 1, TaskKind::Curse);
        queue.schedule(100.0, 2, TaskKind::Uncurse);
        queue.schedule(100.0, 3, TaskKind::Curse);
        assert_eq!(queue.pop().unwrap().station, 1);
        assert_eq!(queue.pop().unwrap().station, 2);
        assert_eq!(queue.pop().unwrap().station, 3);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut queue = TaskQueue::new();
        queue.schedule(5.0, 1, TaskKind::Curse);
        assert_eq!(queue.peek().unwrap().station, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn empty_queue_signals_none() {
        let mut queue = TaskQueue::new();
        assert!(queue.peek().is_none());
        assert!(queue.pop().is_none());
    }

    // ── Conflict resolver ────────────────────────────────────────────

    #[test]
    fn conflict_within_threshold_expedites() {
        let mut queue = TaskQueue::new();
        queue.schedule(1100.0, 2, TaskKind::Curse);
        assert!(should_expedite(1000.0, &queue, 240.0));
    }

    #[test]
    fn conflict_at_exact_threshold_expedites() {
        let mut queue = TaskQueue::new();
        queue.schedule(1240.0, 2, TaskKind::Curse);
        assert!(should_expedite(1000.0, &queue, 240.0));
    }

    #[test]
    fn gap_beyond_threshold_does_not_expedite() {
        let mut queue = TaskQueue::new();
        queue.schedule(1241.0, 2, TaskKind::Curse);
        assert!(!should_expedite(1000.0, &queue, 240.0));
    }

    #[test]
    fn earlier_tasks_never_expedite() {
        let mut queue = TaskQueue::new();
        queue.schedule(999.0, 2, TaskKind::Curse);
        assert!(!should_expedite(1000.0, &queue, 240.0));
    }

    #[test]
    fn uncurse_tasks_are_ignored_by_conflict_scan() {
        let mut queue = TaskQueue::new();
        queue.schedule(1050.0, 2, TaskKind::Uncurse);
        assert!(!should_expedite(1000.0, &queue, 240.0));
    }

    // ── Loop ─────────────────────────────────────────────────────────

    fn test_scheduler(timer_script: Vec<f64>) -> Scheduler<SimDevice, SimClock> {
        let mut config = Config::default();
        config.scheduler.execution_buffer = 30.0;
        config.scheduler.early_wakeup = 120.0;
        config.scheduler.poll_interval = 5.0;
        let device = SimDevice::new(7, timer_script);
        let clock = SimClock::new(1_000_000.0);
        let waits = WaitOptimizer::new(true, config.waits.max_retries);
        Scheduler::new(config, device, clock, waits).unwrap()
    }

    #[test]
    fn invalid_config_refuses_to_start() {
        let mut config = Config::default();
        config.scheduler.early_wakeup = 1.0;
        let device = SimDevice::new(7, vec![]);
        let clock = SimClock::new(0.0);
        let waits = WaitOptimizer::new(true, 4);
        assert!(Scheduler::new(config, device, clock, waits).is_err());
    }

    #[test]
    fn task_outside_buffer_is_not_dispatched() {
        let mut sched = test_scheduler(vec![600.0]);
        sched.add_station(Point::new(200, 400));
        let now = sched.clock.now();
        sched.queue.schedule(now + 31.0, 1, TaskKind::Curse);

        let stop = AtomicBool::new(false);
        sched.step(&stop).unwrap();
        assert_eq!(sched.dispatches(), 0);
        // Monitoring phase: slept at most one poll interval.
        assert!(sched.clock.now() - now <= 5.0 + 1e-9);
    }

    #[test]
    fn task_at_buffer_boundary_is_dispatched() {
        let mut sched = test_scheduler(vec![600.0, 650.0]);
        sched.add_station(Point::new(200, 400));
        let now = sched.clock.now();
        sched.queue.schedule(now + 30.0, 1, TaskKind::Curse);

        let stop = AtomicBool::new(false);
        sched.step(&stop).unwrap();
        assert_eq!(sched.dispatches(), 1);
    }

    #[test]
    fn far_task_triggers_deep_sleep_toward_early_wakeup() {
        let mut sched = test_scheduler(vec![600.0]);
        sched.add_station(Point::new(200, 400));
        let now = sched.clock.now();
        sched.queue.schedule(now + 500.0, 1, TaskKind::Curse);

        let stop = AtomicBool::new(false);
        sched.step(&stop).unwrap();
        assert_eq!(sched.dispatches(), 0);
        let slept = sched.clock.now() - now;
        assert!((slept - 380.0).abs() < 1e-9, "slept = {slept}");
    }

    #[test]
    fn empty_queue_idles() {
        let mut sched = test_scheduler(vec![]);
        let now = sched.clock.now();
        let stop = AtomicBool::new(false);
        sched.step(&stop).unwrap();
        assert!((sched.clock.now() - now - 60.0).abs() < 1e-9);
    }

    #[test]
    fn near_simultaneous_curses_take_the_drone_path() {
        let mut sched = test_scheduler(vec![600.0, 650.0, 580.0, 620.0]);
        sched.add_station(Point::new(200, 400));
        sched.add_station(Point::new(400, 400));
        let now = sched.clock.now();
        sched.queue.schedule(now + 10.0, 1, TaskKind::Curse);
        sched.queue.schedule(now + 110.0, 2, TaskKind::Curse);

        let stop = AtomicBool::new(false);
        sched.step(&stop).unwrap();
        assert_eq!(sched.dispatches(), 1);
        assert_eq!(sched.expedited(), 1);
        assert!(sched.device().template_clicks("drones-confirm") > 0);
        // The expedited station came straight back out of the cursed
        // state and re-queued its next curse.
        assert!(!sched.stations()[0].is_cursed());
    }

    #[test]
    fn uncurse_popped_early_waits_for_its_exact_time() {
        let mut sched = test_scheduler(vec![600.0, 650.0]);
        sched.add_station(Point::new(200, 400));
        // Give the station a cursed state so the uncurse has a roster to
        // restore.
        let stop = AtomicBool::new(false);
        let now = sched.clock.now();
        sched.queue.schedule(now + 20.0, 1, TaskKind::Curse);
        sched.step(&stop).unwrap();
        assert!(sched.stations()[0].is_cursed());

        let due = sched.queue.peek().unwrap().execution_time;
        // Advance into the buffer window but short of the due time.
        let lead = due - sched.clock.now() - 15.0;
        if lead > 0.0 {
            sched.clock.advance(lead);
        }
        sched.step(&stop).unwrap();
        assert_eq!(sched.dispatches(), 2);
        // The loop blocked until at least the scheduled timestamp before
        // acting.
        assert!(sched.clock.now() >= due);
        assert!(!sched.stations()[0].is_cursed());
    }

    #[test]
    fn unknown_station_task_is_dropped_not_fatal() {
        let mut sched = test_scheduler(vec![]);
        let now = sched.clock.now();
        sched.queue.schedule(now, 99, TaskKind::Curse);
        let stop = AtomicBool::new(false);
        sched.step(&stop).unwrap();
        assert_eq!(sched.dispatches(), 1);
        assert!(sched.queue_is_empty());
    }

    #[test]
    fn stop_flag_cuts_sleep_short() {
        let mut sched = test_scheduler(vec![]);
        let now = sched.clock.now();
        let stop = AtomicBool::new(true);
        sched.step(&stop).unwrap();
        // Stop was already raised; no sleep happened.
        assert!((sched.clock.now() - now).abs() < 1e-9);
    }
}
