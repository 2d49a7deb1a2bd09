//! Tick-driven cooperative scheduler.
//!
//! [`Scheduler`] owns the task set, the simulated clock, and a
//! [`DispatchPolicy`].  The driver repeatedly calls [`Scheduler::tick`]; each
//! tick:
//!
//! 1. advances the clock by the nominal step,
//! 2. releases every due task (all releases happen before any execution),
//! 3. asks the policy to order the ready set (priority or deadline order,
//!    ties broken by ascending task id),
//! 4. queries the load estimator once, when the policy sheds,
//! 5. dispatches the surviving tasks to completion, one at a time, measuring
//!    each workload invocation and checking it against the instance's
//!    absolute deadline.
//!
//! Scheduling is single-threaded and cooperative: a dispatched task always
//! runs to completion; a "timeout" is represented after the fact as a
//! deadline miss, never as interruption of the running call.
//!
//! # Clock convention
//! The clock advances by the nominal tick step supplied by the driver, never
//! by measured execution time.  Release timing is therefore independent of
//! execution jitter; measured time feeds deadline checks and statistics only.

pub mod error;
pub mod feasibility;
pub mod policy;

pub use error::{PolicyConfigError, SchedulerError, TaskConfigError};
pub use policy::{DispatchPolicy, FixedLoad, LoadEstimator, SheddingParams};

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::stats::{SchedulerStats, TaskStats};
use crate::task::{Criticality, Task, TaskId};
use feasibility::{check_liu_layland, liu_layland_bound, taskset_utilization};

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Monotonically advancing simulated time source, in microseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimClock {
    now_us: u64,
}

impl SimClock {
    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    fn advance(&mut self, step_us: u64) {
        self.now_us = self.now_us.saturating_add(step_us);
    }
}

// ── Tick outcome ──────────────────────────────────────────────────────────────

/// What happened during one tick.
///
/// `executed` preserves dispatch order, so policy-ordering properties are
/// observable without instrumenting workloads.
#[derive(Debug, Default)]
pub struct TickSummary {
    /// Ids released this tick.
    pub released: Vec<TaskId>,
    /// Ids executed this tick, in dispatch order.
    pub executed: Vec<TaskId>,
    /// Ids shed by the policy this tick (never dispatched; not misses).
    pub skipped: Vec<TaskId>,
    /// Ids whose completion exceeded their absolute deadline.
    pub missed: Vec<TaskId>,
    /// Workload invocation failures.  Each is fatal to its own instance only;
    /// the remaining ready tasks of the tick were still given their turn.
    pub faults: Vec<WorkloadFault>,
}

/// A workload invocation that returned an error.
#[derive(Debug)]
pub struct WorkloadFault {
    pub task_id: TaskId,
    pub task_name: String,
    pub error: anyhow::Error,
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// The scheduling core.
///
/// Sole owner of all mutable scheduling state (task runtime fields, clock,
/// counters).  The task set is fixed at construction; there is no dynamic
/// admission or removal.
pub struct Scheduler {
    tasks: Vec<Task>,
    policy: DispatchPolicy,
    load_estimator: Option<Box<dyn LoadEstimator>>,
    clock: SimClock,
    ticks: u64,
    control_overruns: u64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks)
            .field("policy", &self.policy)
            .field("load_estimator", &self.load_estimator.as_ref().map(|_| "<dyn LoadEstimator>"))
            .field("clock", &self.clock)
            .field("ticks", &self.ticks)
            .field("control_overruns", &self.control_overruns)
            .finish()
    }
}

impl Scheduler {
    /// Assemble a scheduler from a task set and a policy.
    ///
    /// Fails fast, before any tick: empty task set, duplicate task id, or a
    /// shedding policy without a load estimator.
    pub fn new(tasks: Vec<Task>, policy: DispatchPolicy) -> Result<Self, SchedulerError> {
        Self::build(tasks, policy, None)
    }

    /// Same as [`Scheduler::new`], with a load estimator for the
    /// mixed-criticality policy to consult.
    pub fn with_load_estimator(
        tasks: Vec<Task>,
        policy: DispatchPolicy,
        estimator: Box<dyn LoadEstimator>,
    ) -> Result<Self, SchedulerError> {
        Self::build(tasks, policy, Some(estimator))
    }

    fn build(
        tasks: Vec<Task>,
        policy: DispatchPolicy,
        load_estimator: Option<Box<dyn LoadEstimator>>,
    ) -> Result<Self, SchedulerError> {
        if tasks.is_empty() {
            return Err(SchedulerError::EmptyTaskSet);
        }
        let mut seen = HashSet::new();
        for task in &tasks {
            if !seen.insert(task.id()) {
                return Err(SchedulerError::DuplicateTaskId { id: task.id() });
            }
        }
        if policy.uses_load() && load_estimator.is_none() {
            return Err(SchedulerError::MissingLoadEstimator {
                policy: policy.name(),
            });
        }

        info!(
            policy = policy.name(),
            task_count = tasks.len(),
            utilization = taskset_utilization(&tasks),
            "scheduler initialised"
        );
        for task in &tasks {
            info!(
                id = task.id(),
                task = %task.name(),
                period_us = task.period_us(),
                deadline_us = task.deadline_us(),
                wcet_us = task.wcet_us(),
                priority = task.priority(),
                criticality = ?task.criticality(),
                "task registered"
            );
        }

        if matches!(
            policy,
            DispatchPolicy::RateMonotonic | DispatchPolicy::MixedCriticality(_)
        ) {
            warn_on_priority_period_mismatch(&tasks);
        }

        if let Some(total_u) = check_liu_layland(&tasks) {
            warn!(
                utilization = total_u,
                bound = liu_layland_bound(tasks.len()),
                task_count = tasks.len(),
                "task set may not be schedulable under rate-monotonic dispatch; \
                 response time analysis required"
            );
        }

        Ok(Self {
            tasks,
            policy,
            load_estimator,
            clock: SimClock::default(),
            ticks: 0,
            control_overruns: 0,
        })
    }

    // ── Tick loop ─────────────────────────────────────────────────────────────

    /// Advance simulated time by the nominal `elapsed_us` step and run one
    /// dispatch round.
    pub fn tick(&mut self, elapsed_us: u64) -> TickSummary {
        self.clock.advance(elapsed_us);
        self.ticks += 1;
        let now_us = self.clock.now_us();
        let mut summary = TickSummary::default();

        // Release phase: every due release happens before any execution.
        // At most one release per task per tick.
        let mut ready: Vec<usize> = Vec::new();
        for (idx, task) in self.tasks.iter_mut().enumerate() {
            if now_us >= task.next_release_us() {
                task.release(now_us);
                debug!(task = %task.name(), now_us, "released");
                summary.released.push(task.id());
                ready.push(idx);
            }
        }

        self.policy.order_ready(&self.tasks, &mut ready);

        let load = self.query_load();

        // Dispatch phase: run-to-completion, no preemption, no overlap.
        for idx in ready {
            let task = &mut self.tasks[idx];

            if self.policy.should_skip(task, load) {
                debug!(task = %task.name(), load, "instance shed under load");
                task.record_skip();
                summary.skipped.push(task.id());
                continue;
            }

            match task.execute() {
                Ok(exec_us) => {
                    summary.executed.push(task.id());
                    let completion_us = now_us.saturating_add(exec_us);
                    if !task.check_deadline(completion_us) {
                        summary.missed.push(task.id());
                        if task.criticality() == Criticality::Hard {
                            self.control_overruns += 1;
                            warn!(
                                task = %task.name(),
                                completion_us,
                                deadline_us = ?task.absolute_deadline_us(),
                                "control overrun; hard deadline violated"
                            );
                        } else {
                            debug!(task = %task.name(), completion_us, "deadline miss");
                        }
                    }
                }
                Err(error) => {
                    // Fatal for this instance only; the rest of the ready set
                    // still runs.
                    warn!(task = %task.name(), error = %error, "workload failed");
                    summary.faults.push(WorkloadFault {
                        task_id: task.id(),
                        task_name: task.name().to_string(),
                        error,
                    });
                }
            }
        }

        summary
    }

    /// Query the load estimator once for this tick.  Policies that never shed
    /// skip the query entirely.  Out-of-range figures are clamped to `[0, 1]`.
    fn query_load(&mut self) -> f64 {
        if !self.policy.uses_load() {
            return 0.0;
        }
        let Some(estimator) = self.load_estimator.as_mut() else {
            return 0.0;
        };
        let raw = estimator.current_load();
        if raw.is_nan() {
            warn!("load estimator returned NaN; treating as 0");
            return 0.0;
        }
        if !(0.0..=1.0).contains(&raw) {
            warn!(load = raw, "load estimator outside [0, 1]; clamping");
        }
        raw.clamp(0.0, 1.0)
    }

    // ── Observation ───────────────────────────────────────────────────────────

    /// Current simulated time in microseconds.
    pub fn now_us(&self) -> u64 {
        self.clock.now_us()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Snapshot of the run statistics.  Read-only and idempotent: calling it
    /// twice without an intervening tick returns identical values.
    pub fn stats(&self) -> SchedulerStats {
        let tasks: Vec<TaskStats> = self.tasks.iter().map(Task::stats).collect();

        let total_executions: u64 = tasks.iter().map(|t| t.executions).sum();
        let total_deadline_misses: u64 = tasks.iter().map(|t| t.deadline_misses).sum();
        let total_load_skips: u64 = tasks.iter().map(|t| t.load_skips).sum();
        let total_faults: u64 = tasks.iter().map(|t| t.faults).sum();

        let miss_rate = if total_executions > 0 {
            total_deadline_misses as f64 / total_executions as f64
        } else {
            0.0
        };

        SchedulerStats {
            policy: self.policy.name(),
            elapsed_us: self.clock.now_us(),
            ticks: self.ticks,
            total_executions,
            total_deadline_misses,
            total_load_skips,
            total_faults,
            control_overruns: self.control_overruns,
            miss_rate,
            cpu_utilization: taskset_utilization(&self.tasks),
            tasks,
        }
    }
}

/// Rate-monotonic assignment sanity check: shorter period should carry
/// higher priority.  Warning only.
fn warn_on_priority_period_mismatch(tasks: &[Task]) {
    let mut by_period: Vec<&Task> = tasks.iter().collect();
    by_period.sort_by_key(|t| (t.period_us(), t.id()));
    for pair in by_period.windows(2) {
        if pair[0].period_us() < pair[1].period_us() && pair[0].priority() < pair[1].priority() {
            warn!(
                task = %pair[0].name(),
                other = %pair[1].name(),
                "priority assignment disagrees with period rank; \
                 shorter period should carry higher priority"
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Workload;
    use std::time::Instant;

    const TICK_US: u64 = 1_000;

    fn noop() -> Box<dyn Workload> {
        Box::new(|| anyhow::Ok(()))
    }

    fn spin(busy_us: u64) -> Box<dyn Workload> {
        Box::new(move || {
            let start = Instant::now();
            while (start.elapsed().as_micros() as u64) < busy_us {}
            anyhow::Ok(())
        })
    }

    fn failing() -> Box<dyn Workload> {
        Box::new(|| -> anyhow::Result<()> { anyhow::bail!("sensor offline") })
    }

    fn task(
        id: TaskId,
        name: &str,
        period_us: u64,
        priority: i32,
        criticality: Criticality,
    ) -> Task {
        Task::new(id, name, period_us, period_us, 100, priority, criticality, noop()).unwrap()
    }

    fn task_stats(stats: &SchedulerStats, id: TaskId) -> &TaskStats {
        stats.tasks.iter().find(|t| t.id == id).unwrap()
    }

    fn run_ticks(scheduler: &mut Scheduler, ticks: u64) {
        for _ in 0..ticks {
            scheduler.tick(TICK_US);
        }
    }

    // ── Construction ──────────────────────────────────────────────────────────

    #[test]
    fn empty_task_set_is_rejected() {
        let err = Scheduler::new(vec![], DispatchPolicy::RateMonotonic).unwrap_err();
        assert!(matches!(err, SchedulerError::EmptyTaskSet));
    }

    #[test]
    fn duplicate_task_id_is_rejected() {
        let tasks = vec![
            task(1, "a", 5_000, 100, Criticality::Firm),
            task(1, "b", 10_000, 50, Criticality::Firm),
        ];
        let err = Scheduler::new(tasks, DispatchPolicy::RateMonotonic).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateTaskId { id: 1 }));
    }

    #[test]
    fn mixed_criticality_without_estimator_is_rejected() {
        let tasks = vec![task(1, "a", 5_000, 100, Criticality::Hard)];
        let err = Scheduler::new(
            tasks,
            DispatchPolicy::MixedCriticality(SheddingParams::default()),
        )
        .unwrap_err();
        assert!(matches!(err, SchedulerError::MissingLoadEstimator { .. }));
    }

    // ── Rate-monotonic scenarios ──────────────────────────────────────────────

    #[test]
    fn rms_two_task_scenario_executes_on_period() {
        // A: 5ms period, B: 20ms period, near-zero workloads, 100 ticks of 1ms.
        let tasks = vec![
            task(0, "fast", 5_000, 1_000, Criticality::Hard),
            task(1, "slow", 20_000, 500, Criticality::Firm),
        ];
        let mut scheduler = Scheduler::new(tasks, DispatchPolicy::RateMonotonic).unwrap();
        run_ticks(&mut scheduler, 100);

        let stats = scheduler.stats();
        let fast = task_stats(&stats, 0);
        let slow = task_stats(&stats, 1);
        assert_eq!(fast.executions, 20);
        assert_eq!(slow.executions, 5);
        assert_eq!(stats.total_deadline_misses, 0);
        assert_eq!(stats.total_load_skips, 0);
        assert_eq!(stats.control_overruns, 0);
    }

    #[test]
    fn rms_dispatches_in_descending_priority_order() {
        let tasks = vec![
            task(0, "low", 10_000, 100, Criticality::Soft),
            task(1, "high", 10_000, 900, Criticality::Hard),
            task(2, "mid", 10_000, 500, Criticality::Firm),
        ];
        let mut scheduler = Scheduler::new(tasks, DispatchPolicy::RateMonotonic).unwrap();
        let summary = scheduler.tick(TICK_US);
        assert_eq!(summary.executed, vec![1, 2, 0]);
    }

    #[test]
    fn rms_never_drops_tasks_regardless_of_load() {
        // An estimator is present and reports saturation, but the policy
        // never consults it.
        let tasks = vec![task(0, "soft", 5_000, 10, Criticality::Soft)];
        let mut scheduler = Scheduler::with_load_estimator(
            tasks,
            DispatchPolicy::RateMonotonic,
            Box::new(FixedLoad(1.0)),
        )
        .unwrap();
        run_ticks(&mut scheduler, 10);
        let stats = scheduler.stats();
        assert_eq!(stats.total_load_skips, 0);
        assert_eq!(task_stats(&stats, 0).executions, 2);
    }

    // ── Earliest-deadline-first ───────────────────────────────────────────────

    #[test]
    fn edf_dispatches_in_ascending_deadline_order() {
        // Priorities deliberately contradict deadlines.
        let tasks = vec![
            Task::new(0, "late", 100_000, 30_000, 100, 1_000, Criticality::Soft, noop()).unwrap(),
            Task::new(1, "early", 100_000, 10_000, 100, 1, Criticality::Soft, noop()).unwrap(),
            Task::new(2, "mid", 100_000, 20_000, 100, 500, Criticality::Soft, noop()).unwrap(),
        ];
        let mut scheduler = Scheduler::new(tasks, DispatchPolicy::EarliestDeadlineFirst).unwrap();
        let summary = scheduler.tick(TICK_US);
        assert_eq!(summary.executed, vec![1, 2, 0]);
    }

    // ── Mixed-criticality shedding ────────────────────────────────────────────

    #[test]
    fn shedding_scenario_sheds_all_soft_work_at_high_load() {
        // Hard 5ms + Soft 50ms at fixed load 0.97 for the whole run.
        let tasks = vec![
            task(0, "control", 5_000, 1_000, Criticality::Hard),
            task(1, "perception", 50_000, 100, Criticality::Soft),
        ];
        let mut scheduler = Scheduler::with_load_estimator(
            tasks,
            DispatchPolicy::MixedCriticality(SheddingParams::default()),
            Box::new(FixedLoad(0.97)),
        )
        .unwrap();
        run_ticks(&mut scheduler, 100);

        let stats = scheduler.stats();
        let hard = task_stats(&stats, 0);
        let soft = task_stats(&stats, 1);

        assert_eq!(hard.executions, hard.releases);
        assert_eq!(hard.executions, 20);
        assert_eq!(hard.load_skips, 0);

        assert_eq!(soft.load_skips, soft.releases);
        assert_eq!(soft.load_skips, 2);
        assert_eq!(soft.executions, 0);
        // A shed instance is not a miss.
        assert_eq!(soft.deadline_misses, 0);
    }

    #[test]
    fn soft_work_runs_below_the_threshold() {
        let tasks = vec![task(0, "perception", 5_000, 100, Criticality::Soft)];
        let mut scheduler = Scheduler::with_load_estimator(
            tasks,
            DispatchPolicy::MixedCriticality(SheddingParams::default()),
            Box::new(FixedLoad(0.5)),
        )
        .unwrap();
        run_ticks(&mut scheduler, 10);
        let stats = scheduler.stats();
        assert_eq!(task_stats(&stats, 0).executions, 2);
        assert_eq!(stats.total_load_skips, 0);
    }

    #[test]
    fn firm_work_survives_extreme_load() {
        let tasks = vec![
            task(0, "planning", 5_000, 800, Criticality::Firm),
            task(1, "logging", 5_000, 10, Criticality::Deferred),
        ];
        let mut scheduler = Scheduler::with_load_estimator(
            tasks,
            DispatchPolicy::MixedCriticality(SheddingParams::default()),
            Box::new(FixedLoad(1.0)),
        )
        .unwrap();
        let summary = scheduler.tick(TICK_US);
        assert_eq!(summary.executed, vec![0]);
        assert_eq!(summary.skipped, vec![1]);
    }

    #[test]
    fn out_of_range_load_is_clamped_and_hard_still_runs() {
        let tasks = vec![
            task(0, "control", 5_000, 1_000, Criticality::Hard),
            task(1, "logging", 5_000, 10, Criticality::Deferred),
        ];
        let mut scheduler = Scheduler::with_load_estimator(
            tasks,
            DispatchPolicy::MixedCriticality(SheddingParams::default()),
            Box::new(FixedLoad(1.5)),
        )
        .unwrap();
        let summary = scheduler.tick(TICK_US);
        // Clamped to 1.0, still above the threshold: deferred sheds, hard runs.
        assert_eq!(summary.executed, vec![0]);
        assert_eq!(summary.skipped, vec![1]);
    }

    // ── Miss accounting ───────────────────────────────────────────────────────

    #[test]
    fn late_hard_completion_is_a_miss_and_a_control_overrun() {
        // Deadline 1ms, workload spins at least 3ms.
        let tasks =
            vec![Task::new(0, "control", 100_000, 1_000, 500, 1_000, Criticality::Hard, spin(3_000))
                .unwrap()];
        let mut scheduler = Scheduler::new(tasks, DispatchPolicy::RateMonotonic).unwrap();
        let summary = scheduler.tick(TICK_US);

        assert_eq!(summary.missed, vec![0]);
        let stats = scheduler.stats();
        assert_eq!(task_stats(&stats, 0).deadline_misses, 1);
        assert_eq!(task_stats(&stats, 0).executions, 1);
        assert_eq!(stats.control_overruns, 1);
    }

    #[test]
    fn late_firm_completion_is_a_miss_but_not_an_overrun() {
        let tasks =
            vec![Task::new(0, "planning", 100_000, 1_000, 500, 800, Criticality::Firm, spin(3_000))
                .unwrap()];
        let mut scheduler = Scheduler::new(tasks, DispatchPolicy::RateMonotonic).unwrap();
        scheduler.tick(TICK_US);

        let stats = scheduler.stats();
        assert_eq!(stats.total_deadline_misses, 1);
        assert_eq!(stats.control_overruns, 0);
    }

    #[test]
    fn clock_advances_by_the_nominal_step_not_execution_time() {
        let tasks =
            vec![Task::new(0, "slow", 100_000, 100_000, 500, 1, Criticality::Firm, spin(3_000))
                .unwrap()];
        let mut scheduler = Scheduler::new(tasks, DispatchPolicy::RateMonotonic).unwrap();
        scheduler.tick(TICK_US);
        assert_eq!(scheduler.now_us(), TICK_US);
    }

    // ── Workload faults ───────────────────────────────────────────────────────

    #[test]
    fn workload_fault_does_not_abort_the_tick() {
        // The faulting task has the highest priority and runs first.
        let tasks = vec![
            Task::new(0, "broken", 5_000, 5_000, 100, 1_000, Criticality::Firm, failing())
                .unwrap(),
            task(1, "healthy", 5_000, 10, Criticality::Firm),
        ];
        let mut scheduler = Scheduler::new(tasks, DispatchPolicy::RateMonotonic).unwrap();
        let summary = scheduler.tick(TICK_US);

        assert_eq!(summary.faults.len(), 1);
        assert_eq!(summary.faults[0].task_id, 0);
        assert_eq!(summary.executed, vec![1], "remaining ready tasks still ran");

        let stats = scheduler.stats();
        assert_eq!(task_stats(&stats, 0).faults, 1);
        assert_eq!(task_stats(&stats, 0).executions, 0);
    }

    #[test]
    fn faulted_instance_counts_a_missed_release_next_period() {
        let tasks =
            vec![Task::new(0, "broken", 5_000, 5_000, 100, 1_000, Criticality::Firm, failing())
                .unwrap()];
        let mut scheduler = Scheduler::new(tasks, DispatchPolicy::RateMonotonic).unwrap();
        // Release + fault at t=1ms; next release at t=6ms overwrites it.
        run_ticks(&mut scheduler, 6);

        let stats = scheduler.stats();
        let broken = task_stats(&stats, 0);
        assert_eq!(broken.releases, 2);
        assert_eq!(broken.missed_releases, 1);
        assert_eq!(broken.faults, 2);
    }

    // ── Statistics ────────────────────────────────────────────────────────────

    #[test]
    fn stats_are_idempotent() {
        let tasks = vec![
            task(0, "a", 5_000, 100, Criticality::Hard),
            task(1, "b", 20_000, 50, Criticality::Soft),
        ];
        let mut scheduler = Scheduler::new(tasks, DispatchPolicy::RateMonotonic).unwrap();
        run_ticks(&mut scheduler, 17);

        let first = scheduler.stats();
        let second = scheduler.stats();
        assert_eq!(first, second);
    }

    #[test]
    fn utilization_is_the_per_task_wcet_over_period_sum() {
        let tasks = vec![
            Task::new(0, "a", 10_000, 10_000, 2_000, 100, Criticality::Firm, noop()).unwrap(),
            Task::new(1, "b", 15_000, 15_000, 3_000, 50, Criticality::Firm, noop()).unwrap(),
        ];
        let scheduler = Scheduler::new(tasks, DispatchPolicy::RateMonotonic).unwrap();
        assert!((scheduler.stats().cpu_utilization - 0.4).abs() < 1e-9);
    }

    #[test]
    fn stats_report_elapsed_time_and_ticks() {
        let tasks = vec![task(0, "a", 5_000, 100, Criticality::Firm)];
        let mut scheduler = Scheduler::new(tasks, DispatchPolicy::RateMonotonic).unwrap();
        run_ticks(&mut scheduler, 42);
        let stats = scheduler.stats();
        assert_eq!(stats.ticks, 42);
        assert_eq!(stats.elapsed_us, 42 * TICK_US);
    }
}
