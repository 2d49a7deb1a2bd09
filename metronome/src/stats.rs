//! Statistics snapshots for tasks and the scheduler.
//!
//! Plain serialisable structs, computed on demand from live counters.
//! Reading a snapshot never mutates scheduler state, so repeated calls
//! without an intervening tick return identical values.

use serde::Serialize;
use tracing::info;

use crate::task::{Criticality, TaskId};

/// Per-task counters and derived rates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStats {
    pub id: TaskId,
    pub name: String,
    pub criticality: Criticality,
    /// Instances released.
    pub releases: u64,
    /// Releases that overwrote an instance that never completed.
    pub missed_releases: u64,
    /// Workload invocations that ran to completion.
    pub executions: u64,
    /// Completions after the absolute deadline.
    pub deadline_misses: u64,
    /// Instances shed under load (never dispatched; not misses).
    pub load_skips: u64,
    /// Workload invocations that returned an error.
    pub faults: u64,
    /// `deadline_misses / executions`, 0 when nothing executed.
    pub miss_rate: f64,
    pub avg_exec_us: f64,
    pub max_exec_us: u64,
}

/// Whole-run aggregation returned by `Scheduler::stats()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub policy: &'static str,
    /// Simulated time elapsed, in microseconds.
    pub elapsed_us: u64,
    pub ticks: u64,
    pub total_executions: u64,
    pub total_deadline_misses: u64,
    pub total_load_skips: u64,
    pub total_faults: u64,
    /// Hard-criticality deadline misses.  Distinct from, and more severe
    /// than, the ordinary miss count.
    pub control_overruns: u64,
    pub miss_rate: f64,
    /// Liu-Layland utilisation: sum over tasks of `wcet_us / period_us`.
    pub cpu_utilization: f64,
    pub tasks: Vec<TaskStats>,
}

impl SchedulerStats {
    /// Log a run summary at info level, one line per task, sorted by id for
    /// deterministic output.
    pub fn log_summary(&self) {
        info!(
            policy = self.policy,
            elapsed_us = self.elapsed_us,
            ticks = self.ticks,
            executions = self.total_executions,
            deadline_misses = self.total_deadline_misses,
            load_skips = self.total_load_skips,
            faults = self.total_faults,
            control_overruns = self.control_overruns,
            miss_rate_pct = self.miss_rate * 100.0,
            cpu_utilization_pct = self.cpu_utilization * 100.0,
            "run summary"
        );

        let mut tasks: Vec<&TaskStats> = self.tasks.iter().collect();
        tasks.sort_by_key(|t| t.id);
        for t in tasks {
            info!(
                id = t.id,
                task = %t.name,
                criticality = ?t.criticality,
                releases = t.releases,
                missed_releases = t.missed_releases,
                executions = t.executions,
                misses = t.deadline_misses,
                skips = t.load_skips,
                faults = t.faults,
                miss_rate_pct = t.miss_rate * 100.0,
                avg_exec_us = t.avg_exec_us,
                max_exec_us = t.max_exec_us,
                "task summary"
            );
        }
    }
}
