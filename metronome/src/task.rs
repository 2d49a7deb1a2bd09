/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core task model for the metronome scheduling core.
//!
//! A [`Task`] is a periodic schedulable entity wrapping a [`Workload`] with a
//! timing contract (period, relative deadline, worst-case execution time),
//! a fixed priority, and a [`Criticality`] class.  The scheduler releases,
//! dispatches, and deadline-checks task instances; the task records what
//! happened in its own counters.
//!
//! ```text
//! Dormant ──release──► Released ──execute──► Completed / Missed ──► Dormant
//! ```
//!
//! # Ownership model
//! A `Task` is **owned** by the `Scheduler` for the lifetime of a run.  The
//! caller moves `Vec<Task>` into the scheduler at construction; all runtime
//! state (release times, deadlines, counters) is mutated exclusively through
//! the scheduler's tick loop.  There is no shared or global task state.
//!
//! All timing is expressed in microseconds (`u64`), both the static contract
//! and the measured execution times.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::scheduler::error::TaskConfigError;
use crate::stats::TaskStats;

/// Unique task identifier within one scheduler's task set.
pub type TaskId = u32;

// ── Criticality ───────────────────────────────────────────────────────────────

/// Deadline classification controlling whether an instance may be shed under
/// load.
///
/// Ordered by importance: `Hard` work (control commands) must never be
/// skipped; `Deferred` work (telemetry batching) is the first to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    /// Must never miss a deadline and must never be skipped (control).
    Hard,
    /// Occasional miss acceptable (planning).
    Firm,
    /// Frequent miss acceptable; sheddable under load (perception).
    Soft,
    /// Batchable background work; sheddable under load (logging).
    Deferred,
}

// ── Workload ──────────────────────────────────────────────────────────────────

/// An opaque unit of work dispatched by the scheduler.
///
/// The scheduler's only obligations to a workload are to invoke it and to
/// measure the elapsed wall-clock time of the invocation.  A returned error
/// is fatal to that task *instance* only; the scheduler keeps dispatching the
/// remaining ready tasks of the tick and surfaces the failure to the caller.
pub trait Workload {
    fn run(&mut self) -> anyhow::Result<()>;
}

/// Any `FnMut() -> anyhow::Result<()>` closure is a workload.
impl<F> Workload for F
where
    F: FnMut() -> anyhow::Result<()>,
{
    fn run(&mut self) -> anyhow::Result<()> {
        self()
    }
}

// ── Task ──────────────────────────────────────────────────────────────────────

/// A periodic real-time task.
///
/// Constructed once with its static timing contract via [`Task::new`], then
/// repeatedly released / executed / deadline-checked by the scheduler for the
/// lifetime of the simulation.  Never destroyed mid-run.
///
/// # Invariants
/// * `period_us`, `deadline_us`, `wcet_us` are non-zero (enforced at
///   construction).
/// * `absolute_deadline_us` is `None` until the first release; a task with
///   zero releases has no deadline-miss measurements.
/// * `execution_count >= deadline_miss_count` at all times.
pub struct Task {
    // ── Identity and timing contract ─────────────────────────────────────────
    id: TaskId,
    name: String,
    period_us: u64,
    deadline_us: u64,
    wcet_us: u64,
    priority: i32,
    criticality: Criticality,
    workload: Box<dyn Workload>,

    // ── Runtime state (mutated only by the scheduler) ────────────────────────
    next_release_us: u64,
    absolute_deadline_us: Option<u64>,
    /// Instance released but not yet finalised (executed, shed, or faulted
    /// and later overwritten).
    pending: bool,

    // ── Counters ─────────────────────────────────────────────────────────────
    release_count: u64,
    missed_release_count: u64,
    execution_count: u64,
    deadline_miss_count: u64,
    load_skip_count: u64,
    fault_count: u64,
    total_exec_us: u64,
    max_exec_us: u64,
}

impl Task {
    /// Create a task from its static contract.
    ///
    /// All timing fields must be positive.  A `Hard` task whose relative
    /// deadline exceeds its period is accepted but logged at warn level
    /// (soft invariant).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TaskId,
        name: impl Into<String>,
        period_us: u64,
        deadline_us: u64,
        wcet_us: u64,
        priority: i32,
        criticality: Criticality,
        workload: Box<dyn Workload>,
    ) -> Result<Self, TaskConfigError> {
        let name = name.into();
        if period_us == 0 {
            return Err(TaskConfigError::ZeroPeriod { task: name });
        }
        if deadline_us == 0 {
            return Err(TaskConfigError::ZeroDeadline { task: name });
        }
        if wcet_us == 0 {
            return Err(TaskConfigError::ZeroWcet { task: name });
        }
        if criticality == Criticality::Hard && deadline_us > period_us {
            warn!(
                task = %name,
                deadline_us,
                period_us,
                "hard task relative deadline exceeds its period"
            );
        }

        Ok(Self {
            id,
            name,
            period_us,
            deadline_us,
            wcet_us,
            priority,
            criticality,
            workload,
            next_release_us: 0,
            absolute_deadline_us: None,
            pending: false,
            release_count: 0,
            missed_release_count: 0,
            execution_count: 0,
            deadline_miss_count: 0,
            load_skip_count: 0,
            fault_count: 0,
            total_exec_us: 0,
            max_exec_us: 0,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    pub fn deadline_us(&self) -> u64 {
        self.deadline_us
    }

    pub fn wcet_us(&self) -> u64 {
        self.wcet_us
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn criticality(&self) -> Criticality {
        self.criticality
    }

    /// Next release instant on the simulated clock.
    pub fn next_release_us(&self) -> u64 {
        self.next_release_us
    }

    /// Absolute deadline of the current instance; `None` before the first
    /// release.
    pub fn absolute_deadline_us(&self) -> Option<u64> {
        self.absolute_deadline_us
    }

    /// Declared CPU utilisation fraction: `wcet_us / period_us`.
    pub fn utilization(&self) -> f64 {
        self.wcet_us as f64 / self.period_us as f64
    }

    // ── Lifecycle (driven by the scheduler) ──────────────────────────────────

    /// Release a new instance at `now_us`.
    ///
    /// Sets the absolute deadline, schedules the next release one period after
    /// the actual release instant, and marks the instance pending.  A prior
    /// instance that never completed is counted as a missed release, never
    /// silently overwritten.
    pub(crate) fn release(&mut self, now_us: u64) {
        if self.pending {
            self.missed_release_count += 1;
            warn!(
                task = %self.name,
                now_us,
                "release overwrites an instance that never completed"
            );
        }
        self.absolute_deadline_us = Some(now_us.saturating_add(self.deadline_us));
        self.next_release_us = now_us.saturating_add(self.period_us);
        self.release_count += 1;
        self.pending = true;
    }

    /// Invoke the workload and measure the elapsed wall-clock time.
    ///
    /// On success returns the measured time in microseconds and finalises the
    /// instance.  On error the instance stays pending (it never completed);
    /// its next release will record a missed release.
    pub(crate) fn execute(&mut self) -> anyhow::Result<u64> {
        let start = Instant::now();
        let result = self.workload.run();
        let elapsed_us = start.elapsed().as_micros() as u64;

        match result {
            Ok(()) => {
                self.execution_count += 1;
                self.total_exec_us = self.total_exec_us.saturating_add(elapsed_us);
                self.max_exec_us = self.max_exec_us.max(elapsed_us);
                self.pending = false;
                Ok(elapsed_us)
            }
            Err(e) => {
                self.fault_count += 1;
                Err(e)
            }
        }
    }

    /// Compare a completion instant against the absolute deadline.
    ///
    /// Returns `true` when the deadline was met.  Purely observational: the
    /// execution already finished by the time this runs.  Counts at most one
    /// miss per instance.
    pub(crate) fn check_deadline(&mut self, completion_us: u64) -> bool {
        let Some(deadline_us) = self.absolute_deadline_us else {
            // Defined only after the first release; nothing to measure.
            return true;
        };
        let met = completion_us <= deadline_us;
        if !met {
            self.deadline_miss_count += 1;
        }
        met
    }

    /// Record a load-induced skip.  The instance is finalised without being
    /// dispatched; this is explicitly not a deadline miss.
    pub(crate) fn record_skip(&mut self) {
        self.load_skip_count += 1;
        self.pending = false;
    }

    // ── Statistics ───────────────────────────────────────────────────────────

    /// Snapshot of this task's counters.  Read-only.
    pub fn stats(&self) -> TaskStats {
        let (miss_rate, avg_exec_us) = if self.execution_count > 0 {
            (
                self.deadline_miss_count as f64 / self.execution_count as f64,
                self.total_exec_us as f64 / self.execution_count as f64,
            )
        } else {
            (0.0, 0.0)
        };

        TaskStats {
            id: self.id,
            name: self.name.clone(),
            criticality: self.criticality,
            releases: self.release_count,
            missed_releases: self.missed_release_count,
            executions: self.execution_count,
            deadline_misses: self.deadline_miss_count,
            load_skips: self.load_skip_count,
            faults: self.fault_count,
            miss_rate,
            avg_exec_us,
            max_exec_us: self.max_exec_us,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("period_us", &self.period_us)
            .field("deadline_us", &self.deadline_us)
            .field("wcet_us", &self.wcet_us)
            .field("priority", &self.priority)
            .field("criticality", &self.criticality)
            .field("next_release_us", &self.next_release_us)
            .field("absolute_deadline_us", &self.absolute_deadline_us)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
