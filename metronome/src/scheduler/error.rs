/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the metronome scheduling core.
//!
//! Three enums model the three construction layers:
//!
//! * [`TaskConfigError`] - an individual task's timing contract is invalid.
//! * [`PolicyConfigError`] - a dispatch policy or its shedding parameters are
//!   invalid.
//! * [`SchedulerError`] - the scheduler cannot be assembled from the supplied
//!   task set / policy / estimator combination.
//!
//! All of these fail fast, before any tick runs.  Runtime degradation
//! (deadline misses, control overruns, load skips, workload faults) is never
//! an error: those are counters and `TickSummary` entries, because the run
//! must keep going.
//!
//! **Do not** collapse these into `anyhow::Error` in library paths; the
//! structured variants are intentional.  `anyhow` is reserved for workload
//! results and the application boundary.

use thiserror::Error;

use crate::task::TaskId;

/// Invalid task timing contract, rejected by `Task::new`.
#[derive(Debug, Error)]
pub enum TaskConfigError {
    #[error("task '{task}' has a zero period; period_us must be positive")]
    ZeroPeriod { task: String },

    #[error("task '{task}' has a zero relative deadline; deadline_us must be positive")]
    ZeroDeadline { task: String },

    #[error("task '{task}' has a zero worst-case execution time; wcet_us must be positive")]
    ZeroWcet { task: String },
}

/// Invalid dispatch-policy selection or shedding parameters.
#[derive(Debug, Error)]
pub enum PolicyConfigError {
    /// The policy name is not recognised.
    #[error("unknown dispatch policy: '{0}' (valid: rate_monotonic, earliest_deadline_first, mixed_criticality)")]
    UnknownPolicy(String),

    /// The shedding threshold must satisfy `0 < threshold <= 1`.
    #[error("load threshold {value} is outside (0, 1]")]
    LoadThresholdOutOfRange { value: f64 },

    /// Hard-criticality work is the guarantee the policy exists to protect;
    /// it can never be in the sheddable set.
    #[error("hard-criticality tasks can never be sheddable")]
    HardNeverSheddable,
}

/// Scheduler assembly failure, returned by `Scheduler::new` and
/// `Scheduler::with_load_estimator`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no tasks provided; the task set is empty")]
    EmptyTaskSet,

    #[error("duplicate task id {id} in the task set")]
    DuplicateTaskId { id: TaskId },

    /// A load-shedding policy was selected without a load estimator to
    /// consult.
    #[error("policy '{policy}' requires a load estimator and none was supplied")]
    MissingLoadEstimator { policy: &'static str },
}
