/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Dispatch policies and the load-estimator capability.
//!
//! The three policies share the scheduler's release and execution machinery;
//! a policy only contributes two hooks:
//!
//! * an **ordering** over the tick's ready set, and
//! * an optional **shedding decision** per ready task.
//!
//! | Policy | Ordering | Sheds? |
//! |---|---|---|
//! | [`DispatchPolicy::RateMonotonic`] | descending priority, id tie-break | never |
//! | [`DispatchPolicy::EarliestDeadlineFirst`] | ascending absolute deadline, id tie-break | never |
//! | [`DispatchPolicy::MixedCriticality`] | descending priority, id tie-break | soft work above the load threshold |
//!
//! The contract that holds regardless of parameter values: a
//! [`Criticality::Hard`] task is never skipped, at any load.

use std::cmp::Reverse;

use super::error::PolicyConfigError;
use crate::task::{Criticality, Task};

// ── Load estimator ────────────────────────────────────────────────────────────

/// Source of the CPU-load figure consulted by the mixed-criticality policy.
///
/// Queried once per tick, only when the active policy sheds.  Implementations
/// should return a value in `[0, 1]`; out-of-range figures are clamped by the
/// scheduler.
pub trait LoadEstimator {
    fn current_load(&mut self) -> f64;
}

/// Constant load figure, for scenario files and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedLoad(pub f64);

impl LoadEstimator for FixedLoad {
    fn current_load(&mut self) -> f64 {
        self.0
    }
}

// ── Shedding parameters ───────────────────────────────────────────────────────

/// Load fraction above which sheddable work is skipped.
pub const DEFAULT_LOAD_THRESHOLD: f64 = 0.95;

/// Tuning knobs for [`DispatchPolicy::MixedCriticality`].
///
/// Validated at construction: the threshold must satisfy `0 < t <= 1`, and
/// [`Criticality::Hard`] is rejected from the sheddable set.
#[derive(Debug, Clone, PartialEq)]
pub struct SheddingParams {
    load_threshold: f64,
    sheddable: Vec<Criticality>,
}

impl SheddingParams {
    pub fn new(
        load_threshold: f64,
        sheddable: Vec<Criticality>,
    ) -> Result<Self, PolicyConfigError> {
        if !(load_threshold > 0.0 && load_threshold <= 1.0) {
            return Err(PolicyConfigError::LoadThresholdOutOfRange {
                value: load_threshold,
            });
        }
        if sheddable.contains(&Criticality::Hard) {
            return Err(PolicyConfigError::HardNeverSheddable);
        }
        Ok(Self {
            load_threshold,
            sheddable,
        })
    }

    pub fn load_threshold(&self) -> f64 {
        self.load_threshold
    }

    pub fn sheddable(&self) -> &[Criticality] {
        &self.sheddable
    }
}

impl Default for SheddingParams {
    /// Threshold 0.95, shedding `Soft` and `Deferred` work.
    fn default() -> Self {
        Self {
            load_threshold: DEFAULT_LOAD_THRESHOLD,
            sheddable: vec![Criticality::Soft, Criticality::Deferred],
        }
    }
}

// ── DispatchPolicy ────────────────────────────────────────────────────────────

/// The scheduler's dispatch policy.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchPolicy {
    /// Fixed priorities; shorter period should carry higher priority.
    RateMonotonic,
    /// Dynamic priorities; earliest absolute deadline runs first.
    EarliestDeadlineFirst,
    /// Priority order plus adaptive shedding of non-critical work.
    MixedCriticality(SheddingParams),
}

impl DispatchPolicy {
    /// Resolve a policy by name.  `mixed_criticality` gets the default
    /// shedding parameters; construct the variant directly to tune them.
    pub fn from_name(name: &str) -> Result<Self, PolicyConfigError> {
        match name {
            "rate_monotonic" => Ok(Self::RateMonotonic),
            "earliest_deadline_first" => Ok(Self::EarliestDeadlineFirst),
            "mixed_criticality" => Ok(Self::MixedCriticality(SheddingParams::default())),
            other => Err(PolicyConfigError::UnknownPolicy(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RateMonotonic => "rate_monotonic",
            Self::EarliestDeadlineFirst => "earliest_deadline_first",
            Self::MixedCriticality(_) => "mixed_criticality",
        }
    }

    /// True when this policy consults the load estimator each tick.
    pub fn uses_load(&self) -> bool {
        matches!(self, Self::MixedCriticality(_))
    }

    /// Order the ready set for dispatch.  `ready` holds indices into `tasks`.
    ///
    /// Ties break on ascending task id, which makes the order total and
    /// deterministic (ids are unique within a task set).
    pub(crate) fn order_ready(&self, tasks: &[Task], ready: &mut [usize]) {
        match self {
            Self::RateMonotonic | Self::MixedCriticality(_) => {
                ready.sort_unstable_by_key(|&i| (Reverse(tasks[i].priority()), tasks[i].id()));
            }
            Self::EarliestDeadlineFirst => {
                ready.sort_unstable_by_key(|&i| {
                    (
                        tasks[i].absolute_deadline_us().unwrap_or(u64::MAX),
                        tasks[i].id(),
                    )
                });
            }
        }
    }

    /// Decide whether `task` is shed for this tick at load `load`.
    ///
    /// Hard tasks are never shed, whatever the parameters say; this check is
    /// unconditional on top of the parameter validation in
    /// [`SheddingParams::new`].
    pub(crate) fn should_skip(&self, task: &Task, load: f64) -> bool {
        match self {
            Self::MixedCriticality(params) => {
                task.criticality() != Criticality::Hard
                    && params.sheddable.contains(&task.criticality())
                    && load > params.load_threshold
            }
            _ => false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
