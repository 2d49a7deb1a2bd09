/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Real-time schedulability analysis.
//!
//! # Theory
//! **Liu & Layland (1973)**: under rate-monotonic dispatch (shorter period,
//! higher priority), a set of `n` independent periodic tasks is guaranteed
//! schedulable on one CPU if:
//!
//! `U = Σ C_i / T_i  <=  n (2^(1/n) - 1)`
//!
//! The bound tightens as `n` grows, converging to `ln(2) ≈ 0.693`.
//!
//! | n | Bound |
//! |---|---|
//! | 1 | 1.000 |
//! | 2 | 0.828 |
//! | 3 | 0.780 |
//! | 5 | 0.743 |
//! | ∞ | ln(2) ≈ 0.693 |
//!
//! A utilisation between the bound and 1.0 may or may not be schedulable;
//! deeper response-time analysis is required.  The scheduler therefore treats
//! an exceeded bound as a warning, never a rejection.
//!
//! The utilisation itself is the per-task `wcet / period` sum.  Dividing the
//! total WCET by the shortest period in the set is not a utilisation measure
//! for heterogeneous periods (it undercounts load) and must not back any
//! admission or overload decision.

use crate::task::Task;

// ── Public API ────────────────────────────────────────────────────────────────

/// Total CPU utilisation of a task set: `Σ wcet_us / period_us`.
///
/// Periods are non-zero by `Task` construction, so every task contributes a
/// finite term.
pub fn taskset_utilization(tasks: &[Task]) -> f64 {
    tasks.iter().map(Task::utilization).sum()
}

/// The Liu & Layland utilisation upper bound for `n` tasks:
/// `n * (2^(1/n) - 1)`.
///
/// Returns `1.0` for `n = 1` and `0.0` for `n = 0`.
pub fn liu_layland_bound(n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    nf * (2.0_f64.powf(1.0 / nf) - 1.0)
}

/// Check a task set against the Liu & Layland bound.
///
/// Returns `None` when the set is provably schedulable (utilisation at or
/// under the bound), or `Some(total_utilization)` when the bound is exceeded
/// and the caller should warn.
pub fn check_liu_layland(tasks: &[Task]) -> Option<f64> {
    if tasks.is_empty() {
        return None;
    }
    let total_u = taskset_utilization(tasks);
    (total_u > liu_layland_bound(tasks.len())).then_some(total_u)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
