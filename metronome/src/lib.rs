/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! metronome – a discrete-time, cooperative real-time scheduling core.
//!
//! Periodic tasks with deadlines and criticality levels, dispatched by one of
//! three policies: fixed-priority rate-monotonic, dynamic-priority
//! earliest-deadline-first, or an adaptive mixed-criticality policy that
//! sheds non-critical work under load while never touching hard-deadline
//! tasks.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── task        – periodic task model, criticality, workload capability
//! ├── scheduler   – tick loop, dispatch policies, errors, feasibility
//! ├── stats       – statistics snapshots
//! └── config      – YAML scenario loading for the demo driver
//! ```

pub mod config;
pub mod scheduler;
pub mod stats;
pub mod task;
