/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info};

use metronome::config::{self, Scenario, TaskSpec};
use metronome::scheduler::Scheduler;
use metronome::task::Criticality;

// ── CLI argument definition ───────────────────────────────────────────────────

/// metronome scheduling-core demo driver.
///
/// Example:
///   metronome --config demos/avstack.yaml
///   metronome --policy earliest_deadline_first --duration-us 5000000
#[derive(Debug, Parser)]
#[command(
    name = "metronome",
    about = "Discrete-time mixed-criticality task scheduling core",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML scenario file.  Without it a built-in three-task
    /// demo set runs.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Dispatch policy override
    /// (rate_monotonic | earliest_deadline_first | mixed_criticality).
    #[arg(short = 'p', long = "policy")]
    policy: Option<String>,

    /// Simulated duration override, in microseconds.
    #[arg(short = 'd', long = "duration-us")]
    duration_us: Option<u64>,

    /// Tick step override, in microseconds.
    #[arg(short = 't', long = "tick-us")]
    tick_us: Option<u64>,

    /// Fixed CPU-load figure fed to the mixed-criticality policy.
    #[arg(short = 'l', long = "fixed-load")]
    fixed_load: Option<f64>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(
        config = ?cli.config,
        policy = ?cli.policy,
        duration_us = ?cli.duration_us,
        tick_us = ?cli.tick_us,
        fixed_load = ?cli.fixed_load,
        "configuration"
    );

    let mut scenario = match &cli.config {
        Some(path) => match config::load_from_file(path) {
            Ok(scenario) => scenario,
            Err(e) => {
                error!("failed to load scenario: {:#}", e);
                process::exit(1);
            }
        },
        None => {
            info!("no scenario file provided; running the built-in demo set");
            builtin_demo_scenario()
        }
    };

    if let Some(policy) = cli.policy {
        scenario.policy = policy;
    }
    if let Some(duration_us) = cli.duration_us {
        scenario.duration_us = duration_us;
    }
    if let Some(tick_us) = cli.tick_us {
        scenario.tick_us = tick_us;
    }
    if let Some(fixed_load) = cli.fixed_load {
        scenario.fixed_load = Some(fixed_load);
    }

    if let Err(e) = run(&scenario) {
        error!("scenario failed: {:#}", e);
        process::exit(1);
    }
}

fn run(scenario: &Scenario) -> anyhow::Result<()> {
    anyhow::ensure!(scenario.tick_us > 0, "tick_us must be positive");

    let policy = scenario.build_policy()?;
    let tasks = scenario.build_tasks()?;

    let mut scheduler = match scenario.build_load_estimator() {
        Some(estimator) => Scheduler::with_load_estimator(tasks, policy, estimator)?,
        None => Scheduler::new(tasks, policy)?,
    };

    let ticks = scenario.duration_us / scenario.tick_us;
    info!(
        ticks,
        tick_us = scenario.tick_us,
        duration_us = scenario.duration_us,
        "starting run"
    );

    for _ in 0..ticks {
        let summary = scheduler.tick(scenario.tick_us);
        for fault in &summary.faults {
            error!(task = %fault.task_name, error = %fault.error, "workload fault");
        }
    }

    scheduler.stats().log_summary();
    Ok(())
}

/// Three synthetic periodic tasks: a fast hard control loop, a medium firm
/// planner, and a slow soft perception pass.
fn builtin_demo_scenario() -> Scenario {
    Scenario {
        tick_us: 1_000,
        duration_us: 5_000_000,
        policy: "rate_monotonic".to_string(),
        load_threshold: None,
        fixed_load: None,
        tasks: vec![
            TaskSpec {
                name: "control".to_string(),
                period_us: 5_000,
                deadline_us: 5_000,
                wcet_us: 500,
                priority: 1_000,
                criticality: Criticality::Hard,
                busy_us: 200,
            },
            TaskSpec {
                name: "planning".to_string(),
                period_us: 20_000,
                deadline_us: 20_000,
                wcet_us: 3_000,
                priority: 800,
                criticality: Criticality::Firm,
                busy_us: 1_500,
            },
            TaskSpec {
                name: "perception".to_string(),
                period_us: 50_000,
                deadline_us: 50_000,
                wcet_us: 5_000,
                priority: 600,
                criticality: Criticality::Soft,
                busy_us: 2_500,
            },
        ],
    }
}
