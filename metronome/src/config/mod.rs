//! Scenario configuration for the demo driver.
//!
//! A scenario file describes the timing grid, the dispatch policy, and the
//! task set; workload cost is modelled with a busy-wait spin.  The expected
//! YAML structure is:
//!
//! ```yaml
//! scenario:
//!   tick_us: 1000
//!   duration_us: 100000
//!   policy: mixed_criticality
//!   load_threshold: 0.95       # optional
//!   fixed_load: 0.97           # optional
//! tasks:
//!   - name: control
//!     period_us: 5000
//!     deadline_us: 5000
//!     wcet_us: 500
//!     priority: 1000
//!     criticality: hard
//!     busy_us: 200
//! ```

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::scheduler::policy::{DispatchPolicy, FixedLoad, LoadEstimator, SheddingParams};
use crate::task::{Criticality, Task, Workload};

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
///
/// Kept private; callers work with [`Scenario`] instead.
#[derive(Debug, Deserialize)]
struct ScenarioFile {
    scenario: ScenarioSection,
    tasks: Vec<TaskEntry>,
}

#[derive(Debug, Deserialize)]
struct ScenarioSection {
    #[serde(default = "default_tick_us")]
    tick_us: u64,
    #[serde(default = "default_duration_us")]
    duration_us: u64,
    #[serde(default = "default_policy")]
    policy: String,
    load_threshold: Option<f64>,
    fixed_load: Option<f64>,
}

fn default_tick_us() -> u64 {
    1_000
}

/// 60 simulated seconds.
fn default_duration_us() -> u64 {
    60_000_000
}

fn default_policy() -> String {
    "rate_monotonic".to_string()
}

#[derive(Debug, Deserialize)]
struct TaskEntry {
    name: String,
    period_us: u64,
    deadline_us: u64,
    wcet_us: u64,
    priority: i32,
    criticality: Criticality,
    /// Synthetic workload cost; 0 means the workload returns immediately.
    #[serde(default)]
    busy_us: u64,
}

// ── Public types ──────────────────────────────────────────────────────────────

/// A parsed scenario: timing grid, policy selection, and task specs.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub tick_us: u64,
    pub duration_us: u64,
    pub policy: String,
    pub load_threshold: Option<f64>,
    pub fixed_load: Option<f64>,
    pub tasks: Vec<TaskSpec>,
}

/// One task row from the scenario file.  Ids are assigned from list position.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub period_us: u64,
    pub deadline_us: u64,
    pub wcet_us: u64,
    pub priority: i32,
    pub criticality: Criticality,
    pub busy_us: u64,
}

/// Busy-wait workload: spins until `busy_us` of wall-clock time has passed.
#[derive(Debug, Clone, Copy)]
pub struct SpinWorkload {
    busy_us: u64,
}

impl SpinWorkload {
    pub fn new(busy_us: u64) -> Self {
        Self { busy_us }
    }
}

impl Workload for SpinWorkload {
    fn run(&mut self) -> anyhow::Result<()> {
        let start = Instant::now();
        while (start.elapsed().as_micros() as u64) < self.busy_us {}
        Ok(())
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parse a scenario YAML file.
///
/// # Errors
/// Returns an error if the file cannot be opened or the YAML is structurally
/// invalid.  Task-level timing validation happens later, in
/// [`Scenario::build_tasks`].
pub fn load_from_file(path: &Path) -> Result<Scenario> {
    info!("loading scenario from: {}", path.display());

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot open scenario file: {}", path.display()))?;

    let file: ScenarioFile = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse scenario YAML: {}", path.display()))?;

    let tasks = file
        .tasks
        .into_iter()
        .map(|entry| TaskSpec {
            name: entry.name,
            period_us: entry.period_us,
            deadline_us: entry.deadline_us,
            wcet_us: entry.wcet_us,
            priority: entry.priority,
            criticality: entry.criticality,
            busy_us: entry.busy_us,
        })
        .collect();

    Ok(Scenario {
        tick_us: file.scenario.tick_us,
        duration_us: file.scenario.duration_us,
        policy: file.scenario.policy,
        load_threshold: file.scenario.load_threshold,
        fixed_load: file.scenario.fixed_load,
        tasks,
    })
}

impl Scenario {
    /// Resolve the dispatch policy named in the scenario, applying the
    /// optional shedding threshold.
    pub fn build_policy(&self) -> Result<DispatchPolicy> {
        let policy = DispatchPolicy::from_name(&self.policy)?;
        let policy = match (policy, self.load_threshold) {
            (DispatchPolicy::MixedCriticality(_), Some(threshold)) => {
                DispatchPolicy::MixedCriticality(SheddingParams::new(
                    threshold,
                    vec![Criticality::Soft, Criticality::Deferred],
                )?)
            }
            (policy, _) => policy,
        };
        Ok(policy)
    }

    /// Build the task set with spin workloads.  Ids follow list position.
    pub fn build_tasks(&self) -> Result<Vec<Task>> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(idx, spec)| {
                Task::new(
                    idx as u32,
                    spec.name.clone(),
                    spec.period_us,
                    spec.deadline_us,
                    spec.wcet_us,
                    spec.priority,
                    spec.criticality,
                    Box::new(SpinWorkload::new(spec.busy_us)),
                )
                .with_context(|| format!("invalid task '{}'", spec.name))
            })
            .collect()
    }

    /// Build a load estimator when the scenario fixes one.
    pub fn build_load_estimator(&self) -> Option<Box<dyn LoadEstimator>> {
        self.fixed_load
            .map(|load| Box::new(FixedLoad(load)) as Box<dyn LoadEstimator>)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    const FULL_SCENARIO: &str = r#"
scenario:
  tick_us: 1000
  duration_us: 100000
  policy: mixed_criticality
  load_threshold: 0.9
  fixed_load: 0.97
tasks:
  - name: control
    period_us: 5000
    deadline_us: 5000
    wcet_us: 500
    priority: 1000
    criticality: hard
    busy_us: 200
  - name: perception
    period_us: 50000
    deadline_us: 100000
    wcet_us: 8000
    priority: 600
    criticality: soft
"#;

    #[test]
    fn full_scenario_parses() {
        let f = yaml_tempfile(FULL_SCENARIO);
        let scenario = load_from_file(f.path()).unwrap();

        assert_eq!(scenario.tick_us, 1_000);
        assert_eq!(scenario.duration_us, 100_000);
        assert_eq!(scenario.policy, "mixed_criticality");
        assert_eq!(scenario.load_threshold, Some(0.9));
        assert_eq!(scenario.fixed_load, Some(0.97));
        assert_eq!(scenario.tasks.len(), 2);

        let control = &scenario.tasks[0];
        assert_eq!(control.name, "control");
        assert_eq!(control.criticality, Criticality::Hard);
        assert_eq!(control.busy_us, 200);

        // busy_us defaults to 0 when absent.
        assert_eq!(scenario.tasks[1].busy_us, 0);
    }

    #[test]
    fn scenario_defaults_apply_when_fields_are_absent() {
        let yaml = r#"
scenario: {}
tasks:
  - name: only
    period_us: 5000
    deadline_us: 5000
    wcet_us: 500
    priority: 1
    criticality: firm
"#;
        let f = yaml_tempfile(yaml);
        let scenario = load_from_file(f.path()).unwrap();
        assert_eq!(scenario.tick_us, 1_000);
        assert_eq!(scenario.duration_us, 60_000_000);
        assert_eq!(scenario.policy, "rate_monotonic");
        assert_eq!(scenario.load_threshold, None);
        assert_eq!(scenario.fixed_load, None);
    }

    #[test]
    fn missing_file_returns_error() {
        let result = load_from_file(Path::new("/nonexistent/scenario.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(load_from_file(f.path()).is_err());
    }

    #[test]
    fn build_tasks_assigns_ids_from_position() {
        let f = yaml_tempfile(FULL_SCENARIO);
        let scenario = load_from_file(f.path()).unwrap();
        let tasks = scenario.build_tasks().unwrap();
        assert_eq!(tasks[0].id(), 0);
        assert_eq!(tasks[0].name(), "control");
        assert_eq!(tasks[1].id(), 1);
        assert_eq!(tasks[1].name(), "perception");
    }

    #[test]
    fn build_tasks_rejects_invalid_timing() {
        let yaml = r#"
scenario: {}
tasks:
  - name: bad
    period_us: 0
    deadline_us: 5000
    wcet_us: 500
    priority: 1
    criticality: soft
"#;
        let f = yaml_tempfile(yaml);
        let scenario = load_from_file(f.path()).unwrap();
        assert!(scenario.build_tasks().is_err());
    }

    #[test]
    fn build_policy_applies_custom_threshold() {
        let f = yaml_tempfile(FULL_SCENARIO);
        let scenario = load_from_file(f.path()).unwrap();
        match scenario.build_policy().unwrap() {
            DispatchPolicy::MixedCriticality(params) => {
                assert!((params.load_threshold() - 0.9).abs() < 1e-9);
            }
            other => panic!("expected mixed_criticality, got {other:?}"),
        }
    }

    #[test]
    fn build_policy_rejects_unknown_name() {
        let f = yaml_tempfile(FULL_SCENARIO);
        let mut scenario = load_from_file(f.path()).unwrap();
        scenario.policy = "round_robin".to_string();
        assert!(scenario.build_policy().is_err());
    }

    #[test]
    fn build_load_estimator_uses_fixed_load() {
        let f = yaml_tempfile(FULL_SCENARIO);
        let scenario = load_from_file(f.path()).unwrap();
        let mut estimator = scenario.build_load_estimator().unwrap();
        assert!((estimator.current_load() - 0.97).abs() < 1e-9);
    }

    #[test]
    fn spin_workload_takes_at_least_its_budget() {
        let mut workload = SpinWorkload::new(500);
        let start = Instant::now();
        workload.run().unwrap();
        assert!(start.elapsed().as_micros() >= 500);
    }
}
