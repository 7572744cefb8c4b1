//! JSON ingestion of platform descriptions and workload scenarios.

pub mod prelude {
    pub use super::{
        build_platform,
        load_platform_spec,
        load_scenario_spec,
        BuiltCluster,
        BuiltPlatform,
        ClusterSpec,
        JobSpec,
        LoaderError,
        PlatformSpec,
        ScenarioSpec,
        TaskSpec,
    };
}

use crate::prelude::*;

#[derive(Debug)]
pub enum LoaderError {
    IOError(std::io::Error),
    JSONError(serde_json::Error),
    Validation(String),
}

impl std::fmt::Display for LoaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Loader Error, ")?;
        match self {
            LoaderError::IOError(error) => write!(f, "IO: {error}")?,
            LoaderError::JSONError(error) => write!(f, "JSON: {error}")?,
            LoaderError::Validation(error) => write!(f, "Validation: {error}")?,
        };

        Ok(())
    }
}

impl std::error::Error for LoaderError {}

impl From<std::io::Error> for LoaderError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(value: serde_json::Error) -> Self {
        Self::JSONError(value)
    }
}

/// Hardware description, as found in platform JSON files.
#[derive(Clone)]
#[derive(Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct PlatformSpec {
    pub clusters: Vec<ClusterSpec>,
}

/// One cluster entry: processor count, descending MHz modes, the efficient
/// frequency, a performance score, an optional utilization target for the
/// capacity-gated allocators and an optional cubic power model
/// `P(f) = a0 + a1 f + a2 f^2 + a3 f^3` (mW over MHz).
#[derive(Clone)]
#[derive(Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ClusterSpec {
    pub nb_procs: usize,
    pub frequencies: Vec<f64>,
    pub effective_freq: f64,
    pub perf_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u_target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_model: Option<[f64; 4]>,
}

/// Workload description, as found in scenario JSON files.
#[derive(Clone)]
#[derive(Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ScenarioSpec {
    pub tasks: Vec<TaskSpec>,
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct TaskSpec {
    pub id: usize,
    pub utilization: f64,
    pub period: f64,
    pub jobs: Vec<JobSpec>,
}

/// A released job: arrival time and duration in reference-WCET units.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct JobSpec {
    pub arrival: f64,
    pub duration: f64,
}

pub fn load_platform_spec(path: &str) -> Result<PlatformSpec, LoaderError> {
    let data = std::fs::read_to_string(path)?;
    let spec: PlatformSpec = serde_json::from_str(&data)?;
    validate_platform(&spec)?;
    Ok(spec)
}

pub fn load_scenario_spec(path: &str) -> Result<ScenarioSpec, LoaderError> {
    let data = std::fs::read_to_string(path)?;
    let spec: ScenarioSpec = serde_json::from_str(&data)?;
    validate_scenario(&spec)?;
    Ok(spec)
}

fn validate_platform(spec: &PlatformSpec) -> Result<(), LoaderError> {
    if spec.clusters.is_empty() {
        return Err(LoaderError::Validation("platform has no clusters".into()));
    }

    for (idx, cluster) in spec.clusters.iter().enumerate() {
        if cluster.nb_procs == 0 {
            return Err(LoaderError::Validation(format!(
                "cluster {idx} has no processors"
            )));
        }
        if cluster.frequencies.is_empty() {
            return Err(LoaderError::Validation(format!(
                "cluster {idx} has no frequencies"
            )));
        }
        if !cluster.frequencies.windows(2).all(|w| w[0] > w[1]) {
            return Err(LoaderError::Validation(format!(
                "cluster {idx} frequencies must be strictly decreasing"
            )));
        }
        if cluster.frequencies.iter().any(|&f| f <= 0.0) {
            return Err(LoaderError::Validation(format!(
                "cluster {idx} has a non-positive frequency"
            )));
        }
        if cluster.perf_score <= 0.0 {
            return Err(LoaderError::Validation(format!(
                "cluster {idx} has a non-positive performance score"
            )));
        }
        if cluster.effective_freq < 0.0 {
            return Err(LoaderError::Validation(format!(
                "cluster {idx} has a negative efficient frequency"
            )));
        }
    }

    Ok(())
}

fn validate_scenario(spec: &ScenarioSpec) -> Result<(), LoaderError> {
    for task in &spec.tasks {
        if task.period <= 0.0 {
            return Err(LoaderError::Validation(format!(
                "task {} has a non-positive period", task.id
            )));
        }
        if task.utilization <= 0.0 {
            return Err(LoaderError::Validation(format!(
                "task {} has a non-positive utilization", task.id
            )));
        }
        for job in &task.jobs {
            if job.arrival < 0.0 || job.duration < 0.0 {
                return Err(LoaderError::Validation(format!(
                    "task {} has a job with negative arrival or duration", task.id
                )));
            }
        }
    }

    Ok(())
}

/// One built cluster: its clock domain, performance score, configured
/// utilization target and power model, ready to attach a scheduler to.
#[derive(Clone)]
#[derive(Debug)]
pub struct BuiltCluster {
    pub domain: ClockDomainId,
    pub perf_score: f64,
    pub u_target: Option<f64>,
    pub power_model: Option<[f64; 4]>,
}

/// The platform arena plus per-cluster construction data.
#[derive(Debug)]
pub struct BuiltPlatform {
    pub platform: Platform,
    pub clusters: Vec<BuiltCluster>,
}

/// Instantiate the hardware arena from a validated [`PlatformSpec`].
///
/// Each cluster gets its own processor type (performance = perf score),
/// clock domain and power domain; power domains carry an active C0 and a
/// zero-latency per-core C1 sleep state. Tasks from the scenario are added
/// afterwards by the caller; the platform is left unfinalized.
pub fn build_platform(spec: &PlatformSpec) -> Result<BuiltPlatform, LoaderError> {
    validate_platform(spec)?;

    let mut platform = Platform::new();
    let mut clusters = Vec::new();

    for (idx, cluster) in spec.clusters.iter().enumerate() {
        let proc_type = platform
            .add_processor_type(format!("cluster{idx}"), cluster.perf_score, Duration::ZERO)
            .map_err(|err| LoaderError::Validation(err.to_string()))?;
        let domain = platform
            .add_clock_domain(
                cluster.frequencies.iter().map(|&mhz| Frequency { mhz }).collect(),
                Frequency { mhz: cluster.effective_freq },
                None,
            )
            .map_err(|err| LoaderError::Validation(err.to_string()))?;
        let power_domain = platform
            .add_power_domain(vec![
                CState {
                    level: 0,
                    scope: CStateScope::PerProcessor,
                    wake_latency: Duration::ZERO,
                    power: Power { mw: 0.0 },
                },
                CState {
                    level: 1,
                    scope: CStateScope::PerProcessor,
                    wake_latency: Duration::ZERO,
                    power: Power { mw: 0.0 },
                },
            ])
            .map_err(|err| LoaderError::Validation(err.to_string()))?;

        for _ in 0..cluster.nb_procs {
            platform
                .add_processor(proc_type, domain, power_domain)
                .map_err(|err| LoaderError::Validation(err.to_string()))?;
        }

        clusters.push(BuiltCluster {
            domain,
            perf_score: cluster.perf_score,
            u_target: cluster.u_target,
            power_model: cluster.power_model,
        });
    }

    Ok(BuiltPlatform { platform, clusters })
}

// =============================================================================

#[cfg(test)]
const PLATFORM_JSON: &str = r#"{
  "clusters": [
    {
      "nb_procs": 4,
      "frequencies": [2000.0, 1500.0, 1000.0, 500.0],
      "effective_freq": 1000.0,
      "perf_score": 2.0,
      "power_model": [50.0, 0.1, 0.0, 0.000001]
    },
    {
      "nb_procs": 4,
      "frequencies": [1000.0, 500.0],
      "effective_freq": 500.0,
      "perf_score": 1.0,
      "u_target": 0.8
    }
  ]
}"#;

#[test]
fn platform_round_trip_is_idempotent() {
    let spec: PlatformSpec = serde_json::from_str(PLATFORM_JSON).unwrap();
    validate_platform(&spec).unwrap();

    let reserialized = serde_json::to_string(&spec).unwrap();
    let reparsed: serde_json::Value = serde_json::from_str(&reserialized).unwrap();
    let original: serde_json::Value = serde_json::from_str(PLATFORM_JSON).unwrap();
    assert_eq!(reparsed, original);
}

#[test]
fn built_platform_matches_the_spec() {
    let spec: PlatformSpec = serde_json::from_str(PLATFORM_JSON).unwrap();
    let mut built = build_platform(&spec).unwrap();
    built.platform.finalize();

    assert_eq!(built.clusters.len(), 2);
    assert_eq!(built.platform.processors().len(), 8);
    assert_eq!(built.platform.reference_performance(), 2.0);
    assert_eq!(built.platform.reference_freq_max().mhz, 2000.0);
    assert_eq!(built.clusters[1].u_target, Some(0.8));

    let big = built.platform.clock_domain(built.clusters[0].domain);
    assert_eq!(big.freq_eff().mhz, 1000.0);
    assert_eq!(big.processors().len(), 4);
}

#[test]
fn invalid_platforms_are_refused() {
    let unordered = r#"{"clusters": [{
        "nb_procs": 1, "frequencies": [500.0, 1000.0],
        "effective_freq": 500.0, "perf_score": 1.0
    }]}"#;
    let spec: PlatformSpec = serde_json::from_str(unordered).unwrap();
    assert!(matches!(build_platform(&spec), Err(LoaderError::Validation(_))));

    let empty: PlatformSpec = serde_json::from_str(r#"{"clusters": []}"#).unwrap();
    assert!(matches!(build_platform(&empty), Err(LoaderError::Validation(_))));
}

#[test]
fn scenario_parses_and_validates() {
    let json = r#"{
      "tasks": [
        {
          "id": 0,
          "utilization": 0.3,
          "period": 10.0,
          "jobs": [
            {"arrival": 0.0, "duration": 3.0},
            {"arrival": 10.0, "duration": 2.5}
          ]
        }
      ]
    }"#;

    let spec: ScenarioSpec = serde_json::from_str(json).unwrap();
    validate_scenario(&spec).unwrap();
    assert_eq!(spec.tasks[0].jobs.len(), 2);

    let bad = r#"{"tasks": [{"id": 0, "utilization": 0.0, "period": 10.0, "jobs": []}]}"#;
    let spec: ScenarioSpec = serde_json::from_str(bad).unwrap();
    assert!(validate_scenario(&spec).is_err());
}
