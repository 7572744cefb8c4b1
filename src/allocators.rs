//! Multi-cluster task placement: the cluster view, the routing harness
//! pinning tasks to clusters, and the placement policies.

pub mod prelude {
    pub use super::first_fit::{
        CountingAllocator, FfBigFirst, FfCap, FfLb, FfLittleFirst, FirstFit,
    };
    pub use super::fit::{BestFit, WorstFit};
    pub use super::adaptive::{FfCapAdaptiveLinear, FfCapAdaptivePoly};
    pub use super::mcts::Mcts;
    pub use super::{parse_allocator, AllocatorPolicy, Cluster, RouterOutcome, TaskRouter};
}

pub mod first_fit;
pub mod fit;
pub mod adaptive;
pub mod mcts;

use crate::prelude::*;

use std::collections::HashMap;

/// One schedulable island: a clock domain, its EDF scheduler and the
/// normalization data placement policies work with.
pub struct Cluster {
    id: ClusterId,
    domain: ClockDomainId,
    sched: EdfScheduler,
    perf: f64,
    u_target: f64,
    processor_id: Option<ProcessorId>,
}

impl Cluster {
    pub fn new(id: ClusterId, domain: ClockDomainId, sched: EdfScheduler, perf: f64) -> Self {
        let processor_id = match sched.processors() {
            [only] => Some(*only),
            _ => None,
        };
        Self { id, domain, sched, perf, u_target: 1.0, processor_id }
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn domain(&self) -> ClockDomainId {
        self.domain
    }

    pub fn sched(&self) -> &EdfScheduler {
        &self.sched
    }

    pub fn sched_mut(&mut self) -> &mut EdfScheduler {
        &mut self.sched
    }

    pub fn perf(&self) -> f64 {
        self.perf
    }

    /// Per-processor utilization ceiling used by the capacity-gated
    /// placement policies.
    pub fn u_target(&self) -> f64 {
        self.u_target
    }

    pub fn set_u_target(&mut self, u_target: f64) {
        self.u_target = u_target;
    }

    /// Processor id reported in placement traces for single-core clusters.
    pub fn processor_id(&self) -> Option<ProcessorId> {
        self.processor_id
    }

    pub fn processor_count(&self) -> usize {
        self.sched.processor_count()
    }

    pub fn utilization(&self) -> f64 {
        self.sched.total_utilization()
    }

    pub fn remaining_capacity(&self) -> f64 {
        self.processor_count() as f64 - self.utilization()
    }

    /// Slowdown of this cluster relative to the reference operating point.
    pub fn scale_speed(&self, platform: &Platform) -> f64 {
        let local_max = platform.clock_domain(self.domain).freq_max().mhz;
        if local_max <= 0.0 {
            return 1.0;
        }
        platform.reference_freq_max().mhz / local_max
    }

    /// A task's utilization translated into this cluster's terms.
    pub fn scaled_utilization(&self, platform: &Platform, task_util: f64) -> f64 {
        if self.perf <= 0.0 {
            return task_util;
        }
        task_util * self.scale_speed(platform) / self.perf
    }

    pub fn can_admit(&self, budget: Duration, period: Duration) -> bool {
        self.sched.can_admit(budget, period)
    }
}

/// Picks a cluster for a task's first job, or rejects it.
pub trait AllocatorPolicy {
    fn select_cluster(
        &mut self,
        platform: &Platform,
        clusters: &mut [Cluster],
        task: &Task,
    ) -> Option<usize>;

    fn name(&self) -> &'static str;
}

/// What the router did with an arrival.
#[derive(Debug, Default)]
pub struct RouterOutcome {
    pub cluster: Option<ClusterId>,
    pub utilization_changed: bool,
}

/// Routes job arrivals to clusters.
///
/// The first job of a task selects a cluster through the policy and pins
/// the task there for good; tasks are never migrated between clusters.
/// Rejections (no candidate, or the scheduler's admission refusing) emit a
/// `task_rejected` trace.
pub struct TaskRouter {
    policy: Box<dyn AllocatorPolicy>,
    assignments: HashMap<TaskId, usize>,
}

impl TaskRouter {
    pub fn new(policy: Box<dyn AllocatorPolicy>) -> Self {
        Self { policy, assignments: HashMap::new() }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn assignment(&self, task: TaskId) -> Option<usize> {
        self.assignments.get(&task).copied()
    }

    pub fn on_job_arrival(
        &mut self,
        engine: &mut Engine,
        platform: &Platform,
        clusters: &mut [Cluster],
        task_id: TaskId,
        duration: Duration,
    ) -> RouterOutcome {
        if let Some(&idx) = self.assignments.get(&task_id) {
            return Self::route(engine, platform, clusters, idx, task_id, duration, None);
        }

        let task = platform.task(task_id);
        let Some(idx) = self.policy.select_cluster(platform, clusters, task) else {
            Self::trace_rejected(engine, task_id);
            return RouterOutcome::default();
        };

        self.assignments.insert(task_id, idx);
        let placement = Some((clusters[idx].domain(), clusters[idx].processor_id()));
        let outcome =
            Self::route(engine, platform, clusters, idx, task_id, duration, placement);
        if outcome.cluster.is_none() {
            self.assignments.remove(&task_id);
        }
        outcome
    }

    fn route(
        engine: &mut Engine,
        platform: &Platform,
        clusters: &mut [Cluster],
        idx: usize,
        task_id: TaskId,
        duration: Duration,
        placement: Option<(ClockDomainId, Option<ProcessorId>)>,
    ) -> RouterOutcome {
        match clusters[idx].sched_mut().on_job_arrival(engine, platform, task_id, duration) {
            Ok(sched_outcome) => {
                if let Some((domain, cpu)) = placement {
                    engine.trace(|w| {
                        w.event_type("task_placed");
                        w.field("tid", task_id.index().into());
                        w.field("cluster_id", domain.index().into());
                        if let Some(cpu) = cpu {
                            w.field("cpu", cpu.index().into());
                        }
                    });
                }
                RouterOutcome {
                    cluster: Some(clusters[idx].id()),
                    utilization_changed: sched_outcome.utilization_changed,
                }
            }
            Err(SimulationError::Admission { .. }) => {
                Self::trace_rejected(engine, task_id);
                RouterOutcome::default()
            }
            Err(err) => panic!("unexpected scheduler error on arrival: {err}"),
        }
    }

    fn trace_rejected(engine: &mut Engine, task_id: TaskId) {
        engine.trace(|w| {
            w.event_type("task_rejected");
            w.field("tid", task_id.index().into());
        });
    }
}

/// Indices of `clusters` sorted by ascending performance score, ties kept
/// in construction order.
pub(crate) fn by_ascending_perf(clusters: &[Cluster]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..clusters.len()).collect();
    order.sort_by(|&a, &b| {
        clusters[a].perf().partial_cmp(&clusters[b].perf()).unwrap().then(a.cmp(&b))
    });
    order
}

/// Build a placement policy from a CLI spec `name[:key=value,...]`.
///
/// A nonzero `seed` replaces the contract seed of allocators with a
/// configurable random source (currently MCTS).
pub fn parse_allocator(spec: &str, seed: u64) -> SimResult<Box<dyn AllocatorPolicy>> {
    let (name, params) = match spec.split_once(':') {
        Some((name, params)) => (name, Some(params)),
        None => (spec, None),
    };

    let mut options: HashMap<&str, &str> = HashMap::new();
    if let Some(params) = params {
        for pair in params.split(',') {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                SimulationError::Loader(format!("allocator option without value: {pair}"))
            })?;
            options.insert(key, value);
        }
    }

    let expected = |options: &HashMap<&str, &str>| -> SimResult<f64> {
        options
            .get("expected")
            .map(|v| {
                v.parse::<f64>().map_err(|err| {
                    SimulationError::Loader(format!("invalid expected utilization: {err}"))
                })
            })
            .unwrap_or(Ok(0.0))
    };

    let policy: Box<dyn AllocatorPolicy> = match name {
        "ff" => Box::new(FirstFit::new()),
        "ff-big" => Box::new(FfBigFirst::new()),
        "ff-little" => Box::new(FfLittleFirst::new()),
        "ff-cap" => Box::new(FfCap::new()),
        "ff-lb" => Box::new(FfLb::new()),
        "bf" => Box::new(BestFit::new()),
        "wf" => Box::new(WorstFit::new()),
        "ff-cap-lin" => Box::new(FfCapAdaptiveLinear::new(expected(&options)?)),
        "ff-cap-poly" => Box::new(FfCapAdaptivePoly::new(expected(&options)?)),
        "counting" => Box::new(CountingAllocator::new()),
        "mcts" => {
            let pattern = options
                .get("pattern")
                .map(|v| {
                    v.split('-')
                        .map(|step| {
                            step.parse::<u32>().map_err(|err| {
                                SimulationError::Loader(format!("invalid mcts pattern: {err}"))
                            })
                        })
                        .collect::<SimResult<Vec<u32>>>()
                })
                .unwrap_or(Ok(Vec::new()))?;
            let mcts = Mcts::new(pattern);
            if seed != 0 {
                Box::new(mcts.with_seed(seed))
            } else {
                Box::new(mcts)
            }
        }
        other => {
            return Err(SimulationError::Loader(format!("unknown allocator: {other}")));
        }
    };

    Ok(policy)
}

// =============================================================================

#[test]
fn parse_known_allocators() {
    for name in ["ff", "ff-big", "ff-little", "ff-cap", "ff-lb", "bf", "wf", "counting"] {
        assert_eq!(parse_allocator(name, 0).unwrap().name(), name);
    }

    let mcts = parse_allocator("mcts:pattern=0-1-0", 0).unwrap();
    assert_eq!(mcts.name(), "mcts");

    assert!(parse_allocator("nope", 0).is_err());
    assert!(parse_allocator("mcts:pattern=x", 0).is_err());
    assert!(parse_allocator("ff-cap-lin:expected=0.8", 0).is_ok());
}
