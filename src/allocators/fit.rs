//! Best-fit and worst-fit placement over remaining cluster capacity.

use crate::prelude::*;

/// Admissible cluster with the least remaining capacity wins; ties go to
/// construction order.
#[derive(Debug, Default)]
pub struct BestFit;

impl BestFit {
    pub fn new() -> Self {
        Self
    }
}

impl AllocatorPolicy for BestFit {
    fn select_cluster(
        &mut self,
        platform: &Platform,
        clusters: &mut [Cluster],
        task: &Task,
    ) -> Option<usize> {
        let util = task.utilization();
        let mut best: Option<usize> = None;
        let mut best_remaining = f64::MAX;

        for idx in 0..clusters.len() {
            if clusters[idx].scaled_utilization(platform, util) <= clusters[idx].u_target()
                && clusters[idx].can_admit(task.wcet(), task.period())
            {
                let remaining = clusters[idx].remaining_capacity();
                if remaining < best_remaining {
                    best_remaining = remaining;
                    best = Some(idx);
                }
            }
        }
        best
    }

    fn name(&self) -> &'static str {
        "bf"
    }
}

/// Admissible cluster with the most remaining capacity wins; ties go to
/// construction order.
#[derive(Debug, Default)]
pub struct WorstFit;

impl WorstFit {
    pub fn new() -> Self {
        Self
    }
}

impl AllocatorPolicy for WorstFit {
    fn select_cluster(
        &mut self,
        platform: &Platform,
        clusters: &mut [Cluster],
        task: &Task,
    ) -> Option<usize> {
        let util = task.utilization();
        let mut best: Option<usize> = None;
        let mut best_remaining = -1.0;

        for idx in 0..clusters.len() {
            if clusters[idx].scaled_utilization(platform, util) <= clusters[idx].u_target()
                && clusters[idx].can_admit(task.wcet(), task.period())
            {
                let remaining = clusters[idx].remaining_capacity();
                if remaining > best_remaining {
                    best_remaining = remaining;
                    best = Some(idx);
                }
            }
        }
        best
    }

    fn name(&self) -> &'static str {
        "wf"
    }
}
