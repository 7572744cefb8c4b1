//! The first-fit family of placement policies.

use crate::prelude::*;
use super::by_ascending_perf;

/// Classic first fit over construction order, gated by each cluster's
/// utilization target.
#[derive(Debug, Default)]
pub struct FirstFit;

impl FirstFit {
    pub fn new() -> Self {
        Self
    }
}

impl AllocatorPolicy for FirstFit {
    fn select_cluster(
        &mut self,
        platform: &Platform,
        clusters: &mut [Cluster],
        task: &Task,
    ) -> Option<usize> {
        let util = task.utilization();
        (0..clusters.len()).find(|&idx| {
            clusters[idx].scaled_utilization(platform, util) <= clusters[idx].u_target()
                && clusters[idx].can_admit(task.wcet(), task.period())
        })
    }

    fn name(&self) -> &'static str {
        "ff"
    }
}

/// First fit over clusters sorted by descending performance.
#[derive(Debug, Default)]
pub struct FfBigFirst;

impl FfBigFirst {
    pub fn new() -> Self {
        Self
    }
}

impl AllocatorPolicy for FfBigFirst {
    fn select_cluster(
        &mut self,
        _platform: &Platform,
        clusters: &mut [Cluster],
        task: &Task,
    ) -> Option<usize> {
        let mut order = by_ascending_perf(clusters);
        order.reverse();
        order
            .into_iter()
            .find(|&idx| clusters[idx].can_admit(task.wcet(), task.period()))
    }

    fn name(&self) -> &'static str {
        "ff-big"
    }
}

/// First fit over clusters sorted by ascending performance.
#[derive(Debug, Default)]
pub struct FfLittleFirst;

impl FfLittleFirst {
    pub fn new() -> Self {
        Self
    }
}

impl AllocatorPolicy for FfLittleFirst {
    fn select_cluster(
        &mut self,
        _platform: &Platform,
        clusters: &mut [Cluster],
        task: &Task,
    ) -> Option<usize> {
        by_ascending_perf(clusters)
            .into_iter()
            .find(|&idx| clusters[idx].can_admit(task.wcet(), task.period()))
    }

    fn name(&self) -> &'static str {
        "ff-little"
    }
}

/// Ascending-performance first fit with the utilization-target gate.
#[derive(Debug, Default)]
pub struct FfCap;

impl FfCap {
    pub fn new() -> Self {
        Self
    }
}

impl AllocatorPolicy for FfCap {
    fn select_cluster(
        &mut self,
        platform: &Platform,
        clusters: &mut [Cluster],
        task: &Task,
    ) -> Option<usize> {
        let util = task.utilization();
        by_ascending_perf(clusters).into_iter().find(|&idx| {
            clusters[idx].scaled_utilization(platform, util) <= clusters[idx].u_target()
                && clusters[idx].can_admit(task.wcet(), task.period())
        })
    }

    fn name(&self) -> &'static str {
        "ff-cap"
    }
}

/// Load-balancing first fit.
///
/// Before the ascending-performance pass, every non-big cluster gets its
/// utilization target set to the big cluster's average per-core load scaled
/// by the cluster's performance, steering small tasks away from an idle
/// big cluster.
#[derive(Debug, Default)]
pub struct FfLb;

impl FfLb {
    pub fn new() -> Self {
        Self
    }
}

impl AllocatorPolicy for FfLb {
    fn select_cluster(
        &mut self,
        platform: &Platform,
        clusters: &mut [Cluster],
        task: &Task,
    ) -> Option<usize> {
        let order = by_ascending_perf(clusters);
        let &big = order.last()?;

        let avg_big = if clusters[big].processor_count() > 0 {
            clusters[big].utilization() / clusters[big].processor_count() as f64
        } else {
            0.0
        };

        for &idx in &order {
            if idx != big {
                let perf = clusters[idx].perf();
                clusters[idx].set_u_target(avg_big * perf);
            }
        }

        let util = task.utilization();
        order.into_iter().find(|&idx| {
            clusters[idx].scaled_utilization(platform, util) <= clusters[idx].u_target()
                && clusters[idx].can_admit(task.wcet(), task.period())
        })
    }

    fn name(&self) -> &'static str {
        "ff-lb"
    }
}

/// First fit without gates that counts placement calls; test scaffolding.
#[derive(Debug, Default)]
pub struct CountingAllocator {
    count: usize,
}

impl CountingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl AllocatorPolicy for CountingAllocator {
    fn select_cluster(
        &mut self,
        _platform: &Platform,
        clusters: &mut [Cluster],
        task: &Task,
    ) -> Option<usize> {
        self.count += 1;
        (0..clusters.len()).find(|&idx| clusters[idx].can_admit(task.wcet(), task.period()))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}
