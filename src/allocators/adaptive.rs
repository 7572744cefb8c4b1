//! Capacity-gated first fit with a fitted utilization-target model.
//!
//! Both variants watch the largest per-task utilization seen so far and set
//! the smallest cluster's target from a model fitted offline against
//! deadline-miss rates over the expected total utilization.

use crate::prelude::*;
use super::by_ascending_perf;

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn gated_first_fit(
    platform: &Platform,
    clusters: &mut [Cluster],
    order: &[usize],
    task: &Task,
) -> Option<usize> {
    let util = task.utilization();
    order.iter().copied().find(|&idx| {
        clusters[idx].scaled_utilization(platform, util) <= clusters[idx].u_target()
            && clusters[idx].can_admit(task.wcet(), task.period())
    })
}

/// Linear model: `u_target = clamp01(A * u_max_obs + B * U_expected + C)`.
#[derive(Debug)]
pub struct FfCapAdaptiveLinear {
    observed_umax: f64,
    expected_total_util: f64,
}

impl FfCapAdaptiveLinear {
    const A_UMAX: f64 = 1.616;
    const B_U: f64 = 0.098;
    const C: f64 = -0.373;

    pub fn new(expected_total_util: f64) -> Self {
        Self { observed_umax: 0.0, expected_total_util }
    }

    fn model(&self) -> f64 {
        clamp01(
            Self::A_UMAX * self.observed_umax
                + Self::B_U * self.expected_total_util
                + Self::C,
        )
    }
}

impl AllocatorPolicy for FfCapAdaptiveLinear {
    fn select_cluster(
        &mut self,
        platform: &Platform,
        clusters: &mut [Cluster],
        task: &Task,
    ) -> Option<usize> {
        self.observed_umax = self.observed_umax.max(task.utilization());

        let order = by_ascending_perf(clusters);
        if let Some(&smallest) = order.first() {
            clusters[smallest].set_u_target(self.model());
        }
        gated_first_fit(platform, clusters, &order, task)
    }

    fn name(&self) -> &'static str {
        "ff-cap-lin"
    }
}

/// Quadratic model over `(u_max_obs, U_expected)`.
#[derive(Debug)]
pub struct FfCapAdaptivePoly {
    observed_umax: f64,
    expected_total_util: f64,
}

impl FfCapAdaptivePoly {
    const C0: f64 = -0.285854319;
    const C1: f64 = 2.339707990;
    const C2: f64 = 0.031898477;
    const C3: f64 = -1.376401346;
    const C4: f64 = -0.037369647;
    const C5: f64 = 0.007632732;

    pub fn new(expected_total_util: f64) -> Self {
        Self { observed_umax: 0.0, expected_total_util }
    }

    fn model(&self) -> f64 {
        let u = self.observed_umax;
        let total = self.expected_total_util;
        clamp01(
            Self::C0
                + Self::C1 * u
                + Self::C2 * total
                + Self::C3 * u * u
                + Self::C4 * u * total
                + Self::C5 * total * total,
        )
    }
}

impl AllocatorPolicy for FfCapAdaptivePoly {
    fn select_cluster(
        &mut self,
        platform: &Platform,
        clusters: &mut [Cluster],
        task: &Task,
    ) -> Option<usize> {
        self.observed_umax = self.observed_umax.max(task.utilization());

        let order = by_ascending_perf(clusters);
        if let Some(&smallest) = order.first() {
            clusters[smallest].set_u_target(self.model());
        }
        gated_first_fit(platform, clusters, &order, task)
    }

    fn name(&self) -> &'static str {
        "ff-cap-poly"
    }
}

// =============================================================================

#[test]
fn linear_model_clamps_to_unit_interval() {
    let mut policy = FfCapAdaptiveLinear::new(0.0);
    assert_eq!(policy.model(), 0.0); // 1.616*0 + 0.098*0 - 0.373 < 0

    policy.observed_umax = 0.5;
    let expected = 1.616 * 0.5 - 0.373;
    assert!((policy.model() - expected).abs() < 1e-12);

    policy.observed_umax = 1.0;
    assert_eq!(policy.model(), 1.0);
}

#[test]
fn poly_model_matches_coefficients() {
    let mut policy = FfCapAdaptivePoly::new(2.0);
    policy.observed_umax = 0.5;

    let expected = -0.285854319
        + 2.339707990 * 0.5
        + 0.031898477 * 2.0
        - 1.376401346 * 0.25
        - 0.037369647 * 0.5 * 2.0
        + 0.007632732 * 4.0;
    assert!((policy.model() - expected).abs() < 1e-12);
}
