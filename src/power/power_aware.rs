//! PowerAware DVFS.
//!
//! Keeps every core on and scales the whole domain to the lowest frequency
//! that preserves global-EDF schedulability:
//! `f = f_max * ((m - 1) * u_max + U_total) / m`, ceiling-rounded to the
//! supported set.

use crate::prelude::*;

#[derive(Debug, Default)]
pub struct PowerAware;

impl PowerAware {
    pub fn new() -> Self {
        Self
    }
}

impl FrequencyPolicy for PowerAware {
    fn target(
        &self,
        domain: &ClockDomain,
        nb_procs: usize,
        load: &SchedulerLoad,
    ) -> PlatformTarget {
        let m = nb_procs as f64;
        let f_new = compute_freq_min(
            domain.freq_max().mhz,
            load.total_utilization,
            load.max_utilization,
            m,
        ).min(domain.freq_max().mhz);

        PlatformTarget {
            frequency: domain.ceil_to_mode(Frequency { mhz: f_new }),
            active_processors: nb_procs,
        }
    }

    fn name(&self) -> &'static str {
        "pa"
    }
}

// =============================================================================

#[cfg(test)]
fn domain() -> ClockDomain {
    let (platform, big_cd, _) = crate::hardware::platform::two_cluster_platform();
    platform.clock_domain(big_cd).clone()
}

#[test]
fn scales_to_the_schedulable_minimum() {
    // Two servers of U = 0.3 on one core: f = 2000 * 0.6 = 1200; the test
    // domain supports {2000, 1000, 500}, so the ceiling mode is 2000.
    let domain = domain();
    let load = SchedulerLoad {
        total_utilization: 0.6,
        active_utilization: 0.6,
        max_utilization: 0.3,
    };

    let target = PowerAware::new().target(&domain, 1, &load);
    assert_eq!(target.active_processors, 1);
    assert_eq!(target.frequency.mhz, 2000.0);
}

#[test]
fn all_cores_stay_active() {
    let domain = domain();
    let load = SchedulerLoad {
        total_utilization: 0.8,
        active_utilization: 0.8,
        max_utilization: 0.4,
    };

    // f = 2000 * (3 * 0.4 + 0.8) / 4 = 1000.
    let target = PowerAware::new().target(&domain, 4, &load);
    assert_eq!(target.active_processors, 4);
    assert_eq!(target.frequency.mhz, 1000.0);
}
