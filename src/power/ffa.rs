//! FFA: frequency-first adaptation with core sleeping below the efficient
//! point.
//!
//! Computes the schedulable frequency floor over the contending bandwidth.
//! Above the efficient frequency the domain simply scales; below it,
//! running slower would cost more energy per unit of work, so the policy
//! holds `f_eff` and sleeps cores instead: `active = ceil(m * f_min / f_eff)`.

use crate::prelude::*;

#[derive(Debug, Default)]
pub struct Ffa;

impl Ffa {
    pub fn new() -> Self {
        Self
    }
}

impl FrequencyPolicy for Ffa {
    fn target(
        &self,
        domain: &ClockDomain,
        nb_procs: usize,
        load: &SchedulerLoad,
    ) -> PlatformTarget {
        let m = nb_procs as f64;
        let freq_max = domain.freq_max().mhz;
        let freq_eff = domain.freq_eff().mhz;

        let freq_min = compute_freq_min(
            freq_max,
            load.active_utilization,
            load.max_utilization,
            m,
        ).min(freq_max);

        if freq_eff > 0.0 && freq_min < freq_eff {
            PlatformTarget {
                frequency: domain.ceil_to_mode(Frequency { mhz: freq_eff }),
                active_processors: clamp_procs(m * freq_min / freq_eff, nb_procs),
            }
        } else {
            PlatformTarget {
                frequency: domain.ceil_to_mode(Frequency { mhz: freq_min }),
                active_processors: nb_procs,
            }
        }
    }

    fn name(&self) -> &'static str {
        "ffa"
    }
}

// =============================================================================

#[cfg(test)]
fn domain() -> ClockDomain {
    ClockDomain::new(
        ClockDomainId(0),
        vec![
            Frequency { mhz: 2000.0 },
            Frequency { mhz: 1500.0 },
            Frequency { mhz: 1000.0 },
            Frequency { mhz: 500.0 },
        ],
        Frequency { mhz: 1000.0 },
        None,
    )
}

#[test]
fn below_efficient_point_sleeps_cores() {
    // U_active = 0.4, u_max = 0.2 on 4 cores: f_min = 500 < f_eff = 1000,
    // so hold 1000 MHz with ceil(4 * 500 / 1000) = 2 cores.
    let load = SchedulerLoad {
        total_utilization: 0.4,
        active_utilization: 0.4,
        max_utilization: 0.2,
    };

    let target = Ffa::new().target(&domain(), 4, &load);
    assert_eq!(target.frequency.mhz, 1000.0);
    assert_eq!(target.active_processors, 2);
}

#[test]
fn above_efficient_point_scales_frequency() {
    // f_min = 2000 * (2.4 + 3 * 0.6) / 4 = 2100, capped at f_max.
    let load = SchedulerLoad {
        total_utilization: 2.4,
        active_utilization: 2.4,
        max_utilization: 0.6,
    };

    let target = Ffa::new().target(&domain(), 4, &load);
    assert_eq!(target.frequency.mhz, 2000.0);
    assert_eq!(target.active_processors, 4);
}
