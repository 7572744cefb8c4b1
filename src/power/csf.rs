//! CSF: core sleeping first.
//!
//! Same structure as FFA, but the core count is minimized before any
//! voltage scaling: `m_min = ceil((U_active - u_max) / (1 - u_max))` is the
//! smallest count passing the GFB bound, and the frequency floor is then
//! computed over those `m_min` cores only.

use crate::prelude::*;

#[derive(Debug, Default)]
pub struct Csf;

impl Csf {
    pub fn new() -> Self {
        Self
    }
}

impl FrequencyPolicy for Csf {
    fn target(
        &self,
        domain: &ClockDomain,
        nb_procs: usize,
        load: &SchedulerLoad,
    ) -> PlatformTarget {
        let freq_max = domain.freq_max().mhz;
        let freq_eff = domain.freq_eff().mhz;
        let u = load.active_utilization;
        let u_max = load.max_utilization;

        let m_min = if u_max >= 1.0 {
            nb_procs
        } else {
            clamp_procs((u - u_max) / (1.0 - u_max), nb_procs)
        };

        let freq_min = compute_freq_min(freq_max, u, u_max, m_min as f64).min(freq_max);

        if freq_eff > 0.0 && freq_min < freq_eff {
            PlatformTarget {
                frequency: domain.ceil_to_mode(Frequency { mhz: freq_eff }),
                active_processors: clamp_procs(
                    m_min as f64 * freq_min / freq_eff,
                    nb_procs,
                ),
            }
        } else {
            PlatformTarget {
                frequency: domain.ceil_to_mode(Frequency { mhz: freq_min }),
                active_processors: m_min,
            }
        }
    }

    fn name(&self) -> &'static str {
        "csf"
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
fn minimizes_cores_before_voltage() {
    // U_active = 1.2, u_max = 0.4: m_min = ceil(0.8 / 0.6) = 2, then
    // f_min = 2000 * (1.2 + 0.4) / 2 = 1600 >= f_eff, rounded to 2000.
    let load = SchedulerLoad {
        total_utilization: 1.2,
        active_utilization: 1.2,
        max_utilization: 0.4,
    };

    let target = Csf::new().target(&domain(), 4, &load);
    assert_eq!(target.active_processors, 2);
    assert_eq!(target.frequency.mhz, 2000.0);
}

#[test]
fn light_load_collapses_to_one_core() {
    // U_active = 0.3, u_max = 0.3: m_min = 1, f_min = 600 < f_eff:
    // hold 1000 MHz on ceil(1 * 600 / 1000) = 1 core.
    let load = SchedulerLoad {
        total_utilization: 0.3,
        active_utilization: 0.3,
        max_utilization: 0.3,
    };

    let target = Csf::new().target(&domain(), 4, &load);
    assert_eq!(target.active_processors, 1);
    assert_eq!(target.frequency.mhz, 1000.0);
}
