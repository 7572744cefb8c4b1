//! Energy integration over a finished trace.
//!
//! Active cores draw the cluster's model power `P(f) = a0 + a1 f + a2 f^2 +
//! a3 f^3` (mW over MHz); sleeping cores draw nothing under the default
//! C-state set. The trace's `freq_change` and `proc_state_change` records
//! delimit the integration segments.

use crate::prelude::*;

use std::collections::BTreeMap;

/// Evaluate a cubic power model at a frequency.
pub fn power_at(model: &[f64; 4], freq_mhz: f64) -> Power {
    let f = freq_mhz;
    Power { mw: model[0] + model[1] * f + model[2] * f * f + model[3] * f * f * f }
}

/// Per-cluster state while sweeping the trace.
struct ClusterTrack {
    model: [f64; 4],
    freq_mhz: f64,
    cpus: BTreeMap<u64, bool>, // cpu -> active
}

/// Integrate the energy of one cluster's domain over a trace.
///
/// `cpus` lists the processor ids of the domain and `initial_freq` its
/// frequency at t = 0; both come from the built platform. Cores are
/// considered active until the trace says otherwise.
pub fn compute_energy(
    records: &[TraceRecord],
    domain: ClockDomainId,
    cpus: &[ProcessorId],
    initial_freq: Frequency,
    model: &[f64; 4],
) -> Energy {
    let mut track = ClusterTrack {
        model: *model,
        freq_mhz: initial_freq.mhz,
        cpus: cpus.iter().map(|p| (p.index() as u64, true)).collect(),
    };

    let mut energy = Energy { mj: 0.0 };
    let mut cursor = 0.0;

    for record in records {
        let dt = record.time - cursor;
        if dt > 0.0 {
            let active = track.cpus.values().filter(|&&a| a).count() as f64;
            let segment = power_at(&track.model, track.freq_mhz) * Duration::secs(dt);
            energy += Energy { mj: segment.mj * active };
            cursor = record.time;
        }

        match record.kind.as_str() {
            "freq_change" => {
                if record.u64_field("domain") == Some(domain.index() as u64) {
                    if let Some(freq) = record.f64_field("freq") {
                        track.freq_mhz = freq;
                    }
                }
            }
            "proc_state_change" => {
                let Some(cpu) = record.u64_field("cpu") else { continue };
                let Some(entry) = track.cpus.get_mut(&cpu) else { continue };
                *entry = match record.field("state") {
                    Some(FieldValue::Str(state)) => state != "sleep",
                    _ => *entry,
                };
            }
            _ => {}
        }
    }

    energy
}

// =============================================================================

#[test]
fn cubic_model_evaluation() {
    let model = [100.0, 0.5, 0.0, 0.0];
    assert_eq!(power_at(&model, 1000.0).mw, 600.0);

    let cubic = [0.0, 0.0, 0.0, 1e-6];
    assert_eq!(power_at(&cubic, 1000.0).mw, 1000.0);
}

#[test]
fn integrates_over_frequency_and_sleep_segments() {
    let model = [0.0, 1.0, 0.0, 0.0]; // P(f) = f mW
    let records = vec![
        TraceRecord {
            time: 2.0,
            kind: "freq_change".into(),
            fields: vec![
                ("domain".into(), FieldValue::Int(0)),
                ("freq".into(), FieldValue::Float(1000.0)),
            ],
        },
        TraceRecord {
            time: 3.0,
            kind: "proc_state_change".into(),
            fields: vec![
                ("cpu".into(), FieldValue::Int(1)),
                ("state".into(), FieldValue::Str("sleep".into())),
            ],
        },
        TraceRecord { time: 5.0, kind: "sim_finished".into(), fields: Vec::new() },
    ];

    // Two cores at 2000 mW for 2 s, two at 1000 mW for 1 s, then one core
    // for 2 s: 8000 + 2000 + 2000 = 12000 mJ.
    let energy = compute_energy(
        &records,
        ClockDomainId(0),
        &[ProcessorId(0), ProcessorId(1)],
        Frequency { mhz: 2000.0 },
        &model,
    );
    assert_eq!(energy.mj, 12000.0);
}
