//! Statistics extracted from a finished trace.

use crate::prelude::*;

use std::collections::BTreeMap;

/// Per-task figures. Response times pair arrivals with completions in FIFO
/// order, which matches the per-server job queues.
#[derive(Clone)]
#[derive(Debug, Default)]
pub struct TaskStats {
    pub arrivals: usize,
    pub completions: usize,
    pub deadline_misses: usize,
    pub response_times: Vec<f64>,
}

impl TaskStats {
    pub fn average_response_time(&self) -> f64 {
        if self.response_times.is_empty() {
            return 0.0;
        }
        self.response_times.iter().sum::<f64>() / self.response_times.len() as f64
    }

    pub fn worst_response_time(&self) -> f64 {
        self.response_times.iter().copied().fold(0.0, f64::max)
    }
}

/// Whole-run statistics.
#[derive(Clone)]
#[derive(Debug, Default)]
pub struct SimStats {
    pub tasks: BTreeMap<u64, TaskStats>,
    pub preemptions: usize,
    pub context_switches: usize,
    pub rejected_tasks: usize,
    pub frequency_changes: usize,
    pub core_state_changes: usize,
    pub duration: f64,
}

impl SimStats {
    /// Walk a trace once and accumulate everything.
    pub fn from_records(records: &[TraceRecord]) -> Self {
        let mut stats = Self::default();
        let mut pending: BTreeMap<u64, Vec<f64>> = BTreeMap::new();

        for record in records {
            stats.duration = stats.duration.max(record.time);

            match record.kind.as_str() {
                "job_arrival" => {
                    let Some(tid) = record.u64_field("tid") else { continue };
                    stats.tasks.entry(tid).or_default().arrivals += 1;
                    pending.entry(tid).or_default().push(record.time);
                }
                "job_finished" => {
                    let Some(tid) = record.u64_field("tid") else { continue };
                    let task = stats.tasks.entry(tid).or_default();
                    task.completions += 1;
                    if let Some(arrivals) = pending.get_mut(&tid) {
                        if !arrivals.is_empty() {
                            let arrival = arrivals.remove(0);
                            task.response_times.push(record.time - arrival);
                        }
                    }
                }
                "deadline_miss" => {
                    let Some(tid) = record.u64_field("tid") else { continue };
                    stats.tasks.entry(tid).or_default().deadline_misses += 1;
                }
                "preempt" => stats.preemptions += 1,
                "dispatch" => stats.context_switches += 1,
                "task_rejected" => stats.rejected_tasks += 1,
                "freq_change" => stats.frequency_changes += 1,
                "proc_state_change" => stats.core_state_changes += 1,
                _ => {}
            }
        }

        stats
    }

    pub fn total_deadline_misses(&self) -> usize {
        self.tasks.values().map(|t| t.deadline_misses).sum()
    }

    pub fn total_completions(&self) -> usize {
        self.tasks.values().map(|t| t.completions).sum()
    }

    /// The active-utilization timeline: one (time, value) step per server
    /// activation or deactivation.
    pub fn utilization_timeline(records: &[TraceRecord]) -> Vec<(f64, f64)> {
        let mut current = 0.0;
        let mut timeline = vec![(0.0, 0.0)];

        for record in records {
            let delta = match record.kind.as_str() {
                "serv_ready" => record.f64_field("utilization").unwrap_or(0.0),
                "serv_inactive" => -record.f64_field("utilization").unwrap_or(0.0),
                _ => continue,
            };
            current += delta;
            timeline.push((record.time, current));
        }

        timeline
    }
}

// =============================================================================

#[cfg(test)]
fn record(time: f64, kind: &str, fields: &[(&str, u64)]) -> TraceRecord {
    TraceRecord {
        time,
        kind: kind.to_owned(),
        fields: fields
            .iter()
            .map(|&(k, v)| (k.to_owned(), FieldValue::Int(v)))
            .collect(),
    }
}

#[test]
fn response_times_pair_fifo() {
    let records = vec![
        record(0.0, "job_arrival", &[("tid", 0)]),
        record(0.0, "job_arrival", &[("tid", 1)]),
        record(2.0, "job_finished", &[("tid", 0)]),
        record(5.0, "job_finished", &[("tid", 1)]),
        record(10.0, "job_arrival", &[("tid", 0)]),
        record(12.0, "job_finished", &[("tid", 0)]),
    ];

    let stats = SimStats::from_records(&records);
    assert_eq!(stats.tasks[&0].response_times, vec![2.0, 2.0]);
    assert_eq!(stats.tasks[&1].response_times, vec![5.0]);
    assert_eq!(stats.tasks[&0].arrivals, 2);
    assert_eq!(stats.total_completions(), 3);
    assert_eq!(stats.duration, 12.0);
}

#[test]
fn misses_and_counters() {
    let records = vec![
        record(0.0, "job_arrival", &[("tid", 0)]),
        record(1.0, "dispatch", &[("sid", 0)]),
        record(2.0, "preempt", &[("sid", 0)]),
        record(3.0, "dispatch", &[("sid", 0)]),
        record(4.0, "deadline_miss", &[("tid", 0)]),
        record(5.0, "task_rejected", &[("tid", 7)]),
    ];

    let stats = SimStats::from_records(&records);
    assert_eq!(stats.tasks[&0].deadline_misses, 1);
    assert_eq!(stats.total_deadline_misses(), 1);
    assert_eq!(stats.preemptions, 1);
    assert_eq!(stats.context_switches, 2);
    assert_eq!(stats.rejected_tasks, 1);
}

#[test]
fn utilization_timeline_steps() {
    let records = vec![
        TraceRecord {
            time: 0.0,
            kind: "serv_ready".into(),
            fields: vec![("utilization".into(), FieldValue::Float(0.3))],
        },
        TraceRecord {
            time: 4.0,
            kind: "serv_inactive".into(),
            fields: vec![("utilization".into(), FieldValue::Float(0.3))],
        },
    ];

    let timeline = SimStats::utilization_timeline(&records);
    assert_eq!(timeline, vec![(0.0, 0.0), (0.0, 0.3), (4.0, 0.0)]);
}
