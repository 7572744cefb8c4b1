//! Gantt extraction and rendering for the rtsched LaTeX package.

use crate::prelude::*;

use std::collections::HashMap;

/// Drawable commands of one chart, one axis per task.
#[derive(Clone)]
#[derive(Debug)]
pub enum GanttCommand {
    Arrival { index: usize, time: f64 },
    Deadline { index: usize, time: f64 },
    Execution { index: usize, cpu: u64, start: f64, stop: f64 },
}

#[derive(Clone)]
#[derive(Debug, Default)]
pub struct Gantt {
    pub nb_axis: usize,
    pub duration: f64,
    pub commands: Vec<GanttCommand>,
}

/// Build a chart from a trace. Task ids are mapped to axes 1..=n in order
/// of first appearance; execution slices pair each `dispatch` with the next
/// `preempt` or `job_finished` of the same server.
pub fn build_gantt(records: &[TraceRecord]) -> Gantt {
    let mut chart = Gantt::default();
    let mut axis_of: HashMap<u64, usize> = HashMap::new();
    let mut open_slices: HashMap<u64, (usize, u64, f64)> = HashMap::new(); // sid -> (axis, cpu, start)

    let mut axis = |tid: u64, axis_of: &mut HashMap<u64, usize>| -> usize {
        let next = axis_of.len() + 1;
        *axis_of.entry(tid).or_insert(next)
    };

    for record in records {
        chart.duration = chart.duration.max(record.time);

        match record.kind.as_str() {
            "job_arrival" => {
                let Some(tid) = record.u64_field("tid") else { continue };
                let index = axis(tid, &mut axis_of);
                chart.commands.push(GanttCommand::Arrival { index, time: record.time });
                if let Some(deadline) = record.f64_field("deadline") {
                    chart.commands.push(GanttCommand::Deadline { index, time: deadline });
                    chart.duration = chart.duration.max(deadline);
                }
            }
            "dispatch" => {
                let (Some(tid), Some(sid), Some(cpu)) = (
                    record.u64_field("tid"),
                    record.u64_field("sid"),
                    record.u64_field("cpu"),
                ) else {
                    continue;
                };
                let index = axis(tid, &mut axis_of);
                open_slices.insert(sid, (index, cpu, record.time));
            }
            "preempt" | "job_finished" => {
                let Some(sid) = record.u64_field("sid") else { continue };
                if let Some((index, cpu, start)) = open_slices.remove(&sid) {
                    chart.commands.push(GanttCommand::Execution {
                        index,
                        cpu,
                        start,
                        stop: record.time,
                    });
                }
            }
            _ => {}
        }
    }

    chart.nb_axis = axis_of.len();
    chart
}

fn color_name(cpu: u64) -> &'static str {
    const COLORS: [&str; 6] = ["blue", "red", "green", "orange", "violet", "cyan"];
    COLORS[(cpu as usize) % COLORS.len()]
}

/// Render the chart as an rtsched `RTGrid` environment.
pub fn render_rtsched(chart: &Gantt) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let _ = writeln!(out, "\\begin{{RTGrid}}{{{}}}{{{}}}", chart.nb_axis, chart.duration);
    for command in &chart.commands {
        match command {
            GanttCommand::Arrival { index, time } => {
                let _ = writeln!(out, "\\TaskArrival{{{index}}}{{{time}}}");
            }
            GanttCommand::Deadline { index, time } => {
                let _ = writeln!(out, "\\TaskDeadline{{{index}}}{{{time}}}");
            }
            GanttCommand::Execution { index, cpu, start, stop } => {
                let _ = writeln!(
                    out,
                    "\\TaskExecution[color={}]{{{index}}}{{{start}}}{{{stop}}}",
                    color_name(*cpu),
                );
            }
        }
    }
    out.push_str("\\end{RTGrid}\n");
    out
}

// =============================================================================

#[cfg(test)]
fn record(time: f64, kind: &str, fields: Vec<(&str, FieldValue)>) -> TraceRecord {
    TraceRecord {
        time,
        kind: kind.to_owned(),
        fields: fields.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
    }
}

#[test]
fn slices_pair_dispatch_with_preempt_or_finish() {
    let records = vec![
        record(0.0, "job_arrival", vec![
            ("tid", FieldValue::Int(0)),
            ("deadline", FieldValue::Float(10.0)),
        ]),
        record(0.0, "dispatch", vec![
            ("tid", FieldValue::Int(0)),
            ("sid", FieldValue::Int(0)),
            ("cpu", FieldValue::Int(0)),
        ]),
        record(2.0, "preempt", vec![
            ("tid", FieldValue::Int(0)),
            ("sid", FieldValue::Int(0)),
            ("cpu", FieldValue::Int(0)),
        ]),
        record(4.0, "dispatch", vec![
            ("tid", FieldValue::Int(0)),
            ("sid", FieldValue::Int(0)),
            ("cpu", FieldValue::Int(0)),
        ]),
        record(7.0, "job_finished", vec![
            ("tid", FieldValue::Int(0)),
            ("sid", FieldValue::Int(0)),
        ]),
    ];

    let chart = build_gantt(&records);
    assert_eq!(chart.nb_axis, 1);
    assert_eq!(chart.duration, 10.0);

    let executions: Vec<_> = chart
        .commands
        .iter()
        .filter(|c| matches!(c, GanttCommand::Execution { .. }))
        .collect();
    assert_eq!(executions.len(), 2);

    let rendered = render_rtsched(&chart);
    assert!(rendered.starts_with("\\begin{RTGrid}{1}{10}"));
    assert!(rendered.contains("\\TaskArrival{1}{0}"));
    assert!(rendered.contains("\\TaskExecution[color=blue]{1}{0}{2}"));
    assert!(rendered.contains("\\TaskExecution[color=blue]{1}{4}{7}"));
    assert!(rendered.ends_with("\\end{RTGrid}\n"));
}
