pub mod prelude {
    pub use super::{
        Task,
        Job,
        hyperperiod,
    };
}

use crate::prelude::*;

/// A periodic task. Parameters are immutable; the WCET is expressed in the
/// reference processor type's units.
#[derive(Clone)]
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    period: Duration,
    relative_deadline: Duration,
    wcet: Duration,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        period: Duration,
        relative_deadline: Duration,
        wcet: Duration,
    ) -> Self {
        Self { id, period, relative_deadline, wcet }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn relative_deadline(&self) -> Duration {
        self.relative_deadline
    }

    pub fn wcet(&self) -> Duration {
        self.wcet
    }

    pub fn utilization(&self) -> f64 {
        self.wcet / self.period
    }

    /// Wall-clock WCET on a given processor type at its maximum frequency:
    /// `wcet * ref_perf / type_perf`.
    pub fn wcet_on(&self, proc_type: &ProcessorType, reference_performance: f64) -> Duration {
        self.wcet * (reference_performance / proc_type.performance())
    }
}

/// One released instance of a task.
///
/// Work is tracked in reference units; `0 <= remaining <= total` up to the
/// time epsilon, with negative residues clamped to zero.
#[derive(Clone)]
#[derive(Debug)]
pub struct Job {
    task: TaskId,
    total_work: Duration,
    remaining_work: Duration,
    absolute_deadline: TimePoint,
}

impl Job {
    pub fn new(task: TaskId, total_work: Duration, absolute_deadline: TimePoint) -> Self {
        Self { task, total_work, remaining_work: total_work, absolute_deadline }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn total_work(&self) -> Duration {
        self.total_work
    }

    pub fn remaining_work(&self) -> Duration {
        self.remaining_work
    }

    pub fn absolute_deadline(&self) -> TimePoint {
        self.absolute_deadline
    }

    pub fn is_complete(&self) -> bool {
        !self.remaining_work.is_positive()
    }

    /// Drain executed work, clamping the floating-point residue left by
    /// fractional frequency ratios to zero.
    pub fn consume_work(&mut self, amount: Duration) {
        self.remaining_work = (self.remaining_work - amount).clamped();
    }
}

/// Hyperperiod of a set of tasks, computed over nanosecond-quantized
/// periods.
pub fn hyperperiod(tasks: &[Task]) -> Duration {
    let lcm_ns = tasks
        .iter()
        .map(|task| (task.period().as_secs() * 1e9).round() as u64)
        .filter(|&ns| ns > 0)
        .fold(1u64, num::integer::lcm);

    Duration::secs(lcm_ns as f64 / 1e9)
}

// =============================================================================

#[test]
fn job_consumes_and_clamps() {
    let mut job = Job::new(TaskId(0), Duration::secs(3.0), TimePoint::secs(10.0));

    job.consume_work(Duration::secs(1.0));
    assert_eq!(job.remaining_work(), Duration::secs(2.0));
    assert!(!job.is_complete());

    // Overshoot by a rounding residue: clamp, never negative.
    job.consume_work(Duration::secs(2.0 + 1e-12));
    assert_eq!(job.remaining_work(), Duration::ZERO);
    assert!(job.is_complete());
    assert_eq!(job.total_work(), Duration::secs(3.0));
}

#[test]
fn wcet_scales_with_performance() {
    let task = Task::new(TaskId(0), Duration::secs(10.0), Duration::secs(10.0), Duration::secs(3.0));
    let little = ProcessorType::new(ProcessorTypeId(1), "little", 0.5, Duration::ZERO);

    assert_eq!(task.utilization(), 0.3);
    assert_eq!(task.wcet_on(&little, 1.0), Duration::secs(6.0));
}

#[test]
fn hyperperiod_is_lcm_of_periods() {
    let tasks = [
        Task::new(TaskId(0), Duration::secs(0.004), Duration::secs(0.004), Duration::secs(0.001)),
        Task::new(TaskId(1), Duration::secs(0.010), Duration::secs(0.010), Duration::secs(0.002)),
    ];

    assert_eq!(hyperperiod(&tasks), Duration::secs(0.020));
}
