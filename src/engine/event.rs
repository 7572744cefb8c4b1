use crate::prelude::*;

/// Dispatch priorities at equal timestamps; lower values run first.
///
/// The completion-before-arrival rule matters: a job finishing at the same
/// instant another arrives frees its processor first, so the arrival sees
/// the freed core. Timers run last so reactive hooks observe a stabilized
/// bucket.
pub mod priority {
    pub const JOB_COMPLETION: i32 = 0;
    pub const DEADLINE_MISS: i32 = 10;
    pub const PROCESSOR_AVAILABLE: i32 = 20;
    pub const JOB_ARRIVAL: i32 = 30;
    pub const TIMER_DEFAULT: i32 = 40;
}

/// Total order over the event timeline: time, then priority, then a
/// monotone sequence number that keeps insertion order stable within a
/// (time, priority) bucket.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub time: TimePoint,
    pub priority: i32,
    pub sequence: u64,
}

/// Identifies a server across clusters: the cluster index plus the
/// scheduler-local server index.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq, Hash)]
pub struct ServerRef {
    pub cluster: ClusterId,
    pub server: ServerId,
}

/// Handle of a pending timer, valid until the timer fires or is cancelled.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) u64);

/// Handle of a registered deferred callback.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq, Hash)]
pub struct DeferredId(pub(crate) u64);

/// Everything that can sit on the timeline.
#[derive(Clone, Copy)]
#[derive(Debug)]
pub enum Event {
    JobArrival { task: TaskId, duration: Duration },
    JobFinished { processor: ProcessorId },
    BudgetExhausted { server: ServerRef },
    ServerInactive { server: ServerRef },
    TimerFired { id: TimerId },
    DeferredInvoke { id: DeferredId },
}

/// Payload of timers and deferred callbacks.
///
/// Reactions are plain values dispatched exhaustively by the simulation
/// driver rather than type-erased callbacks, which keeps the call graph
/// visible and the run reproducible.
#[derive(Clone, Copy)]
#[derive(Debug)]
pub enum Action {
    /// Re-run the dispatch decision of one cluster's scheduler.
    Resched(ClusterId),
    /// Check a server for a deadline miss at its virtual deadline.
    DeadlineCheck(ServerRef),
    /// Apply the pending DVFS/DPM target of a clock domain.
    ApplyDvfsTarget(ClockDomainId),
    /// A clock domain's frequency transition delay elapsed.
    TransitionComplete(ClockDomainId),
    /// Complete a DPM wake transition.
    WakeProcessor(ProcessorId),
}

// =============================================================================

#[test]
fn keys_order_by_time_priority_sequence() {
    let key = |t: f64, p: i32, s: u64| EventKey { time: TimePoint::secs(t), priority: p, sequence: s };

    assert!(key(1.0, 0, 0) < key(2.0, 0, 0));
    assert!(key(1.0, -100, 0) < key(1.0, 100, 0));
    assert!(key(1.0, 0, 0) < key(1.0, 0, 1));
    assert_eq!(key(1.0, 0, 0), key(1.0, 0, 0));

    let mut keys = vec![
        key(2.0, 0, 0),
        key(1.0, 100, 0),
        key(1.0, -100, 1),
        key(1.0, -100, 0),
        key(3.0, -500, 0),
    ];
    keys.sort();

    assert_eq!(keys[0], key(1.0, -100, 0));
    assert_eq!(keys[1], key(1.0, -100, 1));
    assert_eq!(keys[2], key(1.0, 100, 0));
    assert_eq!(keys[3], key(2.0, 0, 0));
    assert_eq!(keys[4], key(3.0, -500, 0));
}

#[test]
fn priority_ladder() {
    use priority::*;

    assert!(JOB_COMPLETION < DEADLINE_MISS);
    assert!(DEADLINE_MISS < PROCESSOR_AVAILABLE);
    assert!(PROCESSOR_AVAILABLE < JOB_ARRIVAL);
    assert!(JOB_ARRIVAL < TIMER_DEFAULT);
}
