//! Event-driven simulation core: the priority-ordered timeline, timers,
//! deferred callbacks and the trace sink.

pub mod prelude {
    pub use super::event::{priority, Action, Event, EventKey, ServerRef, TimerId, DeferredId};
    pub use super::trace::{FieldValue, TraceRecord, TraceWriter};
    pub use super::{Dispatch, Engine};
}

pub mod event;
pub mod trace;

use crate::prelude::*;

use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Copy)]
#[derive(Debug)]
enum TimerSlot {
    Pending { key: EventKey, action: Action },
    Done,
}

/// What [`Engine::step`] hands to the driver: either a plain event or the
/// payload of a timer/deferred callback that just came due.
#[derive(Debug)]
pub enum Dispatch {
    Event(Event),
    Action(Action),
}

/// The event loop.
///
/// Owns a `BTreeMap` timeline keyed by [`EventKey`]; since keys carry a
/// unique sequence number they double as cancellation handles, giving
/// O(log n) insertion and removal. The time cursor never decreases and the
/// sequence counter is strictly increasing, so for a given input the event
/// order is byte-reproducible.
#[derive(Default)]
pub struct Engine {
    queue: BTreeMap<EventKey, Event>,
    next_sequence: u64,
    now: TimePoint,
    current_priority: i32,
    timers: HashMap<u64, TimerSlot>,
    deferred: HashMap<u64, Action>,
    writer: Option<Box<dyn TraceWriter>>,
    arrival_handler_set: bool,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> TimePoint {
        self.now
    }

    /// Timestamp of the next pending event, if any.
    pub fn next_time(&self) -> Option<TimePoint> {
        self.queue.first_key_value().map(|(key, _)| key.time)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.queue.is_empty()
    }

    fn next_key(&mut self, time: TimePoint, priority: i32) -> EventKey {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        EventKey { time, priority, sequence }
    }

    /// Insert an event on the timeline. The returned key is its
    /// cancellation handle.
    pub fn post(&mut self, time: TimePoint, priority: i32, event: Event) -> EventKey {
        debug_assert!(time >= self.now, "posting into the past");

        let key = self.next_key(time, priority);
        self.queue.insert(key, event);
        key
    }

    /// Remove a previously posted event. Returns false when the event
    /// already ran or was cancelled.
    pub fn cancel(&mut self, key: EventKey) -> bool {
        self.queue.remove(&key).is_some()
    }

    /// Schedule the release of a job at an absolute time.
    pub fn schedule_job_arrival(&mut self, task: TaskId, arrival: TimePoint, duration: Duration) {
        self.post(arrival, priority::JOB_ARRIVAL, Event::JobArrival { task, duration });
    }

    /// Arm a timer. The action is handed back by [`step`](Self::step) when
    /// the timer fires.
    pub fn add_timer(&mut self, time: TimePoint, priority: i32, action: Action) -> TimerId {
        debug_assert!(time >= self.now, "arming a timer in the past");

        // The timer id is its event's own sequence number.
        let key = self.next_key(time, priority);
        let id = TimerId(key.sequence);
        self.queue.insert(key, Event::TimerFired { id });
        self.timers.insert(key.sequence, TimerSlot::Pending { key, action });
        id
    }

    /// Cancel a timer. Cancelling one that already fired (or was cancelled)
    /// is a no-op; cancelling a never-registered id is an error.
    pub fn cancel_timer(&mut self, id: TimerId) -> SimResult<()> {
        match self.timers.get_mut(&id.0) {
            Some(slot) => match *slot {
                TimerSlot::Pending { key, .. } => {
                    *slot = TimerSlot::Done;
                    self.queue.remove(&key);
                    Ok(())
                }
                TimerSlot::Done => Ok(()),
            },
            None => Err(SimulationError::invalid_state(format!(
                "cancelling unknown timer {}", id.0
            ))),
        }
    }

    pub fn timer_pending(&self, id: TimerId) -> bool {
        matches!(self.timers.get(&id.0), Some(TimerSlot::Pending { .. }))
    }

    /// Run an action at the current time once every event already queued in
    /// the current (time, priority) bucket has been processed. This is the
    /// hook schedulers use to batch reactions to clusters of arrivals.
    pub fn defer(&mut self, action: Action) -> DeferredId {
        let key = self.next_key(self.now, self.current_priority);
        let id = DeferredId(key.sequence);
        self.queue.insert(key, Event::DeferredInvoke { id });
        self.deferred.insert(key.sequence, action);
        id
    }

    /// Pop and resolve the lowest-keyed entry, advancing the time cursor.
    pub fn step(&mut self) -> Option<Dispatch> {
        let (key, event) = self.queue.pop_first()?;
        debug_assert!(key.time >= self.now, "time cursor would decrease");

        self.now = key.time;
        self.current_priority = key.priority;

        match event {
            Event::TimerFired { id } => {
                let slot = self.timers.get_mut(&id.0).expect("fired timer has a slot");
                let TimerSlot::Pending { action, .. } =
                    std::mem::replace(slot, TimerSlot::Done)
                else {
                    unreachable!("cancelled timers are removed from the queue");
                };
                Some(Dispatch::Action(action))
            }
            Event::DeferredInvoke { id } => {
                let action = self.deferred.remove(&id.0).expect("deferred slot exists");
                Some(Dispatch::Action(action))
            }
            other => Some(Dispatch::Event(other)),
        }
    }

    pub fn set_trace_writer(&mut self, writer: Box<dyn TraceWriter>) {
        self.writer = Some(writer);
    }

    /// Emit one trace record at the current time. The closure fills in the
    /// type and fields; `begin`/`end` bracketing is handled here.
    pub fn trace(&mut self, fill: impl FnOnce(&mut dyn TraceWriter)) {
        if let Some(writer) = self.writer.as_mut() {
            writer.begin(self.now);
            fill(writer.as_mut());
            writer.end();
        }
    }

    /// Record that the job-arrival handler has been installed; a second
    /// installation fails.
    pub fn mark_job_arrival_handler(&mut self) -> SimResult<()> {
        if self.arrival_handler_set {
            return Err(SimulationError::HandlerAlreadySet);
        }
        self.arrival_handler_set = true;
        Ok(())
    }
}

// =============================================================================

#[test]
fn steps_in_key_order_and_cursor_advances() {
    let mut engine = Engine::new();
    engine.schedule_job_arrival(TaskId(1), TimePoint::secs(2.0), Duration::secs(1.0));
    engine.schedule_job_arrival(TaskId(0), TimePoint::secs(1.0), Duration::secs(1.0));
    engine.post(
        TimePoint::secs(2.0),
        priority::JOB_COMPLETION,
        Event::JobFinished { processor: ProcessorId(0) },
    );

    // t=1 arrival first.
    match engine.step() {
        Some(Dispatch::Event(Event::JobArrival { task, .. })) => assert_eq!(task, TaskId(0)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(engine.now(), TimePoint::secs(1.0));

    // At t=2 the completion outranks the arrival.
    assert!(matches!(
        engine.step(),
        Some(Dispatch::Event(Event::JobFinished { .. }))
    ));
    assert!(matches!(
        engine.step(),
        Some(Dispatch::Event(Event::JobArrival { task: TaskId(1), .. }))
    ));
    assert_eq!(engine.now(), TimePoint::secs(2.0));
    assert!(engine.step().is_none());
}

#[test]
fn timer_cancellation_semantics() {
    let mut engine = Engine::new();
    let id = engine.add_timer(
        TimePoint::secs(1.0),
        priority::TIMER_DEFAULT,
        Action::Resched(ClusterId(0)),
    );
    assert!(engine.timer_pending(id));

    // Cancel removes the event from the timeline.
    engine.cancel_timer(id).unwrap();
    assert!(!engine.timer_pending(id));
    assert!(engine.step().is_none());

    // Cancelling again is a no-op.
    engine.cancel_timer(id).unwrap();

    // A never-registered id is an error.
    assert!(matches!(
        engine.cancel_timer(TimerId(999)),
        Err(SimulationError::InvalidState(_))
    ));
}

#[test]
fn fired_timer_hands_back_its_action() {
    let mut engine = Engine::new();
    let id = engine.add_timer(
        TimePoint::secs(3.0),
        priority::TIMER_DEFAULT,
        Action::ApplyDvfsTarget(ClockDomainId(7)),
    );

    match engine.step() {
        Some(Dispatch::Action(Action::ApplyDvfsTarget(domain))) => {
            assert_eq!(domain, ClockDomainId(7));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(engine.now(), TimePoint::secs(3.0));

    // Cancelling after firing is a no-op.
    engine.cancel_timer(id).unwrap();
}

#[test]
fn deferred_runs_after_current_bucket() {
    let mut engine = Engine::new();
    engine.schedule_job_arrival(TaskId(0), TimePoint::secs(1.0), Duration::secs(1.0));
    engine.schedule_job_arrival(TaskId(1), TimePoint::secs(1.0), Duration::secs(1.0));

    assert!(matches!(
        engine.step(),
        Some(Dispatch::Event(Event::JobArrival { task: TaskId(0), .. }))
    ));

    // Deferred from within the bucket: runs after the second arrival.
    engine.defer(Action::Resched(ClusterId(0)));

    assert!(matches!(
        engine.step(),
        Some(Dispatch::Event(Event::JobArrival { task: TaskId(1), .. }))
    ));
    assert!(matches!(
        engine.step(),
        Some(Dispatch::Action(Action::Resched(ClusterId(0))))
    ));
    assert_eq!(engine.now(), TimePoint::secs(1.0));
}

#[test]
fn job_arrival_handler_installs_once() {
    let mut engine = Engine::new();

    engine.mark_job_arrival_handler().unwrap();
    assert!(matches!(
        engine.mark_job_arrival_handler(),
        Err(SimulationError::HandlerAlreadySet)
    ));
}
