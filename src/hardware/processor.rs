use crate::prelude::*;

/// Power/activity state of a processor.
///
/// `Change` covers DPM wake transitions: the core has left a sleep state but
/// is not yet usable until its wake latency elapses.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq)]
pub enum ProcessorState {
    Sleep,
    Idle,
    Running,
    Change,
}

impl ProcessorState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sleep => "sleep",
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Change => "change",
        }
    }
}

/// One core: a member of a clock domain and a power domain, of a given type.
///
/// Holds at most one currently executing task; the scheduler maps the task
/// back to its server.
#[derive(Clone)]
#[derive(Debug)]
pub struct Processor {
    id: ProcessorId,
    proc_type: ProcessorTypeId,
    clock_domain: ClockDomainId,
    power_domain: PowerDomainId,
    state: ProcessorState,
    task: Option<TaskId>,
    requested_cstate: u32,
}

impl Processor {
    pub(crate) fn new(
        id: ProcessorId,
        proc_type: ProcessorTypeId,
        clock_domain: ClockDomainId,
        power_domain: PowerDomainId,
    ) -> Self {
        Self {
            id,
            proc_type,
            clock_domain,
            power_domain,
            state: ProcessorState::Idle,
            task: None,
            requested_cstate: 0,
        }
    }

    pub fn id(&self) -> ProcessorId {
        self.id
    }

    pub fn proc_type(&self) -> ProcessorTypeId {
        self.proc_type
    }

    pub fn clock_domain(&self) -> ClockDomainId {
        self.clock_domain
    }

    pub fn power_domain(&self) -> PowerDomainId {
        self.power_domain
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    /// True for the states that count toward EDF capacity.
    pub fn is_active(&self) -> bool {
        matches!(self.state, ProcessorState::Idle | ProcessorState::Running)
    }

    pub fn task(&self) -> Option<TaskId> {
        self.task
    }

    pub fn has_task(&self) -> bool {
        self.task.is_some()
    }

    pub fn requested_cstate(&self) -> u32 {
        self.requested_cstate
    }

    /// Assign a task for execution. The processor must be usable and free.
    pub(crate) fn assign(&mut self, task: TaskId) {
        debug_assert_eq!(self.state, ProcessorState::Idle);
        debug_assert!(self.task.is_none());

        self.task = Some(task);
        self.state = ProcessorState::Running;
    }

    /// Remove the executing task, returning the core to `Idle`.
    pub(crate) fn clear_task(&mut self) {
        debug_assert_eq!(self.state, ProcessorState::Running);

        self.task = None;
        self.state = ProcessorState::Idle;
    }

    /// Request a sleep level; the core must be idle. Level 0 is a wake
    /// request handled by the DPM path instead.
    pub(crate) fn request_cstate(&mut self, level: u32) {
        debug_assert!(level > 0);
        debug_assert_eq!(self.state, ProcessorState::Idle);

        self.requested_cstate = level;
        self.state = ProcessorState::Sleep;
    }

    /// Begin waking up; the core becomes usable once the wake latency
    /// elapses and [`finish_wake`](Self::finish_wake) runs.
    pub(crate) fn begin_wake(&mut self) {
        debug_assert_eq!(self.state, ProcessorState::Sleep);

        self.requested_cstate = 0;
        self.state = ProcessorState::Change;
    }

    pub(crate) fn finish_wake(&mut self) {
        debug_assert_eq!(self.state, ProcessorState::Change);

        self.state = ProcessorState::Idle;
    }
}

// =============================================================================

#[test]
fn lifecycle() {
    let mut proc = Processor::new(
        ProcessorId(0), ProcessorTypeId(0), ClockDomainId(0), PowerDomainId(0),
    );
    assert_eq!(proc.state(), ProcessorState::Idle);
    assert!(proc.is_active());

    proc.assign(TaskId(3));
    assert_eq!(proc.state(), ProcessorState::Running);
    assert_eq!(proc.task(), Some(TaskId(3)));

    proc.clear_task();
    assert_eq!(proc.state(), ProcessorState::Idle);
    assert!(!proc.has_task());

    proc.request_cstate(1);
    assert_eq!(proc.state(), ProcessorState::Sleep);
    assert_eq!(proc.requested_cstate(), 1);
    assert!(!proc.is_active());

    proc.begin_wake();
    assert_eq!(proc.state(), ProcessorState::Change);
    proc.finish_wake();
    assert_eq!(proc.state(), ProcessorState::Idle);
}
