//! Global EDF over CBS servers, per cluster.
//!
//! The scheduler owns its servers and a fixed processor list. Every state
//! change funnels into [`EdfScheduler::resched`], a single idempotent
//! dispatch decision; anything that fires while a resched is in flight must
//! go through `Engine::defer` instead.

use crate::prelude::*;

use std::collections::HashMap;

/// Schedulability condition applied when admitting a new server.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq)]
#[derive(clap::ValueEnum)]
pub enum AdmissionTest {
    /// `U_total + u <= m`. Necessary condition, default.
    #[value(name = "capacity")]
    CapacityBound,
    /// `U_total + u <= m - (m-1) * max(u_max, u)`
    /// (Goossens, Funk, Baruah 2003). Sufficient for global EDF with
    /// implicit deadlines.
    #[value(name = "gfb")]
    GFB,
}

/// Reaction to a job missing its server deadline.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq)]
#[derive(clap::ValueEnum)]
pub enum DeadlineMissPolicy {
    /// Trace the miss and keep going.
    #[value(name = "continue")]
    Continue,
    /// Abort the offending job, keep the task.
    #[value(name = "abort-job")]
    AbortJob,
    /// Detach the whole task from the scheduler.
    #[value(name = "abort-task")]
    AbortTask,
    /// Halt the simulation.
    #[value(name = "stop")]
    StopSimulation,
}

/// What a scheduler operation changed, for the driver to react on.
#[derive(Debug, Default)]
pub struct SchedOutcome {
    /// The contending bandwidth changed; DVFS policies should recompute.
    pub utilization_changed: bool,
    /// A processor was left without work.
    pub idled: Option<ProcessorId>,
    /// DeadlineMissPolicy::StopSimulation fired.
    pub stop: bool,
}

pub struct EdfScheduler {
    cluster: ClusterId,
    processors: Vec<ProcessorId>,
    servers: Vec<CbsServer>,
    by_task: HashMap<TaskId, ServerId>,
    admission: AdmissionTest,
    deadline_miss: DeadlineMissPolicy,
    reclamation: Box<dyn ReclamationPolicy>,
    total_utilization: f64,
    resched_pending: bool,
    in_resched: bool,
}

impl EdfScheduler {
    pub fn new(
        cluster: ClusterId,
        processors: Vec<ProcessorId>,
        admission: AdmissionTest,
        deadline_miss: DeadlineMissPolicy,
        reclamation: Box<dyn ReclamationPolicy>,
    ) -> Self {
        Self {
            cluster,
            processors,
            servers: Vec::new(),
            by_task: HashMap::new(),
            admission,
            deadline_miss,
            reclamation,
            total_utilization: 0.0,
            resched_pending: false,
            in_resched: false,
        }
    }

    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    pub fn processors(&self) -> &[ProcessorId] {
        &self.processors
    }

    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    pub fn owns_processor(&self, proc: ProcessorId) -> bool {
        self.processors.contains(&proc)
    }

    pub fn servers(&self) -> &[CbsServer] {
        &self.servers
    }

    pub fn server(&self, id: ServerId) -> &CbsServer {
        &self.servers[id.index()]
    }

    pub fn server_for_task(&self, task: TaskId) -> Option<ServerId> {
        self.by_task.get(&task).copied()
    }

    /// Sum of utilizations of all registered (non-detached) servers.
    pub fn total_utilization(&self) -> f64 {
        self.total_utilization
    }

    /// Sum of utilizations of currently contending servers.
    pub fn active_utilization(&self) -> f64 {
        self.reclamation.active_utilization()
    }

    /// Largest per-server utilization.
    pub fn max_utilization(&self) -> f64 {
        let max = self.servers
            .iter()
            .filter(|s| !s.is_detached())
            .map(|s| ordered_float::OrderedFloat(s.utilization()))
            .max();

        match max {
            Some(max) => *max,
            None => 0f64,
        }
    }

    pub fn set_expected_arrivals(&mut self, task: TaskId, count: usize) {
        if let Some(&sid) = self.by_task.get(&task) {
            self.servers[sid.index()].set_expected_arrivals(count);
        }
    }

    /// Admission test for a prospective server.
    pub fn can_admit(&self, budget: Duration, period: Duration) -> bool {
        let u = budget / period;
        let m = self.processor_count() as f64;

        let bound = match self.admission {
            AdmissionTest::CapacityBound => m,
            AdmissionTest::GFB => m - (m - 1.0) * self.max_utilization().max(u),
        };

        round_zero(self.total_utilization + u - bound) <= 0.0
    }

    fn available_capacity(&self) -> f64 {
        let m = self.processor_count() as f64;
        match self.admission {
            AdmissionTest::CapacityBound => m - self.total_utilization,
            AdmissionTest::GFB => {
                m - (m - 1.0) * self.max_utilization() - self.total_utilization
            }
        }
    }

    fn server_ref(&self, sid: ServerId) -> ServerRef {
        ServerRef { cluster: self.cluster, server: sid }
    }

    /// Ask for a resched after the current bucket; coalesces repeated
    /// requests into a single deferred invocation.
    fn request_resched(&mut self, engine: &mut Engine) {
        if !self.resched_pending {
            self.resched_pending = true;
            engine.defer(Action::Resched(self.cluster));
        }
    }

    /// Charge execution to every running server up to `now`.
    ///
    /// Must run before any state inspection so budgets, remaining work and
    /// virtual times reflect the current instant; repeated calls at the
    /// same timestamp are no-ops.
    fn charge_all(&mut self, now: TimePoint, platform: &Platform) {
        for i in 0..self.servers.len() {
            let server = &self.servers[i];
            if server.state() != ServerState::Running {
                self.servers[i].set_last_update(now);
                continue;
            }

            let wall = now - server.last_update();
            if !wall.is_positive() {
                self.servers[i].set_last_update(now);
                continue;
            }

            let proc = server.running_on().expect("running server has a processor");
            let speed = platform.speed_factor(proc);
            let exec = wall * speed;
            let drained = exec * self.reclamation.budget_drain_factor(server);
            let vt = self.reclamation.compute_virtual_time(server, server.virtual_time(), exec);

            let server = &mut self.servers[i];
            if let Some(job) = server.current_job_mut() {
                job.consume_work(exec);
            }
            server.consume_budget(drained);
            server.set_virtual_time(vt);
            server.set_last_update(now);
        }
    }

    /// Arm the miss check for the server's current job, at that job's
    /// absolute deadline. Server-deadline postponements do not move it:
    /// the job's own deadline is what a miss is measured against.
    fn post_deadline_check(&mut self, engine: &mut Engine, sid: ServerId) {
        let server_ref = self.server_ref(sid);
        let server = &mut self.servers[sid.index()];

        if let Some(id) = server.deadline_timer() {
            let _ = engine.cancel_timer(id);
        }
        let Some(job) = server.current_job() else {
            server.set_deadline_timer(None);
            return;
        };

        // A queued job may already be past due when it becomes current.
        let at = job.absolute_deadline().max(engine.now());
        let id = engine.add_timer(at, priority::DEADLINE_MISS, Action::DeadlineCheck(server_ref));
        server.set_deadline_timer(Some(id));
    }

    fn cancel_deadline_check(&mut self, engine: &mut Engine, sid: ServerId) {
        if let Some(id) = self.servers[sid.index()].deadline_timer() {
            let _ = engine.cancel_timer(id);
            self.servers[sid.index()].set_deadline_timer(None);
        }
    }

    /// Find or admit the server of a task, enqueue the job and activate the
    /// server if needed.
    pub fn on_job_arrival(
        &mut self,
        engine: &mut Engine,
        platform: &Platform,
        task_id: TaskId,
        duration: Duration,
    ) -> SimResult<SchedOutcome> {
        let now = engine.now();
        self.charge_all(now, platform);

        let task = platform.task(task_id);
        let period = task.period();
        let relative_deadline = task.relative_deadline();

        let sid = match self.by_task.get(&task_id) {
            Some(&sid) => sid,
            None => {
                let budget = task.wcet();
                let u = budget / period;
                if !self.can_admit(budget, period) {
                    return Err(SimulationError::Admission {
                        requested: u,
                        available: self.available_capacity(),
                    });
                }

                let sid = ServerId(self.servers.len());
                self.servers.push(CbsServer::new(sid, task_id, budget, period));
                self.by_task.insert(task_id, sid);
                self.total_utilization += u;
                sid
            }
        };

        let absolute_deadline = now + relative_deadline;
        engine.trace(|w| {
            w.event_type("job_arrival");
            w.field("tid", task_id.index().into());
            w.field("duration", duration.as_secs().into());
            w.field("deadline", absolute_deadline.as_secs().into());
        });

        let mut outcome = SchedOutcome::default();
        let server = &mut self.servers[sid.index()];
        server.push_job(Job::new(task_id, duration, absolute_deadline));

        match server.state() {
            ServerState::Inactive => {
                // CBS activation rule: replenish and move the virtual
                // deadline forward when the leftover budget is spent or the
                // old deadline is stale; otherwise keep both.
                if !server.remaining_budget().is_positive() || server.deadline() <= now {
                    let base = server.deadline().max(now);
                    server.set_deadline(base + period);
                    server.replenish();
                }
                server.set_virtual_time(server.virtual_time().max(now));
                server.set_state(ServerState::Ready);
                server.set_last_update(now);

                let (tid, u, d) = (task_id, server.utilization(), server.deadline());
                self.reclamation.on_server_state_change(
                    &self.servers[sid.index()],
                    ServerStateChange::Activated,
                );
                engine.trace(|w| {
                    w.event_type("serv_ready");
                    w.field("sid", sid.index().into());
                    w.field("tid", tid.index().into());
                    w.field("utilization", u.into());
                    w.field("deadline", d.as_secs().into());
                });
                outcome.utilization_changed = true;
            }
            ServerState::NonContending => {
                if let Some(key) = server.inactive_event() {
                    engine.cancel(key);
                    server.set_inactive_event(None);
                }
                server.set_state(ServerState::Ready);
                self.reclamation.on_server_state_change(
                    &self.servers[sid.index()],
                    ServerStateChange::Resumed,
                );
            }
            ServerState::Ready | ServerState::Running => {
                // Queued behind the current job.
            }
        }

        if self.servers[sid.index()].queued_jobs() == 1 {
            // The new job is the current one: arm its miss check.
            self.post_deadline_check(engine, sid);
        }

        self.request_resched(engine);
        Ok(outcome)
    }

    /// The dispatch decision. Selects the m earliest-deadline contending
    /// servers, preempts the rest, assigns freed processors in deadline
    /// order and (re)posts each running server's completion horizon.
    pub fn resched(&mut self, engine: &mut Engine, platform: &mut Platform) {
        debug_assert!(!self.in_resched, "resched re-entered; callers must defer()");
        self.in_resched = true;
        self.resched_pending = false;

        let now = engine.now();
        self.charge_all(now, platform);

        // Completion horizons are recomputed wholesale below; drop the old
        // postings so frequency or bandwidth changes cannot leave stale
        // events behind.
        for server in &mut self.servers {
            if let Some(key) = server.pending_completion() {
                engine.cancel(key);
                server.set_pending_completion(None);
            }
        }

        let m = self.processors
            .iter()
            .filter(|&&p| platform.processor(p).is_active())
            .count();

        // The m earliest virtual deadlines win; ties break by server id.
        let mut candidates: Vec<ServerId> = self.servers
            .iter()
            .filter(|s| s.is_contending() && s.current_job().is_some())
            .map(|s| s.id())
            .collect();
        candidates.sort_by_key(|&sid| {
            let s = &self.servers[sid.index()];
            (s.deadline(), sid)
        });
        candidates.truncate(m);

        // Preempt running servers that fell out of the selection.
        let procs = self.processors.clone();
        for &proc in &procs {
            if platform.processor(proc).state() != ProcessorState::Running {
                continue;
            }
            let task = platform.processor(proc).task().expect("running processor has a task");
            let sid = self.by_task[&task];
            if candidates.contains(&sid) {
                continue;
            }

            let server = &mut self.servers[sid.index()];
            server.set_state(ServerState::Ready);
            server.set_running_on(None);
            platform.processor_mut(proc).clear_task();
            self.reclamation.on_server_state_change(
                &self.servers[sid.index()],
                ServerStateChange::Preempted,
            );
            engine.trace(|w| {
                w.event_type("preempt");
                w.field("sid", sid.index().into());
                w.field("tid", task.index().into());
                w.field("cpu", proc.index().into());
            });
        }

        // Assign freed processors to the selected servers in deadline order.
        let mut free: Vec<ProcessorId> = self.processors
            .iter()
            .copied()
            .filter(|&p| platform.processor(p).state() == ProcessorState::Idle)
            .collect();
        free.reverse(); // pop() hands them out in construction order

        for &sid in &candidates {
            if self.servers[sid.index()].state() != ServerState::Running {
                let Some(proc) = free.pop() else {
                    debug_assert!(false, "selection larger than free processors");
                    continue;
                };
                let task = self.servers[sid.index()].task();

                let server = &mut self.servers[sid.index()];
                server.set_state(ServerState::Running);
                server.set_running_on(Some(proc));
                server.set_last_update(now);
                platform.processor_mut(proc).assign(task);
                self.reclamation.on_server_state_change(
                    &self.servers[sid.index()],
                    ServerStateChange::Dispatched,
                );
                engine.trace(|w| {
                    w.event_type("dispatch");
                    w.field("sid", sid.index().into());
                    w.field("tid", task.index().into());
                    w.field("cpu", proc.index().into());
                });
            }

            self.post_completion(engine, platform, sid);
        }

        self.in_resched = false;
    }

    /// Post the next completion event of a running server: job finish or
    /// budget exhaustion, whichever wall-clock horizon comes first.
    fn post_completion(&mut self, engine: &mut Engine, platform: &Platform, sid: ServerId) {
        let server = &self.servers[sid.index()];
        debug_assert_eq!(server.state(), ServerState::Running);

        let proc = server.running_on().expect("running server has a processor");
        let speed = platform.speed_factor(proc);
        let drain = self.reclamation.budget_drain_factor(server);
        let job = server.current_job().expect("running server has a job");

        let work_wall = job.remaining_work() / speed;
        let budget_wall = server.remaining_budget() / (speed * drain);

        let now = engine.now();
        // A finish tying with the exhaustion counts as a finish.
        let (horizon, event) = if round_zero(work_wall.as_secs() - budget_wall.as_secs()) <= 0.0 {
            (work_wall, Event::JobFinished { processor: proc })
        } else {
            (budget_wall, Event::BudgetExhausted { server: self.server_ref(sid) })
        };

        let key = engine.post(now + horizon, priority::JOB_COMPLETION, event);
        self.servers[sid.index()].set_pending_completion(Some(key));
    }

    /// A running server's current job ran to completion.
    pub fn on_job_finished(
        &mut self,
        engine: &mut Engine,
        platform: &mut Platform,
        proc: ProcessorId,
    ) -> SchedOutcome {
        let now = engine.now();
        self.charge_all(now, platform);

        let task = platform.processor(proc).task().expect("finished processor has a task");
        let sid = self.by_task[&task];
        let mut outcome = SchedOutcome::default();

        {
            let server = &mut self.servers[sid.index()];
            server.set_pending_completion(None);

            let job = server.pop_job().expect("finished server has a job");
            debug_assert!(job.is_complete());
            server.record_completion();
        }

        engine.trace(|w| {
            w.event_type("job_finished");
            w.field("tid", task.index().into());
            w.field("sid", sid.index().into());
            w.field("cpu", proc.index().into());
        });

        if self.servers[sid.index()].current_job().is_none() {
            // Queue drained: leave the processor and the contending set.
            let residual = self.servers[sid.index()].remaining_budget();
            self.servers[sid.index()].set_running_on(None);
            platform.processor_mut(proc).clear_task();
            outcome.idled = Some(proc);

            self.cancel_deadline_check(engine, sid);

            let noncontending =
                self.reclamation.on_early_completion(&self.servers[sid.index()], residual);
            if noncontending && self.servers[sid.index()].deadline() > now {
                let server_ref = self.server_ref(sid);
                let server = &mut self.servers[sid.index()];
                server.set_state(ServerState::NonContending);
                let deadline = server.deadline();
                self.reclamation.on_server_state_change(
                    &self.servers[sid.index()],
                    ServerStateChange::NonContending,
                );
                let key = engine.post(
                    deadline,
                    priority::TIMER_DEFAULT,
                    Event::ServerInactive { server: server_ref },
                );
                self.servers[sid.index()].set_inactive_event(Some(key));
            } else {
                self.make_inactive(engine, sid, ServerStateChange::Completed);
                outcome.utilization_changed = true;
            }

            self.maybe_detach(sid);
        } else {
            // The server keeps its budget, deadline and processor and
            // serves the next queued job; the new horizon is posted by the
            // deferred resched.
            self.post_deadline_check(engine, sid);
        }

        self.request_resched(engine);
        outcome
    }

    fn make_inactive(&mut self, engine: &mut Engine, sid: ServerId, change: ServerStateChange) {
        let server = &mut self.servers[sid.index()];
        server.set_state(ServerState::Inactive);
        let (tid, u) = (server.task(), server.utilization());

        self.cancel_deadline_check(engine, sid);
        self.reclamation.on_server_state_change(&self.servers[sid.index()], change);
        engine.trace(|w| {
            w.event_type("serv_inactive");
            w.field("sid", sid.index().into());
            w.field("tid", tid.index().into());
            w.field("utilization", u.into());
        });
    }

    /// Release a server whose task has produced all its expected jobs.
    fn maybe_detach(&mut self, sid: ServerId) {
        let server = &self.servers[sid.index()];
        let Some(expected) = server.expected_arrivals() else { return };
        if server.completed_jobs() < expected || server.current_job().is_some() {
            return;
        }
        debug_assert!(!server.is_contending());

        let u = server.utilization();
        let task = server.task();
        if server.state() == ServerState::NonContending {
            self.reclamation.on_server_state_change(
                &self.servers[sid.index()],
                ServerStateChange::DeadlineReached,
            );
        }
        let server = &mut self.servers[sid.index()];
        server.set_state(ServerState::Inactive);
        server.mark_detached();
        self.total_utilization = (self.total_utilization - u).max(0.0);
        self.by_task.remove(&task);
    }

    /// A running server drained its budget before its job finished.
    pub fn on_budget_exhausted(
        &mut self,
        engine: &mut Engine,
        platform: &mut Platform,
        sid: ServerId,
    ) -> SchedOutcome {
        let now = engine.now();
        self.charge_all(now, platform);

        let server = &mut self.servers[sid.index()];
        debug_assert_eq!(server.state(), ServerState::Running);
        server.set_pending_completion(None);
        let tid = server.task();

        engine.trace(|w| {
            w.event_type("serv_budget_exhausted");
            w.field("sid", sid.index().into());
            w.field("tid", tid.index().into());
        });

        let grant = self.reclamation.on_budget_exhausted(&self.servers[sid.index()]);
        if grant.is_positive() {
            self.servers[sid.index()].grant_budget(grant);
        } else {
            // CBS postponement: push the virtual deadline one period out
            // and refill.
            let server = &mut self.servers[sid.index()];
            let period = server.period();
            server.set_deadline(server.deadline() + period);
            server.replenish();
            let deadline = server.deadline();

            engine.trace(|w| {
                w.event_type("serv_postpone");
                w.field("sid", sid.index().into());
                w.field("deadline", deadline.as_secs().into());
            });
        }

        self.request_resched(engine);
        SchedOutcome::default()
    }

    /// The deadline-miss check armed at the current job's absolute
    /// deadline.
    pub fn on_deadline_check(
        &mut self,
        engine: &mut Engine,
        platform: &mut Platform,
        sid: ServerId,
    ) -> SchedOutcome {
        self.servers[sid.index()].set_deadline_timer(None);

        let server = &self.servers[sid.index()];
        if !server.is_contending() || server.current_job().is_none() {
            return SchedOutcome::default();
        }
        let tid = server.task();

        engine.trace(|w| {
            w.event_type("deadline_miss");
            w.field("tid", tid.index().into());
            w.field("sid", sid.index().into());
        });

        match self.deadline_miss {
            DeadlineMissPolicy::Continue => SchedOutcome::default(),
            DeadlineMissPolicy::AbortJob => self.abort_jobs(engine, platform, sid, false),
            DeadlineMissPolicy::AbortTask => self.abort_jobs(engine, platform, sid, true),
            DeadlineMissPolicy::StopSimulation => {
                SchedOutcome { stop: true, ..SchedOutcome::default() }
            }
        }
    }

    /// Drop the current job (or all jobs and the server) after a miss.
    fn abort_jobs(
        &mut self,
        engine: &mut Engine,
        platform: &mut Platform,
        sid: ServerId,
        whole_task: bool,
    ) -> SchedOutcome {
        let now = engine.now();
        self.charge_all(now, platform);

        let mut outcome = SchedOutcome::default();
        let server = &mut self.servers[sid.index()];

        if whole_task {
            server.clear_jobs();
        } else {
            server.pop_job();
        }

        if server.current_job().is_none() {
            if let Some(proc) = server.running_on() {
                server.set_running_on(None);
                platform.processor_mut(proc).clear_task();
                outcome.idled = Some(proc);
            }
            if let Some(key) = server.pending_completion() {
                engine.cancel(key);
                server.set_pending_completion(None);
            }
            self.make_inactive(engine, sid, ServerStateChange::Completed);
            outcome.utilization_changed = true;

            if whole_task {
                let server = &mut self.servers[sid.index()];
                let (u, task) = (server.utilization(), server.task());
                server.mark_detached();
                self.total_utilization = (self.total_utilization - u).max(0.0);
                self.by_task.remove(&task);
            }
        } else {
            self.post_deadline_check(engine, sid);
        }

        self.request_resched(engine);
        outcome
    }

    /// A NonContending server reached its virtual deadline (GRUB).
    pub fn on_server_inactive(&mut self, engine: &mut Engine, sid: ServerId) -> SchedOutcome {
        let mut outcome = SchedOutcome::default();
        self.servers[sid.index()].set_inactive_event(None);

        if self.servers[sid.index()].state() == ServerState::NonContending {
            self.make_inactive(engine, sid, ServerStateChange::DeadlineReached);
            self.maybe_detach(sid);
            outcome.utilization_changed = true;
        }
        outcome
    }
}

// =============================================================================

#[cfg(test)]
fn test_scheduler(procs: usize, admission: AdmissionTest) -> EdfScheduler {
    EdfScheduler::new(
        ClusterId(0),
        (0..procs).map(ProcessorId).collect(),
        admission,
        DeadlineMissPolicy::Continue,
        Box::new(CbsPolicy::new()),
    )
}

#[test]
fn capacity_bound_admission() {
    let mut sched = test_scheduler(2, AdmissionTest::CapacityBound);

    assert!(sched.can_admit(Duration::secs(6.0), Duration::secs(10.0)));
    sched.total_utilization = 1.6;
    assert!(sched.can_admit(Duration::secs(4.0), Duration::secs(10.0)));
    assert!(!sched.can_admit(Duration::secs(5.0), Duration::secs(10.0)));
}

#[test]
fn gfb_admission_is_stricter() {
    let mut sched = test_scheduler(2, AdmissionTest::GFB);

    // Two servers with U = 0.6 fit: 1.2 <= 2 - 1 * 0.6.
    assert!(sched.can_admit(Duration::secs(6.0), Duration::secs(10.0)));
    sched.total_utilization = 1.2;
    sched.servers.push(CbsServer::new(
        ServerId(0), TaskId(0), Duration::secs(6.0), Duration::secs(10.0),
    ));

    // A third violates GFB: 1.8 > 2 - 1 * 0.6.
    assert!(!sched.can_admit(Duration::secs(6.0), Duration::secs(10.0)));
    // Yet a small one still fits: 1.2 + 0.1 <= 2 - 0.6.
    assert!(sched.can_admit(Duration::secs(1.0), Duration::secs(10.0)));
}

#[test]
fn max_utilization_over_servers() {
    let mut sched = test_scheduler(4, AdmissionTest::CapacityBound);
    assert_eq!(sched.max_utilization(), 0.0);

    sched.servers.push(CbsServer::new(
        ServerId(0), TaskId(0), Duration::secs(2.0), Duration::secs(10.0),
    ));
    sched.servers.push(CbsServer::new(
        ServerId(1), TaskId(1), Duration::secs(4.0), Duration::secs(10.0),
    ));

    assert_eq!(sched.max_utilization(), 0.4);
}
