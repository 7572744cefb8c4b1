//! The driver: owns the engine, the platform, the clusters and the
//! policies, and dispatches every popped event to the right subsystem.

pub mod prelude {
    pub use super::Simulation;
}

use crate::prelude::*;

use std::collections::HashMap;

/// A complete simulation: engine, platform, clusters, allocator, DVFS/DPM.
///
/// Strictly single-threaded: [`run`](Self::run) pops one event at a time
/// and every reaction completes synchronously before the next pop. Nothing
/// here is re-entered while an event is being dispatched; reactions that
/// need a stabilized bucket go through `Engine::defer`.
pub struct Simulation {
    engine: Engine,
    platform: Platform,
    clusters: Vec<Cluster>,
    router: Option<TaskRouter>,
    power: Option<DvfsDpm>,
    expected_arrivals: HashMap<TaskId, usize>,
    stopped: bool,
}

impl Simulation {
    pub fn new(platform: Platform) -> Self {
        debug_assert!(platform.is_finalized(), "finalize the platform before simulating");
        Self {
            engine: Engine::new(),
            platform,
            clusters: Vec::new(),
            router: None,
            power: None,
            expected_arrivals: HashMap::new(),
            stopped: false,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster_mut(&mut self, id: ClusterId) -> &mut Cluster {
        &mut self.clusters[id.index()]
    }

    /// Create a cluster over all processors of a clock domain.
    pub fn add_cluster(
        &mut self,
        domain: ClockDomainId,
        admission: AdmissionTest,
        deadline_miss: DeadlineMissPolicy,
        reclamation: Box<dyn ReclamationPolicy>,
        perf: f64,
    ) -> ClusterId {
        let id = ClusterId(self.clusters.len());
        let processors = self.platform.clock_domain(domain).processors().to_vec();
        let sched = EdfScheduler::new(id, processors, admission, deadline_miss, reclamation);
        self.clusters.push(Cluster::new(id, domain, sched, perf));
        id
    }

    /// Install the placement policy routing job arrivals. May only be done
    /// once per simulation.
    pub fn set_allocator(&mut self, policy: Box<dyn AllocatorPolicy>) -> SimResult<()> {
        self.engine.mark_job_arrival_handler()?;
        self.router = Some(TaskRouter::new(policy));
        Ok(())
    }

    pub fn set_power_policy(&mut self, power: DvfsDpm) {
        self.power = Some(power);
    }

    pub fn set_trace_writer(&mut self, writer: Box<dyn TraceWriter>) {
        self.engine.set_trace_writer(writer);
    }

    pub fn schedule_job_arrival(&mut self, task: TaskId, arrival: TimePoint, duration: Duration) {
        self.engine.schedule_job_arrival(task, arrival, duration);
    }

    /// Let the scheduler detach the task's server once this many jobs have
    /// completed, releasing its bandwidth.
    pub fn set_expected_arrivals(&mut self, task: TaskId, count: usize) {
        self.expected_arrivals.insert(task, count);
    }

    /// Run until the timeline is empty or a stop policy fires, then emit
    /// the closing trace record.
    pub fn run(&mut self) {
        while !self.stopped {
            let Some(dispatch) = self.engine.step() else { break };
            self.dispatch(dispatch);
            #[cfg(debug_assertions)]
            self.check_invariants();
        }

        self.finish();
    }

    /// Emit the closing `sim_finished` record; for callers that bound the
    /// run with [`run_until`](Self::run_until).
    pub fn finish(&mut self) {
        self.engine.trace(|w| {
            w.event_type("sim_finished");
        });
    }

    /// Process every event with a timestamp not after `until`.
    pub fn run_until(&mut self, until: TimePoint) {
        while !self.stopped {
            match self.engine.next_time() {
                Some(t) if t <= until => {
                    let Some(dispatch) = self.engine.step() else { break };
                    self.dispatch(dispatch);
                    #[cfg(debug_assertions)]
                    self.check_invariants();
                }
                _ => break,
            }
        }
    }

    fn cluster_of_processor(&self, proc: ProcessorId) -> Option<usize> {
        self.clusters.iter().position(|c| c.sched().owns_processor(proc))
    }

    fn dispatch(&mut self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Event(Event::JobArrival { task, duration }) => {
                let Some(router) = self.router.as_mut() else {
                    panic!("job arrived with no allocator installed");
                };
                let outcome = router.on_job_arrival(
                    &mut self.engine,
                    &self.platform,
                    &mut self.clusters,
                    task,
                    duration,
                );
                if let Some(cid) = outcome.cluster {
                    if let Some(&count) = self.expected_arrivals.get(&task) {
                        self.clusters[cid.index()].sched_mut().set_expected_arrivals(task, count);
                    }
                    if outcome.utilization_changed {
                        self.notify_power(cid.index());
                    }
                }
            }
            Dispatch::Event(Event::JobFinished { processor }) => {
                let idx = self.cluster_of_processor(processor)
                    .expect("completion on an unmanaged processor");
                let outcome = self.clusters[idx].sched_mut().on_job_finished(
                    &mut self.engine,
                    &mut self.platform,
                    processor,
                );
                self.react(idx, outcome);
            }
            Dispatch::Event(Event::BudgetExhausted { server }) => {
                let idx = server.cluster.index();
                let outcome = self.clusters[idx].sched_mut().on_budget_exhausted(
                    &mut self.engine,
                    &mut self.platform,
                    server.server,
                );
                self.react(idx, outcome);
            }
            Dispatch::Event(Event::ServerInactive { server }) => {
                let idx = server.cluster.index();
                let outcome = self.clusters[idx]
                    .sched_mut()
                    .on_server_inactive(&mut self.engine, server.server);
                self.react(idx, outcome);
            }
            Dispatch::Event(Event::TimerFired { .. })
            | Dispatch::Event(Event::DeferredInvoke { .. }) => {
                unreachable!("engine resolves timer and deferred events");
            }
            Dispatch::Action(Action::Resched(cluster)) => {
                self.clusters[cluster.index()]
                    .sched_mut()
                    .resched(&mut self.engine, &mut self.platform);
            }
            Dispatch::Action(Action::DeadlineCheck(server)) => {
                let idx = server.cluster.index();
                let outcome = self.clusters[idx].sched_mut().on_deadline_check(
                    &mut self.engine,
                    &mut self.platform,
                    server.server,
                );
                self.react(idx, outcome);
            }
            Dispatch::Action(Action::ApplyDvfsTarget(domain)) => {
                if let Some(power) = self.power.as_mut() {
                    power.on_cooldown_expired(&mut self.engine, &mut self.platform, domain);
                }
            }
            Dispatch::Action(Action::TransitionComplete(domain)) => {
                self.platform.clock_domain_mut(domain).set_transitioning(false);
                // Re-evaluate with the load the domain settled under.
                if let Some(idx) = self.clusters.iter().position(|c| c.domain() == domain) {
                    self.notify_power(idx);
                }
            }
            Dispatch::Action(Action::WakeProcessor(proc)) => {
                if self.platform.processor(proc).state() == ProcessorState::Change {
                    self.platform.processor_mut(proc).finish_wake();
                    self.engine.trace(|w| {
                        w.event_type("proc_state_change");
                        w.field("cpu", proc.index().into());
                        w.field("state", "idle".into());
                    });
                    if let Some(idx) = self.cluster_of_processor(proc) {
                        let cluster = self.clusters[idx].id();
                        self.engine.defer(Action::Resched(cluster));
                    }
                }
            }
        }
    }

    fn react(&mut self, cluster: usize, outcome: SchedOutcome) {
        if let Some(proc) = outcome.idled {
            if let Some(power) = self.power.as_mut() {
                power.on_processor_idle(&self.platform, proc);
            }
        }
        if outcome.utilization_changed {
            self.notify_power(cluster);
        }
        if outcome.stop {
            self.stopped = true;
        }
    }

    fn notify_power(&mut self, cluster: usize) {
        let Some(power) = self.power.as_mut() else { return };

        let domain = self.clusters[cluster].domain();
        let scale = utilization_scale(&self.platform, domain);
        let sched = self.clusters[cluster].sched();
        let load = SchedulerLoad {
            total_utilization: sched.total_utilization() * scale,
            active_utilization: sched.active_utilization() * scale,
            max_utilization: sched.max_utilization() * scale,
        };

        power.on_utilization_changed(
            &mut self.engine,
            &mut self.platform,
            self.clusters[cluster].id(),
            domain,
            load,
        );
    }

    /// Cross-component invariants, verified after every step in debug
    /// builds.
    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        for cluster in &self.clusters {
            let sched = cluster.sched();
            let m = sched.processor_count() as f64;

            debug_assert!(
                round_zero(sched.active_utilization() - sched.total_utilization()) <= 0.0,
                "active utilization exceeds total"
            );
            debug_assert!(
                round_zero(sched.total_utilization() - m) <= 0.0,
                "total utilization exceeds capacity"
            );

            for server in sched.servers() {
                let budget = server.remaining_budget().as_secs();
                debug_assert!(budget >= 0.0, "negative server budget");
                debug_assert!(
                    round_zero(budget - server.max_budget().as_secs()) <= 0.0,
                    "server budget above maximum"
                );
                if let Some(job) = server.current_job() {
                    let remaining = job.remaining_work().as_secs();
                    debug_assert!(remaining >= 0.0, "negative remaining work");
                    debug_assert!(
                        round_zero(remaining - job.total_work().as_secs()) <= 0.0,
                        "remaining work above total"
                    );
                }
                if server.state() == ServerState::Running {
                    let proc = server.running_on().expect("running server without processor");
                    debug_assert_eq!(
                        self.platform.processor(proc).task(),
                        Some(server.task()),
                        "processor/server assignment out of sync"
                    );
                }
            }
        }
    }
}

// =============================================================================
// Boundary scenarios.

#[cfg(test)]
use crate::output::writers::MemoryTraceWriter;
#[cfg(test)]
use std::cell::RefCell;
#[cfg(test)]
use std::rc::Rc;

/// One cluster of `nb_procs` identical unit-performance cores.
#[cfg(test)]
fn single_cluster(
    nb_procs: usize,
    modes: &[f64],
    f_eff: f64,
    tasks: &[(f64, f64)], // (period, wcet)
    admission: AdmissionTest,
) -> (Simulation, Rc<RefCell<Vec<TraceRecord>>>, Vec<TaskId>) {
    let mut platform = Platform::new();
    let cpu = platform.add_processor_type("cpu", 1.0, Duration::ZERO).unwrap();
    let cd = platform.add_clock_domain(
        modes.iter().map(|&mhz| Frequency { mhz }).collect(),
        Frequency { mhz: f_eff },
        None,
    ).unwrap();
    let pd = platform.add_power_domain(vec![
        CState {
            level: 0,
            scope: CStateScope::PerProcessor,
            wake_latency: Duration::ZERO,
            power: Power { mw: 100.0 },
        },
        CState {
            level: 1,
            scope: CStateScope::PerProcessor,
            wake_latency: Duration::ZERO,
            power: Power { mw: 0.0 },
        },
    ]).unwrap();
    for _ in 0..nb_procs {
        platform.add_processor(cpu, cd, pd).unwrap();
    }

    let mut ids = Vec::new();
    for &(period, wcet) in tasks {
        ids.push(platform.add_task(
            Duration::secs(period),
            Duration::secs(period),
            Duration::secs(wcet),
        ).unwrap());
    }
    platform.finalize();

    let mut sim = Simulation::new(platform);
    sim.add_cluster(cd, admission, DeadlineMissPolicy::Continue, Box::new(CbsPolicy::new()), 1.0);
    sim.set_allocator(Box::new(FirstFit::new())).unwrap();

    let (writer, records) = MemoryTraceWriter::new();
    sim.set_trace_writer(Box::new(writer));
    (sim, records, ids)
}

#[cfg(test)]
fn records_of<'a>(
    records: &'a [TraceRecord],
    kind: &str,
) -> Vec<&'a TraceRecord> {
    records.iter().filter(|r| r.kind == kind).collect()
}

#[test]
fn single_task_single_core() {
    let (mut sim, records, tasks) = single_cluster(
        1, &[1000.0], 1000.0, &[(10.0, 3.0)], AdmissionTest::CapacityBound,
    );
    sim.schedule_job_arrival(tasks[0], TimePoint::ZERO, Duration::secs(3.0));
    sim.run();

    let records = records.borrow();
    let dispatches = records_of(&records, "dispatch");
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].time, 0.0);
    assert_eq!(dispatches[0].u64_field("cpu"), Some(0));

    let finishes = records_of(&records, "job_finished");
    assert_eq!(finishes.len(), 1);
    assert_eq!(finishes[0].time, 3.0);

    assert!(records_of(&records, "deadline_miss").is_empty());
    assert_eq!(records.last().unwrap().kind, "sim_finished");
}

#[test]
fn edf_preempts_for_the_earlier_deadline() {
    let (mut sim, records, tasks) = single_cluster(
        1, &[1000.0], 1000.0, &[(10.0, 5.0), (4.0, 2.0)], AdmissionTest::CapacityBound,
    );
    sim.schedule_job_arrival(tasks[0], TimePoint::ZERO, Duration::secs(5.0));
    sim.schedule_job_arrival(tasks[1], TimePoint::secs(2.0), Duration::secs(2.0));
    sim.run();

    let records = records.borrow();

    // A starts at 0, is preempted at 2, B runs to 4, A resumes and
    // finishes at 7.
    let preempts = records_of(&records, "preempt");
    assert_eq!(preempts.len(), 1);
    assert_eq!(preempts[0].time, 2.0);
    assert_eq!(preempts[0].u64_field("tid"), Some(tasks[0].0 as u64));

    let finishes = records_of(&records, "job_finished");
    assert_eq!(finishes.len(), 2);
    assert_eq!(finishes[0].time, 4.0);
    assert_eq!(finishes[0].u64_field("tid"), Some(tasks[1].0 as u64));
    assert_eq!(finishes[1].time, 7.0);
    assert_eq!(finishes[1].u64_field("tid"), Some(tasks[0].0 as u64));

    assert!(records_of(&records, "deadline_miss").is_empty());
}

#[test]
fn power_aware_rounds_up_and_stretches_execution() {
    let (mut sim, records, tasks) = single_cluster(
        1,
        &[2000.0, 1500.0, 1000.0],
        1000.0,
        &[(10.0, 3.0), (10.0, 3.0)],
        AdmissionTest::CapacityBound,
    );
    sim.set_power_policy(DvfsDpm::new(Box::new(PowerAware::new()), Duration::ZERO));
    sim.schedule_job_arrival(tasks[0], TimePoint::ZERO, Duration::secs(3.0));
    sim.schedule_job_arrival(tasks[1], TimePoint::ZERO, Duration::secs(3.0));
    sim.run();

    let records = records.borrow();

    // Two U = 0.3 servers on one core: f = 2000 * 0.6 = 1200, rounded up
    // to the 1500 mode.
    let freq_changes = records_of(&records, "freq_change");
    assert_eq!(freq_changes.last().unwrap().f64_field("freq"), Some(1500.0));

    // At 1500 / 2000 = 0.75 speed the first 3-unit job takes 4 seconds.
    let finishes = records_of(&records, "job_finished");
    assert_eq!(finishes[0].time, 4.0);
    assert!(records_of(&records, "deadline_miss").is_empty());
}

#[test]
fn ffa_holds_efficient_frequency_and_sleeps_cores() {
    let (mut sim, records, tasks) = single_cluster(
        4,
        &[2000.0, 1500.0, 1000.0, 500.0],
        1000.0,
        &[(10.0, 2.0), (10.0, 2.0)],
        AdmissionTest::CapacityBound,
    );
    sim.set_power_policy(DvfsDpm::new(Box::new(Ffa::new()), Duration::ZERO));
    sim.schedule_job_arrival(tasks[0], TimePoint::ZERO, Duration::secs(2.0));
    sim.schedule_job_arrival(tasks[1], TimePoint::ZERO, Duration::secs(2.0));
    sim.run();

    let records = records.borrow();

    // U_active = 0.4, u_max = 0.2: f_min = 500 < f_eff, so hold 1000 MHz
    // with ceil(4 * 500 / 1000) = 2 active cores.
    let freq_changes = records_of(&records, "freq_change");
    assert_eq!(freq_changes.last().unwrap().f64_field("freq"), Some(1000.0));

    let sleeps: Vec<_> = records_of(&records, "proc_state_change")
        .into_iter()
        .filter(|r| r.field("state") == Some(&FieldValue::Str("sleep".into())))
        .collect();
    assert_eq!(sleeps.len(), 2);

    // Both jobs still finish: 2 units at half speed = 4 seconds.
    let finishes = records_of(&records, "job_finished");
    assert_eq!(finishes.len(), 2);
    assert!(records_of(&records, "deadline_miss").is_empty());
}

#[test]
fn gfb_rejects_the_third_heavy_task() {
    let (mut sim, records, tasks) = single_cluster(
        2,
        &[1000.0],
        1000.0,
        &[(10.0, 6.0), (10.0, 6.0), (10.0, 6.0)],
        AdmissionTest::GFB,
    );
    for &task in &tasks {
        sim.schedule_job_arrival(task, TimePoint::ZERO, Duration::secs(6.0));
    }
    sim.run();

    let records = records.borrow();

    // m = 2: two U = 0.6 servers pass, the third fails GFB
    // (1.8 > 2 - 1 * 0.6).
    let placed = records_of(&records, "task_placed");
    assert_eq!(placed.len(), 2);

    let rejected = records_of(&records, "task_rejected");
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].u64_field("tid"), Some(tasks[2].0 as u64));
}

#[test]
fn cooldown_coalesces_to_the_later_target() {
    let (mut sim, records, tasks) = single_cluster(
        1,
        &[2000.0, 1500.0, 1000.0, 500.0],
        500.0,
        &[(10.0, 3.0), (10.0, 3.0)],
        AdmissionTest::CapacityBound,
    );
    sim.set_power_policy(DvfsDpm::new(Box::new(PowerAware::new()), Duration::secs(1.0)));
    sim.schedule_job_arrival(tasks[0], TimePoint::ZERO, Duration::secs(3.0));
    sim.schedule_job_arrival(tasks[1], TimePoint::secs(0.5), Duration::secs(3.0));
    sim.run();

    let records = records.borrow();

    // Both utilization changes land within one cooldown: exactly one
    // frequency change, applied one cooldown after the second change and
    // reflecting the later target (2000 * 0.6 = 1200 -> 1500).
    let freq_changes = records_of(&records, "freq_change");
    assert_eq!(freq_changes.len(), 1);
    assert_eq!(freq_changes[0].time, 1.5);
    assert_eq!(freq_changes[0].f64_field("freq"), Some(1500.0));
}

#[test]
fn deadline_miss_is_traced_and_stop_policy_halts() {
    // A task that cannot make it: one core, U = 1.5.
    let mut platform = Platform::new();
    let cpu = platform.add_processor_type("cpu", 1.0, Duration::ZERO).unwrap();
    let cd = platform.add_clock_domain(
        vec![Frequency { mhz: 1000.0 }],
        Frequency { mhz: 1000.0 },
        None,
    ).unwrap();
    let pd = platform.add_power_domain(vec![CState {
        level: 0,
        scope: CStateScope::PerProcessor,
        wake_latency: Duration::ZERO,
        power: Power { mw: 100.0 },
    }]).unwrap();
    platform.add_processor(cpu, cd, pd).unwrap();
    let task = platform.add_task(
        Duration::secs(4.0),
        Duration::secs(4.0),
        Duration::secs(3.0),
    ).unwrap();
    platform.finalize();

    let mut sim = Simulation::new(platform);
    sim.add_cluster(
        cd,
        AdmissionTest::CapacityBound,
        DeadlineMissPolicy::StopSimulation,
        Box::new(CbsPolicy::new()),
        1.0,
    );
    sim.set_allocator(Box::new(FirstFit::new())).unwrap();
    let (writer, records) = MemoryTraceWriter::new();
    sim.set_trace_writer(Box::new(writer));

    // A 6-unit job against a budget of 3 per 4 gets postponed past its
    // deadline and eventually misses.
    sim.schedule_job_arrival(task, TimePoint::ZERO, Duration::secs(6.0));
    sim.run();

    let records = records.borrow();
    assert!(!records_of(&records, "serv_budget_exhausted").is_empty());
    assert!(!records_of(&records, "deadline_miss").is_empty());
    assert_eq!(records.last().unwrap().kind, "sim_finished");
}

#[test]
fn grub_noncontending_releases_bandwidth_at_virtual_deadline() {
    let mut platform = Platform::new();
    let cpu = platform.add_processor_type("cpu", 1.0, Duration::ZERO).unwrap();
    let cd = platform.add_clock_domain(
        vec![Frequency { mhz: 1000.0 }],
        Frequency { mhz: 1000.0 },
        None,
    ).unwrap();
    let pd = platform.add_power_domain(vec![CState {
        level: 0,
        scope: CStateScope::PerProcessor,
        wake_latency: Duration::ZERO,
        power: Power { mw: 100.0 },
    }]).unwrap();
    platform.add_processor(cpu, cd, pd).unwrap();
    let task = platform.add_task(
        Duration::secs(10.0),
        Duration::secs(10.0),
        Duration::secs(4.0),
    ).unwrap();
    platform.finalize();

    let mut sim = Simulation::new(platform);
    let cluster = sim.add_cluster(
        cd,
        AdmissionTest::CapacityBound,
        DeadlineMissPolicy::Continue,
        Box::new(GrubPolicy::new()),
        1.0,
    );
    sim.set_allocator(Box::new(FirstFit::new())).unwrap();
    let (writer, records) = MemoryTraceWriter::new();
    sim.set_trace_writer(Box::new(writer));

    // The job finishes early (1 unit of a 4-unit budget): the server goes
    // NonContending and only turns inactive at its virtual deadline.
    sim.schedule_job_arrival(task, TimePoint::ZERO, Duration::secs(1.0));
    sim.run_until(TimePoint::secs(5.0));
    assert!(
        (sim.clusters()[cluster.index()].sched().active_utilization() - 0.4).abs() < 1e-9
    );

    sim.run();
    assert_eq!(sim.clusters()[cluster.index()].sched().active_utilization(), 0.0);

    let records = records.borrow();
    let inactive = records_of(&records, "serv_inactive");
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].time, 10.0);
}

#[test]
fn detach_releases_registered_bandwidth() {
    let (mut sim, _records, tasks) = single_cluster(
        1, &[1000.0], 1000.0, &[(10.0, 3.0)], AdmissionTest::CapacityBound,
    );
    sim.set_expected_arrivals(tasks[0], 2);
    sim.schedule_job_arrival(tasks[0], TimePoint::ZERO, Duration::secs(3.0));
    sim.schedule_job_arrival(tasks[0], TimePoint::secs(10.0), Duration::secs(3.0));
    sim.run();

    assert_eq!(sim.clusters()[0].sched().total_utilization(), 0.0);
}
