use crate::prelude::*;

/// Arena owner of all hardware entities and tasks.
///
/// Entities are stored in vectors and referenced by typed indices, so every
/// handle created by an `add_*` method stays valid for the platform's
/// lifetime. `finalize` locks the topology: afterwards any `add_*` call
/// fails with `AlreadyFinalized`.
#[derive(Debug, Default)]
pub struct Platform {
    types: Vec<ProcessorType>,
    clock_domains: Vec<ClockDomain>,
    power_domains: Vec<PowerDomain>,
    processors: Vec<Processor>,
    tasks: Vec<Task>,
    finalized: bool,
    reference_type: Option<ProcessorTypeId>,
    reference_freq_max: Frequency,
}

impl Platform {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> SimResult<()> {
        if self.finalized {
            Err(SimulationError::AlreadyFinalized)
        } else {
            Ok(())
        }
    }

    pub fn add_processor_type(
        &mut self,
        name: impl Into<String>,
        performance: f64,
        context_switch_delay: Duration,
    ) -> SimResult<ProcessorTypeId> {
        self.check_open()?;

        let id = ProcessorTypeId(self.types.len());
        self.types.push(ProcessorType::new(id, name, performance, context_switch_delay));
        Ok(id)
    }

    pub fn add_clock_domain(
        &mut self,
        frequencies: Vec<Frequency>,
        efficient: Frequency,
        transition_delay: Option<Duration>,
    ) -> SimResult<ClockDomainId> {
        self.check_open()?;
        if frequencies.is_empty() {
            return Err(SimulationError::invalid_state("clock domain needs at least one frequency"));
        }
        if !frequencies.windows(2).all(|w| w[0].mhz > w[1].mhz) {
            return Err(SimulationError::invalid_state(
                "clock domain frequencies must be strictly decreasing",
            ));
        }

        let id = ClockDomainId(self.clock_domains.len());
        self.clock_domains.push(ClockDomain::new(id, frequencies, efficient, transition_delay));
        Ok(id)
    }

    pub fn add_power_domain(&mut self, c_states: Vec<CState>) -> SimResult<PowerDomainId> {
        self.check_open()?;

        let id = PowerDomainId(self.power_domains.len());
        self.power_domains.push(PowerDomain::new(id, c_states));
        Ok(id)
    }

    pub fn add_processor(
        &mut self,
        proc_type: ProcessorTypeId,
        clock_domain: ClockDomainId,
        power_domain: PowerDomainId,
    ) -> SimResult<ProcessorId> {
        self.check_open()?;

        let id = ProcessorId(self.processors.len());
        self.processors.push(Processor::new(id, proc_type, clock_domain, power_domain));
        self.clock_domains[clock_domain.index()].attach_processor(id);
        self.power_domains[power_domain.index()].attach_processor(id);
        Ok(id)
    }

    pub fn add_task(
        &mut self,
        period: Duration,
        relative_deadline: Duration,
        wcet: Duration,
    ) -> SimResult<TaskId> {
        self.check_open()?;

        let id = TaskId(self.tasks.len());
        self.tasks.push(Task::new(id, period, relative_deadline, wcet));
        Ok(id)
    }

    /// Lock the topology and elect the reference operating point: the
    /// fastest processor type and the highest `freq_max` over all domains.
    pub fn finalize(&mut self) {
        self.finalized = true;

        self.reference_type = self
            .types
            .iter()
            .max_by_key(|t| ordered_float::OrderedFloat(t.performance()))
            .map(|t| t.id());
        self.reference_freq_max = self
            .clock_domains
            .iter()
            .map(|cd| cd.freq_max())
            .max_by_key(|f| ordered_float::OrderedFloat(f.mhz))
            .unwrap_or(Frequency { mhz: 0.0 });
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn reference_performance(&self) -> f64 {
        self.reference_type
            .map(|id| self.types[id.index()].performance())
            .unwrap_or(1.0)
    }

    pub fn reference_freq_max(&self) -> Frequency {
        self.reference_freq_max
    }

    pub fn processor_type(&self, id: ProcessorTypeId) -> &ProcessorType {
        &self.types[id.index()]
    }

    pub fn clock_domain(&self, id: ClockDomainId) -> &ClockDomain {
        &self.clock_domains[id.index()]
    }

    pub fn clock_domain_mut(&mut self, id: ClockDomainId) -> &mut ClockDomain {
        &mut self.clock_domains[id.index()]
    }

    pub fn power_domain(&self, id: PowerDomainId) -> &PowerDomain {
        &self.power_domains[id.index()]
    }

    pub fn processor(&self, id: ProcessorId) -> &Processor {
        &self.processors[id.index()]
    }

    pub fn processor_mut(&mut self, id: ProcessorId) -> &mut Processor {
        &mut self.processors[id.index()]
    }

    pub fn processors(&self) -> &[Processor] {
        &self.processors
    }

    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.index()]
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn clock_domains(&self) -> &[ClockDomain] {
        &self.clock_domains
    }

    /// Execution speed of a processor relative to the reference operating
    /// point: `(f / f_ref_max) * (perf / ref_perf)`.
    ///
    /// One wall-clock second on this core performs `speed_factor` units of
    /// reference work; this is the single conversion used by all budget and
    /// remaining-work arithmetic.
    pub fn speed_factor(&self, proc: ProcessorId) -> f64 {
        let proc = self.processor(proc);
        let domain = self.clock_domain(proc.clock_domain());
        let perf = self.processor_type(proc.proc_type()).performance();

        let freq_ratio = if self.reference_freq_max.mhz > 0.0 {
            domain.frequency().mhz / self.reference_freq_max.mhz
        } else {
            1.0
        };
        freq_ratio * perf / self.reference_performance()
    }

    /// The C-state a processor actually reaches, given the whole domain.
    pub fn achieved_cstate(&self, proc_id: ProcessorId) -> u32 {
        let proc = self.processor(proc_id);
        let domain = self.power_domain(proc.power_domain());
        let members = domain.processors().iter().map(|&pid| {
            let member = self.processor(pid);
            (member.state() == ProcessorState::Sleep, member.requested_cstate())
        });
        domain.achieved_cstate(proc.requested_cstate(), members)
    }
}

// =============================================================================

#[cfg(test)]
pub(crate) fn two_cluster_platform() -> (Platform, ClockDomainId, ClockDomainId) {
    let mut platform = Platform::new();
    let big = platform.add_processor_type("big", 2.0, Duration::ZERO).unwrap();
    let little = platform.add_processor_type("little", 1.0, Duration::ZERO).unwrap();

    let big_cd = platform.add_clock_domain(
        vec![Frequency { mhz: 2000.0 }, Frequency { mhz: 1000.0 }, Frequency { mhz: 500.0 }],
        Frequency { mhz: 1000.0 },
        None,
    ).unwrap();
    let little_cd = platform.add_clock_domain(
        vec![Frequency { mhz: 1000.0 }, Frequency { mhz: 500.0 }, Frequency { mhz: 200.0 }],
        Frequency { mhz: 500.0 },
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

    for _ in 0..4 {
        platform.add_processor(big, big_cd, pd).unwrap();
    }
    for _ in 0..4 {
        platform.add_processor(little, little_cd, pd).unwrap();
    }

    platform.finalize();
    (platform, big_cd, little_cd)
}

#[test]
fn finalize_locks_topology() {
    let (mut platform, ..) = two_cluster_platform();

    assert!(platform.is_finalized());
    assert!(matches!(
        platform.add_processor_type("extra", 1.0, Duration::ZERO),
        Err(SimulationError::AlreadyFinalized)
    ));
    assert!(matches!(
        platform.add_task(Duration::secs(1.0), Duration::secs(1.0), Duration::secs(0.5)),
        Err(SimulationError::AlreadyFinalized)
    ));
}

#[test]
fn reference_is_the_fastest_type() {
    let (platform, ..) = two_cluster_platform();

    assert_eq!(platform.reference_performance(), 2.0);
    assert_eq!(platform.reference_freq_max().mhz, 2000.0);
}

#[test]
fn speed_factor_combines_frequency_and_performance() {
    let (mut platform, big_cd, _) = two_cluster_platform();

    // Big core at max frequency is the reference: factor 1.
    assert_eq!(platform.speed_factor(ProcessorId(0)), 1.0);
    // Little core: half the performance, half the reference frequency.
    assert_eq!(platform.speed_factor(ProcessorId(4)), 0.25);

    platform.clock_domain_mut(big_cd).set_frequency(Frequency { mhz: 1000.0 }).unwrap();
    assert_eq!(platform.speed_factor(ProcessorId(0)), 0.5);
}
