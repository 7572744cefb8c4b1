use crate::prelude::*;

/// Whether a C-state can be entered by a single core or only by the whole
/// domain at once.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq)]
pub enum CStateScope {
    PerProcessor,
    DomainWide,
}

/// One idle state of a power domain. Level 0 is the active state.
#[derive(Clone)]
#[derive(Debug)]
pub struct CState {
    pub level: u32,
    pub scope: CStateScope,
    pub wake_latency: Duration,
    pub power: Power,
}

/// A group of processors sharing sleep states.
#[derive(Clone)]
#[derive(Debug)]
pub struct PowerDomain {
    id: PowerDomainId,
    c_states: Vec<CState>,
    processors: Vec<ProcessorId>,
}

impl PowerDomain {
    pub(crate) fn new(id: PowerDomainId, c_states: Vec<CState>) -> Self {
        Self { id, c_states, processors: Vec::new() }
    }

    pub fn id(&self) -> PowerDomainId {
        self.id
    }

    pub fn c_states(&self) -> &[CState] {
        &self.c_states
    }

    pub fn processors(&self) -> &[ProcessorId] {
        &self.processors
    }

    pub(crate) fn attach_processor(&mut self, proc: ProcessorId) {
        self.processors.push(proc);
    }

    fn c_state(&self, level: u32) -> Option<&CState> {
        self.c_states.iter().find(|cs| cs.level == level)
    }

    /// The deepest level defined for this domain, used as the default sleep
    /// target by the DPM policies.
    pub fn deepest_level(&self) -> u32 {
        self.c_states.iter().map(|cs| cs.level).max().unwrap_or(0)
    }

    /// Wake latency of a level; level 0 and unknown levels wake instantly.
    pub fn wake_latency(&self, level: u32) -> Duration {
        if level == 0 {
            return Duration::ZERO;
        }
        self.c_state(level).map(|cs| cs.wake_latency).unwrap_or(Duration::ZERO)
    }

    pub fn c_state_power(&self, level: u32) -> Power {
        self.c_state(level).map(|cs| cs.power).unwrap_or(Power { mw: 0.0 })
    }

    /// The C-state a processor actually reaches for its requested level.
    ///
    /// Per-processor levels are granted as requested. A domain-wide level is
    /// only reached when every member can follow: the achieved level is the
    /// highest domain-wide level not exceeding the minimum level requested
    /// across the domain, where non-sleeping members count as level 0.
    ///
    /// `members` yields, for each processor of the domain, whether it is
    /// sleeping and which level it requested.
    pub fn achieved_cstate(
        &self,
        requested: u32,
        members: impl Iterator<Item = (bool, u32)>,
    ) -> u32 {
        if requested == 0 {
            return 0;
        }

        let Some(cstate) = self.c_state(requested) else {
            return 0;
        };

        if cstate.scope == CStateScope::PerProcessor {
            return requested;
        }

        let min_level = members
            .map(|(sleeping, level)| if sleeping { level } else { 0 })
            .min()
            .unwrap_or(0);

        self.c_states
            .iter()
            .filter(|cs| cs.scope == CStateScope::DomainWide && cs.level <= min_level)
            .map(|cs| cs.level)
            .max()
            .unwrap_or(0)
    }
}

// =============================================================================

#[cfg(test)]
fn test_domain() -> PowerDomain {
    PowerDomain::new(PowerDomainId(0), vec![
        CState {
            level: 0,
            scope: CStateScope::PerProcessor,
            wake_latency: Duration::ZERO,
            power: Power { mw: 100.0 },
        },
        CState {
            level: 1,
            scope: CStateScope::PerProcessor,
            wake_latency: Duration::secs(0.001),
            power: Power { mw: 50.0 },
        },
        CState {
            level: 2,
            scope: CStateScope::DomainWide,
            wake_latency: Duration::secs(0.01),
            power: Power { mw: 10.0 },
        },
    ])
}

#[test]
fn per_processor_levels_are_granted() {
    let pd = test_domain();

    assert_eq!(pd.achieved_cstate(0, std::iter::empty()), 0);
    assert_eq!(pd.achieved_cstate(1, std::iter::empty()), 1);
}

#[test]
fn domain_wide_level_needs_all_members() {
    let pd = test_domain();

    // One member awake: the domain cannot reach C2.
    let achieved = pd.achieved_cstate(2, [(true, 2), (false, 0)].into_iter());
    assert_eq!(achieved, 0);

    // All members asleep at level 2.
    let achieved = pd.achieved_cstate(2, [(true, 2), (true, 2)].into_iter());
    assert_eq!(achieved, 2);

    // One member only reached C1: highest domain-wide level <= 1 is none.
    let achieved = pd.achieved_cstate(2, [(true, 2), (true, 1)].into_iter());
    assert_eq!(achieved, 0);
}

#[test]
fn unknown_level_falls_back_to_active() {
    let pd = test_domain();
    assert_eq!(pd.achieved_cstate(7, std::iter::empty()), 0);
}

#[test]
fn wake_latency_lookup() {
    let pd = test_domain();

    assert!(pd.wake_latency(0).is_zero());
    assert_eq!(pd.wake_latency(1), Duration::secs(0.001));
    assert_eq!(pd.deepest_level(), 2);
    assert_eq!(pd.c_state_power(2).mw, 10.0);
}
