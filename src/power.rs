//! DVFS and DPM: frequency-scaling policies, core sleep/wake, and the
//! cooldown-deferred application machinery.

pub mod prelude {
    pub use super::power_aware::PowerAware;
    pub use super::ffa::Ffa;
    pub use super::csf::Csf;
    pub use super::{
        DvfsDpm,
        FrequencyPolicy,
        PlatformTarget,
        SchedulerLoad,
        compute_freq_min,
        clamp_procs,
        utilization_scale,
    };
}

pub mod power_aware;
pub mod ffa;
pub mod csf;

use crate::prelude::*;

use std::collections::HashMap;

/// A frequency and active-core-count pair a policy wants the platform in.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq)]
pub struct PlatformTarget {
    pub frequency: Frequency,
    pub active_processors: usize,
}

/// Scheduler utilization figures, already scaled into the target domain's
/// terms (see [`utilization_scale`]).
#[derive(Clone, Copy)]
#[derive(Debug, Default)]
pub struct SchedulerLoad {
    pub total_utilization: f64,
    pub active_utilization: f64,
    pub max_utilization: f64,
}

/// Frequency lower bound keeping a global-EDF cluster schedulable:
/// `f_max * (U + (m - 1) * u_max) / m`.
pub fn compute_freq_min(freq_max: f64, total_util: f64, max_util: f64, nb_procs: f64) -> f64 {
    if nb_procs <= 0.0 {
        return freq_max;
    }
    freq_max * (total_util + (nb_procs - 1.0) * max_util) / nb_procs
}

/// Round a fractional core count into `[1, max_procs]`.
pub fn clamp_procs(value: f64, max_procs: usize) -> usize {
    if value < 1.0 {
        return 1;
    }
    (value.ceil() as usize).min(max_procs)
}

/// Factor converting scheduler utilization (reference units) into a
/// domain's local terms: `(f_ref_max / f_domain_max) / perf`.
pub fn utilization_scale(platform: &Platform, domain: ClockDomainId) -> f64 {
    let domain = platform.clock_domain(domain);
    let local_max = domain.freq_max().mhz;
    if local_max <= 0.0 {
        return 1.0;
    }

    let perf = domain
        .processors()
        .first()
        .map(|&p| {
            let t = platform.processor(p).proc_type();
            platform.processor_type(t).performance() / platform.reference_performance()
        })
        .unwrap_or(1.0);

    if perf <= 0.0 {
        return platform.reference_freq_max().mhz / local_max;
    }
    (platform.reference_freq_max().mhz / local_max) / perf
}

/// Computes the [`PlatformTarget`] for a domain from its scheduler's load.
pub trait FrequencyPolicy {
    fn target(
        &self,
        domain: &ClockDomain,
        nb_procs: usize,
        load: &SchedulerLoad,
    ) -> PlatformTarget;

    fn name(&self) -> &'static str;
}

#[derive(Debug)]
struct PendingTarget {
    target: PlatformTarget,
    timer: TimerId,
    cluster: ClusterId,
}

/// Drives DVFS and DPM for all clusters from one [`FrequencyPolicy`].
///
/// With a zero cooldown targets are applied immediately; otherwise a change
/// is deferred by the cooldown, and further utilization changes within the
/// window replace the pending target so only the most recent one is applied
/// when the timer fires.
pub struct DvfsDpm {
    policy: Box<dyn FrequencyPolicy>,
    cooldown: Duration,
    sleep_level: Option<u32>,
    pending: HashMap<ClockDomainId, PendingTarget>,
}

impl DvfsDpm {
    pub fn new(policy: Box<dyn FrequencyPolicy>, cooldown: Duration) -> Self {
        Self { policy, cooldown, sleep_level: None, pending: HashMap::new() }
    }

    /// Override the sleep C-state; the default is each domain's deepest.
    pub fn with_sleep_level(mut self, level: u32) -> Self {
        self.sleep_level = Some(level);
        self
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// React to a change of the contending bandwidth of `cluster`'s
    /// scheduler.
    pub fn on_utilization_changed(
        &mut self,
        engine: &mut Engine,
        platform: &mut Platform,
        cluster: ClusterId,
        domain_id: ClockDomainId,
        load: SchedulerLoad,
    ) {
        let domain = platform.clock_domain(domain_id);
        if domain.is_locked() || domain.is_transitioning() {
            return;
        }

        let nb_procs = domain.processors().len();
        let target = self.policy.target(domain, nb_procs, &load);

        if !self.cooldown.is_positive() {
            self.apply(engine, platform, cluster, domain_id, target);
            return;
        }

        let current = PlatformTarget {
            frequency: domain.frequency(),
            active_processors: count_active(platform, domain_id),
        };

        let cooldown = self.cooldown;
        if let Some(pending) = self.pending.get_mut(&domain_id) {
            // Coalesce: restart the cooldown with the newest target.
            pending.target = target;
            let _ = engine.cancel_timer(pending.timer);
            pending.timer = engine.add_timer(
                engine.now() + cooldown,
                priority::TIMER_DEFAULT,
                Action::ApplyDvfsTarget(domain_id),
            );
            return;
        }

        if target == current {
            return;
        }

        let timer = engine.add_timer(
            engine.now() + self.cooldown,
            priority::TIMER_DEFAULT,
            Action::ApplyDvfsTarget(domain_id),
        );
        self.pending.insert(domain_id, PendingTarget { target, timer, cluster });
    }

    /// Hook for DPM policies reacting to individual cores going idle. The
    /// bundled policies manage cores from `on_utilization_changed` instead.
    pub fn on_processor_idle(&mut self, _platform: &Platform, _proc: ProcessorId) {}

    /// Counterpart of [`on_processor_idle`](Self::on_processor_idle).
    pub fn on_processor_active(&mut self, _platform: &Platform, _proc: ProcessorId) {}

    /// The cooldown timer of a domain fired: apply its pending target.
    pub fn on_cooldown_expired(
        &mut self,
        engine: &mut Engine,
        platform: &mut Platform,
        domain_id: ClockDomainId,
    ) {
        let Some(pending) = self.pending.remove(&domain_id) else { return };
        self.apply(engine, platform, pending.cluster, domain_id, pending.target);
    }

    /// Sleep or wake cores and switch the domain frequency; a cluster-wide
    /// resched is deferred whenever anything changed, since running servers
    /// now drain budget at a different rate.
    fn apply(
        &mut self,
        engine: &mut Engine,
        platform: &mut Platform,
        cluster: ClusterId,
        domain_id: ClockDomainId,
        target: PlatformTarget,
    ) {
        let sleep_level = self.sleep_level.unwrap_or_else(|| {
            platform
                .clock_domain(domain_id)
                .processors()
                .first()
                .map(|&p| {
                    let pd = platform.processor(p).power_domain();
                    platform.power_domain(pd).deepest_level()
                })
                .unwrap_or(1)
        });

        let mut changed = adjust_active_processors(
            engine, platform, domain_id, target.active_processors, sleep_level,
        );

        if target.frequency != platform.clock_domain(domain_id).frequency() {
            platform
                .clock_domain_mut(domain_id)
                .set_frequency(target.frequency)
                .expect("policy targets stay within the supported range");
            engine.trace(|w| {
                w.event_type("freq_change");
                w.field("domain", domain_id.index().into());
                w.field("freq", target.frequency.mhz.into());
            });

            // Domains with a transition delay refuse further changes until
            // the switch settles.
            let delay = platform.clock_domain(domain_id).transition_delay();
            if let Some(delay) = delay {
                if delay.is_positive() {
                    platform.clock_domain_mut(domain_id).set_transitioning(true);
                    engine.add_timer(
                        engine.now() + delay,
                        priority::TIMER_DEFAULT,
                        Action::TransitionComplete(domain_id),
                    );
                }
            }
            changed = true;
        }

        if changed {
            engine.defer(Action::Resched(cluster));
        }
    }
}

fn count_active(platform: &Platform, domain: ClockDomainId) -> usize {
    platform
        .clock_domain(domain)
        .processors()
        .iter()
        .filter(|&&p| platform.processor(p).is_active())
        .count()
}

fn trace_proc_state(engine: &mut Engine, platform: &Platform, proc: ProcessorId) {
    let state = platform.processor(proc).state();
    engine.trace(|w| {
        w.event_type("proc_state_change");
        w.field("cpu", proc.index().into());
        w.field("state", state.name().into());
    });
}

/// Bring the number of usable cores of a domain to `target_active`:
/// excess idle cores are put to sleep, sleeping ones are woken through the
/// `Change` state and their wake latency. Returns whether anything moved.
fn adjust_active_processors(
    engine: &mut Engine,
    platform: &mut Platform,
    domain: ClockDomainId,
    target_active: usize,
    sleep_level: u32,
) -> bool {
    let procs: Vec<ProcessorId> = platform.clock_domain(domain).processors().to_vec();
    let mut active = count_active(platform, domain);
    let mut changed = false;

    // Sleep excess idle cores. Running cores are never put to sleep.
    for &proc in &procs {
        if active <= target_active {
            break;
        }
        if platform.processor(proc).state() == ProcessorState::Idle {
            platform.processor_mut(proc).request_cstate(sleep_level);
            trace_proc_state(engine, platform, proc);
            active -= 1;
            changed = true;
        }
    }

    // Wake the deficit.
    for &proc in &procs {
        if active >= target_active {
            break;
        }
        if platform.processor(proc).state() == ProcessorState::Sleep {
            let level = platform.processor(proc).requested_cstate();
            let pd = platform.processor(proc).power_domain();
            let latency = platform.power_domain(pd).wake_latency(level);

            if latency.is_positive() {
                platform.processor_mut(proc).begin_wake();
                trace_proc_state(engine, platform, proc);
                engine.add_timer(
                    engine.now() + latency,
                    priority::PROCESSOR_AVAILABLE,
                    Action::WakeProcessor(proc),
                );
            } else {
                platform.processor_mut(proc).begin_wake();
                platform.processor_mut(proc).finish_wake();
                trace_proc_state(engine, platform, proc);
            }
            active += 1;
            changed = true;
        }
    }

    changed
}

// =============================================================================

#[test]
fn freq_min_formula() {
    // 4 cores, U_active = 0.4, u_max = 0.2: the schedulable minimum is
    // 2000 * (0.4 + 3 * 0.2) / 4 = 500.
    assert_eq!(compute_freq_min(2000.0, 0.4, 0.2, 4.0), 500.0);
    assert_eq!(compute_freq_min(2000.0, 0.0, 0.0, 0.0), 2000.0);
}

#[test]
fn proc_clamping() {
    assert_eq!(clamp_procs(0.2, 4), 1);
    assert_eq!(clamp_procs(1.1, 4), 2);
    assert_eq!(clamp_procs(2.0, 4), 2);
    assert_eq!(clamp_procs(9.0, 4), 4);
}

#[test]
fn scale_combines_frequency_and_performance() {
    let (platform, big_cd, little_cd) = crate::hardware::platform::two_cluster_platform();

    // Reference domain: no scaling.
    assert_eq!(utilization_scale(&platform, big_cd), 1.0);
    // Little: half the clock, half the performance.
    assert_eq!(utilization_scale(&platform, little_cd), 4.0);
}
