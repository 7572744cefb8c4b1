use crate::prelude::*;

/// A group of processors sharing one clock.
///
/// Owns an ordered, strictly decreasing set of supported frequencies.
/// Invariant: `freq_min <= current <= freq_max`, and `current` is a member
/// of the supported set whenever it was produced by [`ceil_to_mode`].
///
/// [`ceil_to_mode`]: ClockDomain::ceil_to_mode
#[derive(Clone)]
#[derive(Debug)]
pub struct ClockDomain {
    id: ClockDomainId,
    frequencies: Vec<Frequency>,
    current: Frequency,
    efficient: Frequency,
    transition_delay: Option<Duration>,
    locked: bool,
    transitioning: bool,
    processors: Vec<ProcessorId>,
}

impl ClockDomain {
    pub(crate) fn new(
        id: ClockDomainId,
        frequencies: Vec<Frequency>,
        efficient: Frequency,
        transition_delay: Option<Duration>,
    ) -> Self {
        debug_assert!(!frequencies.is_empty());
        debug_assert!(frequencies.windows(2).all(|w| w[0].mhz > w[1].mhz));

        let current = frequencies[0];
        Self {
            id,
            frequencies,
            current,
            efficient,
            transition_delay,
            locked: false,
            transitioning: false,
            processors: Vec::new(),
        }
    }

    pub fn id(&self) -> ClockDomainId {
        self.id
    }

    pub fn frequencies(&self) -> &[Frequency] {
        &self.frequencies
    }

    pub fn freq_max(&self) -> Frequency {
        self.frequencies[0]
    }

    pub fn freq_min(&self) -> Frequency {
        *self.frequencies.last().unwrap()
    }

    /// The energy-per-work minimum of this domain.
    pub fn freq_eff(&self) -> Frequency {
        self.efficient
    }

    pub fn frequency(&self) -> Frequency {
        self.current
    }

    /// Current speed relative to this domain's own maximum.
    pub fn speed(&self) -> f64 {
        self.current.mhz / self.freq_max().mhz
    }

    pub fn transition_delay(&self) -> Option<Duration> {
        self.transition_delay
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock_frequency(&mut self) {
        self.locked = true;
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning
    }

    pub(crate) fn set_transitioning(&mut self, transitioning: bool) {
        self.transitioning = transitioning;
    }

    pub fn processors(&self) -> &[ProcessorId] {
        &self.processors
    }

    pub(crate) fn attach_processor(&mut self, proc: ProcessorId) {
        self.processors.push(proc);
    }

    /// Smallest supported frequency `>= freq`, or `freq_max` if none exists.
    pub fn ceil_to_mode(&self, freq: Frequency) -> Frequency {
        self.frequencies
            .iter()
            .rev()
            .find(|mode| mode.mhz >= freq.mhz)
            .copied()
            .unwrap_or_else(|| self.freq_max())
    }

    /// Set the domain frequency.
    ///
    /// Fails with `OutOfRange` outside `[freq_min, freq_max]` and with
    /// `InvalidState` when the domain is locked.
    pub fn set_frequency(&mut self, freq: Frequency) -> SimResult<()> {
        if self.locked {
            return Err(SimulationError::invalid_state(format!(
                "clock domain {} is frequency-locked", self.id
            )));
        }
        if freq.mhz < self.freq_min().mhz || freq.mhz > self.freq_max().mhz {
            return Err(SimulationError::out_of_range(format!(
                "frequency {} outside [{}, {}] of clock domain {}",
                freq, self.freq_min(), self.freq_max(), self.id
            )));
        }

        self.current = freq;
        Ok(())
    }
}

// =============================================================================

#[cfg(test)]
fn domain(frequencies: &[f64]) -> ClockDomain {
    ClockDomain::new(
        ClockDomainId(0),
        frequencies.iter().map(|&mhz| Frequency { mhz }).collect(),
        Frequency { mhz: 1000.0 },
        None,
    )
}

#[test]
fn construction_starts_at_freq_max() {
    let cd = domain(&[2000.0, 1500.0, 1000.0, 500.0]);

    assert_eq!(cd.freq_max().mhz, 2000.0);
    assert_eq!(cd.freq_min().mhz, 500.0);
    assert_eq!(cd.frequency().mhz, 2000.0);
    assert!(!cd.is_locked());
    assert!(cd.processors().is_empty());
}

#[test]
fn ceil_to_mode_picks_smallest_supported_above() {
    let cd = domain(&[2000.0, 1500.0, 1000.0]);

    assert_eq!(cd.ceil_to_mode(Frequency { mhz: 1200.0 }).mhz, 1500.0);
    assert_eq!(cd.ceil_to_mode(Frequency { mhz: 1500.0 }).mhz, 1500.0);
    assert_eq!(cd.ceil_to_mode(Frequency { mhz: 900.0 }).mhz, 1000.0);
    // Above every mode: saturate at freq_max.
    assert_eq!(cd.ceil_to_mode(Frequency { mhz: 2500.0 }).mhz, 2000.0);
}

#[test]
fn set_frequency_checks_range_and_lock() {
    let mut cd = domain(&[2000.0, 500.0]);

    cd.set_frequency(Frequency { mhz: 1000.0 }).unwrap();
    assert_eq!(cd.frequency().mhz, 1000.0);

    assert!(matches!(
        cd.set_frequency(Frequency { mhz: 400.0 }),
        Err(SimulationError::OutOfRange(_))
    ));
    assert!(matches!(
        cd.set_frequency(Frequency { mhz: 2500.0 }),
        Err(SimulationError::OutOfRange(_))
    ));

    cd.lock_frequency();
    assert!(matches!(
        cd.set_frequency(Frequency { mhz: 1500.0 }),
        Err(SimulationError::InvalidState(_))
    ));
    assert_eq!(cd.frequency().mhz, 1000.0);
}
