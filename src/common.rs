pub mod prelude {
    pub use super::{
        round_zero,
        TIME_EPSILON,
        TimePoint,
        Duration,
        Frequency,
        Power,
        Energy,
        ProcessorTypeId,
        ClockDomainId,
        PowerDomainId,
        ProcessorId,
        TaskId,
        ClusterId,
        ServerId,
    };
}

/// Comparison tolerance for rational time, in seconds.
///
/// Accumulated DVFS speed changes (fractional frequency ratios such as
/// 200/1400) and heterogeneous performance scaling leave residues in the
/// last bits of a double. Every zero/sign test on a time quantity goes
/// through [`round_zero`]; nothing else in the crate compares raw doubles
/// against zero.
pub const TIME_EPSILON: f64 = 1e-9;

/// Snap a value within [`TIME_EPSILON`] of zero to exactly zero.
pub fn round_zero(value: f64) -> f64 {
    if value.abs() < TIME_EPSILON { 0.0 } else { value }
}

/// A span of rational time, in seconds.
#[derive(Clone, Copy)]
#[derive(Debug, Default)]
#[derive(PartialEq, PartialOrd)]
pub struct Duration {
    secs: f64,
}

/// An absolute point on the simulation timeline, in seconds since start.
///
/// Wraps an [`ordered_float::OrderedFloat`] so that event keys have a total
/// order and can live in ordered collections.
#[derive(Clone, Copy)]
#[derive(Debug, Default)]
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePoint {
    secs: ordered_float::OrderedFloat<f64>,
}

/// A clock frequency, in MHz.
#[derive(Clone, Copy)]
#[derive(Debug, Default)]
#[derive(PartialEq, PartialOrd)]
pub struct Frequency {
    pub mhz: f64,
}

/// Electrical power, in mW.
#[derive(Clone, Copy)]
#[derive(Debug, Default)]
#[derive(PartialEq, PartialOrd)]
pub struct Power {
    pub mw: f64,
}

/// Energy, in mJ. Obtained as [`Power`] × [`Duration`].
#[derive(Clone, Copy)]
#[derive(Debug, Default)]
#[derive(PartialEq, PartialOrd)]
pub struct Energy {
    pub mj: f64,
}

// =============================================================================

impl Duration {
    pub const ZERO: Duration = Duration { secs: 0.0 };

    pub fn secs(secs: f64) -> Self {
        Self { secs }
    }

    pub fn as_secs(&self) -> f64 {
        self.secs
    }

    /// True iff the duration is zero up to [`TIME_EPSILON`].
    pub fn is_zero(&self) -> bool {
        round_zero(self.secs) == 0.0
    }

    /// True iff the duration is strictly positive up to [`TIME_EPSILON`].
    pub fn is_positive(&self) -> bool {
        round_zero(self.secs) > 0.0
    }

    /// Clamp a small negative residue (DVFS rounding) to exactly zero.
    pub fn clamped(&self) -> Self {
        if self.secs < 0.0 { Self::ZERO } else { *self }
    }

    pub fn min(self, other: Self) -> Self {
        if self.secs <= other.secs { self } else { other }
    }

    pub fn max(self, other: Self) -> Self {
        if self.secs >= other.secs { self } else { other }
    }
}

impl TimePoint {
    pub const ZERO: TimePoint = TimePoint { secs: ordered_float::OrderedFloat(0.0) };

    pub fn secs(secs: f64) -> Self {
        Self { secs: ordered_float::OrderedFloat(secs) }
    }

    pub fn as_secs(&self) -> f64 {
        self.secs.into_inner()
    }

    pub fn min(self, other: Self) -> Self {
        if self <= other { self } else { other }
    }

    pub fn max(self, other: Self) -> Self {
        if self >= other { self } else { other }
    }
}

impl std::ops::Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Self) -> Self::Output {
        Self::Output { secs: self.secs + rhs.secs }
    }
}

impl std::ops::AddAssign for Duration {
    fn add_assign(&mut self, rhs: Self) {
        self.secs += rhs.secs;
    }
}

impl std::ops::Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::Output { secs: self.secs - rhs.secs }
    }
}

impl std::ops::SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Self) {
        self.secs -= rhs.secs;
    }
}

impl std::ops::Mul<f64> for Duration {
    type Output = Duration;

    fn mul(self, rhs: f64) -> Self::Output {
        Self::Output { secs: self.secs * rhs }
    }
}

impl std::ops::Div<f64> for Duration {
    type Output = Duration;

    fn div(self, rhs: f64) -> Self::Output {
        Self::Output { secs: self.secs / rhs }
    }
}

impl std::ops::Div for Duration {
    type Output = f64;

    fn div(self, rhs: Self) -> Self::Output {
        self.secs / rhs.secs
    }
}

impl std::iter::Sum for Duration {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Duration::ZERO, |acc, val| acc + val)
    }
}

impl std::ops::Add<Duration> for TimePoint {
    type Output = TimePoint;

    fn add(self, rhs: Duration) -> Self::Output {
        TimePoint::secs(self.as_secs() + rhs.as_secs())
    }
}

impl std::ops::Sub for TimePoint {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        Duration::secs(self.as_secs() - rhs.as_secs())
    }
}

impl std::ops::Mul<Duration> for Power {
    type Output = Energy;

    fn mul(self, rhs: Duration) -> Self::Output {
        Energy { mj: self.mw * rhs.as_secs() }
    }
}

impl std::ops::Add for Energy {
    type Output = Energy;

    fn add(self, rhs: Self) -> Self::Output {
        Energy { mj: self.mj + rhs.mj }
    }
}

impl std::ops::AddAssign for Energy {
    fn add_assign(&mut self, rhs: Self) {
        self.mj += rhs.mj;
    }
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} s", self.secs)
    }
}

impl std::fmt::Display for TimePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} s", self.secs)
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} MHz", self.mhz)
    }
}

// =============================================================================
// Typed arena indices. Every hardware and scheduling entity is stored in a
// vector owned by its parent and referenced by one of these handles, so no
// entity ever holds a pointer back into another.

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy)]
        #[derive(Debug)]
        #[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub usize);

        impl $name {
            pub fn index(&self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_id!(
    /// Index of a [`crate::hardware::ProcessorType`] in its platform.
    ProcessorTypeId
);
arena_id!(
    /// Index of a [`crate::hardware::ClockDomain`] in its platform.
    ClockDomainId
);
arena_id!(
    /// Index of a [`crate::hardware::PowerDomain`] in its platform.
    PowerDomainId
);
arena_id!(
    /// Index of a [`crate::hardware::Processor`] in its platform.
    ProcessorId
);
arena_id!(
    /// Index of a [`crate::workload::Task`] in its platform.
    TaskId
);
arena_id!(
    /// Index of a [`crate::allocators::Cluster`] in its simulation.
    ClusterId
);
arena_id!(
    /// Index of a [`crate::server::CbsServer`] in its scheduler.
    ServerId
);

// =============================================================================

#[test]
fn round_zero_snaps_residues() {
    assert_eq!(round_zero(0.0), 0.0);
    assert_eq!(round_zero(4e-10), 0.0);
    assert_eq!(round_zero(-4e-10), 0.0);
    assert_eq!(round_zero(2e-9), 2e-9);
    assert_eq!(round_zero(-1.0), -1.0);
}

#[test]
fn duration_arithmetic() {
    let a = Duration::secs(3.0);
    let b = Duration::secs(1.5);

    assert_eq!((a + b).as_secs(), 4.5);
    assert_eq!((a - b).as_secs(), 1.5);
    assert_eq!((a * 2.0).as_secs(), 6.0);
    assert_eq!((a / 2.0).as_secs(), 1.5);
    assert_eq!(a / b, 2.0);
    assert!(Duration::secs(-1e-12).clamped().is_zero());
    assert!(!Duration::secs(5e-10).is_positive());
    assert!(Duration::secs(1e-8).is_positive());
}

#[test]
fn timepoint_total_order() {
    let t0 = TimePoint::ZERO;
    let t1 = TimePoint::secs(1.0);

    assert!(t0 < t1);
    assert_eq!(t1 - t0, Duration::secs(1.0));
    assert_eq!(t0 + Duration::secs(1.0), t1);
    assert_eq!(t0.max(t1), t1);
}

#[test]
fn energy_is_power_times_duration() {
    let e = Power { mw: 250.0 } * Duration::secs(4.0);
    assert_eq!(e.mj, 1000.0);
}
