pub mod prelude {
    pub use super::{
        SimulationError,
        SimResult,
    };
}

/// Error taxonomy shared by the whole simulator.
///
/// Loader and admission failures surface to the caller as values of this
/// type; violated event-loop invariants are programming errors and use
/// assertions instead.
#[derive(Debug)]
pub enum SimulationError {
    /// Malformed input data or failed semantic validation.
    Loader(String),
    /// The operation is illegal for the current object state.
    InvalidState(String),
    /// A numeric value is outside its valid range.
    OutOfRange(String),
    /// Hardware or tasks were added after `Platform::finalize`.
    AlreadyFinalized,
    /// The job-arrival handler may only be installed once.
    HandlerAlreadySet,
    /// A scheduler refused to admit a server.
    Admission { requested: f64, available: f64 },
}

pub type SimResult<T> = Result<T, SimulationError>;

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loader(msg) =>
                write!(f, "loader error: {msg}"),
            Self::InvalidState(msg) =>
                write!(f, "invalid state: {msg}"),
            Self::OutOfRange(msg) =>
                write!(f, "out of range: {msg}"),
            Self::AlreadyFinalized =>
                write!(f, "platform topology is finalized, no hardware may be added"),
            Self::HandlerAlreadySet =>
                write!(f, "job arrival handler is already installed"),
            Self::Admission { requested, available } =>
                write!(f, "cannot admit server: requested utilization {requested} \
                           exceeds available capacity {available}"),
        }
    }
}

impl std::error::Error for SimulationError {}

impl SimulationError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }
}

// =============================================================================

#[test]
fn display_carries_admission_details() {
    let err = SimulationError::Admission { requested: 0.6, available: 0.4 };
    let msg = err.to_string();

    assert!(msg.contains("0.6"));
    assert!(msg.contains("0.4"));
}
