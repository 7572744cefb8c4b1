//! EDF scheduling with CBS bandwidth servers and pluggable reclamation.

pub mod prelude {
    pub use super::edf::{AdmissionTest, DeadlineMissPolicy, EdfScheduler, SchedOutcome};
    pub use super::reclamation::{CbsPolicy, ReclamationPolicy, MIN_UTILIZATION};
    pub use super::grub::GrubPolicy;
    pub use super::cash::CashPolicy;
}

pub mod edf;
pub mod reclamation;
pub mod grub;
pub mod cash;
