//! Hardware model: processor types, clock domains, power domains, processors
//! and the platform arena that owns them all.

pub mod prelude {
    pub use super::processor_type::ProcessorType;
    pub use super::clock_domain::ClockDomain;
    pub use super::power_domain::{CState, CStateScope, PowerDomain};
    pub use super::processor::{Processor, ProcessorState};
    pub use super::platform::Platform;
}

pub mod processor_type;
pub mod clock_domain;
pub mod power_domain;
pub mod processor;
pub mod platform;
