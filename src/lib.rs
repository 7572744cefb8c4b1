pub mod prelude {
    pub use super::common::prelude::*;
    pub use super::errors::prelude::*;
    pub use super::hardware::prelude::*;
    pub use super::workload::prelude::*;
    pub use super::engine::prelude::*;
    pub use super::server::prelude::*;
    pub use super::sched::prelude::*;
    pub use super::power::prelude::*;
    pub use super::allocators::prelude::*;
    pub use super::simulation::prelude::*;
    pub use super::loaders::prelude::*;
    pub use super::output::prelude::*;
    pub use super::generator::prelude::*;
}

pub mod common;
pub mod errors;
pub mod hardware;
pub mod workload;
pub mod engine;
pub mod server;
pub mod sched;
pub mod power;
pub mod allocators;
pub mod simulation;
pub mod loaders;
pub mod output;
pub mod generator;
