use crate::prelude::*;

/// A class of cores sharing a microarchitecture.
///
/// Performance is dimensionless and relative: the platform elects the type
/// with the highest performance as the reference, and work quantities are
/// expressed in that reference's units. Immutable after construction.
#[derive(Clone)]
#[derive(Debug)]
pub struct ProcessorType {
    id: ProcessorTypeId,
    name: String,
    performance: f64,
    context_switch_delay: Duration,
}

impl ProcessorType {
    pub(crate) fn new(
        id: ProcessorTypeId,
        name: impl Into<String>,
        performance: f64,
        context_switch_delay: Duration,
    ) -> Self {
        Self { id, name: name.into(), performance, context_switch_delay }
    }

    pub fn id(&self) -> ProcessorTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn performance(&self) -> f64 {
        self.performance
    }

    pub fn context_switch_delay(&self) -> Duration {
        self.context_switch_delay
    }
}

// =============================================================================

#[test]
fn construction() {
    let pt = ProcessorType::new(ProcessorTypeId(0), "big", 1.5, Duration::ZERO);

    assert_eq!(pt.id(), ProcessorTypeId(0));
    assert_eq!(pt.name(), "big");
    assert_eq!(pt.performance(), 1.5);
    assert!(pt.context_switch_delay().is_zero());
}
