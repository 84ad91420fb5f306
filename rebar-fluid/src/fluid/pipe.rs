//! Pipe types and the limits they put on a segment.

use std::sync::Arc;

use serde::Deserialize;

use crate::network::{FluidManager, FluidPredicate, SegmentId};

use super::{Fluid, FluidTemperature};

/// Settings of a pipe type.
///
/// Pipes don't move fluid themselves; they limit the segment they are part of.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipeSpec {
    /// How much fluid the pipe carries per second.
    pub fluid_per_second: f64,
    /// Temperatures the pipe can carry. `None` carries anything.
    #[serde(default)]
    pub allowed_temperatures: Option<Vec<FluidTemperature>>,
}

impl PipeSpec {
    /// Whether `fluid` may flow through this pipe.
    #[must_use]
    pub fn can_pass(&self, fluid: &Fluid) -> bool {
        match &self.allowed_temperatures {
            None => true,
            Some(allowed) => fluid
                .temperature()
                .is_some_and(|temperature| allowed.contains(&temperature)),
        }
    }

    /// The segment predicate for this pipe, if it restricts anything.
    #[must_use]
    pub fn predicate(&self) -> Option<FluidPredicate> {
        if self.allowed_temperatures.is_none() {
            return None;
        }
        let pipe = self.clone();
        Some(Arc::new(move |fluid: &Fluid| pipe.can_pass(fluid)))
    }

    /// Applies the pipe's limits to the segment it is in.
    pub fn apply(&self, manager: &FluidManager, segment: SegmentId) {
        manager.set_fluid_per_second(segment, self.fluid_per_second);
        manager.set_fluid_predicate(segment, self.predicate());
    }
}
