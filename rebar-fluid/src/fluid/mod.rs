//! Fluid types.
//!
//! Fluids aren't necessarily liquids; gases or anything else that flows through
//! a pipe is modelled the same way. A fluid is identified by its key alone, tags
//! only add information used by pipes and machines.

use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
    sync::Arc,
};

use rebar_utils::Identifier;
use serde::Deserialize;

mod pipe;

pub use pipe::PipeSpec;

/// How hot a fluid is. Pipes may only accept some temperatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluidTemperature {
    /// Cryogenic fluids.
    Cold,
    /// Room temperature fluids, e.g. water.
    Normal,
    /// Molten or boiling fluids, e.g. lava.
    Hot,
}

#[derive(Debug)]
struct FluidInner {
    key: Identifier,
    temperature: Option<FluidTemperature>,
}

/// A type of fluid. Cheap to clone; compared and hashed by key.
#[derive(Debug, Clone)]
pub struct Fluid(Arc<FluidInner>);

impl Fluid {
    /// Creates an untagged fluid.
    #[must_use]
    pub fn new(key: Identifier) -> Self {
        Self(Arc::new(FluidInner {
            key,
            temperature: None,
        }))
    }

    /// Creates a fluid tagged with a temperature.
    #[must_use]
    pub fn with_temperature(key: Identifier, temperature: FluidTemperature) -> Self {
        Self(Arc::new(FluidInner {
            key,
            temperature: Some(temperature),
        }))
    }

    /// The key identifying this fluid.
    #[must_use]
    pub fn key(&self) -> &Identifier {
        &self.0.key
    }

    /// The temperature tag, if the fluid has one.
    #[must_use]
    pub fn temperature(&self) -> Option<FluidTemperature> {
        self.0.temperature
    }
}

impl PartialEq for Fluid {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.key == other.0.key
    }
}

impl Eq for Fluid {}

impl Hash for Fluid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
    }
}

impl Display for Fluid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0.key, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_tags() {
        let a = Fluid::new(Identifier::new_static("rebar", "water"));
        let b = Fluid::with_temperature(
            Identifier::new_static("rebar", "water"),
            FluidTemperature::Normal,
        );
        let c = Fluid::new(Identifier::new_static("rebar", "lava"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "rebar:water");
    }
}
