use crate::{config::FluidConfig, fluid::Fluid};

use super::FluidBlock;

/// An endless producer. Offers `fluid_per_second` worth of fluid every tick and
/// never runs dry.
#[derive(Debug, Clone)]
pub struct FluidSource {
    fluid: Fluid,
    fluid_per_second: f64,
    config: FluidConfig,
}

impl FluidSource {
    /// Creates a source producing `fluid_per_second` of `fluid`, scaled to the tick
    /// interval in `config`.
    #[must_use]
    pub fn new(fluid: Fluid, fluid_per_second: f64, config: FluidConfig) -> Self {
        Self {
            fluid,
            fluid_per_second,
            config,
        }
    }

    /// The fluid this source produces.
    #[must_use]
    pub fn fluid(&self) -> &Fluid {
        &self.fluid
    }
}

impl FluidBlock for FluidSource {
    fn supplied_fluids(&self) -> anyhow::Result<Vec<(Fluid, f64)>> {
        Ok(vec![(
            self.fluid.clone(),
            self.config.tick_budget(self.fluid_per_second),
        )])
    }
}

#[cfg(test)]
mod tests {
    use rebar_utils::Identifier;

    use super::*;

    #[test]
    fn test_supplies_one_tick_worth() {
        let water = Fluid::new(Identifier::rebar("water".to_owned()));
        let source = FluidSource::new(water.clone(), 4.0, FluidConfig::default());

        let supplied = source.supplied_fluids().expect("infallible");
        assert_eq!(supplied, vec![(water.clone(), 2.0)]);

        source.on_fluid_removed(&water, 2.0);
        assert_eq!(source.supplied_fluids().expect("infallible").len(), 1);
    }
}
