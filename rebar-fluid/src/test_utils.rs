//! Helpers shared by the unit tests.

use std::sync::Arc;

use anyhow::bail;
use rebar_utils::{BlockPos, Identifier, locks::SyncMutex};

use crate::{
    block::{FluidBlock, FluidWorld},
    fluid::{Fluid, FluidTemperature},
};

pub(crate) fn water() -> Fluid {
    Fluid::with_temperature(
        Identifier::new_static("rebar", "water"),
        FluidTemperature::Normal,
    )
}

pub(crate) fn lava() -> Fluid {
    Fluid::with_temperature(Identifier::new_static("rebar", "lava"), FluidTemperature::Hot)
}

/// Block positions along the x axis, all in chunk (0, 0) for `x < 16`.
pub(crate) fn pos(x: i32) -> BlockPos {
    BlockPos::new(x, 64, 0)
}

#[derive(Default)]
enum Behaviour {
    #[default]
    Normal,
    Fails,
    Panics,
}

/// A block that offers and wants fixed amounts and records every transfer.
#[derive(Default)]
pub(crate) struct MockBlock {
    supply: Vec<(Fluid, f64)>,
    demand: Vec<(Fluid, f64)>,
    behaviour: Behaviour,
    removed: SyncMutex<Vec<(Fluid, f64)>>,
    added: SyncMutex<Vec<(Fluid, f64)>>,
}

impl MockBlock {
    pub(crate) fn supplying(supply: Vec<(Fluid, f64)>) -> Arc<Self> {
        Arc::new(Self {
            supply,
            ..Self::default()
        })
    }

    pub(crate) fn requesting(demand: Vec<(Fluid, f64)>) -> Arc<Self> {
        Arc::new(Self {
            demand,
            ..Self::default()
        })
    }

    /// Every query returns an error.
    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            behaviour: Behaviour::Fails,
            ..Self::default()
        })
    }

    /// Every query panics.
    pub(crate) fn panicking() -> Arc<Self> {
        Arc::new(Self {
            behaviour: Behaviour::Panics,
            ..Self::default()
        })
    }

    pub(crate) fn removed(&self) -> Vec<(Fluid, f64)> {
        self.removed.lock().clone()
    }

    pub(crate) fn added(&self) -> Vec<(Fluid, f64)> {
        self.added.lock().clone()
    }

    pub(crate) fn total_removed(&self) -> f64 {
        self.removed.lock().iter().map(|(_, amount)| amount).sum()
    }

    pub(crate) fn total_added(&self) -> f64 {
        self.added.lock().iter().map(|(_, amount)| amount).sum()
    }

    fn check(&self) -> anyhow::Result<()> {
        match self.behaviour {
            Behaviour::Normal => Ok(()),
            Behaviour::Fails => bail!("mock block refused to answer"),
            Behaviour::Panics => panic!("mock block exploded"),
        }
    }
}

impl FluidBlock for MockBlock {
    fn supplied_fluids(&self) -> anyhow::Result<Vec<(Fluid, f64)>> {
        self.check()?;
        Ok(self.supply.clone())
    }

    fn fluid_amount_requested(&self, fluid: &Fluid) -> anyhow::Result<f64> {
        self.check()?;
        Ok(self
            .demand
            .iter()
            .find(|(wanted, _)| wanted == fluid)
            .map_or(0.0, |(_, amount)| *amount))
    }

    fn on_fluid_removed(&self, fluid: &Fluid, amount: f64) {
        self.removed.lock().push((fluid.clone(), amount));
    }

    fn on_fluid_added(&self, fluid: &Fluid, amount: f64) {
        self.added.lock().push((fluid.clone(), amount));
    }
}

/// A world with every block placed and its chunk loaded.
pub(crate) fn world_with(blocks: &[(BlockPos, Arc<MockBlock>)]) -> Arc<FluidWorld> {
    let world = FluidWorld::new();
    for (pos, block) in blocks {
        world.place(*pos, block.clone());
    }
    Arc::new(world)
}

pub(crate) fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
