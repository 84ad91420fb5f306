//! The blocks a fluid network talks to.
//!
//! The network never owns blocks. Each tick it looks up the block behind every
//! point through a [`BlockAccess`], asks it what it offers or wants, and tells it
//! what was actually moved.

use std::sync::Arc;

use rebar_utils::{BlockPos, ChunkPos};

use crate::fluid::Fluid;

mod source;
mod tank;
mod world;

pub use source::FluidSource;
pub use tank::FluidTank;
pub use world::FluidWorld;

/// A block with fluid points.
///
/// Queries return [`anyhow::Result`]; an error (or a panic) only skips this block
/// for the current tick.
pub trait FluidBlock: Send + Sync {
    /// The fluids this block can give away this tick, and how much of each.
    ///
    /// Called once per tick for each segment one of the block's output points is in.
    fn supplied_fluids(&self) -> anyhow::Result<Vec<(Fluid, f64)>> {
        Ok(Vec::new())
    }

    /// How much of `fluid` this block wants this tick.
    fn fluid_amount_requested(&self, _fluid: &Fluid) -> anyhow::Result<f64> {
        Ok(0.0)
    }

    /// `amount` of `fluid` was taken from this block.
    fn on_fluid_removed(&self, _fluid: &Fluid, _amount: f64) {}

    /// `amount` of `fluid` was given to this block.
    fn on_fluid_added(&self, _fluid: &Fluid, _amount: f64) {}
}

/// Access to the world the network lives in.
pub trait BlockAccess: Send + Sync {
    /// Whether the chunk is currently loaded.
    fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool;

    /// The fluid block at `pos`, if there is one.
    fn fluid_block(&self, pos: BlockPos) -> Option<Arc<dyn FluidBlock>>;
}
