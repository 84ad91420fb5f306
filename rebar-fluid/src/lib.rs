//! # Rebar Fluid
//!
//! A fluid network simulation. Blocks expose connection points; points are linked
//! into segments; each segment periodically moves fluid from the blocks that
//! offer it to the blocks that want it, shared out fairly and limited by the
//! segment's rate and fluid filter.
//!
//! The entry point is [`FluidManager`].

pub mod block;
pub mod config;
pub mod fluid;
pub mod network;
pub mod ticks;

#[cfg(test)]
mod test_utils;

pub use block::{BlockAccess, FluidBlock, FluidSource, FluidTank, FluidWorld};
pub use config::{ConfigError, FluidConfig, REBAR_CONFIG};
pub use fluid::{Fluid, FluidTemperature, PipeSpec};
pub use network::{
    FluidManager, FluidPoint, FluidPointListener, FluidPointType, FluidPredicate, NetworkEvent,
    PointId, SegmentId,
};
pub use ticks::{TickDriver, TickReport};
