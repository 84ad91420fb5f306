//! Segment ticking: when segments tick, and what a tick does.

pub(crate) mod allocation;
mod ticker;

pub use allocation::{DEMAND_EPSILON, SUPPLY_EPSILON, TickReport};
pub use ticker::TickDriver;
pub(crate) use ticker::Tickers;
