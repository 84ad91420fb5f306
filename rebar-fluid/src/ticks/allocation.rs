//! One tick of a segment: moving fluid from its outputs to its inputs.
//!
//! A tick picks a single fluid, works out how much may move, then splits that
//! amount max-min fairly twice: once over the suppliers (who gives how much) and
//! once over the requesters (who gets how much). Parties asking for less than an
//! even share are satisfied in full first, whatever is left is split evenly among
//! the rest.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use rebar_utils::BlockPos;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    block::{BlockAccess, FluidBlock},
    config::FluidConfig,
    fluid::Fluid,
    network::{FluidPredicate, SegmentId},
};

/// Supplied amounts below this are ignored.
pub const SUPPLY_EPSILON: f64 = 1.0e-6;
/// Requested amounts below this are ignored.
pub const DEMAND_EPSILON: f64 = 1.0e-9;

/// Everything a tick needs to know about a segment, copied out of the network so
/// no lock is held while blocks are queried.
pub(crate) struct SegmentSnapshot {
    pub(crate) id: SegmentId,
    /// Positions of the live output points, in segment order.
    pub(crate) outputs: Vec<BlockPos>,
    /// Positions of the live input points, in segment order.
    pub(crate) inputs: Vec<BlockPos>,
    pub(crate) fluid_per_second: f64,
    pub(crate) predicate: Option<FluidPredicate>,
}

impl SegmentSnapshot {
    fn allows(&self, fluid: &Fluid) -> bool {
        self.predicate.as_ref().is_none_or(|predicate| predicate(fluid))
    }
}

/// What one tick of a segment moved.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// The segment that ticked.
    pub segment: SegmentId,
    /// The one fluid moved this tick.
    pub fluid: Fluid,
    /// Total taken from suppliers.
    pub supplied: f64,
    /// Total given to requesters.
    pub delivered: f64,
    /// How many blocks gave fluid.
    pub suppliers: usize,
    /// How many blocks received fluid.
    pub requesters: usize,
}

struct Party {
    pos: BlockPos,
    block: Arc<dyn FluidBlock>,
}

/// Splits `budget` between `parties` so nobody gets more than they asked for and
/// nobody who got less than they asked for gets less than anyone else.
///
/// Returns every party with its share, parties satisfied in full first.
pub(crate) fn share_fairly<K>(parties: Vec<(K, f64)>, budget: f64) -> Vec<(K, f64)> {
    let mut pending = parties;
    let mut shares = Vec::with_capacity(pending.len());
    let mut remaining = budget;

    loop {
        let mut drained_any = false;
        let mut i = 0;
        while i < pending.len() {
            let fair_share = remaining / pending.len() as f64;
            if pending[i].1 <= fair_share {
                let (key, amount) = pending.remove(i);
                remaining -= amount;
                shares.push((key, amount));
                drained_any = true;
            } else {
                i += 1;
            }
        }
        if !drained_any {
            break;
        }
    }

    if !pending.is_empty() {
        let share = (remaining / pending.len() as f64).max(0.0);
        shares.extend(pending.into_iter().map(|(key, _)| (key, share)));
    }
    shares
}

/// Runs one tick of `segment`. Returns `None` if nothing moved.
pub(crate) fn tick(
    segment: &SegmentSnapshot,
    world: &dyn BlockAccess,
    config: &FluidConfig,
) -> Option<TickReport> {
    let outputs = resolve(segment, world, &segment.outputs);
    if outputs.is_empty() {
        return None;
    }
    let supply = gather_supply(segment, &outputs);
    if supply.is_empty() {
        return None;
    }
    let inputs = resolve(segment, world, &segment.inputs);

    for (fluid, suppliers) in supply {
        if !segment.allows(&fluid) {
            continue;
        }

        let requesters = gather_demand(segment, &inputs, &fluid);
        if requesters.is_empty() {
            continue;
        }

        let total_requested: f64 = requesters.iter().map(|(_, amount)| amount).sum();
        let budget = total_requested.min(config.tick_budget(segment.fluid_per_second));

        let mut supplied = 0.0;
        let mut supplier_count = 0;
        for (party, amount) in share_fairly(suppliers, budget) {
            if amount <= 0.0 {
                continue;
            }
            notify(segment.id, party.pos, || {
                party.block.on_fluid_removed(&fluid, amount);
            });
            supplied += amount;
            supplier_count += 1;
        }

        let mut delivered = 0.0;
        let mut requester_count = 0;
        for (party, amount) in share_fairly(requesters, supplied) {
            if amount <= 0.0 {
                continue;
            }
            notify(segment.id, party.pos, || {
                party.block.on_fluid_added(&fluid, amount);
            });
            delivered += amount;
            requester_count += 1;
        }

        // Only one fluid moves per tick
        if supplier_count == 0 {
            return None;
        }

        log::trace!(
            "Segment {} moved {delivered} of {fluid} from {supplier_count} to {requester_count} blocks",
            segment.id
        );
        return Some(TickReport {
            segment: segment.id,
            fluid,
            supplied,
            delivered,
            suppliers: supplier_count,
            requesters: requester_count,
        });
    }

    None
}

/// Looks up the block behind every position, once per block.
fn resolve(segment: &SegmentSnapshot, world: &dyn BlockAccess, positions: &[BlockPos]) -> Vec<Party> {
    let mut seen = FxHashSet::default();
    let mut parties = Vec::with_capacity(positions.len());
    for &pos in positions {
        if !seen.insert(pos) {
            continue;
        }
        if !world.is_chunk_loaded(pos.chunk()) {
            log::debug!(
                "Segment {} skipped {pos}: chunk {} is not loaded",
                segment.id,
                pos.chunk()
            );
            continue;
        }
        let Some(block) = world.fluid_block(pos) else {
            log::warn!("Segment {} has a point at {pos} but no fluid block there", segment.id);
            continue;
        };
        parties.push(Party { pos, block });
    }
    parties
}

/// Collects what every output offers, grouped by fluid in discovery order.
fn gather_supply<'a>(
    segment: &SegmentSnapshot,
    outputs: &'a [Party],
) -> Vec<(Fluid, Vec<(&'a Party, f64)>)> {
    let mut supply: Vec<(Fluid, Vec<(&'a Party, f64)>)> = Vec::new();
    let mut index: FxHashMap<Fluid, usize> = FxHashMap::default();

    for party in outputs {
        let Some(supplied) = query(segment.id, party.pos, "supplied fluids", || {
            party.block.supplied_fluids()
        }) else {
            continue;
        };

        for (fluid, amount) in supplied {
            if amount.is_nan() || amount < SUPPLY_EPSILON {
                continue;
            }
            let i = *index.entry(fluid.clone()).or_insert_with(|| {
                supply.push((fluid, Vec::new()));
                supply.len() - 1
            });
            let suppliers = &mut supply[i].1;
            // The same block listing a fluid twice
            if let Some((_, total)) = suppliers
                .last_mut()
                .filter(|(block, _)| block.pos == party.pos)
            {
                *total += amount;
            } else {
                suppliers.push((party, amount));
            }
        }
    }
    supply
}

/// Asks every input how much of `fluid` it wants.
fn gather_demand<'a>(
    segment: &SegmentSnapshot,
    inputs: &'a [Party],
    fluid: &Fluid,
) -> Vec<(&'a Party, f64)> {
    inputs
        .iter()
        .filter_map(|party| {
            let amount = query(segment.id, party.pos, "requested amount", || {
                party.block.fluid_amount_requested(fluid)
            })?;
            (amount >= DEMAND_EPSILON).then_some((party, amount))
        })
        .collect()
}

/// Runs a block query, turning errors and panics into a skipped block.
fn query<T>(
    segment: SegmentId,
    pos: BlockPos,
    what: &str,
    f: impl FnOnce() -> anyhow::Result<T>,
) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            log::warn!("Fluid block at {pos} in segment {segment} failed to report {what}: {e:#}");
            None
        }
        Err(_) => {
            log::error!("Fluid block at {pos} in segment {segment} panicked while reporting {what}");
            None
        }
    }
}

/// Runs a block callback, containing any panic.
fn notify(segment: SegmentId, pos: BlockPos, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::error!("Fluid block at {pos} in segment {segment} panicked while receiving a transfer");
    }
}
