//! Segments: sets of connected points that share a ticker.

use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::fluid::Fluid;

use super::point::PointId;

/// Decides which fluids a segment is allowed to carry.
pub type FluidPredicate = Arc<dyn Fn(&Fluid) -> bool + Send + Sync>;

/// A connected set of points.
///
/// The flow rate and predicate survive merges and splits: whichever segment a
/// point ends up in is given the settings of the segment it was taken from.
#[derive(Clone)]
pub(crate) struct Segment {
    /// Live member points. Ordered so allocation visits them the same way every tick.
    pub(crate) points: BTreeSet<PointId>,
    /// Upper bound on how much fluid moves per real-time second.
    pub(crate) fluid_per_second: f64,
    /// Only fluids matching this may be moved. `None` allows everything.
    pub(crate) predicate: Option<FluidPredicate>,
}

impl Segment {
    /// An empty, unbounded segment.
    pub(crate) fn new() -> Self {
        Self {
            points: BTreeSet::new(),
            fluid_per_second: f64::INFINITY,
            predicate: None,
        }
    }

    /// An empty segment with the given settings.
    pub(crate) fn with_settings(fluid_per_second: f64, predicate: Option<FluidPredicate>) -> Self {
        Self {
            points: BTreeSet::new(),
            fluid_per_second,
            predicate,
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("points", &self.points)
            .field("fluid_per_second", &self.fluid_per_second)
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}
