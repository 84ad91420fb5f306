//! Connection points.

use std::fmt::{self, Display};

use rebar_utils::BlockPos;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a [`FluidPoint`]. Assigned once at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointId(pub Uuid);

impl PointId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifies a segment. Points remember the id of the segment they were last
/// in, and rejoin it when added again while it is still alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// What a point does in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FluidPointType {
    /// Takes fluid out of the network, e.g. a machine's inlet.
    Input,
    /// Puts fluid into the network, e.g. a machine's outlet.
    Output,
    /// A pipe junction. Only carries connections.
    Intersection,
}

/// A point is a single connection in a fluid network, like a machine's output or
/// the end of a pipe.
///
/// Points are owned by the block that created them. The block hands the point to
/// the [`FluidManager`](crate::FluidManager) when it loads and gets it back when it
/// unloads, connections and all, so it can be persisted and added again later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FluidPoint {
    id: PointId,
    position: BlockPos,
    point_type: FluidPointType,
    pub(crate) connected_points: FxHashSet<PointId>,
    pub(crate) segment: SegmentId,
}

impl FluidPoint {
    /// Creates an unconnected point for the block at `position`.
    #[must_use]
    pub fn new(position: BlockPos, point_type: FluidPointType) -> Self {
        Self {
            id: PointId::random(),
            position,
            point_type,
            connected_points: FxHashSet::default(),
            segment: SegmentId::random(),
        }
    }

    /// The point's id.
    #[must_use]
    pub fn id(&self) -> PointId {
        self.id
    }

    /// The block this point belongs to.
    #[must_use]
    pub fn position(&self) -> BlockPos {
        self.position
    }

    /// Whether this is an input, output or intersection.
    #[must_use]
    pub fn point_type(&self) -> FluidPointType {
        self.point_type
    }

    /// Ids of every point directly linked to this one, loaded or not.
    #[must_use]
    pub fn connected_points(&self) -> &FxHashSet<PointId> {
        &self.connected_points
    }

    /// Whether `other` is directly linked to this point.
    #[must_use]
    pub fn is_connected_to(&self, other: PointId) -> bool {
        self.connected_points.contains(&other)
    }

    /// The segment this point was last assigned to.
    #[must_use]
    pub fn segment(&self) -> SegmentId {
        self.segment
    }
}
