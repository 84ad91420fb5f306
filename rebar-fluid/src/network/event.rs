//! Network change notifications.
//!
//! Two flavours exist. [`FluidPointListener`]s are called synchronously while the
//! network is being changed and may veto a connect or disconnect. [`NetworkEvent`]s
//! are published after the fact on a broadcast channel for anyone who only wants
//! to observe.

use super::point::{FluidPoint, PointId, SegmentId};

/// Synchronous observer of connectivity changes.
///
/// Listeners are invoked while the manager's lock is held, so they must not call
/// back into the [`FluidManager`](crate::FluidManager).
pub trait FluidPointListener: Send + Sync {
    /// Called before two points are connected. Returning `false` cancels the
    /// connection and nothing changes.
    fn pre_connect(&self, _point1: &FluidPoint, _point2: &FluidPoint) -> bool {
        true
    }

    /// Called after two points have been connected.
    fn on_connect(&self, _point1: &FluidPoint, _point2: &FluidPoint) {}

    /// Called before two points are disconnected. Returning `false` cancels the
    /// disconnection and nothing changes.
    fn pre_disconnect(&self, _point1: &FluidPoint, _point2: &FluidPoint) -> bool {
        true
    }

    /// Called after two points have been disconnected.
    fn on_disconnect(&self, _point1: &FluidPoint, _point2: &FluidPoint) {}
}

/// Capacity of the [`NetworkEvent`] broadcast channel.
pub const EVENT_CAPACITY: usize = 256;

/// Something that happened to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// A segment was created and its ticker started.
    SegmentCreated(SegmentId),
    /// A segment lost its last point and its ticker was stopped.
    SegmentRemoved(SegmentId),
    /// Two points were linked.
    PointsConnected {
        /// First point passed to `connect`.
        point1: PointId,
        /// Second point passed to `connect`; its segment survived any merge.
        point2: PointId,
    },
    /// Two points were unlinked.
    PointsDisconnected {
        /// First point passed to `disconnect`.
        point1: PointId,
        /// Second point passed to `disconnect`.
        point2: PointId,
        /// The segment split off for `point1`'s side, if the link was the last
        /// path between the two points.
        split: Option<SegmentId>,
    },
}
