//! The fluid network.
//!
//! Points are linked into a graph by [`FluidManager::connect`]. Every connected
//! component of live points is a segment, and every segment has a ticker that
//! periodically moves fluid between the segment's outputs and inputs.
//!
//! Segments are maintained incrementally. Connecting two points from different
//! segments moves everything reachable from the first point into the second
//! point's segment; disconnecting them splits off a new segment if the second
//! point can no longer be reached from the first. Membership is always recomputed
//! by walking the graph from one side, which keeps things simple when only parts
//! of a network are loaded.
//!
//! Points in unloaded chunks are taken out with [`FluidManager::unload`]. They keep
//! their links, so adding them again later reconnects them to whatever
//! neighbours are loaded at that point.

use std::{collections::VecDeque, mem, sync::Arc};

use rebar_utils::locks::{SyncMutex, SyncMutexGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::broadcast;

use crate::{
    block::BlockAccess,
    config::FluidConfig,
    ticks::{
        TickDriver, TickReport, Tickers,
        allocation::{self, SegmentSnapshot},
    },
};

mod event;
mod point;
mod segment;

pub use event::{EVENT_CAPACITY, FluidPointListener, NetworkEvent};
pub use point::{FluidPoint, FluidPointType, PointId, SegmentId};
pub use segment::FluidPredicate;
use segment::Segment;

/// Everything guarded by the manager's lock.
struct NetworkState {
    /// Live points.
    points: FxHashMap<PointId, FluidPoint>,
    segments: FxHashMap<SegmentId, Segment>,
    tickers: Tickers,
    /// Published once the lock is released.
    pending_events: Vec<NetworkEvent>,
}

impl NetworkState {
    fn live(&self, id: PointId) -> &FluidPoint {
        self.points
            .get(&id)
            .unwrap_or_else(|| panic!("Point {id} is not in the network"))
    }

    fn live_mut(&mut self, id: PointId) -> &mut FluidPoint {
        self.points
            .get_mut(&id)
            .unwrap_or_else(|| panic!("Point {id} is not in the network"))
    }

    fn segment(&self, id: SegmentId) -> &Segment {
        self.segments
            .get(&id)
            .unwrap_or_else(|| panic!("Segment {id} does not exist"))
    }

    fn segment_mut(&mut self, id: SegmentId) -> &mut Segment {
        self.segments
            .get_mut(&id)
            .unwrap_or_else(|| panic!("Segment {id} does not exist"))
    }

    fn create_segment(&mut self, id: SegmentId, segment: Segment) {
        let previous = self.segments.insert(id, segment);
        assert!(previous.is_none(), "Segment {id} already exists");
        self.tickers.start(id);
        self.pending_events.push(NetworkEvent::SegmentCreated(id));
        log::debug!("Created segment {id}");
    }

    /// Removes `point` from `segment`, deleting the segment if it is now empty.
    fn remove_from_segment(&mut self, point: PointId, segment: SegmentId) {
        let members = &mut self.segment_mut(segment).points;
        members.remove(&point);
        if members.is_empty() {
            self.segments.remove(&segment);
            self.tickers.stop(segment);
            self.pending_events.push(NetworkEvent::SegmentRemoved(segment));
            log::debug!("Removed segment {segment}");
        }
    }

    fn move_to_segment(&mut self, point: PointId, segment: SegmentId) {
        let current = self.live(point).segment;
        if current == segment {
            return;
        }
        self.segment_mut(segment).points.insert(point);
        self.live_mut(point).segment = segment;
        self.remove_from_segment(point, current);
    }

    /// Takes a point out of the live index and its segment, links untouched.
    fn take(&mut self, id: PointId) -> FluidPoint {
        let Some(point) = self.points.remove(&id) else {
            panic!("Point {id} is not in the network");
        };
        self.remove_from_segment(id, point.segment);
        point
    }

    /// Ids of the live points linked to `point`, sorted.
    fn live_neighbours(&self, point: &FluidPoint) -> Vec<PointId> {
        let mut neighbours: Vec<PointId> = point
            .connected_points
            .iter()
            .copied()
            .filter(|other| self.points.contains_key(other))
            .collect();
        neighbours.sort_unstable();
        neighbours
    }

    /// Breadth-first search over links between live points.
    fn get_all_connected(&self, start: PointId) -> FxHashSet<PointId> {
        let mut visited = FxHashSet::default();
        visited.insert(start);
        let mut queue = VecDeque::from([start]);

        while let Some(id) = queue.pop_front() {
            let Some(point) = self.points.get(&id) else {
                continue;
            };
            for &next in &point.connected_points {
                if self.points.contains_key(&next) && visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        visited
    }

    fn snapshot(&self, id: SegmentId) -> Option<SegmentSnapshot> {
        let segment = self.segments.get(&id)?;
        let mut outputs = Vec::new();
        let mut inputs = Vec::new();
        for point in segment.points.iter().filter_map(|p| self.points.get(p)) {
            match point.point_type() {
                FluidPointType::Output => outputs.push(point.position()),
                FluidPointType::Input => inputs.push(point.position()),
                FluidPointType::Intersection => {}
            }
        }
        Some(SegmentSnapshot {
            id,
            outputs,
            inputs,
            fluid_per_second: segment.fluid_per_second,
            predicate: segment.predicate.clone(),
        })
    }
}

/// Owns every live point and segment, and the tickers that move fluid through them.
///
/// All mutation goes through one lock, so connectivity changes never interleave
/// with each other or with a tick reading segment membership. Ticks only hold
/// the lock while copying what they need; blocks are queried without it.
///
/// A tick works on the membership it copied. A point removed or unloaded while
/// its segment is mid-tick may still have its block drawn from or filled by that
/// tick; the next tick no longer sees it.
pub struct FluidManager {
    config: FluidConfig,
    world: Arc<dyn BlockAccess>,
    listeners: Vec<Arc<dyn FluidPointListener>>,
    events: broadcast::Sender<NetworkEvent>,
    state: SyncMutex<NetworkState>,
}

impl FluidManager {
    /// Creates an empty network.
    ///
    /// `world` resolves the blocks behind points during ticks. With
    /// [`TickDriver::Runtime`] every segment gets a tokio task ticking it once per
    /// [`FluidConfig::tick_period`].
    #[must_use]
    pub fn new(
        config: FluidConfig,
        world: Arc<dyn BlockAccess>,
        driver: TickDriver,
        listeners: Vec<Arc<dyn FluidPointListener>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|manager| {
            let (events, _) = broadcast::channel(EVENT_CAPACITY);
            Self {
                config,
                world,
                listeners,
                events,
                state: SyncMutex::new(NetworkState {
                    points: FxHashMap::default(),
                    segments: FxHashMap::default(),
                    tickers: Tickers::new(driver, config.tick_period(), manager.clone()),
                    pending_events: Vec::new(),
                }),
            }
        })
    }

    /// The configuration the network was created with.
    #[must_use]
    pub fn config(&self) -> &FluidConfig {
        &self.config
    }

    /// Receives every [`NetworkEvent`] published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }

    fn publish(&self, mut state: SyncMutexGuard<'_, NetworkState>) {
        let events = mem::take(&mut state.pending_events);
        drop(state);
        for event in events {
            // Nobody listening is fine
            let _ = self.events.send(event);
        }
    }

    /// Adds a point to the segment it was last assigned to, then connects it to
    /// every live point it is linked to.
    ///
    /// The segment is created, unbounded, if it no longer exists. A point that was
    /// unloaded earlier rejoins its loaded neighbours this way, and a segment that
    /// stayed alive meanwhile keeps its rate and predicate.
    ///
    /// # Panics
    /// Panics if the point is already in the network.
    pub fn add(&self, point: FluidPoint) {
        let mut state = self.state.lock();
        let id = point.id();
        assert!(
            !state.points.contains_key(&id),
            "Point {id} is already in the network"
        );

        let neighbours = state.live_neighbours(&point);
        let segment = point.segment;
        state.points.insert(id, point);
        if !state.segments.contains_key(&segment) {
            state.create_segment(segment, Segment::new());
        }
        state.segment_mut(segment).points.insert(id);
        log::trace!("Added point {id}");

        for other in neighbours {
            self.connect_locked(&mut state, id, other);
        }
        self.publish(state);
    }

    /// Removes a point for good, disconnecting it from every live neighbour first.
    ///
    /// # Panics
    /// Panics if the point is not in the network.
    pub fn remove(&self, point: PointId) -> FluidPoint {
        let mut state = self.state.lock();
        let neighbours = state.live_neighbours(state.live(point));
        for other in neighbours {
            self.disconnect_locked(&mut state, point, other);
        }
        let removed = state.take(point);
        log::trace!("Removed point {point}");
        self.publish(state);
        removed
    }

    /// Takes a point out of the network without touching its links, so it can be
    /// added again when its chunk loads.
    ///
    /// # Panics
    /// Panics if the point is not in the network.
    pub fn unload(&self, point: PointId) -> FluidPoint {
        let mut state = self.state.lock();
        let unloaded = state.take(point);
        log::trace!("Unloaded point {point}");
        self.publish(state);
        unloaded
    }

    /// Links two points, merging `point1`'s side into `point2`'s segment.
    ///
    /// The merged segment keeps `point2`'s segment id, but takes the rate of
    /// `point1`'s segment, and its predicate too if it has one. Returns `false` if a
    /// listener cancelled the connection.
    ///
    /// # Panics
    /// Panics if either point is not in the network or both are the same point.
    pub fn connect(&self, point1: PointId, point2: PointId) -> bool {
        let mut state = self.state.lock();
        let connected = self.connect_locked(&mut state, point1, point2);
        self.publish(state);
        connected
    }

    fn connect_locked(&self, state: &mut NetworkState, p1: PointId, p2: PointId) -> bool {
        assert_ne!(p1, p2, "Cannot connect point {p1} to itself");
        let segment1 = state.live(p1).segment;
        let segment2 = state.live(p2).segment;
        assert!(
            state.segments.contains_key(&segment1) && state.segments.contains_key(&segment2),
            "Cannot connect {p1} and {p2}: segment does not exist"
        );

        if !self
            .listeners
            .iter()
            .all(|listener| listener.pre_connect(state.live(p1), state.live(p2)))
        {
            log::debug!("Connecting {p1} to {p2} was cancelled");
            return false;
        }

        if segment1 != segment2 {
            let source = state.segment(segment1);
            let fluid_per_second = source.fluid_per_second;
            let predicate = source.predicate.clone();

            for point in state.get_all_connected(p1) {
                state.move_to_segment(point, segment2);
            }

            let merged = state.segment_mut(segment2);
            merged.fluid_per_second = fluid_per_second;
            if predicate.is_some() {
                merged.predicate = predicate;
            }
            log::debug!("Merged segment {segment1} into {segment2}");
        }

        state.live_mut(p1).connected_points.insert(p2);
        state.live_mut(p2).connected_points.insert(p1);

        for listener in &self.listeners {
            listener.on_connect(state.live(p1), state.live(p2));
        }
        state.pending_events.push(NetworkEvent::PointsConnected {
            point1: p1,
            point2: p2,
        });
        true
    }

    /// Unlinks two points. If `point2` is no longer reachable from `point1`,
    /// everything still reachable from `point1` moves to a new segment with the
    /// same rate and predicate. Returns `false` if a listener cancelled it.
    ///
    /// # Panics
    /// Panics if either point is not in the network or they aren't linked.
    pub fn disconnect(&self, point1: PointId, point2: PointId) -> bool {
        let mut state = self.state.lock();
        let disconnected = self.disconnect_locked(&mut state, point1, point2);
        self.publish(state);
        disconnected
    }

    fn disconnect_locked(&self, state: &mut NetworkState, p1: PointId, p2: PointId) -> bool {
        let point1 = state.live(p1);
        let point2 = state.live(p2);
        let segment1 = point1.segment;
        assert!(
            state.segments.contains_key(&segment1) && state.segments.contains_key(&point2.segment),
            "Cannot disconnect {p1} and {p2}: segment does not exist"
        );
        assert!(
            point1.is_connected_to(p2) && point2.is_connected_to(p1),
            "Points {p1} and {p2} are not connected"
        );

        if !self
            .listeners
            .iter()
            .all(|listener| listener.pre_disconnect(point1, point2))
        {
            log::debug!("Disconnecting {p1} from {p2} was cancelled");
            return false;
        }

        state.live_mut(p1).connected_points.remove(&p2);
        state.live_mut(p2).connected_points.remove(&p1);

        let reachable = state.get_all_connected(p1);
        let split = if reachable.contains(&p2) {
            None
        } else {
            let old = state.segment(segment1);
            let segment = Segment::with_settings(old.fluid_per_second, old.predicate.clone());
            let id = SegmentId::random();
            state.create_segment(id, segment);
            for point in reachable {
                state.move_to_segment(point, id);
            }
            log::debug!("Split segment {id} off {segment1}");
            Some(id)
        };

        for listener in &self.listeners {
            listener.on_disconnect(state.live(p1), state.live(p2));
        }
        state.pending_events.push(NetworkEvent::PointsDisconnected {
            point1: p1,
            point2: p2,
            split,
        });
        true
    }

    /// Every live point reachable from `point` over links between live points,
    /// `point` included.
    ///
    /// # Panics
    /// Panics if the point is not in the network.
    #[must_use]
    pub fn get_all_connected(&self, point: PointId) -> FxHashSet<PointId> {
        let state = self.state.lock();
        state.live(point);
        state.get_all_connected(point)
    }

    /// Caps how much fluid `segment` moves per second.
    ///
    /// # Panics
    /// Panics if the segment doesn't exist or the rate is negative.
    pub fn set_fluid_per_second(&self, segment: SegmentId, fluid_per_second: f64) {
        assert!(
            fluid_per_second >= 0.0,
            "Fluid per second must not be negative, got {fluid_per_second}"
        );
        self.state.lock().segment_mut(segment).fluid_per_second = fluid_per_second;
    }

    /// The rate cap of `segment`; unbounded by default.
    ///
    /// # Panics
    /// Panics if the segment doesn't exist.
    #[must_use]
    pub fn fluid_per_second(&self, segment: SegmentId) -> f64 {
        self.state.lock().segment(segment).fluid_per_second
    }

    /// Restricts which fluids `segment` carries. `None` allows everything.
    ///
    /// # Panics
    /// Panics if the segment doesn't exist.
    pub fn set_fluid_predicate(&self, segment: SegmentId, predicate: Option<FluidPredicate>) {
        self.state.lock().segment_mut(segment).predicate = predicate;
    }

    /// The predicate of `segment`, if it has one.
    ///
    /// # Panics
    /// Panics if the segment doesn't exist.
    #[must_use]
    pub fn fluid_predicate(&self, segment: SegmentId) -> Option<FluidPredicate> {
        self.state.lock().segment(segment).predicate.clone()
    }

    /// A copy of the live point with this id.
    #[must_use]
    pub fn get(&self, point: PointId) -> Option<FluidPoint> {
        self.state.lock().points.get(&point).cloned()
    }

    /// Whether the point is in the network.
    #[must_use]
    pub fn is_live(&self, point: PointId) -> bool {
        self.state.lock().points.contains_key(&point)
    }

    /// The segment a live point is in.
    #[must_use]
    pub fn segment_of(&self, point: PointId) -> Option<SegmentId> {
        self.state.lock().points.get(&point).map(FluidPoint::segment)
    }

    /// The points of one type in `segment`, in segment order.
    ///
    /// # Panics
    /// Panics if the segment doesn't exist.
    #[must_use]
    pub fn points_in(&self, segment: SegmentId, point_type: FluidPointType) -> Vec<PointId> {
        let state = self.state.lock();
        state
            .segment(segment)
            .points
            .iter()
            .copied()
            .filter(|id| state.live(*id).point_type() == point_type)
            .collect()
    }

    /// Ids of all live segments, sorted.
    #[must_use]
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        let mut ids: Vec<SegmentId> = self.state.lock().segments.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// How many segments exist.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.state.lock().segments.len()
    }

    /// How many points are live.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.state.lock().points.len()
    }

    /// Whether `segment` has a ticker.
    #[must_use]
    pub fn has_ticker(&self, segment: SegmentId) -> bool {
        self.state.lock().tickers.contains(segment)
    }

    /// Runs one tick of `segment`. Returns `None` if it no longer exists or
    /// nothing moved.
    pub fn tick_segment(&self, segment: SegmentId) -> Option<TickReport> {
        let snapshot = self.state.lock().snapshot(segment)?;
        allocation::tick(&snapshot, self.world.as_ref(), &self.config)
    }

    /// Runs one tick of every segment, for hosts using [`TickDriver::Manual`].
    pub fn tick_all(&self) -> Vec<TickReport> {
        self.segment_ids()
            .into_iter()
            .filter_map(|segment| self.tick_segment(segment))
            .collect()
    }

    /// Stops every ticker and waits for running ticks to finish.
    ///
    /// Segments created afterwards get tickers that never tick.
    pub async fn shutdown(&self) {
        let tasks = self.state.lock().tickers.shutdown();
        tasks.wait().await;
        log::debug!("Fluid network stopped");
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let state = self.state.lock();
        for (id, point) in &state.points {
            let segment = state.segment(point.segment);
            assert!(
                segment.points.contains(id),
                "Point {id} is missing from its segment {}",
                point.segment
            );
        }
        for (id, segment) in &state.segments {
            assert!(!segment.points.is_empty(), "Segment {id} is empty");
            assert!(state.tickers.contains(*id), "Segment {id} has no ticker");
            for point in &segment.points {
                assert_eq!(state.live(*point).segment, *id);
            }
        }
        assert_eq!(state.tickers.len(), state.segments.len());
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, iter, time::Duration};

    use tokio::{runtime::Handle, sync::broadcast::error::TryRecvError, time};

    use super::*;
    use crate::{
        block::{FluidSource, FluidTank, FluidWorld},
        fluid::{Fluid, PipeSpec},
        test_utils::{assert_close, pos, water},
    };

    fn manager() -> Arc<FluidManager> {
        FluidManager::new(
            FluidConfig::default(),
            Arc::new(FluidWorld::new()),
            TickDriver::Manual,
            Vec::new(),
        )
    }

    fn manager_with(listener: Arc<dyn FluidPointListener>) -> Arc<FluidManager> {
        FluidManager::new(
            FluidConfig::default(),
            Arc::new(FluidWorld::new()),
            TickDriver::Manual,
            vec![listener],
        )
    }

    fn add(manager: &FluidManager, x: i32) -> PointId {
        let point = FluidPoint::new(pos(x), FluidPointType::Intersection);
        let id = point.id();
        manager.add(point);
        id
    }

    /// A chain of `len` linked points.
    fn line(manager: &FluidManager, len: i32) -> Vec<PointId> {
        let ids: Vec<PointId> = (0..len).map(|x| add(manager, x)).collect();
        for pair in ids.windows(2) {
            assert!(manager.connect(pair[0], pair[1]));
        }
        ids
    }

    fn segment(manager: &FluidManager, point: PointId) -> SegmentId {
        manager.segment_of(point).expect("point is live")
    }

    #[derive(Default)]
    struct Recorder {
        veto_connect: bool,
        veto_disconnect: bool,
        connected: SyncMutex<Vec<(PointId, PointId)>>,
        disconnected: SyncMutex<Vec<(PointId, PointId)>>,
    }

    impl FluidPointListener for Recorder {
        fn pre_connect(&self, _point1: &FluidPoint, _point2: &FluidPoint) -> bool {
            !self.veto_connect
        }

        fn on_connect(&self, point1: &FluidPoint, point2: &FluidPoint) {
            assert!(point1.is_connected_to(point2.id()));
            self.connected.lock().push((point1.id(), point2.id()));
        }

        fn pre_disconnect(&self, _point1: &FluidPoint, _point2: &FluidPoint) -> bool {
            !self.veto_disconnect
        }

        fn on_disconnect(&self, point1: &FluidPoint, point2: &FluidPoint) {
            self.disconnected.lock().push((point1.id(), point2.id()));
        }
    }

    #[test]
    fn test_add_creates_segment_with_ticker() {
        let manager = manager();
        let a = add(&manager, 0);

        let segment = segment(&manager, a);
        assert_eq!(manager.segment_count(), 1);
        assert_eq!(manager.point_count(), 1);
        assert!(manager.has_ticker(segment));
        assert!(manager.fluid_per_second(segment).is_infinite());
        assert!(manager.fluid_predicate(segment).is_none());
        manager.check_invariants();
    }

    #[test]
    fn test_merge_keeps_second_segment_and_first_settings() {
        let manager = manager();
        let a = add(&manager, 0);
        let b = add(&manager, 1);
        let segment_a = segment(&manager, a);
        let segment_b = segment(&manager, b);
        manager.set_fluid_per_second(segment_a, 3.0);
        manager.set_fluid_per_second(segment_b, 7.0);

        assert!(manager.connect(a, b));

        assert_eq!(segment(&manager, a), segment_b);
        assert_eq!(segment(&manager, b), segment_b);
        assert_eq!(manager.segment_ids(), vec![segment_b]);
        assert!(!manager.has_ticker(segment_a));
        assert_close(manager.fluid_per_second(segment_b), 3.0);
        manager.check_invariants();
    }

    #[test]
    fn test_merge_keeps_predicate_if_first_has_none() {
        let manager = manager();
        let a = add(&manager, 0);
        let b = add(&manager, 1);
        let segment_b = segment(&manager, b);
        manager.set_fluid_predicate(segment_b, Some(Arc::new(|_: &Fluid| false)));

        assert!(manager.connect(a, b));

        let predicate = manager.fluid_predicate(segment_b).expect("predicate kept");
        assert!(!predicate(&water()));
    }

    #[test]
    fn test_merge_moves_whole_component() {
        let manager = manager();
        let left = line(&manager, 3);
        let right = line(&manager, 3);
        let target = segment(&manager, right[0]);

        assert!(manager.connect(left[2], right[0]));

        assert_eq!(manager.segment_count(), 1);
        for id in left.iter().chain(&right) {
            assert_eq!(segment(&manager, *id), target);
        }
        manager.check_invariants();
    }

    #[test]
    fn test_split_on_last_link() {
        let manager = manager();
        let ids = line(&manager, 4);
        let original = segment(&manager, ids[0]);
        manager.set_fluid_per_second(original, 4.0);

        assert!(manager.disconnect(ids[1], ids[2]));

        assert_eq!(manager.segment_count(), 2);
        let split = segment(&manager, ids[0]);
        assert_ne!(split, original);
        assert_eq!(segment(&manager, ids[1]), split);
        assert_eq!(segment(&manager, ids[2]), original);
        assert_eq!(segment(&manager, ids[3]), original);
        assert_close(manager.fluid_per_second(split), 4.0);

        let mut all: BTreeSet<PointId> = manager
            .points_in(split, FluidPointType::Intersection)
            .into_iter()
            .collect();
        let rest = manager.points_in(original, FluidPointType::Intersection);
        assert_eq!(all.len() + rest.len(), 4);
        all.extend(rest);
        assert_eq!(all, ids.iter().copied().collect());
        manager.check_invariants();
    }

    #[test]
    fn test_no_split_with_alternate_path() {
        let manager = manager();
        let ids = line(&manager, 3);
        assert!(manager.connect(ids[2], ids[0]));
        let before = segment(&manager, ids[0]);

        assert!(manager.disconnect(ids[0], ids[1]));

        assert_eq!(manager.segment_ids(), vec![before]);
        assert!(!manager.get(ids[0]).expect("live").is_connected_to(ids[1]));
        assert_eq!(manager.get_all_connected(ids[0]).len(), 3);
        manager.check_invariants();
    }

    #[test]
    fn test_reload_rejoins_neighbours() {
        let manager = manager();
        let ids = line(&manager, 3);
        let before = segment(&manager, ids[0]);

        let middle = manager.unload(ids[1]);
        assert!(!manager.is_live(ids[1]));
        assert!(middle.is_connected_to(ids[0]) && middle.is_connected_to(ids[2]));
        assert_eq!(manager.segment_count(), 1);
        manager.check_invariants();

        manager.add(middle);

        assert_eq!(manager.segment_ids(), vec![before]);
        assert_eq!(segment(&manager, ids[1]), before);
        let reloaded = manager.get(ids[1]).expect("live");
        assert!(reloaded.is_connected_to(ids[0]) && reloaded.is_connected_to(ids[2]));
        manager.check_invariants();
    }

    #[test]
    fn test_partial_loading_in_any_order() {
        let manager = manager();
        let ids = line(&manager, 3);
        let points: Vec<FluidPoint> = ids.iter().map(|id| manager.unload(*id)).collect();
        assert_eq!(manager.segment_count(), 0);
        assert_eq!(manager.point_count(), 0);

        let [a, b, c]: [FluidPoint; 3] = points.try_into().expect("three points");
        let before = c.segment();
        manager.add(c);
        manager.add(a);
        // Not linked yet, but back in the segment they left
        assert_eq!(manager.segment_ids(), vec![before]);
        assert_eq!(manager.get_all_connected(ids[0]).len(), 1);
        manager.check_invariants();

        manager.add(b);
        assert_eq!(manager.segment_ids(), vec![before]);
        assert_eq!(manager.get_all_connected(ids[0]).len(), 3);
        manager.check_invariants();
    }

    #[test]
    fn test_reload_keeps_segment_limits() {
        let manager = manager();
        let source = FluidPoint::new(pos(0), FluidPointType::Output);
        let pipe = FluidPoint::new(pos(1), FluidPointType::Intersection);
        let sink = FluidPoint::new(pos(2), FluidPointType::Input);
        let (source, pipe, sink) = {
            let ids = (source.id(), pipe.id(), sink.id());
            manager.add(source);
            manager.add(pipe);
            manager.add(sink);
            ids
        };
        assert!(manager.connect(source, pipe));
        assert!(manager.connect(sink, pipe));
        let before = segment(&manager, pipe);
        manager.set_fluid_per_second(before, 1.0);
        manager.set_fluid_predicate(before, Some(Arc::new(|_: &Fluid| false)));

        let point = manager.unload(sink);
        manager.add(point);

        assert_eq!(manager.segment_ids(), vec![before]);
        assert_eq!(segment(&manager, sink), before);
        assert_close(manager.fluid_per_second(before), 1.0);
        let predicate = manager.fluid_predicate(before).expect("predicate kept");
        assert!(!predicate(&water()));
        manager.check_invariants();
    }

    #[test]
    fn test_reload_after_whole_segment_unloaded_recreates_it() {
        let manager = manager();
        let ids = line(&manager, 2);
        let before = segment(&manager, ids[0]);
        manager.set_fluid_per_second(before, 1.0);

        let points: Vec<FluidPoint> = ids.iter().map(|id| manager.unload(*id)).collect();
        assert_eq!(manager.segment_count(), 0);
        for point in points {
            manager.add(point);
        }

        assert_eq!(manager.segment_ids(), vec![before]);
        assert!(manager.has_ticker(before));
        assert!(manager.fluid_per_second(before).is_infinite());
        manager.check_invariants();
    }

    #[test]
    fn test_remove_severs_links() {
        let manager = manager();
        let ids = line(&manager, 3);

        let removed = manager.remove(ids[1]);

        assert!(removed.connected_points().is_empty());
        assert!(!manager.is_live(ids[1]));
        assert_eq!(manager.segment_count(), 2);
        assert_ne!(segment(&manager, ids[0]), segment(&manager, ids[2]));
        assert!(manager.get(ids[0]).expect("live").connected_points().is_empty());
        manager.check_invariants();
    }

    #[test]
    fn test_listeners_can_veto() {
        let listener = Arc::new(Recorder {
            veto_connect: true,
            ..Recorder::default()
        });
        let manager = manager_with(listener.clone());
        let a = add(&manager, 0);
        let b = add(&manager, 1);

        assert!(!manager.connect(a, b));

        assert_eq!(manager.segment_count(), 2);
        assert!(!manager.get(a).expect("live").is_connected_to(b));
        assert!(listener.connected.lock().is_empty());
        manager.check_invariants();
    }

    #[test]
    fn test_listeners_can_veto_disconnect() {
        let listener = Arc::new(Recorder {
            veto_disconnect: true,
            ..Recorder::default()
        });
        let manager = manager_with(listener.clone());
        let ids = line(&manager, 2);

        assert!(!manager.disconnect(ids[0], ids[1]));

        assert_eq!(manager.segment_count(), 1);
        assert_eq!(*listener.connected.lock(), vec![(ids[0], ids[1])]);
        assert!(listener.disconnected.lock().is_empty());
    }

    #[test]
    fn test_events_are_published() {
        let manager = manager();
        let mut events = manager.subscribe();
        let a = add(&manager, 0);
        let b = add(&manager, 1);
        let segment_a = segment(&manager, a);
        let segment_b = segment(&manager, b);

        assert!(manager.connect(a, b));
        assert!(manager.disconnect(a, b));
        let split = segment(&manager, a);

        let received: Vec<NetworkEvent> = iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(
            received,
            vec![
                NetworkEvent::SegmentCreated(segment_a),
                NetworkEvent::SegmentCreated(segment_b),
                NetworkEvent::SegmentRemoved(segment_a),
                NetworkEvent::PointsConnected {
                    point1: a,
                    point2: b
                },
                NetworkEvent::SegmentCreated(split),
                NetworkEvent::PointsDisconnected {
                    point1: a,
                    point2: b,
                    split: Some(split)
                },
            ]
        );
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    #[should_panic(expected = "already in the network")]
    fn test_add_twice_panics() {
        let manager = manager();
        let point = FluidPoint::new(pos(0), FluidPointType::Input);
        manager.add(point.clone());
        manager.add(point);
    }

    #[test]
    #[should_panic(expected = "are not connected")]
    fn test_disconnect_unlinked_panics() {
        let manager = manager();
        let a = add(&manager, 0);
        let b = add(&manager, 1);
        manager.disconnect(a, b);
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn test_unknown_segment_panics() {
        let manager = manager();
        manager.set_fluid_per_second(SegmentId::random(), 1.0);
    }

    #[test]
    fn test_tick_all_moves_fluid_through_pipe() {
        let config = FluidConfig::default();
        let world = Arc::new(FluidWorld::new());
        world.place(pos(0), Arc::new(FluidSource::new(water(), 4.0, config)));
        let tank = Arc::new(FluidTank::new(100.0));
        world.place(pos(2), tank.clone());
        let manager = FluidManager::new(config, world, TickDriver::Manual, Vec::new());

        let source = FluidPoint::new(pos(0), FluidPointType::Output);
        let pipe = FluidPoint::new(pos(1), FluidPointType::Intersection);
        let sink = FluidPoint::new(pos(2), FluidPointType::Input);
        let (source, pipe, sink) = {
            let ids = (source.id(), pipe.id(), sink.id());
            manager.add(source);
            manager.add(pipe);
            manager.add(sink);
            ids
        };
        assert!(manager.connect(source, pipe));
        assert!(manager.connect(sink, pipe));

        let limits = PipeSpec {
            fluid_per_second: 1.0,
            allowed_temperatures: None,
        };
        limits.apply(&manager, segment(&manager, pipe));

        let reports = manager.tick_all();
        assert_eq!(reports.len(), 1);
        assert_close(reports[0].delivered, 0.5);
        assert_close(tank.fluid_amount(), 0.5);
        assert_eq!(tank.fluid_type(), Some(water()));
    }

    #[test]
    fn test_tick_uses_membership_it_copied() {
        let config = FluidConfig::default();
        let world = Arc::new(FluidWorld::new());
        world.place(pos(0), Arc::new(FluidSource::new(water(), 4.0, config)));
        let tank = Arc::new(FluidTank::new(100.0));
        world.place(pos(1), tank.clone());
        let manager = FluidManager::new(config, world.clone(), TickDriver::Manual, Vec::new());

        let source = FluidPoint::new(pos(0), FluidPointType::Output);
        let sink = FluidPoint::new(pos(1), FluidPointType::Input);
        let (source, sink) = {
            let ids = (source.id(), sink.id());
            manager.add(source);
            manager.add(sink);
            ids
        };
        assert!(manager.connect(source, sink));
        let segment = segment(&manager, source);

        let snapshot = manager.state.lock().snapshot(segment).expect("live segment");
        manager.remove(sink);

        // Already copied, so the removed tank is still filled once
        let report = allocation::tick(&snapshot, world.as_ref(), &config).expect("fluid moved");
        assert_close(report.delivered, 2.0);
        assert_close(tank.fluid_amount(), 2.0);

        assert!(manager.tick_segment(segment).is_none());
        assert_close(tank.fluid_amount(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tickers_run_until_shutdown() {
        let config = FluidConfig::default();
        let world = Arc::new(FluidWorld::new());
        world.place(pos(0), Arc::new(FluidSource::new(water(), 4.0, config)));
        let tank = Arc::new(FluidTank::new(100.0));
        world.place(pos(1), tank.clone());
        let manager = FluidManager::new(config, world, TickDriver::Runtime(Handle::current()), Vec::new());

        let source = FluidPoint::new(pos(0), FluidPointType::Output);
        let sink = FluidPoint::new(pos(1), FluidPointType::Input);
        let (source_id, sink_id) = (source.id(), sink.id());
        manager.add(source);
        manager.add(sink);
        assert!(manager.connect(source_id, sink_id));

        // Ticks at 500ms and 1000ms
        time::sleep(Duration::from_millis(1100)).await;
        assert_close(tank.fluid_amount(), 4.0);

        manager.shutdown().await;
        time::sleep(Duration::from_secs(5)).await;
        assert_close(tank.fluid_amount(), 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_segment_stops_ticking() {
        let config = FluidConfig::default();
        let world = Arc::new(FluidWorld::new());
        world.place(pos(0), Arc::new(FluidSource::new(water(), 4.0, config)));
        let tank = Arc::new(FluidTank::new(100.0));
        world.place(pos(1), tank.clone());
        let manager = FluidManager::new(config, world, TickDriver::Runtime(Handle::current()), Vec::new());

        let source = FluidPoint::new(pos(0), FluidPointType::Output);
        let sink = FluidPoint::new(pos(1), FluidPointType::Input);
        let (source_id, sink_id) = (source.id(), sink.id());
        manager.add(source);
        manager.add(sink);
        assert!(manager.connect(source_id, sink_id));

        time::sleep(Duration::from_millis(600)).await;
        assert_close(tank.fluid_amount(), 2.0);

        manager.remove(source_id);
        manager.remove(sink_id);
        assert_eq!(manager.segment_count(), 0);
        time::sleep(Duration::from_secs(5)).await;
        assert_close(tank.fluid_amount(), 2.0);
    }
}
