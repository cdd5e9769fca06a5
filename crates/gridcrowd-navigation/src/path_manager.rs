//! Path handle registry with lazy computation, invalidation on grid changes,
//! a temporal broad phase and continuous collision confirmation.
//!
//! A [`PathHandle`] is the single owner of a planned route. Dropping it
//! removes every broad-phase entry that references it and then forgets the
//! route. Handles outliving their manager become inert.
//!
//! The broad phase stores, per grid cell, the time windows during which a
//! path's footprint covers that cell. Two paths whose windows overlap in a
//! shared cell form a candidate pair; [`PathManager::collisions`] confirms
//! candidates with the swept-circle test.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use gridcrowd_kinematics::{SweptDisc, swept_circle};
use tracing::{debug, info, trace, warn};

use crate::dijkstra;
use crate::error::NavigationError;
use crate::map::{GridChange, GridCoord, GridMap, GridQuery, Subscription, WorldPoint};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kinematic parameters of the agent that owns a path.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DynamicInfo {
    /// Cells traversed per unit of time. Must be positive.
    pub velocity: f64,
    /// Agent radius in world units.
    pub radius: f64,
}

/// Identity of a path, stable for the lifetime of its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathId(u64);

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path#{}", self.0)
    }
}

/// Lifecycle of a path node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// Requested, never computed.
    Empty,
    /// Sequence and broad-phase entries populated.
    Computed,
    /// Cleared by a grid change or a reroute, waiting for recomputation.
    Invalidated,
}

/// A closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeWindow {
    /// Window start.
    pub start: f64,
    /// Window end.
    pub end: f64,
}

impl TimeWindow {
    /// Whether the two windows share a non-empty interval.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Position of a path at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalInfo {
    /// Interpolated world position.
    pub position: WorldPoint,
    /// Whether the path has already reached its last cell.
    pub ended: bool,
    /// Index of the segment the position lies on.
    pub segment: usize,
}

/// A confirmed contact between two paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    /// Time of first contact, on the paths' shared clock.
    pub time: f64,
    /// The two paths in contact.
    pub paths: (PathId, PathId),
    /// Disk centers of the two paths at the contact time.
    pub positions: (WorldPoint, WorldPoint),
}

#[derive(Debug, Clone, Copy)]
struct BucketEntry {
    window: TimeWindow,
    path: PathId,
}

#[derive(Debug, Clone, Copy)]
struct CandidatePair {
    window: TimeWindow,
    a: PathId,
    b: PathId,
}

#[derive(Debug)]
struct PathNode {
    info: DynamicInfo,
    start: GridCoord,
    end: GridCoord,
    sequence: Vec<GridCoord>,
    state: PathState,
    changed: bool,
    /// Bucket indices holding entries of this path.
    touched: Vec<usize>,
}

impl PathNode {
    fn step(&self) -> f64 {
        1.0 / self.info.velocity
    }

    fn clear(&mut self, state: PathState) {
        self.sequence.clear();
        self.touched.clear();
        self.state = state;
    }
}

#[derive(Debug, Default)]
struct PathStore {
    nodes: BTreeMap<PathId, PathNode>,
    buckets: Vec<Vec<BucketEntry>>,
    rows: usize,
    cols: usize,
    candidates: Vec<CandidatePair>,
    candidate_keys: HashSet<(PathId, PathId, u64)>,
    next_id: u64,
}

impl PathStore {
    fn resize(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.buckets = vec![Vec::new(); rows * cols];
        self.candidates.clear();
        self.candidate_keys.clear();
    }

    fn invalidate_all(&mut self, rows: usize, cols: usize) {
        for node in self.nodes.values_mut() {
            node.clear(PathState::Invalidated);
            node.changed = true;
        }
        self.resize(rows, cols);
    }

    /// Removes every broad-phase trace of `id`.
    fn forget_entries(&mut self, id: PathId, touched: &[usize]) {
        for &index in touched {
            if let Some(bucket) = self.buckets.get_mut(index) {
                bucket.retain(|e| e.path != id);
            }
        }
        self.candidates.retain(|c| c.a != id && c.b != id);
        self.candidate_keys.retain(|&(a, b, _)| a != id && b != id);
    }

    fn unregister(&mut self, id: PathId) {
        if let Some(node) = self.nodes.remove(&id) {
            self.forget_entries(id, &node.touched);
            debug!(%id, "Path handle released");
        }
    }

    /// Registers the footprint of a freshly computed path into the buckets.
    fn register_windows(&mut self, id: PathId, reach: (usize, usize)) {
        let PathStore { nodes, buckets, rows, cols, candidates, candidate_keys, .. } = self;
        let Some(node) = nodes.get_mut(&id) else {
            return;
        };
        let step = node.step();
        let (reach_rows, reach_cols) = reach;

        for (i, coord) in node.sequence.iter().enumerate() {
            let window = TimeWindow { start: i as f64 * step, end: (i + 1) as f64 * step };
            let row_range = coord.row.saturating_sub(reach_rows)..=(coord.row + reach_rows).min(rows.saturating_sub(1));
            for row in row_range {
                let col_range = coord.col.saturating_sub(reach_cols)..=(coord.col + reach_cols).min(cols.saturating_sub(1));
                for col in col_range {
                    let index = GridCoord::new(row, col).index(*cols);
                    let Some(bucket) = buckets.get_mut(index) else {
                        continue;
                    };
                    for entry in bucket.iter() {
                        if entry.path == id || !entry.window.overlaps(&window) {
                            continue;
                        }
                        let key = (id.min(entry.path), id.max(entry.path), window.start.to_bits());
                        if candidate_keys.insert(key) {
                            candidates.push(CandidatePair { window, a: id, b: entry.path });
                        }
                    }
                    bucket.push(BucketEntry { window, path: id });
                    node.touched.push(index);
                }
            }
        }
        node.touched.sort_unstable();
        node.touched.dedup();
    }
}

/// Work that arrived while the store was borrowed.
#[derive(Debug, Default)]
struct Deferred {
    released: Vec<PathId>,
    invalidate: bool,
    dims: Option<(usize, usize)>,
}

#[derive(Debug, Default)]
struct PathShared {
    store: RefCell<PathStore>,
    deferred: RefCell<Deferred>,
}

impl PathShared {
    /// Invalidates every path; `dims` resizes the buckets, `None` keeps them.
    fn invalidate(&self, dims: Option<(usize, usize)>) {
        match self.store.try_borrow_mut() {
            Ok(mut store) => {
                let (rows, cols) = dims.unwrap_or((store.rows, store.cols));
                store.invalidate_all(rows, cols);
                info!(rows, cols, paths = store.nodes.len(), "All paths invalidated");
            }
            Err(_) => {
                let mut deferred = self.deferred.borrow_mut();
                deferred.invalidate = true;
                deferred.dims = dims.or(deferred.dims);
            }
        }
    }
}

/// Owning reference to a path node. Dropping it unregisters the path.
pub struct PathHandle {
    id: PathId,
    shared: Weak<PathShared>,
}

impl PathHandle {
    /// Identity of this path.
    pub fn id(&self) -> PathId {
        self.id
    }

    /// Whether the owning manager is still alive.
    pub fn is_registered(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

impl fmt::Debug for PathHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathHandle")
            .field("id", &self.id)
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl Drop for PathHandle {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match shared.store.try_borrow_mut() {
            Ok(mut store) => store.unregister(self.id),
            Err(_) => {
                warn!(id = %self.id, "Path store busy, deferring release");
                shared.deferred.borrow_mut().released.push(self.id);
            }
        }
    }
}

/// Registry of path handles for one grid.
pub struct PathManager {
    shared: Rc<PathShared>,
    _subscription: Option<Subscription>,
}

impl PathManager {
    /// Creates a manager sized to `grid` and subscribed to its change feed.
    ///
    /// Every structural change of `grid` invalidates all paths.
    pub fn new(grid: &GridMap) -> Self {
        let shared = Rc::new(PathShared::default());
        let (rows, cols) = grid.dimensions();
        shared.store.borrow_mut().resize(rows, cols);

        let weak = Rc::downgrade(&shared);
        let subscription = grid.feed().subscribe(move |change| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match *change {
                GridChange::Layout { rows, cols } => shared.invalidate(Some((rows, cols))),
                GridChange::Cell { blocking_changed: true, .. } => shared.invalidate(None),
                GridChange::Cell { .. } => {}
            }
        });

        Self { shared, _subscription: Some(subscription) }
    }

    /// Creates a manager for a `rows` x `cols` grid without a change subscription.
    pub fn detached(rows: usize, cols: usize) -> Self {
        let shared = Rc::new(PathShared::default());
        shared.store.borrow_mut().resize(rows, cols);
        Self { shared, _subscription: None }
    }

    /// Applies releases and invalidations that arrived while the store was busy.
    fn settle(&self) {
        let deferred = std::mem::take(&mut *self.shared.deferred.borrow_mut());
        if deferred.released.is_empty() && !deferred.invalidate {
            return;
        }
        let mut store = self.shared.store.borrow_mut();
        for id in deferred.released {
            store.unregister(id);
        }
        if deferred.invalidate {
            let (rows, cols) = deferred.dims.unwrap_or((store.rows, store.cols));
            store.invalidate_all(rows, cols);
        }
    }

    fn owns(&self, handle: &PathHandle) -> bool {
        handle
            .shared
            .upgrade()
            .is_some_and(|s| Rc::ptr_eq(&s, &self.shared))
    }

    /// Requests a new, empty path from `start` to `end`.
    ///
    /// # Errors
    /// `InvalidVelocity` if `info.velocity <= 0`, `InvalidRadius` if the radius
    /// is negative or not finite.
    pub fn request_path(
        &self,
        info: DynamicInfo,
        start: GridCoord,
        end: GridCoord,
    ) -> Result<PathHandle, NavigationError> {
        if !(info.velocity > 0.0) || !info.velocity.is_finite() {
            return Err(NavigationError::InvalidVelocity("must be positive and finite"));
        }
        if !(info.radius >= 0.0) || !info.radius.is_finite() {
            return Err(NavigationError::InvalidRadius("must be non-negative and finite"));
        }

        self.settle();
        let mut store = self.shared.store.borrow_mut();
        let id = PathId(store.next_id);
        store.next_id += 1;
        store.nodes.insert(
            id,
            PathNode {
                info,
                start,
                end,
                sequence: Vec::new(),
                state: PathState::Empty,
                changed: false,
                touched: Vec::new(),
            },
        );
        debug!(%id, %start, %end, velocity = info.velocity, "Path requested");

        Ok(PathHandle { id, shared: Rc::downgrade(&self.shared) })
    }

    /// Computes the path if its sequence is empty; otherwise does nothing.
    ///
    /// `start` and `end` replace the stored route only when a computation runs.
    ///
    /// # Errors
    /// `StaleHandle` if the handle belongs to another manager or was released.
    ///
    /// # Returns
    /// The length of the cell sequence (zero when unreachable).
    pub fn get_path<G: GridQuery + ?Sized>(
        &self,
        handle: &PathHandle,
        start: GridCoord,
        end: GridCoord,
        grid: &G,
    ) -> Result<usize, NavigationError> {
        if !self.owns(handle) {
            return Err(NavigationError::StaleHandle);
        }
        self.settle();
        let mut store = self.shared.store.borrow_mut();
        let node = store.nodes.get_mut(&handle.id).ok_or(NavigationError::StaleHandle)?;
        if !node.sequence.is_empty() {
            return Ok(node.sequence.len());
        }

        node.start = start;
        node.end = end;
        let result = dijkstra::search(grid, start, end);
        let radius = node.info.radius;
        node.sequence = result.path;
        node.state = PathState::Computed;
        let len = node.sequence.len();

        let reach = footprint_reach(radius, grid.cell_extent());
        store.register_windows(handle.id, reach);
        debug!(
            id = %handle.id,
            len,
            nodes_explored = result.nodes_explored,
            candidates = store.candidates.len(),
            "Path computed"
        );
        Ok(len)
    }

    /// Recomputes every path that is empty or invalidated, using its stored route.
    ///
    /// Paths whose "changed" flag is still set are skipped: their owner has
    /// not seen the invalidation yet and will reroute them from a new start.
    pub fn refresh<G: GridQuery + ?Sized>(&self, grid: &G) -> usize {
        self.settle();
        let pending: Vec<(PathId, GridCoord, GridCoord)> = self
            .shared
            .store
            .borrow()
            .nodes
            .iter()
            .filter(|(_, n)| n.sequence.is_empty() && n.state != PathState::Computed && !n.changed)
            .map(|(id, n)| (*id, n.start, n.end))
            .collect();

        let mut store = self.shared.store.borrow_mut();
        for &(id, start, end) in &pending {
            let Some(node) = store.nodes.get_mut(&id) else {
                continue;
            };
            node.sequence = dijkstra::shortest_path(grid, start, end);
            node.state = PathState::Computed;
            let reach = footprint_reach(node.info.radius, grid.cell_extent());
            store.register_windows(id, reach);
        }
        if !pending.is_empty() {
            trace!(count = pending.len(), "Paths refreshed");
        }
        pending.len()
    }

    /// Clears the sequence of `handle` and replaces its route.
    ///
    /// # Errors
    /// `StaleHandle` if the handle is not registered here.
    pub fn reroute(&self, handle: &PathHandle, start: GridCoord, end: GridCoord) -> Result<(), NavigationError> {
        if !self.owns(handle) {
            return Err(NavigationError::StaleHandle);
        }
        self.settle();
        let mut store = self.shared.store.borrow_mut();
        let node = store.nodes.get_mut(&handle.id).ok_or(NavigationError::StaleHandle)?;
        let touched = std::mem::take(&mut node.touched);
        node.clear(PathState::Invalidated);
        node.start = start;
        node.end = end;
        store.forget_entries(handle.id, &touched);
        Ok(())
    }

    /// Clears every sequence and rebuilds the buckets for a `rows` x `cols` grid.
    pub fn invalidate_all(&self, rows: usize, cols: usize) {
        self.settle();
        self.shared.invalidate(Some((rows, cols)));
    }

    /// Returns and clears the "changed since last asked" flag of `handle`.
    pub fn take_changed(&self, handle: &PathHandle) -> bool {
        if !self.owns(handle) {
            return false;
        }
        self.settle();
        let mut store = self.shared.store.borrow_mut();
        store
            .nodes
            .get_mut(&handle.id)
            .is_some_and(|n| std::mem::take(&mut n.changed))
    }

    /// Lifecycle state of `handle`.
    pub fn state(&self, handle: &PathHandle) -> Option<PathState> {
        if !self.owns(handle) {
            return None;
        }
        self.settle();
        self.shared.store.borrow().nodes.get(&handle.id).map(|n| n.state)
    }

    /// The cell sequence of `handle`.
    pub fn sequence(&self, handle: &PathHandle) -> Result<Vec<GridCoord>, NavigationError> {
        self.with_node(handle, |n| n.sequence.clone())
    }

    /// Number of cells in the sequence of `handle`.
    pub fn len(&self, handle: &PathHandle) -> Result<usize, NavigationError> {
        self.with_node(handle, |n| n.sequence.len())
    }

    /// Center of cell `index` of the sequence.
    pub fn segment<G: GridQuery + ?Sized>(&self, handle: &PathHandle, index: usize, grid: &G) -> Option<WorldPoint> {
        self.with_node(handle, |n| n.sequence.get(index).copied())
            .ok()
            .flatten()
            .and_then(|c| grid.center(c))
    }

    fn with_node<T>(&self, handle: &PathHandle, f: impl FnOnce(&PathNode) -> T) -> Result<T, NavigationError> {
        if !self.owns(handle) {
            return Err(NavigationError::StaleHandle);
        }
        self.settle();
        let store = self.shared.store.borrow();
        store.nodes.get(&handle.id).map(f).ok_or(NavigationError::StaleHandle)
    }

    /// Position of `handle` at time `t`.
    ///
    /// Beyond the final segment the last cell center is returned with
    /// `ended = true`. An empty path is ended at its start cell.
    ///
    /// # Errors
    /// `StaleHandle` for unknown handles, `OutOfBounds` if a cell has no center.
    pub fn eval_position<G: GridQuery + ?Sized>(
        &self,
        t: f64,
        handle: &PathHandle,
        grid: &G,
    ) -> Result<EvalInfo, NavigationError> {
        self.with_node(handle, |node| eval_node(node, t, grid))?
    }

    /// Confirms broad-phase candidates with the swept-circle test.
    ///
    /// # Returns
    /// Confirmed events sorted by time.
    pub fn collisions<G: GridQuery + ?Sized>(&self, grid: &G) -> Vec<CollisionEvent> {
        self.settle();
        let store = self.shared.store.borrow();
        let mut events = Vec::new();

        for pair in &store.candidates {
            let (Some(a), Some(b)) = (store.nodes.get(&pair.a), store.nodes.get(&pair.b)) else {
                continue;
            };
            let evals = (
                eval_node(a, pair.window.start, grid),
                eval_node(b, pair.window.start, grid),
                eval_node(a, pair.window.end, grid),
                eval_node(b, pair.window.end, grid),
            );
            let (Ok(a0), Ok(b0), Ok(a1), Ok(b1)) = evals else {
                continue;
            };
            if a0.ended || b0.ended {
                continue;
            }

            let disc_a = SweptDisc { start: a0.position, end: a1.position, radius: a.info.radius };
            let disc_b = SweptDisc { start: b0.position, end: b1.position, radius: b.info.radius };
            let hit = swept_circle(&disc_a, &disc_b);
            if !hit.collides {
                continue;
            }

            let span = pair.window.end - pair.window.start;
            events.push(CollisionEvent {
                time: pair.window.start + span * hit.t,
                paths: (pair.a, pair.b),
                positions: (a0.position.lerp(a1.position, hit.t), b0.position.lerp(b1.position, hit.t)),
            });
        }

        events.sort_by(|x, y| x.time.total_cmp(&y.time));
        events
    }

    /// Number of broad-phase candidate pairs.
    pub fn candidate_count(&self) -> usize {
        self.settle();
        self.shared.store.borrow().candidates.len()
    }

    /// Number of registered handles.
    pub fn live_handles(&self) -> usize {
        self.settle();
        self.shared.store.borrow().nodes.len()
    }

    /// Bucket storage dimensions `(rows, cols)`.
    pub fn dimensions(&self) -> (usize, usize) {
        self.settle();
        let store = self.shared.store.borrow();
        (store.rows, store.cols)
    }
}

impl fmt::Debug for PathManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.shared.store.try_borrow();
        let mut s = f.debug_struct("PathManager");
        if let Ok(store) = store {
            s.field("paths", &store.nodes.len())
                .field("candidates", &store.candidates.len());
        }
        s.finish()
    }
}

/// Rings of cells around a path cell that a disk of `radius` can touch while
/// moving to the next cell: the radius in cells plus one cell of travel.
fn footprint_reach(radius: f64, extent: WorldPoint) -> (usize, usize) {
    let rings = |size: f64| {
        if size > 0.0 {
            ((radius / size).ceil() as usize).saturating_add(1)
        } else {
            1
        }
    };
    (rings(extent.y), rings(extent.x))
}

fn eval_node<G: GridQuery + ?Sized>(node: &PathNode, t: f64, grid: &G) -> Result<EvalInfo, NavigationError> {
    let center = |coord: GridCoord| {
        grid.center(coord)
            .ok_or(NavigationError::OutOfBounds("path cell outside the grid"))
    };

    let Some(&last) = node.sequence.last() else {
        return Ok(EvalInfo { position: center(node.start)?, ended: true, segment: 0 });
    };

    let step = node.step();
    let t = t.max(0.0);
    // Decided in floating point; huge or infinite `t` would saturate the index.
    let segment = (t / step).floor();
    if !segment.is_finite() || segment + 1.0 >= node.sequence.len() as f64 {
        return Ok(EvalInfo {
            position: center(last)?,
            ended: true,
            segment: node.sequence.len() - 1,
        });
    }
    let i = segment as usize;

    let from = center(node.sequence[i])?;
    let to = center(node.sequence[i + 1])?;
    let fraction = (t - step * i as f64) / step;
    Ok(EvalInfo { position: from.lerp(to, fraction), ended: false, segment: i })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{CellContent, GridConfig, GridTopology};

    fn grid(rows: usize, cols: usize, cell: f64) -> GridMap {
        GridMap::with_config(GridConfig {
            rows,
            cols,
            topology: GridTopology::Square,
            area_start: WorldPoint::new(0.0, 0.0),
            area_end: WorldPoint::new(cols as f64 * cell, rows as f64 * cell),
            regular: false,
        })
        .unwrap()
    }

    fn info(velocity: f64, radius: f64) -> DynamicInfo {
        DynamicInfo { velocity, radius }
    }

    #[test]
    fn test_request_rejects_non_positive_velocity() {
        let g = grid(3, 3, 1.0);
        let paths = PathManager::new(&g);
        let (a, b) = (GridCoord::new(0, 0), GridCoord::new(2, 2));
        assert!(matches!(paths.request_path(info(0.0, 1.0), a, b), Err(NavigationError::InvalidVelocity(_))));
        assert!(matches!(paths.request_path(info(-1.0, 1.0), a, b), Err(NavigationError::InvalidVelocity(_))));
        assert!(matches!(paths.request_path(info(1.0, -1.0), a, b), Err(NavigationError::InvalidRadius(_))));
    }

    #[test]
    fn test_request_rejects_non_finite_radius() {
        let g = grid(3, 3, 1.0);
        let paths = PathManager::new(&g);
        let (a, b) = (GridCoord::new(0, 0), GridCoord::new(2, 2));
        for radius in [f64::INFINITY, f64::NAN] {
            assert!(matches!(
                paths.request_path(info(1.0, radius), a, b),
                Err(NavigationError::InvalidRadius(_))
            ));
        }
        assert_eq!(paths.live_handles(), 0);
        assert_eq!(footprint_reach(f64::INFINITY, WorldPoint::new(1.0, 1.0)), (usize::MAX, usize::MAX));
    }

    #[test]
    fn test_eval_far_past_the_end_is_ended() {
        let g = grid(1, 5, 10.0);
        let paths = PathManager::new(&g);
        let (start, end) = (GridCoord::new(0, 0), GridCoord::new(0, 4));
        let handle = paths.request_path(info(1.0, 1.0), start, end).unwrap();
        paths.get_path(&handle, start, end, &g).unwrap();

        for t in [1e30, f64::MAX, f64::INFINITY] {
            let eval = paths.eval_position(t, &handle, &g).unwrap();
            assert!(eval.ended, "t = {t}");
            assert_eq!(eval.segment, 4);
            assert_eq!(eval.position, WorldPoint::new(45.0, 5.0));
        }
    }

    #[test]
    fn test_refresh_leaves_unacknowledged_paths_to_their_owner() {
        let mut g = grid(3, 3, 1.0);
        let paths = PathManager::new(&g);
        let (start, end) = (GridCoord::new(0, 0), GridCoord::new(0, 2));
        let handle = paths.request_path(info(1.0, 0.1), start, end).unwrap();
        paths.get_path(&handle, start, end, &g).unwrap();

        g.set_content(GridCoord::new(0, 1), CellContent::Obstacle).unwrap();
        assert_eq!(paths.refresh(&g), 0);
        assert_eq!(paths.len(&handle), Ok(0));
        assert_eq!(paths.candidate_count(), 0);

        assert!(paths.take_changed(&handle));
        paths.reroute(&handle, GridCoord::new(1, 0), end).unwrap();
        assert_eq!(paths.refresh(&g), 1);
        assert_eq!(paths.sequence(&handle).unwrap().first(), Some(&GridCoord::new(1, 0)));
    }

    #[test]
    fn test_get_path_is_idempotent() {
        let g = grid(5, 5, 1.0);
        let paths = PathManager::new(&g);
        let (start, end) = (GridCoord::new(0, 0), GridCoord::new(4, 4));
        let handle = paths.request_path(info(1.0, 0.1), start, end).unwrap();
        assert_eq!(paths.state(&handle), Some(PathState::Empty));

        assert_eq!(paths.get_path(&handle, start, end, &g), Ok(9));
        let first = paths.sequence(&handle).unwrap();
        // A second call is a no-op even with a different route.
        assert_eq!(paths.get_path(&handle, end, start, &g), Ok(9));
        assert_eq!(paths.sequence(&handle).unwrap(), first);
        assert_eq!(paths.state(&handle), Some(PathState::Computed));
    }

    #[test]
    fn test_eval_interpolates_and_ends() {
        let g = grid(1, 5, 10.0);
        let paths = PathManager::new(&g);
        let (start, end) = (GridCoord::new(0, 0), GridCoord::new(0, 4));
        let handle = paths.request_path(info(2.0, 1.0), start, end).unwrap();
        paths.get_path(&handle, start, end, &g).unwrap();

        // Two cells per time unit: t = 0.25 is halfway between cells 0 and 1.
        let mid = paths.eval_position(0.25, &handle, &g).unwrap();
        assert!(!mid.ended);
        assert_eq!(mid.segment, 0);
        assert!((mid.position.x - 10.0).abs() < 1e-9);
        assert!((mid.position.y - 5.0).abs() < 1e-9);

        let late = paths.eval_position(100.0, &handle, &g).unwrap();
        assert!(late.ended);
        assert_eq!(late.position, WorldPoint::new(45.0, 5.0));
        assert_eq!(late.segment, 4);
    }

    #[test]
    fn test_unreachable_path_is_ended_at_start() {
        let mut g = grid(3, 3, 1.0);
        for row in 0..3 {
            g.set_content(GridCoord::new(row, 1), CellContent::Obstacle).unwrap();
        }
        let paths = PathManager::new(&g);
        let (start, end) = (GridCoord::new(0, 0), GridCoord::new(0, 2));
        let handle = paths.request_path(info(1.0, 0.1), start, end).unwrap();
        assert_eq!(paths.get_path(&handle, start, end, &g), Ok(0));

        let eval = paths.eval_position(0.0, &handle, &g).unwrap();
        assert!(eval.ended);
        assert_eq!(eval.position, WorldPoint::new(0.5, 0.5));
    }

    #[test]
    fn test_grid_change_invalidates_paths() {
        let mut g = grid(5, 5, 1.0);
        let paths = PathManager::new(&g);
        let (start, end) = (GridCoord::new(0, 0), GridCoord::new(4, 4));
        let handle = paths.request_path(info(1.0, 0.1), start, end).unwrap();
        paths.get_path(&handle, start, end, &g).unwrap();
        assert!(!paths.take_changed(&handle));

        g.resize(3, 3).unwrap();
        assert_eq!(paths.state(&handle), Some(PathState::Invalidated));
        assert_eq!(paths.len(&handle), Ok(0));
        assert_eq!(paths.dimensions(), (3, 3));
        assert!(paths.take_changed(&handle));
        assert!(!paths.take_changed(&handle));

        // The old route is no longer observable; the new one fits the new grid.
        let new_end = GridCoord::new(2, 2);
        assert_eq!(paths.get_path(&handle, start, new_end, &g), Ok(5));
        let last = paths.eval_position(100.0, &handle, &g).unwrap();
        assert_eq!(last.position, g.center(new_end).unwrap());
    }

    #[test]
    fn test_cell_edit_invalidates_paths() {
        let mut g = grid(3, 3, 1.0);
        let paths = PathManager::new(&g);
        let (start, end) = (GridCoord::new(0, 0), GridCoord::new(0, 2));
        let handle = paths.request_path(info(1.0, 0.1), start, end).unwrap();
        assert_eq!(paths.get_path(&handle, start, end, &g), Ok(3));

        g.set_content(GridCoord::new(0, 1), CellContent::Obstacle).unwrap();
        assert_eq!(paths.state(&handle), Some(PathState::Invalidated));
        assert!(paths.take_changed(&handle));
        assert_eq!(paths.refresh(&g), 1);
        let route = paths.sequence(&handle).unwrap();
        assert_eq!(route.len(), 5);
        assert!(!route.contains(&GridCoord::new(0, 1)));
    }

    #[test]
    fn test_marker_edit_keeps_paths() {
        let mut g = grid(3, 3, 1.0);
        let paths = PathManager::new(&g);
        let (start, end) = (GridCoord::new(0, 0), GridCoord::new(2, 2));
        let handle = paths.request_path(info(1.0, 0.1), start, end).unwrap();
        paths.get_path(&handle, start, end, &g).unwrap();

        g.set_content(end, CellContent::Destination { origin: Some(start) }).unwrap();
        assert_eq!(paths.state(&handle), Some(PathState::Computed));
        assert!(!paths.take_changed(&handle));
    }

    #[test]
    fn test_head_on_collision_is_predicted() {
        // 101 cells of width 1 on a single row: centers 100 units apart.
        let g = grid(1, 101, 1.0);
        let paths = PathManager::new(&g);
        let (left, right) = (GridCoord::new(0, 0), GridCoord::new(0, 100));
        let a = paths.request_path(info(1.0, 10.0), left, right).unwrap();
        let b = paths.request_path(info(1.0, 10.0), right, left).unwrap();
        paths.get_path(&a, left, right, &g).unwrap();
        paths.get_path(&b, right, left, &g).unwrap();
        assert!(paths.candidate_count() > 0);

        let events = paths.collisions(&g);
        let first = events.first().expect("head-on paths must collide");
        assert!((first.time - 40.0).abs() < 1.0, "collision at {}", first.time);

        let (pa, pb) = first.positions;
        let midpoint = (pa.x + pb.x) / 2.0;
        assert!((midpoint - 50.5).abs() < 1.0);
        assert!(((pb.x - pa.x).abs() - 20.0).abs() < 1.0);
    }

    #[test]
    fn test_separate_rows_do_not_collide() {
        let g = grid(30, 10, 1.0);
        let paths = PathManager::new(&g);
        let a = paths.request_path(info(1.0, 0.4), GridCoord::new(0, 0), GridCoord::new(0, 9)).unwrap();
        let b = paths.request_path(info(1.0, 0.4), GridCoord::new(29, 9), GridCoord::new(29, 0)).unwrap();
        paths.get_path(&a, GridCoord::new(0, 0), GridCoord::new(0, 9), &g).unwrap();
        paths.get_path(&b, GridCoord::new(29, 9), GridCoord::new(29, 0), &g).unwrap();
        assert_eq!(paths.candidate_count(), 0);
        assert!(paths.collisions(&g).is_empty());
    }

    #[test]
    fn test_dropping_handle_unregisters_candidates() {
        let g = grid(1, 21, 1.0);
        let paths = PathManager::new(&g);
        let (left, right) = (GridCoord::new(0, 0), GridCoord::new(0, 20));
        let a = paths.request_path(info(1.0, 2.0), left, right).unwrap();
        let b = paths.request_path(info(1.0, 2.0), right, left).unwrap();
        paths.get_path(&a, left, right, &g).unwrap();
        paths.get_path(&b, right, left, &g).unwrap();
        assert!(paths.candidate_count() > 0);
        assert_eq!(paths.live_handles(), 2);

        drop(b);
        assert_eq!(paths.live_handles(), 1);
        assert_eq!(paths.candidate_count(), 0);
        assert!(paths.collisions(&g).is_empty());
    }

    #[test]
    fn test_handle_outliving_manager_is_inert() {
        let g = grid(2, 2, 1.0);
        let paths = PathManager::new(&g);
        let handle = paths
            .request_path(info(1.0, 0.1), GridCoord::new(0, 0), GridCoord::new(1, 1))
            .unwrap();
        drop(paths);
        assert!(!handle.is_registered());
        drop(handle);
    }

    #[test]
    fn test_foreign_handle_is_stale() {
        let g = grid(2, 2, 1.0);
        let first = PathManager::new(&g);
        let second = PathManager::detached(2, 2);
        let handle = first
            .request_path(info(1.0, 0.1), GridCoord::new(0, 0), GridCoord::new(1, 1))
            .unwrap();
        assert_eq!(
            second.eval_position(0.0, &handle, &g),
            Err(NavigationError::StaleHandle)
        );
    }
}
