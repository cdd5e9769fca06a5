use crate::map::{GridCoord, GridQuery};

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Represents the result of a shortest-path search with metadata.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathResult {
    /// The computed path, start to end inclusive. Empty when unreachable.
    pub path: Vec<GridCoord>,
    /// The number of unit edges on the path, if one was found.
    pub total_cost: Option<usize>,
    /// The number of nodes expanded during the search.
    pub nodes_explored: usize,
}

impl PathResult {
    fn success(path: Vec<GridCoord>, nodes_explored: usize) -> Self {
        let total_cost = path.len().saturating_sub(1);
        Self {
            path,
            total_cost: Some(total_cost),
            nodes_explored,
        }
    }

    fn failure(nodes_explored: usize) -> Self {
        Self {
            path: Vec::new(),
            total_cost: None,
            nodes_explored,
        }
    }

    /// Returns true if a path was found.
    pub fn is_success(&self) -> bool {
        self.total_cost.is_some()
    }

    /// Returns the path, empty if none was found.
    pub fn into_path(self) -> Vec<GridCoord> {
        self.path
    }
}

impl fmt::Display for PathResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total_cost {
            Some(cost) => write!(
                f,
                "PathResult {{ success: true, path_length: {}, total_cost: {}, nodes_explored: {} }}",
                self.path.len(),
                cost,
                self.nodes_explored
            ),
            None => write!(
                f,
                "PathResult {{ success: false, nodes_explored: {} }}",
                self.nodes_explored
            ),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
struct State {
    cost: usize,
    order: usize,
    position: GridCoord,
}

// Min-heap on cost; equal costs pop in discovery order.
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reconstructs the path from a map of `came_from` links.
fn reconstruct_path(came_from: &HashMap<GridCoord, GridCoord>, mut current: GridCoord) -> Vec<GridCoord> {
    let mut path = vec![current];
    while let Some(&previous) = came_from.get(&current) {
        path.push(previous);
        current = previous;
    }
    path.reverse();
    path
}

/// Dijkstra over unit-weight edges with caller-supplied adjacency.
///
/// `start` and `end` are always traversable, even when `is_blocking` says
/// otherwise. The search stops as soon as `end` is popped from the queue.
///
/// # Arguments
/// * `start` - Starting cell.
/// * `end` - Goal cell.
/// * `neighbors` - In-bounds adjacency of a cell.
/// * `is_blocking` - Whether a cell must be avoided.
///
/// # Returns
/// * `PathResult` - The path and search statistics.
pub fn shortest_path_by<N, B>(start: GridCoord, end: GridCoord, mut neighbors: N, mut is_blocking: B) -> PathResult
where
    N: FnMut(GridCoord) -> Vec<GridCoord>,
    B: FnMut(GridCoord) -> bool,
{
    let mut open_set = BinaryHeap::new();
    let mut came_from = HashMap::new();
    let mut dist: HashMap<GridCoord, usize> = HashMap::new();
    let mut order = 0;
    let mut nodes_explored = 0;

    dist.insert(start, 0);
    open_set.push(State { cost: 0, order, position: start });

    while let Some(State { cost, position: current, .. }) = open_set.pop() {
        if current == end {
            return PathResult::success(reconstruct_path(&came_from, current), nodes_explored);
        }

        // Stale queue entry.
        if cost > dist.get(&current).copied().unwrap_or(usize::MAX) {
            continue;
        }
        nodes_explored += 1;

        for neighbor in neighbors(current) {
            if neighbor != end && neighbor != start && is_blocking(neighbor) {
                continue;
            }

            let tentative = cost + 1;
            if tentative < dist.get(&neighbor).copied().unwrap_or(usize::MAX) {
                came_from.insert(neighbor, current);
                dist.insert(neighbor, tentative);
                order += 1;
                open_set.push(State { cost: tentative, order, position: neighbor });
            }
        }
    }

    PathResult::failure(nodes_explored)
}

/// Finds a shortest path on `grid`, with statistics.
///
/// Returns a failed result if either endpoint lies outside the grid.
pub fn search<G: GridQuery + ?Sized>(grid: &G, start: GridCoord, end: GridCoord) -> PathResult {
    if !grid.is_valid(start) || !grid.is_valid(end) {
        return PathResult::failure(0);
    }
    shortest_path_by(start, end, |c| grid.neighbors(c), |c| grid.is_blocking(c))
}

/// Finds a shortest path on `grid`.
///
/// # Returns
/// The ordered cells from `start` to `end` inclusive, or an empty vector
/// if no traversable route exists.
pub fn shortest_path<G: GridQuery + ?Sized>(grid: &G, start: GridCoord, end: GridCoord) -> Vec<GridCoord> {
    search(grid, start, end).into_path()
}
