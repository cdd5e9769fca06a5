//! Grid map functionality for navigation.
//!
//! This module provides the grid topologies, the grid map with its cells and
//! occupancy lists, the change feed, and the read-only [`GridQuery`] view
//! consumed by the path solver and the path manager.

pub mod feed;
pub mod grid;
pub mod point_types;
pub mod topology;

pub use feed::{ChangeFeed, GridChange, Subscription};
pub use grid::{Cell, CellContent, GridConfig, GridMap, OccupantId};
pub use point_types::{GridCoord, WorldPoint};
pub use topology::{GridLayout, GridTopology};

/// Read-only queries against a grid.
///
/// Out-of-range coordinates answer `false`, empty or `None`; they never panic.
pub trait GridQuery {
    /// `(rows, cols)`, `(0, 0)` when unallocated.
    fn dimensions(&self) -> (usize, usize);

    /// Bounds check.
    fn is_valid(&self, coord: GridCoord) -> bool {
        let (rows, cols) = self.dimensions();
        coord.row < rows && coord.col < cols
    }

    /// Whether paths must avoid `coord`.
    fn is_blocking(&self, coord: GridCoord) -> bool;

    /// In-bounds adjacent coordinates.
    fn neighbors(&self, coord: GridCoord) -> Vec<GridCoord>;

    /// World position of the cell center.
    fn center(&self, coord: GridCoord) -> Option<WorldPoint>;

    /// Cell containing `point`.
    fn coord_at(&self, point: WorldPoint) -> Option<GridCoord>;

    /// Cell containing `point`, clamped to the grid edge.
    fn clamped_coord_at(&self, point: WorldPoint) -> Option<GridCoord>;

    /// Unsigned size of one cell in world units.
    fn cell_extent(&self) -> WorldPoint;
}
