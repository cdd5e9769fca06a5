//! Grid topologies and the mapping between cells and world positions.
//!
//! Two topologies are supported:
//! - `Square`: 4-neighbor cells laid out on a regular lattice.
//! - `Hexagonal`: 6-neighbor cells in an "odd-r" offset layout, where every
//!   odd row is shifted right by half a cell.

#![warn(missing_docs)]

use core::fmt;
use std::str::FromStr;

use crate::error::NavigationError;
use crate::map::point_types::{GridCoord, WorldPoint};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ratio between hex row spacing and hex width (`sqrt(3) / 2`).
const HEX_SPACING_RATIO: f64 = 0.866_025_4;

/// `(d_col, d_row)` offsets: left, right, up, down.
const SQUARE_DIRECTIONS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// `(d_col, d_row)` offsets for cells on even rows.
const HEX_EVEN_ROW_DIRECTIONS: [(isize, isize); 6] =
    [(-1, -1), (0, -1), (1, 0), (0, 1), (-1, 1), (-1, 0)];

/// `(d_col, d_row)` offsets for cells on odd rows.
const HEX_ODD_ROW_DIRECTIONS: [(isize, isize); 6] =
    [(0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 0)];

/// Cell shape and adjacency rule of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum GridTopology {
    /// Square cells, 4 neighbors.
    #[default]
    Square,
    /// Hexagonal cells, 6 neighbors, odd rows offset by half a cell.
    Hexagonal,
}

impl GridTopology {
    /// Every topology, in factory-index order.
    pub const ALL: [GridTopology; 2] = [GridTopology::Square, GridTopology::Hexagonal];

    /// Selects a topology by factory index (`0` = square, `1` = hexagonal).
    ///
    /// # Errors
    /// Returns `NavigationError::UnknownTopology` for any other index.
    pub fn from_index(index: usize) -> Result<Self, NavigationError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(NavigationError::UnknownTopology(index))
    }

    /// Bounds check only. Blocking is a property of the cell, not the topology.
    pub fn is_valid(&self, coord: GridCoord, rows: usize, cols: usize) -> bool {
        coord.row < rows && coord.col < cols
    }

    /// In-bounds neighbors of `coord`, in a fixed per-topology order.
    pub fn neighbors(&self, coord: GridCoord, rows: usize, cols: usize) -> Vec<GridCoord> {
        let directions: &[(isize, isize)] = match self {
            GridTopology::Square => &SQUARE_DIRECTIONS,
            GridTopology::Hexagonal if coord.row % 2 == 0 => &HEX_EVEN_ROW_DIRECTIONS,
            GridTopology::Hexagonal => &HEX_ODD_ROW_DIRECTIONS,
        };

        directions
            .iter()
            .filter_map(|&(d_col, d_row)| coord.offset(d_col, d_row))
            .filter(|n| self.is_valid(*n, rows, cols))
            .collect()
    }

    /// Size of one cell for an area of `area` world units split into `rows` x `cols`.
    ///
    /// Signs follow the area so that reversed areas map correctly.
    pub fn cell_delta(&self, area: WorldPoint, rows: usize, cols: usize, regular: bool) -> WorldPoint {
        let width = area.x.abs() / cols as f64;
        let height = area.y.abs() / rows as f64;

        let (dx, dy) = match self {
            GridTopology::Square if regular => {
                let side = width.min(height);
                (side, side)
            }
            GridTopology::Square => (width, height),
            GridTopology::Hexagonal => {
                let dy_from_width = width * HEX_SPACING_RATIO;
                if dy_from_width <= height {
                    (width, dy_from_width)
                } else {
                    (height / HEX_SPACING_RATIO, height)
                }
            }
        };

        WorldPoint::new(dx.copysign(area.x), dy.copysign(area.y))
    }
}

impl fmt::Display for GridTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridTopology::Square => write!(f, "square"),
            GridTopology::Hexagonal => write!(f, "hexagonal"),
        }
    }
}

impl FromStr for GridTopology {
    type Err = NavigationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "square" => Ok(GridTopology::Square),
            "hex" | "hexagonal" => Ok(GridTopology::Hexagonal),
            other => match other.parse::<usize>() {
                Ok(index) => GridTopology::from_index(index),
                Err(_) => Err(NavigationError::UnknownTopology(usize::MAX)),
            },
        }
    }
}

/// Placement of a grid in world space.
///
/// Built by `GridMap::allocate`; every coordinate conversion goes through it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridLayout {
    topology: GridTopology,
    rows: usize,
    cols: usize,
    origin: WorldPoint,
    delta: WorldPoint,
}

impl GridLayout {
    /// Lays out `rows` x `cols` cells of `topology` over the area `start..end`.
    pub fn new(
        topology: GridTopology,
        rows: usize,
        cols: usize,
        start: WorldPoint,
        end: WorldPoint,
        regular: bool,
    ) -> Self {
        let delta = topology.cell_delta(end - start, rows, cols, regular);
        GridLayout { topology, rows, cols, origin: start, delta }
    }

    /// The topology of the cells.
    pub fn topology(&self) -> GridTopology {
        self.topology
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// World position of the corner of cell `(0, 0)`.
    pub fn origin(&self) -> WorldPoint {
        self.origin
    }

    /// Signed size of one cell.
    pub fn delta(&self) -> WorldPoint {
        self.delta
    }

    /// Unsigned size of one cell.
    pub fn cell_extent(&self) -> WorldPoint {
        WorldPoint::new(self.delta.x.abs(), self.delta.y.abs())
    }

    /// Bounds check.
    pub fn is_valid(&self, coord: GridCoord) -> bool {
        self.topology.is_valid(coord, self.rows, self.cols)
    }

    /// In-bounds neighbors of `coord`.
    pub fn neighbors(&self, coord: GridCoord) -> Vec<GridCoord> {
        self.topology.neighbors(coord, self.rows, self.cols)
    }

    /// World position of the center of `coord`, or `None` outside the grid.
    pub fn center(&self, coord: GridCoord) -> Option<WorldPoint> {
        if !self.is_valid(coord) {
            return None;
        }
        Some(self.center_unchecked(coord.row as f64, coord.col as f64))
    }

    fn center_unchecked(&self, row: f64, col: f64) -> WorldPoint {
        let mut x = self.origin.x + self.delta.x * (col + 0.5);
        let y = self.origin.y + self.delta.y * (row + 0.5);
        if self.topology == GridTopology::Hexagonal && (row as usize) % 2 != 0 {
            x += self.delta.x * 0.5;
        }
        WorldPoint::new(x, y)
    }

    /// Cell containing `point`, or `None` if the point lies outside the grid.
    pub fn coord_at(&self, point: WorldPoint) -> Option<GridCoord> {
        let rel = point - self.origin;
        let fx = rel.x / self.delta.x;
        let fy = rel.y / self.delta.y;

        // Hex rows are half a cell wider because of the odd-row offset.
        let width = match self.topology {
            GridTopology::Square => self.cols as f64,
            GridTopology::Hexagonal => self.cols as f64 + 0.5,
        };
        if !(0.0..width).contains(&fx) || !(0.0..self.rows as f64).contains(&fy) {
            return None;
        }
        Some(self.clamped_coord_at(point))
    }

    /// Cell containing `point`, clamped to the nearest edge cell when outside.
    pub fn clamped_coord_at(&self, point: WorldPoint) -> GridCoord {
        let rel = point - self.origin;
        let row = clamp_index(rel.y / self.delta.y, self.rows);

        match self.topology {
            GridTopology::Square => GridCoord::new(row, clamp_index(rel.x / self.delta.x, self.cols)),
            GridTopology::Hexagonal => {
                let offset = if row % 2 != 0 { 0.5 } else { 0.0 };
                let col = clamp_index(rel.x / self.delta.x - offset, self.cols);
                self.nearest_hex(point, GridCoord::new(row, col))
            }
        }
    }

    /// Picks the cell whose center is closest to `point` among the 3x3 block around `rough`.
    fn nearest_hex(&self, point: WorldPoint, rough: GridCoord) -> GridCoord {
        let mut best = rough;
        let mut best_dist = f64::INFINITY;

        for d_row in -1..=1 {
            for d_col in -1..=1 {
                let Some(candidate) = rough.offset(d_col, d_row) else {
                    continue;
                };
                if !self.is_valid(candidate) {
                    continue;
                }
                let center = self.center_unchecked(candidate.row as f64, candidate.col as f64);
                let dist = (center - point).length_squared();
                if dist < best_dist {
                    best_dist = dist;
                    best = candidate;
                }
            }
        }

        best
    }
}

fn clamp_index(value: f64, len: usize) -> usize {
    if value.is_nan() || value < 0.0 {
        0
    } else {
        (value.floor() as usize).min(len.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(rows: usize, cols: usize) -> GridLayout {
        GridLayout::new(
            GridTopology::Square,
            rows,
            cols,
            WorldPoint::new(0.0, 0.0),
            WorldPoint::new(cols as f64 * 10.0, rows as f64 * 10.0),
            false,
        )
    }

    #[test]
    fn test_square_neighbors_interior_and_corner() {
        let topo = GridTopology::Square;
        assert_eq!(topo.neighbors(GridCoord::new(2, 2), 5, 5).len(), 4);
        let corner = topo.neighbors(GridCoord::new(0, 0), 5, 5);
        assert_eq!(corner, vec![GridCoord::new(0, 1), GridCoord::new(1, 0)]);
    }

    #[test]
    fn test_hex_neighbors_follow_row_parity() {
        let topo = GridTopology::Hexagonal;
        let even = topo.neighbors(GridCoord::new(2, 2), 5, 5);
        assert_eq!(
            even,
            vec![
                GridCoord::new(1, 1),
                GridCoord::new(1, 2),
                GridCoord::new(2, 3),
                GridCoord::new(3, 2),
                GridCoord::new(3, 1),
                GridCoord::new(2, 1),
            ]
        );

        let odd = topo.neighbors(GridCoord::new(1, 2), 5, 5);
        assert_eq!(
            odd,
            vec![
                GridCoord::new(0, 2),
                GridCoord::new(0, 3),
                GridCoord::new(1, 3),
                GridCoord::new(2, 3),
                GridCoord::new(2, 2),
                GridCoord::new(1, 1),
            ]
        );
    }

    #[test]
    fn test_is_valid_is_bounds_only() {
        let topo = GridTopology::Square;
        assert!(topo.is_valid(GridCoord::new(4, 4), 5, 5));
        assert!(!topo.is_valid(GridCoord::new(5, 0), 5, 5));
        assert!(!topo.is_valid(GridCoord::new(0, 5), 5, 5));
    }

    #[test]
    fn test_from_index() {
        assert_eq!(GridTopology::from_index(0), Ok(GridTopology::Square));
        assert_eq!(GridTopology::from_index(1), Ok(GridTopology::Hexagonal));
        assert_eq!(GridTopology::from_index(2), Err(NavigationError::UnknownTopology(2)));
        assert_eq!("hex".parse::<GridTopology>(), Ok(GridTopology::Hexagonal));
    }

    #[test]
    fn test_square_center_and_lookup() {
        let layout = square(4, 6);
        let center = layout.center(GridCoord::new(1, 2)).unwrap();
        assert_eq!(center, WorldPoint::new(25.0, 15.0));
        assert_eq!(layout.coord_at(center), Some(GridCoord::new(1, 2)));
        assert_eq!(layout.coord_at(WorldPoint::new(-1.0, 5.0)), None);
        assert_eq!(layout.coord_at(WorldPoint::new(61.0, 5.0)), None);
        assert_eq!(layout.center(GridCoord::new(4, 0)), None);
    }

    #[test]
    fn test_clamped_lookup_stays_inside() {
        let layout = square(4, 6);
        assert_eq!(layout.clamped_coord_at(WorldPoint::new(-50.0, 500.0)), GridCoord::new(3, 0));
    }

    #[test]
    fn test_regular_square_cells() {
        let layout = GridLayout::new(
            GridTopology::Square,
            2,
            4,
            WorldPoint::new(0.0, 0.0),
            WorldPoint::new(40.0, 40.0),
            true,
        );
        assert_eq!(layout.delta(), WorldPoint::new(10.0, 10.0));
    }

    #[test]
    fn test_hex_layout_round_trips_centers() {
        let layout = GridLayout::new(
            GridTopology::Hexagonal,
            6,
            6,
            WorldPoint::new(0.0, 0.0),
            WorldPoint::new(60.0, 60.0),
            false,
        );
        let delta = layout.delta();
        assert!((delta.y - delta.x * HEX_SPACING_RATIO).abs() < 1e-9);

        for row in 0..6 {
            for col in 0..6 {
                let coord = GridCoord::new(row, col);
                let center = layout.center(coord).unwrap();
                assert_eq!(layout.coord_at(center), Some(coord));
            }
        }

        // Odd rows are shifted right by half a cell.
        let even = layout.center(GridCoord::new(0, 0)).unwrap();
        let odd = layout.center(GridCoord::new(1, 0)).unwrap();
        assert!((odd.x - even.x - delta.x * 0.5).abs() < 1e-9);
    }
}
