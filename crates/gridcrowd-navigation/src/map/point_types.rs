//! Coordinate types shared by the grid map, the solver and the path manager.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use gridcrowd_kinematics::Vec2 as WorldPoint;

/// Address of a grid cell.
///
/// `row` grows along the world y axis and `col` along the world x axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridCoord {
    /// Row index.
    pub row: usize,
    /// Column index.
    pub col: usize,
}

impl GridCoord {
    /// Creates a new grid coordinate.
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Row-major linear index into a grid with `cols` columns.
    pub const fn index(&self, cols: usize) -> usize {
        self.row * cols + self.col
    }

    /// Applies a signed `(d_col, d_row)` offset, returning `None` on underflow.
    pub fn offset(&self, d_col: isize, d_row: isize) -> Option<GridCoord> {
        Some(GridCoord {
            row: self.row.checked_add_signed(d_row)?,
            col: self.col.checked_add_signed(d_col)?,
        })
    }
}

impl fmt::Display for GridCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[r{}, c{}]", self.row, self.col)
    }
}

impl From<(usize, usize)> for GridCoord {
    fn from((row, col): (usize, usize)) -> Self {
        GridCoord { row, col }
    }
}
