//! The grid map: layout, cell contents and per-cell agent occupancy.
//!
//! Allocation runs an ordered validation pipeline over a [`GridConfig`] and
//! stops at the first failing stage. Every structural change (allocation,
//! resize, topology swap, deallocation, cell content edit) is published on
//! the map's [`ChangeFeed`]. Occupancy changes are not structural and are
//! not published.

#![warn(missing_docs)]

use tracing::{debug, error, info};

use crate::error::NavigationError;
use crate::map::feed::{ChangeFeed, GridChange};
use crate::map::point_types::{GridCoord, WorldPoint};
use crate::map::topology::{GridLayout, GridTopology};
use crate::map::GridQuery;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of an agent registered in a cell's occupancy list.
pub type OccupantId = u64;

/// What a cell holds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CellContent {
    /// Free space.
    #[default]
    Empty,
    /// A static wall. The only blocking content.
    Obstacle,
    /// Spawn point of a route.
    Origin {
        /// Paired destination cell, once placed.
        destination: Option<GridCoord>,
    },
    /// Goal of a route.
    Destination {
        /// Paired origin cell.
        origin: Option<GridCoord>,
    },
}

impl CellContent {
    /// Whether agents must route around this content.
    pub fn is_blocking(&self) -> bool {
        matches!(self, CellContent::Obstacle)
    }
}

/// One grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cell {
    /// Cell content.
    pub content: CellContent,
    /// Phase of the visual pulse effect, in seconds, when the cell is pulsing.
    pub pulse: Option<f64>,
}

/// Parameters for [`GridMap::allocate`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridConfig {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
    /// Cell shape.
    pub topology: GridTopology,
    /// World position of the grid corner.
    pub area_start: WorldPoint,
    /// World position of the opposite corner.
    pub area_end: WorldPoint,
    /// Force square cells (square topology only).
    pub regular: bool,
}

/// Working state threaded through the allocation pipeline.
struct AllocationParam<'a> {
    config: &'a GridConfig,
    cells: usize,
    layout: Option<GridLayout>,
}

type AllocationStage = fn(&mut AllocationParam<'_>) -> Result<(), NavigationError>;

/// Allocation stages, run in order.
const ALLOCATION_PIPELINE: [(&str, AllocationStage); 3] = [
    ("dimensions", check_dimensions),
    ("area", check_area),
    ("layout", build_layout),
];

fn check_dimensions(param: &mut AllocationParam<'_>) -> Result<(), NavigationError> {
    let GridConfig { rows, cols, .. } = *param.config;
    if rows == 0 || cols == 0 {
        return Err(NavigationError::InvalidDimensions("rows and cols must be non-zero"));
    }
    param.cells = rows
        .checked_mul(cols)
        .ok_or(NavigationError::InvalidDimensions(
            "grid dimensions too large, would cause overflow",
        ))?;
    Ok(())
}

fn check_area(param: &mut AllocationParam<'_>) -> Result<(), NavigationError> {
    let size = param.config.area_end - param.config.area_start;
    if !size.x.is_finite() || !size.y.is_finite() {
        return Err(NavigationError::InvalidArea("area corners must be finite"));
    }
    if size.x == 0.0 || size.y == 0.0 {
        return Err(NavigationError::InvalidArea("area must have non-zero width and height"));
    }
    Ok(())
}

fn build_layout(param: &mut AllocationParam<'_>) -> Result<(), NavigationError> {
    let c = param.config;
    param.layout = Some(GridLayout::new(
        c.topology,
        c.rows,
        c.cols,
        c.area_start,
        c.area_end,
        c.regular,
    ));
    Ok(())
}

/// Runs every allocation stage and returns the resulting layout.
fn run_pipeline(config: &GridConfig) -> Result<(GridLayout, usize), NavigationError> {
    let mut param = AllocationParam { config, cells: 0, layout: None };
    for (name, stage) in ALLOCATION_PIPELINE {
        if let Err(e) = stage(&mut param) {
            error!(stage = name, error = %e, "Grid allocation rejected");
            return Err(e);
        }
    }
    let layout = param
        .layout
        .ok_or(NavigationError::InvalidDimensions("pipeline produced no layout"))?;
    Ok((layout, param.cells))
}

/// The simulation grid.
#[derive(Debug, Default)]
pub struct GridMap {
    config: Option<GridConfig>,
    layout: Option<GridLayout>,
    cells: Vec<Cell>,
    occupants: Vec<Vec<OccupantId>>,
    feed: ChangeFeed,
}

impl GridMap {
    /// Creates an unallocated grid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and allocates a grid in one step.
    ///
    /// # Errors
    /// Any error from [`GridMap::allocate`].
    pub fn with_config(config: GridConfig) -> Result<Self, NavigationError> {
        let mut grid = Self::new();
        grid.allocate(config)?;
        Ok(grid)
    }

    /// Allocates the grid, discarding any previous contents.
    ///
    /// # Errors
    /// Returns the error of the first allocation stage that rejects `config`:
    /// zero or overflowing dimensions, then a degenerate area.
    pub fn allocate(&mut self, config: GridConfig) -> Result<(), NavigationError> {
        let (layout, cells) = run_pipeline(&config)?;

        self.cells = vec![Cell::default(); cells];
        self.occupants = vec![Vec::new(); cells];
        self.layout = Some(layout);
        self.config = Some(config);

        info!(rows = config.rows, cols = config.cols, topology = %config.topology, "Grid allocated");
        self.publish_layout();
        Ok(())
    }

    /// Changes the row/column count, keeping the contents of overlapping cells.
    ///
    /// # Errors
    /// `NotAllocated` before the first allocation, else any pipeline error.
    pub fn resize(&mut self, rows: usize, cols: usize) -> Result<(), NavigationError> {
        let old = self.config.ok_or(NavigationError::NotAllocated)?;
        let config = GridConfig { rows, cols, ..old };
        let (layout, cells) = run_pipeline(&config)?;

        let mut new_cells = vec![Cell::default(); cells];
        let mut new_occupants = vec![Vec::new(); cells];
        for row in 0..rows.min(old.rows) {
            for col in 0..cols.min(old.cols) {
                let coord = GridCoord::new(row, col);
                let (from, to) = (coord.index(old.cols), coord.index(cols));
                new_cells[to] = self.cells[from];
                new_occupants[to] = std::mem::take(&mut self.occupants[from]);
            }
        }

        self.cells = new_cells;
        self.occupants = new_occupants;
        self.layout = Some(layout);
        self.config = Some(config);

        info!(rows, cols, "Grid resized");
        self.publish_layout();
        Ok(())
    }

    /// Swaps the cell topology, keeping dimensions and contents.
    ///
    /// # Errors
    /// `NotAllocated` before the first allocation.
    pub fn set_topology(&mut self, topology: GridTopology) -> Result<(), NavigationError> {
        let old = self.config.ok_or(NavigationError::NotAllocated)?;
        let config = GridConfig { topology, ..old };
        let (layout, _) = run_pipeline(&config)?;
        self.layout = Some(layout);
        self.config = Some(config);

        info!(%topology, "Grid topology changed");
        self.publish_layout();
        Ok(())
    }

    /// Releases all cells.
    pub fn deallocate(&mut self) {
        if self.layout.take().is_none() {
            return;
        }
        self.config = None;
        self.cells.clear();
        self.occupants.clear();
        info!("Grid deallocated");
        self.publish_layout();
    }

    fn publish_layout(&self) {
        let (rows, cols) = self.dimensions();
        self.feed.notify(GridChange::Layout { rows, cols });
    }

    /// Whether the grid currently has cells.
    pub fn is_allocated(&self) -> bool {
        self.layout.is_some()
    }

    /// The current layout, if allocated.
    pub fn layout(&self) -> Option<&GridLayout> {
        self.layout.as_ref()
    }

    /// The configuration of the current allocation.
    pub fn config(&self) -> Option<&GridConfig> {
        self.config.as_ref()
    }

    /// The change notification channel.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    fn index_of(&self, coord: GridCoord) -> Option<usize> {
        let layout = self.layout.as_ref()?;
        layout.is_valid(coord).then(|| coord.index(layout.cols()))
    }

    fn checked_index(&self, coord: GridCoord) -> Result<usize, NavigationError> {
        if !self.is_allocated() {
            return Err(NavigationError::NotAllocated);
        }
        self.index_of(coord)
            .ok_or(NavigationError::OutOfBounds("coordinate outside the grid"))
    }

    /// The cell at `coord`.
    pub fn cell(&self, coord: GridCoord) -> Option<&Cell> {
        self.index_of(coord).map(|i| &self.cells[i])
    }

    /// Replaces the content of `coord`, returning the previous content.
    ///
    /// # Errors
    /// `NotAllocated` or `OutOfBounds`.
    pub fn set_content(
        &mut self,
        coord: GridCoord,
        content: CellContent,
    ) -> Result<CellContent, NavigationError> {
        let index = self.checked_index(coord)?;
        let previous = std::mem::replace(&mut self.cells[index].content, content);
        if previous != content {
            let blocking_changed = previous.is_blocking() != content.is_blocking();
            debug!(%coord, ?content, blocking_changed, "Cell content changed");
            self.feed.notify(GridChange::Cell { coord, blocking_changed });
        }
        Ok(previous)
    }

    /// Empties `coord`, returning what it held.
    ///
    /// # Errors
    /// `NotAllocated` or `OutOfBounds`.
    pub fn take_content(&mut self, coord: GridCoord) -> Result<CellContent, NavigationError> {
        self.set_content(coord, CellContent::Empty)
    }

    /// Starts or stops the visual pulse on `coord`. Blocking is unaffected.
    ///
    /// # Errors
    /// `NotAllocated` or `OutOfBounds`.
    pub fn set_pulsing(&mut self, coord: GridCoord, pulsing: bool) -> Result<(), NavigationError> {
        let index = self.checked_index(coord)?;
        self.cells[index].pulse = pulsing.then_some(0.0);
        Ok(())
    }

    /// Advances every pulse phase by `dt` seconds.
    pub fn advance_pulses(&mut self, dt: f64) {
        for phase in self.cells.iter_mut().filter_map(|c| c.pulse.as_mut()) {
            *phase += dt;
        }
    }

    /// Coordinates of every blocking cell.
    pub fn blocking_cells(&self) -> impl Iterator<Item = GridCoord> + '_ {
        let cols = self.layout.as_ref().map_or(1, GridLayout::cols);
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.content.is_blocking())
            .map(move |(i, _)| GridCoord::new(i / cols, i % cols))
    }

    /// Agents registered in `coord`. Empty outside the grid.
    pub fn occupants(&self, coord: GridCoord) -> &[OccupantId] {
        self.index_of(coord)
            .map_or(&[][..], |i| self.occupants[i].as_slice())
    }

    /// Registers `id` in `coord`. Returns `false` outside the grid or if already present.
    pub fn enter(&mut self, coord: GridCoord, id: OccupantId) -> bool {
        let Some(index) = self.index_of(coord) else {
            return false;
        };
        let list = &mut self.occupants[index];
        if list.contains(&id) {
            return false;
        }
        list.push(id);
        true
    }

    /// Removes `id` from `coord`. Returns `false` if it was not there.
    pub fn leave(&mut self, coord: GridCoord, id: OccupantId) -> bool {
        let Some(index) = self.index_of(coord) else {
            return false;
        };
        let list = &mut self.occupants[index];
        match list.iter().position(|&o| o == id) {
            Some(pos) => {
                list.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Moves `id` between occupancy lists. The move fails if `to` is outside the grid.
    pub fn move_occupant(&mut self, id: OccupantId, from: GridCoord, to: GridCoord) -> bool {
        if self.index_of(to).is_none() {
            return false;
        }
        self.leave(from, id);
        self.enter(to, id)
    }
}

impl GridQuery for GridMap {
    fn dimensions(&self) -> (usize, usize) {
        self.layout.as_ref().map_or((0, 0), |l| (l.rows(), l.cols()))
    }

    fn is_blocking(&self, coord: GridCoord) -> bool {
        self.cell(coord).is_some_and(|c| c.content.is_blocking())
    }

    fn neighbors(&self, coord: GridCoord) -> Vec<GridCoord> {
        self.layout
            .as_ref()
            .map_or_else(Vec::new, |l| l.neighbors(coord))
    }

    fn center(&self, coord: GridCoord) -> Option<WorldPoint> {
        self.layout.as_ref()?.center(coord)
    }

    fn coord_at(&self, point: WorldPoint) -> Option<GridCoord> {
        self.layout.as_ref()?.coord_at(point)
    }

    fn clamped_coord_at(&self, point: WorldPoint) -> Option<GridCoord> {
        Some(self.layout.as_ref()?.clamped_coord_at(point))
    }

    fn cell_extent(&self) -> WorldPoint {
        self.layout
            .as_ref()
            .map_or(WorldPoint::ZERO, GridLayout::cell_extent)
    }
}
