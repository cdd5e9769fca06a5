//! Grid reservation table: one agent per cell per tick.
//!
//! The table is rebuilt from scratch every pre-step. Agents are served in
//! update order, so the first agent to claim a cell keeps it and later
//! claimants hold still until the next tick.

use std::collections::{HashMap, HashSet};

use gridcrowd_kinematics::Vec2;
use gridcrowd_navigation::{GridCoord, GridMap, GridQuery};
use tracing::trace;

use super::Neighborhood;
use crate::agent::{AgentId, AgentState};

/// How far ahead, in seconds, an agent checks its next cell.
pub const LOOKAHEAD: f64 = 0.1;

const STILL_SQUARED: f64 = 1e-6;

/// Per-tick cell claims plus a cache of static walls.
#[derive(Debug, Clone, Default)]
pub struct ReservationSystem {
    reservations: HashMap<GridCoord, AgentId>,
    walls: HashSet<GridCoord>,
}

impl ReservationSystem {
    /// Clears every claim and resyncs the wall cache with `grid`.
    pub fn pre_step(&mut self, grid: &GridMap) {
        self.reservations.clear();
        self.walls.clear();
        self.walls.extend(grid.blocking_cells());
    }

    /// Agent holding `coord` this tick, if any.
    pub fn holder(&self, coord: GridCoord) -> Option<AgentId> {
        self.reservations.get(&coord).copied()
    }

    /// Number of cells claimed this tick.
    pub fn reserved(&self) -> usize {
        self.reservations.len()
    }

    fn reserve(&mut self, coord: GridCoord, id: AgentId) {
        self.reservations.insert(coord, id);
    }

    /// Whether `id` may enter `coord`. Cells outside the grid count as walls.
    fn is_open(&self, coord: Option<GridCoord>, id: AgentId) -> bool {
        let Some(coord) = coord else {
            return false;
        };
        if self.walls.contains(&coord) {
            return false;
        }
        self.holder(coord).is_none_or(|holder| holder == id)
    }
}

/// Per-agent side of the reservation strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationStrategy;

impl ReservationStrategy {
    /// Claims the cell the agent is about to enter and returns the preferred
    /// velocity, or claims the current cell and returns zero when the next
    /// cell is taken, a wall, or off the grid.
    pub fn compute_velocity(&self, me: &AgentState, system: &mut ReservationSystem, view: &Neighborhood<'_>) -> Vec2 {
        let Some(current) = view.grid.clamped_coord_at(me.position) else {
            return Vec2::ZERO;
        };

        if me.preferred_velocity.length_squared() < STILL_SQUARED {
            system.reserve(current, me.id);
            return Vec2::ZERO;
        }

        let ahead = view.grid.coord_at(me.position + me.preferred_velocity * LOOKAHEAD);
        match ahead {
            Some(next) if system.is_open(ahead, me.id) => {
                system.reserve(next, me.id);
                me.preferred_velocity
            }
            _ => {
                trace!(agent = %me.id, cell = %current, "Next cell unavailable, holding");
                system.reserve(current, me.id);
                Vec2::ZERO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcrowd_navigation::{CellContent, GridConfig, GridTopology, WorldPoint};
    use std::collections::BTreeMap;

    fn grid() -> GridMap {
        GridMap::with_config(GridConfig {
            rows: 1,
            cols: 3,
            topology: GridTopology::Square,
            area_start: WorldPoint::new(0.0, 0.0),
            area_end: WorldPoint::new(3.0, 1.0),
            regular: false,
        })
        .unwrap()
    }

    fn state(id: u64, x: f64, vx: f64) -> AgentState {
        AgentState {
            id: AgentId::from(id),
            position: Vec2::new(x, 0.5),
            velocity: Vec2::ZERO,
            preferred_velocity: Vec2::new(vx, 0.0),
            radius: 0.1,
            max_speed: 10.0,
        }
    }

    #[test]
    fn test_contested_cell_goes_to_first_claimant() {
        let g = grid();
        let agents = BTreeMap::new();
        let view = Neighborhood { grid: &g, agents: &agents };
        let mut system = ReservationSystem::default();
        system.pre_step(&g);

        // Both agents look one unit ahead into the middle cell.
        let left = state(1, 0.5, 10.0);
        let right = state(2, 2.5, -10.0);
        let strategy = ReservationStrategy;

        assert_eq!(strategy.compute_velocity(&left, &mut system, &view), Vec2::new(10.0, 0.0));
        assert_eq!(strategy.compute_velocity(&right, &mut system, &view), Vec2::ZERO);
        assert_eq!(system.holder(GridCoord::new(0, 1)), Some(AgentId::from(1)));
        assert_eq!(system.holder(GridCoord::new(0, 2)), Some(AgentId::from(2)));
    }

    #[test]
    fn test_pre_step_clears_claims() {
        let g = grid();
        let agents = BTreeMap::new();
        let view = Neighborhood { grid: &g, agents: &agents };
        let mut system = ReservationSystem::default();
        system.pre_step(&g);
        ReservationStrategy.compute_velocity(&state(1, 0.5, 10.0), &mut system, &view);
        assert_eq!(system.reserved(), 1);

        system.pre_step(&g);
        assert_eq!(system.reserved(), 0);
    }

    #[test]
    fn test_walls_and_edges_block() {
        let mut g = grid();
        g.set_content(GridCoord::new(0, 1), CellContent::Obstacle).unwrap();
        let agents = BTreeMap::new();
        let view = Neighborhood { grid: &g, agents: &agents };
        let mut system = ReservationSystem::default();
        system.pre_step(&g);

        assert_eq!(ReservationStrategy.compute_velocity(&state(1, 0.5, 10.0), &mut system, &view), Vec2::ZERO);
        // Looking past the right edge.
        assert_eq!(ReservationStrategy.compute_velocity(&state(2, 2.5, 10.0), &mut system, &view), Vec2::ZERO);
    }

    #[test]
    fn test_still_agent_holds_its_cell() {
        let g = grid();
        let agents = BTreeMap::new();
        let view = Neighborhood { grid: &g, agents: &agents };
        let mut system = ReservationSystem::default();
        system.pre_step(&g);

        assert_eq!(ReservationStrategy.compute_velocity(&state(1, 1.5, 0.0), &mut system, &view), Vec2::ZERO);
        assert_eq!(system.holder(GridCoord::new(0, 1)), Some(AgentId::from(1)));
    }
}
