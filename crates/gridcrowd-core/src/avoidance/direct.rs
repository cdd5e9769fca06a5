//! Direct geometric repulsion between agents sharing a neighborhood of cells.

use std::iter;

use gridcrowd_kinematics::Vec2;
use gridcrowd_navigation::GridQuery;

use super::Neighborhood;
use crate::agent::{AgentId, AgentState};

/// Distances below this are treated as coincident and ignored.
const MIN_SEPARATION: f64 = 0.001;
/// Repulsion range as a multiple of the combined radii.
const RANGE_FACTOR: f64 = 3.0;

/// System side of the direct strategy. Holds no per-tick state.
#[derive(Debug, Clone, Default)]
pub struct DirectSystem;

/// Per-agent repulsion parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectStrategy {
    /// Scales the push strength, `1.0` by default.
    pub push_factor: f64,
}

impl Default for DirectStrategy {
    fn default() -> Self {
        Self { push_factor: 1.0 }
    }
}

impl DirectStrategy {
    /// Preferred velocity plus a push away from every agent closer than
    /// three combined radii, scanned in the agent's cell and its neighbors.
    ///
    /// The result is clamped to the agent's max speed when any push applied.
    pub fn compute_velocity(&self, me: &AgentState, view: &Neighborhood<'_>) -> Vec2 {
        let Some(cell) = view.grid.clamped_coord_at(me.position) else {
            return me.preferred_velocity;
        };

        let strength = self.push_factor * 2.0 * me.max_speed;
        let mut push = Vec2::ZERO;
        let mut threats = 0;

        for coord in iter::once(cell).chain(view.grid.neighbors(cell)) {
            for &occupant in view.grid.occupants(coord) {
                let id = AgentId::from(occupant);
                if id == me.id {
                    continue;
                }
                let Some(other) = view.agents.get(&id) else {
                    continue;
                };

                let offset = other.position() - me.position;
                let distance = offset.length();
                let range = RANGE_FACTOR * (me.radius + other.radius());
                if distance > MIN_SEPARATION && distance < range {
                    push -= offset / distance * ((range - distance) / range) * strength;
                    threats += 1;
                }
            }
        }

        if threats == 0 {
            me.preferred_velocity
        } else {
            (me.preferred_velocity + push).clamp_length(me.max_speed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentParams, Route};
    use gridcrowd_navigation::{GridConfig, GridCoord, GridMap, GridTopology, WorldPoint};
    use std::collections::BTreeMap;

    fn grid() -> GridMap {
        GridMap::with_config(GridConfig {
            rows: 5,
            cols: 5,
            topology: GridTopology::Square,
            area_start: WorldPoint::new(0.0, 0.0),
            area_end: WorldPoint::new(50.0, 50.0),
            regular: true,
        })
        .unwrap()
    }

    fn state(id: u64, position: Vec2, preferred: Vec2) -> AgentState {
        AgentState {
            id: AgentId::from(id),
            position,
            velocity: Vec2::ZERO,
            preferred_velocity: preferred,
            radius: 2.0,
            max_speed: 5.0,
        }
    }

    #[test]
    fn test_no_neighbors_keeps_preference() {
        let g = grid();
        let agents = BTreeMap::new();
        let view = Neighborhood { grid: &g, agents: &agents };
        let me = state(1, Vec2::new(25.0, 25.0), Vec2::new(3.0, 0.0));

        assert_eq!(DirectStrategy::default().compute_velocity(&me, &view), Vec2::new(3.0, 0.0));
    }

    #[test]
    fn test_close_neighbor_pushes_away() {
        let mut g = grid();
        let params = AgentParams { radius: 2.0, max_speed: 5.0 };
        let route = Route { start: GridCoord::new(2, 3), end: GridCoord::new(2, 3) };
        let other = Agent::new(AgentId::from(2), route, params, &g).unwrap();
        g.enter(route.start, 2);
        let mut agents = BTreeMap::new();
        agents.insert(other.id(), other);

        // The other agent sits at (35, 25), six units to the right.
        let me = state(1, Vec2::new(29.0, 25.0), Vec2::new(1.0, 0.0));
        let view = Neighborhood { grid: &g, agents: &agents };
        let v = DirectStrategy::default().compute_velocity(&me, &view);

        assert!(v.x < 0.0, "{v}");
        assert!(v.length() <= 5.0 + 1e-9);
    }

    #[test]
    fn test_far_neighbor_is_ignored() {
        let mut g = grid();
        let params = AgentParams { radius: 2.0, max_speed: 5.0 };
        let route = Route { start: GridCoord::new(2, 3), end: GridCoord::new(2, 3) };
        let other = Agent::new(AgentId::from(2), route, params, &g).unwrap();
        g.enter(route.start, 2);
        let mut agents = BTreeMap::new();
        agents.insert(other.id(), other);

        // Twelve units apart with a range of 3 * (2 + 2).
        let me = state(1, Vec2::new(23.0, 25.0), Vec2::new(1.0, 0.0));
        let view = Neighborhood { grid: &g, agents: &agents };
        assert_eq!(DirectStrategy::default().compute_velocity(&me, &view), Vec2::new(1.0, 0.0));
    }
}
