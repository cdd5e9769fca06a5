//! Disk-shaped agents following a planned grid route.
//!
//! Each tick an agent keeps its path in sync with the grid, steers toward the
//! next waypoint, lets its avoidance strategy adjust the velocity, integrates
//! its position and reports cell changes through the command invoker.

use std::collections::BTreeMap;
use std::fmt;

use gridcrowd_kinematics::{Vec2, integrate_position};
use gridcrowd_navigation::{
    DynamicInfo, GridCoord, GridMap, GridQuery, NavigationError, OccupantId, PathHandle, PathManager,
};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::avoidance::{AvoidanceStrategy, AvoidanceSystem, Neighborhood};
use crate::commands::{Invoker, MoveAgent};
use crate::error::SimulationError;

/// Distance at which a waypoint counts as reached.
pub const ARRIVAL_TOLERANCE: f64 = 2.0;
/// Full width of the per-axis steering perturbation.
const NOISE_SCALE: f64 = 0.1;

/// Stable identity of an agent; also its id in cell occupancy lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(u64);

impl AgentId {
    /// The raw id, as stored in occupancy lists.
    pub fn raw(self) -> OccupantId {
        self.0
    }
}

impl From<OccupantId> for AgentId {
    fn from(raw: OccupantId) -> Self {
        AgentId(raw)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// Physical parameters of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentParams {
    /// Disk radius in world units.
    pub radius: f64,
    /// Speed limit in world units per second.
    pub max_speed: f64,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self { radius: 10.0, max_speed: 30.0 }
    }
}

impl AgentParams {
    /// Rejects negative radii and non-positive speeds.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.radius >= 0.0) || !self.radius.is_finite() {
            return Err(SimulationError::Configuration("agent radius must be non-negative"));
        }
        if !(self.max_speed > 0.0) || !self.max_speed.is_finite() {
            return Err(SimulationError::Configuration("agent speed must be positive"));
        }
        Ok(())
    }
}

/// Origin and destination cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    /// Spawn cell.
    pub start: GridCoord,
    /// Goal cell.
    pub end: GridCoord,
}

/// Snapshot of an agent handed to avoidance strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentState {
    pub id: AgentId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub preferred_velocity: Vec2,
    pub radius: f64,
    pub max_speed: f64,
}

/// Everything an agent reads or writes during one update.
pub struct TickContext<'a> {
    pub grid: &'a GridMap,
    pub paths: &'a PathManager,
    /// Every agent except the one being updated.
    pub others: &'a BTreeMap<AgentId, Agent>,
    pub system: Option<&'a mut AvoidanceSystem>,
    pub invoker: &'a mut Invoker,
    pub rng: &'a mut StdRng,
    /// Steer through the midpoints between consecutive cell centers.
    pub midpoint_path: bool,
}

/// A moving agent.
#[derive(Debug)]
pub struct Agent {
    id: AgentId,
    route: Route,
    params: AgentParams,
    position: Vec2,
    velocity: Vec2,
    preferred_velocity: Vec2,
    final_position: Vec2,
    waypoints: Vec<Vec2>,
    waypoint_index: usize,
    path: Option<PathHandle>,
    /// First cell of the current plan; moves with every reroute.
    leg_start: GridCoord,
    expanded: bool,
    route_found: bool,
    cell: GridCoord,
    strategy: Option<AvoidanceStrategy>,
}

impl Agent {
    /// Places a new agent at the center of `route.start`.
    ///
    /// # Errors
    /// `Configuration` for invalid parameters, `Navigation(OutOfBounds)` if
    /// either route cell lies outside `grid`.
    pub fn new(id: AgentId, route: Route, params: AgentParams, grid: &GridMap) -> Result<Self, SimulationError> {
        params.validate()?;
        let position = grid
            .center(route.start)
            .ok_or(NavigationError::OutOfBounds("route start outside the grid"))?;
        let final_position = grid
            .center(route.end)
            .ok_or(NavigationError::OutOfBounds("route end outside the grid"))?;

        Ok(Self {
            id,
            route,
            params,
            position,
            velocity: Vec2::ZERO,
            preferred_velocity: Vec2::ZERO,
            final_position,
            waypoints: Vec::new(),
            waypoint_index: 0,
            path: None,
            leg_start: route.start,
            expanded: false,
            route_found: false,
            cell: route.start,
            strategy: None,
        })
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn params(&self) -> AgentParams {
        self.params
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn preferred_velocity(&self) -> Vec2 {
        self.preferred_velocity
    }

    pub fn radius(&self) -> f64 {
        self.params.radius
    }

    pub fn max_speed(&self) -> f64 {
        self.params.max_speed
    }

    /// Cell the agent is registered in.
    pub fn cell(&self) -> GridCoord {
        self.cell
    }

    /// Remaining and visited steering targets of the current plan.
    pub fn waypoints(&self) -> &[Vec2] {
        &self.waypoints
    }

    /// Index of the waypoint being steered toward.
    pub fn waypoint_index(&self) -> usize {
        self.waypoint_index
    }

    /// The owned path handle, once requested.
    pub fn path(&self) -> Option<&PathHandle> {
        self.path.as_ref()
    }

    pub fn strategy(&self) -> Option<&AvoidanceStrategy> {
        self.strategy.as_ref()
    }

    /// Replaces the strategy, returning the previous one.
    pub fn set_strategy(&mut self, strategy: Option<AvoidanceStrategy>) -> Option<AvoidanceStrategy> {
        std::mem::replace(&mut self.strategy, strategy)
    }

    /// Whether a route was found and every waypoint has been reached.
    pub fn has_arrived(&self) -> bool {
        self.route_found && self.waypoint_index >= self.waypoints.len()
    }

    pub fn state(&self) -> AgentState {
        AgentState {
            id: self.id,
            position: self.position,
            velocity: self.velocity,
            preferred_velocity: self.preferred_velocity,
            radius: self.params.radius,
            max_speed: self.params.max_speed,
        }
    }

    /// Advances the agent by `dt` seconds.
    pub fn update(&mut self, dt: f64, ctx: &mut TickContext<'_>) -> Result<(), SimulationError> {
        self.sync_route(ctx)?;

        if self.has_arrived() {
            self.position = self.final_position;
            self.velocity = Vec2::ZERO;
            self.preferred_velocity = Vec2::ZERO;
            self.track_cell(ctx);
            return Ok(());
        }

        self.preferred_velocity = match self.waypoints.get(self.waypoint_index) {
            Some(&goal) => self.steer_toward(goal, ctx.rng),
            None => Vec2::ZERO,
        };

        let me = self.state();
        let view = Neighborhood { grid: ctx.grid, agents: ctx.others };
        self.velocity = match (self.strategy.as_mut(), ctx.system.as_deref_mut()) {
            (Some(strategy), Some(system)) => strategy.compute_velocity(&me, system, &view),
            _ => self.preferred_velocity,
        };

        self.position = integrate_position(self.position, self.velocity, dt)?;
        if let Some(&goal) = self.waypoints.get(self.waypoint_index) {
            if (goal - self.position).length_squared() < ARRIVAL_TOLERANCE * ARRIVAL_TOLERANCE {
                self.waypoint_index += 1;
                trace!(agent = %self.id, index = self.waypoint_index, "Waypoint reached");
            }
        }

        self.track_cell(ctx);
        Ok(())
    }

    /// Sends the agent back to its start cell with a fresh path.
    pub fn reset(&mut self, grid: &GridMap, invoker: &mut Invoker) {
        self.path = None;
        self.expanded = false;
        self.route_found = false;
        self.waypoints.clear();
        self.waypoint_index = 0;
        self.velocity = Vec2::ZERO;
        self.preferred_velocity = Vec2::ZERO;
        self.leg_start = self.route.start;
        if let Some(start) = grid.center(self.route.start) {
            self.position = start;
        }
        if self.cell != self.route.start {
            invoker.submit(MoveAgent::new(self.id, self.cell, self.route.start));
            self.cell = self.route.start;
        }
    }

    /// Path speed in cells per second, from the mean cell extent.
    fn cells_per_second(&self, grid: &GridMap) -> f64 {
        let extent = grid.cell_extent();
        let mean = (extent.x + extent.y) / 2.0;
        if mean > 0.0 { self.params.max_speed / mean } else { self.params.max_speed }
    }

    fn sync_route(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SimulationError> {
        if self.path.is_none() {
            let info = DynamicInfo { velocity: self.cells_per_second(ctx.grid), radius: self.params.radius };
            self.path = Some(ctx.paths.request_path(info, self.route.start, self.route.end)?);
            self.leg_start = self.route.start;
            self.expanded = false;
        }
        let Some(handle) = self.path.as_ref() else {
            return Ok(());
        };

        if ctx.paths.take_changed(handle) {
            let from = ctx.grid.clamped_coord_at(self.position).unwrap_or(self.leg_start);
            ctx.paths.reroute(handle, from, self.route.end)?;
            debug!(agent = %self.id, %from, "Path changed, rerouting");
            self.leg_start = from;
            self.expanded = false;
        }

        if !self.expanded {
            ctx.paths.get_path(handle, self.leg_start, self.route.end, ctx.grid)?;
            let centers: Vec<Vec2> = ctx
                .paths
                .sequence(handle)?
                .into_iter()
                .filter_map(|c| ctx.grid.center(c))
                .collect();

            self.route_found = !centers.is_empty();
            if let Some(&last) = centers.last() {
                self.final_position = last;
            }
            self.waypoints = expand_waypoints(&centers, ctx.midpoint_path);
            self.waypoint_index = 0;
            self.expanded = true;
            debug!(agent = %self.id, waypoints = self.waypoints.len(), found = self.route_found, "Waypoints expanded");
        }
        Ok(())
    }

    /// Unit direction to `goal`, perturbed, scaled to max speed.
    fn steer_toward(&self, goal: Vec2, rng: &mut StdRng) -> Vec2 {
        let direction = (goal - self.position).normalize_or_zero();
        if direction == Vec2::ZERO {
            return Vec2::ZERO;
        }
        let mut noise = || (rng.random_range(0..100) as f64 / 100.0 - 0.5) * NOISE_SCALE;
        let perturbed = direction + Vec2::new(noise(), noise());
        perturbed.normalize_or_zero() * self.params.max_speed
    }

    fn track_cell(&mut self, ctx: &mut TickContext<'_>) {
        let Some(cell) = ctx.grid.clamped_coord_at(self.position) else {
            return;
        };
        if cell != self.cell {
            ctx.invoker.submit(MoveAgent::new(self.id, self.cell, cell));
            self.cell = cell;
        }
    }
}

/// Steering targets for a sequence of cell centers, skipping the first.
///
/// With `midpoint`, each target is the midpoint between consecutive centers
/// and the final center is appended.
pub fn expand_waypoints(centers: &[Vec2], midpoint: bool) -> Vec<Vec2> {
    let Some((&first, rest)) = centers.split_first() else {
        return Vec::new();
    };
    if !midpoint {
        return rest.to_vec();
    }

    let mut waypoints = Vec::with_capacity(rest.len() + 1);
    let mut previous = first;
    for &center in rest {
        waypoints.push(previous.lerp(center, 0.5));
        previous = center;
    }
    if !rest.is_empty() {
        waypoints.push(previous);
    }
    waypoints
}
