//! Typed simulation settings.
//!
//! Deserialized by the runner from `config/default.toml`; every field has a
//! default so partial files are accepted. [`Settings::validate`] runs the
//! checks in a fixed order and reports the first failure.

use gridcrowd_navigation::{GridConfig, GridCoord, GridTopology, WorldPoint};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::agent::{AgentParams, Route};
use crate::avoidance::{AvoidanceFactory, AvoidanceKind};
use crate::error::SimulationError;
use crate::rvo::AgentDefaults;

/// Root of the settings tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub grid: GridSettings,
    pub simulation: SimulationSettings,
    pub agents: AgentSettings,
    pub orca: OrcaSettings,
    pub scenario: ScenarioSettings,
}

/// Grid layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub rows: usize,
    pub cols: usize,
    pub topology: GridTopology,
    /// World position `[x, y]` of the grid corner.
    pub area_start: [f64; 2],
    /// World position `[x, y]` of the opposite corner.
    pub area_end: [f64; 2],
    pub regular: bool,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            rows: 20,
            cols: 20,
            topology: GridTopology::Square,
            area_start: [0.0, 0.0],
            area_end: [800.0, 800.0],
            regular: true,
        }
    }
}

impl GridSettings {
    pub fn to_config(&self) -> GridConfig {
        GridConfig {
            rows: self.rows,
            cols: self.cols,
            topology: self.topology,
            area_start: WorldPoint::new(self.area_start[0], self.area_start[1]),
            area_end: WorldPoint::new(self.area_end[0], self.area_end[1]),
            regular: self.regular,
        }
    }

    fn contains(&self, [row, col]: [usize; 2]) -> bool {
        row < self.rows && col < self.cols
    }
}

/// Scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Fixed steps per second; `0` for variable steps.
    pub fps: f64,
    /// Avoidance algorithm; none means agents follow their preferred velocity.
    pub avoidance: Option<AvoidanceKind>,
    pub midpoint_path: bool,
    /// Seed of the steering noise.
    pub seed: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self { fps: 60.0, avoidance: None, midpoint_path: false, seed: 7 }
    }
}

/// Parameters of spawned agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub radius: f64,
    /// World units per second.
    pub speed: f64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        let params = AgentParams::default();
        Self { radius: params.radius, speed: params.max_speed }
    }
}

impl AgentSettings {
    pub fn params(&self) -> AgentParams {
        AgentParams { radius: self.radius, max_speed: self.speed }
    }
}

/// ORCA solver defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrcaSettings {
    pub neighbor_dist: f64,
    pub max_neighbors: usize,
    pub time_horizon: f64,
    pub radius: f64,
    pub max_speed: f64,
}

impl Default for OrcaSettings {
    fn default() -> Self {
        let d = AgentDefaults::default();
        Self {
            neighbor_dist: d.neighbor_dist,
            max_neighbors: d.max_neighbors,
            time_horizon: d.time_horizon,
            radius: d.radius,
            max_speed: d.max_speed,
        }
    }
}

impl OrcaSettings {
    pub fn defaults(&self) -> AgentDefaults {
        AgentDefaults {
            neighbor_dist: self.neighbor_dist,
            max_neighbors: self.max_neighbors,
            time_horizon: self.time_horizon,
            radius: self.radius,
            max_speed: self.max_speed,
        }
    }
}

/// One agent to spawn at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSettings {
    /// `[row, col]` of the origin.
    pub from: [usize; 2],
    /// `[row, col]` of the destination.
    pub to: [usize; 2],
}

impl From<RouteSettings> for Route {
    fn from(r: RouteSettings) -> Self {
        Route {
            start: GridCoord::new(r.from[0], r.from[1]),
            end: GridCoord::new(r.to[0], r.to[1]),
        }
    }
}

/// Initial world contents.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioSettings {
    /// `[row, col]` of every wall.
    pub obstacles: Vec<[usize; 2]>,
    pub routes: Vec<RouteSettings>,
}

type ValidationStage = fn(&Settings) -> Result<(), SimulationError>;

/// Checks, run in order.
const VALIDATION_PIPELINE: [(&str, ValidationStage); 5] = [
    ("grid", check_grid),
    ("simulation", check_simulation),
    ("agents", check_agents),
    ("orca", check_orca),
    ("scenario", check_scenario),
];

fn check_grid(s: &Settings) -> Result<(), SimulationError> {
    let g = &s.grid;
    if g.rows == 0 || g.cols == 0 {
        return Err(SimulationError::Configuration("grid rows and cols must be non-zero"));
    }
    let width = g.area_end[0] - g.area_start[0];
    let height = g.area_end[1] - g.area_start[1];
    if !width.is_finite() || !height.is_finite() || width == 0.0 || height == 0.0 {
        return Err(SimulationError::Configuration("grid area must be finite and non-degenerate"));
    }
    Ok(())
}

fn check_simulation(s: &Settings) -> Result<(), SimulationError> {
    if !(s.simulation.fps >= 0.0) || !s.simulation.fps.is_finite() {
        return Err(SimulationError::Configuration("fps must be non-negative"));
    }
    Ok(())
}

fn check_agents(s: &Settings) -> Result<(), SimulationError> {
    s.agents.params().validate()
}

fn check_orca(s: &Settings) -> Result<(), SimulationError> {
    let o = &s.orca;
    if !(o.neighbor_dist > 0.0) || !(o.time_horizon > 0.0) {
        return Err(SimulationError::Configuration("orca distances and horizons must be positive"));
    }
    if !(o.radius >= 0.0) || !(o.max_speed > 0.0) {
        return Err(SimulationError::Configuration("orca radius and speed are out of range"));
    }
    Ok(())
}

fn check_scenario(s: &Settings) -> Result<(), SimulationError> {
    if !s.scenario.obstacles.iter().all(|&c| s.grid.contains(c)) {
        return Err(SimulationError::Configuration("scenario obstacle outside the grid"));
    }
    if !s.scenario.routes.iter().all(|r| s.grid.contains(r.from) && s.grid.contains(r.to)) {
        return Err(SimulationError::Configuration("scenario route outside the grid"));
    }
    Ok(())
}

impl Settings {
    /// Runs every validation stage, stopping at the first failure.
    pub fn validate(&self) -> Result<(), SimulationError> {
        for (name, stage) in VALIDATION_PIPELINE {
            if let Err(e) = stage(self) {
                error!(stage = name, error = %e, "Settings rejected");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Factory for `kind` using the configured ORCA defaults.
    pub fn factory(&self, kind: AvoidanceKind) -> AvoidanceFactory {
        AvoidanceFactory::new(kind).with_orca_defaults(self.orca.defaults())
    }
}
