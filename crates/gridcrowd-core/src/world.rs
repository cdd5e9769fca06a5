//! The service container that owns one running simulation.

use gridcrowd_kinematics::Vec2;
use gridcrowd_navigation::{GridCoord, GridMap, PathManager};
use tracing::{info, warn};

use crate::agent::AgentId;
use crate::avoidance::{AvoidanceFactory, AvoidanceKind};
use crate::commands::{AddCell, Command, FlushReport, Invoker, Scene, SpawnAgent};
use crate::error::SimulationError;
use crate::rvo::AgentDefaults;
use crate::settings::Settings;
use crate::simulation::{SimStats, SimulationManager, TickEnv};

/// A predicted contact between two agents' planned paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentCollision {
    /// Seconds after the paths were planned.
    pub time: f64,
    pub agents: (AgentId, AgentId),
    /// Disk centers at contact.
    pub positions: (Vec2, Vec2),
}

/// Grid, paths, agents and the command queue of one simulation.
///
/// The path manager is subscribed to the grid's change feed, so every
/// structural edit invalidates the planned paths before the next tick.
#[derive(Debug)]
pub struct World {
    grid: GridMap,
    paths: PathManager,
    simulation: SimulationManager,
    invoker: Invoker,
    orca: AgentDefaults,
}

impl World {
    /// Wraps an allocated grid and a scheduler.
    pub fn new(grid: GridMap, simulation: SimulationManager) -> Self {
        let paths = PathManager::new(&grid);
        Self { grid, paths, simulation, invoker: Invoker::new(), orca: AgentDefaults::default() }
    }

    /// Builds the grid, installs the avoidance algorithm and applies the
    /// scenario's walls and agents.
    ///
    /// # Errors
    /// The first failing validation stage, or a grid allocation failure.
    pub fn from_settings(settings: &Settings) -> Result<Self, SimulationError> {
        settings.validate()?;
        let grid = GridMap::with_config(settings.grid.to_config())?;

        let mut simulation = SimulationManager::new(settings.simulation.seed);
        simulation.set_fps(settings.simulation.fps)?;
        simulation.set_midpoint_path(settings.simulation.midpoint_path);
        if let Some(kind) = settings.simulation.avoidance {
            simulation.init(settings.factory(kind));
        }

        let mut world = Self::new(grid, simulation);
        world.orca = settings.orca.defaults();
        for &[row, col] in &settings.scenario.obstacles {
            world.submit(AddCell::obstacle(GridCoord::new(row, col)));
        }
        for &route in &settings.scenario.routes {
            world.submit(SpawnAgent::new(route.into(), settings.agents.params()));
        }

        let report = world.apply_pending();
        if report.dropped > 0 {
            warn!(dropped = report.dropped, "Some scenario entries were not applied");
        }
        info!(
            rows = settings.grid.rows,
            cols = settings.grid.cols,
            topology = %settings.grid.topology,
            agents = world.simulation.population().len(),
            "World ready"
        );
        Ok(world)
    }

    pub fn grid(&self) -> &GridMap {
        &self.grid
    }

    pub fn paths(&self) -> &PathManager {
        &self.paths
    }

    pub fn simulation(&self) -> &SimulationManager {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut SimulationManager {
        &mut self.simulation
    }

    pub fn stats(&self) -> SimStats {
        self.simulation.stats()
    }

    /// Queues a command for the next tick.
    pub fn submit<C: Command + 'static>(&mut self, command: C) {
        self.invoker.submit(command);
    }

    /// Commands waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.invoker.pending()
    }

    /// Runs the queued commands now instead of at the next tick.
    pub fn apply_pending(&mut self) -> FlushReport {
        let population = self.simulation.population_mut();
        self.invoker.flush(&mut Scene { grid: &mut self.grid, population })
    }

    /// Undoes up to `count` restorable commands, newest first.
    pub fn restore(&mut self, count: usize) -> usize {
        let population = self.simulation.population_mut();
        self.invoker.restore(count, &mut Scene { grid: &mut self.grid, population })
    }

    /// Advances by `dt` seconds of frame time; returns the ticks run.
    pub fn update(&mut self, dt: f64) -> Result<usize, SimulationError> {
        let mut env = TickEnv { grid: &mut self.grid, paths: &self.paths, invoker: &mut self.invoker };
        self.simulation.update(dt, &mut env)
    }

    /// Switches every agent to `kind`, or to plain path following with `None`.
    pub fn set_avoidance(&mut self, kind: Option<AvoidanceKind>) {
        match kind {
            Some(kind) => self
                .simulation
                .init(AvoidanceFactory::new(kind).with_orca_defaults(self.orca)),
            None => self.simulation.clear_avoidance(),
        }
    }

    /// See [`SimulationManager::set_fps`].
    pub fn set_fps(&mut self, fps: f64) -> Result<(), SimulationError> {
        self.simulation.set_fps(fps)
    }

    /// Sends every agent back to its start.
    pub fn reset(&mut self) {
        self.simulation.reset(&self.grid, &mut self.invoker);
    }

    /// Number of agents that reached their goal.
    pub fn arrived(&self) -> usize {
        self.simulation.population().arrived()
    }

    /// Whether every agent reached its goal.
    pub fn all_arrived(&self) -> bool {
        let population = self.simulation.population();
        !population.is_empty() && population.arrived() == population.len()
    }

    /// Predicted contacts between the agents' current plans, earliest first.
    pub fn collisions(&self) -> Vec<AgentCollision> {
        self.paths.refresh(&self.grid);
        let owners = self.simulation.population().path_owners();
        self.paths
            .collisions(&self.grid)
            .into_iter()
            .filter_map(|event| {
                let a = owners.get(&event.paths.0)?;
                let b = owners.get(&event.paths.1)?;
                Some(AgentCollision { time: event.time, agents: (*a, *b), positions: event.positions })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::RemoveCell;
    use crate::settings::RouteSettings;
    use gridcrowd_navigation::{CellContent, GridQuery, GridTopology};

    fn corridor() -> Settings {
        let mut settings = Settings::default();
        settings.grid.rows = 1;
        settings.grid.cols = 11;
        settings.grid.area_end = [110.0, 10.0];
        settings.agents.radius = 2.0;
        settings.agents.speed = 10.0;
        settings.scenario.routes = vec![
            RouteSettings { from: [0, 0], to: [0, 10] },
            RouteSettings { from: [0, 10], to: [0, 0] },
        ];
        settings
    }

    #[test]
    fn test_from_settings_applies_scenario() {
        let mut settings = corridor();
        settings.grid.rows = 3;
        settings.grid.area_end = [110.0, 30.0];
        settings.scenario.obstacles = vec![[1, 5]];
        let world = World::from_settings(&settings).unwrap();

        assert_eq!(world.simulation().population().len(), 2);
        assert!(world.grid().is_blocking(GridCoord::new(1, 5)));
        assert_eq!(world.pending(), 0);
    }

    #[test]
    fn test_invalid_settings_fail_fast() {
        let mut settings = corridor();
        settings.simulation.fps = -5.0;
        assert!(matches!(World::from_settings(&settings), Err(SimulationError::Configuration(_))));
    }

    #[test]
    fn test_head_on_agents_report_a_collision() {
        let mut world = World::from_settings(&corridor()).unwrap();
        world.update(1.0 / 60.0 + 1e-9).unwrap();

        let collisions = world.collisions();
        assert!(!collisions.is_empty());
        let first = collisions[0];
        assert_ne!(first.agents.0, first.agents.1);
        // Both agents cover one cell per second and meet halfway.
        assert!(first.time > 3.0 && first.time < 5.5, "{}", first.time);
    }

    #[test]
    fn test_restore_undoes_scenario_wall() {
        let mut settings = corridor();
        settings.scenario.routes.clear();
        settings.scenario.obstacles = vec![[0, 3]];
        let mut world = World::from_settings(&settings).unwrap();
        assert!(world.grid().is_blocking(GridCoord::new(0, 3)));

        assert_eq!(world.restore(1), 1);
        assert!(!world.grid().is_blocking(GridCoord::new(0, 3)));
    }

    #[test]
    fn test_wall_edit_reroutes_agents() {
        let mut settings = corridor();
        settings.grid.rows = 3;
        settings.grid.area_end = [110.0, 30.0];
        settings.scenario.routes = vec![RouteSettings { from: [1, 0], to: [1, 10] }];
        let mut world = World::from_settings(&settings).unwrap();
        world.update(1.0 / 60.0 + 1e-9).unwrap();

        world.submit(AddCell::obstacle(GridCoord::new(1, 5)));
        world.update(1.0 / 60.0 + 1e-9).unwrap();

        let agent = world.simulation().agents().next().unwrap();
        let wall = world.grid().center(GridCoord::new(1, 5)).unwrap();
        assert!(!agent.waypoints().contains(&wall));

        world.submit(RemoveCell::new(GridCoord::new(1, 5), false));
        world.update(1.0 / 60.0 + 1e-9).unwrap();
        assert_eq!(world.grid().cell(GridCoord::new(1, 5)).unwrap().content, CellContent::Empty);
    }

    #[test]
    fn test_runs_to_completion_with_each_avoidance() {
        for kind in [None, Some(AvoidanceKind::Direct), Some(AvoidanceKind::Reservation), Some(AvoidanceKind::Orca)] {
            let mut settings = corridor();
            settings.grid.rows = 3;
            settings.grid.area_end = [110.0, 30.0];
            settings.grid.topology = GridTopology::Square;
            settings.agents.speed = 40.0;
            settings.scenario.routes = vec![RouteSettings { from: [0, 0], to: [0, 10] }];
            let mut world = World::from_settings(&settings).unwrap();
            world.set_avoidance(kind);

            for _ in 0..600 {
                world.update(1.0 / 60.0 + 1e-9).unwrap();
                if world.all_arrived() {
                    break;
                }
            }
            assert!(world.all_arrived(), "{kind:?}");
        }
    }
}
