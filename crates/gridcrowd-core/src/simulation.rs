//! Fixed-timestep scheduling of agents and avoidance systems.
//!
//! A tick runs, in order: queued commands, path refresh, the avoidance
//! system's pre-step, every agent's update (in id order), the post-step.

use std::collections::{BTreeMap, HashMap};

use gridcrowd_navigation::{GridMap, PathId, PathManager};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, trace};

use crate::agent::{Agent, AgentId, AgentParams, Route, TickContext};
use crate::avoidance::{AvoidanceFactory, AvoidanceSystem};
use crate::commands::{Invoker, Scene};
use crate::error::SimulationError;

/// The agents plus the avoidance algorithm they share.
#[derive(Debug, Default)]
pub struct Population {
    agents: BTreeMap<AgentId, Agent>,
    next_id: u64,
    factory: Option<AvoidanceFactory>,
    system: Option<AvoidanceSystem>,
}

impl Population {
    /// Creates an agent on `route`, registers it in its start cell and gives
    /// it a strategy from the installed factory.
    pub fn spawn(&mut self, route: Route, params: AgentParams, grid: &mut GridMap) -> Result<AgentId, SimulationError> {
        let id = AgentId::from(self.next_id);
        let mut agent = Agent::new(id, route, params, grid)?;
        self.next_id += 1;

        if let Some(factory) = &self.factory {
            agent.set_strategy(Some(factory.create_strategy()));
        }
        grid.enter(agent.cell(), id.raw());
        debug!(%id, start = %route.start, end = %route.end, "Agent spawned");
        self.agents.insert(id, agent);
        Ok(id)
    }

    /// Removes an agent, its occupancy entry and any solver state it held.
    pub fn remove(&mut self, id: AgentId, grid: &mut GridMap) -> Option<Agent> {
        let mut agent = self.agents.remove(&id)?;
        grid.leave(agent.cell(), id.raw());
        if let (Some(system), Some(mut strategy)) = (self.system.as_mut(), agent.set_strategy(None)) {
            system.release(&mut strategy);
        }
        debug!(%id, "Agent removed");
        Some(agent)
    }

    /// Installs a new avoidance algorithm and reassigns every agent's strategy.
    pub fn install(&mut self, factory: AvoidanceFactory) {
        let mut old_system = self.system.take();
        for agent in self.agents.values_mut() {
            let old = agent.set_strategy(Some(factory.create_strategy()));
            if let (Some(mut old), Some(system)) = (old, old_system.as_mut()) {
                system.release(&mut old);
            }
        }
        info!(kind = %factory.kind(), agents = self.agents.len(), "Avoidance installed");
        self.system = Some(factory.create_system());
        self.factory = Some(factory);
    }

    /// Removes the avoidance algorithm; agents steer with their preferred velocity.
    pub fn uninstall(&mut self) {
        for agent in self.agents.values_mut() {
            agent.set_strategy(None);
        }
        self.system = None;
        self.factory = None;
        info!("Avoidance removed");
    }

    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// The installed factory.
    pub fn factory(&self) -> Option<&AvoidanceFactory> {
        self.factory.as_ref()
    }

    /// The installed system.
    pub fn system(&self) -> Option<&AvoidanceSystem> {
        self.system.as_ref()
    }

    /// Agents that reached their goal.
    pub fn arrived(&self) -> usize {
        self.agents.values().filter(|a| a.has_arrived()).count()
    }

    /// Path id to owning agent.
    pub fn path_owners(&self) -> HashMap<PathId, AgentId> {
        self.agents
            .values()
            .filter_map(|a| a.path().map(|p| (p.id(), a.id())))
            .collect()
    }
}

/// Converts frame time into a number of fixed steps.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FixedClock {
    step: Option<f64>,
    accumulated: f64,
}

impl FixedClock {
    /// Clock running `fps` steps per second; `0` selects variable steps.
    pub fn new(fps: f64) -> Result<Self, SimulationError> {
        let mut clock = Self::default();
        clock.set_fps(fps)?;
        Ok(clock)
    }

    /// Sets the step to `1 / fps`; `0` selects variable steps.
    ///
    /// # Errors
    /// `Configuration` for negative or non-finite rates.
    pub fn set_fps(&mut self, fps: f64) -> Result<(), SimulationError> {
        if !(fps >= 0.0) || !fps.is_finite() {
            return Err(SimulationError::Configuration("fps must be non-negative"));
        }
        self.step = (fps > 0.0).then(|| 1.0 / fps);
        self.accumulated = 0.0;
        Ok(())
    }

    /// Fixed step length, `None` for variable steps.
    pub fn step(&self) -> Option<f64> {
        self.step
    }

    /// Steps per second, `0` for variable steps.
    pub fn fps(&self) -> f64 {
        self.step.map_or(0.0, |s| 1.0 / s)
    }

    /// Adds `dt` and returns how many steps of which length to run.
    pub fn advance(&mut self, dt: f64) -> (usize, f64) {
        let Some(step) = self.step else {
            return (1, dt);
        };
        self.accumulated += dt;
        let mut iterations = 0;
        while self.accumulated >= step {
            self.accumulated -= step;
            iterations += 1;
        }
        (iterations, step)
    }

    /// Drops any partial step.
    pub fn reset(&mut self) {
        self.accumulated = 0.0;
    }
}

/// Counters from the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimStats {
    /// Ticks run since creation.
    pub ticks: u64,
    /// Ticks run by the last `update`.
    pub last_iterations: usize,
    /// Ticks per second of frame time over the last `update`.
    pub sim_rate: f64,
    /// Simulated seconds.
    pub elapsed: f64,
}

/// World state a tick needs besides the agents.
pub struct TickEnv<'a> {
    pub grid: &'a mut GridMap,
    pub paths: &'a PathManager,
    pub invoker: &'a mut Invoker,
}

/// Drives every agent at a fixed rate.
#[derive(Debug)]
pub struct SimulationManager {
    population: Population,
    clock: FixedClock,
    rng: StdRng,
    midpoint_path: bool,
    stats: SimStats,
}

impl SimulationManager {
    /// Manager at 60 fps with steering noise seeded by `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            population: Population::default(),
            clock: FixedClock { step: Some(1.0 / 60.0), accumulated: 0.0 },
            rng: StdRng::seed_from_u64(seed),
            midpoint_path: false,
            stats: SimStats::default(),
        }
    }

    /// See [`FixedClock::set_fps`].
    pub fn set_fps(&mut self, fps: f64) -> Result<(), SimulationError> {
        self.clock.set_fps(fps)?;
        info!(fps, "Simulation rate set");
        Ok(())
    }

    pub fn clock(&self) -> &FixedClock {
        &self.clock
    }

    /// Steer through midpoints between cell centers. Applies to plans made afterwards.
    pub fn set_midpoint_path(&mut self, enabled: bool) {
        self.midpoint_path = enabled;
    }

    /// Installs `factory` and swaps every agent's strategy.
    pub fn init(&mut self, factory: AvoidanceFactory) {
        self.population.install(factory);
    }

    /// Removes the avoidance algorithm.
    pub fn clear_avoidance(&mut self) {
        self.population.uninstall();
    }

    /// Spawns an agent immediately, bypassing the command queue.
    pub fn add_agent(&mut self, route: Route, params: AgentParams, grid: &mut GridMap) -> Result<AgentId, SimulationError> {
        self.population.spawn(route, params, grid)
    }

    /// Removes an agent immediately.
    ///
    /// # Errors
    /// `UnknownAgent` if no such agent exists.
    pub fn remove_agent(&mut self, id: AgentId, grid: &mut GridMap) -> Result<Agent, SimulationError> {
        self.population.remove(id, grid).ok_or(SimulationError::UnknownAgent(id))
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.population.get(id)
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.population.iter()
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn population_mut(&mut self) -> &mut Population {
        &mut self.population
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Sends every agent back to its start and drops any partial step.
    pub fn reset(&mut self, grid: &GridMap, invoker: &mut Invoker) {
        for agent in self.population.agents.values_mut() {
            agent.reset(grid, invoker);
        }
        self.clock.reset();
        info!(agents = self.population.len(), "Simulation reset");
    }

    /// Advances by `dt` seconds of frame time.
    ///
    /// # Returns
    /// The number of ticks run.
    pub fn update(&mut self, dt: f64, env: &mut TickEnv<'_>) -> Result<usize, SimulationError> {
        if !(dt >= 0.0) {
            return Err(SimulationError::Configuration("time delta must be non-negative"));
        }
        let (iterations, step) = self.clock.advance(dt);
        for _ in 0..iterations {
            self.tick(step, env)?;
        }

        self.stats.last_iterations = iterations;
        self.stats.sim_rate = if dt > 0.0 { iterations as f64 / dt } else { 0.0 };
        self.stats.elapsed += iterations as f64 * step;
        Ok(iterations)
    }

    fn tick(&mut self, step: f64, env: &mut TickEnv<'_>) -> Result<(), SimulationError> {
        let report = env.invoker.flush(&mut Scene { grid: &mut *env.grid, population: &mut self.population });
        if report.applied + report.dropped > 0 {
            trace!(?report, "Commands flushed");
        }
        env.paths.refresh(&*env.grid);

        let Population { agents, system, .. } = &mut self.population;
        if let Some(system) = system.as_mut() {
            system.pre_step(step, env.grid);
        }

        let ids: Vec<AgentId> = agents.keys().copied().collect();
        for id in ids {
            let Some(mut agent) = agents.remove(&id) else {
                continue;
            };
            let mut ctx = TickContext {
                grid: &*env.grid,
                paths: env.paths,
                others: &*agents,
                system: system.as_mut(),
                invoker: &mut *env.invoker,
                rng: &mut self.rng,
                midpoint_path: self.midpoint_path,
            };
            let result = agent.update(step, &mut ctx);
            agents.insert(id, agent);
            result?;
        }

        if let Some(system) = system.as_mut() {
            system.post_step();
        }
        env.grid.advance_pulses(step);
        self.stats.ticks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avoidance::{AvoidanceKind, AvoidanceStrategy};
    use crate::commands::AddCell;
    use gridcrowd_kinematics::Vec2;
    use gridcrowd_navigation::{CellContent, GridConfig, GridCoord, GridTopology, WorldPoint};

    struct Bench {
        grid: GridMap,
        paths: PathManager,
        invoker: Invoker,
    }

    impl Bench {
        fn new(rows: usize, cols: usize) -> Self {
            let grid = GridMap::with_config(GridConfig {
                rows,
                cols,
                topology: GridTopology::Square,
                area_start: WorldPoint::new(0.0, 0.0),
                area_end: WorldPoint::new(cols as f64 * 10.0, rows as f64 * 10.0),
                regular: true,
            })
            .unwrap();
            let paths = PathManager::new(&grid);
            Self { grid, paths, invoker: Invoker::new() }
        }

        fn update(&mut self, sim: &mut SimulationManager, dt: f64) -> usize {
            let mut env = TickEnv { grid: &mut self.grid, paths: &self.paths, invoker: &mut self.invoker };
            sim.update(dt, &mut env).unwrap()
        }
    }

    fn route(start: (usize, usize), end: (usize, usize)) -> Route {
        Route { start: start.into(), end: end.into() }
    }

    #[test]
    fn test_set_fps_validation() {
        let mut sim = SimulationManager::new(1);
        assert!(matches!(sim.set_fps(-1.0), Err(SimulationError::Configuration(_))));
        sim.set_fps(0.0).unwrap();
        assert_eq!(sim.clock().step(), None);
        sim.set_fps(50.0).unwrap();
        assert_eq!(sim.clock().step(), Some(0.02));
    }

    #[test]
    fn test_fixed_step_accumulates() {
        let mut bench = Bench::new(2, 2);
        let mut sim = SimulationManager::new(1);
        sim.set_fps(4.0).unwrap();

        assert_eq!(bench.update(&mut sim, 0.5), 2);
        assert_eq!(bench.update(&mut sim, 0.1), 0);
        assert_eq!(bench.update(&mut sim, 0.2), 1);
        assert_eq!(sim.stats().ticks, 3);
        assert!((sim.stats().elapsed - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_variable_step_runs_once() {
        let mut bench = Bench::new(2, 2);
        let mut sim = SimulationManager::new(1);
        sim.set_fps(0.0).unwrap();
        assert_eq!(bench.update(&mut sim, 0.37), 1);
        assert_eq!(bench.update(&mut sim, 0.0), 1);
        assert!((sim.stats().elapsed - 0.37).abs() < 1e-12);
    }

    #[test]
    fn test_negative_dt_is_rejected() {
        let mut bench = Bench::new(2, 2);
        let mut sim = SimulationManager::new(1);
        let mut env = TickEnv { grid: &mut bench.grid, paths: &bench.paths, invoker: &mut bench.invoker };
        assert!(sim.update(-0.1, &mut env).is_err());
    }

    #[test]
    fn test_tick_flushes_commands_first() {
        let mut bench = Bench::new(2, 2);
        let mut sim = SimulationManager::new(1);
        bench.invoker.submit(AddCell::obstacle(GridCoord::new(1, 1)));
        assert_eq!(bench.update(&mut sim, 0.0), 0);
        assert_eq!(bench.invoker.pending(), 1);

        bench.update(&mut sim, 1.0 / 60.0 + 1e-9);
        assert_eq!(bench.invoker.pending(), 0);
        assert_eq!(bench.grid.cell(GridCoord::new(1, 1)).unwrap().content, CellContent::Obstacle);
    }

    #[test]
    fn test_hot_swap_reassigns_strategies() {
        let mut bench = Bench::new(3, 3);
        let mut sim = SimulationManager::new(1);
        sim.add_agent(route((0, 0), (2, 2)), AgentParams::default(), &mut bench.grid).unwrap();
        sim.init(AvoidanceFactory::new(AvoidanceKind::Orca));
        sim.add_agent(route((2, 0), (0, 2)), AgentParams::default(), &mut bench.grid).unwrap();
        assert!(sim.agents().all(|a| matches!(a.strategy(), Some(AvoidanceStrategy::Orca(_)))));

        bench.update(&mut sim, 0.02);
        sim.init(AvoidanceFactory::new(AvoidanceKind::Reservation));
        assert!(sim.agents().all(|a| a.strategy().map(|s| s.kind()) == Some(AvoidanceKind::Reservation)));
        assert_eq!(sim.population().system().map(|s| s.kind()), Some(AvoidanceKind::Reservation));

        sim.clear_avoidance();
        assert!(sim.agents().all(|a| a.strategy().is_none()));
    }

    #[test]
    fn test_removing_agent_releases_orca_slot() {
        let mut bench = Bench::new(3, 3);
        let mut sim = SimulationManager::new(1);
        sim.init(AvoidanceFactory::new(AvoidanceKind::Orca));
        let a = sim.add_agent(route((0, 0), (2, 2)), AgentParams::default(), &mut bench.grid).unwrap();
        let _b = sim.add_agent(route((2, 0), (0, 2)), AgentParams::default(), &mut bench.grid).unwrap();
        bench.update(&mut sim, 0.02);

        let slots = |sim: &SimulationManager| match sim.population().system() {
            Some(AvoidanceSystem::Orca(orca)) => orca.simulator().num_agents(),
            _ => usize::MAX,
        };
        assert_eq!(slots(&sim), 2);

        sim.remove_agent(a, &mut bench.grid).unwrap();
        assert_eq!(slots(&sim), 1);
        assert!(bench.grid.occupants(GridCoord::new(0, 0)).is_empty());
        assert!(matches!(
            sim.remove_agent(a, &mut bench.grid),
            Err(SimulationError::UnknownAgent(_))
        ));
    }

    #[test]
    fn test_reservation_lets_one_agent_through() {
        let mut bench = Bench::new(1, 3);
        let mut sim = SimulationManager::new(1);
        sim.set_fps(100.0).unwrap();
        sim.init(AvoidanceFactory::new(AvoidanceKind::Reservation));
        let params = AgentParams { radius: 1.0, max_speed: 100.0 };
        let left = sim.add_agent(route((0, 0), (0, 2)), params, &mut bench.grid).unwrap();
        let right = sim.add_agent(route((0, 2), (0, 0)), params, &mut bench.grid).unwrap();

        assert_eq!(bench.update(&mut sim, 0.01 + 1e-9), 1);

        // Both look ahead into the middle cell; the first updated claims it.
        let left = sim.agent(left).unwrap();
        let right = sim.agent(right).unwrap();
        assert!(left.velocity().x > 0.0);
        assert_eq!(right.velocity(), Vec2::ZERO);
        assert_eq!(right.position(), Vec2::new(25.0, 5.0));
    }

    #[test]
    fn test_agents_reach_goals_and_occupancy_follows() {
        let mut bench = Bench::new(1, 5);
        let mut sim = SimulationManager::new(9);
        let id = sim.add_agent(route((0, 0), (0, 4)), AgentParams { radius: 1.0, max_speed: 20.0 }, &mut bench.grid).unwrap();

        for _ in 0..300 {
            bench.update(&mut sim, 1.0 / 60.0 + 1e-9);
        }
        // Flush the last queued move.
        bench.update(&mut sim, 1.0 / 60.0 + 1e-9);

        assert_eq!(sim.population().arrived(), 1);
        assert_eq!(bench.grid.occupants(GridCoord::new(0, 4)), &[id.raw()]);
        assert!(bench.grid.occupants(GridCoord::new(0, 0)).is_empty());
    }

    #[test]
    fn test_reset_sends_agents_home() {
        let mut bench = Bench::new(1, 5);
        let mut sim = SimulationManager::new(9);
        let id = sim.add_agent(route((0, 0), (0, 4)), AgentParams { radius: 1.0, max_speed: 20.0 }, &mut bench.grid).unwrap();
        for _ in 0..60 {
            bench.update(&mut sim, 1.0 / 60.0 + 1e-9);
        }

        sim.reset(&bench.grid, &mut bench.invoker);
        bench.update(&mut sim, 0.0);
        let agent = sim.agent(id).unwrap();
        assert_eq!(agent.cell(), GridCoord::new(0, 0));
        assert_eq!(agent.waypoint_index(), 0);
    }
}
