//! Deferred structural edits.
//!
//! Everything that mutates the grid or the agent population goes through a
//! [`Command`] submitted to an [`Invoker`]. Queued commands run in submission
//! order when the simulation flushes them at the start of a tick; commands
//! that report [`CommandOutcome::Restorable`] can later be undone, newest
//! first.

use std::collections::VecDeque;
use std::fmt;

use gridcrowd_navigation::{CellContent, GridCoord, GridMap};
use tracing::{debug, trace, warn};

use crate::agent::{AgentId, AgentParams, Route};
use crate::simulation::Population;

/// Mutable state a command may touch.
pub struct Scene<'a> {
    /// The grid.
    pub grid: &'a mut GridMap,
    /// The agents.
    pub population: &'a mut Population,
}

/// Result of executing a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Applied; cannot be undone.
    Applied,
    /// Applied; kept for [`Invoker::restore`].
    Restorable,
    /// Nothing happened. The command is dropped.
    NotApplied,
}

/// A discrete, optionally reversible edit.
pub trait Command: fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Applies the edit.
    fn execute(&mut self, scene: &mut Scene<'_>) -> CommandOutcome;

    /// Undoes a previous [`Restorable`](CommandOutcome::Restorable) execution.
    fn restore(&mut self, _scene: &mut Scene<'_>) {}
}

/// Counts from one [`Invoker::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Commands that changed something.
    pub applied: usize,
    /// Of those, commands kept for undo.
    pub restorable: usize,
    /// Commands that were `NotApplied`.
    pub dropped: usize,
}

/// FIFO of pending commands plus the undo stack.
#[derive(Debug, Default)]
pub struct Invoker {
    queue: VecDeque<Box<dyn Command>>,
    history: Vec<Box<dyn Command>>,
}

impl Invoker {
    /// Creates an empty invoker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `command` for the next flush.
    pub fn submit<C: Command + 'static>(&mut self, command: C) {
        trace!(command = command.name(), "Command queued");
        self.queue.push_back(Box::new(command));
    }

    /// Runs every queued command in submission order.
    pub fn flush(&mut self, scene: &mut Scene<'_>) -> FlushReport {
        let mut report = FlushReport::default();
        while let Some(mut command) = self.queue.pop_front() {
            match command.execute(scene) {
                CommandOutcome::Applied => report.applied += 1,
                CommandOutcome::Restorable => {
                    report.applied += 1;
                    report.restorable += 1;
                    self.history.push(command);
                }
                CommandOutcome::NotApplied => {
                    debug!(command = command.name(), "Command not applied, dropped");
                    report.dropped += 1;
                }
            }
        }
        report
    }

    /// Undoes up to `count` restorable commands, newest first.
    ///
    /// # Returns
    /// How many commands were undone.
    pub fn restore(&mut self, count: usize, scene: &mut Scene<'_>) -> usize {
        let mut undone = 0;
        while undone < count {
            let Some(mut command) = self.history.pop() else {
                break;
            };
            debug!(command = command.name(), "Restoring command");
            command.restore(scene);
            undone += 1;
        }
        undone
    }

    /// Commands waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Commands that can be restored.
    pub fn restorable(&self) -> usize {
        self.history.len()
    }

    /// Forgets every pending and restorable command.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.history.clear();
    }
}

/// Places `content` in a cell.
#[derive(Debug, Clone)]
pub struct AddCell {
    coord: GridCoord,
    content: CellContent,
    previous: Option<CellContent>,
}

impl AddCell {
    /// Places `content` at `coord`.
    pub fn new(coord: GridCoord, content: CellContent) -> Self {
        Self { coord, content, previous: None }
    }

    /// Places a wall at `coord`.
    pub fn obstacle(coord: GridCoord) -> Self {
        Self::new(coord, CellContent::Obstacle)
    }
}

impl Command for AddCell {
    fn name(&self) -> &'static str {
        "add_cell"
    }

    fn execute(&mut self, scene: &mut Scene<'_>) -> CommandOutcome {
        match scene.grid.set_content(self.coord, self.content) {
            Ok(previous) => {
                self.previous = Some(previous);
                CommandOutcome::Restorable
            }
            Err(e) => {
                trace!(coord = %self.coord, error = %e, "Cannot add cell");
                CommandOutcome::NotApplied
            }
        }
    }

    fn restore(&mut self, scene: &mut Scene<'_>) {
        if let Some(previous) = self.previous.take() {
            let _ = scene.grid.set_content(self.coord, previous);
        }
    }
}

/// Empties a cell.
#[derive(Debug, Clone)]
pub struct RemoveCell {
    coord: GridCoord,
    save: bool,
    removed: Option<CellContent>,
}

impl RemoveCell {
    /// Empties `coord`. With `save` the removal can be restored.
    pub fn new(coord: GridCoord, save: bool) -> Self {
        Self { coord, save, removed: None }
    }
}

impl Command for RemoveCell {
    fn name(&self) -> &'static str {
        "remove_cell"
    }

    fn execute(&mut self, scene: &mut Scene<'_>) -> CommandOutcome {
        match scene.grid.take_content(self.coord) {
            Ok(removed) => {
                self.removed = Some(removed);
                if self.save { CommandOutcome::Restorable } else { CommandOutcome::Applied }
            }
            Err(_) => CommandOutcome::NotApplied,
        }
    }

    fn restore(&mut self, scene: &mut Scene<'_>) {
        if let Some(removed) = self.removed.take() {
            let _ = scene.grid.set_content(self.coord, removed);
        }
    }
}

/// Moves a cell's content to another cell, replacing what was there.
#[derive(Debug, Clone)]
pub struct MoveCell {
    from: GridCoord,
    to: GridCoord,
    displaced: Option<CellContent>,
}

impl MoveCell {
    /// Moves the content of `from` onto `to`.
    pub fn new(from: GridCoord, to: GridCoord) -> Self {
        Self { from, to, displaced: None }
    }
}

impl Command for MoveCell {
    fn name(&self) -> &'static str {
        "move_cell"
    }

    fn execute(&mut self, scene: &mut Scene<'_>) -> CommandOutcome {
        if self.from == self.to || !scene.grid.is_allocated() {
            return CommandOutcome::NotApplied;
        }
        // Both cells must exist before anything is taken.
        if scene.grid.cell(self.from).is_none() || scene.grid.cell(self.to).is_none() {
            return CommandOutcome::NotApplied;
        }
        let Ok(content) = scene.grid.take_content(self.from) else {
            return CommandOutcome::NotApplied;
        };
        match scene.grid.set_content(self.to, content) {
            Ok(displaced) => {
                self.displaced = Some(displaced);
                CommandOutcome::Restorable
            }
            Err(_) => {
                let _ = scene.grid.set_content(self.from, content);
                CommandOutcome::NotApplied
            }
        }
    }

    fn restore(&mut self, scene: &mut Scene<'_>) {
        let Some(displaced) = self.displaced.take() else {
            return;
        };
        if let Ok(content) = scene.grid.set_content(self.to, displaced) {
            let _ = scene.grid.set_content(self.from, content);
        }
    }
}

/// Moves an agent between cell occupancy lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveAgent {
    agent: AgentId,
    from: GridCoord,
    to: GridCoord,
}

impl MoveAgent {
    /// Moves `agent` from the list of `from` to the list of `to`.
    pub fn new(agent: AgentId, from: GridCoord, to: GridCoord) -> Self {
        Self { agent, from, to }
    }
}

impl Command for MoveAgent {
    fn name(&self) -> &'static str {
        "move_agent"
    }

    fn execute(&mut self, scene: &mut Scene<'_>) -> CommandOutcome {
        if self.from == self.to || !scene.grid.is_allocated() {
            return CommandOutcome::NotApplied;
        }
        if scene.grid.move_occupant(self.agent.raw(), self.from, self.to) {
            CommandOutcome::Applied
        } else {
            CommandOutcome::NotApplied
        }
    }
}

/// Creates an agent and marks its origin and destination cells.
#[derive(Debug, Clone)]
pub struct SpawnAgent {
    route: Route,
    params: AgentParams,
    spawned: Option<AgentId>,
    markers: Vec<(GridCoord, CellContent)>,
}

impl SpawnAgent {
    /// Spawns an agent travelling along `route`.
    pub fn new(route: Route, params: AgentParams) -> Self {
        Self { route, params, spawned: None, markers: Vec::new() }
    }

    /// Id of the spawned agent, once executed.
    pub fn spawned(&self) -> Option<AgentId> {
        self.spawned
    }

    /// Marks `coord` with `content` if the cell is empty, remembering the old content.
    fn mark(&mut self, grid: &mut GridMap, coord: GridCoord, content: CellContent) {
        if grid.cell(coord).is_some_and(|c| c.content == CellContent::Empty) {
            if let Ok(previous) = grid.set_content(coord, content) {
                self.markers.push((coord, previous));
            }
        }
    }
}

impl Command for SpawnAgent {
    fn name(&self) -> &'static str {
        "spawn_agent"
    }

    fn execute(&mut self, scene: &mut Scene<'_>) -> CommandOutcome {
        if !scene.grid.is_allocated() {
            return CommandOutcome::NotApplied;
        }
        match scene.population.spawn(self.route, self.params, scene.grid) {
            Ok(id) => {
                self.spawned = Some(id);
                let Route { start, end } = self.route;
                self.mark(scene.grid, start, CellContent::Origin { destination: Some(end) });
                self.mark(scene.grid, end, CellContent::Destination { origin: Some(start) });
                CommandOutcome::Restorable
            }
            Err(e) => {
                warn!(error = %e, start = %self.route.start, end = %self.route.end, "Agent not spawned");
                CommandOutcome::NotApplied
            }
        }
    }

    fn restore(&mut self, scene: &mut Scene<'_>) {
        if let Some(id) = self.spawned.take() {
            scene.population.remove(id, scene.grid);
        }
        for (coord, previous) in self.markers.drain(..).rev() {
            let _ = scene.grid.set_content(coord, previous);
        }
    }
}

/// Removes an agent, its path and its occupancy entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveAgent {
    agent: AgentId,
}

impl RemoveAgent {
    /// Removes `agent`.
    pub fn new(agent: AgentId) -> Self {
        Self { agent }
    }
}

impl Command for RemoveAgent {
    fn name(&self) -> &'static str {
        "remove_agent"
    }

    fn execute(&mut self, scene: &mut Scene<'_>) -> CommandOutcome {
        if !scene.grid.is_allocated() {
            return CommandOutcome::NotApplied;
        }
        match scene.population.remove(self.agent, scene.grid) {
            Some(_) => CommandOutcome::Applied,
            None => CommandOutcome::NotApplied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcrowd_navigation::{GridConfig, GridTopology, WorldPoint};

    fn grid() -> GridMap {
        GridMap::with_config(GridConfig {
            rows: 3,
            cols: 3,
            topology: GridTopology::Square,
            area_start: WorldPoint::new(0.0, 0.0),
            area_end: WorldPoint::new(30.0, 30.0),
            regular: true,
        })
        .unwrap()
    }

    fn content(grid: &GridMap, row: usize, col: usize) -> CellContent {
        grid.cell(GridCoord::new(row, col)).unwrap().content
    }

    #[test]
    fn test_flush_runs_in_submission_order() {
        let mut grid = grid();
        let mut population = Population::default();
        let mut invoker = Invoker::new();
        let c = GridCoord::new(1, 1);
        invoker.submit(AddCell::obstacle(c));
        invoker.submit(RemoveCell::new(c, false));
        assert_eq!(invoker.pending(), 2);

        let report = invoker.flush(&mut Scene { grid: &mut grid, population: &mut population });
        assert_eq!(report, FlushReport { applied: 2, restorable: 1, dropped: 0 });
        assert_eq!(content(&grid, 1, 1), CellContent::Empty);
        assert_eq!(invoker.pending(), 0);
    }

    #[test]
    fn test_unallocated_grid_drops_everything() {
        let mut grid = GridMap::new();
        let mut population = Population::default();
        let mut invoker = Invoker::new();
        let (a, b) = (GridCoord::new(0, 0), GridCoord::new(0, 1));
        invoker.submit(AddCell::obstacle(a));
        invoker.submit(RemoveCell::new(a, true));
        invoker.submit(MoveCell::new(a, b));
        invoker.submit(MoveAgent::new(AgentId::from(1), a, b));
        invoker.submit(SpawnAgent::new(Route { start: a, end: b }, AgentParams::default()));
        invoker.submit(RemoveAgent::new(AgentId::from(1)));

        let report = invoker.flush(&mut Scene { grid: &mut grid, population: &mut population });
        assert_eq!(report.dropped, 6);
        assert_eq!(invoker.restorable(), 0);
    }

    #[test]
    fn test_restore_undoes_newest_first() {
        let mut grid = grid();
        let mut population = Population::default();
        let mut invoker = Invoker::new();
        let (a, b) = (GridCoord::new(0, 0), GridCoord::new(2, 2));
        invoker.submit(AddCell::obstacle(a));
        invoker.submit(MoveCell::new(a, b));
        invoker.flush(&mut Scene { grid: &mut grid, population: &mut population });
        assert_eq!(content(&grid, 0, 0), CellContent::Empty);
        assert_eq!(content(&grid, 2, 2), CellContent::Obstacle);

        let mut scene = Scene { grid: &mut grid, population: &mut population };
        assert_eq!(invoker.restore(1, &mut scene), 1);
        assert_eq!(content(scene.grid, 0, 0), CellContent::Obstacle);
        assert_eq!(content(scene.grid, 2, 2), CellContent::Empty);

        assert_eq!(invoker.restore(5, &mut scene), 1);
        assert_eq!(content(scene.grid, 0, 0), CellContent::Empty);
    }

    #[test]
    fn test_remove_cell_without_save_is_final() {
        let mut grid = grid();
        let mut population = Population::default();
        let mut invoker = Invoker::new();
        let c = GridCoord::new(1, 2);
        grid.set_content(c, CellContent::Obstacle).unwrap();
        invoker.submit(RemoveCell::new(c, false));
        invoker.flush(&mut Scene { grid: &mut grid, population: &mut population });

        assert_eq!(invoker.restorable(), 0);
        assert_eq!(content(&grid, 1, 2), CellContent::Empty);
    }

    #[test]
    fn test_move_cell_onto_itself_is_not_applied() {
        let mut grid = grid();
        let mut population = Population::default();
        let mut invoker = Invoker::new();
        let c = GridCoord::new(1, 1);
        invoker.submit(MoveCell::new(c, c));
        invoker.submit(MoveCell::new(c, GridCoord::new(5, 5)));
        let report = invoker.flush(&mut Scene { grid: &mut grid, population: &mut population });
        assert_eq!(report.dropped, 2);
    }

    #[test]
    fn test_move_agent_updates_occupancy() {
        let mut grid = grid();
        let mut population = Population::default();
        let mut invoker = Invoker::new();
        let (a, b) = (GridCoord::new(0, 0), GridCoord::new(0, 1));
        grid.enter(a, 7);
        invoker.submit(MoveAgent::new(AgentId::from(7), a, b));
        invoker.submit(MoveAgent::new(AgentId::from(7), b, b));
        let report = invoker.flush(&mut Scene { grid: &mut grid, population: &mut population });

        assert_eq!(report.applied, 1);
        assert_eq!(report.dropped, 1);
        assert!(grid.occupants(a).is_empty());
        assert_eq!(grid.occupants(b), &[7]);
    }

    #[test]
    fn test_spawn_marks_cells_and_restore_removes_agent() {
        let mut grid = grid();
        let mut population = Population::default();
        let mut invoker = Invoker::new();
        let route = Route { start: GridCoord::new(0, 0), end: GridCoord::new(2, 2) };
        invoker.submit(SpawnAgent::new(route, AgentParams::default()));
        invoker.flush(&mut Scene { grid: &mut grid, population: &mut population });

        assert_eq!(population.len(), 1);
        assert_eq!(content(&grid, 0, 0), CellContent::Origin { destination: Some(route.end) });
        assert_eq!(content(&grid, 2, 2), CellContent::Destination { origin: Some(route.start) });
        assert_eq!(grid.occupants(route.start).len(), 1);

        invoker.restore(1, &mut Scene { grid: &mut grid, population: &mut population });
        assert!(population.is_empty());
        assert_eq!(content(&grid, 0, 0), CellContent::Empty);
        assert!(grid.occupants(route.start).is_empty());
    }

    #[test]
    fn test_remove_unknown_agent_is_not_applied() {
        let mut grid = grid();
        let mut population = Population::default();
        let mut invoker = Invoker::new();
        invoker.submit(RemoveAgent::new(AgentId::from(42)));
        let report = invoker.flush(&mut Scene { grid: &mut grid, population: &mut population });
        assert_eq!(report.dropped, 1);
    }
}
