//! Crowd simulation on top of the grid navigation layer.
//!
//! - [`agent`]: disk agents that plan through the path manager and steer along waypoints.
//! - [`avoidance`]: interchangeable local avoidance (direct repulsion, cell reservation, ORCA).
//! - [`commands`]: queued scene edits with undo.
//! - [`simulation`]: fixed-timestep scheduler.
//! - [`world`]: the container tying grid, paths, agents and commands together.

pub mod agent;
pub mod avoidance;
pub mod commands;
pub mod error;
pub mod rvo;
pub mod settings;
pub mod simulation;
pub mod world;

pub use agent::{Agent, AgentId, AgentParams, AgentState, Route};
pub use avoidance::{AvoidanceFactory, AvoidanceKind, AvoidanceStrategy, AvoidanceSystem};
pub use commands::{
    AddCell, Command, CommandOutcome, FlushReport, Invoker, MoveAgent, MoveCell, RemoveAgent, RemoveCell, Scene,
    SpawnAgent,
};
pub use error::SimulationError;
pub use settings::Settings;
pub use simulation::{FixedClock, Population, SimStats, SimulationManager};
pub use world::{AgentCollision, World};
