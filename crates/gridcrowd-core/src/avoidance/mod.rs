//! Pluggable local collision avoidance.
//!
//! Each algorithm comes as a pair: one [`AvoidanceSystem`] holding the state
//! shared by all agents (the reservation table, the ORCA solver) and one
//! [`AvoidanceStrategy`] per agent. An [`AvoidanceFactory`] creates matching
//! pairs; installing a new factory swaps the algorithm for every agent.

pub mod direct;
pub mod orca;
pub mod reservation;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use gridcrowd_kinematics::Vec2;
use gridcrowd_navigation::GridMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agent::{Agent, AgentId, AgentState};
use crate::error::SimulationError;
use crate::rvo::AgentDefaults;

pub use direct::{DirectStrategy, DirectSystem};
pub use orca::{OrcaStrategy, OrcaSystem};
pub use reservation::{ReservationStrategy, ReservationSystem};

/// Available avoidance algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvoidanceKind {
    /// Geometric repulsion from nearby agents.
    Direct,
    /// One agent per cell per tick.
    Reservation,
    /// Optimal reciprocal collision avoidance.
    Orca,
}

impl AvoidanceKind {
    /// Every kind, in factory-index order.
    pub const ALL: [AvoidanceKind; 3] = [AvoidanceKind::Direct, AvoidanceKind::Reservation, AvoidanceKind::Orca];
}

impl fmt::Display for AvoidanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvoidanceKind::Direct => write!(f, "direct"),
            AvoidanceKind::Reservation => write!(f, "reservation"),
            AvoidanceKind::Orca => write!(f, "orca"),
        }
    }
}

impl FromStr for AvoidanceKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(AvoidanceKind::Direct),
            "reservation" | "grid" => Ok(AvoidanceKind::Reservation),
            "orca" | "rvo" => Ok(AvoidanceKind::Orca),
            _ => Err(SimulationError::Configuration("unknown avoidance kind")),
        }
    }
}

/// Read-only view of the world given to strategies.
#[derive(Debug, Clone, Copy)]
pub struct Neighborhood<'a> {
    /// Grid with occupancy lists.
    pub grid: &'a GridMap,
    /// Every agent except the one being updated.
    pub agents: &'a BTreeMap<AgentId, Agent>,
}

/// Creates matching system/strategy pairs for one algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct AvoidanceFactory {
    kind: AvoidanceKind,
    orca: AgentDefaults,
}

impl AvoidanceFactory {
    /// Factory for `kind` with default ORCA parameters.
    pub fn new(kind: AvoidanceKind) -> Self {
        Self { kind, orca: AgentDefaults::default() }
    }

    /// Overrides the parameters of the ORCA solver.
    pub fn with_orca_defaults(mut self, defaults: AgentDefaults) -> Self {
        self.orca = defaults;
        self
    }

    /// The algorithm this factory builds.
    pub fn kind(&self) -> AvoidanceKind {
        self.kind
    }

    /// Creates the shared system.
    pub fn create_system(&self) -> AvoidanceSystem {
        match self.kind {
            AvoidanceKind::Direct => AvoidanceSystem::Direct(DirectSystem),
            AvoidanceKind::Reservation => AvoidanceSystem::Reservation(ReservationSystem::default()),
            AvoidanceKind::Orca => AvoidanceSystem::Orca(OrcaSystem::new(self.orca)),
        }
    }

    /// Creates one agent's strategy.
    pub fn create_strategy(&self) -> AvoidanceStrategy {
        match self.kind {
            AvoidanceKind::Direct => AvoidanceStrategy::Direct(DirectStrategy::default()),
            AvoidanceKind::Reservation => AvoidanceStrategy::Reservation(ReservationStrategy),
            AvoidanceKind::Orca => AvoidanceStrategy::Orca(OrcaStrategy::default()),
        }
    }
}

/// State shared by every agent using one algorithm.
#[derive(Debug, Clone)]
pub enum AvoidanceSystem {
    /// Stateless.
    Direct(DirectSystem),
    /// Cell reservation table.
    Reservation(ReservationSystem),
    /// Global ORCA solver.
    Orca(OrcaSystem),
}

impl AvoidanceSystem {
    /// The algorithm of this system.
    pub fn kind(&self) -> AvoidanceKind {
        match self {
            AvoidanceSystem::Direct(_) => AvoidanceKind::Direct,
            AvoidanceSystem::Reservation(_) => AvoidanceKind::Reservation,
            AvoidanceSystem::Orca(_) => AvoidanceKind::Orca,
        }
    }

    /// Runs once per tick before any agent updates.
    pub fn pre_step(&mut self, dt: f64, grid: &GridMap) {
        match self {
            AvoidanceSystem::Direct(_) => {}
            AvoidanceSystem::Reservation(system) => system.pre_step(grid),
            AvoidanceSystem::Orca(system) => system.pre_step(dt),
        }
    }

    /// Runs once per tick after every agent updated.
    pub fn post_step(&mut self) {
        match self {
            AvoidanceSystem::Direct(_) | AvoidanceSystem::Reservation(_) => {}
            AvoidanceSystem::Orca(system) => system.post_step(),
        }
    }

    /// Drops whatever the system holds for an agent that is going away.
    pub fn release(&mut self, strategy: &mut AvoidanceStrategy) {
        if let (AvoidanceSystem::Orca(system), AvoidanceStrategy::Orca(strategy)) = (self, strategy) {
            strategy.release(system);
        }
    }
}

/// One agent's avoidance behavior.
#[derive(Debug, Clone, PartialEq)]
pub enum AvoidanceStrategy {
    /// See [`DirectStrategy`].
    Direct(DirectStrategy),
    /// See [`ReservationStrategy`].
    Reservation(ReservationStrategy),
    /// See [`OrcaStrategy`].
    Orca(OrcaStrategy),
}

impl AvoidanceStrategy {
    /// The algorithm of this strategy.
    pub fn kind(&self) -> AvoidanceKind {
        match self {
            AvoidanceStrategy::Direct(_) => AvoidanceKind::Direct,
            AvoidanceStrategy::Reservation(_) => AvoidanceKind::Reservation,
            AvoidanceStrategy::Orca(_) => AvoidanceKind::Orca,
        }
    }

    /// Velocity to apply this tick. Falls back to the preferred velocity if
    /// `system` belongs to another algorithm.
    pub fn compute_velocity(&mut self, me: &AgentState, system: &mut AvoidanceSystem, view: &Neighborhood<'_>) -> Vec2 {
        match (self, system) {
            (AvoidanceStrategy::Direct(s), AvoidanceSystem::Direct(_)) => s.compute_velocity(me, view),
            (AvoidanceStrategy::Reservation(s), AvoidanceSystem::Reservation(sys)) => s.compute_velocity(me, sys, view),
            (AvoidanceStrategy::Orca(s), AvoidanceSystem::Orca(sys)) => s.compute_velocity(me, sys),
            (strategy, system) => {
                warn!(
                    agent = %me.id,
                    strategy = %strategy.kind(),
                    system = %system.kind(),
                    "Strategy does not match the installed system"
                );
                me.preferred_velocity
            }
        }
    }
}
