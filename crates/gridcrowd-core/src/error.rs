//! Error types for the simulation layer.

use std::fmt;

use gridcrowd_kinematics::KinematicsError;
use gridcrowd_navigation::NavigationError;

use crate::agent::AgentId;

/// Errors raised while configuring or stepping a simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// A setting or argument was rejected before anything ran.
    Configuration(&'static str),
    /// Grid or path registry failure.
    Navigation(NavigationError),
    /// Integration failure while moving an agent.
    Kinematics(KinematicsError),
    /// No agent with this id is registered.
    UnknownAgent(AgentId),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            SimulationError::Navigation(e) => write!(f, "Navigation error: {}", e),
            SimulationError::Kinematics(e) => write!(f, "Kinematics error: {}", e),
            SimulationError::UnknownAgent(id) => write!(f, "Unknown agent: {}", id),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Navigation(e) => Some(e),
            SimulationError::Kinematics(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NavigationError> for SimulationError {
    fn from(e: NavigationError) -> Self {
        SimulationError::Navigation(e)
    }
}

impl From<KinematicsError> for SimulationError {
    fn from(e: KinematicsError) -> Self {
        SimulationError::Kinematics(e)
    }
}
