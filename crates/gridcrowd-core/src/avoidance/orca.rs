//! Adapter between agents and the global [`RvoSimulator`].

use gridcrowd_kinematics::Vec2;
use tracing::debug;

use crate::agent::AgentState;
use crate::rvo::{AgentDefaults, RvoAgentId, RvoSimulator};

/// Owns the solver shared by every ORCA agent.
#[derive(Debug, Clone)]
pub struct OrcaSystem {
    simulator: RvoSimulator,
}

impl OrcaSystem {
    /// Creates a solver with the given per-agent defaults.
    pub fn new(defaults: AgentDefaults) -> Self {
        Self { simulator: RvoSimulator::new(defaults, 0.0) }
    }

    /// Read access to the solver.
    pub fn simulator(&self) -> &RvoSimulator {
        &self.simulator
    }

    pub(crate) fn pre_step(&mut self, dt: f64) {
        self.simulator.set_time_step(dt);
    }

    pub(crate) fn post_step(&mut self) {
        self.simulator.do_step();
    }
}

/// Per-agent slot in the ORCA solver, assigned lazily.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrcaStrategy {
    slot: Option<RvoAgentId>,
}

impl OrcaStrategy {
    /// Whether the agent has been registered with a solver.
    pub fn is_registered(&self) -> bool {
        self.slot.is_some()
    }

    /// Registers the agent on the first call and returns zero; afterwards
    /// pushes the agent's state and returns the velocity of the last solver step.
    pub fn compute_velocity(&mut self, me: &AgentState, system: &mut OrcaSystem) -> Vec2 {
        let sim = &mut system.simulator;
        match self.slot {
            None => {
                let slot = sim.add_agent(me.position);
                sim.set_agent_radius(slot, me.radius);
                sim.set_agent_max_speed(slot, me.max_speed);
                debug!(agent = %me.id, ?slot, "Agent registered with ORCA");
                self.slot = Some(slot);
                Vec2::ZERO
            }
            Some(slot) => {
                sim.set_agent_position(slot, me.position);
                sim.set_agent_pref_velocity(slot, me.preferred_velocity);
                sim.agent_velocity(slot).unwrap_or(Vec2::ZERO)
            }
        }
    }

    /// Unregisters the agent from `system`.
    pub fn release(&mut self, system: &mut OrcaSystem) {
        if let Some(slot) = self.slot.take() {
            system.simulator.remove_agent(slot);
        }
    }
}
