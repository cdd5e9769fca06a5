//! Reciprocal velocity obstacles (ORCA) for disk agents.
//!
//! A small RVO2-style simulator: agents are registered with a position and
//! receive a preferred velocity each step; [`RvoSimulator::do_step`] solves,
//! per agent, a 2-D linear program over the ORCA half-planes induced by its
//! nearest neighbors and then integrates every agent with the new velocity.
//!
//! Only agent-agent constraints are built. Static walls are handled by the
//! grid planner, so the solver carries no obstacle geometry.

use gridcrowd_kinematics::Vec2;
use tracing::trace;

const EPSILON: f64 = 1e-5;

/// Parameters applied to every agent added after they are set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentDefaults {
    /// Maximum center distance at which another agent is considered.
    pub neighbor_dist: f64,
    /// Cap on neighbors per agent, nearest first.
    pub max_neighbors: usize,
    /// Look-ahead window for agent-agent avoidance, in seconds.
    pub time_horizon: f64,
    /// Disk radius.
    pub radius: f64,
    /// Speed limit.
    pub max_speed: f64,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            neighbor_dist: 30.0,
            max_neighbors: 10,
            time_horizon: 10.0,
            radius: 1.5,
            max_speed: 2.0,
        }
    }
}

/// Slot of an agent inside an [`RvoSimulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RvoAgentId(usize);

#[derive(Debug, Clone)]
struct RvoAgent {
    position: Vec2,
    velocity: Vec2,
    pref_velocity: Vec2,
    radius: f64,
    max_speed: f64,
    neighbor_dist: f64,
    max_neighbors: usize,
    time_horizon: f64,
}

/// A directed half-plane in velocity space. Feasible velocities lie to the
/// left of the ray from `point` along `dir`.
#[derive(Debug, Clone, Copy)]
struct OrcaLine {
    point: Vec2,
    dir: Vec2,
}

/// Global ORCA simulator.
#[derive(Debug, Clone)]
pub struct RvoSimulator {
    agents: Vec<Option<RvoAgent>>,
    free: Vec<usize>,
    defaults: AgentDefaults,
    time_step: f64,
    global_time: f64,
}

impl RvoSimulator {
    /// Creates an empty simulator whose new agents use `defaults`.
    pub fn new(defaults: AgentDefaults, time_step: f64) -> Self {
        Self {
            agents: Vec::new(),
            free: Vec::new(),
            defaults,
            time_step,
            global_time: 0.0,
        }
    }

    /// Parameters given to newly added agents.
    pub fn defaults(&self) -> &AgentDefaults {
        &self.defaults
    }

    /// Adds an agent at `position` with the default parameters.
    pub fn add_agent(&mut self, position: Vec2) -> RvoAgentId {
        let d = self.defaults;
        let agent = RvoAgent {
            position,
            velocity: Vec2::ZERO,
            pref_velocity: Vec2::ZERO,
            radius: d.radius,
            max_speed: d.max_speed,
            neighbor_dist: d.neighbor_dist,
            max_neighbors: d.max_neighbors,
            time_horizon: d.time_horizon,
        };
        match self.free.pop() {
            Some(slot) => {
                self.agents[slot] = Some(agent);
                RvoAgentId(slot)
            }
            None => {
                self.agents.push(Some(agent));
                RvoAgentId(self.agents.len() - 1)
            }
        }
    }

    /// Removes an agent. Returns `false` if the slot was already empty.
    pub fn remove_agent(&mut self, id: RvoAgentId) -> bool {
        match self.agents.get_mut(id.0).and_then(Option::take) {
            Some(_) => {
                self.free.push(id.0);
                true
            }
            None => false,
        }
    }

    /// Number of registered agents.
    pub fn num_agents(&self) -> usize {
        self.agents.iter().filter(|a| a.is_some()).count()
    }

    fn agent_mut(&mut self, id: RvoAgentId) -> Option<&mut RvoAgent> {
        self.agents.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Overrides the disk radius of one agent.
    pub fn set_agent_radius(&mut self, id: RvoAgentId, radius: f64) -> bool {
        self.agent_mut(id).map(|a| a.radius = radius).is_some()
    }

    /// Overrides the speed limit of one agent.
    pub fn set_agent_max_speed(&mut self, id: RvoAgentId, max_speed: f64) -> bool {
        self.agent_mut(id).map(|a| a.max_speed = max_speed).is_some()
    }

    /// Moves an agent.
    pub fn set_agent_position(&mut self, id: RvoAgentId, position: Vec2) -> bool {
        self.agent_mut(id).map(|a| a.position = position).is_some()
    }

    /// Sets the velocity an agent would take without neighbors.
    pub fn set_agent_pref_velocity(&mut self, id: RvoAgentId, velocity: Vec2) -> bool {
        self.agent_mut(id).map(|a| a.pref_velocity = velocity).is_some()
    }

    /// Velocity chosen for an agent by the last [`do_step`](Self::do_step).
    pub fn agent_velocity(&self, id: RvoAgentId) -> Option<Vec2> {
        self.agents.get(id.0).and_then(Option::as_ref).map(|a| a.velocity)
    }

    /// Current position of an agent.
    pub fn agent_position(&self, id: RvoAgentId) -> Option<Vec2> {
        self.agents.get(id.0).and_then(Option::as_ref).map(|a| a.position)
    }

    /// Sets the step length used by the next [`do_step`](Self::do_step).
    pub fn set_time_step(&mut self, time_step: f64) {
        self.time_step = time_step;
    }

    /// Step length in seconds.
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Simulated time accumulated by [`do_step`](Self::do_step).
    pub fn global_time(&self) -> f64 {
        self.global_time
    }

    /// Computes a new velocity for every agent, then moves all of them.
    pub fn do_step(&mut self) {
        if !(self.time_step > 0.0) {
            trace!(time_step = self.time_step, "Skipping ORCA step");
            return;
        }
        let inv_time_step = 1.0 / self.time_step;

        let new_velocities: Vec<Option<Vec2>> = (0..self.agents.len())
            .map(|i| self.agents[i].as_ref().map(|a| self.solve(i, a, inv_time_step)))
            .collect();

        for (agent, velocity) in self.agents.iter_mut().zip(new_velocities) {
            if let (Some(agent), Some(velocity)) = (agent.as_mut(), velocity) {
                agent.velocity = velocity;
                agent.position += velocity * self.time_step;
            }
        }
        self.global_time += self.time_step;
    }

    /// Nearest neighbors of agent `index`, closest first.
    fn neighbors(&self, index: usize, agent: &RvoAgent) -> Vec<usize> {
        let range_sq = agent.neighbor_dist * agent.neighbor_dist;
        let mut found: Vec<(f64, usize)> = self
            .agents
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != index)
            .filter_map(|(j, other)| {
                let other = other.as_ref()?;
                let dist_sq = (other.position - agent.position).length_squared();
                (dist_sq < range_sq).then_some((dist_sq, j))
            })
            .collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0));
        found.truncate(agent.max_neighbors);
        found.into_iter().map(|(_, j)| j).collect()
    }

    fn solve(&self, index: usize, agent: &RvoAgent, inv_time_step: f64) -> Vec2 {
        let lines: Vec<OrcaLine> = self
            .neighbors(index, agent)
            .into_iter()
            .filter_map(|j| self.agents[j].as_ref())
            .map(|other| orca_line(agent, other, inv_time_step))
            .collect();

        let mut result = agent.pref_velocity;
        let failed = lp2(&lines, agent.max_speed, agent.pref_velocity, false, &mut result);
        if failed < lines.len() {
            lp3(&lines, failed, agent.max_speed, &mut result);
        }
        result
    }
}

/// Half-plane that `a` must respect to avoid `b`, taking half the responsibility.
fn orca_line(a: &RvoAgent, b: &RvoAgent, inv_time_step: f64) -> OrcaLine {
    let rel_pos = b.position - a.position;
    let rel_vel = a.velocity - b.velocity;
    let dist_sq = rel_pos.length_squared();
    let combined_radius = a.radius + b.radius;
    let combined_radius_sq = combined_radius * combined_radius;
    let inv_time_horizon = 1.0 / a.time_horizon;

    let (dir, u) = if dist_sq > combined_radius_sq {
        // Vector from the cutoff center to the relative velocity.
        let w = rel_vel - rel_pos * inv_time_horizon;
        let w_length_sq = w.length_squared();
        let dot = w.dot(rel_pos);

        if dot < 0.0 && dot * dot > combined_radius_sq * w_length_sq {
            // Project on the cutoff circle.
            let w_length = w_length_sq.sqrt();
            let unit_w = if w_length > EPSILON { w / w_length } else { Vec2::new(1.0, 0.0) };
            let dir = Vec2::new(unit_w.y, -unit_w.x);
            (dir, unit_w * (combined_radius * inv_time_horizon - w_length))
        } else {
            // Project on the nearer leg.
            let leg = (dist_sq - combined_radius_sq).max(0.0).sqrt();
            let dir = if rel_pos.det(w) > 0.0 {
                Vec2::new(
                    rel_pos.x * leg - rel_pos.y * combined_radius,
                    rel_pos.x * combined_radius + rel_pos.y * leg,
                ) / dist_sq
            } else {
                -Vec2::new(
                    rel_pos.x * leg + rel_pos.y * combined_radius,
                    -rel_pos.x * combined_radius + rel_pos.y * leg,
                ) / dist_sq
            };
            (dir, dir * rel_vel.dot(dir) - rel_vel)
        }
    } else {
        // Already overlapping: resolve within one time step.
        let w = rel_vel - rel_pos * inv_time_step;
        let w_length = w.length();
        let unit_w = if w_length > EPSILON {
            w / w_length
        } else if dist_sq > EPSILON * EPSILON {
            -rel_pos.normalize_or_zero()
        } else {
            Vec2::new(1.0, 0.0)
        };
        let dir = Vec2::new(unit_w.y, -unit_w.x);
        (dir, unit_w * (combined_radius * inv_time_step - w_length))
    };

    OrcaLine { point: a.velocity + u * 0.5, dir }
}

/// Optimizes along line `line_no` subject to the lines before it and the speed circle.
fn lp1(lines: &[OrcaLine], line_no: usize, radius: f64, opt_velocity: Vec2, direction_opt: bool, result: &mut Vec2) -> bool {
    let line = lines[line_no];
    let dot = line.point.dot(line.dir);
    let discriminant = dot * dot + radius * radius - line.point.length_squared();
    if discriminant < 0.0 {
        // The speed circle misses the line entirely.
        return false;
    }

    let sqrt_discriminant = discriminant.sqrt();
    let mut t_left = -dot - sqrt_discriminant;
    let mut t_right = -dot + sqrt_discriminant;

    for other in &lines[..line_no] {
        let denominator = line.dir.det(other.dir);
        let numerator = other.dir.det(line.point - other.point);

        if denominator.abs() <= EPSILON {
            // Parallel lines.
            if numerator < 0.0 {
                return false;
            }
            continue;
        }

        let t = numerator / denominator;
        if denominator >= 0.0 {
            t_right = t_right.min(t);
        } else {
            t_left = t_left.max(t);
        }
        if t_left > t_right {
            return false;
        }
    }

    *result = if direction_opt {
        if opt_velocity.dot(line.dir) > 0.0 {
            line.point + line.dir * t_right
        } else {
            line.point + line.dir * t_left
        }
    } else {
        let t = line.dir.dot(opt_velocity - line.point);
        line.point + line.dir * t.clamp(t_left, t_right)
    };
    true
}

/// Returns the index of the first line that could not be satisfied, or
/// `lines.len()` on success.
fn lp2(lines: &[OrcaLine], radius: f64, opt_velocity: Vec2, direction_opt: bool, result: &mut Vec2) -> usize {
    *result = if direction_opt {
        // `opt_velocity` is a unit direction here.
        opt_velocity * radius
    } else if opt_velocity.length_squared() > radius * radius {
        opt_velocity.normalize_or_zero() * radius
    } else {
        opt_velocity
    };

    for i in 0..lines.len() {
        if lines[i].dir.det(lines[i].point - *result) > 0.0 {
            let previous = *result;
            if !lp1(lines, i, radius, opt_velocity, direction_opt, result) {
                *result = previous;
                return i;
            }
        }
    }
    lines.len()
}

/// Infeasible case: minimizes the largest penetration into the remaining lines.
fn lp3(lines: &[OrcaLine], begin_line: usize, radius: f64, result: &mut Vec2) {
    let mut distance = 0.0;

    for i in begin_line..lines.len() {
        if lines[i].dir.det(lines[i].point - *result) <= distance {
            continue;
        }

        let mut projected = Vec::with_capacity(i);
        for j in 0..i {
            let determinant = lines[i].dir.det(lines[j].dir);
            let point = if determinant.abs() <= EPSILON {
                if lines[i].dir.dot(lines[j].dir) > 0.0 {
                    // Same direction.
                    continue;
                }
                (lines[i].point + lines[j].point) * 0.5
            } else {
                let t = lines[j].dir.det(lines[i].point - lines[j].point) / determinant;
                lines[i].point + lines[i].dir * t
            };
            projected.push(OrcaLine { point, dir: (lines[j].dir - lines[i].dir).normalize_or_zero() });
        }

        let previous = *result;
        if lp2(&projected, radius, lines[i].dir.perp(), true, result) < projected.len() {
            // Only reachable through floating point error.
            *result = previous;
        }
        distance = lines[i].dir.det(lines[i].point - *result);
    }
}
