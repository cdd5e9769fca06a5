use parking_lot::RwLock;
use std::{sync::Arc, time::Instant};

#[derive(Clone)]
pub struct SimStatus {
    pub ticks: u64,
    pub agents: usize,
    pub arrived: usize,
    pub predicted_collisions: usize,
    pub last_report_ts: Instant,
    pub faults: Vec<String>,
}

impl Default for SimStatus {
    fn default() -> Self {
        SimStatus {
            ticks: 0,
            agents: 0,
            arrived: 0,
            predicted_collisions: 0,
            last_report_ts: Instant::now(),
            faults: Vec::new(),
        }
    }
}

pub type Blackboard = Arc<RwLock<SimStatus>>;

pub fn snapshot(bb: &Blackboard) -> SimStatus {
    (*bb.read()).clone()
}

pub fn raise_fault(bb: &Blackboard, msg: &str) {
    let mut g = bb.write();
    if !g.faults.iter().any(|s| s == msg) {
        g.faults.push(msg.to_string());
    }
}
