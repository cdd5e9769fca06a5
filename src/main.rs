mod blackboard;
mod bus;
mod config;

use blackboard::{Blackboard, raise_fault, snapshot};
use bus::Topic;
use gridcrowd_core::{AgentCollision, World};

use anyhow::Context;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

/// Collision prediction published every `report_every` frames.
#[derive(Debug, Clone)]
struct CollisionReport {
    tick: u64,
    collisions: Vec<AgentCollision>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Gridcrowd runner started.");

    let app = config::load_config().context("loading configuration")?;
    let mut world = World::from_settings(&app.settings).context("building the world")?;

    let bb: Blackboard = Arc::default();
    let reports: Topic<CollisionReport> = Topic::new(16);
    let reporter = tokio::spawn(reporter(bb.clone(), reports.subscribe()));

    let result = run(&mut world, &app.runner, &bb, &reports).await;
    if let Err(e) = &result {
        error!("Simulation stopped: {:#}", e);
        raise_fault(&bb, &e.to_string());
    }

    // Closing the topic ends the reporter.
    drop(reports);
    if let Err(e) = reporter.await {
        warn!("Reporter task failed: {}", e);
    }

    let status = snapshot(&bb);
    info!(
        ticks = status.ticks,
        arrived = status.arrived,
        agents = status.agents,
        faults = ?status.faults,
        "Gridcrowd runner finished."
    );
    result
}

async fn run(
    world: &mut World,
    runner: &config::RunnerSettings,
    bb: &Blackboard,
    reports: &Topic<CollisionReport>,
) -> anyhow::Result<()> {
    if !runner.frame_rate.is_finite() || runner.frame_rate <= 0.0 {
        anyhow::bail!("runner.frame_rate must be positive and finite");
    }
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / runner.frame_rate));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let deadline = tokio::time::sleep(if runner.duration_secs > 0.0 {
        Duration::from_secs_f64(runner.duration_secs)
    } else {
        Duration::MAX
    });
    tokio::pin!(deadline);

    let report_every = runner.report_every.max(1);
    let mut frames: u64 = 0;
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Run duration elapsed.");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let dt = (now - last).as_secs_f64();
        last = now;

        world.update(dt).context("advancing the simulation")?;
        frames += 1;

        let stats = world.stats();
        {
            let mut g = bb.write();
            g.ticks = stats.ticks;
            g.agents = world.simulation().population().len();
            g.arrived = world.arrived();
        }

        if frames % report_every == 0 {
            reports.publish(CollisionReport { tick: stats.ticks, collisions: world.collisions() });
            info!(
                ticks = stats.ticks,
                sim_rate = stats.sim_rate,
                arrived = world.arrived(),
                "Simulation progress"
            );
        }

        if world.all_arrived() {
            info!(ticks = stats.ticks, "All agents arrived.");
            return Ok(());
        }
    }
}

async fn reporter(
    bb: Blackboard,
    mut rx: tokio::sync::broadcast::Receiver<Arc<CollisionReport>>,
) {
    info!("Reporter task started.");
    loop {
        match rx.recv().await {
            Ok(report) => {
                {
                    let mut g = bb.write();
                    g.predicted_collisions = report.collisions.len();
                    g.last_report_ts = Instant::now();
                }
                if let Some(first) = report.collisions.first() {
                    warn!(
                        tick = report.tick,
                        count = report.collisions.len(),
                        "Predicted contact between {} and {} in {:.2}s",
                        first.agents.0,
                        first.agents.1,
                        first.time
                    );
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Reporter fell behind.");
                raise_fault(&bb, "collision reports dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    info!("Reporter task finished.");
}
