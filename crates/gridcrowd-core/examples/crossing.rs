use gridcrowd_core::settings::RouteSettings;
use gridcrowd_core::{AvoidanceKind, Settings, World};

fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    // Four agents cross a plus-shaped room through its center.
    let mut settings = Settings::default();
    settings.grid.rows = 9;
    settings.grid.cols = 9;
    settings.grid.area_end = [180.0, 180.0];
    settings.agents.radius = 4.0;
    settings.agents.speed = 30.0;
    settings.scenario.obstacles = (0..9)
        .flat_map(|r| (0..9).map(move |c| [r, c]))
        .filter(|&[r, c]| (r < 3 || r > 5) && (c < 3 || c > 5))
        .collect();
    settings.scenario.routes = vec![
        RouteSettings { from: [4, 0], to: [4, 8] },
        RouteSettings { from: [4, 8], to: [4, 0] },
        RouteSettings { from: [0, 4], to: [8, 4] },
        RouteSettings { from: [8, 4], to: [0, 4] },
    ];

    for kind in AvoidanceKind::ALL {
        settings.simulation.avoidance = Some(kind);
        let mut world = match World::from_settings(&settings) {
            Ok(world) => world,
            Err(e) => {
                eprintln!("{kind}: {e}");
                return;
            }
        };

        world.update(1.0 / 60.0).expect("non-negative dt");
        let predicted = world.collisions();
        println!("\n{kind}: {} predicted contacts", predicted.len());
        for c in predicted.iter().take(3) {
            println!("  t={:.2}s {} x {} at {} / {}", c.time, c.agents.0, c.agents.1, c.positions.0, c.positions.1);
        }

        let mut seconds = 0.0;
        while !world.all_arrived() && seconds < 30.0 {
            world.update(1.0 / 60.0).expect("non-negative dt");
            seconds += 1.0 / 60.0;
        }
        println!("  {} of 4 arrived after {seconds:.2}s", world.arrived());
    }
}
