use gridcrowd_navigation::{DynamicInfo, GridConfig, GridCoord, GridMap, GridTopology, PathManager, WorldPoint};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .init();

    let grid = GridMap::with_config(GridConfig {
        rows: 20,
        cols: 20,
        topology: GridTopology::Square,
        area_start: WorldPoint::new(0.0, 0.0),
        area_end: WorldPoint::new(200.0, 200.0),
        regular: true,
    })
    .expect("valid grid");
    let paths = PathManager::new(&grid);

    // Four agents crossing the grid through its center.
    let routes = [
        (GridCoord::new(10, 0), GridCoord::new(10, 19)),
        (GridCoord::new(10, 19), GridCoord::new(10, 0)),
        (GridCoord::new(0, 10), GridCoord::new(19, 10)),
        (GridCoord::new(19, 3), GridCoord::new(0, 3)),
    ];

    let mut handles = Vec::new();
    for (start, end) in routes {
        let handle = paths
            .request_path(DynamicInfo { velocity: 2.0, radius: 4.0 }, start, end)
            .expect("positive velocity");
        let len = paths.get_path(&handle, start, end, &grid).expect("own handle");
        println!("{} {start} -> {end}: {len} cells", handle.id());
        handles.push(handle);
    }

    println!("\n{} broad-phase candidates", paths.candidate_count());
    for event in paths.collisions(&grid) {
        println!(
            "t = {:6.2}: {} at {} / {} at {}",
            event.time, event.paths.0, event.positions.0, event.paths.1, event.positions.1
        );
    }
}
