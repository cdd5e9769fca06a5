use gridcrowd_navigation::dijkstra::search;
use gridcrowd_navigation::{CellContent, GridConfig, GridCoord, GridMap, GridTopology, WorldPoint};
use std::collections::HashSet;

fn main() {
    // X = wall
    let layout = [
        "..........",
        ".XX....XX.",
        "....X.....",
        "..XXXX.X..",
        ".....X.X..",
        ".XXX.X.XX.",
        "...X......",
        ".X.X.XXX..",
        ".X......X.",
        "...XXX....",
    ];

    for topology in GridTopology::ALL {
        let mut grid = GridMap::with_config(GridConfig {
            rows: layout.len(),
            cols: layout[0].len(),
            topology,
            area_start: WorldPoint::new(0.0, 0.0),
            area_end: WorldPoint::new(100.0, 100.0),
            regular: false,
        })
        .expect("valid grid");

        for (row, line) in layout.iter().enumerate() {
            for (col, ch) in line.chars().enumerate() {
                if ch == 'X' {
                    grid.set_content(GridCoord::new(row, col), CellContent::Obstacle)
                        .expect("in bounds");
                }
            }
        }

        let start = GridCoord::new(0, 0);
        let goal = GridCoord::new(9, 9);
        let result = search(&grid, start, goal);
        println!("\n{topology} grid: {result}");

        let on_path: HashSet<GridCoord> = result.path.iter().copied().collect();
        for (row, line) in layout.iter().enumerate() {
            // Odd hex rows are drawn shifted to show the offset layout.
            if topology == GridTopology::Hexagonal && row % 2 == 1 {
                print!(" ");
            }
            for (col, ch) in line.chars().enumerate() {
                let coord = GridCoord::new(row, col);
                let glyph = if coord == start {
                    'S'
                } else if coord == goal {
                    'G'
                } else if on_path.contains(&coord) {
                    '*'
                } else {
                    ch
                };
                print!("{glyph} ");
            }
            println!();
        }
    }
}
