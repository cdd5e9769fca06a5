//! Grid navigation for crowds of disk-shaped agents.
//!
//! - [`map`]: square and hexagonal grid topologies, the grid map and its change feed.
//! - [`dijkstra`]: unit-weight shortest paths over any [`map::GridQuery`].
//! - [`path_manager`]: owning path handles, temporal broad phase and collision prediction.

pub mod dijkstra;
pub mod error;
pub mod map;
pub mod path_manager;

pub use error::NavigationError;
pub use map::{
    Cell, CellContent, ChangeFeed, GridChange, GridConfig, GridCoord, GridLayout, GridMap, GridQuery,
    GridTopology, OccupantId, Subscription, WorldPoint,
};
pub use path_manager::{
    CollisionEvent, DynamicInfo, EvalInfo, PathHandle, PathId, PathManager, PathState, TimeWindow,
};
