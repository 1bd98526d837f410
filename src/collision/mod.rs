//! Collision-query collaborators
//!
//! - `occupancy_grid`: voxel grid with a propagated distance field
//! - `grid_checker`: sphere-model [`crate::common::CollisionChecker`] over that grid

pub mod occupancy_grid;
pub mod grid_checker;

pub use occupancy_grid::{OccupancyGrid, OccupancyGridConfig};
pub use grid_checker::{CollisionModel, GridCollisionChecker, GridCollisionCheckerConfig};
