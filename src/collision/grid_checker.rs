//! Collision checker backed by an occupancy grid
//!
//! The robot is approximated by spheres; a motion is free when every
//! interpolated configuration keeps every sphere clear of the grid's
//! obstacles.

use std::sync::Arc;

use nalgebra::Vector3;
use tracing::trace;

use crate::common::{CollisionChecker, Obstacle, RobotModel, RobotState, Visualization};
use crate::robot::PlanarArm;
use crate::utils::angles::{normalize_angle, shortest_angle_diff};

use super::occupancy_grid::OccupancyGrid;

/// Sphere approximation of a robot's geometry
pub trait CollisionModel: RobotModel {
    /// (centre, radius) pairs for a configuration
    fn collision_spheres(&self, state: &[f64]) -> Vec<(Vector3<f64>, f64)>;
}

impl CollisionModel for PlanarArm {
    fn collision_spheres(&self, state: &[f64]) -> Vec<(Vector3<f64>, f64)> {
        const RADIUS: f64 = 0.05;
        let points = self.link_points(state);
        let mut spheres = Vec::new();
        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let n = ((b - a).norm() / RADIUS).ceil().max(1.0) as usize;
            for i in 0..n {
                spheres.push((a + (b - a) * (i as f64 / n as f64), RADIUS));
            }
        }
        if let Some(tip) = points.last() {
            spheres.push((*tip, RADIUS));
        }
        spheres
    }
}

/// Configuration for the grid collision checker
#[derive(Debug, Clone)]
pub struct GridCollisionCheckerConfig {
    /// Extra clearance added to every sphere [m]
    pub padding: f64,
    /// Largest joint step between interpolated configurations [rad]
    pub interpolation_step: f64,
}

impl Default for GridCollisionCheckerConfig {
    fn default() -> Self {
        Self {
            padding: 0.0,
            interpolation_step: 0.05,
        }
    }
}

/// [`CollisionChecker`] over an [`OccupancyGrid`]
pub struct GridCollisionChecker {
    grid: OccupancyGrid,
    model: Arc<dyn CollisionModel>,
    config: GridCollisionCheckerConfig,
}

impl GridCollisionChecker {
    pub fn new(grid: OccupancyGrid, model: Arc<dyn CollisionModel>, config: GridCollisionCheckerConfig) -> Self {
        Self { grid, model, config }
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut OccupancyGrid {
        &mut self.grid
    }

    /// Whether a single configuration is clear of obstacles
    pub fn is_state_valid(&self, state: &[f64]) -> bool {
        self.model
            .collision_spheres(state)
            .iter()
            .all(|(c, r)| self.grid.distance(c) > r + self.config.padding)
    }

    /// Configurations between `from` and `to`, excluding `from`
    fn interpolate(&self, from: &[f64], to: &[f64]) -> Vec<RobotState> {
        let deltas: Vec<f64> = from
            .iter()
            .zip(to.iter())
            .enumerate()
            .map(|(i, (&a, &b))| {
                if self.model.is_continuous(i) {
                    shortest_angle_diff(b, a)
                } else {
                    b - a
                }
            })
            .collect();
        let largest = deltas.iter().fold(0.0_f64, |m, d| m.max(d.abs()));
        let steps = (largest / self.config.interpolation_step).ceil().max(1.0) as usize;
        (1..=steps)
            .map(|s| {
                let t = s as f64 / steps as f64;
                from.iter()
                    .zip(deltas.iter())
                    .enumerate()
                    .map(|(i, (&a, &d))| {
                        let q = a + t * d;
                        if self.model.is_continuous(i) {
                            normalize_angle(q)
                        } else {
                            q
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

impl CollisionChecker for GridCollisionChecker {
    fn is_free(&self, segment: &[RobotState]) -> bool {
        if self.grid.is_empty() {
            return true;
        }
        let first = match segment.first() {
            Some(first) => first,
            None => return true,
        };
        if !self.is_state_valid(first) {
            trace!("segment origin in collision");
            return false;
        }
        segment.windows(2).all(|pair| {
            self.interpolate(&pair[0], &pair[1])
                .iter()
                .all(|q| self.is_state_valid(q))
        })
    }

    fn reset(&mut self) {
        self.grid.reset();
    }

    fn add_obstacle(&mut self, region: &Obstacle) {
        self.grid.add_obstacle(region);
    }

    fn world_size(&self) -> Vector3<f64> {
        self.grid.world_size()
    }

    fn resolution(&self) -> f64 {
        self.grid.resolution()
    }

    fn visualization(&self, kind: &str) -> Option<Visualization> {
        self.grid.visualization(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::OccupancyGridConfig;

    fn checker() -> GridCollisionChecker {
        let grid = OccupancyGrid::new(OccupancyGridConfig {
            size: Vector3::new(4.0, 4.0, 0.4),
            resolution: 0.05,
            origin: Vector3::new(-2.0, -2.0, -0.2),
            ..Default::default()
        });
        let arm = Arc::new(PlanarArm::new(vec![1.0]));
        GridCollisionChecker::new(grid, arm, GridCollisionCheckerConfig::default())
    }

    #[test]
    fn test_empty_grid_is_free() {
        let checker = checker();
        assert!(checker.is_free(&[vec![0.0], vec![3.0]]));
        assert!(checker.is_free(&[]));
    }

    #[test]
    fn test_obstacle_blocks_sweep() {
        let mut checker = checker();
        // block the tip's path at +90 degrees
        checker.add_obstacle(&Obstacle::cube(Vector3::new(0.0, 1.0, 0.0), Vector3::new(0.2, 0.2, 0.2)));
        assert!(checker.is_free(&[vec![0.0], vec![0.5]]));
        assert!(!checker.is_free(&[vec![0.0], vec![std::f64::consts::PI]]));
        assert!(!checker.is_state_valid(&[std::f64::consts::FRAC_PI_2]));
        checker.reset();
        assert!(checker.is_free(&[vec![0.0], vec![std::f64::consts::PI]]));
    }

    #[test]
    fn test_collaborator_queries() {
        let checker = checker();
        assert!((checker.world_size().x - 4.0).abs() < 1e-12);
        assert!((checker.resolution() - 0.05).abs() < 1e-12);
        assert!(checker.visualization("bounds").is_some());
    }
}
