//! Voxel occupancy grid with a propagated distance field
//!
//! Obstacles are inserted as points or boxes; every insertion re-runs a
//! brushfire propagation that records, per cell, the distance to the nearest
//! occupied cell up to a cap.

use std::collections::VecDeque;

use itertools::iproduct;
use nalgebra::{Matrix3, Vector3};
use tracing::{debug, error};

use crate::common::{Obstacle, Pose, Visualization};

/// Configuration for an occupancy grid
#[derive(Debug, Clone)]
pub struct OccupancyGridConfig {
    /// World extents [m]
    pub size: Vector3<f64>,
    /// Cell edge length [m]
    pub resolution: f64,
    /// World position of cell (0, 0, 0)
    pub origin: Vector3<f64>,
    /// Distances are propagated up to this value [m]
    pub max_distance: f64,
    /// Distance band reported by the "distance_field" visualization [m]
    pub iso_band: (f64, f64),
}

impl Default for OccupancyGridConfig {
    fn default() -> Self {
        Self {
            size: Vector3::new(2.0, 2.0, 2.0),
            resolution: 0.02,
            origin: Vector3::new(-1.0, -1.0, -1.0),
            max_distance: 0.40,
            iso_band: (0.0, 0.03),
        }
    }
}

/// Dense 3D occupancy grid
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    config: OccupancyGridConfig,
    dims: (usize, usize, usize),
    occupied: Vec<bool>,
    distance: Vec<f64>,
    num_occupied: usize,
}

impl OccupancyGrid {
    pub fn new(config: OccupancyGridConfig) -> Self {
        let cells = |extent: f64| (extent / config.resolution).round().max(0.0) as usize;
        let dims = (cells(config.size.x), cells(config.size.y), cells(config.size.z));
        let count = dims.0 * dims.1 * dims.2;
        Self {
            occupied: vec![false; count],
            distance: vec![config.max_distance; count],
            dims,
            num_occupied: 0,
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(OccupancyGridConfig::default())
    }

    /// Remove every obstacle
    pub fn reset(&mut self) {
        self.occupied.iter_mut().for_each(|c| *c = false);
        self.distance.iter_mut().for_each(|d| *d = self.config.max_distance);
        self.num_occupied = 0;
    }

    /// Number of cells along x, y, z
    pub fn grid_size(&self) -> (usize, usize, usize) {
        self.dims
    }

    pub fn world_size(&self) -> Vector3<f64> {
        self.config.size
    }

    pub fn origin(&self) -> Vector3<f64> {
        self.config.origin
    }

    pub fn resolution(&self) -> f64 {
        self.config.resolution
    }

    pub fn max_distance(&self) -> f64 {
        self.config.max_distance
    }

    /// True when no cell is occupied
    pub fn is_empty(&self) -> bool {
        self.num_occupied == 0
    }

    pub fn num_occupied(&self) -> usize {
        self.num_occupied
    }

    pub fn world_to_grid(&self, p: &Vector3<f64>) -> Option<(usize, usize, usize)> {
        let rel = (p - self.config.origin) / self.config.resolution;
        let (ix, iy, iz) = (rel.x.floor(), rel.y.floor(), rel.z.floor());
        if ix < 0.0 || iy < 0.0 || iz < 0.0 {
            return None;
        }
        let (ix, iy, iz) = (ix as usize, iy as usize, iz as usize);
        if ix >= self.dims.0 || iy >= self.dims.1 || iz >= self.dims.2 {
            return None;
        }
        Some((ix, iy, iz))
    }

    /// World position of a cell centre
    pub fn grid_to_world(&self, ix: usize, iy: usize, iz: usize) -> Vector3<f64> {
        self.config.origin
            + Vector3::new(ix as f64 + 0.5, iy as f64 + 0.5, iz as f64 + 0.5) * self.config.resolution
    }

    fn index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        (ix * self.dims.1 + iy) * self.dims.2 + iz
    }

    fn cell(&self, index: usize) -> (usize, usize, usize) {
        let iz = index % self.dims.2;
        let iy = (index / self.dims.2) % self.dims.1;
        let ix = index / (self.dims.1 * self.dims.2);
        (ix, iy, iz)
    }

    pub fn is_occupied(&self, p: &Vector3<f64>) -> bool {
        self.world_to_grid(p)
            .map(|(ix, iy, iz)| self.occupied[self.index(ix, iy, iz)])
            .unwrap_or(false)
    }

    /// Distance to the nearest obstacle, capped at `max_distance`.
    /// Points outside the grid see no obstacles.
    pub fn distance(&self, p: &Vector3<f64>) -> f64 {
        self.world_to_grid(p)
            .map(|(ix, iy, iz)| self.distance[self.index(ix, iy, iz)])
            .unwrap_or(self.config.max_distance)
    }

    /// Mark the cells containing `points` occupied and re-propagate
    pub fn add_points(&mut self, points: &[Vector3<f64>]) {
        let mut added = 0;
        for p in points {
            if let Some((ix, iy, iz)) = self.world_to_grid(p) {
                let idx = self.index(ix, iy, iz);
                if !self.occupied[idx] {
                    self.occupied[idx] = true;
                    added += 1;
                }
            }
        }
        self.num_occupied += added;
        debug!(added, total = self.num_occupied, "occupancy grid updated");
        if added > 0 {
            self.propagate();
        }
    }

    /// Insert a point cloud; an empty cloud leaves the grid untouched
    pub fn update_from_points(&mut self, points: &[Vector3<f64>]) {
        if points.is_empty() {
            debug!("[grid] collision map received is empty.");
            return;
        }
        self.add_points(points);
    }

    /// Fill an axis-aligned box sampled at the grid resolution, bounds inclusive
    pub fn add_cube(&mut self, center: Vector3<f64>, size: Vector3<f64>) {
        let res = self.config.resolution;
        let steps = |extent: f64| (extent / res + 1e-9).floor() as usize;
        let start = center - size / 2.0;
        let points: Vec<Vector3<f64>> = iproduct!(0..=steps(size.x), 0..=steps(size.y), 0..=steps(size.z))
            .map(|(i, j, k)| start + Vector3::new(i as f64, j as f64, k as f64) * res)
            .collect();
        self.add_points(&points);
    }

    pub fn add_obstacle(&mut self, obstacle: &Obstacle) {
        self.add_cube(obstacle.center, obstacle.size);
    }

    /// Sample points of a box of extents `dims` placed at `pose`
    pub fn occupied_voxels(&self, pose: &Pose, dims: &Vector3<f64>) -> Vec<Vector3<f64>> {
        let res = self.config.resolution;
        let rot: Matrix3<f64> = pose.orientation.to_rotation_matrix().into_inner();
        let steps = |extent: f64| (extent / res + 1e-9).floor() as usize;
        iproduct!(0..=steps(dims.x), 0..=steps(dims.y), 0..=steps(dims.z))
            .map(|(i, j, k)| {
                let local = Vector3::new(i as f64, j as f64, k as f64) * res - dims / 2.0;
                rot * local + pose.position
            })
            .collect()
    }

    /// Brushfire propagation from every occupied cell
    fn propagate(&mut self) {
        let max_distance = self.config.max_distance;
        let mut nearest: Vec<Option<usize>> = vec![None; self.occupied.len()];
        let mut queue = VecDeque::new();
        for (idx, &occ) in self.occupied.iter().enumerate() {
            if occ {
                self.distance[idx] = 0.0;
                nearest[idx] = Some(idx);
                queue.push_back(idx);
            } else {
                self.distance[idx] = max_distance;
            }
        }

        let (nx, ny, nz) = (self.dims.0 as i64, self.dims.1 as i64, self.dims.2 as i64);
        while let Some(idx) = queue.pop_front() {
            let source = match nearest[idx] {
                Some(s) => s,
                None => continue,
            };
            let (sx, sy, sz) = self.cell(source);
            let source_pos = self.grid_to_world(sx, sy, sz);
            let (cx, cy, cz) = self.cell(idx);
            for (dx, dy, dz) in iproduct!(-1i64..=1, -1i64..=1, -1i64..=1) {
                if dx == 0 && dy == 0 && dz == 0 {
                    continue;
                }
                let (x, y, z) = (cx as i64 + dx, cy as i64 + dy, cz as i64 + dz);
                if x < 0 || y < 0 || z < 0 || x >= nx || y >= ny || z >= nz {
                    continue;
                }
                let n = self.index(x as usize, y as usize, z as usize);
                let d = (self.grid_to_world(x as usize, y as usize, z as usize) - source_pos).norm();
                if d < self.distance[n] && d < max_distance {
                    self.distance[n] = d;
                    nearest[n] = Some(source);
                    queue.push_back(n);
                }
            }
        }
    }

    /// Named representation of the grid; `None` for unknown kinds
    pub fn visualization(&self, kind: &str) -> Option<Visualization> {
        match kind {
            "bounds" => {
                let o = self.config.origin;
                let s = self.config.size;
                let corners = [
                    (0.0, 0.0, 0.0),
                    (s.x, 0.0, 0.0),
                    (s.x, s.y, 0.0),
                    (0.0, s.y, 0.0),
                    (0.0, 0.0, 0.0),
                    (0.0, 0.0, s.z),
                    (s.x, 0.0, s.z),
                    (s.x, s.y, s.z),
                    (0.0, s.y, s.z),
                    (0.0, 0.0, s.z),
                ];
                Some(Visualization::Bounds(
                    corners
                        .iter()
                        .map(|&(x, y, z)| o + Vector3::new(x, y, z))
                        .collect(),
                ))
            }
            "distance_field" => {
                let (lo, hi) = self.config.iso_band;
                let cells = self
                    .distance
                    .iter()
                    .enumerate()
                    .filter(|(_, &d)| d >= lo && d <= hi)
                    .map(|(idx, &d)| {
                        let (ix, iy, iz) = self.cell(idx);
                        (self.grid_to_world(ix, iy, iz), d)
                    })
                    .collect();
                Some(Visualization::DistanceField(cells))
            }
            _ => {
                error!("No visualization found of type '{}'.", kind);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_grid() -> OccupancyGrid {
        OccupancyGrid::new(OccupancyGridConfig {
            size: Vector3::new(1.0, 1.0, 0.2),
            resolution: 0.1,
            origin: Vector3::new(0.0, 0.0, 0.0),
            max_distance: 0.4,
            iso_band: (0.0, 0.15),
        })
    }

    #[test]
    fn test_grid_dimensions() {
        let grid = small_grid();
        assert_eq!(grid.grid_size(), (10, 10, 2));
        assert!((grid.resolution() - 0.1).abs() < 1e-12);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_add_points_and_distance() {
        let mut grid = small_grid();
        grid.add_points(&[Vector3::new(0.55, 0.55, 0.05)]);
        assert!(grid.is_occupied(&Vector3::new(0.55, 0.55, 0.05)));
        assert_eq!(grid.distance(&Vector3::new(0.55, 0.55, 0.05)), 0.0);
        let d = grid.distance(&Vector3::new(0.75, 0.55, 0.05));
        assert!((d - 0.2).abs() < 1e-9);
        // beyond the cap
        assert_eq!(grid.distance(&Vector3::new(0.05, 0.05, 0.05)), 0.4);
    }

    #[test]
    fn test_empty_update_is_noop() {
        let mut grid = small_grid();
        grid.update_from_points(&[]);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_add_cube_and_reset() {
        let mut grid = small_grid();
        grid.add_cube(Vector3::new(0.5, 0.5, 0.1), Vector3::new(0.2, 0.2, 0.0));
        assert!(grid.num_occupied() > 0);
        assert!(grid.is_occupied(&Vector3::new(0.45, 0.45, 0.15)));
        grid.reset();
        assert!(grid.is_empty());
        assert_eq!(grid.distance(&Vector3::new(0.5, 0.5, 0.1)), 0.4);
    }

    #[test]
    fn test_outside_grid_is_free() {
        let grid = small_grid();
        assert!(grid.world_to_grid(&Vector3::new(-0.1, 0.0, 0.0)).is_none());
        assert_eq!(grid.distance(&Vector3::new(5.0, 5.0, 5.0)), 0.4);
    }

    #[test]
    fn test_occupied_voxels_count() {
        let grid = small_grid();
        let voxels = grid.occupied_voxels(&Pose::identity(), &Vector3::new(0.2, 0.2, 0.0));
        assert_eq!(voxels.len(), 9);
    }

    #[test]
    fn test_visualization_kinds() {
        let mut grid = small_grid();
        grid.add_points(&[Vector3::new(0.55, 0.55, 0.05)]);
        match grid.visualization("bounds") {
            Some(Visualization::Bounds(points)) => assert_eq!(points.len(), 10),
            other => panic!("unexpected {:?}", other),
        }
        match grid.visualization("distance_field") {
            Some(Visualization::DistanceField(cells)) => assert!(!cells.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
        assert!(grid.visualization("voxels").is_none());
    }
}
