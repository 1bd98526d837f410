//! Common types used throughout manip_lattice

use nalgebra::{UnitQuaternion, Vector3};

use crate::utils::angles;

/// Ordered joint variables of a robot
pub type RobotState = Vec<f64>;

/// Stable identity of a lattice state within one planning space
pub type StateId = usize;

/// Edge cost reported to a search driver
pub type Cost = i32;

/// Discretized projection of a [`RobotState`].
///
/// Hashing and equality are structural over the element values, so two
/// separately built coords with the same entries address the same bin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Coord(pub Vec<i32>);

impl Coord {
    pub fn new(values: Vec<i32>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }
}

impl From<Vec<i32>> for Coord {
    fn from(values: Vec<i32>) -> Self {
        Self(values)
    }
}

impl std::ops::Index<usize> for Coord {
    type Output = i32;

    fn index(&self, index: usize) -> &i32 {
        &self.0[index]
    }
}

/// Successor ids and edge costs returned from a single expansion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Successors {
    pub ids: Vec<StateId>,
    pub costs: Vec<Cost>,
}

impl Successors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: StateId, cost: Cost) {
        self.ids.push(id);
        self.costs.push(cost);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateId, Cost)> + '_ {
        self.ids.iter().copied().zip(self.costs.iter().copied())
    }

    /// Collapse duplicate ids onto their cheapest edge, keeping first-seen order
    pub fn dedup_min_cost(&mut self) {
        let mut ids: Vec<StateId> = Vec::with_capacity(self.ids.len());
        let mut costs: Vec<Cost> = Vec::with_capacity(self.costs.len());
        for (id, cost) in self.iter() {
            match ids.iter().position(|&seen| seen == id) {
                Some(pos) => costs[pos] = costs[pos].min(cost),
                None => {
                    ids.push(id);
                    costs.push(cost);
                }
            }
        }
        self.ids = ids;
        self.costs = costs;
    }
}

/// Workspace pose of a robot link
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self { position, orientation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }

    pub fn from_xyz_rpy(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            orientation: angles::quaternion_from_euler_zyx(yaw, pitch, roll),
        }
    }

    /// Roll, pitch, yaw
    pub fn rpy(&self) -> (f64, f64, f64) {
        let (yaw, pitch, roll) = angles::get_euler_zyx_from_quaternion(&self.orientation);
        (roll, pitch, yaw)
    }

    pub fn yaw(&self) -> f64 {
        self.rpy().2
    }

    /// Euclidean distance between positions
    pub fn distance(&self, other: &Pose) -> f64 {
        (self.position - other.position).norm()
    }

    /// Rotation angle between orientations
    pub fn angular_distance(&self, other: &Pose) -> f64 {
        self.orientation.angle_to(&other.orientation)
    }
}

/// Goal condition for a planning episode
#[derive(Debug, Clone, PartialEq)]
pub enum GoalConstraint {
    /// Reach a joint configuration within per-joint tolerances
    JointState {
        state: RobotState,
        tolerance: Vec<f64>,
    },
    /// Reach a link pose within position and orientation tolerances
    Pose {
        pose: Pose,
        xyz_tolerance: [f64; 3],
        rpy_tolerance: [f64; 3],
    },
}

/// Axis-aligned box obstacle in world coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub center: Vector3<f64>,
    pub size: Vector3<f64>,
}

impl Obstacle {
    pub fn cube(center: Vector3<f64>, size: Vector3<f64>) -> Self {
        Self { center, size }
    }
}

/// Named representation produced by a collision collaborator for display
#[derive(Debug, Clone, PartialEq)]
pub enum Visualization {
    /// Closed line strip around the world bounds
    Bounds(Vec<Vector3<f64>>),
    /// Centres of cells whose distance lies within a band, with that distance
    DistanceField(Vec<(Vector3<f64>, f64)>),
}

/// Euclidean distance between two joint vectors
pub fn joint_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_coord_hash_is_structural() {
        let mut table = HashMap::new();
        table.insert(Coord::new(vec![1, -2, 3]), 7usize);
        let probe = Coord::from(vec![1, -2, 3]);
        assert_eq!(table.get(&probe), Some(&7));
        assert_eq!(table.get(&Coord::new(vec![1, -2, 4])), None);
    }

    #[test]
    fn test_successors_dedup_min_cost() {
        let mut succs = Successors::new();
        succs.push(3, 100);
        succs.push(5, 20);
        succs.push(3, 10);
        succs.dedup_min_cost();
        assert_eq!(succs.ids, vec![3, 5]);
        assert_eq!(succs.costs, vec![10, 20]);
    }

    #[test]
    fn test_pose_rpy_roundtrip() {
        let pose = Pose::from_xyz_rpy(1.0, 2.0, 3.0, 0.1, -0.2, 0.3);
        let (r, p, y) = pose.rpy();
        assert!((r - 0.1).abs() < 1e-9);
        assert!((p + 0.2).abs() < 1e-9);
        assert!((y - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_joint_distance() {
        assert!((joint_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-12);
    }
}
