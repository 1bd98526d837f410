//! Common traits defining the collaborators a planning space talks to

use nalgebra::Vector3;

use crate::common::types::*;

/// Restriction applied to an inverse kinematics request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IkOption {
    /// Match position and orientation
    Unrestricted,
    /// Keep the seed's position, match orientation only
    RestrictXyz,
    /// Keep the seed's orientation, match position only
    RestrictRpy,
}

/// Joint-level description of a robot
pub trait RobotModel {
    /// Names of the planning variables, in state order
    fn planning_joints(&self) -> &[String];

    fn joint_variable_count(&self) -> usize {
        self.planning_joints().len()
    }

    /// Whether the variable wraps around at 2*pi
    fn is_continuous(&self, index: usize) -> bool;

    fn has_position_bounds(&self, index: usize) -> bool;

    fn min_pos_limit(&self, index: usize) -> f64;

    fn max_pos_limit(&self, index: usize) -> f64;

    /// Check every bounded variable against its limits
    fn check_joint_limits(&self, state: &[f64]) -> bool {
        if state.len() != self.joint_variable_count() {
            return false;
        }
        state.iter().enumerate().all(|(i, &q)| {
            !self.has_position_bounds(i)
                || (q >= self.min_pos_limit(i) && q <= self.max_pos_limit(i))
        })
    }

    /// Forward kinematics capability, if the robot provides one
    fn as_forward_kinematics(&self) -> Option<&dyn ForwardKinematics> {
        None
    }

    /// Inverse kinematics capability, if the robot provides one
    fn as_inverse_kinematics(&self) -> Option<&dyn InverseKinematics> {
        None
    }
}

/// Planning-link pose from joint values
pub trait ForwardKinematics {
    fn compute_fk(&self, state: &[f64]) -> Option<Pose>;
}

/// Joint values reaching a planning-link pose
pub trait InverseKinematics {
    fn compute_ik(&self, pose: &Pose, seed: &[f64], option: IkOption) -> Option<RobotState>;
}

/// Occupancy and motion-validity queries used by a planning space.
///
/// Implementations are synchronous and do not touch planning state. A
/// collaborator with nothing loaded reports every motion as free.
pub trait CollisionChecker {
    /// Whether the motion through `segment` (first element is the origin) is free
    fn is_free(&self, segment: &[RobotState]) -> bool;

    /// Clear all obstacles
    fn reset(&mut self);

    fn add_obstacle(&mut self, region: &Obstacle);

    /// World extents in metres
    fn world_size(&self) -> Vector3<f64>;

    fn resolution(&self) -> f64;

    /// Named representation, or `None` if the kind is not recognised
    fn visualization(&self, _kind: &str) -> Option<Visualization> {
        None
    }
}
