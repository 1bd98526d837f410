//! N-link planar arm
//!
//! Revolute joints rotating about z, links laid end to end in the xy plane
//! at a fixed base height. Provides closed-form forward kinematics and a
//! damped least-squares inverse kinematics solver over (x, y, yaw).

use nalgebra::{Matrix3, Matrix3xX, UnitQuaternion, Vector3};

use crate::common::{ForwardKinematics, IkOption, InverseKinematics, Pose, RobotModel, RobotState};
use crate::utils::angles::{normalize_angle, shortest_angle_diff};

/// How a joint variable is bounded
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointKind {
    /// Wraps at 2*pi
    Continuous,
    /// No limits, no wrapping
    Unbounded,
    Bounded { min: f64, max: f64 },
}

/// Configuration for the damped least-squares IK solver
#[derive(Debug, Clone)]
pub struct PlanarIkConfig {
    pub max_iterations: usize,
    /// Damping factor lambda
    pub damping: f64,
    /// Accepted residual norm
    pub tolerance: f64,
}

impl Default for PlanarIkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            damping: 0.05,
            tolerance: 1e-4,
        }
    }
}

/// Planar serial arm
#[derive(Debug, Clone)]
pub struct PlanarArm {
    joint_names: Vec<String>,
    kinds: Vec<JointKind>,
    link_lengths: Vec<f64>,
    base_z: f64,
    ik_config: PlanarIkConfig,
}

impl PlanarArm {
    /// Arm with unbounded joints named `joint_0..joint_{n-1}`
    pub fn new(link_lengths: Vec<f64>) -> Self {
        let names = (0..link_lengths.len()).map(|i| format!("joint_{}", i)).collect();
        Self::with_joint_names(names, link_lengths)
    }

    pub fn with_joint_names(joint_names: Vec<String>, link_lengths: Vec<f64>) -> Self {
        assert_eq!(joint_names.len(), link_lengths.len());
        let kinds = vec![JointKind::Unbounded; link_lengths.len()];
        Self {
            joint_names,
            kinds,
            link_lengths,
            base_z: 0.0,
            ik_config: PlanarIkConfig::default(),
        }
    }

    pub fn with_joint_kind(mut self, index: usize, kind: JointKind) -> Self {
        self.kinds[index] = kind;
        self
    }

    pub fn with_base_height(mut self, z: f64) -> Self {
        self.base_z = z;
        self
    }

    pub fn with_ik_config(mut self, config: PlanarIkConfig) -> Self {
        self.ik_config = config;
        self
    }

    pub fn link_lengths(&self) -> &[f64] {
        &self.link_lengths
    }

    /// Cumulative joint angles, one per link
    fn link_headings(&self, state: &[f64]) -> Vec<f64> {
        state
            .iter()
            .scan(0.0, |acc, &q| {
                *acc += q;
                Some(*acc)
            })
            .collect()
    }

    /// (x, y, yaw) of the arm tip
    pub fn tip(&self, state: &[f64]) -> (f64, f64, f64) {
        let headings = self.link_headings(state);
        let mut x = 0.0;
        let mut y = 0.0;
        for (l, phi) in self.link_lengths.iter().zip(headings.iter()) {
            x += l * phi.cos();
            y += l * phi.sin();
        }
        let yaw = headings.last().copied().unwrap_or(0.0);
        (x, y, normalize_angle(yaw))
    }

    /// Positions of every joint and the tip, base first
    pub fn link_points(&self, state: &[f64]) -> Vec<Vector3<f64>> {
        let headings = self.link_headings(state);
        let mut points = vec![Vector3::new(0.0, 0.0, self.base_z)];
        let mut current = points[0];
        for (l, phi) in self.link_lengths.iter().zip(headings.iter()) {
            current += Vector3::new(l * phi.cos(), l * phi.sin(), 0.0);
            points.push(current);
        }
        points
    }

    fn jacobian(&self, state: &[f64]) -> Matrix3xX<f64> {
        let headings = self.link_headings(state);
        let n = state.len();
        let mut j = Matrix3xX::zeros(n);
        for i in 0..n {
            let mut dx = 0.0;
            let mut dy = 0.0;
            for k in i..n {
                dx -= self.link_lengths[k] * headings[k].sin();
                dy += self.link_lengths[k] * headings[k].cos();
            }
            j[(0, i)] = dx;
            j[(1, i)] = dy;
            j[(2, i)] = 1.0;
        }
        j
    }

    fn clamp_to_limits(&self, state: &mut [f64]) {
        for (q, kind) in state.iter_mut().zip(self.kinds.iter()) {
            match *kind {
                JointKind::Continuous => *q = normalize_angle(*q),
                JointKind::Unbounded => {}
                JointKind::Bounded { min, max } => *q = q.clamp(min, max),
            }
        }
    }
}

impl RobotModel for PlanarArm {
    fn planning_joints(&self) -> &[String] {
        &self.joint_names
    }

    fn is_continuous(&self, index: usize) -> bool {
        matches!(self.kinds[index], JointKind::Continuous)
    }

    fn has_position_bounds(&self, index: usize) -> bool {
        matches!(self.kinds[index], JointKind::Bounded { .. })
    }

    fn min_pos_limit(&self, index: usize) -> f64 {
        match self.kinds[index] {
            JointKind::Bounded { min, .. } => min,
            _ => f64::NEG_INFINITY,
        }
    }

    fn max_pos_limit(&self, index: usize) -> f64 {
        match self.kinds[index] {
            JointKind::Bounded { max, .. } => max,
            _ => f64::INFINITY,
        }
    }

    fn as_forward_kinematics(&self) -> Option<&dyn ForwardKinematics> {
        Some(self)
    }

    fn as_inverse_kinematics(&self) -> Option<&dyn InverseKinematics> {
        Some(self)
    }
}

impl ForwardKinematics for PlanarArm {
    fn compute_fk(&self, state: &[f64]) -> Option<Pose> {
        if state.len() != self.link_lengths.len() {
            return None;
        }
        let (x, y, yaw) = self.tip(state);
        Some(Pose::new(
            Vector3::new(x, y, self.base_z),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw),
        ))
    }
}

impl InverseKinematics for PlanarArm {
    /// Roll, pitch and the z coordinate of `pose` are ignored.
    fn compute_ik(&self, pose: &Pose, seed: &[f64], option: IkOption) -> Option<RobotState> {
        if seed.len() != self.link_lengths.len() {
            return None;
        }
        let (sx, sy, syaw) = self.tip(seed);
        let (tx, ty, tyaw) = match option {
            IkOption::Unrestricted => (pose.position.x, pose.position.y, pose.yaw()),
            IkOption::RestrictXyz => (sx, sy, pose.yaw()),
            IkOption::RestrictRpy => (pose.position.x, pose.position.y, syaw),
        };

        let mut q: RobotState = seed.to_vec();
        let damping_sq = self.ik_config.damping * self.ik_config.damping;
        for _ in 0..self.ik_config.max_iterations {
            let (x, y, yaw) = self.tip(&q);
            let err = Vector3::new(tx - x, ty - y, shortest_angle_diff(tyaw, yaw));
            if err.norm() < self.ik_config.tolerance {
                return if self.check_joint_limits(&q) { Some(q) } else { None };
            }
            let j = self.jacobian(&q);
            let jjt = &j * j.transpose() + Matrix3::identity() * damping_sq;
            let inv = jjt.try_inverse()?;
            let dq = j.transpose() * (inv * err);
            for (qi, dqi) in q.iter_mut().zip(dq.iter()) {
                *qi += dqi;
            }
            self.clamp_to_limits(&mut q);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_forward_kinematics_straight() {
        let arm = PlanarArm::new(vec![1.0, 1.0]);
        let pose = arm.compute_fk(&[0.0, 0.0]).unwrap();
        assert!((pose.position.x - 2.0).abs() < 1e-12);
        assert!(pose.position.y.abs() < 1e-12);
        assert!(pose.yaw().abs() < 1e-12);
    }

    #[test]
    fn test_forward_kinematics_bent() {
        let arm = PlanarArm::new(vec![1.0, 1.0]);
        let (x, y, yaw) = arm.tip(&[PI / 2.0, -PI / 2.0]);
        assert!((x - 1.0).abs() < 1e-12);
        assert!((y - 1.0).abs() < 1e-12);
        assert!(yaw.abs() < 1e-12);
        assert_eq!(arm.link_points(&[0.0, 0.0]).len(), 3);
    }

    #[test]
    fn test_inverse_kinematics_unrestricted() {
        let arm = PlanarArm::new(vec![1.0, 1.0, 0.5]);
        let target_state = [0.4, 0.3, -0.2];
        let target = arm.compute_fk(&target_state).unwrap();
        let solution = arm
            .compute_ik(&target, &[0.3, 0.2, 0.0], IkOption::Unrestricted)
            .expect("reachable target");
        let reached = arm.compute_fk(&solution).unwrap();
        assert!(reached.distance(&target) < 1e-3);
        assert!(shortest_angle_diff(reached.yaw(), target.yaw()).abs() < 1e-3);
    }

    #[test]
    fn test_inverse_kinematics_restrict_xyz_keeps_position() {
        let arm = PlanarArm::new(vec![1.0, 1.0, 0.5]);
        let seed = [0.2, 0.4, 0.1];
        let start = arm.compute_fk(&seed).unwrap();
        let goal = Pose::from_xyz_rpy(5.0, 5.0, 0.0, 0.0, 0.0, start.yaw() + 0.2);
        let solution = arm
            .compute_ik(&goal, &seed, IkOption::RestrictXyz)
            .expect("orientation change is reachable");
        let reached = arm.compute_fk(&solution).unwrap();
        assert!(reached.distance(&start) < 1e-3);
        assert!(shortest_angle_diff(reached.yaw(), goal.yaw()).abs() < 1e-3);
    }

    #[test]
    fn test_inverse_kinematics_unreachable() {
        let arm = PlanarArm::new(vec![1.0, 1.0]);
        let far = Pose::from_xyz_rpy(10.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert!(arm.compute_ik(&far, &[0.0, 0.1], IkOption::RestrictRpy).is_none());
    }

    #[test]
    fn test_joint_kinds() {
        let arm = PlanarArm::new(vec![1.0, 1.0])
            .with_joint_kind(0, JointKind::Continuous)
            .with_joint_kind(1, JointKind::Bounded { min: -1.0, max: 1.0 });
        assert!(arm.is_continuous(0));
        assert!(!arm.has_position_bounds(0));
        assert!(arm.has_position_bounds(1));
        assert!(arm.check_joint_limits(&[5.0, 0.5]));
        assert!(!arm.check_joint_limits(&[0.0, 1.5]));
    }
}
