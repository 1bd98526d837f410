//! Action spaces
//!
//! An action space proposes candidate motions from a continuous state. It
//! knows nothing about discretization or collision checking; the lattice
//! hands it a borrowed [`PlanningContext`] for each call.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, trace, Span};

use crate::common::{
    joint_distance, GoalConstraint, IkOption, LatticeError, LatticeResult, Pose, RobotModel,
    RobotState,
};
use crate::utils::angles::normalize_angle;

use super::motion_primitive::{
    load_primitive_file, AdaptiveSetting, MotionPrimitive, MotionPrimitiveType, PrimitiveSet,
};

/// Type tag of a generated action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    ShortDistance,
    LongDistance,
    /// Snap to the goal position
    SnapToXyz,
    /// Snap to the goal orientation
    SnapToRpy,
    /// Snap to the full goal pose
    SnapToXyzRpy,
    /// Jump straight to a joint-space goal
    Adaptive,
}

/// Parameters of the primitive an action came from
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveParams {
    /// Fixed joint deltas, one per waypoint
    Deltas(Vec<RobotState>),
    /// Target-relative motion with its activation threshold
    SnapTarget { target: Pose, threshold: f64 },
    /// Joint-space goal with its activation threshold
    GoalState { target: RobotState, threshold: f64 },
}

/// A candidate motion: waypoints after the parent state, ending at the successor
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionType,
    pub waypoints: Vec<RobotState>,
    pub params: PrimitiveParams,
}

impl Action {
    pub fn last_state(&self) -> Option<&RobotState> {
        self.waypoints.last()
    }
}

/// Read-only view of the planning space an action space works against
#[derive(Clone, Copy)]
pub struct PlanningContext<'a> {
    pub robot: &'a dyn RobotModel,
    pub start: Option<&'a [f64]>,
    pub goal: Option<&'a GoalConstraint>,
}

impl<'a> PlanningContext<'a> {
    /// Workspace distance to a pose goal, joint distance to a joint goal
    pub fn goal_distance(&self, state: &[f64]) -> Option<f64> {
        match self.goal? {
            GoalConstraint::JointState { state: goal, .. } => Some(joint_distance(state, goal)),
            GoalConstraint::Pose { pose, .. } => {
                let fk = self.robot.as_forward_kinematics()?;
                fk.compute_fk(state).map(|p| p.distance(pose))
            }
        }
    }

    /// Distance to the start, measured like [`Self::goal_distance`]
    pub fn start_distance(&self, state: &[f64]) -> Option<f64> {
        let start = self.start?;
        match self.goal {
            Some(GoalConstraint::Pose { .. }) => {
                let fk = self.robot.as_forward_kinematics()?;
                let a = fk.compute_fk(state)?;
                let b = fk.compute_fk(start)?;
                Some(a.distance(&b))
            }
            _ => Some(joint_distance(state, start)),
        }
    }
}

/// Proposes candidate actions from a state
pub trait ActionSpace {
    /// Deterministic for a given state, context and loaded primitive set
    fn apply(&self, parent: &[f64], context: &PlanningContext<'_>) -> Vec<Action>;

    /// Verify the action space was built for these planning variables
    fn check_joints(&self, _joint_names: &[String]) -> LatticeResult<()> {
        Ok(())
    }
}

/// Configuration for [`ManipLatticeActionSpace`]
#[derive(Debug, Clone, Default)]
pub struct ActionSpaceConfig {
    /// Fire long and short primitives everywhere, ignoring short-distance adaptivity
    pub use_long_and_short_prims: bool,
}

/// Primitive-driven action space for joint-space lattices
pub struct ManipLatticeActionSpace {
    joint_names: Vec<String>,
    primitives: Vec<MotionPrimitive>,
    adaptive: HashMap<MotionPrimitiveType, AdaptiveSetting>,
    config: ActionSpaceConfig,
    span: Span,
}

impl ManipLatticeActionSpace {
    pub fn new(joint_names: Vec<String>, config: ActionSpaceConfig) -> Self {
        Self {
            joint_names,
            primitives: Vec::new(),
            adaptive: HashMap::new(),
            config,
            span: tracing::debug_span!("action_space"),
        }
    }

    pub fn from_primitive_set(joint_names: Vec<String>, set: PrimitiveSet, config: ActionSpaceConfig) -> Self {
        let mut aspace = Self::new(joint_names, config);
        aspace.primitives = set.primitives;
        aspace.adaptive = set.adaptive;
        aspace
    }

    /// Load a primitive file for the given discretized joints
    pub fn load<P: AsRef<Path>>(path: P, joint_names: Vec<String>, config: ActionSpaceConfig) -> LatticeResult<Self> {
        let set = load_primitive_file(path.as_ref(), &joint_names)?;
        debug!(
            path = %path.as_ref().display(),
            count = set.primitives.len(),
            "loaded motion primitives"
        );
        Ok(Self::from_primitive_set(joint_names, set, config))
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Add a fixed-delta primitive
    pub fn add_motion_prim(&mut self, deltas: Vec<RobotState>, long_distance: bool) -> LatticeResult<()> {
        if deltas.is_empty() || deltas.iter().any(|d| d.len() != self.joint_names.len()) {
            return Err(LatticeError::Config(format!(
                "primitive waypoints must have {} variables",
                self.joint_names.len()
            )));
        }
        let kind = if long_distance {
            MotionPrimitiveType::LongDistance
        } else {
            MotionPrimitiveType::ShortDistance
        };
        self.primitives.push(MotionPrimitive { kind, action: deltas });
        Ok(())
    }

    /// Add a snap primitive with its activation setting
    pub fn add_snap_prim(&mut self, kind: MotionPrimitiveType, enabled: bool, thresh: f64) {
        if kind.is_snap() && !self.primitives.iter().any(|p| p.kind == kind) {
            self.primitives.push(MotionPrimitive { kind, action: Vec::new() });
        }
        self.adaptive.insert(kind, AdaptiveSetting { enabled, thresh });
    }

    pub fn primitives(&self) -> &[MotionPrimitive] {
        &self.primitives
    }

    pub fn use_amp(&self, kind: MotionPrimitiveType) -> bool {
        self.adaptive.get(&kind).map(|s| s.enabled).unwrap_or(false)
    }

    pub fn amp_thresh(&self, kind: MotionPrimitiveType) -> f64 {
        self.adaptive.get(&kind).copied().unwrap_or_default().thresh
    }

    pub fn set_use_amp(&mut self, kind: MotionPrimitiveType, enabled: bool) {
        self.adaptive.entry(kind).or_default().enabled = enabled;
    }

    pub fn set_amp_thresh(&mut self, kind: MotionPrimitiveType, thresh: f64) {
        self.adaptive.entry(kind).or_default().thresh = thresh;
    }

    fn mprim_active(&self, start_dist: Option<f64>, goal_dist: Option<f64>, kind: MotionPrimitiveType) -> bool {
        let short = self.adaptive.get(&MotionPrimitiveType::ShortDistance).copied().unwrap_or_default();
        let adaptive_distance = short.enabled && !self.config.use_long_and_short_prims;
        let near_endpoint = goal_dist.map_or(false, |d| d <= short.thresh)
            || start_dist.map_or(false, |d| d <= short.thresh);
        match kind {
            MotionPrimitiveType::ShortDistance => !adaptive_distance || near_endpoint,
            MotionPrimitiveType::LongDistance => !adaptive_distance || !near_endpoint,
            _ => {
                let setting = self.adaptive.get(&kind).copied().unwrap_or_default();
                setting.enabled && goal_dist.map_or(false, |d| d <= setting.thresh)
            }
        }
    }

    fn normalize(robot: &dyn RobotModel, mut state: RobotState) -> RobotState {
        for (i, q) in state.iter_mut().enumerate() {
            if robot.is_continuous(i) {
                *q = normalize_angle(*q);
            }
        }
        state
    }

    fn apply_motion_primitive(&self, parent: &[f64], prim: &MotionPrimitive, robot: &dyn RobotModel) -> Action {
        let waypoints = prim
            .action
            .iter()
            .map(|delta| {
                let q: RobotState = parent.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
                Self::normalize(robot, q)
            })
            .collect();
        let kind = match prim.kind {
            MotionPrimitiveType::LongDistance => ActionType::LongDistance,
            _ => ActionType::ShortDistance,
        };
        Action {
            kind,
            waypoints,
            params: PrimitiveParams::Deltas(prim.action.clone()),
        }
    }

    fn compute_snap_action(
        &self,
        parent: &[f64],
        kind: MotionPrimitiveType,
        context: &PlanningContext<'_>,
    ) -> Option<Action> {
        let threshold = self.amp_thresh(kind);
        match context.goal? {
            GoalConstraint::JointState { state, .. } => {
                if kind != MotionPrimitiveType::SnapToXyzRpy {
                    return None;
                }
                Some(Action {
                    kind: ActionType::Adaptive,
                    waypoints: vec![Self::normalize(context.robot, state.clone())],
                    params: PrimitiveParams::GoalState {
                        target: state.clone(),
                        threshold,
                    },
                })
            }
            GoalConstraint::Pose { pose, .. } => {
                let ik = context.robot.as_inverse_kinematics()?;
                let (option, action_type) = match kind {
                    MotionPrimitiveType::SnapToRpy => (IkOption::RestrictXyz, ActionType::SnapToRpy),
                    MotionPrimitiveType::SnapToXyz => (IkOption::RestrictRpy, ActionType::SnapToXyz),
                    _ => (IkOption::Unrestricted, ActionType::SnapToXyzRpy),
                };
                let solution = ik.compute_ik(pose, parent, option);
                if solution.is_none() {
                    trace!(primitive = %kind, "snap primitive found no IK solution");
                }
                Some(Action {
                    kind: action_type,
                    waypoints: vec![Self::normalize(context.robot, solution?)],
                    params: PrimitiveParams::SnapTarget {
                        target: *pose,
                        threshold,
                    },
                })
            }
        }
    }
}

impl ActionSpace for ManipLatticeActionSpace {
    fn apply(&self, parent: &[f64], context: &PlanningContext<'_>) -> Vec<Action> {
        let _enter = self.span.enter();
        let goal_dist = context.goal_distance(parent);
        let start_dist = context.start_distance(parent);

        let mut actions = Vec::new();
        for prim in &self.primitives {
            if !self.mprim_active(start_dist, goal_dist, prim.kind) {
                continue;
            }
            if prim.kind.is_snap() {
                if let Some(action) = self.compute_snap_action(parent, prim.kind, context) {
                    actions.push(action);
                }
            } else {
                actions.push(self.apply_motion_primitive(parent, prim, context.robot));
            }
        }
        trace!(count = actions.len(), ?goal_dist, "generated actions");
        actions
    }

    fn check_joints(&self, joint_names: &[String]) -> LatticeResult<()> {
        if self.joint_names.as_slice() != joint_names {
            return Err(LatticeError::Config(format!(
                "action space joints {:?} do not match planning joints {:?}",
                self.joint_names, joint_names
            )));
        }
        Ok(())
    }
}
