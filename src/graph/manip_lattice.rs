//! Joint-space state lattice
//!
//! Owns the StateId <-> Coord table. Ids are allocated append-only from an
//! arena of [`LatticeState`] records with a side map from Coord to id, and
//! successor generation runs every action proposed by the bound
//! [`ActionSpace`] through the joint limits and the collision checker.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use tracing::{debug, trace, Span};

use crate::common::{
    CollisionChecker, Coord, Cost, GoalConstraint, LatticeError, LatticeResult, Pose, RobotModel,
    RobotState, StateId, Successors,
};
use crate::utils::angles::{normalize_angle_positive, shortest_angle_diff, shortest_angle_dist};

use super::action_space::{Action, ActionSpace, PlanningContext};
use super::extension::{Extension, ExtensionKind, PoseProjectionExtension, RobotPlanningSpace};

/// Edge cost metric applied to an action's waypoints
#[derive(Debug, Clone, PartialEq)]
pub enum ActionCost {
    /// Same cost for every action
    Uniform(Cost),
    /// Weighted joint-space length of the motion, times `scale`.
    /// An empty weight vector weights every joint by 1.
    WeightedJointDistance { weights: Vec<f64>, scale: f64 },
}

impl Default for ActionCost {
    fn default() -> Self {
        ActionCost::WeightedJointDistance {
            weights: Vec::new(),
            scale: 1000.0,
        }
    }
}

/// Configuration for [`ManipLattice`]
#[derive(Debug, Clone, Default)]
pub struct ManipLatticeConfig {
    pub cost: ActionCost,
}

/// One allocated lattice vertex
#[derive(Debug, Clone)]
pub struct LatticeState {
    pub coord: Coord,
    /// Representative continuous state, the first one discretized into `coord`
    pub state: RobotState,
}

/// Joint-space lattice over a robot model
pub struct ManipLattice {
    robot: Arc<dyn RobotModel>,
    checker: Box<dyn CollisionChecker>,
    action_space: Option<Box<dyn ActionSpace>>,
    config: ManipLatticeConfig,

    resolutions: Vec<f64>,
    /// Number of bins per continuous joint, 0 for the others
    coord_vals: Vec<i32>,

    states: Vec<LatticeState>,
    coord_to_id: HashMap<Coord, StateId>,

    start: Option<RobotState>,
    start_id: Option<StateId>,
    goal: Option<GoalConstraint>,

    expanded: bool,
    span: Span,
}

impl ManipLattice {
    /// Build a lattice with one resolution per planning joint
    pub fn new(
        robot: Arc<dyn RobotModel>,
        checker: Box<dyn CollisionChecker>,
        resolutions: Vec<f64>,
        config: ManipLatticeConfig,
    ) -> LatticeResult<Self> {
        let joints = robot.planning_joints();
        if resolutions.len() != joints.len() {
            return Err(LatticeError::Config(format!(
                "expected {} resolutions, got {}",
                joints.len(),
                resolutions.len()
            )));
        }
        for (name, &res) in joints.iter().zip(resolutions.iter()) {
            if !(res.is_finite() && res > 0.0) {
                return Err(LatticeError::Config(format!(
                    "resolution for joint '{}' must be positive, got {}",
                    name, res
                )));
            }
        }
        match &config.cost {
            ActionCost::Uniform(cost) if *cost < 1 => {
                return Err(LatticeError::Config(format!("uniform action cost must be at least 1, got {}", cost)));
            }
            ActionCost::WeightedJointDistance { weights, scale } => {
                if !weights.is_empty() && weights.len() != joints.len() {
                    return Err(LatticeError::Config(format!(
                        "expected {} cost weights, got {}",
                        joints.len(),
                        weights.len()
                    )));
                }
                if !(scale.is_finite() && *scale > 0.0) || weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
                    return Err(LatticeError::Config("cost weights and scale must be non-negative and finite".to_string()));
                }
            }
            ActionCost::Uniform(_) => {}
        }

        let coord_vals = resolutions
            .iter()
            .enumerate()
            .map(|(i, &res)| {
                if robot.is_continuous(i) {
                    (2.0 * PI / res).round() as i32
                } else {
                    0
                }
            })
            .collect();

        let span = tracing::debug_span!("manip_lattice");
        debug!(parent: &span, joints = ?joints, ?resolutions, "lattice ready");

        Ok(Self {
            robot,
            checker,
            action_space: None,
            config,
            resolutions,
            coord_vals,
            states: Vec::new(),
            coord_to_id: HashMap::new(),
            start: None,
            start_id: None,
            goal: None,
            expanded: false,
            span,
        })
    }

    /// Build a lattice from a joint name to resolution map
    pub fn from_discretization(
        robot: Arc<dyn RobotModel>,
        checker: Box<dyn CollisionChecker>,
        discretization: &HashMap<String, f64>,
        config: ManipLatticeConfig,
    ) -> LatticeResult<Self> {
        let resolutions = robot
            .planning_joints()
            .iter()
            .map(|name| {
                discretization.get(name).copied().ok_or_else(|| {
                    LatticeError::Config(format!("missing discretization for joint '{}'", name))
                })
            })
            .collect::<LatticeResult<Vec<f64>>>()?;
        Self::new(robot, checker, resolutions, config)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn robot(&self) -> &dyn RobotModel {
        self.robot.as_ref()
    }

    pub fn resolutions(&self) -> &[f64] {
        &self.resolutions
    }

    pub fn collision_checker(&self) -> &dyn CollisionChecker {
        self.checker.as_ref()
    }

    /// Obstacle updates belong between planning episodes
    pub fn collision_checker_mut(&mut self) -> &mut dyn CollisionChecker {
        self.checker.as_mut()
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    // ========================================================================
    // Discretization
    // ========================================================================

    pub fn state_to_coord(&self, state: &[f64]) -> Coord {
        debug_assert_eq!(state.len(), self.resolutions.len(), "state length does not match the lattice");
        let values = state
            .iter()
            .zip(self.resolutions.iter())
            .enumerate()
            .map(|(i, (&q, &res))| {
                if self.robot.is_continuous(i) {
                    let c = ((normalize_angle_positive(q) + res * 0.5) / res) as i32;
                    if c >= self.coord_vals[i] {
                        0
                    } else {
                        c
                    }
                } else if !self.robot.has_position_bounds(i) {
                    if q >= 0.0 {
                        (q / res + 0.5) as i32
                    } else {
                        (q / res - 0.5) as i32
                    }
                } else {
                    ((q - self.robot.min_pos_limit(i)) / res + 0.5) as i32
                }
            })
            .collect();
        Coord(values)
    }

    /// Canonical continuous value of each bin
    pub fn coord_to_state(&self, coord: &Coord) -> RobotState {
        debug_assert_eq!(coord.len(), self.resolutions.len(), "coord length does not match the lattice");
        coord
            .as_slice()
            .iter()
            .zip(self.resolutions.iter())
            .enumerate()
            .map(|(i, (&c, &res))| {
                if self.robot.has_position_bounds(i) && !self.robot.is_continuous(i) {
                    self.robot.min_pos_limit(i) + c as f64 * res
                } else {
                    c as f64 * res
                }
            })
            .collect()
    }

    // ========================================================================
    // State table
    // ========================================================================

    /// Id of the state's bin, allocating it on first sight
    pub fn state_to_id(&mut self, state: &[f64]) -> StateId {
        let coord = self.state_to_coord(state);
        self.get_or_create_state(coord, state)
    }

    pub fn get_or_create_state(&mut self, coord: Coord, state: &[f64]) -> StateId {
        if let Some(&id) = self.coord_to_id.get(&coord) {
            return id;
        }
        let id = self.states.len();
        trace!(parent: &self.span, id, coord = ?coord.as_slice(), "allocated state");
        self.coord_to_id.insert(coord.clone(), id);
        self.states.push(LatticeState {
            coord,
            state: state.to_vec(),
        });
        id
    }

    /// Id of an already allocated bin
    pub fn get_state_id(&self, coord: &Coord) -> Option<StateId> {
        self.coord_to_id.get(coord).copied()
    }

    pub fn id_to_state(&self, state_id: StateId) -> LatticeResult<&RobotState> {
        self.states
            .get(state_id)
            .map(|s| &s.state)
            .ok_or_else(|| LatticeError::unknown_state(state_id))
    }

    pub fn coord(&self, state_id: StateId) -> LatticeResult<&Coord> {
        self.states
            .get(state_id)
            .map(|s| &s.coord)
            .ok_or_else(|| LatticeError::unknown_state(state_id))
    }

    // ========================================================================
    // Start / goal
    // ========================================================================

    pub fn set_start(&mut self, state: &[f64]) -> LatticeResult<StateId> {
        if state.len() != self.robot.joint_variable_count() {
            return Err(LatticeError::Config(format!(
                "start state has {} variables, expected {}",
                state.len(),
                self.robot.joint_variable_count()
            )));
        }
        if !self.robot.check_joint_limits(state) {
            return Err(LatticeError::Config("start state violates joint limits".to_string()));
        }
        let id = self.state_to_id(state);
        self.start = Some(state.to_vec());
        self.start_id = Some(id);
        debug!(parent: &self.span, id, ?state, "set start");
        Ok(id)
    }

    pub fn start_id(&self) -> Option<StateId> {
        self.start_id
    }

    pub fn set_goal(&mut self, goal: GoalConstraint) -> LatticeResult<()> {
        let n = self.robot.joint_variable_count();
        match &goal {
            GoalConstraint::JointState { state, tolerance } => {
                if state.len() != n || tolerance.len() != n {
                    return Err(LatticeError::Config(format!(
                        "joint goal must have {} values and tolerances",
                        n
                    )));
                }
            }
            GoalConstraint::Pose { .. } => {
                if self.robot.as_forward_kinematics().is_none() {
                    return Err(LatticeError::Config(
                        "pose goal requires forward kinematics".to_string(),
                    ));
                }
            }
        }
        debug!(parent: &self.span, ?goal, "set goal");
        self.goal = Some(goal);
        Ok(())
    }

    pub fn goal(&self) -> Option<&GoalConstraint> {
        self.goal.as_ref()
    }

    pub fn is_goal(&self, state_id: StateId) -> bool {
        match self.states.get(state_id) {
            Some(s) => self.is_goal_state(&s.state),
            None => false,
        }
    }

    pub fn is_goal_state(&self, state: &[f64]) -> bool {
        match &self.goal {
            None => false,
            Some(GoalConstraint::JointState { state: goal, tolerance }) => state
                .iter()
                .zip(goal.iter())
                .zip(tolerance.iter())
                .enumerate()
                .all(|(i, ((&q, &g), &tol))| {
                    let diff = if self.robot.is_continuous(i) {
                        shortest_angle_dist(q, g)
                    } else {
                        (q - g).abs()
                    };
                    diff <= tol
                }),
            Some(GoalConstraint::Pose {
                pose,
                xyz_tolerance,
                rpy_tolerance,
            }) => {
                let reached = match self
                    .robot
                    .as_forward_kinematics()
                    .and_then(|fk| fk.compute_fk(state))
                {
                    Some(p) => p,
                    None => return false,
                };
                let dp = reached.position - pose.position;
                let (r0, p0, y0) = reached.rpy();
                let (r1, p1, y1) = pose.rpy();
                dp.x.abs() <= xyz_tolerance[0]
                    && dp.y.abs() <= xyz_tolerance[1]
                    && dp.z.abs() <= xyz_tolerance[2]
                    && shortest_angle_dist(r0, r1) <= rpy_tolerance[0]
                    && shortest_angle_dist(p0, p1) <= rpy_tolerance[1]
                    && shortest_angle_dist(y0, y1) <= rpy_tolerance[2]
            }
        }
    }

    /// Planning-link pose of a state, if the robot has forward kinematics
    pub fn project_to_pose(&self, state_id: StateId) -> Option<Pose> {
        let state = &self.states.get(state_id)?.state;
        self.robot.as_forward_kinematics()?.compute_fk(state)
    }

    /// Borrowed view handed to the action space
    pub fn planning_context(&self) -> PlanningContext<'_> {
        PlanningContext {
            robot: self.robot.as_ref(),
            start: self.start.as_deref(),
            goal: self.goal.as_ref(),
        }
    }

    // ========================================================================
    // Actions and successors
    // ========================================================================

    /// Bind the action space; refused once successors have been generated
    pub fn set_action_space(&mut self, action_space: Box<dyn ActionSpace>) -> LatticeResult<()> {
        if self.expanded {
            return Err(LatticeError::Config(
                "cannot replace the action space after successor generation started".to_string(),
            ));
        }
        action_space.check_joints(self.robot.planning_joints())?;
        self.action_space = Some(action_space);
        Ok(())
    }

    pub fn action_space(&self) -> Option<&dyn ActionSpace> {
        self.action_space.as_deref()
    }

    fn actions_from(&self, state: &[f64]) -> LatticeResult<Vec<Action>> {
        let aspace = self
            .action_space
            .as_ref()
            .ok_or_else(|| LatticeError::Config("no action space bound".to_string()))?;
        Ok(aspace.apply(state, &self.planning_context()))
    }

    pub fn is_motion_free(&self, segment: &[RobotState]) -> bool {
        self.checker.is_free(segment)
    }

    /// Cost of moving from `parent` through `waypoints`
    pub fn action_cost(&self, parent: &[f64], waypoints: &[RobotState]) -> Cost {
        match &self.config.cost {
            ActionCost::Uniform(cost) => *cost,
            ActionCost::WeightedJointDistance { weights, scale } => {
                let mut length = 0.0;
                let mut prev = parent;
                for wp in waypoints {
                    let sq: f64 = prev
                        .iter()
                        .zip(wp.iter())
                        .enumerate()
                        .map(|(i, (&a, &b))| {
                            let d = if self.robot.is_continuous(i) {
                                shortest_angle_diff(b, a)
                            } else {
                                b - a
                            };
                            let w = weights.get(i).copied().unwrap_or(1.0);
                            w * d * d
                        })
                        .sum();
                    length += sq.sqrt();
                    prev = wp;
                }
                ((length * scale).round() as Cost).max(1)
            }
        }
    }

    /// Valid end coordinate of an action, or `None` if it must be dropped
    fn check_action(&self, parent: &[f64], parent_coord: &Coord, action: &Action) -> Option<Coord> {
        let last = action.last_state()?;
        if !action.waypoints.iter().all(|wp| self.robot.check_joint_limits(wp)) {
            trace!(parent: &self.span, kind = ?action.kind, "action violates joint limits");
            return None;
        }
        let coord = self.state_to_coord(last);
        if &coord == parent_coord {
            trace!(parent: &self.span, kind = ?action.kind, "action does not leave its bin");
            return None;
        }
        let mut segment = Vec::with_capacity(action.waypoints.len() + 1);
        segment.push(parent.to_vec());
        segment.extend(action.waypoints.iter().cloned());
        if !self.checker.is_free(&segment) {
            trace!(parent: &self.span, kind = ?action.kind, "action in collision");
            return None;
        }
        Some(coord)
    }

    /// Successors of a state and their edge costs
    pub fn get_succs(&mut self, state_id: StateId) -> LatticeResult<Successors> {
        let _span = self.span.clone().entered();
        let parent = self.id_to_state(state_id)?.clone();
        let parent_coord = self.coord(state_id)?.clone();
        let actions = self.actions_from(&parent)?;
        self.expanded = true;

        let mut succs = Successors::new();
        for action in &actions {
            let coord = match self.check_action(&parent, &parent_coord, action) {
                Some(coord) => coord,
                None => continue,
            };
            let cost = self.action_cost(&parent, &action.waypoints);
            let last = action.waypoints.last().map(|s| s.as_slice()).unwrap_or(&[]);
            let succ_id = self.get_or_create_state(coord, last);
            succs.push(succ_id, cost);
        }
        trace!(state_id, count = succs.len(), "expanded state");
        Ok(succs)
    }

    /// Cheapest valid action leading from one allocated state into another
    pub fn find_action_to(&self, from: StateId, to: StateId) -> LatticeResult<Option<(Action, Cost)>> {
        let parent = self.id_to_state(from)?;
        let parent_coord = self.coord(from)?;
        let target = self.coord(to)?;
        let mut best: Option<(Action, Cost)> = None;
        for action in self.actions_from(parent)? {
            match self.check_action(parent, parent_coord, &action) {
                Some(coord) if &coord == target => {}
                _ => continue,
            }
            let cost = self.action_cost(parent, &action.waypoints);
            if best.as_ref().map_or(true, |(_, c)| cost < *c) {
                best = Some((action, cost));
            }
        }
        Ok(best)
    }

    /// Continuous waypoints along a path of lattice actions
    pub fn extract_path(&self, ids: &[StateId]) -> LatticeResult<Vec<RobotState>> {
        let _enter = self.span.enter();
        let first = match ids.first() {
            Some(&id) => id,
            None => return Ok(Vec::new()),
        };
        let mut path = vec![self.id_to_state(first)?.clone()];
        for (index, pair) in ids.windows(2).enumerate() {
            let (from, to) = (pair[0], pair[1]);
            match self.find_action_to(from, to)? {
                Some((action, _)) => path.extend(action.waypoints),
                None => return Err(LatticeError::PathInconsistency { index, from, to }),
            }
        }
        debug!(states = ids.len(), waypoints = path.len(), "extracted path");
        Ok(path)
    }
}

impl RobotPlanningSpace for ManipLattice {
    fn get_succs(&mut self, state_id: StateId) -> LatticeResult<Successors> {
        ManipLattice::get_succs(self, state_id)
    }

    fn is_goal(&self, state_id: StateId) -> bool {
        ManipLattice::is_goal(self, state_id)
    }

    fn extract_path(&self, ids: &[StateId]) -> LatticeResult<Vec<RobotState>> {
        ManipLattice::extract_path(self, ids)
    }

    fn get_extension(&mut self, kind: ExtensionKind) -> Option<Extension<'_>> {
        match kind {
            ExtensionKind::PoseProjection => {
                self.robot.as_forward_kinematics()?;
                Some(Extension::PoseProjection(&*self))
            }
            ExtensionKind::ExperienceGraph => None,
        }
    }
}

impl PoseProjectionExtension for ManipLattice {
    fn project_to_pose(&self, state_id: StateId) -> Option<Pose> {
        ManipLattice::project_to_pose(self, state_id)
    }
}
