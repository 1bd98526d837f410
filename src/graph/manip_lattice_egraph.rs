//! Lattice augmented with an experience graph
//!
//! Every experience-graph node is discretized into the bound lattice and
//! indexed twice: by its full Coord (snap lookups) and by the discretized
//! pose of that Coord (bridge lookups). Because the pose key is derived from
//! the Coord, two states in the same Coord bin always share a pose bin.
//!
//! Successors of a state are the lattice successors, the experience-graph
//! neighbours of any node in the state's bin, and bridge edges onto nodes in
//! the same pose bin.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, trace, warn, Span};

use crate::common::{
    Coord, Cost, LatticeError, LatticeResult, Pose, RobotState, StateId, Successors,
};
use crate::utils::angles::{normalize_angle_positive, to_radians};

use super::experience_graph::{find_shortest_experience_graph_path, ExperienceGraph, NodeId};
use super::extension::{
    Extension, ExperienceGraphExtension, ExtensionKind, PoseProjectionExtension, RobotPlanningSpace,
};
use super::manip_lattice::ManipLattice;

/// Configuration for [`ManipLatticeEGraph`]
#[derive(Debug, Clone)]
pub struct EGraphConfig {
    /// Position bin size of the pose key [m]
    pub xyz_resolution: f64,
    /// Heading bin size of the pose key [rad]
    pub yaw_resolution: f64,
    /// Cost of a bridge edge onto the experience graph
    pub snap_cost: Cost,
    /// Cost of one experience-graph hop
    pub egraph_edge_cost: Cost,
}

impl Default for EGraphConfig {
    fn default() -> Self {
        Self {
            xyz_resolution: 0.02,
            yaw_resolution: to_radians(5.0),
            snap_cost: 10,
            egraph_edge_cost: 1,
        }
    }
}

/// [`ManipLattice`] bound to an [`ExperienceGraph`]
pub struct ManipLatticeEGraph {
    lattice: ManipLattice,
    egraph: Arc<ExperienceGraph>,
    config: EGraphConfig,

    coord_to_egraph_nodes: HashMap<Coord, Vec<NodeId>>,
    psi_to_egraph_nodes: HashMap<Coord, Vec<NodeId>>,
    egraph_node_to_state: Vec<StateId>,
    state_to_egraph_node: HashMap<StateId, NodeId>,

    span: Span,
}

impl ManipLatticeEGraph {
    pub fn new(lattice: ManipLattice, config: EGraphConfig) -> Self {
        Self {
            lattice,
            egraph: Arc::new(ExperienceGraph::new()),
            config,
            coord_to_egraph_nodes: HashMap::new(),
            psi_to_egraph_nodes: HashMap::new(),
            egraph_node_to_state: Vec::new(),
            state_to_egraph_node: HashMap::new(),
            span: tracing::debug_span!("manip_lattice_egraph"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn lattice(&self) -> &ManipLattice {
        &self.lattice
    }

    pub fn lattice_mut(&mut self) -> &mut ManipLattice {
        &mut self.lattice
    }

    pub fn experience_graph(&self) -> &ExperienceGraph {
        &self.egraph
    }

    /// Shared handle to the loaded graph, for other lattices to reuse
    pub fn shared_experience_graph(&self) -> Arc<ExperienceGraph> {
        Arc::clone(&self.egraph)
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load every demonstration under `path` (a directory or a single file)
    pub fn load_experience_graph(&mut self, path: &Path) -> LatticeResult<()> {
        let _span = self.span.clone().entered();
        let files = demonstration_files(path)?;
        let joints = self.lattice.robot().planning_joints().to_vec();

        let mut demos = Vec::new();
        for file in &files {
            let text = match fs::read_to_string(file) {
                Ok(text) => text,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "skipping unreadable demonstration");
                    continue;
                }
            };
            match parse_demonstration(&text, &joints) {
                Ok(demo) => demos.push(demo),
                Err(e) => warn!(file = %file.display(), error = %e, "skipping demonstration"),
            }
        }
        if demos.is_empty() {
            return Err(LatticeError::Load(format!(
                "no valid demonstrations under '{}'",
                path.display()
            )));
        }

        let mut egraph = ExperienceGraph::new();
        for demo in &demos {
            self.insert_demonstration(&mut egraph, demo)?;
        }
        info!(
            demonstrations = demos.len(),
            nodes = egraph.num_nodes(),
            edges = egraph.num_edges(),
            "loaded experience graph"
        );
        self.set_experience_graph(Arc::new(egraph));
        Ok(())
    }

    /// Consecutive waypoints in one Coord bin become a single node; the
    /// extras ride along as waypoints of the edge leaving it.
    fn insert_demonstration(&self, egraph: &mut ExperienceGraph, demo: &[RobotState]) -> LatticeResult<()> {
        let mut prev: Option<(NodeId, Coord)> = None;
        let mut pending: Vec<RobotState> = Vec::new();
        for wp in demo {
            let coord = self.lattice.state_to_coord(wp);
            if matches!(&prev, Some((_, prev_coord)) if *prev_coord == coord) {
                pending.push(wp.clone());
                continue;
            }
            let node = egraph.insert_node(wp.clone());
            if let Some((prev_node, _)) = prev {
                egraph.insert_edge(prev_node, node, std::mem::take(&mut pending))?;
            }
            prev = Some((node, coord));
        }
        Ok(())
    }

    /// Bind an already built graph and rebuild the lookup indices
    pub fn set_experience_graph(&mut self, egraph: Arc<ExperienceGraph>) {
        self.coord_to_egraph_nodes.clear();
        self.psi_to_egraph_nodes.clear();
        self.egraph_node_to_state.clear();
        self.state_to_egraph_node.clear();

        for node in egraph.nodes() {
            let state = match egraph.state(node) {
                Some(state) => state,
                None => continue,
            };
            let coord = self.lattice.state_to_coord(state);
            let key = self.pose_key(&coord);
            let state_id = self.lattice.get_or_create_state(coord.clone(), state);

            self.egraph_node_to_state.push(state_id);
            self.state_to_egraph_node.entry(state_id).or_insert(node);
            self.coord_to_egraph_nodes.entry(coord).or_default().push(node);
            self.psi_to_egraph_nodes.entry(key).or_default().push(node);
        }
        debug!(
            parent: &self.span,
            coord_bins = self.coord_to_egraph_nodes.len(),
            pose_bins = self.psi_to_egraph_nodes.len(),
            "indexed experience graph"
        );
        self.egraph = egraph;
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Discretized (x, y, z, yaw) of a Coord's canonical state, or the Coord
    /// itself when the robot has no forward kinematics.
    pub fn pose_key(&self, coord: &Coord) -> Coord {
        let fk = match self.lattice.robot().as_forward_kinematics() {
            Some(fk) => fk,
            None => return coord.clone(),
        };
        let pose = match fk.compute_fk(&self.lattice.coord_to_state(coord)) {
            Some(pose) => pose,
            None => return coord.clone(),
        };
        let res = self.config.xyz_resolution;
        let yaw_bins = ((2.0 * PI / self.config.yaw_resolution).round() as i32).max(1);
        let yaw = ((normalize_angle_positive(pose.yaw()) / self.config.yaw_resolution).round() as i32)
            .rem_euclid(yaw_bins);
        Coord(vec![
            (pose.position.x / res).round() as i32,
            (pose.position.y / res).round() as i32,
            (pose.position.z / res).round() as i32,
            yaw,
        ])
    }

    pub fn get_experience_graph_nodes(&self, state_id: StateId) -> Vec<NodeId> {
        self.lattice
            .coord(state_id)
            .ok()
            .and_then(|coord| self.coord_to_egraph_nodes.get(coord))
            .cloned()
            .unwrap_or_default()
    }

    /// Nodes sharing the state's pose bin
    pub fn get_pose_bin_nodes(&self, state_id: StateId) -> Vec<NodeId> {
        self.lattice
            .coord(state_id)
            .ok()
            .and_then(|coord| self.psi_to_egraph_nodes.get(&self.pose_key(coord)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_state_id(&self, node: NodeId) -> Option<StateId> {
        self.egraph_node_to_state.get(node.0).copied()
    }

    /// First node bound to a state, if any
    pub fn get_egraph_node(&self, state_id: StateId) -> Option<NodeId> {
        self.state_to_egraph_node.get(&state_id).copied()
    }

    // ========================================================================
    // Edges
    // ========================================================================

    fn experience_edge_free(&self, from: NodeId, to: NodeId) -> bool {
        let (a, b) = match (self.egraph.state(from), self.egraph.state(to)) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };
        let mut segment = vec![a.clone()];
        segment.extend(self.egraph.waypoints_between(from, to).unwrap_or_default());
        segment.push(b.clone());
        self.lattice.is_motion_free(&segment)
    }

    /// Lattice successors plus experience and bridge edges
    pub fn get_succs(&mut self, state_id: StateId) -> LatticeResult<Successors> {
        let _span = self.span.clone().entered();
        let mut succs = self.lattice.get_succs(state_id)?;
        let lattice_count = succs.len();

        for node in self.get_experience_graph_nodes(state_id) {
            for adj in self.egraph.adjacent_nodes(node) {
                let succ_id = match self.get_state_id(adj) {
                    Some(id) if id != state_id => id,
                    _ => continue,
                };
                if self.experience_edge_free(node, adj) {
                    succs.push(succ_id, self.config.egraph_edge_cost);
                }
            }
        }
        let experience_count = succs.len() - lattice_count;

        for node in self.get_pose_bin_nodes(state_id) {
            let target = match self.get_state_id(node) {
                Some(id) if id != state_id => id,
                _ => continue,
            };
            if let Some(cost) = self.snap(state_id, target) {
                succs.push(target, cost);
            }
        }

        trace!(
            state_id,
            lattice = lattice_count,
            experience = experience_count,
            bridge = succs.len() - lattice_count - experience_count,
            "expanded state"
        );
        Ok(succs)
    }

    /// Like [`Self::get_succs`] with duplicate targets collapsed onto the cheaper edge
    pub fn get_succs_unique(&mut self, state_id: StateId) -> LatticeResult<Successors> {
        let mut succs = self.get_succs(state_id)?;
        succs.dedup_min_cost();
        Ok(succs)
    }

    /// Cheapest experience-graph route between any nodes bound to the two
    /// states. With `require_free`, routes with a colliding hop are skipped.
    fn shortcut_route(&self, first_id: StateId, second_id: StateId, require_free: bool) -> Option<Vec<NodeId>> {
        let sources = self.get_experience_graph_nodes(first_id);
        let targets = self.get_experience_graph_nodes(second_id);
        let mut best: Option<Vec<NodeId>> = None;
        for &src in &sources {
            for &dst in &targets {
                let route = match find_shortest_experience_graph_path(&self.egraph, src, dst) {
                    Some(route) => route,
                    None => continue,
                };
                if best.as_ref().map_or(false, |b| route.len() >= b.len()) {
                    continue;
                }
                if require_free && !route.windows(2).all(|hop| self.experience_edge_free(hop[0], hop[1])) {
                    trace!(parent: &self.span, first_id, second_id, "experience route in collision");
                    continue;
                }
                best = Some(route);
            }
        }
        best
    }

    /// Free experience edge leading from the state's bin straight to `second_id`,
    /// the same edges [`Self::get_succs`] offers
    fn experience_hop(&self, first_id: StateId, second_id: StateId) -> Option<(NodeId, NodeId)> {
        self.get_experience_graph_nodes(first_id).into_iter().find_map(|node| {
            self.egraph
                .adjacent_nodes(node)
                .find(|&adj| self.get_state_id(adj) == Some(second_id) && self.experience_edge_free(node, adj))
                .map(|adj| (node, adj))
        })
    }

    /// Edge waypoints and end state of one experience hop
    fn hop_waypoints(&self, from: NodeId, to: NodeId) -> Vec<RobotState> {
        let mut waypoints = self.egraph.waypoints_between(from, to).unwrap_or_default();
        if let Some(state) = self.egraph.state(to) {
            waypoints.push(state.clone());
        }
        waypoints
    }

    /// Hop count between two experience states times the per-hop cost
    pub fn shortcut(&self, first_id: StateId, second_id: StateId) -> Option<Cost> {
        let route = self.shortcut_route(first_id, second_id, false)?;
        Some((route.len() as Cost - 1) * self.config.egraph_edge_cost)
    }

    /// Zero within one Coord bin; `snap_cost` onto an experience state in the
    /// same pose bin when the straight joint-space motion is free.
    pub fn snap(&self, first_id: StateId, second_id: StateId) -> Option<Cost> {
        let first_coord = self.lattice.coord(first_id).ok()?;
        let second_coord = self.lattice.coord(second_id).ok()?;
        if first_coord == second_coord {
            return Some(0);
        }
        if !self.state_to_egraph_node.contains_key(&second_id) {
            return None;
        }
        if self.pose_key(first_coord) != self.pose_key(second_coord) {
            return None;
        }
        let a = self.lattice.id_to_state(first_id).ok()?;
        let b = self.lattice.id_to_state(second_id).ok()?;
        if !self.lattice.is_motion_free(&[a.clone(), b.clone()]) {
            trace!(parent: &self.span, first_id, second_id, "snap motion in collision");
            return None;
        }
        Some(self.config.snap_cost)
    }

    /// Continuous waypoints along a path mixing lattice, experience and snap
    /// edges. Each step is resolved in the order [`Self::get_succs`] offers
    /// edges: lattice action, single experience hop, snap, then a
    /// collision-free multi-hop experience route.
    pub fn extract_path(&self, ids: &[StateId]) -> LatticeResult<Vec<RobotState>> {
        let _enter = self.span.enter();
        let first = match ids.first() {
            Some(&id) => id,
            None => return Ok(Vec::new()),
        };
        let mut path = vec![self.lattice.id_to_state(first)?.clone()];
        for (index, pair) in ids.windows(2).enumerate() {
            let (from, to) = (pair[0], pair[1]);
            if from == to {
                continue;
            }
            if let Some((action, _)) = self.lattice.find_action_to(from, to)? {
                path.extend(action.waypoints);
                continue;
            }
            if let Some((node, adj)) = self.experience_hop(from, to) {
                path.extend(self.hop_waypoints(node, adj));
                trace!(index, "resolved experience edge");
                continue;
            }
            if self.snap(from, to).is_some() {
                path.push(self.lattice.id_to_state(to)?.clone());
                trace!(index, "resolved snap edge");
                continue;
            }
            if let Some(route) = self.shortcut_route(from, to, true) {
                for hop in route.windows(2) {
                    path.extend(self.hop_waypoints(hop[0], hop[1]));
                }
                trace!(index, hops = route.len() - 1, "resolved experience route");
                continue;
            }
            return Err(LatticeError::PathInconsistency { index, from, to });
        }
        debug!(states = ids.len(), waypoints = path.len(), "extracted path");
        Ok(path)
    }
}

impl RobotPlanningSpace for ManipLatticeEGraph {
    fn get_succs(&mut self, state_id: StateId) -> LatticeResult<Successors> {
        ManipLatticeEGraph::get_succs(self, state_id)
    }

    fn is_goal(&self, state_id: StateId) -> bool {
        self.lattice.is_goal(state_id)
    }

    fn extract_path(&self, ids: &[StateId]) -> LatticeResult<Vec<RobotState>> {
        ManipLatticeEGraph::extract_path(self, ids)
    }

    fn get_extension(&mut self, kind: ExtensionKind) -> Option<Extension<'_>> {
        match kind {
            ExtensionKind::ExperienceGraph => Some(Extension::ExperienceGraph(self)),
            ExtensionKind::PoseProjection => {
                self.lattice.robot().as_forward_kinematics()?;
                Some(Extension::PoseProjection(&*self))
            }
        }
    }
}

impl ExperienceGraphExtension for ManipLatticeEGraph {
    fn load_experience_graph(&mut self, path: &Path) -> LatticeResult<()> {
        ManipLatticeEGraph::load_experience_graph(self, path)
    }

    fn experience_graph(&self) -> &ExperienceGraph {
        &self.egraph
    }

    fn get_experience_graph_nodes(&self, state_id: StateId) -> Vec<NodeId> {
        ManipLatticeEGraph::get_experience_graph_nodes(self, state_id)
    }

    fn get_state_id(&self, node: NodeId) -> Option<StateId> {
        ManipLatticeEGraph::get_state_id(self, node)
    }

    fn shortcut(&self, first_id: StateId, second_id: StateId) -> Option<Cost> {
        ManipLatticeEGraph::shortcut(self, first_id, second_id)
    }

    fn snap(&self, first_id: StateId, second_id: StateId) -> Option<Cost> {
        ManipLatticeEGraph::snap(self, first_id, second_id)
    }
}

impl PoseProjectionExtension for ManipLatticeEGraph {
    fn project_to_pose(&self, state_id: StateId) -> Option<Pose> {
        self.lattice.project_to_pose(state_id)
    }
}

// ============================================================================
// Demonstration files
// ============================================================================

fn demonstration_files(path: &Path) -> LatticeResult<Vec<PathBuf>> {
    let meta = fs::metadata(path)
        .map_err(|e| LatticeError::Load(format!("cannot read '{}': {}", path.display(), e)))?;
    if meta.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let entries = fs::read_dir(path)
        .map_err(|e| LatticeError::Load(format!("cannot list '{}': {}", path.display(), e)))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

/// One waypoint per line, comma or whitespace separated. An optional first
/// row of joint names maps columns onto the planning joints.
pub fn parse_demonstration(text: &str, joint_names: &[String]) -> LatticeResult<Vec<RobotState>> {
    let mut columns: Option<Vec<usize>> = None;
    let mut waypoints = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields = split_fields(line);
        let values: Option<Vec<f64>> = fields.iter().map(|f| f.parse::<f64>().ok()).collect();
        let values = match values {
            Some(values) => values,
            None if columns.is_none() && waypoints.is_empty() => {
                columns = Some(header_columns(&fields, joint_names)?);
                continue;
            }
            None => {
                return Err(LatticeError::Load(format!("line {}: invalid waypoint '{}'", i + 1, line)));
            }
        };
        if values.len() != joint_names.len() {
            return Err(LatticeError::Load(format!(
                "line {}: expected {} values, found {}",
                i + 1,
                joint_names.len(),
                values.len()
            )));
        }
        let state = match &columns {
            Some(cols) => {
                let mut state = vec![0.0; joint_names.len()];
                for (col, &joint) in cols.iter().enumerate() {
                    state[joint] = values[col];
                }
                state
            }
            None => values,
        };
        waypoints.push(state);
    }

    if waypoints.is_empty() {
        return Err(LatticeError::Load("demonstration has no waypoints".to_string()));
    }
    Ok(waypoints)
}

/// Planning-joint index of every header column
fn header_columns(fields: &[&str], joint_names: &[String]) -> LatticeResult<Vec<usize>> {
    if fields.len() != joint_names.len() {
        return Err(LatticeError::Load(format!(
            "header names {} joints, expected {}",
            fields.len(),
            joint_names.len()
        )));
    }
    let mut cols = Vec::with_capacity(fields.len());
    for field in fields {
        let joint = joint_names
            .iter()
            .position(|j| j == field)
            .ok_or_else(|| LatticeError::Load(format!("unknown joint '{}' in header", field)))?;
        if cols.contains(&joint) {
            return Err(LatticeError::Load(format!("joint '{}' repeated in header", field)));
        }
        cols.push(joint);
    }
    Ok(cols)
}
