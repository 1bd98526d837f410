use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;

use manip_lattice::collision::{GridCollisionChecker, GridCollisionCheckerConfig, OccupancyGrid};
use manip_lattice::common::{ForwardKinematics, Obstacle, Visualization};
use manip_lattice::graph::{
    ActionSpaceConfig, EGraphConfig, ExperienceGraph, ExtensionKind, ManipLattice,
    ManipLatticeActionSpace, ManipLatticeAllocator, ManipLatticeConfig, ManipLatticeEGraph,
    NodeId, PlanningParams, RobotPlanningSpace,
};
use manip_lattice::robot::PlanarArm;
use manip_lattice::{CollisionChecker, Coord, LatticeError, Pose, RobotModel, RobotState};

/// Prismatic x joint plus a joint the planning link does not depend on
struct Gantry {
    joints: Vec<String>,
}

impl Gantry {
    fn new() -> Self {
        Self {
            joints: vec!["x".to_string(), "free".to_string()],
        }
    }
}

impl RobotModel for Gantry {
    fn planning_joints(&self) -> &[String] {
        &self.joints
    }

    fn is_continuous(&self, _index: usize) -> bool {
        false
    }

    fn has_position_bounds(&self, _index: usize) -> bool {
        false
    }

    fn min_pos_limit(&self, _index: usize) -> f64 {
        f64::NEG_INFINITY
    }

    fn max_pos_limit(&self, _index: usize) -> f64 {
        f64::INFINITY
    }

    fn as_forward_kinematics(&self) -> Option<&dyn ForwardKinematics> {
        Some(self)
    }
}

impl ForwardKinematics for Gantry {
    fn compute_fk(&self, state: &[f64]) -> Option<Pose> {
        Some(Pose::new(Vector3::new(state[0], 0.0, 0.0), UnitQuaternion::identity()))
    }
}

/// Collision collaborator with nothing loaded
struct EmptyWorld;

impl CollisionChecker for EmptyWorld {
    fn is_free(&self, _segment: &[RobotState]) -> bool {
        true
    }

    fn reset(&mut self) {}

    fn add_obstacle(&mut self, _region: &Obstacle) {}

    fn world_size(&self) -> Vector3<f64> {
        Vector3::new(1.0, 1.0, 1.0)
    }

    fn resolution(&self) -> f64 {
        0.02
    }
}

/// Blocks every configuration with x at or beyond `limit`
struct Wall {
    limit: f64,
}

impl CollisionChecker for Wall {
    fn is_free(&self, segment: &[RobotState]) -> bool {
        segment.iter().all(|state| state[0] < self.limit)
    }

    fn reset(&mut self) {}

    fn add_obstacle(&mut self, _region: &Obstacle) {}

    fn world_size(&self) -> Vector3<f64> {
        Vector3::new(1.0, 1.0, 1.0)
    }

    fn resolution(&self) -> f64 {
        0.02
    }
}

fn write(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).unwrap();
}

fn one_joint_params(dir: &Path) -> PlanningParams {
    write(dir, "prims.txt", "short_distance joint_0=0.1\nshort_distance joint_0=-0.1\n");
    PlanningParams::new()
        .with_param("discretization", "joint_0 0.1")
        .with_action_file(dir.join("prims.txt"))
}

fn one_joint_lattice(dir: &Path) -> ManipLattice {
    let arm = Arc::new(PlanarArm::new(vec![1.0]));
    let checker = GridCollisionChecker::new(
        OccupancyGrid::with_defaults(),
        arm.clone(),
        GridCollisionCheckerConfig::default(),
    );
    ManipLatticeAllocator::new()
        .allocate(arm, Box::new(checker), &one_joint_params(dir))
        .unwrap()
}

fn gantry_space() -> ManipLatticeEGraph {
    gantry_space_with(Box::new(EmptyWorld))
}

fn gantry_space_with(checker: Box<dyn CollisionChecker>) -> ManipLatticeEGraph {
    let robot = Arc::new(Gantry::new());
    let mut lattice = ManipLattice::new(robot, checker, vec![0.1, 0.1], ManipLatticeConfig::default()).unwrap();
    let mut aspace = ManipLatticeActionSpace::new(
        vec!["x".to_string(), "free".to_string()],
        ActionSpaceConfig::default(),
    );
    aspace.add_motion_prim(vec![vec![0.1, 0.0]], false).unwrap();
    aspace.add_motion_prim(vec![vec![-0.1, 0.0]], false).unwrap();
    lattice.set_action_space(Box::new(aspace)).unwrap();
    ManipLatticeEGraph::new(lattice, EGraphConfig::default())
}

/// Reference hop count by breadth-first search over the graph's adjacency
fn reference_hops(egraph: &ExperienceGraph, start: NodeId, goal: NodeId) -> Option<usize> {
    let mut dist = vec![usize::MAX; egraph.num_nodes()];
    let mut queue = VecDeque::from([start]);
    dist[start.0] = 0;
    while let Some(n) = queue.pop_front() {
        for m in egraph.adjacent_nodes(n) {
            if dist[m.0] == usize::MAX {
                dist[m.0] = dist[n.0] + 1;
                queue.push_back(m);
            }
        }
    }
    (dist[goal.0] != usize::MAX).then(|| dist[goal.0])
}

#[test]
fn test_same_coord_same_state_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut lattice = one_joint_lattice(dir.path());
    let mut rng = rand::thread_rng();
    for _ in 0..1000 {
        let q: f64 = rng.gen_range(-3.0..3.0);
        let nudge: f64 = rng.gen_range(-0.01..0.01);
        let a = lattice.state_to_id(&[q]);
        let b = lattice.state_to_id(&[q + nudge]);
        if lattice.state_to_coord(&[q]) == lattice.state_to_coord(&[q + nudge]) {
            assert_eq!(a, b);
        } else {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn test_state_id_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut lattice = one_joint_lattice(dir.path());
    let mut rng = rand::thread_rng();
    let ids: Vec<_> = (0..200).map(|_| lattice.state_to_id(&[rng.gen_range(-5.0..5.0)])).collect();
    for id in ids {
        let state = lattice.id_to_state(id).unwrap().clone();
        assert_eq!(lattice.state_to_id(&state), id);
    }
}

#[test]
fn test_single_joint_two_successors() {
    let dir = tempfile::tempdir().unwrap();
    let mut lattice = one_joint_lattice(dir.path());
    let start = lattice.set_start(&[0.0]).unwrap();
    let succs = lattice.get_succs(start).unwrap();

    assert_eq!(succs.len(), 2);
    let mut coords: Vec<Coord> = succs.ids.iter().map(|&id| lattice.coord(id).unwrap().clone()).collect();
    coords.sort();
    assert_eq!(coords, vec![Coord(vec![-1]), Coord(vec![1])]);
    assert_eq!(succs.costs[0], succs.costs[1]);
    assert!(succs.costs[0] > 0);
}

#[test]
fn test_unknown_joint_in_action_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "prims.txt", "short_distance joint_0=0.1\nshort_distance elbow=0.1\n");
    let params = PlanningParams::new()
        .with_param("discretization", "joint_0 0.1")
        .with_action_file(dir.path().join("prims.txt"));
    let arm = Arc::new(PlanarArm::new(vec![1.0]));
    let checker = GridCollisionChecker::new(
        OccupancyGrid::with_defaults(),
        arm.clone(),
        GridCollisionCheckerConfig::default(),
    );
    let result = ManipLatticeAllocator::new().allocate(arm, Box::new(checker), &params);
    assert!(matches!(result, Err(LatticeError::Config(_))));
}

#[test]
fn test_three_waypoint_demonstration() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "demo.csv", "0.0\n0.1\n0.2\n");
    let mut space = ManipLatticeEGraph::new(one_joint_lattice(dir.path()), EGraphConfig::default());
    space.load_experience_graph(&dir.path().join("demo.csv")).unwrap();

    let mid = space.lattice_mut().state_to_id(&[0.1]);
    assert_eq!(space.get_experience_graph_nodes(mid), vec![NodeId(1)]);

    let first = space.lattice_mut().state_to_id(&[0.0]);
    let last = space.lattice_mut().state_to_id(&[0.2]);
    assert_eq!(space.shortcut(first, last), Some(2));
}

#[test]
fn test_experience_nodes_share_coord_and_pose_bin() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("demos")).unwrap();
    write(&dir.path().join("demos"), "a.csv", "x,free\n0.0,1.0\n0.1,1.0\n0.2,1.0\n");
    write(&dir.path().join("demos"), "b.csv", "free x\n0.5 0.0\n0.5 0.1\n");
    let mut space = gantry_space();
    space.load_experience_graph(&dir.path().join("demos")).unwrap();
    assert_eq!(space.experience_graph().num_nodes(), 5);

    let ids: Vec<_> = space.experience_graph().nodes().filter_map(|n| space.get_state_id(n)).collect();
    for id in ids {
        let coord = space.lattice().coord(id).unwrap().clone();
        let nodes = space.get_experience_graph_nodes(id);
        assert!(!nodes.is_empty());
        let pose_nodes = space.get_pose_bin_nodes(id);
        for node in nodes {
            let state = space.experience_graph().state(node).unwrap();
            assert_eq!(space.lattice().state_to_coord(state), coord);
            assert!(pose_nodes.contains(&node));
        }
    }
    // x = 0 in both demonstrations: one pose bin, two coord bins
    let a0 = space.get_state_id(NodeId(0)).unwrap();
    let b0 = space.get_state_id(NodeId(3)).unwrap();
    assert_ne!(space.lattice().coord(a0).unwrap(), space.lattice().coord(b0).unwrap());
    assert_eq!(space.get_pose_bin_nodes(a0).len(), 2);
}

#[test]
fn test_shortcut_matches_breadth_first_reference() {
    let mut chain = ExperienceGraph::new();
    let states: Vec<RobotState> = (0..5).map(|i| vec![i as f64 * 0.1, 0.0]).collect();
    let nodes = chain.add_path(&states);
    let mut with_shortcut = chain.clone();
    with_shortcut.insert_edge(nodes[0], nodes[3], Vec::new()).unwrap();

    for egraph in [chain, with_shortcut] {
        let mut space = gantry_space();
        space.set_experience_graph(Arc::new(egraph.clone()));
        for &a in &nodes {
            for &b in &nodes {
                let cost = space
                    .shortcut(space.get_state_id(a).unwrap(), space.get_state_id(b).unwrap())
                    .unwrap();
                let hops = reference_hops(&egraph, a, b).unwrap();
                assert_eq!(cost as usize, hops);
            }
        }
    }
}

#[test]
fn test_extract_path_of_lattice_actions() {
    let dir = tempfile::tempdir().unwrap();
    let mut lattice = one_joint_lattice(dir.path());
    let s0 = lattice.set_start(&[0.0]).unwrap();
    let mut ids = vec![s0];
    let mut expected: Vec<RobotState> = vec![vec![0.0]];
    let mut current = s0;
    for _ in 0..3 {
        let succs = lattice.get_succs(current).unwrap();
        let next = succs
            .ids
            .iter()
            .copied()
            .find(|&id| lattice.coord(id).unwrap()[0] > lattice.coord(current).unwrap()[0])
            .unwrap();
        let (action, _) = lattice.find_action_to(current, next).unwrap().unwrap();
        expected.extend(action.waypoints);
        ids.push(next);
        current = next;
    }
    assert_eq!(lattice.extract_path(&ids).unwrap(), expected);
}

#[test]
fn test_extract_path_through_snap_edge() {
    let dir = tempfile::tempdir().unwrap();
    // 0.03 shares a bin with 0.0 and rides along as an edge waypoint
    write(dir.path(), "demo.csv", "x,free\n0.0,1.0\n0.03,1.0\n0.1,1.0\n0.2,1.0\n");
    let mut space = gantry_space();
    space.load_experience_graph(&dir.path().join("demo.csv")).unwrap();
    assert_eq!(space.experience_graph().num_nodes(), 3);

    let start = space.lattice_mut().set_start(&[0.0, 0.0]).unwrap();
    let entry = space.get_state_id(NodeId(0)).unwrap();
    let exit = space.get_state_id(NodeId(2)).unwrap();

    // the free joint differs, the planning link pose does not
    assert_eq!(space.snap(start, entry), Some(EGraphConfig::default().snap_cost));
    let succs = space.get_succs(start).unwrap();
    assert!(succs.iter().any(|(id, cost)| id == entry && cost == EGraphConfig::default().snap_cost));

    let path = space.extract_path(&[start, entry, exit]).unwrap();
    assert_eq!(
        path,
        vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![0.03, 1.0],
            vec![0.1, 1.0],
            vec![0.2, 1.0],
        ]
    );
}

/// Demonstration that leaves x = 0, runs out to x = 0.2 and comes back one
/// `free` bin over, so its two ends share a pose bin
fn wall_space(dir: &Path) -> ManipLatticeEGraph {
    write(dir, "demo.csv", "x,free\n0.0,0.0\n0.1,0.0\n0.2,0.0\n0.1,0.1\n0.0,0.1\n");
    let mut space = gantry_space_with(Box::new(Wall { limit: 0.15 }));
    space.load_experience_graph(&dir.join("demo.csv")).unwrap();
    assert_eq!(space.experience_graph().num_nodes(), 5);
    space
}

#[test]
fn test_extract_path_follows_offered_snap_edge() {
    let dir = tempfile::tempdir().unwrap();
    let mut space = wall_space(dir.path());
    let s0 = space.get_state_id(NodeId(0)).unwrap();
    let s4 = space.get_state_id(NodeId(4)).unwrap();
    let snap_cost = EGraphConfig::default().snap_cost;

    let succs = space.get_succs(s0).unwrap();
    assert!(succs.iter().any(|(id, cost)| id == s4 && cost == snap_cost));

    let path = space.extract_path(&[s0, s4]).unwrap();
    assert_eq!(path, vec![vec![0.0, 0.0], vec![0.0, 0.1]]);
    assert!(Wall { limit: 0.15 }.is_free(&path));
}

#[test]
fn test_extract_path_rejects_blocked_experience_route() {
    let dir = tempfile::tempdir().unwrap();
    let space = wall_space(dir.path());
    let s0 = space.get_state_id(NodeId(0)).unwrap();
    let s3 = space.get_state_id(NodeId(3)).unwrap();

    // the only route runs through x = 0.2
    assert!(matches!(
        space.extract_path(&[s0, s3]),
        Err(LatticeError::PathInconsistency { index: 0, .. })
    ));
}

#[test]
fn test_extension_lookup_by_code() {
    let mut space = gantry_space();
    let code = ExtensionKind::ExperienceGraph.code();
    let ext = space.get_extension_by_code(code).unwrap().unwrap();
    assert_eq!(ext.kind(), ExtensionKind::ExperienceGraph);
    assert!(matches!(space.get_extension_by_code(1000), Err(LatticeError::Lookup(_))));

    let dir = tempfile::tempdir().unwrap();
    let mut lattice = one_joint_lattice(dir.path());
    assert!(lattice.get_extension(ExtensionKind::ExperienceGraph).is_none());
}

#[test]
fn test_empty_grid_treated_as_free() {
    let arm = Arc::new(PlanarArm::new(vec![1.0]));
    let mut checker = GridCollisionChecker::new(
        OccupancyGrid::with_defaults(),
        arm,
        GridCollisionCheckerConfig::default(),
    );
    checker.grid_mut().update_from_points(&[]);
    assert!(checker.is_free(&[vec![0.0], vec![6.0]]));
    assert!(matches!(checker.visualization("bounds"), Some(Visualization::Bounds(_))));
    assert!(checker.visualization("voxels").is_none());
}
