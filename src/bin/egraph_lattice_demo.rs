// Experience-graph lattice demo
//
// Plans a 2-link planar arm around a box obstacle with weighted A*, once on
// the plain lattice and once with a demonstration loaded into the
// experience graph, and logs how many states each search expanded.
//
// RUST_LOG=debug shows the loaded action set and per-state expansions.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use nalgebra::Vector3;
use ordered_float::NotNan;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use manip_lattice::collision::{
    GridCollisionChecker, GridCollisionCheckerConfig, OccupancyGrid, OccupancyGridConfig,
};
use manip_lattice::common::{joint_distance, Obstacle, Visualization};
use manip_lattice::graph::{
    EGraphConfig, ExtensionKind, ManipLatticeEGraph, ManipLatticeEGraphAllocator, PlanningParams,
    RobotPlanningSpace,
};
use manip_lattice::robot::PlanarArm;
use manip_lattice::{GoalConstraint, LatticeResult, RobotState, StateId};

const PRIMITIVES: &str = "\
units degrees
short_distance shoulder=5
short_distance shoulder=-5
short_distance elbow=5
short_distance elbow=-5
long_distance shoulder=10 ; shoulder=20
long_distance shoulder=-10 ; shoulder=-20
long_distance elbow=10 ; elbow=20
long_distance elbow=-10 ; elbow=-20
short_distance_amp enabled=true thresh=0.3
snap_to_xyz_rpy enabled=true thresh=0.15
";

const START: [f64; 2] = [0.0, 0.0];
const GOAL: [f64; 2] = [1.6, -0.8];
const HEURISTIC_WEIGHT: f64 = 2.0;
const MAX_EXPANSIONS: usize = 50_000;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

fn write_inputs(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir.join("demos"))?;
    fs::write(dir.join("prims.txt"), PRIMITIVES)?;

    let steps = 32;
    let mut demo = String::from("shoulder,elbow\n");
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        demo.push_str(&format!(
            "{:.4},{:.4}\n",
            START[0] + t * (GOAL[0] - START[0]),
            START[1] + t * (GOAL[1] - START[1])
        ));
    }
    fs::write(dir.join("demos").join("demo_0.csv"), demo)
}

fn build_space(dir: &Path, with_experience: bool) -> LatticeResult<ManipLatticeEGraph> {
    let arm = Arc::new(PlanarArm::with_joint_names(
        vec!["shoulder".to_string(), "elbow".to_string()],
        vec![0.8, 0.6],
    ));
    let grid = OccupancyGrid::new(OccupancyGridConfig {
        size: Vector3::new(3.0, 3.0, 0.4),
        resolution: 0.04,
        origin: Vector3::new(-1.5, -1.5, -0.2),
        ..Default::default()
    });
    let mut checker = GridCollisionChecker::new(grid, arm.clone(), GridCollisionCheckerConfig::default());
    checker.grid_mut().add_obstacle(&Obstacle::cube(
        Vector3::new(0.9, 0.9, 0.0),
        Vector3::new(0.3, 0.3, 0.3),
    ));

    let mut params = PlanningParams::new()
        .with_param("discretization", "shoulder 0.0872664626 elbow 0.0872664626")
        .with_action_file(dir.join("prims.txt"));
    if with_experience {
        params = params.with_param("experience_graph", &dir.join("demos").to_string_lossy());
    }
    let mut space = ManipLatticeEGraphAllocator::new(EGraphConfig::default()).allocate(arm, Box::new(checker), &params)?;
    space.lattice_mut().set_goal(GoalConstraint::JointState {
        state: GOAL.to_vec(),
        tolerance: vec![0.05, 0.05],
    })?;
    Ok(space)
}

/// Weighted A* with a joint-distance heuristic
fn weighted_astar(
    space: &mut ManipLatticeEGraph,
    start: StateId,
    goal: &[f64],
) -> LatticeResult<Option<(Vec<StateId>, usize)>> {
    let heuristic = |state: &RobotState| joint_distance(state, goal) * 1000.0 * HEURISTIC_WEIGHT;

    let mut g: HashMap<StateId, i64> = HashMap::new();
    let mut parent: HashMap<StateId, StateId> = HashMap::new();
    let mut closed: HashSet<StateId> = HashSet::new();
    let mut open = BinaryHeap::new();

    g.insert(start, 0);
    if let Ok(h0) = NotNan::new(heuristic(space.lattice().id_to_state(start)?)) {
        open.push((Reverse(h0), start));
    }

    while let Some((_, id)) = open.pop() {
        if !closed.insert(id) {
            continue;
        }
        if space.is_goal(id) {
            let mut path = vec![id];
            let mut node = id;
            while let Some(&prev) = parent.get(&node) {
                path.push(prev);
                node = prev;
            }
            path.reverse();
            return Ok(Some((path, closed.len())));
        }
        if closed.len() >= MAX_EXPANSIONS {
            warn!(expansions = closed.len(), "expansion limit reached");
            break;
        }

        let g_id = g[&id];
        let succs = space.get_succs(id)?;
        for (succ, cost) in succs.iter() {
            let tentative = g_id + cost as i64;
            if g.get(&succ).map_or(true, |&old| tentative < old) {
                g.insert(succ, tentative);
                parent.insert(succ, id);
                let f = tentative as f64 + heuristic(space.lattice().id_to_state(succ)?);
                if let Ok(f) = NotNan::new(f) {
                    open.push((Reverse(f), succ));
                }
            }
        }
    }
    Ok(None)
}

fn run(dir: &Path) -> LatticeResult<()> {
    write_inputs(dir)?;

    for with_experience in [false, true] {
        let mut space = build_space(dir, with_experience)?;
        let start = space.lattice_mut().set_start(&START)?;

        if let Some(Visualization::Bounds(points)) = space.lattice().collision_checker().visualization("bounds") {
            info!(points = points.len(), "world bounds");
        }
        if let Some(ext) = space.get_extension(ExtensionKind::ExperienceGraph) {
            if let Some(egraph) = ext.into_experience_graph() {
                info!(nodes = egraph.experience_graph().num_nodes(), "experience graph available");
            }
        }

        match weighted_astar(&mut space, start, &GOAL)? {
            Some((ids, expansions)) => {
                let waypoints = space.extract_path(&ids)?;
                info!(
                    with_experience,
                    expansions,
                    states = ids.len(),
                    waypoints = waypoints.len(),
                    allocated = space.lattice().num_states(),
                    "found path"
                );
                if let Some(last) = waypoints.last() {
                    info!(end = ?last, "path end");
                }
            }
            None => warn!(with_experience, "no path found"),
        }
    }
    Ok(())
}

fn main() {
    init_tracing();
    let dir = std::env::temp_dir().join(format!("egraph_lattice_demo_{}", std::process::id()));
    let result = run(&dir);
    if let Err(e) = fs::remove_dir_all(&dir) {
        warn!(error = %e, "failed to clean up demo files");
    }
    if let Err(e) = result {
        error!(error = %e, "demo failed");
        std::process::exit(1);
    }
}
