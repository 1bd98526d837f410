//! Planning-space construction from string parameters
//!
//! Recognised keys:
//! - `discretization` (required): `"name res name res ..."`, one entry per planning joint
//! - `use_long_and_short_prims`: `true`/`false`
//! - `cost_per_cell`: uniform edge cost instead of the joint-distance metric
//! - `experience_graph`: demonstrations to load into an experience-graph lattice

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error};

use crate::common::{CollisionChecker, Cost, LatticeError, LatticeResult, RobotModel};

use super::action_space::{ActionSpaceConfig, ManipLatticeActionSpace};
use super::manip_lattice::{ActionCost, ManipLattice, ManipLatticeConfig};
use super::manip_lattice_egraph::{EGraphConfig, ManipLatticeEGraph};
use super::motion_primitive::MotionPrimitiveType;

/// String-keyed planning parameters
#[derive(Debug, Clone, Default)]
pub struct PlanningParams {
    pub params: HashMap<String, String>,
    pub action_filename: Option<PathBuf>,
}

impl PlanningParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_action_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.action_filename = Some(path.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }

    fn get_bool(&self, key: &str) -> LatticeResult<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some("true") | Some("1") => Ok(Some(true)),
            Some("false") | Some("0") => Ok(Some(false)),
            Some(other) => Err(LatticeError::Config(format!("parameter '{}' is not a boolean: '{}'", key, other))),
        }
    }
}

/// Parse `"name value name value ..."` into a resolution map
pub fn parse_discretization(text: &str) -> LatticeResult<HashMap<String, f64>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() % 2 != 0 {
        return Err(LatticeError::Config(format!(
            "discretization must be name/value pairs, got {} tokens",
            tokens.len()
        )));
    }
    let mut disc = HashMap::new();
    for pair in tokens.chunks(2) {
        let res = pair[1].parse::<f64>().map_err(|_| {
            LatticeError::Config(format!("invalid resolution '{}' for joint '{}'", pair[1], pair[0]))
        })?;
        disc.insert(pair[0].to_string(), res);
    }
    Ok(disc)
}

fn log_action_set(aspace: &ManipLatticeActionSpace) {
    debug!("action set:");
    for prim in aspace.primitives() {
        if prim.kind.is_snap() {
            debug!(
                kind = %prim.kind,
                enabled = aspace.use_amp(prim.kind),
                thresh = aspace.amp_thresh(prim.kind),
                "  primitive"
            );
        } else {
            debug!(kind = %prim.kind, action = ?prim.action, "  primitive");
        }
    }
    if aspace.use_amp(MotionPrimitiveType::ShortDistance) {
        debug!(thresh = aspace.amp_thresh(MotionPrimitiveType::ShortDistance), "  short distance adaptivity");
    }
}

/// Builds joint-space lattices from [`PlanningParams`]
#[derive(Debug, Clone, Default)]
pub struct ManipLatticeAllocator;

impl ManipLatticeAllocator {
    pub fn new() -> Self {
        Self
    }

    pub fn allocate(
        &self,
        robot: Arc<dyn RobotModel>,
        checker: Box<dyn CollisionChecker>,
        params: &PlanningParams,
    ) -> LatticeResult<ManipLattice> {
        let text = params.get("discretization").ok_or_else(|| {
            error!("parameter 'discretization' not found in planning params");
            LatticeError::Config("parameter 'discretization' not found".to_string())
        })?;
        let disc = parse_discretization(text)?;
        debug!(joints = disc.len(), "parsed discretization");

        let mut config = ManipLatticeConfig::default();
        if let Some(cost) = params.get("cost_per_cell") {
            let cost: Cost = cost
                .parse()
                .map_err(|_| LatticeError::Config(format!("invalid cost_per_cell '{}'", cost)))?;
            config.cost = ActionCost::Uniform(cost);
        }
        let mut lattice = ManipLattice::from_discretization(robot, checker, &disc, config)?;

        let action_file = params
            .action_filename
            .as_ref()
            .ok_or_else(|| LatticeError::Config("no action file given".to_string()))?;
        let aspace_config = ActionSpaceConfig {
            use_long_and_short_prims: params.get_bool("use_long_and_short_prims")?.unwrap_or(false),
        };
        let joints = lattice.robot().planning_joints().to_vec();
        let aspace = ManipLatticeActionSpace::load(action_file, joints, aspace_config)?;
        log_action_set(&aspace);

        lattice.set_action_space(Box::new(aspace))?;
        Ok(lattice)
    }
}

/// Builds experience-graph lattices; `experience_graph` is optional
#[derive(Debug, Clone, Default)]
pub struct ManipLatticeEGraphAllocator {
    pub config: EGraphConfig,
}

impl ManipLatticeEGraphAllocator {
    pub fn new(config: EGraphConfig) -> Self {
        Self { config }
    }

    pub fn allocate(
        &self,
        robot: Arc<dyn RobotModel>,
        checker: Box<dyn CollisionChecker>,
        params: &PlanningParams,
    ) -> LatticeResult<ManipLatticeEGraph> {
        let lattice = ManipLatticeAllocator::new().allocate(robot, checker, params)?;
        let mut pspace = ManipLatticeEGraph::new(lattice, self.config.clone());
        if let Some(path) = params.get("experience_graph") {
            pspace.load_experience_graph(Path::new(path))?;
        }
        Ok(pspace)
    }
}
