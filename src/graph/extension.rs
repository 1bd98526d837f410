//! Planning-space capabilities discovered at runtime
//!
//! A search driver holds a [`RobotPlanningSpace`] and asks it for optional
//! capabilities by [`ExtensionKind`] instead of downcasting to a concrete
//! lattice type.

use std::fmt;
use std::path::Path;

use crate::common::{Cost, LatticeError, LatticeResult, Pose, RobotState, StateId, Successors};

use super::experience_graph::{ExperienceGraph, NodeId};

/// Capability codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    ExperienceGraph,
    PoseProjection,
}

impl ExtensionKind {
    pub fn code(&self) -> usize {
        match self {
            ExtensionKind::ExperienceGraph => 1,
            ExtensionKind::PoseProjection => 2,
        }
    }

    pub fn from_code(code: usize) -> LatticeResult<Self> {
        match code {
            1 => Ok(ExtensionKind::ExperienceGraph),
            2 => Ok(ExtensionKind::PoseProjection),
            _ => Err(LatticeError::Lookup(format!("unknown extension code {}", code))),
        }
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionKind::ExperienceGraph => write!(f, "experience_graph"),
            ExtensionKind::PoseProjection => write!(f, "pose_projection"),
        }
    }
}

/// Borrowed capability handle
pub enum Extension<'a> {
    ExperienceGraph(&'a mut dyn ExperienceGraphExtension),
    PoseProjection(&'a dyn PoseProjectionExtension),
}

impl<'a> Extension<'a> {
    pub fn kind(&self) -> ExtensionKind {
        match self {
            Extension::ExperienceGraph(_) => ExtensionKind::ExperienceGraph,
            Extension::PoseProjection(_) => ExtensionKind::PoseProjection,
        }
    }

    pub fn into_experience_graph(self) -> Option<&'a mut dyn ExperienceGraphExtension> {
        match self {
            Extension::ExperienceGraph(ext) => Some(ext),
            _ => None,
        }
    }

    pub fn into_pose_projection(self) -> Option<&'a dyn PoseProjectionExtension> {
        match self {
            Extension::PoseProjection(ext) => Some(ext),
            _ => None,
        }
    }
}

/// Graph interface consumed by a search driver
pub trait RobotPlanningSpace {
    fn get_succs(&mut self, state_id: StateId) -> LatticeResult<Successors>;

    fn is_goal(&self, state_id: StateId) -> bool;

    fn extract_path(&self, ids: &[StateId]) -> LatticeResult<Vec<RobotState>>;

    fn get_extension(&mut self, _kind: ExtensionKind) -> Option<Extension<'_>> {
        None
    }

    /// Code-based lookup; unknown codes are a lookup error
    fn get_extension_by_code(&mut self, code: usize) -> LatticeResult<Option<Extension<'_>>> {
        let kind = ExtensionKind::from_code(code)?;
        Ok(self.get_extension(kind))
    }
}

/// Experience-graph capability set
pub trait ExperienceGraphExtension {
    fn load_experience_graph(&mut self, path: &Path) -> LatticeResult<()>;

    fn experience_graph(&self) -> &ExperienceGraph;

    /// Nodes sharing the state's Coord bin
    fn get_experience_graph_nodes(&self, state_id: StateId) -> Vec<NodeId>;

    /// Lattice id bound to a node
    fn get_state_id(&self, node: NodeId) -> Option<StateId>;

    /// Experience-graph route cost between two states on the graph
    fn shortcut(&self, first_id: StateId, second_id: StateId) -> Option<Cost>;

    /// Cost of stepping from a state onto a coinciding experience node
    fn snap(&self, first_id: StateId, second_id: StateId) -> Option<Cost>;
}

/// Workspace projection of lattice states
pub trait PoseProjectionExtension {
    fn project_to_pose(&self, state_id: StateId) -> Option<Pose>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for kind in [ExtensionKind::ExperienceGraph, ExtensionKind::PoseProjection] {
            assert_eq!(ExtensionKind::from_code(kind.code()).unwrap(), kind);
        }
        assert_eq!(ExtensionKind::PoseProjection.to_string(), "pose_projection");
    }

    #[test]
    fn test_unknown_code_is_lookup_error() {
        assert!(matches!(ExtensionKind::from_code(0), Err(LatticeError::Lookup(_))));
        assert!(matches!(ExtensionKind::from_code(77), Err(LatticeError::Lookup(_))));
    }
}
