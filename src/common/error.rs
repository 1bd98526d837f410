//! Error types for manip_lattice

use thiserror::Error;

use crate::common::types::StateId;

/// Main error type for lattice construction, loading and queries
#[derive(Debug, Error)]
pub enum LatticeError {
    /// Missing or invalid discretization entry, or a required parameter
    /// absent before initialization
    #[error("Configuration error: {0}")]
    Config(String),
    /// Malformed or unreadable action-primitive file or experience-graph path
    #[error("Load error: {0}")]
    Load(String),
    /// Unknown state id, node id or extension code
    #[error("Lookup error: {0}")]
    Lookup(String),
    /// A transition in a solution path is explained by no action or
    /// experience edge
    #[error("Path inconsistency at index {index}: no edge from state {from} to state {to}")]
    PathInconsistency {
        index: usize,
        from: StateId,
        to: StateId,
    },
    /// Filesystem failure outside action and demonstration loading, such as
    /// writing planner inputs
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LatticeError {
    pub(crate) fn unknown_state(state_id: StateId) -> Self {
        LatticeError::Lookup(format!("state id {} has not been allocated", state_id))
    }
}

/// Result type alias for lattice operations
pub type LatticeResult<T> = Result<T, LatticeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LatticeError::Config("Discretization for variable 'j1' not found".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: Discretization for variable 'j1' not found"
        );
    }

    #[test]
    fn test_path_inconsistency_display() {
        let err = LatticeError::PathInconsistency { index: 2, from: 4, to: 9 };
        assert_eq!(
            format!("{}", err),
            "Path inconsistency at index 2: no edge from state 4 to state 9"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LatticeError = io_err.into();
        assert!(matches!(err, LatticeError::Io(_)));
    }
}
