//! Common types, traits, and error definitions for manip_lattice
//!
//! This module provides the state, cost and collaborator vocabulary shared
//! by the lattice, the action space and the experience-graph extension.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
