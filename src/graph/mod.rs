// Lattice, action space and experience-graph modules

pub mod motion_primitive;
pub mod action_space;
pub mod manip_lattice;
pub mod experience_graph;
pub mod extension;
pub mod manip_lattice_egraph;
pub mod allocator;

pub use motion_primitive::*;
pub use action_space::*;
pub use manip_lattice::*;
pub use experience_graph::*;
pub use extension::*;
pub use manip_lattice_egraph::*;
pub use allocator::*;
