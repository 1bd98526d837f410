//! Utility modules for manip_lattice

pub mod angles;

pub use angles::{normalize_angle, normalize_angle_positive, shortest_angle_diff, shortest_angle_dist};
