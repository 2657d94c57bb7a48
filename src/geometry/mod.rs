//! Geometry utilities: rigid transforms for anchor poses.

pub mod se3;

pub use se3::SE3;
