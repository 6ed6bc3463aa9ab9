//! Geometry utilities: SE3 transforms and SO(3) Jacobians.

pub mod se3;
pub mod so3;

pub use se3::SE3;
