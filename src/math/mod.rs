//! Bounds and view-volume math

pub mod aabb;
pub mod frustum;

pub use aabb::{Aabb, Rect};
pub use frustum::{Plane, Frustum};
