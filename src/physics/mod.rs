//! Physics collaborators for streamed lod-0 chunks

pub mod collider;
pub mod pool;
pub mod headless;

pub use collider::{ColliderBackend, ColliderTransform, HeightFieldCollider, HeightFieldDesc};
pub use pool::ColliderPool;
pub use headless::{HeadlessHeightField, HeadlessPhysics};
