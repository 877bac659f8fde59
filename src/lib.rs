//! Heightstream - bounded-memory height-field terrain streaming

pub mod core;
pub mod math;
pub mod render;
pub mod streaming;
pub mod physics;
pub mod terrain;
