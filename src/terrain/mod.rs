//! Terrain source description, configuration and the per-frame pass

pub mod header;
pub use header::{ChunkCoord, ChunkRecord, TerrainData, TerrainHeader};

pub mod config;
pub use config::TerrainConfig;

pub mod synthetic;
pub use synthetic::{SyntheticParams, SyntheticTerrain};

pub mod processor;
pub use processor::{FrameInput, FrameOutcome, StreamingStats, TerrainProcessor};
