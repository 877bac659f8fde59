//! Rendering-side interfaces: atlas uploads, instance buffers, model lookup

pub mod atlas;
pub mod instance;
pub mod registry;

pub use atlas::{AtlasLayer, AtlasTarget, CpuAtlas, tile_origin, tiles_per_row};
pub use instance::{ChunkInstance, InstanceBuffers, InstanceBuilder, NO_INSTANCE, RenderParams};
pub use registry::{ModelState, ModelTable, RenderModelId, RenderModelSource, TerrainId, TerrainRegistry};
