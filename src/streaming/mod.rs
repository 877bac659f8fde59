//! Chunk residency, loading and LOD selection

pub mod disk_io;
pub mod chunk_loader;
pub mod cache;
pub mod budget;
pub mod lod;
pub mod scratch;

pub use disk_io::{TerrainSource, TerrainWriter};
pub use chunk_loader::{ChunkLoader, LoadedChunk, decode_heights, normalize_height};
pub use cache::{Allocation, ResidencyCache};
pub use budget::LoadBudget;
pub use lod::{
    LodSelector, ResidencyRequests, SelectedNode, Selection, SelectionStats,
    SelectorSettings, SelectorView,
};
pub use scratch::{ScratchGuard, ScratchPool};
