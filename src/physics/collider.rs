//! Height-field collider capability

use glam::{Quat, Vec3};

use crate::core::Result;
use crate::terrain::header::{ChunkCoord, TerrainData};

/// Shape parameters for a new height-field collider
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeightFieldDesc {
    /// Samples along x
    pub width: u32,
    /// Samples along z
    pub length: u32,
    pub min_height: f32,
    pub max_height: f32,
}

impl HeightFieldDesc {
    /// One collider per lod-0 tile of the terrain
    pub fn for_terrain(terrain: &TerrainData) -> Self {
        let tile = terrain.header.chunk_texture_size;
        Self {
            width: tile,
            length: tile,
            min_height: 0.0,
            max_height: terrain.header.max_height,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.width as usize * self.length as usize
    }
}

/// Placement of a collider in the world
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColliderTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for ColliderTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl ColliderTransform {
    /// Transform for the lod-0 chunk at `coord`
    ///
    /// The height field is centred vertically, so the collider sits half the
    /// height range above the chunk centre.
    pub fn for_chunk(terrain: &TerrainData, coord: ChunkCoord, units_per_texel: f32, world_offset: Vec3) -> Self {
        let chunk = terrain.header.chunk_size as f32;
        let centre = Vec3::new(
            coord.x as f32 * chunk + chunk * 0.5,
            0.0,
            coord.z as f32 * chunk + chunk * 0.5,
        ) * units_per_texel;

        Self {
            position: centre + world_offset + Vec3::new(0.0, terrain.header.max_height * 0.5, 0.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::new(units_per_texel, 1.0, units_per_texel),
        }
    }
}

/// A height-field collider owned by the physics collaborator
pub trait HeightFieldCollider {
    /// Overwrite the height samples in place
    fn write_heights(&mut self, heights: &[f32]) -> Result<()>;

    fn set_transform(&mut self, transform: ColliderTransform);

    /// Attach to or detach from the physics world
    fn set_attached(&mut self, attached: bool);
}

/// Creates height-field colliders
pub trait ColliderBackend {
    type Collider: HeightFieldCollider;

    fn create(&mut self, desc: &HeightFieldDesc) -> Result<Self::Collider>;
}
