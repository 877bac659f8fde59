//! Per-chunk GPU instance records
//!
//! Every selected node becomes one instance of a shared grid mesh. A sector
//! map with one entry per lod-0 cell points at the instance covering that
//! cell; it is used to find each instance's neighbours and derive the LOD
//! delta the vertex stage needs to stitch seams.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::render::atlas::tile_origin;
use crate::streaming::lod::SelectedNode;
use crate::terrain::config::TerrainConfig;
use crate::terrain::header::TerrainData;

/// Sector map value for a cell no instance covers
pub const NO_INSTANCE: i32 = -1;

/// Instance record as consumed by the terrain vertex stage
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ChunkInstance {
    pub lod_level: u8,
    /// LOD delta to the neighbour at z - 1
    pub north: u8,
    /// LOD delta to the neighbour at z + 1
    pub south: u8,
    /// LOD delta to the neighbour at x - 1
    pub west: u8,
    /// LOD delta to the neighbour at x + 1
    pub east: u8,
    pub _padding0: u8,
    pub chunk_x: u16,
    pub chunk_z: u16,
    pub _padding1: u16,
    /// World units per mesh vertex step
    pub scale: f32,
    /// Chunk corner relative to the terrain origin
    pub position: [f32; 3],
    /// Atlas texel origin of the chunk tile
    pub uv_x: u32,
    pub uv_y: u32,
}

/// Shader constants for the terrain material
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderParams {
    pub chunk_size: u32,
    pub inv_atlas_size: f32,
    pub inv_terrain_size: f32,
    pub max_height: f32,
    pub world_offset: Vec3,
}

impl RenderParams {
    pub fn new(terrain: &TerrainData, config: &TerrainConfig, atlas_size: u32, world_offset: Vec3) -> Self {
        let header = &terrain.header;
        Self {
            chunk_size: header.chunk_size,
            inv_atlas_size: 1.0 / atlas_size as f32,
            inv_terrain_size: 1.0 / (header.size as f32 * config.units_per_texel),
            max_height: header.max_height,
            world_offset,
        }
    }
}

/// Views of the buffers produced by the last build
#[derive(Clone, Copy, Debug)]
pub struct InstanceBuffers<'a> {
    pub instances: &'a [ChunkInstance],
    pub sector_map: &'a [i32],
}

impl<'a> InstanceBuffers<'a> {
    pub fn instance_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.instances)
    }

    pub fn sector_map_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.sector_map)
    }
}

/// Builds instance and sector-map buffers from a selection
#[derive(Default)]
pub struct InstanceBuilder {
    instances: Vec<ChunkInstance>,
    sector_map: Vec<i32>,
    count: usize,
}

impl InstanceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build instances for `nodes`
    ///
    /// `slot_of` maps a chunk index to its atlas slot; nodes without one are
    /// skipped.
    pub fn build<F>(
        &mut self,
        terrain: &TerrainData,
        nodes: &[SelectedNode],
        slot_of: F,
        units_per_texel: f32,
        atlas_size: u32,
    ) -> InstanceBuffers<'_>
    where
        F: Fn(u32) -> Option<u32>,
    {
        let header = &terrain.header;
        let per_row0 = terrain.chunks_per_row(0);
        let max_instances = (per_row0 * per_row0) as usize;

        if self.instances.len() != max_instances {
            self.instances = vec![ChunkInstance::zeroed(); max_instances];
            self.sector_map = vec![NO_INSTANCE; max_instances];
        }
        self.sector_map.fill(NO_INSTANCE);
        self.count = 0;

        let tile = header.chunk_texture_size;

        for node in nodes {
            let Some(slot) = slot_of(node.chunk_index) else {
                log::warn!("Selected chunk {} has no atlas slot, skipping", node.chunk_index);
                continue;
            };
            if self.count == max_instances {
                break;
            }

            let ratio = per_row0 / terrain.chunks_per_row(node.lod);
            for z in node.z * ratio..(node.z + 1) * ratio {
                for x in node.x * ratio..(node.x + 1) * ratio {
                    if x >= per_row0 || z >= per_row0 {
                        continue;
                    }
                    self.sector_map[(z * per_row0 + x) as usize] = self.count as i32;
                }
            }

            let scale = (1u32 << node.lod) as f32;
            let chunk_offset = (header.chunk_size << node.lod) as f32 * units_per_texel;
            let uv = tile_origin(slot, atlas_size, tile);

            self.instances[self.count] = ChunkInstance {
                lod_level: node.lod as u8,
                chunk_x: node.x as u16,
                chunk_z: node.z as u16,
                scale: scale * units_per_texel,
                position: [node.x as f32 * chunk_offset, 0.0, node.z as f32 * chunk_offset],
                uv_x: uv.x,
                uv_y: uv.y,
                ..Default::default()
            };
            self.count += 1;
        }

        for i in 0..self.count {
            let instance = self.instances[i];
            let lod = instance.lod_level as u32;
            let ratio = (per_row0 / terrain.chunks_per_row(lod)) as i64;
            let x = instance.chunk_x as i64;
            let z = instance.chunk_z as i64;

            let delta = |nx: i64, nz: i64| self.lod_delta(nx * ratio, nz * ratio, per_row0 as i64, instance.lod_level);
            let north = delta(x, z - 1);
            let south = delta(x, z + 1);
            let east = delta(x + 1, z);
            let west = delta(x - 1, z);

            let record = &mut self.instances[i];
            record.north = north;
            record.south = south;
            record.east = east;
            record.west = west;
        }

        self.output()
    }

    /// Buffers from the last build
    pub fn output(&self) -> InstanceBuffers<'_> {
        InstanceBuffers {
            instances: &self.instances[..self.count],
            sector_map: &self.sector_map,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.count
    }

    /// LOD delta towards the instance covering lod-0 sector (x, z)
    fn lod_delta(&self, x: i64, z: i64, per_row0: i64, lod: u8) -> u8 {
        if x < 0 || z < 0 || x >= per_row0 || z >= per_row0 {
            return 0;
        }
        let instance = self.sector_map[(z * per_row0 + x) as usize];
        if instance == NO_INSTANCE {
            return 0;
        }
        self.instances[instance as usize].lod_level.saturating_sub(lod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::header::TerrainHeader;

    fn terrain() -> TerrainData {
        TerrainData::with_layout(TerrainHeader::new(256, 64, 32, 2, 100.0)).unwrap()
    }

    fn node(terrain: &TerrainData, lod: u32, x: u32, z: u32) -> SelectedNode {
        SelectedNode { lod, x, z, chunk_index: terrain.chunk_index(lod, x, z, terrain.chunks_per_row(lod)) }
    }

    /// Three lod-1 quadrants plus the four lod-0 chunks of the last one
    fn mixed_selection(terrain: &TerrainData) -> Vec<SelectedNode> {
        vec![
            node(terrain, 1, 0, 0),
            node(terrain, 1, 1, 0),
            node(terrain, 1, 0, 1),
            node(terrain, 0, 2, 2),
            node(terrain, 0, 3, 2),
            node(terrain, 0, 2, 3),
            node(terrain, 0, 3, 3),
        ]
    }

    fn find(buffers: &InstanceBuffers<'_>, lod: u8, x: u16, z: u16) -> ChunkInstance {
        *buffers
            .instances
            .iter()
            .find(|i| i.lod_level == lod && i.chunk_x == x && i.chunk_z == z)
            .unwrap()
    }

    #[test]
    fn test_instance_layout() {
        assert_eq!(std::mem::size_of::<ChunkInstance>(), 36);
        assert_eq!(std::mem::align_of::<ChunkInstance>(), 4);
    }

    #[test]
    fn test_sector_map_covers_footprints() {
        let terrain = terrain();
        let nodes = mixed_selection(&terrain);
        let mut builder = InstanceBuilder::new();
        let buffers = builder.build(&terrain, &nodes, |c| Some(c), 1.0, 256);

        assert_eq!(buffers.instances.len(), 7);
        assert_eq!(buffers.sector_map.len(), 16);
        assert!(buffers.sector_map.iter().all(|&s| s != NO_INSTANCE));

        // Lod-1 (0,0) owns the top-left 2x2 sectors
        assert_eq!(&buffers.sector_map[0..2], &[0, 0]);
        assert_eq!(&buffers.sector_map[4..6], &[0, 0]);
        // Lod-0 (3,3) owns only the last sector
        assert_eq!(buffers.sector_map[15], 6);
    }

    #[test]
    fn test_seam_deltas() {
        let terrain = terrain();
        let nodes = mixed_selection(&terrain);
        let mut builder = InstanceBuilder::new();
        let buffers = builder.build(&terrain, &nodes, |c| Some(c), 1.0, 256);

        let fine = find(&buffers, 0, 2, 2);
        assert_eq!((fine.north, fine.west, fine.south, fine.east), (1, 1, 0, 0));

        let fine = find(&buffers, 0, 3, 2);
        assert_eq!((fine.north, fine.west, fine.south, fine.east), (1, 0, 0, 0));

        let fine = find(&buffers, 0, 2, 3);
        assert_eq!((fine.north, fine.west, fine.south, fine.east), (0, 1, 0, 0));

        // Coarse side of the seam never records a delta
        let coarse = find(&buffers, 1, 1, 0);
        assert_eq!((coarse.north, coarse.west, coarse.south, coarse.east), (0, 0, 0, 0));
        let coarse = find(&buffers, 1, 0, 1);
        assert_eq!(coarse.east, 0);
    }

    #[test]
    fn test_seam_symmetry() {
        let terrain = terrain();
        let nodes = mixed_selection(&terrain);
        let mut builder = InstanceBuilder::new();
        let buffers = builder.build(&terrain, &nodes, |c| Some(c), 1.0, 256);
        let map = buffers.sector_map;

        // Walk every pair of adjacent lod-0 sectors owned by different instances
        for z in 0..4usize {
            for x in 0..4usize {
                let here = map[z * 4 + x] as usize;
                if x + 1 < 4 {
                    let there = map[z * 4 + x + 1] as usize;
                    if here != there {
                        let (a, b) = (buffers.instances[here], buffers.instances[there]);
                        let diff = a.lod_level.abs_diff(b.lod_level);
                        assert_eq!(a.east.max(b.west), diff);
                        assert_eq!(a.east.min(b.west), 0);
                    }
                }
                if z + 1 < 4 {
                    let there = map[(z + 1) * 4 + x] as usize;
                    if here != there {
                        let (a, b) = (buffers.instances[here], buffers.instances[there]);
                        let diff = a.lod_level.abs_diff(b.lod_level);
                        assert_eq!(a.south.max(b.north), diff);
                        assert_eq!(a.south.min(b.north), 0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_position_scale_and_uv() {
        let terrain = terrain();
        let nodes = vec![node(&terrain, 1, 1, 0), node(&terrain, 0, 3, 2)];
        let mut builder = InstanceBuilder::new();
        // 128-texel atlas of 32-texel tiles: 4 tiles per row
        let buffers = builder.build(&terrain, &nodes, |c| Some(if c == nodes[0].chunk_index { 5 } else { 2 }), 0.5, 128);

        let coarse = buffers.instances[0];
        assert_eq!(coarse.scale, 1.0);
        assert_eq!(coarse.position, [64.0, 0.0, 0.0]);
        assert_eq!((coarse.uv_x, coarse.uv_y), (32, 32));

        let fine = buffers.instances[1];
        assert_eq!(fine.scale, 0.5);
        assert_eq!(fine.position, [96.0, 0.0, 64.0]);
        assert_eq!((fine.uv_x, fine.uv_y), (64, 0));
    }

    #[test]
    fn test_nodes_without_slot_are_skipped() {
        let terrain = terrain();
        let nodes = mixed_selection(&terrain);
        let skipped = nodes[6].chunk_index;
        let mut builder = InstanceBuilder::new();
        let buffers = builder.build(&terrain, &nodes, |c| (c != skipped).then_some(c), 1.0, 256);

        assert_eq!(buffers.instances.len(), 6);
        assert_eq!(buffers.sector_map[15], NO_INSTANCE);
    }

    #[test]
    fn test_rebuild_clears_previous_frame() {
        let terrain = terrain();
        let mut builder = InstanceBuilder::new();
        builder.build(&terrain, &mixed_selection(&terrain), |c| Some(c), 1.0, 256);

        let single = vec![node(&terrain, 2, 0, 0)];
        let buffers = builder.build(&terrain, &single, |c| Some(c), 1.0, 256);
        assert_eq!(buffers.instances.len(), 1);
        assert!(buffers.sector_map.iter().all(|&s| s == 0));
        assert_eq!(buffers.instance_bytes().len(), 36);
        assert_eq!(buffers.sector_map_bytes().len(), 64);
    }
}
