//! Quadtree LOD selection over the chunk pyramid
//!
//! Traversal starts at the coarsest band and walks one LOD level at a time.
//! A node splits into its four children when the camera's LOD square
//! overlaps it, but only if all four children are already resident; missing
//! children are requested and the node renders at its own LOD until they
//! arrive. The rendered set always partitions the terrain footprint.
//!
//! Level buffers are double-buffered and reused across frames.

use glam::{Vec2, Vec3};

use crate::math::{Aabb, Frustum, Rect};
use crate::terrain::config::TerrainConfig;
use crate::terrain::header::TerrainData;

/// Residency queries issued during traversal
pub trait ResidencyRequests {
    /// Mark a chunk active and queue it for loading if absent
    ///
    /// Returns whether the chunk is resident.
    fn request(&mut self, chunk: u32) -> bool;

    /// Mark a chunk active without queueing a load
    fn mark_active(&mut self, chunk: u32);

    /// Whether a chunk currently holds atlas data
    fn is_resident(&self, chunk: u32) -> bool;
}

/// Per-frame selector parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectorSettings {
    /// Finest LOD that may render
    pub min_lod: u32,
    /// Coarsest LOD that may render; anything above is always split
    pub max_lod: u32,
    pub lod0_distance: f32,
    pub units_per_texel: f32,
    pub frustum_cull: bool,
}

impl SelectorSettings {
    /// Derive settings for a terrain whose coarsest band is `terrain_max_lod`
    pub fn from_config(config: &TerrainConfig, terrain_max_lod: u32) -> Self {
        let max_lod = if config.maximum_lod >= 0 {
            (config.maximum_lod as u32).min(terrain_max_lod)
        } else {
            terrain_max_lod
        };
        Self {
            min_lod: config.minimum_lod.min(terrain_max_lod),
            max_lod,
            lod0_distance: config.lod0_distance,
            units_per_texel: config.units_per_texel,
            frustum_cull: config.frustum_cull,
        }
    }
}

/// Camera state the selection is computed for
#[derive(Clone, Copy, Debug)]
pub struct SelectorView<'a> {
    pub camera_position: Vec3,
    pub frustum: &'a Frustum,
    /// World translation of the terrain origin
    pub world_offset: Vec3,
}

/// A node chosen for rendering
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectedNode {
    pub lod: u32,
    pub x: u32,
    pub z: u32,
    pub chunk_index: u32,
}

/// Traversal counters for one frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionStats {
    pub visited: u32,
    /// Splits abandoned because a child was not resident
    pub split_cancellations: u32,
    pub culled: u32,
    /// Coarsest-band nodes that would render but have no data yet
    pub missing_roots: u32,
}

/// Nodes to render this frame
#[derive(Clone, Debug, Default)]
pub struct Selection {
    pub nodes: Vec<SelectedNode>,
    pub stats: SelectionStats,
}

impl Selection {
    fn clear(&mut self) {
        self.nodes.clear();
        self.stats = SelectionStats::default();
    }
}

/// Quadtree traversal with reusable level buffers
#[derive(Default)]
pub struct LodSelector {
    current: Vec<u32>,
    next: Vec<u32>,
    selection: Selection,
}

impl LodSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last computed selection
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Select the nodes to render and issue residency requests
    pub fn select<R: ResidencyRequests + ?Sized>(
        &mut self,
        terrain: &TerrainData,
        settings: &SelectorSettings,
        view: &SelectorView<'_>,
        requests: &mut R,
    ) -> &Selection {
        let Self { current, next, selection } = self;
        selection.clear();
        current.clear();
        next.clear();

        let header = &terrain.header;
        let upt = settings.units_per_texel;
        let camera = Vec2::new(view.camera_position.x, view.camera_position.z);
        let base = view.world_offset.y;

        let root_lod = header.max_lod;
        let mut lod = root_lod;
        let mut per_row = terrain.chunks_per_row(lod);

        for local in 0..per_row * per_row {
            requests.request(terrain.chunk_index_local(root_lod, local));
            current.push(local);
        }

        while !current.is_empty() {
            let next_per_row = per_row * 2;
            let chunk_offset = (header.chunk_size << lod) as f32;
            let extent = chunk_offset * upt * 0.5;
            let camera_rect = Rect::square(camera, settings.lod0_distance * (1u32 << lod) as f32);

            for &local in current.iter() {
                selection.stats.visited += 1;

                let x = local % per_row;
                let z = local / per_row;
                let chunk_index = terrain.chunk_index(lod, x, z, per_row);

                let centre = Vec2::new(x as f32 * chunk_offset + chunk_offset * 0.5, z as f32 * chunk_offset + chunk_offset * 0.5) * upt
                    + Vec2::new(view.world_offset.x, view.world_offset.z);
                let bounds = Aabb::new(
                    Vec3::new(centre.x - extent, base, centre.y - extent),
                    Vec3::new(centre.x + extent, base + header.max_height, centre.y + extent),
                );

                let mut split = bounds.ground_rect().overlaps(&camera_rect) && lod > settings.min_lod;
                if lod > settings.max_lod {
                    split = true;
                }

                if split {
                    // Request all four even after a miss so they all stream in
                    for (cx, cz) in children(x, z) {
                        if !requests.request(terrain.chunk_index(lod - 1, cx, cz, next_per_row)) {
                            split = false;
                        }
                    }
                    if !split {
                        selection.stats.split_cancellations += 1;
                    }
                }

                requests.mark_active(chunk_index);

                // Cull after requesting so off-screen children stay resident
                if settings.frustum_cull && !view.frustum.intersects_aabb(&bounds) {
                    selection.stats.culled += 1;
                    continue;
                }

                if split && lod > settings.min_lod {
                    for (cx, cz) in children(x, z) {
                        next.push(cz * next_per_row + cx);
                    }
                } else if lod == root_lod && !requests.is_resident(chunk_index) {
                    selection.stats.missing_roots += 1;
                    log::warn!("Root chunk {} selected but not resident", chunk_index);
                } else {
                    selection.nodes.push(SelectedNode { lod, x, z, chunk_index });
                }
            }

            std::mem::swap(current, next);
            next.clear();
            if current.is_empty() {
                break;
            }
            per_row = next_per_row;
            lod -= 1;
        }

        selection
    }
}

/// Child coordinates in row-major order
fn children(x: u32, z: u32) -> [(u32, u32); 4] {
    [
        (x * 2, z * 2),
        (x * 2 + 1, z * 2),
        (x * 2, z * 2 + 1),
        (x * 2 + 1, z * 2 + 1),
    ]
}
