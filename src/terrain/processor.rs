//! Per-frame streaming pass for one terrain instance
//!
//! Each frame the processor selects the node set for the camera, services a
//! bounded number of pending chunk loads, and rebuilds the instance buffers.
//! Everything runs synchronously on the caller's thread.

use std::io::{Read, Seek};

use glam::Vec3;
use serde::Serialize;

use crate::core::camera::Camera;
use crate::core::{Error, Result};
use crate::math::Frustum;
use crate::physics::{ColliderBackend, ColliderPool, ColliderTransform, HeightFieldDesc};
use crate::render::atlas::AtlasTarget;
use crate::render::instance::{InstanceBuffers, InstanceBuilder, RenderParams};
use crate::render::registry::{ModelState, RenderModelId, RenderModelSource, TerrainId, TerrainRegistry};
use crate::streaming::{
    Allocation, ChunkLoader, LoadBudget, LodSelector, ResidencyCache, ResidencyRequests, SelectorSettings,
    SelectorView, TerrainSource,
};
use crate::terrain::config::TerrainConfig;
use crate::terrain::header::TerrainData;

/// Camera state supplied by the host each frame
#[derive(Clone, Copy, Debug)]
pub struct FrameInput {
    pub camera_position: Vec3,
    pub frustum: Frustum,
    /// World translation of the terrain origin
    pub world_offset: Vec3,
}

impl FrameInput {
    pub fn from_camera(camera: &Camera, world_offset: Vec3) -> Self {
        Self {
            camera_position: camera.position,
            frustum: camera.frustum(),
            world_offset,
        }
    }

    /// Input with a frustum that accepts everything
    pub fn unculled(camera_position: Vec3, world_offset: Vec3) -> Self {
        Self {
            camera_position,
            frustum: Frustum::unbounded(),
            world_offset,
        }
    }
}

/// What happened in a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Render model not ready yet; nothing was touched
    Skipped,
    Rendered,
}

/// Counters for the last processed frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamingStats {
    pub frame: u64,
    pub instances: usize,
    pub resident: usize,
    pub active: usize,
    /// Pending requests when servicing started
    pub pending: usize,
    pub capacity: u32,
    pub loads: u32,
    pub failed_loads: u32,
    pub evictions: u32,
    pub split_cancellations: u32,
    pub culled: u32,
    pub missing_roots: u32,
    pub physics_bound: usize,
    pub physics_pooled: usize,
}

/// State of one streamed terrain instance
pub struct TerrainProcessor<S, A, B: ColliderBackend> {
    id: TerrainId,
    config: TerrainConfig,
    settings: SelectorSettings,
    terrain: TerrainData,
    loader: ChunkLoader<S>,
    atlas: A,
    cache: ResidencyCache,
    physics: ColliderPool<B>,
    selector: LodSelector,
    instances: InstanceBuilder,
    budget: LoadBudget,
    camera_position: Option<Vec3>,
    frustum: Option<Frustum>,
    world_offset: Vec3,
    model: Option<RenderModelId>,
    frame: u64,
    evictions: u32,
    stats: StreamingStats,
}

impl<S, A, B> TerrainProcessor<S, A, B>
where
    S: Read + Seek,
    A: AtlasTarget,
    B: ColliderBackend,
{
    /// Set up streaming for a terrain source and preload its coarsest bands
    pub fn open(id: TerrainId, source: TerrainSource<S>, atlas: A, backend: B, config: TerrainConfig) -> Result<Self> {
        config.validate()?;
        let (terrain, loader) = ChunkLoader::from_source(source);
        let capacity = atlas_capacity(&terrain, &atlas)?;
        if atlas.size() != config.atlas_size {
            log::warn!(
                "Atlas is {} texels but config asks for {}; using the atlas size",
                atlas.size(),
                config.atlas_size
            );
        }

        let mut processor = Self {
            id,
            settings: SelectorSettings::from_config(&config, terrain.header.max_lod),
            cache: ResidencyCache::new(terrain.chunk_count(), capacity),
            physics: ColliderPool::new(backend, HeightFieldDesc::for_terrain(&terrain)),
            budget: LoadBudget::new(config.max_loads_per_frame),
            config,
            terrain,
            loader,
            atlas,
            selector: LodSelector::new(),
            instances: InstanceBuilder::new(),
            camera_position: None,
            frustum: None,
            world_offset: Vec3::ZERO,
            model: None,
            frame: 0,
            evictions: 0,
            stats: StreamingStats::default(),
        };

        log::info!("Terrain {:?}: atlas capacity {} chunks", id, capacity);
        processor.preload()?;
        Ok(processor)
    }

    /// Swap in new terrain data, dropping all residency and colliders
    pub fn replace_source(&mut self, source: TerrainSource<S>) -> Result<()> {
        let (terrain, loader) = ChunkLoader::from_source(source);
        let capacity = atlas_capacity(&terrain, &self.atlas)?;

        self.physics.clear();
        self.physics.set_desc(HeightFieldDesc::for_terrain(&terrain));
        self.cache.reset(terrain.chunk_count(), capacity);
        self.settings = SelectorSettings::from_config(&self.config, terrain.header.max_lod);
        self.terrain = terrain;
        self.loader = loader;

        log::info!("Terrain {:?}: source replaced, atlas capacity {} chunks", self.id, capacity);
        self.preload()
    }

    /// Apply new runtime settings
    ///
    /// Atlas size changes take effect on the next `replace_source`.
    pub fn set_config(&mut self, config: TerrainConfig) -> Result<()> {
        config.validate()?;
        self.settings = SelectorSettings::from_config(&config, self.terrain.header.max_lod);
        self.budget = LoadBudget::new(config.max_loads_per_frame);
        self.config = config;
        Ok(())
    }

    /// Run one frame of streaming
    pub fn update<M: RenderModelSource + ?Sized>(
        &mut self,
        input: &FrameInput,
        models: &M,
        registry: &mut TerrainRegistry,
    ) -> Result<FrameOutcome> {
        match models.model_state(self.id) {
            ModelState::Pending => {
                log::debug!("Terrain {:?}: render model pending, skipping frame", self.id);
                return Ok(FrameOutcome::Skipped);
            }
            ModelState::Unavailable => {
                return Err(Error::MissingCollaborator(format!("render model for terrain {:?}", self.id)));
            }
            ModelState::Ready(model) => {
                if registry.terrain_for(model) != Some(self.id) {
                    registry.bind(model, self.id);
                }
                self.model = Some(model);
            }
        }

        if !self.config.freeze_camera_position || self.camera_position.is_none() {
            self.camera_position = Some(input.camera_position);
        }
        if !self.config.freeze_frustum || self.frustum.is_none() {
            self.frustum = Some(input.frustum);
        }
        if input.world_offset != self.world_offset {
            self.move_colliders(input.world_offset);
        }
        self.frame += 1;
        self.evictions = 0;

        let camera_position = self.camera_position.unwrap_or(input.camera_position);
        let frustum = self.frustum.unwrap_or(input.frustum);

        self.cache.begin_frame();
        let view = SelectorView {
            camera_position,
            frustum: &frustum,
            world_offset: self.world_offset,
        };
        let selection_stats = self.selector.select(&self.terrain, &self.settings, &view, &mut self.cache).stats;

        let pending = self.cache.pending_count();
        let (loads, failed_loads) = self.service_pending()?;
        self.cache.end_frame();

        let cache = &self.cache;
        let instance_count = self
            .instances
            .build(
                &self.terrain,
                &self.selector.selection().nodes,
                |chunk| cache.slot(chunk),
                self.config.units_per_texel,
                self.atlas.size(),
            )
            .instances
            .len();

        self.stats = StreamingStats {
            frame: self.frame,
            instances: instance_count,
            resident: self.cache.resident_count(),
            active: self.cache.active_count(),
            pending,
            capacity: self.cache.capacity(),
            loads,
            failed_loads,
            evictions: self.evictions,
            split_cancellations: selection_stats.split_cancellations,
            culled: selection_stats.culled,
            missing_roots: selection_stats.missing_roots,
            physics_bound: self.physics.bound_count(),
            physics_pooled: self.physics.free_count(),
        };

        log::debug!(
            "Terrain {:?} frame {}: {} instances, {}/{} resident, {} active, {} pending, {} loaded, {} failed, {} evicted",
            self.id,
            self.frame,
            self.stats.instances,
            self.stats.resident,
            self.stats.capacity,
            self.stats.active,
            self.stats.pending,
            self.stats.loads,
            self.stats.failed_loads,
            self.stats.evictions
        );

        Ok(FrameOutcome::Rendered)
    }

    /// Instance and sector-map buffers from the last rendered frame
    pub fn output(&self) -> InstanceBuffers<'_> {
        self.instances.output()
    }

    /// Material constants for the current terrain
    pub fn render_params(&self) -> RenderParams {
        RenderParams::new(&self.terrain, &self.config, self.atlas.size(), self.world_offset)
    }

    pub fn stats(&self) -> &StreamingStats {
        &self.stats
    }

    /// Detach all colliders and forget the render model
    pub fn shutdown(&mut self, registry: &mut TerrainRegistry) {
        self.physics.clear();
        registry.unbind_terrain(self.id);
        self.model = None;
        log::info!("Terrain {:?}: shut down", self.id);
    }

    pub fn id(&self) -> TerrainId {
        self.id
    }

    pub fn model(&self) -> Option<RenderModelId> {
        self.model
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn terrain(&self) -> &TerrainData {
        &self.terrain
    }

    pub fn cache(&self) -> &ResidencyCache {
        &self.cache
    }

    pub fn physics(&self) -> &ColliderPool<B> {
        &self.physics
    }

    pub fn atlas(&self) -> &A {
        &self.atlas
    }

    /// Load pending chunks, most recent request first, within the frame budget
    fn service_pending(&mut self) -> Result<(u32, u32)> {
        self.budget.reset();
        let mut loads = 0;
        let mut failed = 0;

        while let Some(chunk) = self.cache.pop_pending() {
            if self.cache.is_resident(chunk) {
                continue;
            }
            if !self.budget.try_consume() {
                break;
            }

            match self.stream_in(chunk) {
                Ok(()) => loads += 1,
                Err(Error::NoCapacity { chunk }) => {
                    log::debug!("Atlas full, no evictable slot for chunk {}; deferring remaining loads", chunk);
                    break;
                }
                Err(e @ (Error::Io(_) | Error::Atlas(_))) => {
                    log::warn!("Skipping chunk {}: {}", chunk, e);
                    failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((loads, failed))
    }

    /// Give a chunk a slot, upload it, and bind a collider for lod-0 chunks
    fn stream_in(&mut self, chunk: u32) -> Result<()> {
        let allocation = self.cache.acquire(chunk)?;
        if allocation.is_hit() {
            return Ok(());
        }
        if let Allocation::Evicted { chunk: evicted, slot } = allocation {
            self.physics.unbind(evicted);
            self.evictions += 1;
            log::trace!("Chunk {} takes slot {} from chunk {}", chunk, slot, evicted);
        }

        let loaded = match self.loader.load(&self.terrain, chunk, allocation.slot(), &mut self.atlas) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.cache.release(chunk);
                return Err(e);
            }
        };

        if let Some(heights) = loaded.heights.as_deref() {
            let Some(coord) = self.terrain.chunk_coords(chunk) else {
                return Ok(());
            };
            let transform = ColliderTransform::for_chunk(&self.terrain, coord, self.config.units_per_texel, self.world_offset);
            if let Err(e) = self.physics.bind(chunk, heights, transform) {
                log::warn!("No collider for chunk {}: {}", chunk, e);
            }
        }
        Ok(())
    }

    /// Shift the terrain origin, repositioning every bound collider
    fn move_colliders(&mut self, world_offset: Vec3) {
        self.world_offset = world_offset;
        let terrain = &self.terrain;
        let units_per_texel = self.config.units_per_texel;
        let moved = self.physics.retransform(|chunk| {
            let coord = terrain.chunk_coords(chunk)?;
            Some(ColliderTransform::for_chunk(terrain, coord, units_per_texel, world_offset))
        });
        if moved > 0 {
            log::debug!("Terrain {:?}: moved {} colliders to origin {}", self.id, moved, world_offset);
        }
    }

    /// Load the coarsest bands without throttling
    fn preload(&mut self) -> Result<()> {
        let max_lod = self.terrain.header.max_lod;
        let bands = self.config.preload_coarse_lods.min(max_lod + 1);
        let mut loaded = 0;

        // Keep preloaded chunks from evicting each other
        self.cache.begin_frame();
        for lod in (max_lod + 1 - bands..=max_lod).rev() {
            let per_row = self.terrain.chunks_per_row(lod);
            for local in 0..per_row * per_row {
                let chunk = self.terrain.chunk_index_local(lod, local);
                self.cache.mark_active(chunk);
                match self.stream_in(chunk) {
                    Ok(()) => loaded += 1,
                    Err(Error::NoCapacity { .. }) => {
                        return Err(Error::Config(format!(
                            "atlas holds {} tiles, too few to preload {} LOD bands",
                            self.cache.capacity(),
                            bands
                        )));
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        self.cache.begin_frame();

        log::info!("Terrain {:?}: preloaded {} chunks from {} coarsest LOD bands", self.id, loaded, bands);
        Ok(())
    }
}

fn atlas_capacity<A: AtlasTarget>(terrain: &TerrainData, atlas: &A) -> Result<u32> {
    let capacity = ResidencyCache::capacity_for(atlas.size(), terrain.header.chunk_texture_size);
    if capacity == 0 {
        return Err(Error::Config(format!(
            "atlas of {} texels cannot hold a {}-texel tile",
            atlas.size(),
            terrain.header.chunk_texture_size
        )));
    }
    Ok(capacity)
}
