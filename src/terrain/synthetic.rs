//! Noise-based synthetic terrain sources
//!
//! Produces a complete terrain image (every LOD band) from fractal Brownian
//! motion, for tests, benchmarks and the headless demo.

use std::io::Cursor;

use glam::Vec3;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use crate::core::Result;
use crate::streaming::disk_io::{TerrainSource, TerrainWriter};
use crate::terrain::header::{ChunkCoord, TerrainData, TerrainHeader};

/// Parameters controlling the height function
#[derive(Clone, Debug)]
pub struct SyntheticParams {
    pub seed: u32,
    /// Horizontal scale in texels (larger = smoother)
    pub scale: f32,
    pub octaves: u32,
    pub persistence: f32,
    pub lacunarity: f32,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 256.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Synthetic terrain generator
pub struct SyntheticTerrain {
    header: TerrainHeader,
    params: SyntheticParams,
    noise: Fbm<Perlin>,
}

impl SyntheticTerrain {
    pub fn new(header: TerrainHeader, params: SyntheticParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self { header, params, noise }
    }

    pub fn header(&self) -> &TerrainHeader {
        &self.header
    }

    pub fn params(&self) -> &SyntheticParams {
        &self.params
    }

    /// Height in [0, 1] at a lod-0 texel position
    pub fn normalized_height_at(&self, x: f32, z: f32) -> f32 {
        let nx = (x / self.params.scale) as f64;
        let nz = (z / self.params.scale) as f64;
        let value = self.noise.get([nx, nz]);
        (((value + 1.0) * 0.5) as f32).clamp(0.0, 1.0)
    }

    /// World height at a lod-0 texel position
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.normalized_height_at(x, z) * self.header.max_height
    }

    /// Height and normal payloads of one chunk
    pub fn chunk_payloads(&self, coord: ChunkCoord) -> (Vec<u8>, Vec<u8>) {
        let tile = self.header.chunk_texture_size as usize;
        let span = (self.header.chunk_size << coord.lod) as f32;
        let step = span / tile as f32;
        let origin_x = coord.x as f32 * span;
        let origin_z = coord.z as f32 * span;

        let mut samples = vec![0.0f32; tile * tile];
        for j in 0..tile {
            for i in 0..tile {
                samples[j * tile + i] = self.normalized_height_at(origin_x + i as f32 * step, origin_z + j as f32 * step);
            }
        }

        let mut heights = Vec::with_capacity(tile * tile * 2);
        for &s in &samples {
            let encoded = (s * u16::MAX as f32).round() as u16;
            heights.extend_from_slice(&encoded.to_le_bytes());
        }

        let vertical = self.header.max_height / step;
        let sample = |i: usize, j: usize| samples[j.min(tile - 1) * tile + i.min(tile - 1)];
        let mut normals = Vec::with_capacity(tile * tile * 4);
        for j in 0..tile {
            for i in 0..tile {
                let dx = (sample(i + 1, j) - sample(i.saturating_sub(1), j)) * 0.5 * vertical;
                let dz = (sample(i, j + 1) - sample(i, j.saturating_sub(1))) * 0.5 * vertical;
                let n = Vec3::new(-dx, 1.0, -dz).normalize();
                normals.extend_from_slice(&[encode_unorm8(n.x), encode_unorm8(n.y), encode_unorm8(n.z), 255]);
            }
        }

        (heights, normals)
    }

    /// Writer filled with every chunk of every band
    pub fn writer(&self) -> Result<TerrainWriter> {
        let mut writer = TerrainWriter::new(self.header)?;
        let layout: TerrainData = writer.data().clone();
        for chunk in 0..layout.chunk_count() {
            if let Some(coord) = layout.chunk_coords(chunk) {
                let (heights, normals) = self.chunk_payloads(coord);
                writer.set_chunk(chunk, heights, normals)?;
            }
        }
        Ok(writer)
    }

    /// Complete terrain image in memory
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.writer()?.to_bytes()
    }

    /// In-memory terrain source
    pub fn to_source(&self) -> Result<TerrainSource<Cursor<Vec<u8>>>> {
        TerrainSource::from_bytes(self.to_bytes()?)
    }
}

fn encode_unorm8(v: f32) -> u8 {
    ((v * 0.5 + 0.5).clamp(0.0, 1.0) * 255.0).round() as u8
}
