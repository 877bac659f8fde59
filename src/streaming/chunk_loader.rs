//! Synchronous chunk loading
//!
//! A load stages both payloads of a chunk from the backing stream before
//! touching the atlas, so a failed read never leaves a half-uploaded chunk
//! mapped. Lod-0 chunks additionally get their heights decoded to world units
//! for the physics collider.

use std::io::{Read, Seek, SeekFrom};

use crate::core::{Error, Result};
use crate::render::atlas::{AtlasLayer, AtlasTarget, tile_origin};
use crate::streaming::disk_io::TerrainSource;
use crate::streaming::scratch::{ScratchGuard, ScratchPool};
use crate::terrain::header::{HEIGHT_TEXEL_BYTES, TerrainData};

/// Largest 16-bit height sample
const HEIGHT_SAMPLE_MAX: f32 = u16::MAX as f32;

/// Result of a successful load
pub struct LoadedChunk<'a> {
    pub chunk: u32,
    pub slot: u32,
    pub lod: u32,
    /// World-space heights, present for lod-0 chunks only
    pub heights: Option<ScratchGuard<'a, f32>>,
}

/// Reads chunk payloads from a terrain stream into atlas tiles
pub struct ChunkLoader<S> {
    stream: S,
    base_offset: u64,
    bytes: ScratchPool<u8>,
    floats: ScratchPool<f32>,
}

impl<S: Read + Seek> ChunkLoader<S> {
    /// Create a loader over a stream whose terrain image starts at `base_offset`
    pub fn new(stream: S, base_offset: u64) -> Self {
        Self {
            stream,
            base_offset,
            bytes: ScratchPool::new(),
            floats: ScratchPool::new(),
        }
    }

    /// Split an opened source into its descriptor and a loader
    pub fn from_source(source: TerrainSource<S>) -> (TerrainData, Self) {
        let (data, stream, base_offset) = source.into_parts();
        (data, Self::new(stream, base_offset))
    }

    /// Load one chunk into `slot` of the atlas
    pub fn load<A: AtlasTarget + ?Sized>(
        &mut self,
        terrain: &TerrainData,
        chunk: u32,
        slot: u32,
        atlas: &mut A,
    ) -> Result<LoadedChunk<'_>> {
        let record = *terrain
            .chunks
            .get(chunk as usize)
            .ok_or_else(|| Error::InvalidTerrain(format!("chunk {} has no table entry", chunk)))?;
        let lod = terrain
            .lod_of(chunk)
            .ok_or_else(|| Error::InvalidTerrain(format!("chunk {} is outside every LOD band", chunk)))?;
        let header = &terrain.header;

        let mut height_bytes = self.bytes.checkout(header.heightmap_size as usize);
        self.stream.seek(SeekFrom::Start(self.base_offset + record.heightmap_offset))?;
        self.stream.read_exact(&mut height_bytes)?;

        let mut normal_bytes = self.bytes.checkout(header.normal_map_size as usize);
        self.stream.seek(SeekFrom::Start(self.base_offset + record.normal_map_offset))?;
        self.stream.read_exact(&mut normal_bytes)?;

        let tile = header.chunk_texture_size;
        let origin = tile_origin(slot, atlas.size(), tile);
        atlas.write_tile(AtlasLayer::Height, origin, tile, &height_bytes)?;
        atlas.write_tile(AtlasLayer::Normal, origin, tile, &normal_bytes)?;

        let heights = if lod == 0 {
            let texels = header.heightmap_size / HEIGHT_TEXEL_BYTES;
            let mut heights = self.floats.checkout(texels as usize);
            decode_heights(&height_bytes, header.max_height, &mut heights);
            Some(heights)
        } else {
            None
        };

        log::trace!("Loaded chunk {} (lod {}) into slot {}", chunk, lod, slot);
        Ok(LoadedChunk { chunk, slot, lod, heights })
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }
}

/// Position of `value` between `min` and `max`, clamped to [0, 1]
pub fn normalize_height(min: f32, max: f32, value: f32) -> f32 {
    if max == min {
        return 0.0;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Decode little-endian 16-bit height samples to world units
pub fn decode_heights(raw: &[u8], max_height: f32, out: &mut [f32]) {
    for (dst, src) in out.iter_mut().zip(raw.chunks_exact(2)) {
        let sample = u16::from_le_bytes([src[0], src[1]]) as f32;
        *dst = normalize_height(0.0, HEIGHT_SAMPLE_MAX, sample) * max_height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::atlas::CpuAtlas;
    use crate::streaming::disk_io::TerrainWriter;
    use crate::terrain::header::TerrainHeader;
    use std::io::Cursor;

    fn header() -> TerrainHeader {
        TerrainHeader::new(256, 64, 4, 2, 100.0)
    }

    fn source_with(chunk: u32, heights: Vec<u8>, normals: Vec<u8>) -> TerrainSource<Cursor<Vec<u8>>> {
        let mut writer = TerrainWriter::new(header()).unwrap();
        writer.set_chunk(chunk, heights, normals).unwrap();
        TerrainSource::from_bytes(writer.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn test_normalize_height() {
        assert_eq!(normalize_height(0.0, 65535.0, 0.0), 0.0);
        assert_eq!(normalize_height(0.0, 65535.0, 65535.0), 1.0);
        assert_eq!(normalize_height(0.0, 10.0, 20.0), 1.0);
        assert_eq!(normalize_height(0.0, 10.0, -5.0), 0.0);
        assert_eq!(normalize_height(3.0, 3.0, 3.0), 0.0);
    }

    #[test]
    fn test_decode_extremes() {
        let raw = [0x00, 0x00, 0xFF, 0xFF, 0x00, 0x80];
        let mut out = [f32::NAN; 3];
        decode_heights(&raw, 200.0, &mut out);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 200.0);
        assert!((out[2] - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_lod0_load_uploads_and_decodes() {
        let heights: Vec<u8> = std::iter::repeat([0xFF, 0xFF]).take(16).flatten().collect();
        let source = source_with(3, heights, vec![200u8; 64]);
        let (data, mut loader) = ChunkLoader::from_source(source);
        let mut atlas = CpuAtlas::new(16);

        let loaded = loader.load(&data, 3, 5, &mut atlas).unwrap();
        assert_eq!(loaded.lod, 0);
        assert_eq!(loaded.slot, 5);
        let decoded = loaded.heights.as_ref().unwrap();
        assert_eq!(decoded.len(), 16);
        assert!(decoded.iter().all(|&h| h == 100.0));
        drop(loaded);

        // Slot 5 in a 16-texel atlas of 4-texel tiles starts at (4, 4)
        assert_eq!(atlas.texel(AtlasLayer::Height, 4, 4), &[0xFF, 0xFF]);
        assert_eq!(atlas.texel(AtlasLayer::Normal, 7, 7), &[200, 200, 200, 200]);
        assert_eq!(atlas.texel(AtlasLayer::Normal, 3, 3), &[0, 0, 0, 0]);
        assert_eq!(atlas.write_count(), 2);
    }

    #[test]
    fn test_coarse_load_has_no_heights() {
        let source = source_with(17, vec![1u8; 32], vec![2u8; 64]);
        let (data, mut loader) = ChunkLoader::from_source(source);
        let mut atlas = CpuAtlas::new(16);

        let loaded = loader.load(&data, 17, 0, &mut atlas).unwrap();
        assert_eq!(loaded.lod, 1);
        assert!(loaded.heights.is_none());
    }

    #[test]
    fn test_short_stream_uploads_nothing() {
        let writer = TerrainWriter::new(header()).unwrap();
        let mut bytes = writer.to_bytes().unwrap();
        // Cut into the last chunk's normal payload
        bytes.truncate(bytes.len() - 10);
        let source = TerrainSource::from_bytes(bytes).unwrap();
        let (data, mut loader) = ChunkLoader::from_source(source);
        let mut atlas = CpuAtlas::new(16);

        let last = data.chunk_count() - 1;
        let result = loader.load(&data, last, 0, &mut atlas);
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(atlas.write_count(), 0);
    }

    #[test]
    fn test_scratch_buffers_are_reused() {
        let source = source_with(0, vec![0u8; 32], vec![0u8; 64]);
        let (data, mut loader) = ChunkLoader::from_source(source);
        let mut atlas = CpuAtlas::new(16);

        for slot in 0..4 {
            loader.load(&data, slot, slot, &mut atlas).unwrap();
        }
        assert_eq!(loader.bytes.available(), 2);
        assert_eq!(loader.floats.available(), 1);
    }
}
