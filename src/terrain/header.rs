//! Terrain source descriptor: header, chunk table, and chunk index math
//!
//! The descriptor is read once when a terrain source is opened and is
//! immutable afterwards. Chunks are grouped in LOD bands (`lod_chunk_offsets`
//! holds the first chunk index of each band); inside a band chunks are stored
//! row-major by `(z, x)`.

use std::io::{Read, Write};

use bytemuck::{Pod, Zeroable};

use crate::core::{Error, Result};

/// File magic for terrain streaming sources
pub const TERRAIN_MAGIC: [u8; 4] = *b"HTRN";

/// Current version of the terrain source format
pub const TERRAIN_FORMAT_VERSION: u32 = 1;

/// Upper bound on the chunk table length
pub const MAX_CHUNKS: u32 = 1 << 24;

/// Bytes per height texel (16-bit unorm)
pub const HEIGHT_TEXEL_BYTES: u32 = 2;

/// Bytes per normal texel (RGBA8)
pub const NORMAL_TEXEL_BYTES: u32 = 4;

/// Header record as stored on disk (little-endian)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct RawHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub size: u32,
    pub chunk_size: u32,
    pub chunk_texture_size: u32,
    pub max_lod: u32,
    pub max_height_bits: u32,
    pub heightmap_size: u32,
    pub normal_map_size: u32,
    pub chunk_count: u32,
    pub band_count: u32,
    pub reserved: u32,
}

/// Chunk table entry as stored on disk (little-endian)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct RawChunkRecord {
    pub heightmap_offset: u64,
    pub normal_map_offset: u64,
}

/// Immutable terrain metadata
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainHeader {
    /// Grid edge length in texels
    pub size: u32,
    /// Chunk edge length in texels at LOD 0
    pub chunk_size: u32,
    /// Atlas tile edge length in texels
    pub chunk_texture_size: u32,
    /// Coarsest LOD index
    pub max_lod: u32,
    /// Maximum world height
    pub max_height: f32,
    /// Height payload size in bytes
    pub heightmap_size: u32,
    /// Normal payload size in bytes
    pub normal_map_size: u32,
}

impl TerrainHeader {
    /// Header with payload sizes derived from the tile size
    pub fn new(size: u32, chunk_size: u32, chunk_texture_size: u32, max_lod: u32, max_height: f32) -> Self {
        // Saturates so oversized tiles fail validation instead of wrapping
        let texels = chunk_texture_size.saturating_mul(chunk_texture_size);
        Self {
            size,
            chunk_size,
            chunk_texture_size,
            max_lod,
            max_height,
            heightmap_size: texels.saturating_mul(HEIGHT_TEXEL_BYTES),
            normal_map_size: texels.saturating_mul(NORMAL_TEXEL_BYTES),
        }
    }
}

/// Byte offsets of one chunk's payloads in the backing stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkRecord {
    pub heightmap_offset: u64,
    pub normal_map_offset: u64,
}

/// Location of a chunk inside the LOD pyramid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkCoord {
    pub lod: u32,
    pub x: u32,
    pub z: u32,
}

/// Header plus chunk table
#[derive(Clone, Debug, PartialEq)]
pub struct TerrainData {
    pub header: TerrainHeader,
    /// First chunk index of each LOD band, indexed by LOD
    pub lod_chunk_offsets: Vec<u32>,
    pub chunks: Vec<ChunkRecord>,
}

impl TerrainData {
    /// Build a descriptor with bands laid out lod-0 first and zeroed offsets
    pub fn with_layout(header: TerrainHeader) -> Result<Self> {
        validate_header(&header)?;

        let total = expected_chunk_count(&header)?;
        let mut lod_chunk_offsets = Vec::with_capacity(header.max_lod as usize + 1);
        let mut offset = 0u32;
        for lod in 0..=header.max_lod {
            lod_chunk_offsets.push(offset);
            let per_row = header.size / (header.chunk_size << lod);
            offset += per_row * per_row;
        }

        Ok(Self {
            header,
            lod_chunk_offsets,
            chunks: vec![ChunkRecord::default(); total as usize],
        })
    }

    /// Number of chunks per row at a LOD
    pub fn chunks_per_row(&self, lod: u32) -> u32 {
        self.header.size / (self.header.chunk_size << lod)
    }

    /// Total number of chunks across all bands
    pub fn chunk_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    /// Flat chunk index from coordinates at a LOD
    pub fn chunk_index(&self, lod: u32, x: u32, z: u32, chunks_per_row: u32) -> u32 {
        self.lod_chunk_offsets[lod as usize] + z * chunks_per_row + x
    }

    /// Flat chunk index from a row-major index local to the LOD band
    pub fn chunk_index_local(&self, lod: u32, local: u32) -> u32 {
        self.lod_chunk_offsets[lod as usize] + local
    }

    /// LOD band a chunk belongs to
    pub fn lod_of(&self, chunk_index: u32) -> Option<u32> {
        if chunk_index >= self.chunk_count() {
            return None;
        }
        (0..=self.header.max_lod).find(|&lod| {
            let start = self.lod_chunk_offsets[lod as usize];
            let per_row = self.chunks_per_row(lod);
            chunk_index >= start && chunk_index < start + per_row * per_row
        })
    }

    /// Coordinates of a chunk inside its LOD band
    pub fn chunk_coords(&self, chunk_index: u32) -> Option<ChunkCoord> {
        let lod = self.lod_of(chunk_index)?;
        let local = chunk_index - self.lod_chunk_offsets[lod as usize];
        let per_row = self.chunks_per_row(lod);
        Some(ChunkCoord {
            lod,
            x: local % per_row,
            z: local / per_row,
        })
    }

    /// Whether a chunk belongs to the finest band
    pub fn is_lod0(&self, chunk_index: u32) -> bool {
        self.lod_of(chunk_index) == Some(0)
    }

    /// Check the descriptor for structural consistency
    pub fn validate(&self) -> Result<()> {
        validate_header(&self.header)?;

        if self.lod_chunk_offsets.len() != self.header.max_lod as usize + 1 {
            return Err(Error::InvalidTerrain(format!(
                "expected {} LOD bands, found {}",
                self.header.max_lod + 1,
                self.lod_chunk_offsets.len()
            )));
        }

        let mut ranges: Vec<(u32, u32)> = (0..=self.header.max_lod)
            .map(|lod| {
                let per_row = self.chunks_per_row(lod);
                (self.lod_chunk_offsets[lod as usize], per_row * per_row)
            })
            .collect();
        ranges.sort_unstable();

        let mut expected_start = 0;
        for (start, count) in ranges {
            if start != expected_start {
                return Err(Error::InvalidTerrain(format!(
                    "LOD band starting at {} overlaps or leaves a gap (expected {})",
                    start, expected_start
                )));
            }
            expected_start = start + count;
        }

        if expected_start != self.chunk_count() {
            return Err(Error::InvalidTerrain(format!(
                "chunk table has {} entries, bands cover {}",
                self.chunk_count(),
                expected_start
            )));
        }

        Ok(())
    }

    /// Read header and chunk table from a stream positioned at the header
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut raw = RawHeader::zeroed();
        reader.read_exact(bytemuck::bytes_of_mut(&mut raw))?;

        if raw.magic != TERRAIN_MAGIC {
            return Err(Error::InvalidTerrain("bad magic".into()));
        }
        let version = u32::from_le(raw.version);
        if version != TERRAIN_FORMAT_VERSION {
            return Err(Error::InvalidTerrain(format!("unsupported version {}", version)));
        }

        let header = TerrainHeader {
            size: u32::from_le(raw.size),
            chunk_size: u32::from_le(raw.chunk_size),
            chunk_texture_size: u32::from_le(raw.chunk_texture_size),
            max_lod: u32::from_le(raw.max_lod),
            max_height: f32::from_bits(u32::from_le(raw.max_height_bits)),
            heightmap_size: u32::from_le(raw.heightmap_size),
            normal_map_size: u32::from_le(raw.normal_map_size),
        };
        validate_header(&header)?;

        let band_count = u32::from_le(raw.band_count) as usize;
        let chunk_count = u32::from_le(raw.chunk_count) as usize;
        if band_count != header.max_lod as usize + 1 {
            return Err(Error::InvalidTerrain(format!(
                "band count {} does not match max lod {}",
                band_count, header.max_lod
            )));
        }
        let expected = expected_chunk_count(&header)? as usize;
        if chunk_count != expected {
            return Err(Error::InvalidTerrain(format!(
                "chunk table claims {} entries, bands need {}",
                chunk_count, expected
            )));
        }

        let mut lod_chunk_offsets = vec![0u32; band_count];
        reader.read_exact(bytemuck::cast_slice_mut(&mut lod_chunk_offsets))?;
        for offset in &mut lod_chunk_offsets {
            *offset = u32::from_le(*offset);
        }

        let mut raw_chunks = vec![RawChunkRecord::zeroed(); chunk_count];
        reader.read_exact(bytemuck::cast_slice_mut(&mut raw_chunks))?;
        let chunks = raw_chunks
            .iter()
            .map(|raw| ChunkRecord {
                heightmap_offset: u64::from_le(raw.heightmap_offset),
                normal_map_offset: u64::from_le(raw.normal_map_offset),
            })
            .collect();

        let data = Self { header, lod_chunk_offsets, chunks };
        data.validate()?;
        Ok(data)
    }

    /// Size in bytes of the header record plus chunk table
    pub fn encoded_len(&self) -> u64 {
        (std::mem::size_of::<RawHeader>()
            + self.lod_chunk_offsets.len() * std::mem::size_of::<u32>()
            + self.chunks.len() * std::mem::size_of::<RawChunkRecord>()) as u64
    }

    /// Write header and chunk table
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let raw = RawHeader {
            magic: TERRAIN_MAGIC,
            version: TERRAIN_FORMAT_VERSION.to_le(),
            size: self.header.size.to_le(),
            chunk_size: self.header.chunk_size.to_le(),
            chunk_texture_size: self.header.chunk_texture_size.to_le(),
            max_lod: self.header.max_lod.to_le(),
            max_height_bits: self.header.max_height.to_bits().to_le(),
            heightmap_size: self.header.heightmap_size.to_le(),
            normal_map_size: self.header.normal_map_size.to_le(),
            chunk_count: self.chunk_count().to_le(),
            band_count: (self.lod_chunk_offsets.len() as u32).to_le(),
            reserved: 0,
        };
        writer.write_all(bytemuck::bytes_of(&raw))?;

        let offsets: Vec<u32> = self.lod_chunk_offsets.iter().map(|o| o.to_le()).collect();
        writer.write_all(bytemuck::cast_slice(&offsets))?;

        let records: Vec<RawChunkRecord> = self
            .chunks
            .iter()
            .map(|c| RawChunkRecord {
                heightmap_offset: c.heightmap_offset.to_le(),
                normal_map_offset: c.normal_map_offset.to_le(),
            })
            .collect();
        writer.write_all(bytemuck::cast_slice(&records))?;
        Ok(())
    }
}

fn validate_header(header: &TerrainHeader) -> Result<()> {
    if header.chunk_size == 0 || header.chunk_texture_size == 0 {
        return Err(Error::InvalidTerrain("chunk and tile sizes must be non-zero".into()));
    }
    if header.max_lod >= 16 {
        return Err(Error::InvalidTerrain(format!("max lod {} out of range", header.max_lod)));
    }
    let coarsest = header
        .chunk_size
        .checked_mul(1 << header.max_lod)
        .ok_or_else(|| {
            Error::InvalidTerrain(format!(
                "chunk size {} at lod {} overflows",
                header.chunk_size, header.max_lod
            ))
        })?;
    if header.size == 0 || header.size % coarsest != 0 {
        return Err(Error::InvalidTerrain(format!(
            "grid size {} is not a multiple of the coarsest chunk size {}",
            header.size, coarsest
        )));
    }
    if !(header.max_height > 0.0) {
        return Err(Error::InvalidTerrain(format!("max height {} must be positive", header.max_height)));
    }
    let height_bytes = tile_bytes(header.chunk_texture_size, HEIGHT_TEXEL_BYTES)?;
    if header.heightmap_size != height_bytes {
        return Err(Error::InvalidTerrain(format!(
            "height payload is {} bytes, tile needs {}",
            header.heightmap_size, height_bytes
        )));
    }
    let normal_bytes = tile_bytes(header.chunk_texture_size, NORMAL_TEXEL_BYTES)?;
    if header.normal_map_size != normal_bytes {
        return Err(Error::InvalidTerrain(format!(
            "normal payload is {} bytes, tile needs {}",
            header.normal_map_size, normal_bytes
        )));
    }
    Ok(())
}

/// Bytes in one tile of `tile` x `tile` texels
fn tile_bytes(tile: u32, texel_bytes: u32) -> Result<u32> {
    tile.checked_mul(tile)
        .and_then(|texels| texels.checked_mul(texel_bytes))
        .ok_or_else(|| Error::InvalidTerrain(format!("{}-texel tile overflows the payload size", tile)))
}

/// Chunks across all bands of a validated header
fn expected_chunk_count(header: &TerrainHeader) -> Result<u32> {
    let mut total = 0u32;
    for lod in 0..=header.max_lod {
        let per_row = header.size / (header.chunk_size << lod);
        total = per_row
            .checked_mul(per_row)
            .and_then(|band| total.checked_add(band))
            .filter(|&total| total <= MAX_CHUNKS)
            .ok_or_else(|| {
                Error::InvalidTerrain(format!(
                    "{}-texel grid in {}-texel chunks exceeds {} chunks",
                    header.size, header.chunk_size, MAX_CHUNKS
                ))
            })?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TerrainData {
        TerrainData::with_layout(TerrainHeader::new(1024, 64, 64, 4, 200.0)).expect("valid layout")
    }

    #[test]
    fn test_band_layout() {
        let data = sample();
        assert_eq!(data.lod_chunk_offsets, vec![0, 256, 320, 336, 340]);
        assert_eq!(data.chunk_count(), 341);
        assert_eq!(data.chunks_per_row(0), 16);
        assert_eq!(data.chunks_per_row(4), 1);
    }

    #[test]
    fn test_chunk_index_and_coords() {
        let data = sample();
        let index = data.chunk_index(1, 3, 2, data.chunks_per_row(1));
        assert_eq!(index, 256 + 2 * 8 + 3);
        assert_eq!(data.chunk_coords(index), Some(ChunkCoord { lod: 1, x: 3, z: 2 }));
        assert_eq!(data.chunk_index_local(2, 5), 325);
    }

    #[test]
    fn test_lod_of() {
        let data = sample();
        assert_eq!(data.lod_of(0), Some(0));
        assert_eq!(data.lod_of(255), Some(0));
        assert_eq!(data.lod_of(256), Some(1));
        assert_eq!(data.lod_of(340), Some(4));
        assert_eq!(data.lod_of(341), None);
        assert!(data.is_lod0(17));
        assert!(!data.is_lod0(300));
    }

    #[test]
    fn test_read_write() {
        let mut data = sample();
        data.chunks[7] = ChunkRecord { heightmap_offset: 1234, normal_map_offset: 99_999_999_999 };

        let mut bytes = Vec::new();
        data.write(&mut bytes).expect("write");
        assert_eq!(bytes.len() as u64, data.encoded_len());

        let read = TerrainData::read(&mut bytes.as_slice()).expect("read");
        assert_eq!(read, data);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let data = sample();
        let mut bytes = Vec::new();
        data.write(&mut bytes).expect("write");
        bytes[0] = b'X';
        assert!(matches!(TerrainData::read(&mut bytes.as_slice()), Err(Error::InvalidTerrain(_))));
    }

    #[test]
    fn test_truncated_table_is_io_error() {
        let data = sample();
        let mut bytes = Vec::new();
        data.write(&mut bytes).expect("write");
        bytes.truncate(bytes.len() - 8);
        assert!(matches!(TerrainData::read(&mut bytes.as_slice()), Err(Error::Io(_))));
    }

    #[test]
    fn test_rejects_grid_not_multiple_of_coarsest_chunk() {
        let header = TerrainHeader::new(1000, 64, 64, 4, 100.0);
        assert!(TerrainData::with_layout(header).is_err());
    }

    #[test]
    fn test_rejects_payload_size_mismatch() {
        let mut header = TerrainHeader::new(256, 64, 64, 2, 100.0);
        header.heightmap_size -= 2;
        assert!(matches!(TerrainData::with_layout(header), Err(Error::InvalidTerrain(_))));
    }

    /// Encoded sample header with one raw u32 header field replaced
    fn patched(field: usize, value: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        sample().write(&mut bytes).expect("write");
        bytes[field * 4..field * 4 + 4].copy_from_slice(&value.to_le_bytes());
        bytes
    }

    #[test]
    fn test_rejects_chunk_size_overflowing_coarsest_band() {
        // chunk_size (field 3) = 2^17 at max lod 15 (field 5) no longer fits a u32
        let mut bytes = patched(3, 1 << 17);
        bytes[20..24].copy_from_slice(&15u32.to_le_bytes());
        assert!(matches!(TerrainData::read(&mut bytes.as_slice()), Err(Error::InvalidTerrain(_))));
    }

    #[test]
    fn test_rejects_tile_overflowing_payload_size() {
        let bytes = patched(4, 70_000);
        assert!(matches!(TerrainData::read(&mut bytes.as_slice()), Err(Error::InvalidTerrain(_))));
    }

    #[test]
    fn test_rejects_chunk_count_before_reading_table() {
        // Field 9 is the chunk count; nothing after the header is needed to reject it
        let bytes = patched(9, u32::MAX);
        let header_and_bands = &bytes[..48 + 5 * 4];
        assert!(matches!(
            TerrainData::read(&mut &header_and_bands[..]),
            Err(Error::InvalidTerrain(_))
        ));
    }

    #[test]
    fn test_rejects_grid_with_too_many_chunks() {
        let header = TerrainHeader::new(1 << 20, 16, 16, 0, 100.0);
        assert!(matches!(TerrainData::with_layout(header), Err(Error::InvalidTerrain(_))));
    }
}
