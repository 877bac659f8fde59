//! Chunk texture atlas
//!
//! Each resident chunk owns one square tile in a height atlas (16-bit) and a
//! normal atlas (RGBA8). Tiles are addressed by slot index, row-major.

use glam::UVec2;

use crate::core::{Error, Result};
use crate::terrain::header::{HEIGHT_TEXEL_BYTES, NORMAL_TEXEL_BYTES};

/// Atlas texture a tile is written into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtlasLayer {
    Height,
    Normal,
}

impl AtlasLayer {
    pub fn texel_bytes(self) -> u32 {
        match self {
            AtlasLayer::Height => HEIGHT_TEXEL_BYTES,
            AtlasLayer::Normal => NORMAL_TEXEL_BYTES,
        }
    }
}

/// Destination for chunk tile uploads
///
/// Implemented by the rendering side; uploads happen synchronously during the
/// frame pass.
pub trait AtlasTarget {
    /// Atlas edge length in texels
    fn size(&self) -> u32;

    /// Copy one tile of tightly packed texels into a layer at `origin`
    fn write_tile(&mut self, layer: AtlasLayer, origin: UVec2, tile_size: u32, data: &[u8]) -> Result<()>;
}

/// Number of tiles along one atlas edge
pub fn tiles_per_row(atlas_size: u32, tile_size: u32) -> u32 {
    atlas_size / tile_size.max(1)
}

/// Texel origin of a slot's tile
pub fn tile_origin(slot: u32, atlas_size: u32, tile_size: u32) -> UVec2 {
    let per_row = tiles_per_row(atlas_size, tile_size).max(1);
    UVec2::new((slot % per_row) * tile_size, (slot / per_row) * tile_size)
}

/// Atlas kept in host memory
///
/// Used headless and in tests; a GPU implementation forwards the same calls
/// to texture uploads.
pub struct CpuAtlas {
    size: u32,
    height: Vec<u8>,
    normal: Vec<u8>,
    writes: u64,
}

impl CpuAtlas {
    pub fn new(size: u32) -> Self {
        let texels = size as usize * size as usize;
        Self {
            size,
            height: vec![0; texels * HEIGHT_TEXEL_BYTES as usize],
            normal: vec![0; texels * NORMAL_TEXEL_BYTES as usize],
            writes: 0,
        }
    }

    /// Raw texels of one layer
    pub fn layer(&self, layer: AtlasLayer) -> &[u8] {
        match layer {
            AtlasLayer::Height => &self.height,
            AtlasLayer::Normal => &self.normal,
        }
    }

    /// Bytes of one texel
    pub fn texel(&self, layer: AtlasLayer, x: u32, y: u32) -> &[u8] {
        let bpp = layer.texel_bytes() as usize;
        let start = (y as usize * self.size as usize + x as usize) * bpp;
        &self.layer(layer)[start..start + bpp]
    }

    /// Number of tile uploads accepted
    pub fn write_count(&self) -> u64 {
        self.writes
    }
}

impl AtlasTarget for CpuAtlas {
    fn size(&self) -> u32 {
        self.size
    }

    fn write_tile(&mut self, layer: AtlasLayer, origin: UVec2, tile_size: u32, data: &[u8]) -> Result<()> {
        let bpp = layer.texel_bytes() as usize;
        let row_bytes = tile_size as usize * bpp;

        if origin.x + tile_size > self.size || origin.y + tile_size > self.size {
            return Err(Error::Atlas(format!(
                "tile at {:?} with edge {} exceeds atlas of {}",
                origin, tile_size, self.size
            )));
        }
        if data.len() != row_bytes * tile_size as usize {
            return Err(Error::Atlas(format!(
                "{:?} tile data is {} bytes, expected {}",
                layer,
                data.len(),
                row_bytes * tile_size as usize
            )));
        }

        let stride = self.size as usize * bpp;
        let target = match layer {
            AtlasLayer::Height => &mut self.height,
            AtlasLayer::Normal => &mut self.normal,
        };
        for (row, src) in data.chunks_exact(row_bytes).enumerate() {
            let start = (origin.y as usize + row) * stride + origin.x as usize * bpp;
            target[start..start + row_bytes].copy_from_slice(src);
        }

        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_origin() {
        assert_eq!(tile_origin(0, 256, 64), UVec2::new(0, 0));
        assert_eq!(tile_origin(3, 256, 64), UVec2::new(192, 0));
        assert_eq!(tile_origin(5, 256, 64), UVec2::new(64, 64));
        assert_eq!(tiles_per_row(4096, 64), 64);
    }

    #[test]
    fn test_write_tile_places_rows() {
        let mut atlas = CpuAtlas::new(8);
        let data: Vec<u8> = (0..16u8).collect(); // 2x2 normal tile
        atlas.write_tile(AtlasLayer::Normal, UVec2::new(2, 4), 2, &data).unwrap();

        assert_eq!(atlas.texel(AtlasLayer::Normal, 2, 4), &[0, 1, 2, 3]);
        assert_eq!(atlas.texel(AtlasLayer::Normal, 3, 4), &[4, 5, 6, 7]);
        assert_eq!(atlas.texel(AtlasLayer::Normal, 2, 5), &[8, 9, 10, 11]);
        assert_eq!(atlas.texel(AtlasLayer::Normal, 1, 4), &[0, 0, 0, 0]);
        assert_eq!(atlas.write_count(), 1);
    }

    #[test]
    fn test_write_tile_rejects_bad_input() {
        let mut atlas = CpuAtlas::new(8);
        assert!(matches!(
            atlas.write_tile(AtlasLayer::Height, UVec2::new(6, 0), 4, &[0; 32]),
            Err(Error::Atlas(_))
        ));
        assert!(matches!(
            atlas.write_tile(AtlasLayer::Height, UVec2::new(0, 0), 4, &[0; 31]),
            Err(Error::Atlas(_))
        ));
        assert_eq!(atlas.write_count(), 0);
    }
}
