//! Terrain source I/O
//!
//! A terrain source is one seekable stream holding the header record, the LOD
//! band table, the chunk table and the chunk payloads. Payload offsets are
//! relative to the start of the terrain stream; when the stream is embedded
//! in a larger container the caller supplies the base offset.

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::core::{Error, Result};
use crate::terrain::header::{ChunkRecord, TerrainData, TerrainHeader};

/// Opened terrain source: validated descriptor plus the stream it came from
pub struct TerrainSource<S> {
    data: TerrainData,
    stream: S,
    base_offset: u64,
}

impl TerrainSource<BufReader<File>> {
    /// Open a terrain file from disk
    pub fn open_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), 0)
    }
}

impl TerrainSource<Cursor<Vec<u8>>> {
    /// Wrap an in-memory terrain image
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes), 0)
    }
}

impl<S: Read + Seek> TerrainSource<S> {
    /// Read and validate the descriptor at `base_offset`
    pub fn from_reader(mut stream: S, base_offset: u64) -> Result<Self> {
        stream.seek(SeekFrom::Start(base_offset))?;
        let data = TerrainData::read(&mut stream)?;
        log::info!(
            "Opened terrain source: {}x{} texels, chunk {}, tile {}, max lod {}, {} chunks",
            data.header.size,
            data.header.size,
            data.header.chunk_size,
            data.header.chunk_texture_size,
            data.header.max_lod,
            data.chunk_count()
        );
        Ok(Self { data, stream, base_offset })
    }

    pub fn data(&self) -> &TerrainData {
        &self.data
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Split into descriptor, stream and base offset
    pub fn into_parts(self) -> (TerrainData, S, u64) {
        (self.data, self.stream, self.base_offset)
    }
}

/// Builds a terrain source image from per-chunk payloads
///
/// Payloads are laid out after the chunk table in chunk index order (lod-0
/// band first), height then normal for each chunk. Chunks without a payload
/// are written zero-filled.
pub struct TerrainWriter {
    data: TerrainData,
    heights: Vec<Option<Vec<u8>>>,
    normals: Vec<Option<Vec<u8>>>,
}

impl TerrainWriter {
    pub fn new(header: TerrainHeader) -> Result<Self> {
        let data = TerrainData::with_layout(header)?;
        let count = data.chunk_count() as usize;
        Ok(Self {
            data,
            heights: vec![None; count],
            normals: vec![None; count],
        })
    }

    /// Descriptor being written (offsets are filled in by `write`)
    pub fn data(&self) -> &TerrainData {
        &self.data
    }

    /// Set the payloads of one chunk
    pub fn set_chunk(&mut self, chunk: u32, heights: Vec<u8>, normals: Vec<u8>) -> Result<()> {
        let header = &self.data.header;
        if chunk >= self.data.chunk_count() {
            return Err(Error::InvalidTerrain(format!(
                "chunk {} out of range ({} chunks)",
                chunk,
                self.data.chunk_count()
            )));
        }
        if heights.len() != header.heightmap_size as usize {
            return Err(Error::InvalidTerrain(format!(
                "chunk {} height payload is {} bytes, expected {}",
                chunk,
                heights.len(),
                header.heightmap_size
            )));
        }
        if normals.len() != header.normal_map_size as usize {
            return Err(Error::InvalidTerrain(format!(
                "chunk {} normal payload is {} bytes, expected {}",
                chunk,
                normals.len(),
                header.normal_map_size
            )));
        }

        self.heights[chunk as usize] = Some(heights);
        self.normals[chunk as usize] = Some(normals);
        Ok(())
    }

    /// Write the full image and return the descriptor with its final offsets
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<TerrainData> {
        let mut data = self.data.clone();
        let height_len = data.header.heightmap_size as u64;
        let normal_len = data.header.normal_map_size as u64;

        let mut offset = data.encoded_len();
        for record in &mut data.chunks {
            *record = ChunkRecord {
                heightmap_offset: offset,
                normal_map_offset: offset + height_len,
            };
            offset += height_len + normal_len;
        }

        data.write(writer)?;

        let zero_heights = vec![0u8; height_len as usize];
        let zero_normals = vec![0u8; normal_len as usize];
        for (heights, normals) in self.heights.iter().zip(&self.normals) {
            writer.write_all(heights.as_deref().unwrap_or(&zero_heights))?;
            writer.write_all(normals.as_deref().unwrap_or(&zero_normals))?;
        }

        Ok(data)
    }

    /// Write the image into memory
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)?;
        Ok(bytes)
    }

    /// Write the image to a file
    pub fn save(&self, path: &Path) -> Result<TerrainData> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        let data = self.write(&mut writer)?;
        writer.flush()?;
        Ok(data)
    }
}
