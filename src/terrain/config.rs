//! Runtime configuration for a streamed terrain instance

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Default atlas edge length in texels
pub const DEFAULT_ATLAS_SIZE: u32 = 4096;

/// Default number of chunk loads serviced per frame
pub const DEFAULT_MAX_LOADS_PER_FRAME: u32 = 16;

/// User-facing terrain settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Finest LOD allowed to render
    pub minimum_lod: u32,
    /// Coarsest LOD allowed to render, -1 = unrestricted
    pub maximum_lod: i32,
    /// Base split half-extent around the camera for LOD 0
    pub lod0_distance: f32,
    /// World units per height texel
    pub units_per_texel: f32,
    /// Frustum-test the rendered node set
    pub frustum_cull: bool,
    /// Keep the last camera position (debug)
    pub freeze_camera_position: bool,
    /// Keep the last frustum (debug)
    pub freeze_frustum: bool,
    /// Atlas edge length in texels
    pub atlas_size: u32,
    /// Throttle on chunk loads per frame
    pub max_loads_per_frame: u32,
    /// Number of coarsest LOD bands loaded when a source is opened, at least 1
    pub preload_coarse_lods: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            minimum_lod: 0,
            maximum_lod: -1,
            lod0_distance: 64.0,
            units_per_texel: 1.0,
            frustum_cull: true,
            freeze_camera_position: false,
            freeze_frustum: false,
            atlas_size: DEFAULT_ATLAS_SIZE,
            max_loads_per_frame: DEFAULT_MAX_LOADS_PER_FRAME,
            preload_coarse_lods: 2,
        }
    }
}

impl TerrainConfig {
    /// Reject settings the streaming pass cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.lod0_distance > 0.0) {
            return Err(Error::Config(format!("lod0_distance must be positive, got {}", self.lod0_distance)));
        }
        if !(self.units_per_texel > 0.0) {
            return Err(Error::Config(format!("units_per_texel must be positive, got {}", self.units_per_texel)));
        }
        if self.atlas_size == 0 {
            return Err(Error::Config("atlas_size must be non-zero".into()));
        }
        if self.max_loads_per_frame == 0 {
            return Err(Error::Config("max_loads_per_frame must be non-zero".into()));
        }
        if self.preload_coarse_lods == 0 {
            return Err(Error::Config("preload_coarse_lods must be at least 1 so the roots are resident".into()));
        }
        if self.maximum_lod < -1 {
            return Err(Error::Config(format!("maximum_lod must be -1 or a LOD index, got {}", self.maximum_lod)));
        }
        Ok(())
    }

    /// Parse from a JSON string, filling missing fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to file (sync)
    pub fn save_sync(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from file (sync)
    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
