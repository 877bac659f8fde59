//! Render model lookup for terrain instances
//!
//! The renderer refers to terrain through its render model; terrain state is
//! keyed by `TerrainId`. The registry maps one to the other so a render pass
//! can find the terrain a model belongs to.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Handle of a render model owned by the rendering collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RenderModelId(pub u64);

/// Handle of one terrain instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TerrainId(pub u64);

/// Availability of a terrain's render model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    /// Not created yet; skip the frame
    Pending,
    Ready(RenderModelId),
    /// Will never exist
    Unavailable,
}

/// Answers which render model belongs to a terrain
pub trait RenderModelSource {
    fn model_state(&self, terrain: TerrainId) -> ModelState;
}

/// Fixed table of model states
#[derive(Clone, Debug, Default)]
pub struct ModelTable {
    states: HashMap<TerrainId, ModelState>,
}

impl ModelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, terrain: TerrainId, state: ModelState) {
        self.states.insert(terrain, state);
    }
}

impl RenderModelSource for ModelTable {
    fn model_state(&self, terrain: TerrainId) -> ModelState {
        self.states.get(&terrain).copied().unwrap_or(ModelState::Pending)
    }
}

/// Render model to terrain mapping
#[derive(Clone, Debug, Default)]
pub struct TerrainRegistry {
    by_model: HashMap<RenderModelId, TerrainId>,
}

impl TerrainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a model with a terrain, returning the previous owner
    pub fn bind(&mut self, model: RenderModelId, terrain: TerrainId) -> Option<TerrainId> {
        self.by_model.insert(model, terrain)
    }

    pub fn terrain_for(&self, model: RenderModelId) -> Option<TerrainId> {
        self.by_model.get(&model).copied()
    }

    /// Drop every model bound to `terrain`
    pub fn unbind_terrain(&mut self, terrain: TerrainId) {
        self.by_model.retain(|_, t| *t != terrain);
    }

    pub fn len(&self) -> usize {
        self.by_model.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_model.is_empty()
    }
}
