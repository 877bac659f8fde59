//! In-memory physics backend
//!
//! Keeps collider state in plain memory so the streaming pass can run without
//! a physics engine. Attachment is counted on a shared world counter.

use std::cell::Cell;
use std::rc::Rc;

use crate::core::{Error, Result};
use crate::physics::collider::{ColliderBackend, ColliderTransform, HeightFieldCollider, HeightFieldDesc};

/// Backend creating `HeadlessHeightField`s
#[derive(Clone, Debug, Default)]
pub struct HeadlessPhysics {
    attached: Rc<Cell<usize>>,
}

impl HeadlessPhysics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Colliders currently attached to the world
    pub fn attached_count(&self) -> usize {
        self.attached.get()
    }
}

impl ColliderBackend for HeadlessPhysics {
    type Collider = HeadlessHeightField;

    fn create(&mut self, desc: &HeightFieldDesc) -> Result<HeadlessHeightField> {
        if desc.width == 0 || desc.length == 0 {
            return Err(Error::Physics(format!("empty height field {}x{}", desc.width, desc.length)));
        }
        Ok(HeadlessHeightField {
            desc: *desc,
            heights: vec![desc.min_height; desc.sample_count()],
            transform: ColliderTransform::default(),
            attached: false,
            world: Rc::clone(&self.attached),
        })
    }
}

/// Height field held in memory
#[derive(Debug)]
pub struct HeadlessHeightField {
    desc: HeightFieldDesc,
    heights: Vec<f32>,
    transform: ColliderTransform,
    attached: bool,
    world: Rc<Cell<usize>>,
}

impl HeadlessHeightField {
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn transform(&self) -> ColliderTransform {
        self.transform
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn desc(&self) -> &HeightFieldDesc {
        &self.desc
    }
}

impl HeightFieldCollider for HeadlessHeightField {
    fn write_heights(&mut self, heights: &[f32]) -> Result<()> {
        if heights.len() != self.heights.len() {
            return Err(Error::Physics(format!(
                "height field expects {} samples, got {}",
                self.heights.len(),
                heights.len()
            )));
        }
        for (dst, &src) in self.heights.iter_mut().zip(heights) {
            *dst = src.clamp(self.desc.min_height, self.desc.max_height);
        }
        Ok(())
    }

    fn set_transform(&mut self, transform: ColliderTransform) {
        self.transform = transform;
    }

    fn set_attached(&mut self, attached: bool) {
        if self.attached == attached {
            return;
        }
        self.attached = attached;
        let count = self.world.get();
        self.world.set(if attached { count + 1 } else { count.saturating_sub(1) });
    }
}

impl Drop for HeadlessHeightField {
    fn drop(&mut self) {
        self.set_attached(false);
    }
}
