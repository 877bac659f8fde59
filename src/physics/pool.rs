//! Reusable height-field colliders for resident lod-0 chunks
//!
//! Colliders are expensive to create, so released ones are detached and
//! queued for the next lod-0 load instead of being destroyed.

use std::collections::{HashMap, VecDeque};

use crate::core::Result;
use crate::physics::collider::{ColliderBackend, ColliderTransform, HeightFieldCollider, HeightFieldDesc};

/// Collider pool keyed by chunk index
pub struct ColliderPool<B: ColliderBackend> {
    backend: B,
    desc: HeightFieldDesc,
    bound: HashMap<u32, B::Collider>,
    free: VecDeque<B::Collider>,
    created: usize,
}

impl<B: ColliderBackend> ColliderPool<B> {
    pub fn new(backend: B, desc: HeightFieldDesc) -> Self {
        Self {
            backend,
            desc,
            bound: HashMap::new(),
            free: VecDeque::new(),
            created: 0,
        }
    }

    /// Take a pooled collider, creating one if the pool is empty
    pub fn acquire(&mut self) -> Result<B::Collider> {
        if let Some(collider) = self.free.pop_front() {
            return Ok(collider);
        }
        let collider = self.backend.create(&self.desc)?;
        self.created += 1;
        Ok(collider)
    }

    /// Detach a collider and return it to the pool
    pub fn release(&mut self, mut collider: B::Collider) {
        collider.set_attached(false);
        self.free.push_back(collider);
    }

    /// Attach a collider with `heights` for a chunk
    ///
    /// A chunk that already has a collider is updated in place.
    pub fn bind(&mut self, chunk: u32, heights: &[f32], transform: ColliderTransform) -> Result<()> {
        let mut collider = match self.bound.remove(&chunk) {
            Some(collider) => collider,
            None => self.acquire()?,
        };

        if let Err(e) = collider.write_heights(heights) {
            self.release(collider);
            return Err(e);
        }
        collider.set_transform(transform);
        collider.set_attached(true);
        self.bound.insert(chunk, collider);
        log::trace!("Bound collider for chunk {}", chunk);
        Ok(())
    }

    /// Release the collider bound to a chunk, if any
    pub fn unbind(&mut self, chunk: u32) -> bool {
        match self.bound.remove(&chunk) {
            Some(collider) => {
                self.release(collider);
                true
            }
            None => false,
        }
    }

    /// Recompute the transform of every bound collider
    ///
    /// Colliders for which `transform_of` returns `None` keep their current
    /// transform. Returns the number of colliders updated.
    pub fn retransform<F>(&mut self, mut transform_of: F) -> usize
    where
        F: FnMut(u32) -> Option<ColliderTransform>,
    {
        let mut updated = 0;
        for (&chunk, collider) in self.bound.iter_mut() {
            if let Some(transform) = transform_of(chunk) {
                collider.set_transform(transform);
                updated += 1;
            }
        }
        updated
    }

    /// Detach and drop every collider, bound or pooled
    pub fn clear(&mut self) {
        for (_, mut collider) in self.bound.drain() {
            collider.set_attached(false);
        }
        for mut collider in self.free.drain(..) {
            collider.set_attached(false);
        }
    }

    /// Use a new shape for colliders created from now on
    pub fn set_desc(&mut self, desc: HeightFieldDesc) {
        self.desc = desc;
    }

    pub fn collider(&self, chunk: u32) -> Option<&B::Collider> {
        self.bound.get(&chunk)
    }

    pub fn is_bound(&self, chunk: u32) -> bool {
        self.bound.contains_key(&chunk)
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Colliders created over the pool's lifetime
    pub fn created_count(&self) -> usize {
        self.created
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::headless::HeadlessPhysics;
    use glam::Vec3;

    fn pool() -> ColliderPool<HeadlessPhysics> {
        let desc = HeightFieldDesc { width: 2, length: 2, min_height: 0.0, max_height: 10.0 };
        ColliderPool::new(HeadlessPhysics::new(), desc)
    }

    fn at(x: f32) -> ColliderTransform {
        ColliderTransform { position: Vec3::new(x, 0.0, 0.0), ..Default::default() }
    }

    #[test]
    fn test_bind_creates_and_attaches() {
        let mut pool = pool();
        pool.bind(3, &[1.0, 2.0, 3.0, 4.0], at(1.0)).unwrap();

        let collider = pool.collider(3).unwrap();
        assert!(collider.is_attached());
        assert_eq!(collider.heights(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(collider.transform().position.x, 1.0);
        assert_eq!(pool.created_count(), 1);
        assert_eq!(pool.backend().attached_count(), 1);
    }

    #[test]
    fn test_unbind_recycles() {
        let mut pool = pool();
        pool.bind(3, &[0.0; 4], at(1.0)).unwrap();
        assert!(pool.unbind(3));
        assert!(!pool.unbind(3));
        assert_eq!(pool.bound_count(), 0);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.backend().attached_count(), 0);

        pool.bind(9, &[5.0; 4], at(2.0)).unwrap();
        assert_eq!(pool.created_count(), 1);
        assert_eq!(pool.free_count(), 0);
        let collider = pool.collider(9).unwrap();
        assert!(collider.is_attached());
        assert_eq!(collider.heights(), &[5.0; 4]);
    }

    #[test]
    fn test_rebind_updates_in_place() {
        let mut pool = pool();
        pool.bind(1, &[0.0; 4], at(1.0)).unwrap();
        pool.bind(1, &[7.0; 4], at(3.0)).unwrap();

        assert_eq!(pool.bound_count(), 1);
        assert_eq!(pool.created_count(), 1);
        assert_eq!(pool.collider(1).unwrap().transform().position.x, 3.0);
    }

    #[test]
    fn test_failed_write_returns_collider() {
        let mut pool = pool();
        assert!(pool.bind(1, &[0.0; 3], at(0.0)).is_err());
        assert!(!pool.is_bound(1));
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.backend().attached_count(), 0);
    }

    #[test]
    fn test_retransform_moves_bound_colliders() {
        let mut pool = pool();
        pool.bind(1, &[0.0; 4], at(1.0)).unwrap();
        pool.bind(2, &[0.0; 4], at(2.0)).unwrap();
        pool.bind(3, &[0.0; 4], at(3.0)).unwrap();
        pool.unbind(3);

        let moved = pool.retransform(|chunk| (chunk == 1).then(|| at(101.0)));
        assert_eq!(moved, 1);
        assert_eq!(pool.collider(1).unwrap().transform().position.x, 101.0);
        assert_eq!(pool.collider(2).unwrap().transform().position.x, 2.0);
    }

    #[test]
    fn test_clear_detaches_everything() {
        let mut pool = pool();
        pool.bind(1, &[0.0; 4], at(0.0)).unwrap();
        pool.bind(2, &[0.0; 4], at(0.0)).unwrap();
        pool.unbind(2);

        pool.clear();
        assert_eq!(pool.bound_count(), 0);
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.backend().attached_count(), 0);
    }
}
