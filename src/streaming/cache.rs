//! Atlas residency cache
//!
//! Maps chunk indices to atlas slots with a fixed capacity. When the atlas is
//! full, the first resident chunk (in resident-list order) that is not active
//! this frame is evicted. There is no recency tracking: a chunk that was hot
//! last frame but is not requested this frame is as evictable as one that has
//! been idle for minutes.

use std::collections::HashSet;

use crate::core::{Error, Result};
use crate::streaming::lod::ResidencyRequests;

/// Outcome of a successful slot acquisition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Allocation {
    /// Chunk already held a slot
    Hit(u32),
    /// Chunk took a never-used (or released) slot
    Fresh(u32),
    /// Chunk took the slot of an evicted chunk
    Evicted { slot: u32, chunk: u32 },
}

impl Allocation {
    /// Slot assigned to the chunk
    pub fn slot(&self) -> u32 {
        match *self {
            Allocation::Hit(slot) | Allocation::Fresh(slot) => slot,
            Allocation::Evicted { slot, .. } => slot,
        }
    }

    /// Whether the chunk was already resident
    pub fn is_hit(&self) -> bool {
        matches!(self, Allocation::Hit(_))
    }
}

/// Fixed-capacity chunk to atlas-slot allocator
pub struct ResidencyCache {
    /// Slot per chunk index
    slot_of: Vec<Option<u32>>,
    /// Chunks currently holding a slot, scanned first-fit on eviction
    resident: Vec<u32>,
    /// Chunks needed this frame for rendering or prefetch
    active: HashSet<u32>,
    /// Chunks awaiting a load, most recent last
    pending: Vec<u32>,
    /// Next never-used slot
    next_free: u32,
    /// Slots handed back after failed loads
    free_slots: Vec<u32>,
    /// Maximum resident chunks
    capacity: u32,
}

impl ResidencyCache {
    /// Create a cache for `chunk_count` chunks and `capacity` atlas slots
    pub fn new(chunk_count: u32, capacity: u32) -> Self {
        Self {
            slot_of: vec![None; chunk_count as usize],
            resident: Vec::with_capacity(capacity as usize),
            active: HashSet::new(),
            pending: Vec::new(),
            next_free: 0,
            free_slots: Vec::new(),
            capacity,
        }
    }

    /// Atlas capacity for a given atlas edge and tile edge
    pub fn capacity_for(atlas_size: u32, tile_size: u32) -> u32 {
        let per_row = atlas_size / tile_size.max(1);
        per_row * per_row
    }

    /// Drop all residency and resize for a new terrain source
    pub fn reset(&mut self, chunk_count: u32, capacity: u32) {
        self.slot_of.clear();
        self.slot_of.resize(chunk_count as usize, None);
        self.resident.clear();
        self.active.clear();
        self.pending.clear();
        self.next_free = 0;
        self.free_slots.clear();
        self.capacity = capacity;
    }

    /// Assign a slot to a chunk, evicting an inactive chunk if the atlas is full
    pub fn acquire(&mut self, chunk: u32) -> Result<Allocation> {
        if let Some(slot) = self.slot(chunk) {
            return Ok(Allocation::Hit(slot));
        }
        if chunk as usize >= self.slot_of.len() {
            return Err(Error::InvalidTerrain(format!("chunk index {} out of range", chunk)));
        }

        let allocation = if self.resident.len() < self.capacity as usize {
            let slot = match self.free_slots.pop() {
                Some(slot) => slot,
                None => {
                    let slot = self.next_free;
                    self.next_free += 1;
                    slot
                }
            };
            Allocation::Fresh(slot)
        } else {
            let position = self
                .resident
                .iter()
                .position(|c| !self.active.contains(c))
                .ok_or(Error::NoCapacity { chunk })?;

            let evicted = self.resident.swap_remove(position);
            let slot = self.slot_of[evicted as usize]
                .take()
                .ok_or_else(|| Error::InvalidTerrain(format!("resident chunk {} has no slot", evicted)))?;
            log::trace!("Evicted chunk {} from slot {}", evicted, slot);
            Allocation::Evicted { slot, chunk: evicted }
        };

        self.slot_of[chunk as usize] = Some(allocation.slot());
        self.resident.push(chunk);
        Ok(allocation)
    }

    /// Undo a slot assignment, e.g. after the chunk failed to load
    pub fn release(&mut self, chunk: u32) -> Option<u32> {
        let slot = self.slot_of.get_mut(chunk as usize)?.take()?;
        if let Some(position) = self.resident.iter().position(|&c| c == chunk) {
            self.resident.swap_remove(position);
        }
        self.free_slots.push(slot);
        Some(slot)
    }

    /// Slot held by a chunk
    pub fn slot(&self, chunk: u32) -> Option<u32> {
        self.slot_of.get(chunk as usize).copied().flatten()
    }

    /// Whether a chunk is protected from eviction this frame
    pub fn is_active(&self, chunk: u32) -> bool {
        self.active.contains(&chunk)
    }

    /// Start a frame: forget last frame's active set
    pub fn begin_frame(&mut self) {
        self.active.clear();
    }

    /// Finish a frame: abandon unserviced load requests
    pub fn end_frame(&mut self) {
        self.pending.clear();
    }

    /// Most recently requested chunk still awaiting a load
    pub fn pop_pending(&mut self) -> Option<u32> {
        self.pending.pop()
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Chunks holding a slot, in eviction scan order
    pub fn resident_chunks(&self) -> &[u32] {
        &self.resident
    }
}

impl ResidencyRequests for ResidencyCache {
    fn request(&mut self, chunk: u32) -> bool {
        self.active.insert(chunk);
        if self.is_resident(chunk) {
            return true;
        }
        self.pending.push(chunk);
        false
    }

    fn mark_active(&mut self, chunk: u32) {
        self.active.insert(chunk);
    }

    fn is_resident(&self, chunk: u32) -> bool {
        self.slot(chunk).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_for() {
        assert_eq!(ResidencyCache::capacity_for(4096, 64), 4096);
        assert_eq!(ResidencyCache::capacity_for(512, 128), 16);
        assert_eq!(ResidencyCache::capacity_for(100, 64), 1);
    }

    #[test]
    fn test_fresh_then_hit() {
        let mut cache = ResidencyCache::new(10, 4);
        assert_eq!(cache.acquire(3).unwrap(), Allocation::Fresh(0));
        assert_eq!(cache.acquire(5).unwrap(), Allocation::Fresh(1));
        assert_eq!(cache.acquire(3).unwrap(), Allocation::Hit(0));
        assert_eq!(cache.resident_count(), 2);
        assert_eq!(cache.slot(5), Some(1));
        assert!(!cache.is_resident(4));
    }

    #[test]
    fn test_first_fit_eviction_skips_active() {
        let mut cache = ResidencyCache::new(10, 3);
        cache.acquire(0).unwrap();
        cache.acquire(1).unwrap();
        cache.acquire(2).unwrap();

        cache.mark_active(0);
        let allocation = cache.acquire(7).unwrap();
        assert_eq!(allocation, Allocation::Evicted { slot: 1, chunk: 1 });
        assert!(!cache.is_resident(1));
        assert_eq!(cache.slot(7), Some(1));
        assert_eq!(cache.resident_count(), 3);
    }

    #[test]
    fn test_eviction_is_not_recency_based() {
        let mut cache = ResidencyCache::new(10, 2);
        cache.acquire(0).unwrap();
        cache.acquire(1).unwrap();

        // Touching chunk 0 again does not protect it
        assert!(cache.acquire(0).unwrap().is_hit());
        let allocation = cache.acquire(2).unwrap();
        assert_eq!(allocation, Allocation::Evicted { slot: 0, chunk: 0 });
    }

    #[test]
    fn test_no_capacity_when_everything_active() {
        let mut cache = ResidencyCache::new(10, 2);
        cache.acquire(0).unwrap();
        cache.acquire(1).unwrap();
        cache.mark_active(0);
        cache.mark_active(1);

        assert!(matches!(cache.acquire(2), Err(Error::NoCapacity { chunk: 2 })));
        assert!(cache.is_resident(0));
        assert!(cache.is_resident(1));
        assert!(!cache.is_resident(2));
    }

    #[test]
    fn test_request_tracks_active_and_pending() {
        let mut cache = ResidencyCache::new(10, 4);
        cache.acquire(1).unwrap();

        assert!(cache.request(1));
        assert!(!cache.request(2));
        assert!(!cache.request(3));
        assert!(cache.is_active(1) && cache.is_active(2) && cache.is_active(3));
        assert_eq!(cache.pending_count(), 2);

        // Stack discipline: most recent first
        assert_eq!(cache.pop_pending(), Some(3));

        cache.end_frame();
        assert_eq!(cache.pending_count(), 0);
        assert_eq!(cache.active_count(), 3);

        cache.begin_frame();
        assert_eq!(cache.active_count(), 0);
    }

    #[test]
    fn test_release_recycles_slot() {
        let mut cache = ResidencyCache::new(10, 2);
        cache.acquire(4).unwrap();
        cache.acquire(5).unwrap();

        assert_eq!(cache.release(4), Some(0));
        assert_eq!(cache.release(4), None);
        assert_eq!(cache.resident_count(), 1);

        assert_eq!(cache.acquire(6).unwrap(), Allocation::Fresh(0));
    }

    #[test]
    fn test_out_of_range_chunk() {
        let mut cache = ResidencyCache::new(4, 4);
        assert!(matches!(cache.acquire(4), Err(Error::InvalidTerrain(_))));
        assert_eq!(cache.slot(100), None);
    }

    #[test]
    fn test_capacity_invariant_under_pressure() {
        let mut cache = ResidencyCache::new(64, 8);
        for frame in 0..20u32 {
            cache.begin_frame();
            for i in 0..6 {
                cache.mark_active((frame * 3 + i) % 64);
            }
            for i in 0..16 {
                let chunk = (frame * 7 + i * 5) % 64;
                match cache.acquire(chunk) {
                    Ok(Allocation::Evicted { chunk: evicted, .. }) => {
                        assert!(!cache.is_active(evicted));
                    }
                    Ok(_) | Err(Error::NoCapacity { .. }) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
                assert!(cache.resident_count() <= 8);
            }

            let mut slots: Vec<u32> = cache
                .resident_chunks()
                .iter()
                .filter_map(|&c| cache.slot(c))
                .collect();
            slots.sort_unstable();
            slots.dedup();
            assert_eq!(slots.len(), cache.resident_count());
            cache.end_frame();
        }
    }
}
