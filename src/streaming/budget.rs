//! Per-frame load budget
//!
//! Chunk loads are synchronous, so the number serviced in one frame bounds
//! the worst-case frame stall. Requests beyond the budget are not queued
//! anywhere: the selector requests them again next frame if still needed.

/// Per-frame chunk load throttle
#[derive(Clone, Debug)]
pub struct LoadBudget {
    /// Maximum load attempts per frame
    max_per_frame: u32,
    /// Attempts made this frame
    used: u32,
}

impl LoadBudget {
    /// Create a new budget
    ///
    /// # Arguments
    /// * `max_per_frame` - Maximum number of chunk loads per frame
    pub fn new(max_per_frame: u32) -> Self {
        Self {
            max_per_frame,
            used: 0,
        }
    }

    /// Start a new frame
    pub fn reset(&mut self) {
        self.used = 0;
    }

    /// Take one load from the budget
    ///
    /// Returns false once the frame's allowance is spent.
    pub fn try_consume(&mut self) -> bool {
        if self.used >= self.max_per_frame {
            return false;
        }
        self.used += 1;
        true
    }

    /// Loads taken this frame
    pub fn used(&self) -> u32 {
        self.used
    }

    /// Loads still available this frame
    pub fn remaining(&self) -> u32 {
        self.max_per_frame.saturating_sub(self.used)
    }

    /// Per-frame allowance
    pub fn max_per_frame(&self) -> u32 {
        self.max_per_frame
    }
}
