//! Reusable scratch buffers for chunk decoding
//!
//! Buffers are checked out for the duration of one load and handed back when
//! the guard drops, including on early return through `?`.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

/// Pool of reusable buffers
pub struct ScratchPool<T> {
    free: RefCell<Vec<Vec<T>>>,
}

impl<T: Copy + Default> ScratchPool<T> {
    pub fn new() -> Self {
        Self {
            free: RefCell::new(Vec::new()),
        }
    }

    /// Check out a buffer of exactly `len` elements
    ///
    /// Contents are unspecified; callers overwrite what they read.
    pub fn checkout(&self, len: usize) -> ScratchGuard<'_, T> {
        let mut buffer = self.free.borrow_mut().pop().unwrap_or_default();
        buffer.resize(len, T::default());
        ScratchGuard { pool: self, buffer }
    }

    /// Number of buffers currently available for checkout
    pub fn available(&self) -> usize {
        self.free.borrow().len()
    }

    fn give_back(&self, buffer: Vec<T>) {
        self.free.borrow_mut().push(buffer);
    }
}

impl<T: Copy + Default> Default for ScratchPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Checked-out scratch buffer, returned to its pool on drop
pub struct ScratchGuard<'a, T: Copy + Default> {
    pool: &'a ScratchPool<T>,
    buffer: Vec<T>,
}

impl<T: Copy + Default> Deref for ScratchGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.buffer
    }
}

impl<T: Copy + Default> DerefMut for ScratchGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.buffer
    }
}

impl<T: Copy + Default> Drop for ScratchGuard<'_, T> {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buffer));
    }
}
