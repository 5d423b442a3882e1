//! Deduplicating candidate collection for second-neighbor expansion.
//!
//! The same vector is usually reachable along several paths of the
//! neighborhood walk, so candidates are collected through a presence array
//! that keeps each id at most once while preserving insertion order.

pub struct NeighborSet {
    ids: Vec<u32>,
    in_use: Vec<bool>,
}

impl NeighborSet {
    pub fn new(n: usize) -> Self {
        NeighborSet {
            ids: Vec::new(),
            in_use: vec![false; n],
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn get(&self, at: usize) -> u32 {
        self.ids[at]
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Add an id unless it is already present.
    pub fn add(&mut self, id: u32) {
        if !self.in_use[id as usize] {
            self.in_use[id as usize] = true;
            self.ids.push(id);
        }
    }

    pub fn clear(&mut self) {
        for &id in &self.ids {
            self.in_use[id as usize] = false;
        }
        self.ids.clear();
    }

    /// Drop the first `n` collected ids, keeping the rest in insertion order.
    ///
    /// The walk collects first neighbors ahead of second neighbors in the same
    /// buffer; stripping the prefix leaves only the second-neighbor frontier.
    pub fn drop_first(&mut self, n: usize) {
        for &id in &self.ids[..n] {
            self.in_use[id as usize] = false;
        }
        self.ids.drain(..n);
    }
}
