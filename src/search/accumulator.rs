//! Bounded max-heap of the best candidates seen so far.
//!
//! The accumulator stores only vector ids; distances live in the caller's
//! scratch array and are passed into every operation. The heap top is the
//! worst kept candidate, which makes it both the eviction victim and the
//! "kept limit" the search phases watch for change. The single nearest id is
//! tracked separately since a max-heap cannot answer that cheaply.
//!
//! Callers must have written a distance for an id before adding it.

use crate::heap::HeapOrder;

use super::UNMEASURED;

pub struct Accumulator {
    capacity: usize,
    ids: Vec<u32>,
    nearest: Option<u32>,
}

struct AccHeap<'a> {
    ids: &'a mut Vec<u32>,
    dist2: &'a [f32],
}

impl HeapOrder for AccHeap<'_> {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn smaller(&self, a: usize, b: usize) -> bool {
        let ia = self.ids[a];
        let ib = self.ids[b];
        let da = self.dist2[ia as usize];
        let db = self.dist2[ib as usize];
        if da < db {
            true
        } else if da > db {
            false
        } else {
            // Larger id on top; evicted first on equal distance.
            ia < ib
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.ids.swap(a, b);
    }
}

impl Accumulator {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1);
        Accumulator {
            capacity,
            ids: Vec::with_capacity(capacity),
            nearest: None,
        }
    }

    /// Offer a candidate whose distance is already in `dist2`.
    ///
    /// Returns the evicted id when the candidate displaced a kept one, `None`
    /// when it was absorbed below capacity or rejected as too far. Equal
    /// distances keep the smaller id.
    pub fn add(&mut self, id: u32, dist2: &[f32]) -> Option<u32> {
        let d = dist2[id as usize];
        assert!(
            d != UNMEASURED,
            "accumulator: distance for vector {id} not calculated"
        );
        if self.ids.len() < self.capacity {
            self.update_nearest(id, d, dist2);
            self.ids.push(id);
            let at = self.ids.len() - 1;
            AccHeap {
                ids: &mut self.ids,
                dist2,
            }
            .sift_up(at);
            return None;
        }
        let limit = self.ids[0];
        let limit_d = dist2[limit as usize];
        if d > limit_d || (d == limit_d && id > limit) {
            return None;
        }
        self.update_nearest(id, d, dist2);
        let evicted = self.ids[0];
        self.ids[0] = id;
        AccHeap {
            ids: &mut self.ids,
            dist2,
        }
        .sift_down(0);
        Some(evicted)
    }

    fn update_nearest(&mut self, id: u32, d: f32, dist2: &[f32]) {
        match self.nearest {
            None => self.nearest = Some(id),
            Some(best) => {
                let bd = dist2[best as usize];
                if d < bd || (d == bd && id < best) {
                    self.nearest = Some(id);
                }
            }
        }
    }

    pub fn nearest_id(&self) -> Option<u32> {
        self.nearest
    }

    pub fn nearest_distance2(&self, dist2: &[f32]) -> f32 {
        match self.nearest {
            Some(id) => dist2[id as usize],
            None => f32::INFINITY,
        }
    }

    /// Id of the worst kept candidate; the search is finished when a spread
    /// leaves this unchanged.
    pub fn limit_id(&self) -> Option<u32> {
        self.ids.first().copied()
    }

    /// Distance of the worst kept candidate, infinity below capacity so that
    /// nothing is rejected while slots remain.
    pub fn near_limit_distance2(&self, dist2: &[f32]) -> f32 {
        if self.ids.len() < self.capacity {
            f32::INFINITY
        } else {
            dist2[self.ids[0] as usize]
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id_at(&self, at: usize) -> u32 {
        self.ids[at]
    }

    /// Kept ids in heap order (only partially sorted).
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Drain the heap into `out`, ascending by distance, leaving the
    /// accumulator empty.
    pub fn remove_sorted(&mut self, dist2: &[f32], out: &mut Vec<u32>) {
        let n = self.ids.len();
        out.clear();
        out.resize(n, 0);
        for at in (0..n).rev() {
            out[at] = self.ids[0];
            let last = self.ids.len() - 1;
            self.ids.swap(0, last);
            self.ids.pop();
            AccHeap {
                ids: &mut self.ids,
                dist2,
            }
            .sift_down(0);
        }
        self.nearest = None;
    }

    pub fn reset(&mut self) {
        self.ids.clear();
        self.nearest = None;
    }
}
