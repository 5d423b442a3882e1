//! The create heap: picks which vector becomes the next graph node.
//!
//! For every vector not yet turned into a node, the heap tracks the minimum
//! squared distance to any node created so far (infinity until a first
//! distance is known). The vector *furthest* from everything built so far sits
//! on top and is created next; this furthest-first order is what spreads long
//! links evenly through the graph.
//!
//! Construction is finished when the popped distance drops to exactly zero:
//! whatever remains in the heap at that point is a duplicate of an existing
//! node, not a missing region of the space.

use crate::heap::HeapOrder;

const NOT_IN_HEAP: u32 = u32::MAX;

pub struct CreateHeap {
    remaining: usize,
    heap_ids: Vec<u32>,
    pos_of: Vec<u32>,
    min_dist2: Vec<f32>,
}

impl CreateHeap {
    /// All `n` vectors start in the heap at minimum distance infinity.
    pub fn new(n: usize) -> Self {
        CreateHeap {
            remaining: n,
            heap_ids: (0..n as u32).collect(),
            pos_of: (0..n as u32).collect(),
            min_dist2: vec![f32::INFINITY; n],
        }
    }

    /// Pop the vector with the largest tracked minimum distance.
    ///
    /// Equal distances prefer the smaller id, making creation order fully
    /// deterministic. Returns `None` once the heap is empty; callers treat a
    /// popped distance of exactly zero as the end of construction even while
    /// entries remain.
    pub fn pop_furthest(&mut self) -> Option<(u32, f32)> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.heap_ids[0];
        let dist2 = self.min_dist2[id as usize];
        self.remaining -= 1;
        let last = self.remaining;
        self.swap(0, last);
        self.sift_down(0);
        self.pos_of[id as usize] = NOT_IN_HEAP;
        self.min_dist2[id as usize] = -1.0;
        Some((id, dist2))
    }

    /// Lower a vector's tracked minimum distance if the new value is smaller.
    ///
    /// No-op for vectors already popped or removed, and for values that do not
    /// improve the tracked minimum.
    pub fn update_min(&mut self, id: u32, dist2: f32) {
        let pos = self.pos_of[id as usize];
        if pos == NOT_IN_HEAP || dist2 >= self.min_dist2[id as usize] {
            return;
        }
        self.min_dist2[id as usize] = dist2;
        let pos = pos as usize;
        // A lowered key can only move down, but repairing both ways is safe.
        self.sift_up(pos);
        self.sift_down(self.pos_of[id as usize] as usize);
    }

    /// Extract a vector from the middle of the heap. Used when the vector
    /// turns out to be a duplicate and will never become a node.
    pub fn remove(&mut self, id: u32) {
        let pos = self.pos_of[id as usize];
        debug_assert_ne!(pos, NOT_IN_HEAP, "removing vector not in create heap");
        let pos = pos as usize;
        self.remaining -= 1;
        let last = self.remaining;
        self.swap(pos, last);
        if pos < self.remaining {
            self.sift_up(pos);
            self.sift_down(pos);
        }
        self.pos_of[id as usize] = NOT_IN_HEAP;
        self.min_dist2[id as usize] = -1.0;
    }
}

impl HeapOrder for CreateHeap {
    fn len(&self) -> usize {
        self.remaining
    }

    fn smaller(&self, a: usize, b: usize) -> bool {
        let ia = self.heap_ids[a];
        let ib = self.heap_ids[b];
        let da = self.min_dist2[ia as usize];
        let db = self.min_dist2[ib as usize];
        if da < db {
            true
        } else if da > db {
            false
        } else {
            // Smaller id pops first on equal distance.
            ia > ib
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap_ids.swap(a, b);
        self.pos_of[self.heap_ids[a] as usize] = a as u32;
        self.pos_of[self.heap_ids[b] as usize] = b as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_all_at_infinity_by_id() {
        let mut heap = CreateHeap::new(4);
        // All distances equal (infinity), so pops run in id order.
        for expected in 0..4u32 {
            let (id, d2) = heap.pop_furthest().unwrap();
            assert_eq!(id, expected);
            assert_eq!(d2, f32::INFINITY);
        }
        assert!(heap.pop_furthest().is_none());
    }

    #[test]
    fn pops_largest_min_distance_first() {
        let mut heap = CreateHeap::new(4);
        heap.update_min(0, 1.0);
        heap.update_min(1, 9.0);
        heap.update_min(2, 4.0);
        heap.update_min(3, 16.0);
        let order: Vec<u32> = std::iter::from_fn(|| heap.pop_furthest().map(|(id, _)| id))
            .collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
    }

    #[test]
    fn update_only_lowers() {
        let mut heap = CreateHeap::new(2);
        heap.update_min(0, 4.0);
        heap.update_min(1, 2.0);
        heap.update_min(0, 8.0); // ignored, 4.0 already tracked
        assert_eq!(heap.pop_furthest(), Some((0, 4.0)));
        assert_eq!(heap.pop_furthest(), Some((1, 2.0)));
    }

    #[test]
    fn update_after_pop_is_ignored() {
        let mut heap = CreateHeap::new(2);
        heap.update_min(0, 1.0);
        heap.update_min(1, 2.0);
        let (first, _) = heap.pop_furthest().unwrap();
        assert_eq!(first, 1);
        heap.update_min(1, 0.5);
        assert_eq!(heap.pop_furthest(), Some((0, 1.0)));
    }

    #[test]
    fn remove_from_middle() {
        let mut heap = CreateHeap::new(5);
        for (id, d2) in [(0, 5.0), (1, 4.0), (2, 3.0), (3, 2.0), (4, 1.0)] {
            heap.update_min(id, d2);
        }
        heap.remove(2);
        let order: Vec<u32> = std::iter::from_fn(|| heap.pop_furthest().map(|(id, _)| id))
            .collect();
        assert_eq!(order, vec![0, 1, 3, 4]);
    }

    #[test]
    fn equal_distances_prefer_smaller_id() {
        let mut heap = CreateHeap::new(3);
        heap.update_min(2, 7.0);
        heap.update_min(0, 7.0);
        heap.update_min(1, 7.0);
        let order: Vec<u32> = std::iter::from_fn(|| heap.pop_furthest().map(|(id, _)| id))
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
