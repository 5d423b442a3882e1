//! Binary max-heap sift routines over position-addressed storage.
//!
//! Three structures in this crate are the same heap in different clothing: the
//! create heap that picks the next node during construction, each vector's
//! bounded near-link heap, and the search accumulator. All keep the *largest*
//! element at position 0 and differ only in how elements are compared and
//! swapped. [`HeapOrder`] captures that seam once; each heap implements the
//! three primitive methods and inherits `sift_up`/`sift_down`.
//!
//! `smaller` must be a strict total order (ties broken deterministically, by
//! vector id everywhere in this crate) so heap contents are reproducible.

/// Comparison and swap primitives for a max-heap laid out in positions
/// `0..len()`.
pub trait HeapOrder {
    /// Number of elements currently in the heap.
    fn len(&self) -> usize;

    /// True when the element at position `a` orders strictly below the element
    /// at position `b`.
    fn smaller(&self, a: usize, b: usize) -> bool;

    /// Swap the elements at two positions.
    fn swap(&mut self, a: usize, b: usize);

    /// Restore the heap property upward from `at` after the element there may
    /// have grown.
    fn sift_up(&mut self, mut at: usize) {
        while at > 0 {
            let parent = (at - 1) / 2;
            if self.smaller(at, parent) {
                break;
            }
            self.swap(at, parent);
            at = parent;
        }
    }

    /// Restore the heap property downward from `at` after the element there
    /// may have shrunk.
    fn sift_down(&mut self, mut at: usize) {
        loop {
            let left = 2 * at + 1;
            if left >= self.len() {
                break;
            }
            let mut biggest = at;
            if self.smaller(biggest, left) {
                biggest = left;
            }
            let right = left + 1;
            if right < self.len() && self.smaller(biggest, right) {
                biggest = right;
            }
            if biggest == at {
                break;
            }
            self.swap(at, biggest);
            at = biggest;
        }
    }
}
