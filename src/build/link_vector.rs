//! Per-vector link state while the graph is under construction.
//!
//! Each vector carries a bounded max-heap of its nearest links (the near
//! heap, capacity `n_near`) plus an unbounded list of further links that were
//! close enough to matter when first seen. When the vector becomes a node the
//! heap contents are frozen into its far set; when construction finishes,
//! whatever the near heap holds at that point becomes the near set. The list
//! is working state for second-neighbor expansion and never persists.
//!
//! The near heap's comparison doubles as the duplicate detector: two links at
//! exactly equal distance get their target vectors compared bitwise, and a
//! match is parked in the shared pending-duplicate cell for the builder to
//! resolve after the current merge step.

use std::cell::Cell;

use crate::heap::HeapOrder;
use crate::index::Link;
use crate::store::VectorStore;
use crate::vecmath::vectors_are_dups;

use super::jobs::SharedState;
use super::neighbor_set::NeighborSet;

/// Context threaded through heap operations: vector data for duplicate
/// probing and the cell where a found duplicate pair is parked.
pub struct HeapCx<'a, S> {
    pub data: &'a S,
    pub shared: &'a SharedState,
    pub pending_dup: &'a Cell<Option<(u32, u32)>>,
}

pub struct LinkVector {
    id: u32,
    heap: Vec<Link>,
    list: Vec<Link>,
    far: Option<Vec<Link>>,
    near: Option<Vec<Link>>,
}

/// Max-heap view over the near links. Ties compare the underlying vectors,
/// which is where duplicate pairs surface.
struct NearHeap<'a, 'b, S> {
    heap: &'a mut Vec<Link>,
    cx: &'a HeapCx<'b, S>,
}

impl<S: VectorStore> HeapOrder for NearHeap<'_, '_, S> {
    fn len(&self) -> usize {
        self.heap.len()
    }

    fn smaller(&self, a: usize, b: usize) -> bool {
        let la = self.heap[a];
        let lb = self.heap[b];
        if la.dist2 < lb.dist2 {
            return true;
        }
        if la.dist2 > lb.dist2 {
            return false;
        }
        if self.cx.pending_dup.get().is_none()
            && la.target != lb.target
            && vectors_are_dups(
                self.cx.data.vector(la.target),
                self.cx.data.vector(lb.target),
            )
        {
            self.cx.pending_dup.set(Some((la.target, lb.target)));
        }
        // Larger id sits on top and is evicted first.
        la.target < lb.target
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
    }
}

impl LinkVector {
    pub fn new(id: u32) -> Self {
        LinkVector {
            id,
            heap: Vec::new(),
            list: Vec::new(),
            far: None,
            near: None,
        }
    }

    /// Offer a link for the near heap.
    ///
    /// Below capacity the link is simply inserted. At capacity the heap top
    /// (the current worst near link) is replaced, and the shared near
    /// threshold is updated to the new worst. A replaced link is demoted to
    /// the far list rather than lost, but only when the incoming distance is
    /// still within the *other* endpoint's threshold; otherwise the other
    /// side already dropped interest in the pair and the old link is stale.
    pub fn add_to_heap<S: VectorStore>(
        &mut self,
        other: u32,
        dist2: f32,
        cx: &HeapCx<'_, S>,
        n_near: usize,
    ) {
        let link = Link {
            target: other,
            dist2,
        };
        if self.heap.len() < n_near {
            self.heap.push(link);
            let mut heap = NearHeap {
                heap: &mut self.heap,
                cx,
            };
            let at = heap.len() - 1;
            heap.sift_up(at);
            if self.heap.len() == n_near {
                cx.shared.set_near2(self.id, self.heap[0].dist2);
            }
            return;
        }
        let replaced = self.heap[0];
        self.heap[0] = link;
        NearHeap {
            heap: &mut self.heap,
            cx,
        }
        .sift_down(0);
        cx.shared.set_near2(self.id, self.heap[0].dist2);
        if dist2 <= cx.shared.near2(other) {
            self.list.push(replaced);
        }
    }

    pub fn add_to_list(&mut self, other: u32, dist2: f32) {
        self.list.push(Link {
            target: other,
            dist2,
        });
    }

    fn remove_heap_at<S: VectorStore>(&mut self, at: usize, cx: &HeapCx<'_, S>) {
        let last = self.heap.len() - 1;
        self.heap.swap(at, last);
        self.heap.pop();
        if at < self.heap.len() {
            let mut heap = NearHeap {
                heap: &mut self.heap,
                cx,
            };
            heap.sift_up(at);
            heap.sift_down(at);
        }
        if at == 0 && !self.heap.is_empty() {
            cx.shared.set_near2(self.id, self.heap[0].dist2);
        }
    }

    /// Collect the near-heap targets into `set`, dropping links to vectors
    /// since flagged as duplicates.
    pub fn collect_near_neighbors<S: VectorStore>(
        &mut self,
        set: &mut NeighborSet,
        cx: &HeapCx<'_, S>,
    ) {
        let mut at = self.heap.len();
        while at > 0 {
            at -= 1;
            let target = self.heap[at].target;
            if cx.shared.is_dup(target) {
                self.remove_heap_at(at, cx);
            } else {
                set.add(target);
            }
        }
    }

    /// Collect the far-list targets into `set`, pruning entries whose target
    /// no longer wants the link or turned out to be a duplicate.
    pub fn collect_near_other_neighbors(&mut self, set: &mut NeighborSet, shared: &SharedState) {
        let mut at = self.list.len();
        while at > 0 {
            at -= 1;
            let link = self.list[at];
            if link.dist2 > shared.near2(link.target) || shared.is_dup(link.target) {
                self.list.swap_remove(at);
            } else {
                set.add(link.target);
            }
        }
    }

    /// Freeze the heap contents. With `far` set this snapshots the heap as
    /// the far set while leaving it live, since the vector keeps collecting
    /// near links as later nodes are created. Without it the heap is drained
    /// into the near set. Links to duplicate vectors are dropped either way.
    /// Returns the number of links kept.
    ///
    /// The list is never part of a snapshot: demoted and one-sided links only
    /// feed second-neighbor expansion, and the pairs worth persisting reach
    /// the index through the other endpoint's heap.
    pub fn keep_links<S: VectorStore>(&mut self, far: bool, cx: &HeapCx<'_, S>) -> usize {
        let mut at = self.heap.len();
        while at > 0 {
            at -= 1;
            if cx.shared.is_dup(self.heap[at].target) {
                self.remove_heap_at(at, cx);
            }
        }
        if far {
            let kept = self.heap.clone();
            let n = kept.len();
            self.far = Some(kept);
            n
        } else {
            let kept = std::mem::take(&mut self.heap);
            self.list.clear();
            let n = kept.len();
            self.near = Some(kept);
            n
        }
    }

    /// Discard all link state; used when the vector is flagged a duplicate.
    /// The zeroed threshold makes every worker reject future pairs for it.
    pub fn purge(&mut self, shared: &SharedState) {
        self.heap.clear();
        self.list.clear();
        shared.set_near2(self.id, 0.0);
    }

    pub fn has_far(&self) -> bool {
        self.far.is_some()
    }

    pub fn take_far(&mut self) -> Vec<Link> {
        self.far.take().unwrap_or_default()
    }

    pub fn take_near(&mut self) -> Option<Vec<Link>> {
        self.near.take()
    }
}
