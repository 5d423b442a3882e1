//! Incremental proximity-graph construction.
//!
//! Vectors become graph nodes one at a time in furthest-first order: the
//! create heap always yields the vector with the largest minimum distance to
//! any existing node. Creating a node measures it against a candidate list
//! (its second-neighborhood while the graph is dense enough to trust, the
//! whole set otherwise), updates the heap with the new minimums, and grows
//! near heaps and far lists on both endpoints of every useful pair. Distance
//! scans run chunked on a worker pool; everything else is single-threaded on
//! the builder.
//!
//! Exact-duplicate vectors never become real nodes. They are flagged as soon
//! as a zero distance or a bitwise-equal pair surfaces, stripped out of all
//! link state, and finalized as a single zero-length link to the vector they
//! duplicate.
//!
//! Finalization freezes every vector's near heap, pushes all kept links
//! through a chain store in both directions, then dedups and sorts each
//! vector's merged links ascending by distance.

mod chain;
mod create_heap;
mod jobs;
mod link_vector;
mod neighbor_set;

use std::cell::Cell;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{IndexError, Result};
use crate::index::{Index, Link};
use crate::store::VectorStore;

use chain::LinkChainStore;
use create_heap::CreateHeap;
use jobs::{default_workers, DistancePool, JobHandle, SharedState, CHUNK_SIZE};
use link_vector::{HeapCx, LinkVector};
use neighbor_set::NeighborSet;

/// Creates between recomputations of the average near threshold.
const AVG_RECALC_STEP: usize = 64;

/// Build a proximity-graph index over a vector set, keeping up to `n_near`
/// near links per vector.
pub fn build_index<S: VectorStore + Sync>(data: &S, n_near: usize) -> Result<Index> {
    if n_near == 0 {
        return Err(IndexError::InvalidParameter(
            "near link capacity must be at least 1".into(),
        ));
    }
    if data.is_empty() {
        return Err(IndexError::InvalidParameter(
            "cannot index an empty vector set".into(),
        ));
    }

    let started = Instant::now();
    let n = data.len();
    let shared = SharedState::new(n);
    let mut builder = Builder::new(data, &shared, n_near);
    info!(
        name = %data.name(),
        n,
        dims = data.dims(),
        n_near,
        "building index"
    );

    thread::scope(|scope| -> Result<()> {
        let pool = DistancePool::start(scope, data, &shared, default_workers());
        while let Some((create, dist2)) = builder.create_heap.pop_furthest() {
            // A zero create distance means everything left is a duplicate of
            // some existing node; construction is over.
            if dist2 == 0.0 {
                break;
            }
            builder.create_links(create, &pool)?;
            builder.created += 1;
            if builder.created % AVG_RECALC_STEP == 0 {
                builder.recalc_avg();
                debug!(
                    created = builder.created,
                    create_dist2 = dist2,
                    avg_near2 = builder.avg_near2,
                    calcs = builder.n_calcs,
                    "progress"
                );
            }
        }
        Ok(())
    })?;

    builder.finalize(started.elapsed())
}

struct Builder<'a, S> {
    data: &'a S,
    shared: &'a SharedState,
    n_near: usize,
    links: Vec<LinkVector>,
    create_heap: CreateHeap,
    neighbors: NeighborSet,
    dups: Vec<(u32, u32)>,
    pending: Cell<Option<(u32, u32)>>,
    created: usize,
    n_calcs: u64,
    n_useful: u64,
    links_kept: u64,
    avg_near2: f32,
    /// Above this average near threshold the second-neighborhood is too
    /// sparse to trust and creates fall back to scanning the whole set.
    shortcut2: f32,
}

impl<'a, S: VectorStore + Sync> Builder<'a, S> {
    fn new(data: &'a S, shared: &'a SharedState, n_near: usize) -> Self {
        let n = data.len();
        Builder {
            data,
            shared,
            n_near,
            links: (0..n as u32).map(LinkVector::new).collect(),
            create_heap: CreateHeap::new(n),
            neighbors: NeighborSet::new(n),
            dups: Vec::new(),
            pending: Cell::new(None),
            created: 0,
            n_calcs: 0,
            n_useful: 0,
            links_kept: 0,
            avg_near2: f32::INFINITY,
            shortcut2: 1.5 * data.dims() as f32,
        }
    }

    /// Turn `create` into a node: freeze its far links, scan candidates on
    /// the pool, and merge the surviving pairs into both endpoints.
    fn create_links(&mut self, create: u32, pool: &DistancePool) -> Result<()> {
        if self.shared.is_node(create) {
            return Err(IndexError::Corrupt(format!(
                "vector {create} created twice"
            )));
        }
        self.shared.mark_node(create);
        let cx = HeapCx {
            data: self.data,
            shared: self.shared,
            pending_dup: &self.pending,
        };
        self.links_kept += self.links[create as usize].keep_links(true, &cx) as u64;

        let candidates = if self.avg_near2 > self.shortcut2 {
            None
        } else {
            self.collect_second_neighbors(create);
            Some(Arc::new(self.neighbors.ids().to_vec()))
        };
        let total = match &candidates {
            Some(c) => c.len(),
            None => self.data.len(),
        };
        let mut handles: Vec<JobHandle> = Vec::with_capacity(total.div_ceil(CHUNK_SIZE));
        for chunk in 0..total.div_ceil(CHUNK_SIZE) {
            handles.push(pool.submit(create, candidates.clone(), chunk)?);
        }
        // Duplicate pairs probed while freezing and collecting above refer to
        // link targets, not to this create; they get rediscovered on their
        // own create. Only pairs found from here on are resolved below.
        self.pending.set(None);

        // Merge in submission order for a deterministic build.
        for handle in handles {
            let result = handle.wait()?;
            self.n_calcs += result.n_calcs;
            for (cand, d2) in result.pairs {
                if d2 == 0.0 {
                    // The candidate snapshot can hold a vector flagged as a
                    // duplicate by an earlier pair of this same merge.
                    if !self.shared.is_dup(cand) {
                        self.n_useful += 1;
                        self.handle_dup(cand, create)?;
                    }
                    continue;
                }
                // Thresholds move as the merge proceeds; re-check both sides
                // against their current values.
                let near_create = d2 < self.shared.near2(create);
                let near_cand = d2 < self.shared.near2(cand);
                if !near_create && !near_cand {
                    continue;
                }
                self.n_useful += 1;
                self.create_heap.update_min(cand, d2);
                let cx = HeapCx {
                    data: self.data,
                    shared: self.shared,
                    pending_dup: &self.pending,
                };
                let (lv, lc) = two_mut(&mut self.links, create as usize, cand as usize);
                if near_create {
                    lv.add_to_heap(cand, d2, &cx, self.n_near);
                } else {
                    lv.add_to_list(cand, d2);
                }
                if near_cand {
                    lc.add_to_heap(create, d2, &cx, self.n_near);
                } else {
                    lc.add_to_list(create, d2);
                }
            }
        }

        if let Some((a, b)) = self.pending.take() {
            if self.shared.is_dup(a) || self.shared.is_dup(b) {
                return Err(IndexError::Corrupt(format!(
                    "duplicate pair ({a}, {b}) rediscovered after resolution"
                )));
            } else if !self.shared.is_node(a) {
                self.handle_dup(a, b)?;
            } else if !self.shared.is_node(b) {
                self.handle_dup(b, a)?;
            }
        }
        Ok(())
    }

    /// Collect the creating vector's neighbors and their neighbors, then drop
    /// the first ring so only the second-neighbor frontier remains as the
    /// candidate list.
    fn collect_second_neighbors(&mut self, create: u32) {
        let shared = self.shared;
        let cx = HeapCx {
            data: self.data,
            shared,
            pending_dup: &self.pending,
        };
        let links = &mut self.links;
        let set = &mut self.neighbors;

        set.clear();
        set.add(create);
        links[create as usize].collect_near_neighbors(set, &cx);
        let n_near_ring = set.len();
        links[create as usize].collect_near_other_neighbors(set, shared);
        let n_first_ring = set.len();

        for at in 1..n_first_ring {
            let first = set.get(at);
            links[first as usize].collect_near_neighbors(set, &cx);
            if at < n_near_ring {
                links[first as usize].collect_near_other_neighbors(set, shared);
            }
        }
        set.drop_first(n_first_ring);
    }

    /// Record `dup` as a duplicate of `dup_of` and retire it from the build.
    fn handle_dup(&mut self, dup: u32, dup_of: u32) -> Result<()> {
        // Given (A dup of B) when (B dup of C) is known, record (A dup of C).
        let mut resolved = dup_of;
        if self.shared.is_dup(resolved) {
            for &(d, of) in &self.dups {
                if d == dup_of {
                    resolved = of;
                    break;
                }
            }
        }
        // Given (B dup of C) when (A dup of B) is known, rewrite to (A dup of C).
        for entry in &mut self.dups {
            if entry.1 == dup {
                entry.1 = dup_of;
            }
        }
        if self.shared.is_node(dup) {
            return Err(IndexError::Corrupt(format!(
                "existing node {dup} found to be a duplicate"
            )));
        }
        self.dups.push((dup, resolved));
        self.shared.mark_node(dup);
        self.shared.mark_dup(dup);
        self.links[dup as usize].purge(self.shared);
        self.create_heap.remove(dup);
        Ok(())
    }

    fn recalc_avg(&mut self) {
        let mut sum = 0.0f64;
        let mut count = 0u64;
        for id in 0..self.data.len() as u32 {
            if !self.shared.is_node(id) {
                sum += self.shared.near2(id) as f64;
                count += 1;
            }
        }
        self.avg_near2 = (sum / (count + 1) as f64) as f32;
    }

    /// Freeze near links, mirror everything through the chain store, and
    /// produce the final per-vector sorted link arrays.
    fn finalize(mut self, elapsed: Duration) -> Result<Index> {
        let n = self.data.len();
        if self.created + self.dups.len() != n {
            return Err(IndexError::Corrupt(format!(
                "lost {} vectors during construction",
                n - self.created - self.dups.len()
            )));
        }

        let cx = HeapCx {
            data: self.data,
            shared: self.shared,
            pending_dup: &self.pending,
        };
        for at in 0..n {
            if self.links[at].has_far() {
                self.links_kept += self.links[at].keep_links(false, &cx) as u64;
            }
        }

        let mut chain = LinkChainStore::new(n, (2.2 * self.links_kept as f64) as u64);
        for at in 0..n as u32 {
            let lv = &mut self.links[at as usize];
            if !lv.has_far() {
                // Duplicates carry no graph links.
                if lv.take_near().is_some() {
                    return Err(IndexError::Corrupt(format!(
                        "near and far links inconsistent for vector {at}"
                    )));
                }
                continue;
            }
            let far = lv.take_far();
            let near = lv.take_near().ok_or_else(|| {
                IndexError::Corrupt(format!("near and far links inconsistent for vector {at}"))
            })?;
            for link in far.iter().chain(near.iter()) {
                // A target can have been flagged a duplicate after this
                // vector froze its far set.
                if self.shared.is_dup(link.target) {
                    continue;
                }
                chain.append(at, link.target, link.dist2);
                chain.append(link.target, at, link.dist2);
            }
        }

        for &(dup, dup_of) in &self.dups {
            if chain.chain_len(dup) > 0 {
                return Err(IndexError::Corrupt(format!(
                    "duplicate vector {dup} has graph links"
                )));
            }
            chain.append(dup, dup_of, 0.0);
            chain.append(dup_of, dup, 0.0);
        }

        // Dedup (first link to a target wins) and sort each vector's links.
        let mut links = Vec::with_capacity(n);
        let mut scratch: Vec<(u32, f32)> = Vec::new();
        let mut seen = vec![false; n];
        for at in 0..n as u32 {
            chain.read_links(at, &mut scratch);
            let mut record: Vec<Link> = Vec::with_capacity(scratch.len());
            for &(target, dist2) in &scratch {
                if !seen[target as usize] {
                    seen[target as usize] = true;
                    record.push(Link { target, dist2 });
                }
            }
            for link in &record {
                seen[link.target as usize] = false;
            }
            record.sort_by(|a, b| {
                a.dist2
                    .total_cmp(&b.dist2)
                    .then_with(|| a.target.cmp(&b.target))
            });
            links.push(record);
        }

        let total_links: u64 = links.iter().map(|l| l.len() as u64).sum();
        info!(
            name = %self.data.name(),
            nodes = self.created,
            dups = self.dups.len(),
            calcs = self.n_calcs,
            useful = self.n_useful,
            links = total_links,
            elapsed_ms = elapsed.as_millis() as u64,
            "index built"
        );
        Ok(Index::new(
            self.data.name().to_string(),
            self.data.dims(),
            self.n_near,
            elapsed.as_millis() as u64,
            links,
        ))
    }
}

fn two_mut<T>(slice: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = slice.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = slice.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::VectorSet;

    #[test]
    fn rejects_bad_parameters() {
        let set = VectorSet::from_flat("one", 1, vec![1.0]).unwrap();
        assert!(matches!(
            build_index(&set, 0),
            Err(IndexError::InvalidParameter(_))
        ));
        let empty = VectorSet::from_flat("empty", 2, vec![]).unwrap();
        assert!(matches!(
            build_index(&empty, 2),
            Err(IndexError::InvalidParameter(_))
        ));
    }

    #[test]
    fn single_vector_index() {
        let set = VectorSet::from_flat("one", 2, vec![3.0, 4.0]).unwrap();
        let index = build_index(&set, 2).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.links(0).is_empty());
    }

    #[test]
    fn links_are_symmetric_and_sorted() {
        let data: Vec<f32> = (0..40).map(|i| (i as f32 * 0.73).sin() * 10.0).collect();
        let set = VectorSet::from_flat("wave", 2, data).unwrap();
        let index = build_index(&set, 3).unwrap();

        for v in 0..index.len() as u32 {
            let links = index.links(v);
            assert!(!links.is_empty());
            let mut prev = 0.0f32;
            for link in links {
                assert!(link.dist2 >= prev);
                prev = link.dist2;
                assert!(
                    index.links(link.target).iter().any(|l| l.target == v),
                    "link {v} -> {} has no reverse",
                    link.target
                );
            }
        }
    }

    #[test]
    fn two_mut_returns_disjoint() {
        let mut v = vec![10, 20, 30];
        let (a, b) = two_mut(&mut v, 2, 0);
        assert_eq!((*a, *b), (30, 10));
        *a = 1;
        *b = 2;
        assert_eq!(v, vec![2, 20, 1]);
    }
}
