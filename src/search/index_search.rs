//! Graph-guided nearest-neighbor search.

use smallvec::SmallVec;

use crate::error::{IndexError, Result};
use crate::index::Index;
use crate::store::VectorStore;
use crate::vecmath::distance2;

use super::accumulator::Accumulator;
use super::{Neighbor, SearchResult, UNMEASURED};

const SPREAD: u8 = 1;

/// Root of every search: the first vector created during the build, which is
/// maximally far from everything and therefore densely linked.
const ROOT: u32 = 0;

/// Reusable searcher over one index/vector-set pair.
///
/// Holds per-vector scratch sized to the index, so queries after the first
/// allocate nothing. Not thread-safe; use one instance per thread.
pub struct IndexSearch<'a, S> {
    index: &'a Index,
    data: &'a S,
    include_dups: bool,
    /// Ids written to `measured` by the current query, for cheap reset.
    measured_ids: Vec<u32>,
    measured: Vec<f32>,
    flags: Vec<u8>,
    acc: Accumulator,
    n_descends: u64,
    n_spreads: u64,
    n_descend_calcs: u64,
    n_spread_calcs: u64,
}

impl<'a, S: VectorStore> IndexSearch<'a, S> {
    /// `k` is the number of neighbors to return. With `include_dups` set,
    /// duplicates of kept neighbors are merged into the result at the end.
    pub fn new(index: &'a Index, data: &'a S, k: usize, include_dups: bool) -> Result<Self> {
        if k == 0 {
            return Err(IndexError::InvalidParameter(
                "neighbor count must be at least 1".into(),
            ));
        }
        if index.is_empty() {
            return Err(IndexError::InvalidParameter(
                "cannot search an empty index".into(),
            ));
        }
        if index.len() != data.len() || index.dims() != data.dims() {
            return Err(IndexError::Mismatch(format!(
                "index covers {} vectors of {}D but vector set has {} of {}D",
                index.len(),
                index.dims(),
                data.len(),
                data.dims()
            )));
        }
        let n = index.len();
        Ok(IndexSearch {
            index,
            data,
            include_dups,
            measured_ids: Vec::new(),
            measured: vec![UNMEASURED; n],
            flags: vec![0; n],
            acc: Accumulator::new(k),
            n_descends: 0,
            n_spreads: 0,
            n_descend_calcs: 0,
            n_spread_calcs: 0,
        })
    }

    /// Find the `k` nearest indexed vectors to `query`.
    pub fn search(&mut self, query: &[f32]) -> Result<SearchResult> {
        if query.len() != self.index.dims() {
            return Err(IndexError::DimensionMismatch {
                query: query.len(),
                index: self.index.dims(),
            });
        }
        self.start();
        self.step(query);
        if self.include_dups {
            self.add_dups()?;
        }
        Ok(self.done())
    }

    fn start(&mut self) {
        for &id in &self.measured_ids {
            self.measured[id as usize] = UNMEASURED;
            self.flags[id as usize] = 0;
        }
        self.measured_ids.clear();
        self.acc.reset();
        self.n_descends = 0;
        self.n_spreads = 0;
        self.n_descend_calcs = 0;
        self.n_spread_calcs = 0;
    }

    /// Measure a vector against the query and record the distance. Must be
    /// called before the id is offered to the accumulator.
    fn calc(&mut self, query: &[f32], id: u32, descending: bool) -> f32 {
        let d = distance2(query, self.data.vector(id));
        self.measured[id as usize] = d;
        self.measured_ids.push(id);
        if descending {
            self.n_descend_calcs += 1;
        } else {
            self.n_spread_calcs += 1;
        }
        d
    }

    /// Alternate descend and spread until a spread leaves the kept set
    /// unchanged. Descend runs while the nearest neighbor keeps improving;
    /// spread both finishes neighborhoods and kicks descend out of local
    /// minima.
    fn step(&mut self, query: &[f32]) {
        self.calc(query, ROOT, true);
        self.acc.add(ROOT, &self.measured);

        let mut nearest = None;
        let mut kept_limit = None;
        loop {
            if self.acc.nearest_distance2(&self.measured) == 0.0 {
                // The query is an indexed vector.
                self.bullseye();
                return;
            } else if nearest != self.acc.nearest_id() {
                nearest = self.acc.nearest_id();
                self.descend(query);
            } else {
                self.spread(query);
                if kept_limit == self.acc.limit_id() {
                    break;
                }
                kept_limit = self.acc.limit_id();
            }
        }
    }

    /// Follow links of the nearest known neighbor, longest first, hunting for
    /// a closer vector.
    fn descend(&mut self, query: &[f32]) {
        self.n_descends += 1;
        let Some(node) = self.acc.nearest_id() else {
            return;
        };
        let query_d2 = self.measured[node as usize];
        // Links longer than the current query distance rarely make progress.
        let max_link = query_d2;
        // If a link closes most of the gap at once, the distribution makes a
        // better one unlikely; stop following this node's links.
        let short_circuit = ((query_d2 as f64).sqrt() - 3.0).max(0.0);
        let short_circuit2 = (short_circuit * short_circuit) as f32;

        let index = self.index;
        let mut in_range = false;
        for link in index.links(node).iter().rev() {
            if link.dist2 > max_link {
                // Walking longest-to-shortest over a sorted record crosses
                // the cutoff at most once; a long link after a short one
                // means the record is out of order.
                debug_assert!(!in_range, "links of vector {node} are out of order");
                continue;
            }
            in_range = true;
            if link.dist2 == 0.0 {
                break; // remaining links are zero-length duplicate links
            }
            if self.measured[link.target as usize] == UNMEASURED {
                let d = self.calc(query, link.target, true);
                self.acc.add(link.target, &self.measured);
                if d < short_circuit2 {
                    break;
                }
            }
        }
    }

    /// Measure the unchecked short links of every kept neighbor, nearest
    /// first, until the kept set improves or everything has been spread.
    fn spread(&mut self, query: &[f32]) {
        self.n_spreads += 1;
        let kept_limit = self.acc.limit_id();
        let index = self.index;

        // Heap order only approximates distance order; iterating backwards
        // still visits nearer nodes sooner on average.
        for at in (0..self.acc.len()).rev() {
            let node = self.acc.id_at(at);
            if self.flags[node as usize] & SPREAD != 0 {
                continue;
            }
            let query_d2 = self.measured[node as usize];
            let mut limit2 = self.acc.near_limit_distance2(&self.measured);
            let mut max_link = 2.2 * limit2 - query_d2;

            for link in index.links(node) {
                if link.dist2 == 0.0 {
                    continue; // duplicate link
                }
                if link.dist2 > max_link {
                    break;
                }
                if self.measured[link.target as usize] == UNMEASURED {
                    self.calc(query, link.target, false);
                    if self.acc.add(link.target, &self.measured).is_some() {
                        // Kept set tightened; shrink the link cutoff.
                        limit2 = self.acc.near_limit_distance2(&self.measured);
                        max_link = 2.2 * limit2 - query_d2;
                    }
                }
            }
            self.flags[node as usize] |= SPREAD;

            if kept_limit != self.acc.limit_id() {
                return; // new near node found; step decides what is next
            }
        }
    }

    /// The query hit an indexed vector exactly: that node's link array
    /// already holds its neighborhood with exact distances, no calcs needed.
    fn bullseye(&mut self) {
        let Some(node) = self.acc.nearest_id() else {
            return;
        };
        let index = self.index;
        for link in index.links(node) {
            if link.dist2 == 0.0 {
                continue;
            }
            if link.dist2 > self.acc.near_limit_distance2(&self.measured) {
                break;
            }
            if self.measured[link.target as usize] == UNMEASURED {
                self.measured[link.target as usize] = link.dist2;
                self.measured_ids.push(link.target);
                self.acc.add(link.target, &self.measured);
            }
        }
    }

    /// Merge duplicates of kept neighbors into the result. A duplicate sits
    /// at exactly its original's distance, recorded without a calc.
    fn add_dups(&mut self) -> Result<()> {
        let kept: Vec<u32> = self.acc.ids().to_vec();
        let index = self.index;
        for &v in &kept {
            let query_d2 = self.measured[v as usize];
            let links = index.links(v);
            for link in links {
                // Zero-length duplicate links sort to the front.
                if link.dist2 > 0.0 {
                    break;
                }
                if self.measured[link.target as usize] == UNMEASURED {
                    self.measured[link.target as usize] = query_d2;
                    self.measured_ids.push(link.target);
                    self.acc.add(link.target, &self.measured);
                    if links.len() == 1 {
                        return Err(IndexError::Corrupt(format!(
                            "duplicate vector {v} kept as a search result"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn done(&mut self) -> SearchResult {
        let mut sorted = Vec::new();
        let (acc, measured) = (&mut self.acc, &self.measured);
        acc.remove_sorted(measured, &mut sorted);
        let neighbors: SmallVec<[Neighbor; 16]> = sorted
            .iter()
            .map(|&id| Neighbor {
                id,
                dist2: measured[id as usize],
            })
            .collect();
        SearchResult {
            neighbors,
            n_distance_calcs: self.n_descend_calcs + self.n_spread_calcs,
            n_descends: self.n_descends,
            n_spreads: self.n_spreads,
        }
    }
}
