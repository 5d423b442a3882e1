//! Query-time search over a built index.
//!
//! [`IndexSearch`] walks the proximity graph: descend steps follow long links
//! toward the query while the nearest known neighbor keeps improving, spread
//! steps fan out over the short links of all current candidates to finish the
//! neighborhood, and a bullseye copies a node's own link array when the query
//! turns out to be an indexed vector. [`BruteSearch`] scans the whole set and
//! serves as ground truth.
//!
//! Both searchers keep their scratch state between queries, so one instance
//! is reused for a query stream and is single-threaded; run one searcher per
//! thread to parallelize.

mod accumulator;
mod brute;
mod index_search;

use smallvec::SmallVec;

pub use accumulator::Accumulator;
pub use brute::BruteSearch;
pub use index_search::IndexSearch;

/// Sentinel in the per-vector distance scratch for "not measured yet".
/// Squared distances are never negative, so the value cannot collide.
pub(crate) const UNMEASURED: f32 = -1.0;

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: u32,
    pub dist2: f32,
}

/// Neighbors of one query, ascending by squared distance, plus work counters.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub neighbors: SmallVec<[Neighbor; 16]>,
    pub n_distance_calcs: u64,
    pub n_descends: u64,
    pub n_spreads: u64,
}

impl SearchResult {
    /// The single nearest neighbor, if any vector was found at all.
    pub fn nearest(&self) -> Option<Neighbor> {
        self.neighbors.first().copied()
    }
}
