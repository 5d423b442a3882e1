//! Exhaustive nearest-neighbor search, used as ground truth when measuring
//! graph-search recall and for sets too small to bother indexing.

use smallvec::SmallVec;

use crate::error::{IndexError, Result};
use crate::store::VectorStore;
use crate::vecmath::{distance2, vectors_are_dups};

use super::accumulator::Accumulator;
use super::{Neighbor, SearchResult, UNMEASURED};

pub struct BruteSearch<'a, S> {
    data: &'a S,
    include_dups: bool,
    measured: Vec<f32>,
    acc: Accumulator,
}

impl<'a, S: VectorStore> BruteSearch<'a, S> {
    pub fn new(data: &'a S, k: usize, include_dups: bool) -> Result<Self> {
        if k == 0 {
            return Err(IndexError::InvalidParameter(
                "neighbor count must be at least 1".into(),
            ));
        }
        Ok(BruteSearch {
            data,
            include_dups,
            measured: vec![UNMEASURED; data.len()],
            acc: Accumulator::new(k),
        })
    }

    /// Scan every vector. Without `include_dups`, a vector bitwise-equal to a
    /// kept candidate at the same distance is skipped, matching what the
    /// graph search returns for an index that separated its duplicates.
    pub fn search(&mut self, query: &[f32]) -> Result<SearchResult> {
        if query.len() != self.data.dims() {
            return Err(IndexError::DimensionMismatch {
                query: query.len(),
                index: self.data.dims(),
            });
        }
        self.measured.fill(UNMEASURED);
        self.acc.reset();

        for id in 0..self.data.len() as u32 {
            let d2 = distance2(query, self.data.vector(id));
            self.measured[id as usize] = d2;
            if self.include_dups {
                self.acc.add(id, &self.measured);
                continue;
            }
            if d2 > self.acc.near_limit_distance2(&self.measured) {
                continue;
            }
            let dup_of_kept = (0..self.acc.len()).any(|at| {
                let other = self.acc.id_at(at);
                d2 == self.measured[other as usize]
                    && vectors_are_dups(self.data.vector(id), self.data.vector(other))
            });
            if !dup_of_kept {
                self.acc.add(id, &self.measured);
            }
        }

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
        Ok(SearchResult {
            neighbors,
            n_distance_calcs: self.data.len() as u64,
            n_descends: 0,
            n_spreads: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::VectorSet;

    #[test]
    fn finds_the_true_neighbors() {
        let set =
            VectorSet::from_flat("grid", 2, vec![0.0, 0.0, 2.0, 0.0, 0.0, 2.0, 2.0, 2.0]).unwrap();
        let mut brute = BruteSearch::new(&set, 2, false).unwrap();
        let result = brute.search(&[0.4, 0.1]).unwrap();
        let ids: Vec<u32> = result.neighbors.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(result.n_distance_calcs, 4);
    }

    #[test]
    fn duplicate_handling_follows_the_flag() {
        let set = VectorSet::from_flat("dup", 1, vec![1.0, 1.0, 5.0]).unwrap();

        let mut without = BruteSearch::new(&set, 3, false).unwrap();
        let result = without.search(&[0.0]).unwrap();
        let ids: Vec<u32> = result.neighbors.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 2]);

        let mut with = BruteSearch::new(&set, 3, true).unwrap();
        let result = with.search(&[0.0]).unwrap();
        let ids: Vec<u32> = result.neighbors.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn rejects_wrong_query_dimension() {
        let set = VectorSet::from_flat("one", 2, vec![0.0, 0.0]).unwrap();
        let mut brute = BruteSearch::new(&set, 1, false).unwrap();
        assert!(matches!(
            brute.search(&[1.0]),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }
}
