//! Recall measurement: graph search against brute-force ground truth, plus
//! seeded synthetic vector sets to run it on.

use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::dataset::VectorSet;
use crate::error::{IndexError, Result};
use crate::index::Index;
use crate::search::{BruteSearch, IndexSearch};
use crate::store::VectorStore;

/// Uniform random vectors in the unit cube, reproducible from the seed.
pub fn generate_uniform(name: &str, n: usize, dims: usize, seed: u64) -> Result<VectorSet> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..n * dims).map(|_| rng.random::<f32>()).collect();
    VectorSet::from_flat(name, dims, data)
}

/// Vectors scattered around `n_clusters` random centers in the unit cube,
/// each coordinate jittered by up to `spread / 2`.
pub fn generate_clustered(
    name: &str,
    n: usize,
    dims: usize,
    n_clusters: usize,
    spread: f32,
    seed: u64,
) -> Result<VectorSet> {
    if n_clusters == 0 {
        return Err(IndexError::InvalidParameter(
            "cluster count must be at least 1".into(),
        ));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let centers: Vec<f32> = (0..n_clusters * dims).map(|_| rng.random::<f32>()).collect();
    let mut data = Vec::with_capacity(n * dims);
    for at in 0..n {
        let center = &centers[(at % n_clusters) * dims..][..dims];
        for &c in center {
            data.push(c + spread * (rng.random::<f32>() - 0.5));
        }
    }
    VectorSet::from_flat(name, dims, data)
}

/// Quality and cost of graph search relative to brute force over one query set.
#[derive(Debug, Clone, Copy)]
pub struct EvalReport {
    pub n_queries: usize,
    /// Fraction of queries whose top hit is as close as the true nearest.
    pub nearest_match_rate: f64,
    /// Fraction of true k-nearest found, averaged over queries. A returned
    /// neighbor counts when it is no further than the true k-th neighbor, so
    /// distance ties do not hurt.
    pub recall_at_k: f64,
    pub avg_index_calcs: f64,
    pub avg_brute_calcs: f64,
}

#[derive(Default)]
struct Tally {
    nearest_matches: u64,
    recall_sum: f64,
    index_calcs: u64,
    brute_calcs: u64,
}

/// Run every query through both searchers and compare. Queries are split
/// into contiguous ranges, one searcher pair per thread.
pub fn evaluate<S, Q>(index: &Index, data: &S, queries: &Q, k: usize) -> Result<EvalReport>
where
    S: VectorStore + Sync,
    Q: VectorStore + Sync,
{
    if queries.dims() != index.dims() {
        return Err(IndexError::Mismatch(format!(
            "queries are {}D but index is {}D",
            queries.dims(),
            index.dims()
        )));
    }
    if queries.is_empty() {
        return Err(IndexError::InvalidParameter("no queries to evaluate".into()));
    }

    let n_queries = queries.len();
    let cores = thread::available_parallelism().map_or(1, |p| p.get());
    let n_threads = cores
        .saturating_sub(2)
        .min((cores as f64 * 0.8) as usize)
        .max(1)
        .min(n_queries);
    let per_thread = n_queries.div_ceil(n_threads);

    let tally = thread::scope(|scope| -> Result<Tally> {
        let mut handles = Vec::with_capacity(n_threads);
        for t in 0..n_threads {
            let start = t * per_thread;
            let end = n_queries.min(start + per_thread);
            handles.push(scope.spawn(move || -> Result<Tally> {
                let mut searcher = IndexSearch::new(index, data, k, false)?;
                let mut brute = BruteSearch::new(data, k, false)?;
                let mut tally = Tally::default();
                for q in start..end {
                    let query = queries.vector(q as u32);
                    let got = searcher.search(query)?;
                    let truth = brute.search(query)?;
                    tally.index_calcs += got.n_distance_calcs;
                    tally.brute_calcs += truth.n_distance_calcs;

                    let (Some(got_nearest), Some(true_nearest)) =
                        (got.nearest(), truth.nearest())
                    else {
                        continue;
                    };
                    if got_nearest.dist2 <= true_nearest.dist2 {
                        tally.nearest_matches += 1;
                    }
                    let kth = truth.neighbors[truth.neighbors.len() - 1].dist2;
                    let found = got.neighbors.iter().filter(|n| n.dist2 <= kth).count();
                    tally.recall_sum += found.min(truth.neighbors.len()) as f64
                        / truth.neighbors.len() as f64;
                }
                Ok(tally)
            }));
        }
        let mut total = Tally::default();
        for handle in handles {
            let tally = match handle.join() {
                Ok(result) => result?,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            total.nearest_matches += tally.nearest_matches;
            total.recall_sum += tally.recall_sum;
            total.index_calcs += tally.index_calcs;
            total.brute_calcs += tally.brute_calcs;
        }
        Ok(total)
    })?;

    let report = EvalReport {
        n_queries,
        nearest_match_rate: tally.nearest_matches as f64 / n_queries as f64,
        recall_at_k: tally.recall_sum / n_queries as f64,
        avg_index_calcs: tally.index_calcs as f64 / n_queries as f64,
        avg_brute_calcs: tally.brute_calcs as f64 / n_queries as f64,
    };
    info!(
        n_queries,
        nearest_match_rate = report.nearest_match_rate,
        recall_at_k = report.recall_at_k,
        avg_index_calcs = report.avg_index_calcs,
        avg_brute_calcs = report.avg_brute_calcs,
        "evaluated index"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_index;

    #[test]
    fn generators_are_seed_deterministic() {
        let a = generate_uniform("u", 20, 4, 7).unwrap();
        let b = generate_uniform("u", 20, 4, 7).unwrap();
        let c = generate_uniform("u", 20, 4, 8).unwrap();
        assert_eq!(a.vector(13), b.vector(13));
        assert_ne!(a.vector(13), c.vector(13));

        let d = generate_clustered("c", 30, 3, 5, 0.1, 1).unwrap();
        assert_eq!(d.len(), 30);
        assert_eq!(d.dims(), 3);
    }

    #[test]
    fn evaluation_of_a_small_index() {
        let data = generate_uniform("eval", 150, 6, 42).unwrap();
        let index = build_index(&data, 8).unwrap();
        let queries = generate_uniform("q", 25, 6, 43).unwrap();

        let report = evaluate(&index, &data, &queries, 5).unwrap();
        assert_eq!(report.n_queries, 25);
        assert!(report.recall_at_k > 0.5);
        assert!(report.avg_brute_calcs == 150.0);
    }

    #[test]
    fn rejects_mismatched_queries() {
        let data = generate_uniform("d", 30, 4, 1).unwrap();
        let index = build_index(&data, 3).unwrap();
        let queries = generate_uniform("q", 5, 3, 2).unwrap();
        assert!(matches!(
            evaluate(&index, &data, &queries, 3),
            Err(IndexError::Mismatch(_))
        ));
    }
}
