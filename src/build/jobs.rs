//! Worker pool for the distance scans of graph construction.
//!
//! Creating a node means measuring it against a candidate list that can run
//! into the millions, so the list is cut into fixed-size chunks and farmed out
//! over a channel to a pool of scoped worker threads. Each job carries a
//! one-shot reply channel; the builder submits every chunk of a create before
//! awaiting any of them, then merges results in submission order so the build
//! stays deterministic regardless of worker scheduling.
//!
//! Workers share two lock-free arrays with the builder: per-vector state flags
//! and the current near-link threshold of every vector. Both are read with
//! relaxed ordering. A worker racing a builder update may keep a pair the
//! builder would already reject, which only costs a little merge work; the
//! builder re-checks every pair against current thresholds before use.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::{IndexError, Result};
use crate::store::VectorStore;
use crate::vecmath::distance2;

/// Candidates scanned per job.
pub(crate) const CHUNK_SIZE: usize = 3072;

const JOB_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const NODE: u8 = 1;
const DUP: u8 = 2;

/// Per-vector state visible to both the builder and the distance workers.
pub struct SharedState {
    flags: Vec<AtomicU8>,
    near2: Vec<AtomicU32>,
}

impl SharedState {
    pub fn new(n: usize) -> Self {
        SharedState {
            flags: (0..n).map(|_| AtomicU8::new(0)).collect(),
            near2: (0..n)
                .map(|_| AtomicU32::new(f32::INFINITY.to_bits()))
                .collect(),
        }
    }

    pub fn is_node(&self, id: u32) -> bool {
        self.flags[id as usize].load(Ordering::Relaxed) & NODE != 0
    }

    pub fn is_dup(&self, id: u32) -> bool {
        self.flags[id as usize].load(Ordering::Relaxed) & DUP != 0
    }

    pub fn mark_node(&self, id: u32) {
        self.flags[id as usize].fetch_or(NODE, Ordering::Relaxed);
    }

    pub fn mark_dup(&self, id: u32) {
        self.flags[id as usize].fetch_or(DUP, Ordering::Relaxed);
    }

    /// Current near-link distance threshold of a vector. Infinity until the
    /// vector's near heap first fills.
    pub fn near2(&self, id: u32) -> f32 {
        f32::from_bits(self.near2[id as usize].load(Ordering::Relaxed))
    }

    pub fn set_near2(&self, id: u32, dist2: f32) {
        self.near2[id as usize].store(dist2.to_bits(), Ordering::Relaxed);
    }
}

struct DistanceJob {
    create: u32,
    /// Candidate list snapshot, or `None` to scan every vector id.
    candidates: Option<Arc<Vec<u32>>>,
    chunk: usize,
    reply: Sender<ChunkResult>,
}

pub struct ChunkResult {
    pub n_calcs: u64,
    pub pairs: Vec<(u32, f32)>,
}

/// Awaits the result of one submitted chunk.
pub struct JobHandle {
    rx: Receiver<ChunkResult>,
    create: u32,
    chunk: usize,
}

impl JobHandle {
    pub fn wait(self) -> Result<ChunkResult> {
        self.rx
            .recv_timeout(JOB_TIMEOUT)
            .map_err(|_| IndexError::JobTimeout {
                create: self.create,
                chunk: self.chunk,
                timeout_secs: JOB_TIMEOUT.as_secs(),
            })
    }
}

pub struct DistancePool {
    tx: Sender<DistanceJob>,
}

impl DistancePool {
    /// Spawn `n_workers` scoped workers. Workers exit when the pool is
    /// dropped and the job channel closes; the scope then joins them.
    pub fn start<'scope, 'env, S>(
        scope: &'scope thread::Scope<'scope, 'env>,
        data: &'env S,
        shared: &'env SharedState,
        n_workers: usize,
    ) -> Self
    where
        S: VectorStore + Sync,
    {
        let (tx, rx) = unbounded::<DistanceJob>();
        for _ in 0..n_workers {
            let rx = rx.clone();
            scope.spawn(move || {
                while let Ok(job) = rx.recv() {
                    let result = scan_chunk(data, shared, &job);
                    // The builder may have errored out and dropped the
                    // receiver; nothing to do with the result then.
                    let _ = job.reply.send(result);
                }
            });
        }
        DistancePool { tx }
    }

    pub fn submit(
        &self,
        create: u32,
        candidates: Option<Arc<Vec<u32>>>,
        chunk: usize,
    ) -> Result<JobHandle> {
        let (reply, rx) = bounded(1);
        self.tx
            .send(DistanceJob {
                create,
                candidates,
                chunk,
                reply,
            })
            .map_err(|_| IndexError::Corrupt("distance worker pool shut down".into()))?;
        Ok(JobHandle { rx, create, chunk })
    }
}

fn scan_chunk<S: VectorStore>(data: &S, shared: &SharedState, job: &DistanceJob) -> ChunkResult {
    let total = match &job.candidates {
        Some(c) => c.len(),
        None => data.len(),
    };
    let start = job.chunk * CHUNK_SIZE;
    let end = total.min(start + CHUNK_SIZE);
    let create_vec = data.vector(job.create);

    let mut n_calcs = 0u64;
    let mut pairs = Vec::new();
    for at in start..end {
        let cand = match &job.candidates {
            Some(c) => c[at],
            None => at as u32,
        };
        if shared.is_node(cand) {
            continue;
        }
        let d2 = distance2(create_vec, data.vector(cand));
        n_calcs += 1;
        // Keep exact matches (duplicates) and anything inside either
        // endpoint's current near threshold.
        if d2 == 0.0 || d2 < shared.near2(job.create) || d2 < shared.near2(cand) {
            pairs.push((cand, d2));
        }
    }
    ChunkResult { n_calcs, pairs }
}

/// Worker count leaving headroom for the builder thread itself.
pub fn default_workers() -> usize {
    let cores = thread::available_parallelism().map_or(1, |p| p.get());
    ((cores as f64 * 0.8).round() as usize).max(1)
}
