//! The finalized index artifact: per-vector sorted link arrays.
//!
//! For every vector id the index holds an array of [`Link`]s sorted ascending
//! by squared distance. The first `n_near` entries are the short links used by
//! the spread phase of search; anything beyond them are long links used by
//! descend. Links are symmetric: if A links to B at distance d, B links to A at
//! distance d. A duplicate vector is recognizable by having exactly one link of
//! distance zero, pointing at the real vector it duplicates.
//!
//! File layout (big-endian):
//!
//! ```text
//! [8B unused = -1][4B NDims][4B NVectors][2B NameLen][name UTF-8]
//! [4B IndexNNear][8B IndexingTimeMillis][NVectors x 4B unused][NVectors x 4B unused]
//! then NVectors records of:
//! [4B NLinks][NLinks x 4B target ids][NLinks x 4B distance2 floats]
//! ```
//!
//! An index file only makes sense next to the vector set it was built from, so
//! [`Index::load`] cross-checks dims, vector count, and set name and refuses to
//! open a mismatched pair. Link records are validated ascending on load; a
//! violation means the file is damaged.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tracing::info;

use crate::dataset::{read_short_string, write_short_string};
use crate::error::{IndexError, Result};
use crate::store::VectorStore;

/// One graph edge: the vector at the other end and the squared distance to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    pub target: u32,
    pub dist2: f32,
}

/// A finalized proximity-graph index over a vector set.
#[derive(Debug, Clone)]
pub struct Index {
    name: String,
    dims: usize,
    n_near: usize,
    indexing_time_ms: u64,
    links: Vec<Vec<Link>>,
}

impl Index {
    pub(crate) fn new(
        name: String,
        dims: usize,
        n_near: usize,
        indexing_time_ms: u64,
        links: Vec<Vec<Link>>,
    ) -> Self {
        Index {
            name,
            dims,
            n_near,
            indexing_time_ms,
            links,
        }
    }

    /// Name of the vector set this index was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dimension of the indexed vectors.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True when the index covers no vectors.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Near-link capacity the index was built with.
    pub fn n_near(&self) -> usize {
        self.n_near
    }

    /// Wall-clock construction time recorded at build.
    pub fn indexing_time_ms(&self) -> u64 {
        self.indexing_time_ms
    }

    /// Links for a vector, sorted ascending by squared distance.
    pub fn links(&self, id: u32) -> &[Link] {
        &self.links[id as usize]
    }

    /// True when the vector is a duplicate of another indexed vector.
    pub fn is_dup(&self, id: u32) -> bool {
        let links = self.links(id);
        links.len() == 1 && links[0].dist2 == 0.0
    }

    /// Total number of stored links across all vectors.
    pub fn total_links(&self) -> u64 {
        self.links.iter().map(|l| l.len() as u64).sum()
    }

    /// Write the index in the binary index format.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_i64::<BigEndian>(-1)?;
        w.write_u32::<BigEndian>(self.dims as u32)?;
        w.write_u32::<BigEndian>(self.links.len() as u32)?;
        write_short_string(&mut w, &self.name)?;
        w.write_u32::<BigEndian>(self.n_near as u32)?;
        w.write_u64::<BigEndian>(self.indexing_time_ms)?;
        for _ in 0..2 * self.links.len() {
            w.write_u32::<BigEndian>(0)?;
        }
        for links in &self.links {
            w.write_u32::<BigEndian>(links.len() as u32)?;
            for link in links {
                w.write_u32::<BigEndian>(link.target)?;
            }
            for link in links {
                w.write_f32::<BigEndian>(link.dist2)?;
            }
        }
        w.flush()?;
        info!(name = %self.name, n = self.links.len(), links = self.total_links(), "saved index");
        Ok(())
    }

    /// Read an index and validate it against the vector set it claims to cover.
    pub fn load<S: VectorStore>(path: &Path, data: &S) -> Result<Self> {
        let mut r = BufReader::new(File::open(path)?);
        r.read_i64::<BigEndian>()?;
        let dims = r.read_u32::<BigEndian>()? as usize;
        let n = r.read_u32::<BigEndian>()? as usize;
        let name = read_short_string(&mut r)?;
        if dims != data.dims() || n != data.len() || name != data.name() {
            return Err(IndexError::Mismatch(format!(
                "index is for \"{}\" ({}D, {} vectors) but vector set is \"{}\" ({}D, {} vectors)",
                name,
                dims,
                n,
                data.name(),
                data.dims(),
                data.len()
            )));
        }
        let n_near = r.read_u32::<BigEndian>()? as usize;
        let indexing_time_ms = r.read_u64::<BigEndian>()?;
        for _ in 0..2 * n {
            r.read_u32::<BigEndian>()?;
        }

        let mut links = Vec::with_capacity(n);
        for v in 0..n {
            let n_links = r.read_u32::<BigEndian>()? as usize;
            let mut targets = vec![0u32; n_links];
            for t in &mut targets {
                *t = r.read_u32::<BigEndian>()?;
                if *t as usize >= n {
                    return Err(IndexError::Corrupt(format!(
                        "vector {v} links to out-of-range id {t}"
                    )));
                }
            }
            let mut record = Vec::with_capacity(n_links);
            let mut prev = 0.0f32;
            for target in targets {
                let dist2 = r.read_f32::<BigEndian>()?;
                if !dist2.is_finite() || dist2 < 0.0 {
                    return Err(IndexError::Corrupt(format!(
                        "vector {v} has invalid link distance {dist2}"
                    )));
                }
                if dist2 < prev {
                    return Err(IndexError::Corrupt(format!(
                        "links of vector {v} are not sorted by distance"
                    )));
                }
                prev = dist2;
                record.push(Link { target, dist2 });
            }
            links.push(record);
        }
        info!(name = %name, n, "loaded index");
        Ok(Index::new(name, dims, n_near, indexing_time_ms, links))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::VectorSet;

    fn sample_index() -> (VectorSet, Index) {
        let set =
            VectorSet::from_flat("pair", 2, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]).unwrap();
        let links = vec![
            vec![
                Link { target: 1, dist2: 1.0 },
                Link { target: 2, dist2: 1.0 },
            ],
            vec![
                Link { target: 0, dist2: 1.0 },
                Link { target: 2, dist2: 2.0 },
            ],
            vec![
                Link { target: 0, dist2: 1.0 },
                Link { target: 1, dist2: 2.0 },
            ],
        ];
        let index = Index::new("pair".into(), 2, 2, 17, links);
        (set, index)
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pair.idx");
        let (set, index) = sample_index();
        index.save(&path).unwrap();

        let loaded = Index::load(&path, &set).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.n_near(), 2);
        assert_eq!(loaded.indexing_time_ms(), 17);
        for v in 0..3 {
            assert_eq!(loaded.links(v), index.links(v));
        }
    }

    #[test]
    fn load_rejects_wrong_vector_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pair.idx");
        let (_, index) = sample_index();
        index.save(&path).unwrap();

        let other = VectorSet::from_flat("other", 2, vec![0.0; 6]).unwrap();
        assert!(matches!(
            Index::load(&path, &other),
            Err(IndexError::Mismatch(_))
        ));
    }

    #[test]
    fn load_rejects_unsorted_links() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.idx");
        let set = VectorSet::from_flat("bad", 1, vec![0.0, 1.0, 2.0]).unwrap();
        // Descending distances in a record: save accepts, load must not.
        let links = vec![
            vec![
                Link { target: 1, dist2: 4.0 },
                Link { target: 2, dist2: 1.0 },
            ],
            vec![Link { target: 0, dist2: 4.0 }],
            vec![Link { target: 0, dist2: 1.0 }],
        ];
        let index = Index::new("bad".into(), 1, 1, 0, links);
        index.save(&path).unwrap();

        assert!(matches!(
            Index::load(&path, &set),
            Err(IndexError::Corrupt(_))
        ));
    }

    #[test]
    fn dup_detection() {
        let links = vec![
            vec![
                Link { target: 1, dist2: 0.0 },
                Link { target: 2, dist2: 4.0 },
            ],
            vec![Link { target: 0, dist2: 0.0 }],
        ];
        let index = Index::new("dups".into(), 2, 2, 0, links);
        assert!(!index.is_dup(0));
        assert!(index.is_dup(1));
    }
}
