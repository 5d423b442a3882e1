//! Append-only accumulation of link triplets ahead of the final merge.
//!
//! During finalization every kept link is written in both directions, so the
//! total entry count is far larger than any per-vector structure and arrives
//! in no useful order. The store keeps one flat buffer of entries, each with a
//! back-pointer to the previous entry for the same source vector, forming an
//! intrusive reverse chain per source. Offsets are 64-bit since entry counts
//! can exceed `u32` range on large sets.
//!
//! Each source's chain is read out exactly once at merge time; the whole store
//! is dropped immediately afterwards, so entries are never removed.

const NONE: u64 = u64::MAX;

pub struct LinkChainStore {
    targets: Vec<u32>,
    dist2s: Vec<f32>,
    prevs: Vec<u64>,
    last: Vec<u64>,
    counts: Vec<u32>,
}

impl LinkChainStore {
    /// `capacity` is a hint for the expected total entry count.
    pub fn new(n_vectors: usize, capacity: u64) -> Self {
        let cap = usize::try_from(capacity).unwrap_or(0);
        LinkChainStore {
            targets: Vec::with_capacity(cap),
            dist2s: Vec::with_capacity(cap),
            prevs: Vec::with_capacity(cap),
            last: vec![NONE; n_vectors],
            counts: vec![0; n_vectors],
        }
    }

    /// Number of entries chained for a source vector.
    pub fn chain_len(&self, source: u32) -> usize {
        self.counts[source as usize] as usize
    }

    /// Append the triplet `(source, target, dist2)`.
    pub fn append(&mut self, source: u32, target: u32, dist2: f32) {
        let at = self.targets.len() as u64;
        self.targets.push(target);
        self.dist2s.push(dist2);
        self.prevs.push(self.last[source as usize]);
        self.last[source as usize] = at;
        self.counts[source as usize] += 1;
    }

    /// Read a source's chain into `out`, in insertion order.
    pub fn read_links(&self, source: u32, out: &mut Vec<(u32, f32)>) {
        let n = self.chain_len(source);
        out.clear();
        out.resize(n, (0, 0.0));
        let mut ptr = self.last[source as usize];
        let mut at = n;
        while ptr != NONE {
            at -= 1;
            let p = ptr as usize;
            out[at] = (self.targets[p], self.dist2s[p]);
            ptr = self.prevs[p];
        }
        debug_assert_eq!(at, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_interleaved_sources() {
        let mut store = LinkChainStore::new(3, 8);
        store.append(0, 1, 1.0);
        store.append(2, 0, 4.0);
        store.append(0, 2, 9.0);
        store.append(1, 0, 1.0);
        store.append(0, 1, 16.0);

        assert_eq!(store.chain_len(0), 3);
        assert_eq!(store.chain_len(1), 1);

        let mut out = Vec::new();
        store.read_links(0, &mut out);
        assert_eq!(out, vec![(1, 1.0), (2, 9.0), (1, 16.0)]);
        store.read_links(1, &mut out);
        assert_eq!(out, vec![(0, 1.0)]);
        store.read_links(2, &mut out);
        assert_eq!(out, vec![(0, 4.0)]);
    }

    #[test]
    fn empty_chain_reads_empty() {
        let store = LinkChainStore::new(2, 0);
        let mut out = vec![(9, 9.0)];
        store.read_links(1, &mut out);
        assert!(out.is_empty());
    }
}
