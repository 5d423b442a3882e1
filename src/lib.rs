//! prox: proximity-graph approximate nearest neighbor search.
//!
//! Builds a single-layer proximity graph incrementally: vectors become nodes
//! in furthest-first order, each new node keeps a bounded heap of near links
//! and a list of longer links that were useful when first seen, and the final
//! index stores one symmetric, distance-sorted link array per vector. Exact
//! duplicates are pulled out of the graph and represented as a single
//! zero-length link to the vector they duplicate.
//!
//! Search alternates two moves over the graph: **descend** follows long links
//! of the nearest known neighbor to close distance fast, and **spread** fans
//! out over the short links of every kept candidate to complete the
//! neighborhood and escape local minima. A query that exactly hits an indexed
//! vector short-circuits to that node's own link array.
//!
//! # Example
//!
//! ```no_run
//! use prox::{build_index, IndexSearch};
//!
//! # fn main() -> prox::Result<()> {
//! let data = prox::eval::generate_uniform("demo", 10_000, 32, 7)?;
//! let index = build_index(&data, 20)?;
//!
//! let mut search = IndexSearch::new(&index, &data, 10, false)?;
//! let query = vec![0.5f32; 32];
//! let result = search.search(&query)?;
//! println!("nearest: {:?}", result.nearest());
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod dataset;
pub mod error;
pub mod eval;
pub mod heap;
pub mod index;
pub mod search;
pub mod store;
pub mod vecmath;

pub use build::build_index;
pub use dataset::VectorSet;
pub use error::{IndexError, Result};
pub use index::{Index, Link};
pub use search::{Accumulator, BruteSearch, IndexSearch, Neighbor, SearchResult};
pub use store::VectorStore;
