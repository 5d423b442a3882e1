//! Read-only access to a dense set of vectors.
//!
//! The graph builder and the search engines only ever borrow vector slices by
//! id; they never own vector data. [`VectorStore`] is that boundary. The
//! standard implementation is [`crate::dataset::VectorSet`], but anything that
//! can hand out dimension-consistent `&[f32]` slices works.

/// Borrowed, id-addressed access to a set of equal-dimension vectors.
///
/// Ids are dense: `0..len()`. Implementations must guarantee that every
/// returned slice has exactly `dims()` elements.
pub trait VectorStore {
    /// Dimension of every vector in the store.
    fn dims(&self) -> usize;

    /// Number of vectors in the store.
    fn len(&self) -> usize;

    /// True when the store holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the vector with the given id.
    ///
    /// # Panics
    /// Panics if `id >= len()`.
    fn vector(&self, id: u32) -> &[f32];

    /// Human-readable name of the set, recorded in index files and checked
    /// when an index is reopened.
    fn name(&self) -> &str;
}
