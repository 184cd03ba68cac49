//! Deduplicated, index-addressed storage for graph nodes
use std::collections::HashMap;
use std::hash::Hash;

/// Trait for an index type, wrapping a `usize`
pub(crate) trait Index: Copy {
    fn new(i: usize) -> Self;
    fn get(&self) -> usize;
}

/// Defines a newtype index implementing [`Index`]
macro_rules! define_index {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(usize);

        impl $crate::context::indexed::Index for $name {
            fn new(i: usize) -> Self {
                Self(i)
            }
            fn get(&self) -> usize {
                self.0
            }
        }
    };
}
pub(crate) use define_index;

/// Bidirectional map between hashable values and dense indexes
///
/// Inserting a value that is already present returns the existing index, so
/// storage is automatically deduplicated (hash-consing).
#[derive(Debug)]
pub(crate) struct IndexMap<V, I> {
    data: Vec<V>,
    map: HashMap<V, I>,
}

impl<V, I> Default for IndexMap<V, I> {
    fn default() -> Self {
        Self {
            data: vec![],
            map: HashMap::new(),
        }
    }
}

impl<V: Eq + Hash + Clone, I: Index> IndexMap<V, I> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.map.clear();
    }

    /// Inserts the value, returning its (possibly pre-existing) index
    pub fn insert(&mut self, v: V) -> I {
        let data = &mut self.data;
        *self.map.entry(v.clone()).or_insert_with(|| {
            let i = I::new(data.len());
            data.push(v);
            i
        })
    }

    pub fn get_by_index(&self, i: I) -> Option<&V> {
        self.data.get(i.get())
    }
}
