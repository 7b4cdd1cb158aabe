use crate::embedding::{fis, mni, Embedding};
use crate::pattern::{Extension, Pattern};
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A pattern, its embeddings in the failing graph, and the extensions known
/// to be unsupported anywhere below it.
///
/// The root node wraps the empty pattern and has no embeddings.
pub struct LatticeNode {
    pub(super) pattern: Arc<Pattern>,
    pub(super) embeddings: Vec<Embedding>,
    pub(super) unsupported: FxHashSet<Extension>,
    pub(super) kids: OnceLock<Vec<Arc<LatticeNode>>>,
}

impl LatticeNode {
    pub fn root() -> Self {
        Self::new(Pattern::empty(), Vec::new(), FxHashSet::default())
    }

    pub(crate) fn new(pattern: Pattern, embeddings: Vec<Embedding>, unsupported: FxHashSet<Extension>) -> Self {
        Self {
            pattern: Arc::new(pattern),
            embeddings,
            unsupported,
            kids: OnceLock::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.pattern.is_empty()
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn label(&self) -> &[u8] {
        self.pattern.label()
    }

    pub fn vertex_count(&self) -> usize {
        self.pattern.vertex_count()
    }

    pub fn edge_count(&self) -> usize {
        self.pattern.edge_count()
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    /// Extensions proven unsupported for this node and its descendants
    pub fn unsupported(&self) -> &FxHashSet<Extension> {
        &self.unsupported
    }

    /// Minimum image support in the failing graph
    pub fn mni(&self) -> usize {
        mni(&self.embeddings, self.pattern.vertex_count())
    }

    /// Greedy count of vertex-disjoint embeddings
    pub fn fis(&self) -> usize {
        fis(&self.embeddings)
    }

    /// Children, if they were already computed
    pub fn cached_children(&self) -> Option<&[Arc<LatticeNode>]> {
        self.kids.get().map(Vec::as_slice)
    }
}

impl fmt::Debug for LatticeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatticeNode")
            .field("pattern", &self.pattern)
            .field("embeddings", &self.embeddings.len())
            .field("unsupported", &self.unsupported.len())
            .finish()
    }
}
