//! Embeddings: injective maps from pattern vertices into a host graph
//!
//! An embedding is a persistent singly linked chain of
//! `(pattern vertex, host vertex)` links. Extending one allocates a single
//! new link pointing at the shared prefix, so a depth-first search that
//! branches on every candidate host vertex never copies partial maps.

pub mod parallel;
pub mod search;
pub mod stack;

use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

pub use parallel::{par_embedded_in, par_embeddings};
pub use search::{EmbeddingSearch, Overlap, StartPoint};
pub use stack::WorkStack;

/// One link of an embedding chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexEmbedding {
    /// Pattern vertex index
    pub sg_idx: usize,
    /// Host vertex id
    pub emb_idx: usize,
}

#[derive(Debug)]
struct Link {
    vertex: VertexEmbedding,
    prev: Option<Embedding>,
}

/// A (possibly partial) embedding. Cloning shares the whole chain.
#[derive(Clone)]
pub struct Embedding(Arc<Link>);

impl Embedding {
    /// A one-link chain
    pub fn start(sg_idx: usize, emb_idx: usize) -> Self {
        Embedding(Arc::new(Link {
            vertex: VertexEmbedding { sg_idx, emb_idx },
            prev: None,
        }))
    }

    /// A new chain with one more link on top of this one
    pub fn extend(&self, sg_idx: usize, emb_idx: usize) -> Self {
        Embedding(Arc::new(Link {
            vertex: VertexEmbedding { sg_idx, emb_idx },
            prev: Some(self.clone()),
        }))
    }

    /// Links from the newest to the oldest
    pub fn iter(&self) -> Iter<'_> {
        Iter { cur: Some(self) }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Never true; an embedding has at least one link
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether a host vertex is already used
    pub fn has_id(&self, emb_idx: usize) -> bool {
        self.iter().any(|v| v.emb_idx == emb_idx)
    }

    /// Host vertex bound to a pattern vertex
    pub fn host_of(&self, sg_idx: usize) -> Option<usize> {
        self.iter().find(|v| v.sg_idx == sg_idx).map(|v| v.emb_idx)
    }

    /// Host vertices bound to two pattern vertices, in one pass
    pub fn ids(&self, src: usize, targ: usize) -> (Option<usize>, Option<usize>) {
        let (mut s, mut t) = (None, None);
        for v in self.iter() {
            if s.is_none() && v.sg_idx == src {
                s = Some(v.emb_idx);
            }
            if t.is_none() && v.sg_idx == targ {
                t = Some(v.emb_idx);
            }
            if s.is_some() && t.is_some() {
                break;
            }
        }
        (s, t)
    }

    /// Dense view indexed by pattern vertex
    pub fn to_vec(&self, pattern_len: usize) -> Vec<Option<usize>> {
        let mut out = vec![None; pattern_len];
        for v in self.iter() {
            if v.sg_idx < pattern_len {
                out[v.sg_idx] = Some(v.emb_idx);
            }
        }
        out
    }

    /// Host vertex ids in chain order
    pub fn host_ids(&self) -> FxHashSet<usize> {
        self.iter().map(|v| v.emb_idx).collect()
    }

    /// Re-index pattern vertices through `vord` (see `Extension::translate`)
    pub fn translate(&self, org_len: usize, vord: &[usize]) -> Embedding {
        let links: Vec<VertexEmbedding> = self.iter().collect();
        let map = |idx: usize| {
            let idx = if idx >= org_len {
                vord.len() + (idx - org_len)
            } else {
                idx
            };
            if idx < vord.len() {
                vord[idx]
            } else {
                idx
            }
        };
        let mut iter = links.into_iter().rev();
        // non-empty by construction
        let first = iter.next().unwrap_or(self.0.vertex);
        let mut out = Embedding::start(map(first.sg_idx), first.emb_idx);
        for v in iter {
            out = out.extend(map(v.sg_idx), v.emb_idx);
        }
        out
    }
}

pub struct Iter<'a> {
    cur: Option<&'a Embedding>,
}

impl Iterator for Iter<'_> {
    type Item = VertexEmbedding;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.cur?;
        self.cur = cur.0.prev.as_ref();
        Some(cur.0.vertex)
    }
}

impl fmt::Debug for Embedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut links: Vec<VertexEmbedding> = self.iter().collect();
        links.sort_by_key(|v| v.sg_idx);
        write!(f, "Embedding(")?;
        for (i, v) in links.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}->{}", v.sg_idx, v.emb_idx)?;
        }
        write!(f, ")")
    }
}

/// Minimum image support: the smallest number of distinct host vertices used
/// at any pattern position across `embeddings`
pub fn mni(embeddings: &[Embedding], pattern_len: usize) -> usize {
    if embeddings.is_empty() || pattern_len == 0 {
        return 0;
    }
    let mut images: Vec<FxHashSet<usize>> = vec![FxHashSet::default(); pattern_len];
    for emb in embeddings {
        for v in emb.iter() {
            if v.sg_idx < pattern_len {
                images[v.sg_idx].insert(v.emb_idx);
            }
        }
    }
    images.iter().map(FxHashSet::len).min().unwrap_or(0)
}

/// Greedy count of pairwise vertex-disjoint embeddings, in input order
pub fn fis(embeddings: &[Embedding]) -> usize {
    let mut used: FxHashSet<usize> = FxHashSet::default();
    let mut count = 0;
    for emb in embeddings {
        let ids = emb.host_ids();
        if ids.iter().any(|id| used.contains(id)) {
            continue;
        }
        used.extend(ids);
        count += 1;
    }
    count
}
