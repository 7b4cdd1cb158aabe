//! Child generation
//!
//! Every host edge touching a bound vertex of some embedding proposes a one
//! edge extension. Extensions are grouped, filtered by MNI support,
//! canonicalized and deduplicated. A child inherits the parent's memo of
//! unsupported extensions: support is antimonotone, so an extension that
//! failed here fails everywhere below.

use super::node::LatticeNode;
use super::Lattice;
use crate::embedding::{mni, Embedding};
use crate::graph::Vertex;
use crate::pattern::Extension;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

impl LatticeNode {
    /// Supported children, computed once and cached
    pub fn children(&self, lattice: &Lattice) -> &[Arc<LatticeNode>] {
        self.kids.get_or_init(|| {
            if self.is_root() {
                lattice.frequent_vertices().to_vec()
            } else {
                self.compute_children(lattice)
            }
        })
    }

    fn compute_children(&self, lattice: &Lattice) -> Vec<Arc<LatticeNode>> {
        let pattern = &*self.pattern;
        let exts = self.extensions(lattice);
        let proposed = exts.len();

        let mut unsupported = self.unsupported.clone();
        let mut supported = Vec::with_capacity(exts.len());
        for (ext, embs) in exts {
            let grows = ext.source.idx == pattern.vertex_count() || ext.target.idx == pattern.vertex_count();
            let len = pattern.vertex_count() + usize::from(grows);
            if mni(&embs, len) < lattice.min_support() {
                unsupported.insert(ext);
            } else {
                supported.push((ext, embs));
            }
        }

        let builder = pattern.builder();
        let mut labels: FxHashSet<Vec<u8>> = FxHashSet::default();
        let mut kids = Vec::with_capacity(supported.len());
        for (ext, embs) in supported {
            let mut b = builder.clone();
            b.extend(&ext);
            let (vord, eord) = b.canonical_permutation();
            let child = b.build_from_permutation(&vord, &eord);
            if !labels.insert(child.label().to_vec()) {
                continue;
            }
            let embeddings: Vec<Embedding> = embs
                .iter()
                .map(|emb| emb.translate(child.vertex_count(), &vord))
                .collect();
            let memo: FxHashSet<Extension> = unsupported
                .iter()
                .map(|u| u.translate(pattern.vertex_count(), &vord))
                .collect();
            kids.push(Arc::new(LatticeNode::new(child, embeddings, memo)));
        }

        trace!(
            "{}: {} extensions proposed, {} unsupported, {} children",
            pattern,
            proposed,
            unsupported.len(),
            kids.len()
        );
        kids
    }

    /// Group candidate extensions with the embeddings that realize them
    fn extensions(&self, lattice: &Lattice) -> BTreeMap<Extension, Vec<Embedding>> {
        let pattern = &*self.pattern;
        let fail = lattice.fail();
        let graph = fail.graph();
        let new_idx = pattern.vertex_count();
        let mut exts: BTreeMap<Extension, Vec<Embedding>> = BTreeMap::new();

        for emb in &self.embeddings {
            let bound: FxHashMap<usize, usize> = emb.iter().map(|v| (v.emb_idx, v.sg_idx)).collect();
            let mut local: FxHashSet<(Extension, Option<usize>)> = FxHashSet::default();

            for link in emb.iter() {
                let kids = graph.kids[link.emb_idx].iter();
                let parents = graph.parents[link.emb_idx]
                    .iter()
                    .filter(|&&eid| !bound.contains_key(&graph.edges[eid].src));
                for &eid in kids.chain(parents) {
                    let e = graph.edges[eid];
                    if fail.edge_count(&fail.colors(&e)) < lattice.min_support() {
                        continue;
                    }
                    let host_vertex = |id: usize| Vertex {
                        idx: new_idx,
                        color: graph.vertices[id].color,
                    };
                    let (ext, added) = match (bound.get(&e.src), bound.get(&e.targ)) {
                        (Some(&s), Some(&t)) => (
                            Extension::new(pattern.vertices()[s], pattern.vertices()[t], e.color),
                            None,
                        ),
                        (Some(&s), None) => (
                            Extension::new(pattern.vertices()[s], host_vertex(e.targ), e.color),
                            Some(e.targ),
                        ),
                        (None, Some(&t)) => (
                            Extension::new(host_vertex(e.src), pattern.vertices()[t], e.color),
                            Some(e.src),
                        ),
                        (None, None) => unreachable!("host edge {} does not touch the embedding", eid),
                    };
                    if pattern.has_extension(&ext) || self.unsupported.contains(&ext) {
                        continue;
                    }
                    if !local.insert((ext, added)) {
                        continue;
                    }
                    let extended = match added {
                        Some(id) => emb.extend(new_idx, id),
                        None => emb.clone(),
                    };
                    exts.entry(ext).or_default().push(extended);
                }
            }
        }
        exts
    }
}
