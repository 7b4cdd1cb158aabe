//! The pattern lattice over the failing graph
//!
//! Nodes are ordered by "subgraph of". The root holds the empty pattern; its
//! children are the frequent single-vertex patterns, and every other node's
//! children extend it by one supported edge.

mod children;
pub mod node;

use crate::color::{Color, ColorRegistry};
use crate::embedding::Embedding;
use crate::error::MineResult;
use crate::graph::Indices;
use crate::pattern::{Pattern, PatternBuilder};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub use node::LatticeNode;

/// Failing and passing host graphs plus the frequent starting points
#[derive(Debug)]
pub struct Lattice {
    fail: Indices,
    ok: Indices,
    registry: ColorRegistry,
    min_support: usize,
    root: Arc<LatticeNode>,
    frequent: Vec<Arc<LatticeNode>>,
}

impl Lattice {
    /// `min_support` is the MNI a pattern needs in the failing graph
    pub fn new(fail: Indices, ok: Indices, registry: ColorRegistry, min_support: usize) -> Self {
        let mut frequent = Vec::new();
        for color in fail.indexed_colors() {
            let ids = fail.vertices_with_color(color);
            if ids.len() < min_support || ids.is_empty() {
                continue;
            }
            let embeddings: Vec<Embedding> = ids.iter().map(|&id| Embedding::start(0, id)).collect();
            let pattern = PatternBuilder::from_vertex(color).build();
            frequent.push(Arc::new(LatticeNode::new(pattern, embeddings, FxHashSet::default())));
        }
        info!(
            "Lattice over {} failing / {} passing traces: {} frequent vertices (min support {})",
            fail.graphs(),
            ok.graphs(),
            frequent.len(),
            min_support
        );
        Self {
            fail,
            ok,
            registry,
            min_support,
            root: Arc::new(LatticeNode::root()),
            frequent,
        }
    }

    pub fn fail(&self) -> &Indices {
        &self.fail
    }

    pub fn ok(&self) -> &Indices {
        &self.ok
    }

    pub fn registry(&self) -> &ColorRegistry {
        &self.registry
    }

    /// For attaching location metadata after the lattice is built
    pub fn registry_mut(&mut self) -> &mut ColorRegistry {
        &mut self.registry
    }

    pub fn min_support(&self) -> usize {
        self.min_support
    }

    /// Failing plus passing traces
    pub fn total_graphs(&self) -> usize {
        self.fail.graphs() + self.ok.graphs()
    }

    pub fn root(&self) -> Arc<LatticeNode> {
        self.root.clone()
    }

    pub fn frequent_vertices(&self) -> &[Arc<LatticeNode>] {
        &self.frequent
    }

    /// The single-vertex node for a color, if that color is frequent
    pub fn node_for_color(&self, color: Color) -> Option<Arc<LatticeNode>> {
        self.frequent
            .iter()
            .find(|n| n.pattern().vertices()[0].color == color)
            .cloned()
    }

    /// A node for an arbitrary pattern, with every embedding in the failing
    /// graph found by search
    pub fn node_for_pattern(&self, pattern: Pattern) -> LatticeNode {
        let embeddings: Vec<Embedding> = pattern.embeddings(&self.fail).collect();
        debug!("{} has {} embeddings in the failing graph", pattern, embeddings.len());
        LatticeNode::new(pattern, embeddings, FxHashSet::default())
    }

    /// Rebuild a node from a stored label
    pub fn node_from_label(&self, label: &[u8]) -> MineResult<LatticeNode> {
        Ok(self.node_for_pattern(Pattern::from_label(label)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::HostGraphBuilder;

    /// fail: a -> b in two traces, one a -> c twice, a lone d; ok: a -> b
    fn lattice(min_support: usize) -> Lattice {
        let registry = ColorRegistry::new();
        let (a, b, c) = (registry.color("a"), registry.color("b"), registry.color("c"));
        let d = registry.color("d");
        let e = registry.color("");

        let mut fail = HostGraphBuilder::new();
        for _ in 0..2 {
            let x = fail.add_vertex(a);
            let y = fail.add_vertex(b);
            fail.add_edge(x, y, e);
            fail.end_trace();
        }
        let x = fail.add_vertex(a);
        for _ in 0..2 {
            let z = fail.add_vertex(c);
            fail.add_edge(x, z, e);
        }
        fail.add_vertex(d);
        fail.end_trace();

        let mut ok = HostGraphBuilder::new();
        let x = ok.add_vertex(a);
        let y = ok.add_vertex(b);
        ok.add_edge(x, y, e);
        ok.end_trace();

        Lattice::new(fail.build(0), ok.build(0), registry, min_support)
    }

    #[test]
    fn test_root_children_are_frequent_vertices() {
        let lat = lattice(2);
        let root = lat.root();
        let kids = root.children(&lat);
        // d occurs once
        assert_eq!(kids.len(), 3);
        assert!(kids.iter().all(|k| k.vertex_count() == 1));
        assert!(lat.node_for_color(lat.registry().color("d")).is_none());
    }

    #[test]
    fn test_children_respect_support_and_memo() {
        let lat = lattice(2);
        let a = lat.node_for_color(lat.registry().color("a")).unwrap();
        let kids = a.children(&lat);
        assert_eq!(kids.len(), 1);
        let ab = &kids[0];
        assert_eq!(ab.edge_count(), 1);
        assert_eq!(ab.mni(), 2);
        // a -> c has one a image, so it was rejected and the child remembers it
        assert!(!ab.unsupported().is_empty());
        assert!(ab.children(&lat).is_empty());
    }

    #[test]
    fn test_children_are_cached() {
        let lat = lattice(1);
        let root = lat.root();
        assert!(root.cached_children().is_none());
        let first = root.children(&lat).len();
        assert_eq!(root.cached_children().map(|k| k.len()), Some(first));
    }

    #[test]
    fn test_node_from_label() {
        let lat = lattice(1);
        let a = lat.node_for_color(lat.registry().color("a")).unwrap();
        let ab = a.children(&lat)[0].clone();
        let again = lat.node_from_label(ab.label()).unwrap();
        assert_eq!(again.label(), ab.label());
        assert_eq!(again.mni(), ab.mni());
    }
}
