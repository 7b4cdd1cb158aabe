//! Derived lookup tables over a finished host graph
//!
//! Every lookup the embedding search performs is keyed by colors plus one
//! anchor vertex:
//!
//! ```text
//! color                          -> [vertex]
//! (src, edge color, targ color)  -> [targ]
//! (targ, edge color, src color)  -> [src]
//! (src color, targ color, edge)  -> count
//! ```

use super::builder::HostGraph;
use super::Edge;
use crate::color::Color;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

/// Colors of an edge and both of its endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ColorTriple {
    pub src_color: Color,
    pub targ_color: Color,
    pub edge_color: Color,
}

type AnchorKey = (usize, Color, Color);

const EMPTY: &[usize] = &[];

/// Read-only indices over one host graph
#[derive(Debug)]
pub struct Indices {
    graph: HostGraph,
    color_index: FxHashMap<Color, Vec<usize>>,
    src_index: FxHashMap<AnchorKey, Vec<usize>>,
    targ_index: FxHashMap<AnchorKey, Vec<usize>>,
    edge_index: FxHashSet<(usize, usize, Color)>,
    edge_counts: FxHashMap<ColorTriple, usize>,
    frequent_edges: Vec<ColorTriple>,
    vertex_colors: FxHashMap<Color, usize>,
    edge_colors: FxHashMap<Color, usize>,
}

impl Indices {
    pub(super) fn new(
        graph: HostGraph,
        vertex_colors: FxHashMap<Color, usize>,
        edge_colors: FxHashMap<Color, usize>,
        min_support: usize,
    ) -> Self {
        let mut color_index: FxHashMap<Color, Vec<usize>> = FxHashMap::default();
        for v in &graph.vertices {
            if vertex_colors.get(&v.color).copied().unwrap_or(0) < min_support {
                continue;
            }
            color_index.entry(v.color).or_default().push(v.idx);
        }

        let mut src_index: FxHashMap<AnchorKey, Vec<usize>> =
            FxHashMap::with_capacity_and_hasher(graph.vertices.len(), Default::default());
        let mut targ_index: FxHashMap<AnchorKey, Vec<usize>> =
            FxHashMap::with_capacity_and_hasher(graph.vertices.len(), Default::default());
        let mut edge_index = FxHashSet::with_capacity_and_hasher(graph.edges.len(), Default::default());
        let mut edge_counts: FxHashMap<ColorTriple, usize> = FxHashMap::default();
        let mut frequent_edges = Vec::new();

        for e in &graph.edges {
            let src_color = graph.vertices[e.src].color;
            let targ_color = graph.vertices[e.targ].color;
            src_index
                .entry((e.src, e.color, targ_color))
                .or_default()
                .push(e.targ);
            targ_index
                .entry((e.targ, e.color, src_color))
                .or_default()
                .push(e.src);
            edge_index.insert((e.src, e.targ, e.color));

            let key = ColorTriple {
                src_color,
                targ_color,
                edge_color: e.color,
            };
            let count = edge_counts.entry(key).or_insert(0);
            *count += 1;
            // record exactly once, when the triple reaches min support
            if *count == min_support.max(1) {
                frequent_edges.push(key);
            }
        }

        // parallel host edges must not yield duplicate embeddings
        for list in src_index.values_mut().chain(targ_index.values_mut()) {
            list.sort_unstable();
            list.dedup();
        }

        Self {
            graph,
            color_index,
            src_index,
            targ_index,
            edge_index,
            edge_counts,
            frequent_edges,
            vertex_colors,
            edge_colors,
        }
    }

    pub fn graph(&self) -> &HostGraph {
        &self.graph
    }

    /// Number of traces merged into the host graph
    pub fn graphs(&self) -> usize {
        self.graph.graphs
    }

    /// Host vertices of a color (empty for infrequent colors)
    pub fn vertices_with_color(&self, color: Color) -> &[usize] {
        self.color_index.get(&color).map(Vec::as_slice).unwrap_or(EMPTY)
    }

    /// Colors present in the color index, sorted
    pub fn indexed_colors(&self) -> Vec<Color> {
        let mut colors: Vec<Color> = self.color_index.keys().copied().collect();
        colors.sort_unstable();
        colors
    }

    pub fn vertex_color_frequency(&self, color: Color) -> usize {
        self.vertex_colors.get(&color).copied().unwrap_or(0)
    }

    pub fn edge_color_frequency(&self, color: Color) -> usize {
        self.edge_colors.get(&color).copied().unwrap_or(0)
    }

    /// Color triple of a host edge
    pub fn colors(&self, e: &Edge) -> ColorTriple {
        ColorTriple {
            src_color: self.graph.vertices[e.src].color,
            targ_color: self.graph.vertices[e.targ].color,
            edge_color: e.color,
        }
    }

    /// Occurrences of a color triple in the host graph
    pub fn edge_count(&self, triple: &ColorTriple) -> usize {
        self.edge_counts.get(triple).copied().unwrap_or(0)
    }

    /// Triples that reached the minimum support, in discovery order
    pub fn frequent_edges(&self) -> &[ColorTriple] {
        &self.frequent_edges
    }

    pub fn degree(&self, id: usize) -> usize {
        self.graph.adj[id].len()
    }

    pub fn in_degree(&self, id: usize) -> usize {
        self.graph.parents[id].len()
    }

    pub fn out_degree(&self, id: usize) -> usize {
        self.graph.kids[id].len()
    }

    pub fn has_edge(&self, src: usize, targ: usize, color: Color) -> bool {
        self.edge_index.contains(&(src, targ, color))
    }

    /// Targets reachable from `src` over an edge of `edge_color` landing on `targ_color`
    pub fn targs_from_src(&self, src: usize, edge_color: Color, targ_color: Color) -> &[usize] {
        self.src_index
            .get(&(src, edge_color, targ_color))
            .map(Vec::as_slice)
            .unwrap_or(EMPTY)
    }

    /// Sources reaching `targ` over an edge of `edge_color` leaving `src_color`
    pub fn srcs_to_targ(&self, targ: usize, edge_color: Color, src_color: Color) -> &[usize] {
        self.targ_index
            .get(&(targ, edge_color, src_color))
            .map(Vec::as_slice)
            .unwrap_or(EMPTY)
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::HostGraphBuilder;

    use super::*;

    fn sample() -> Indices {
        // 0(a) -x-> 1(b), 0(a) -x-> 2(b), 2(b) -y-> 0(a)
        let mut b = HostGraphBuilder::new();
        let a = b.add_vertex(0);
        let b1 = b.add_vertex(1);
        let b2 = b.add_vertex(1);
        b.add_edge(a, b1, 10);
        b.add_edge(a, b2, 10);
        b.add_edge(b2, a, 11);
        b.end_trace();
        b.build(1)
    }

    #[test]
    fn test_color_index() {
        let idx = sample();
        assert_eq!(idx.vertices_with_color(0), &[0]);
        assert_eq!(idx.vertices_with_color(1), &[1, 2]);
        assert!(idx.vertices_with_color(9).is_empty());
        assert_eq!(idx.indexed_colors(), vec![0, 1]);
    }

    #[test]
    fn test_anchor_lookups() {
        let idx = sample();
        assert_eq!(idx.targs_from_src(0, 10, 1), &[1, 2]);
        assert_eq!(idx.srcs_to_targ(0, 11, 1), &[2]);
        assert!(idx.targs_from_src(0, 11, 1).is_empty());
        assert!(idx.has_edge(2, 0, 11));
        assert!(!idx.has_edge(0, 2, 11));
    }

    #[test]
    fn test_edge_counts_and_frequencies() {
        let idx = sample();
        let triple = ColorTriple {
            src_color: 0,
            targ_color: 1,
            edge_color: 10,
        };
        assert_eq!(idx.edge_count(&triple), 2);
        assert_eq!(idx.frequent_edges().len(), 2);
        assert_eq!(idx.vertex_color_frequency(1), 2);
        assert_eq!(idx.edge_color_frequency(10), 2);
        assert_eq!(idx.out_degree(0), 2);
        assert_eq!(idx.in_degree(0), 1);
        assert_eq!(idx.degree(0), 3);
    }

    #[test]
    fn test_min_support_filters_color_index() {
        let mut b = HostGraphBuilder::new();
        b.add_vertex(0);
        b.add_vertex(0);
        b.add_vertex(1);
        let idx = b.build(2);
        assert_eq!(idx.vertices_with_color(0).len(), 2);
        assert!(idx.vertices_with_color(1).is_empty());
        assert_eq!(idx.vertex_color_frequency(1), 1);
    }
}
