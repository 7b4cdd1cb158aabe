//! Incremental host graph construction
//!
//! Traces are appended one at a time: vertices and edges go in, and
//! `end_trace` marks the boundary between independent executions. The
//! number of traces merged into a graph drives every probability estimate
//! downstream, so it is tracked explicitly.

use super::indices::Indices;
use super::{Edge, Vertex};
use crate::color::Color;
use rustc_hash::FxHashMap;
use tracing::debug;

/// A finished, immutable host graph
#[derive(Debug, Clone, Default)]
pub struct HostGraph {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
    /// Vertex -> incident edge ids (both directions)
    pub adj: Vec<Vec<usize>>,
    /// Vertex -> outgoing edge ids
    pub kids: Vec<Vec<usize>>,
    /// Vertex -> incoming edge ids
    pub parents: Vec<Vec<usize>>,
    /// Number of independent traces merged into this graph
    pub graphs: usize,
}

impl HostGraph {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Mutable staging area for a host graph
#[derive(Debug, Default)]
pub struct HostGraphBuilder {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    adj: Vec<Vec<usize>>,
    vertex_colors: FxHashMap<Color, usize>,
    edge_colors: FxHashMap<Color, usize>,
    graphs: usize,
}

impl HostGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with estimated capacity
    pub fn with_capacity(vertices: usize, edges: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            edges: Vec::with_capacity(edges),
            adj: Vec::with_capacity(vertices),
            ..Default::default()
        }
    }

    /// Add a vertex, returning its id
    pub fn add_vertex(&mut self, color: Color) -> usize {
        let idx = self.vertices.len();
        self.vertices.push(Vertex { idx, color });
        self.adj.push(Vec::new());
        *self.vertex_colors.entry(color).or_insert(0) += 1;
        idx
    }

    /// Add a directed edge between two existing vertices, returning its id
    pub fn add_edge(&mut self, src: usize, targ: usize, color: Color) -> usize {
        assert!(
            src < self.vertices.len() && targ < self.vertices.len(),
            "edge ({} -> {}) references a vertex outside |V| = {}",
            src,
            targ,
            self.vertices.len()
        );
        let idx = self.edges.len();
        self.edges.push(Edge { src, targ, color });
        self.adj[src].push(idx);
        if targ != src {
            self.adj[targ].push(idx);
        }
        *self.edge_colors.entry(color).or_insert(0) += 1;
        idx
    }

    /// Mark the end of one trace
    pub fn end_trace(&mut self) {
        self.graphs += 1;
    }

    /// Override the trace count (for graphs merged elsewhere)
    pub fn set_graphs(&mut self, graphs: usize) {
        self.graphs = graphs;
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Freeze the graph and compute every derived index.
    ///
    /// Colors occurring on fewer than `min_support` vertices are left out of
    /// the color index, so no search can start from them.
    pub fn build(self, min_support: usize) -> Indices {
        let mut graphs = self.graphs;
        if graphs == 0 && !self.vertices.is_empty() {
            debug!("No trace boundaries recorded; treating graph as a single trace");
            graphs = 1;
        }

        let n = self.vertices.len();
        let mut kids = vec![Vec::new(); n];
        let mut parents = vec![Vec::new(); n];
        for (eid, e) in self.edges.iter().enumerate() {
            kids[e.src].push(eid);
            parents[e.targ].push(eid);
        }

        let graph = HostGraph {
            vertices: self.vertices,
            edges: self.edges,
            adj: self.adj,
            kids,
            parents,
            graphs,
        };

        debug!(
            "Building indices for {} vertices, {} edges, {} traces",
            graph.vertex_count(),
            graph.edge_count(),
            graph.graphs
        );

        Indices::new(graph, self.vertex_colors, self.edge_colors, min_support)
    }
}
