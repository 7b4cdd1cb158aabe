//! Patterns: small connected colored digraphs with a canonical label
//!
//! A `Pattern` is immutable. New patterns come out of a `PatternBuilder`,
//! which canonicalizes the vertex and edge order before building, so two
//! isomorphic patterns always carry byte-identical labels. Equality, hashing
//! and ordering all go through that label.

pub mod builder;
pub(crate) mod canonical;
pub mod extension;

use crate::color::ColorRegistry;
use crate::embedding::Embedding;
use crate::error::{MineError, MineResult};
use crate::graph::{Edge, HostGraphBuilder, Indices, Vertex};
use petgraph::dot::Dot;
use petgraph::graph::DiGraph;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

pub use builder::PatternBuilder;
pub use extension::Extension;

/// A connected colored directed graph with a cached label
#[derive(Clone)]
pub struct Pattern {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    adj: Vec<Vec<usize>>,
    in_deg: Vec<usize>,
    out_deg: Vec<usize>,
    label: Vec<u8>,
}

impl Pattern {
    /// Assemble from already ordered parts. The label is the serialization of
    /// this exact order, so callers pass a canonical order to get a canonical
    /// label.
    pub(crate) fn from_parts(vertices: Vec<Vertex>, edges: Vec<Edge>) -> Self {
        let n = vertices.len();
        let mut adj = vec![Vec::new(); n];
        let mut in_deg = vec![0; n];
        let mut out_deg = vec![0; n];
        for (eid, e) in edges.iter().enumerate() {
            adj[e.src].push(eid);
            if e.targ != e.src {
                adj[e.targ].push(eid);
            }
            out_deg[e.src] += 1;
            in_deg[e.targ] += 1;
        }
        let label = canonical::write_label(&vertices, &edges);
        Self {
            vertices,
            edges,
            adj,
            in_deg,
            out_deg,
            label,
        }
    }

    /// The pattern with no vertices, used as a "nothing matched" sentinel
    pub fn empty() -> Self {
        Self::from_parts(Vec::new(), Vec::new())
    }

    /// Rebuild a pattern from its label bytes. Only labels of connected
    /// patterns in canonical order are accepted.
    pub fn from_label(label: &[u8]) -> MineResult<Self> {
        if label.len() % 4 != 0 || label.len() < 8 {
            return Err(MineError::Label(format!(
                "label length {} is not a whole number of words",
                label.len()
            )));
        }
        let words: Vec<u32> = label
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let (e, v) = (words[0] as usize, words[1] as usize);
        if words.len() != 2 + v + 3 * e {
            return Err(MineError::Label(format!(
                "label declares {} edges and {} vertices but holds {} words",
                e,
                v,
                words.len()
            )));
        }
        let vertices: Vec<Vertex> = words[2..2 + v]
            .iter()
            .enumerate()
            .map(|(idx, &color)| Vertex { idx, color })
            .collect();
        let mut edges = Vec::with_capacity(e);
        for w in words[2 + v..].chunks_exact(3) {
            let (src, targ) = (w[0] as usize, w[1] as usize);
            if src >= v || targ >= v {
                return Err(MineError::Label(format!(
                    "edge ({} -> {}) is out of bounds for {} vertices",
                    src, targ, v
                )));
            }
            edges.push(Edge {
                src,
                targ,
                color: w[2],
            });
        }
        let decoded = Self::from_parts(vertices, edges);
        let staged = PatternBuilder::from_pattern(&decoded);
        if !staged.connected() {
            return Err(MineError::Label(format!("{} is not connected", decoded)));
        }
        if staged.build().label() != label {
            return Err(MineError::Label(format!("{} is not in canonical order", decoded)));
        }
        Ok(decoded)
    }

    pub fn label(&self) -> &[u8] {
        &self.label
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Incident edge ids of a vertex
    pub fn adj(&self, idx: usize) -> &[usize] {
        &self.adj[idx]
    }

    pub fn in_degree(&self, idx: usize) -> usize {
        self.in_deg[idx]
    }

    pub fn out_degree(&self, idx: usize) -> usize {
        self.out_deg[idx]
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// A mutable copy for extension or edge removal
    pub fn builder(&self) -> PatternBuilder {
        PatternBuilder::from_pattern(self)
    }

    /// Whether the pattern already has the edge an extension proposes
    pub fn has_extension(&self, ext: &Extension) -> bool {
        let (s, t) = (ext.source.idx, ext.target.idx);
        if s >= self.vertices.len() || t >= self.vertices.len() {
            return false;
        }
        self.adj[s].iter().any(|&eid| {
            let e = &self.edges[eid];
            e.src == s && e.targ == t && e.color == ext.color
        })
    }

    /// Check that `emb` is a complete, injective, structure preserving map
    /// into `indices`
    pub fn embedding_exists(&self, emb: &Embedding, indices: &Indices) -> bool {
        let mapped = emb.to_vec(self.vertices.len());
        let mut ids = Vec::with_capacity(mapped.len());
        for (v, id) in self.vertices.iter().zip(&mapped) {
            let Some(id) = *id else { return false };
            if id >= indices.graph().vertex_count() || indices.graph().vertices[id].color != v.color {
                return false;
            }
            ids.push(id);
        }
        let mut seen = ids.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != ids.len() {
            return false;
        }
        self.edges
            .iter()
            .all(|e| indices.has_edge(ids[e.src], ids[e.targ], e.color))
    }

    /// Index this pattern as if it were a one-trace host graph
    pub fn as_indices(&self) -> Indices {
        let mut b = HostGraphBuilder::with_capacity(self.vertices.len(), self.edges.len());
        for v in &self.vertices {
            b.add_vertex(v.color);
        }
        for e in &self.edges {
            b.add_edge(e.src, e.targ, e.color);
        }
        b.end_trace();
        b.build(0)
    }

    /// Whether this pattern embeds into `other`
    pub fn subgraph_of(&self, other: &Pattern) -> bool {
        self.embedded_in(&other.as_indices())
    }

    /// `{E:V}(label)…[src->targ:label]…`
    pub fn pretty(&self, registry: &ColorRegistry) -> String {
        let mut s = format!("{{{}:{}}}", self.edges.len(), self.vertices.len());
        for v in &self.vertices {
            s.push_str(&format!("({})", registry.label(v.color)));
        }
        for e in &self.edges {
            s.push_str(&format!("[{}->{}:{}]", e.src, e.targ, registry.label(e.color)));
        }
        s
    }

    /// Graphviz DOT rendering with registry labels
    pub fn to_dot(&self, registry: &ColorRegistry) -> String {
        let mut g: DiGraph<String, String> = DiGraph::with_capacity(self.vertices.len(), self.edges.len());
        let nodes: Vec<_> = self
            .vertices
            .iter()
            .map(|v| g.add_node(registry.label(v.color)))
            .collect();
        for e in &self.edges {
            g.add_edge(nodes[e.src], nodes[e.targ], registry.label(e.color));
        }
        format!("{}", Dot::new(&g))
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
    }
}

impl Eq for Pattern {}

impl Hash for Pattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.label.hash(state);
    }
}

impl PartialOrd for Pattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.label.cmp(&other.label)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}:{}}}", self.edges.len(), self.vertices.len())?;
        for v in &self.vertices {
            write!(f, "({})", v.color)?;
        }
        for e in &self.edges {
            write!(f, "[{}->{}:{}]", e.src, e.targ, e.color)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(colors: &[u32]) -> Pattern {
        let mut b = PatternBuilder::new();
        for &c in colors {
            b.add_vertex(c);
        }
        for i in 1..colors.len() {
            b.add_edge(i - 1, i, 0);
        }
        b.build()
    }

    #[test]
    fn test_label_round_trip() {
        let p = path(&[3, 1, 2]);
        let back = Pattern::from_label(p.label()).unwrap();
        assert_eq!(back, p);
        assert_eq!(back.vertex_count(), 3);
        assert_eq!(back.edge_count(), 2);
    }

    #[test]
    fn test_from_label_rejects_garbage() {
        assert!(matches!(Pattern::from_label(&[0, 1, 2]), Err(MineError::Label(_))));
        // one edge, one vertex, edge pointing at vertex 4
        let mut bad = Vec::new();
        for w in [1u32, 1, 0, 0, 4, 0] {
            bad.extend_from_slice(&w.to_be_bytes());
        }
        assert!(Pattern::from_label(&bad).is_err());
    }

    fn words(ws: &[u32]) -> Vec<u8> {
        ws.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    #[test]
    fn test_from_label_rejects_disconnected() {
        // 0 -> 1 plus a stray vertex 2
        let label = words(&[1, 3, 0, 0, 0, 0, 1, 0]);
        assert!(matches!(Pattern::from_label(&label), Err(MineError::Label(_))));
        // two edges on two separate pairs
        let label = words(&[2, 4, 0, 1, 0, 1, 0, 1, 0, 2, 3, 0]);
        assert!(matches!(Pattern::from_label(&label), Err(MineError::Label(_))));
    }

    #[test]
    fn test_from_label_rejects_non_canonical_order() {
        // the same one-edge graph, written in both vertex orders
        let forward = words(&[1, 2, 0, 1, 0, 1, 0]);
        let backward = words(&[1, 2, 1, 0, 1, 0, 0]);
        let canonical = path(&[0, 1]);
        let accepted: Vec<Pattern> = [forward, backward]
            .iter()
            .filter_map(|l| Pattern::from_label(l).ok())
            .collect();
        assert_eq!(accepted, vec![canonical.clone()]);
        let other = if canonical.label() == words(&[1, 2, 0, 1, 0, 1, 0]).as_slice() {
            words(&[1, 2, 1, 0, 1, 0, 0])
        } else {
            words(&[1, 2, 0, 1, 0, 1, 0])
        };
        assert!(matches!(Pattern::from_label(&other), Err(MineError::Label(_))));
    }

    #[test]
    fn test_has_extension() {
        let p = path(&[0, 1]);
        let existing = p.edges()[0];
        let ext = Extension::new(p.vertices()[existing.src], p.vertices()[existing.targ], 0);
        assert!(p.has_extension(&ext));
        let other_color = Extension::new(ext.source, ext.target, 9);
        assert!(!p.has_extension(&other_color));
        let to_new = Extension::new(ext.source, Vertex { idx: 2, color: 1 }, 0);
        assert!(!p.has_extension(&to_new));
    }

    #[test]
    fn test_subgraph_of() {
        let small = path(&[0, 1]);
        let big = path(&[0, 1, 2]);
        assert!(small.subgraph_of(&big));
        assert!(!big.subgraph_of(&small));
    }

    #[test]
    fn test_pretty_and_dot() {
        let registry = ColorRegistry::new();
        let a = registry.color("a");
        let b = registry.color("b");
        let e = registry.color("");
        let mut builder = PatternBuilder::new();
        builder.add_vertex(a);
        builder.add_vertex(b);
        builder.add_edge(0, 1, e);
        let p = builder.build();

        assert_eq!(p.pretty(&registry), "{1:2}(a)(b)[0->1:]");
        let dot = p.to_dot(&registry);
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("\"a\""));
    }
}
