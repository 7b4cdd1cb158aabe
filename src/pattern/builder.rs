//! Mutable staging area for patterns

use super::canonical;
use super::{Extension, Pattern};
use crate::color::Color;
use crate::error::{MineError, MineResult};
use crate::graph::{Edge, Vertex};
use petgraph::algo::connected_components;
use petgraph::graph::UnGraph;

#[derive(Debug, Clone, Default)]
pub struct PatternBuilder {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
}

impl PatternBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertices: usize, edges: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            edges: Vec::with_capacity(edges),
        }
    }

    /// A single vertex of `color`
    pub fn from_vertex(color: Color) -> Self {
        let mut b = Self::with_capacity(1, 0);
        b.add_vertex(color);
        b
    }

    pub fn from_pattern(pattern: &Pattern) -> Self {
        let mut b = Self::with_capacity(pattern.vertex_count() + 1, pattern.edge_count() + 1);
        b.vertices.extend_from_slice(pattern.vertices());
        b.edges.extend_from_slice(pattern.edges());
        b
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn add_vertex(&mut self, color: Color) -> usize {
        let idx = self.vertices.len();
        self.vertices.push(Vertex { idx, color });
        idx
    }

    pub fn add_edge(&mut self, src: usize, targ: usize, color: Color) -> usize {
        assert!(
            src < self.vertices.len() && targ < self.vertices.len(),
            "edge ({} -> {}) references a vertex outside |V| = {}",
            src,
            targ,
            self.vertices.len()
        );
        self.edges.push(Edge { src, targ, color });
        self.edges.len() - 1
    }

    /// Apply an extension, returning the new edge and the new vertex if one
    /// was added.
    ///
    /// Panics when an endpoint is past the "new vertex" slot or when both
    /// endpoints are new.
    pub fn extend(&mut self, ext: &Extension) -> (usize, Option<usize>) {
        let n = self.vertices.len();
        let (s, t) = (ext.source.idx, ext.target.idx);
        assert!(
            s <= n && t <= n && !(s == n && t == n),
            "invalid extension {:?} for a pattern with {} vertices",
            ext,
            n
        );
        let mut added = None;
        if s == n {
            added = Some(self.add_vertex(ext.source.color));
        } else if t == n {
            added = Some(self.add_vertex(ext.target.color));
        }
        (self.add_edge(s, t, ext.color), added)
    }

    /// Remove an edge, dropping an endpoint it leaves isolated.
    ///
    /// Fails with `DisconnectedGraph` and leaves the builder untouched when
    /// both endpoints would be isolated or the remainder is not connected.
    pub fn remove_edge(&mut self, edge: usize) -> MineResult<()> {
        assert!(edge < self.edges.len(), "edge {} out of bounds", edge);
        let e = self.edges[edge];
        let touches = |u: usize| {
            self.edges
                .iter()
                .enumerate()
                .any(|(i, o)| i != edge && (o.src == u || o.targ == u))
        };
        let drop_vertex = if e.src == e.targ {
            None
        } else {
            match (touches(e.src), touches(e.targ)) {
                (true, true) => None,
                (false, true) => Some(e.src),
                (true, false) => Some(e.targ),
                (false, false) => return Err(MineError::DisconnectedGraph { edge }),
            }
        };

        let mut vertices = Vec::with_capacity(self.vertices.len());
        for v in &self.vertices {
            if Some(v.idx) == drop_vertex {
                continue;
            }
            vertices.push(Vertex {
                idx: vertices.len(),
                color: v.color,
            });
        }
        let renumber = |u: usize| match drop_vertex {
            Some(d) if u > d => u - 1,
            _ => u,
        };
        let edges: Vec<Edge> = self
            .edges
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != edge)
            .map(|(_, o)| Edge {
                src: renumber(o.src),
                targ: renumber(o.targ),
                color: o.color,
            })
            .collect();

        if !is_connected(vertices.len(), &edges) {
            return Err(MineError::DisconnectedGraph { edge });
        }
        self.vertices = vertices;
        self.edges = edges;
        Ok(())
    }

    /// Weak connectivity of the staged graph
    pub fn connected(&self) -> bool {
        is_connected(self.vertices.len(), &self.edges)
    }

    /// `(vord, eord)` with `vord[old] = new`, `eord[old] = new`
    pub fn canonical_permutation(&self) -> (Vec<usize>, Vec<usize>) {
        canonical::canonical_permutation(&self.vertices, &self.edges)
    }

    /// Canonicalize and freeze
    pub fn build(&self) -> Pattern {
        let (vord, eord) = self.canonical_permutation();
        self.build_from_permutation(&vord, &eord)
    }

    /// Freeze under an explicit permutation
    pub fn build_from_permutation(&self, vord: &[usize], eord: &[usize]) -> Pattern {
        let mut vertices = vec![Vertex { idx: 0, color: 0 }; self.vertices.len()];
        for (old, &new) in vord.iter().enumerate() {
            vertices[new] = Vertex {
                idx: new,
                color: self.vertices[old].color,
            };
        }
        let mut edges = vec![
            Edge {
                src: 0,
                targ: 0,
                color: 0
            };
            self.edges.len()
        ];
        for (old, &new) in eord.iter().enumerate() {
            let e = self.edges[old];
            edges[new] = Edge {
                src: vord[e.src],
                targ: vord[e.targ],
                color: e.color,
            };
        }
        Pattern::from_parts(vertices, edges)
    }
}

fn is_connected(vertex_count: usize, edges: &[Edge]) -> bool {
    if vertex_count <= 1 {
        return true;
    }
    let mut g: UnGraph<(), ()> = UnGraph::with_capacity(vertex_count, edges.len());
    for _ in 0..vertex_count {
        g.add_node(());
    }
    g.extend_with_edges(edges.iter().map(|e| (e.src as u32, e.targ as u32)));
    connected_components(&g) == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Triangle 0-1-2 with a pendant 3 hanging off 2
    fn triangle_pendant() -> PatternBuilder {
        let mut b = PatternBuilder::new();
        for c in [0, 0, 0, 1] {
            b.add_vertex(c);
        }
        b.add_edge(0, 1, 0);
        b.add_edge(1, 2, 0);
        b.add_edge(2, 0, 0);
        b.add_edge(2, 3, 0);
        b
    }

    #[test]
    fn test_build_is_order_independent() {
        let mut a = PatternBuilder::new();
        let x = a.add_vertex(4);
        let y = a.add_vertex(5);
        let z = a.add_vertex(4);
        a.add_edge(x, y, 1);
        a.add_edge(z, y, 2);

        let mut b = PatternBuilder::new();
        let y = b.add_vertex(5);
        let z = b.add_vertex(4);
        let x = b.add_vertex(4);
        b.add_edge(z, y, 2);
        b.add_edge(x, y, 1);

        assert_eq!(a.build().label(), b.build().label());
    }

    #[test]
    fn test_extend_to_new_vertex() {
        let mut b = PatternBuilder::from_vertex(3);
        let ext = Extension::new(Vertex { idx: 0, color: 3 }, Vertex { idx: 1, color: 4 }, 7);
        let (eid, added) = b.extend(&ext);
        assert_eq!(eid, 0);
        assert_eq!(added, Some(1));
        assert_eq!(b.vertices()[1].color, 4);
    }

    #[test]
    #[should_panic]
    fn test_extend_out_of_range_panics() {
        let mut b = PatternBuilder::from_vertex(3);
        let ext = Extension::new(Vertex { idx: 0, color: 3 }, Vertex { idx: 5, color: 4 }, 7);
        b.extend(&ext);
    }

    #[test]
    fn test_remove_pendant_edge_drops_vertex() {
        let mut b = triangle_pendant();
        b.remove_edge(3).unwrap();
        assert_eq!(b.vertices().len(), 3);
        assert_eq!(b.edges().len(), 3);
        assert!(b.connected());
    }

    #[test]
    fn test_remove_connector_is_rejected() {
        // a bridge between a triangle and another triangle
        let mut b = PatternBuilder::new();
        for _ in 0..6 {
            b.add_vertex(0);
        }
        b.add_edge(0, 1, 0);
        b.add_edge(1, 2, 0);
        b.add_edge(2, 0, 0);
        b.add_edge(3, 4, 0);
        b.add_edge(4, 5, 0);
        b.add_edge(5, 3, 0);
        let bridge = b.add_edge(2, 3, 0);
        let before = b.clone();

        assert!(matches!(b.remove_edge(bridge), Err(MineError::DisconnectedGraph { .. })));
        assert_eq!(b.edges(), before.edges());
    }

    #[test]
    fn test_remove_last_edge_is_rejected() {
        let mut b = PatternBuilder::new();
        b.add_vertex(0);
        b.add_vertex(1);
        b.add_edge(0, 1, 0);
        assert!(b.remove_edge(0).is_err());
    }

    #[test]
    fn test_remove_self_loop_keeps_vertex() {
        let mut b = PatternBuilder::from_vertex(2);
        b.add_edge(0, 0, 1);
        b.remove_edge(0).unwrap();
        assert_eq!(b.vertices().len(), 1);
        assert!(b.edges().is_empty());
    }
}
