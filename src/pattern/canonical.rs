//! Canonical vertex/edge ordering for small colored digraphs
//!
//! Color refinement computes an equitable ordered partition of the vertices.
//! Whenever a cell still holds more than one vertex, each member is
//! individualized in turn and the partition refined again. Every discrete
//! partition reached this way is a candidate ordering; the one whose label is
//! lexicographically smallest wins.
//!
//! Vertices with identical colored neighborhoods (twins) are interchangeable,
//! so only one member of each twin class is individualized per cell.

use crate::color::Color;
use crate::graph::{Edge, Vertex};
use rustc_hash::{FxHashMap, FxHashSet};

/// `(vord, eord)` with `vord[old] = new` and `eord[old] = new`
pub(crate) fn canonical_permutation(vertices: &[Vertex], edges: &[Edge]) -> (Vec<usize>, Vec<usize>) {
    if vertices.is_empty() {
        return (Vec::new(), (0..edges.len()).collect());
    }
    let mut search = Canonizer::new(vertices, edges);

    let mut by_color: Vec<usize> = (0..vertices.len()).collect();
    by_color.sort_by_key(|&v| (vertices[v].color, v));
    let mut cells: Vec<Vec<usize>> = Vec::new();
    for v in by_color {
        match cells.last_mut() {
            Some(cell) if vertices[cell[0]].color == vertices[v].color => cell.push(v),
            _ => cells.push(vec![v]),
        }
    }

    search.search(cells);
    search
        .best
        .map(|(_, vord, eord)| (vord, eord))
        .unwrap_or_else(|| ((0..vertices.len()).collect(), (0..edges.len()).collect()))
}

/// Serialize `(|E|, |V|, colors…, (src, targ, color)…)` as big-endian u32s
pub(crate) fn write_label(vertices: &[Vertex], edges: &[Edge]) -> Vec<u8> {
    let mut label = Vec::with_capacity(4 * (2 + vertices.len() + 3 * edges.len()));
    label.extend_from_slice(&(edges.len() as u32).to_be_bytes());
    label.extend_from_slice(&(vertices.len() as u32).to_be_bytes());
    for v in vertices {
        label.extend_from_slice(&v.color.to_be_bytes());
    }
    for e in edges {
        label.extend_from_slice(&(e.src as u32).to_be_bytes());
        label.extend_from_slice(&(e.targ as u32).to_be_bytes());
        label.extend_from_slice(&e.color.to_be_bytes());
    }
    label
}

type Signature = (Vec<(Color, usize)>, Vec<(Color, usize)>);

struct Canonizer<'a> {
    vertices: &'a [Vertex],
    edges: &'a [Edge],
    out: Vec<Vec<(Color, usize)>>,
    inn: Vec<Vec<(Color, usize)>>,
    twin: Vec<usize>,
    best: Option<(Vec<u8>, Vec<usize>, Vec<usize>)>,
}

impl<'a> Canonizer<'a> {
    fn new(vertices: &'a [Vertex], edges: &'a [Edge]) -> Self {
        let n = vertices.len();
        let mut out = vec![Vec::new(); n];
        let mut inn = vec![Vec::new(); n];
        let mut looped = vec![false; n];
        for e in edges {
            out[e.src].push((e.color, e.targ));
            inn[e.targ].push((e.color, e.src));
            if e.src == e.targ {
                looped[e.src] = true;
            }
        }

        // Twin classes. A vertex with a self loop is never a twin: equal keys
        // then imply the two vertices are not adjacent, so swapping them is an
        // automorphism.
        let mut classes: FxHashMap<(Color, Vec<(u8, Color, usize)>), usize> = FxHashMap::default();
        let mut twin = Vec::with_capacity(n);
        for v in 0..n {
            if looped[v] {
                twin.push(usize::MAX - v);
                continue;
            }
            let mut key: Vec<(u8, Color, usize)> = out[v]
                .iter()
                .map(|&(c, u)| (0, c, u))
                .chain(inn[v].iter().map(|&(c, u)| (1, c, u)))
                .collect();
            key.sort_unstable();
            let next = classes.len();
            twin.push(*classes.entry((vertices[v].color, key)).or_insert(next));
        }

        Self {
            vertices,
            edges,
            out,
            inn,
            twin,
            best: None,
        }
    }

    fn search(&mut self, cells: Vec<Vec<usize>>) {
        let cells = self.refine(cells);
        let Some(target) = cells.iter().position(|c| c.len() > 1) else {
            self.leaf(&cells);
            return;
        };

        let mut tried = FxHashSet::default();
        for &v in &cells[target] {
            if !tried.insert(self.twin[v]) {
                continue;
            }
            let rest: Vec<usize> = cells[target].iter().copied().filter(|&u| u != v).collect();
            let mut next = Vec::with_capacity(cells.len() + 1);
            next.extend_from_slice(&cells[..target]);
            next.push(vec![v]);
            next.push(rest);
            next.extend_from_slice(&cells[target + 1..]);
            self.search(next);
        }
    }

    /// Split cells by colored neighbor-cell signatures until stable
    fn refine(&self, mut cells: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
        let mut cell_of = vec![0usize; self.vertices.len()];
        loop {
            for (i, cell) in cells.iter().enumerate() {
                for &v in cell {
                    cell_of[v] = i;
                }
            }
            let mut next: Vec<Vec<usize>> = Vec::with_capacity(cells.len());
            for cell in &cells {
                if cell.len() == 1 {
                    next.push(cell.clone());
                    continue;
                }
                let mut keyed: Vec<(Signature, usize)> = cell
                    .iter()
                    .map(|&v| (self.signature(v, &cell_of), v))
                    .collect();
                keyed.sort();
                let mut prev: Option<&Signature> = None;
                for (sig, v) in &keyed {
                    match (prev, next.last_mut()) {
                        (Some(p), Some(last)) if p == sig => last.push(*v),
                        _ => next.push(vec![*v]),
                    }
                    prev = Some(sig);
                }
            }
            if next.len() == cells.len() {
                return next;
            }
            cells = next;
        }
    }

    fn signature(&self, v: usize, cell_of: &[usize]) -> Signature {
        let mut out: Vec<(Color, usize)> = self.out[v].iter().map(|&(c, u)| (c, cell_of[u])).collect();
        let mut inn: Vec<(Color, usize)> = self.inn[v].iter().map(|&(c, u)| (c, cell_of[u])).collect();
        out.sort_unstable();
        inn.sort_unstable();
        (out, inn)
    }

    fn leaf(&mut self, cells: &[Vec<usize>]) {
        let mut vord = vec![0usize; self.vertices.len()];
        let mut ordered = Vec::with_capacity(self.vertices.len());
        for (new, cell) in cells.iter().enumerate() {
            let old = cell[0];
            vord[old] = new;
            ordered.push(Vertex {
                idx: new,
                color: self.vertices[old].color,
            });
        }

        let mut mapped: Vec<(Edge, usize)> = self
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| {
                (
                    Edge {
                        src: vord[e.src],
                        targ: vord[e.targ],
                        color: e.color,
                    },
                    i,
                )
            })
            .collect();
        mapped.sort();
        let mut eord = vec![0usize; self.edges.len()];
        for (new, (_, old)) in mapped.iter().enumerate() {
            eord[*old] = new;
        }
        let ordered_edges: Vec<Edge> = mapped.into_iter().map(|(e, _)| e).collect();

        let label = write_label(&ordered, &ordered_edges);
        let better = match &self.best {
            Some((best, _, _)) => label < *best,
            None => true,
        };
        if better {
            self.best = Some((label, vord, eord));
        }
    }
}
