//! Subgraph isomorphism search of a pattern in a host graph
//!
//! The search binds one start vertex, then walks a precomputed edge chain in
//! which every edge touches at least one already bound pattern vertex.
//! Partial embeddings live on an explicit stack, so the search is a lazy
//! iterator that callers may abandon at any point.

use super::{fis, Embedding};
use crate::graph::Indices;
use crate::pattern::Pattern;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use tracing::trace;

/// Per pattern vertex, the host vertices it may map to. An empty set (or a
/// missing entry) leaves that vertex unrestricted.
pub type Overlap = [FxHashSet<usize>];

/// Heuristic for the vertex the search binds first.
///
/// Only affects how much work the search does, never what it finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartPoint {
    #[default]
    MostConnected,
    LeastConnected,
    LeastFrequent,
    MostFrequent,
    FewestExtensions,
    MostExtensions,
    LowestCardinality,
    HighestCardinality,
    Random(u64),
}

/// Pattern, host and overlap bundled for the inner loops
#[derive(Clone, Copy)]
pub(crate) struct Matcher<'a> {
    pub pattern: &'a Pattern,
    pub indices: &'a Indices,
    pub overlap: Option<&'a Overlap>,
}

impl<'a> Matcher<'a> {
    pub fn new(pattern: &'a Pattern, indices: &'a Indices) -> Self {
        Self {
            pattern,
            indices,
            overlap: None,
        }
    }

    fn allowed(&self, idx: usize, id: usize) -> bool {
        match self.overlap.and_then(|o| o.get(idx)) {
            Some(set) if !set.is_empty() => set.contains(&id),
            _ => true,
        }
    }

    fn admits(&self, cur: &Embedding, idx: usize, id: usize) -> bool {
        self.pattern.out_degree(idx) <= self.indices.out_degree(id)
            && self.pattern.in_degree(idx) <= self.indices.in_degree(id)
            && self.allowed(idx, id)
            && !cur.has_id(id)
    }

    fn vertex_frequency(&self, idx: usize) -> usize {
        self.indices
            .vertices_with_color(self.pattern.vertices()[idx].color)
            .len()
    }

    fn connectedness(&self, idx: usize) -> usize {
        self.pattern.adj(idx).len()
    }

    /// Sum of host frequencies of the edge colors around a vertex
    fn cardinality(&self, idx: usize) -> usize {
        self.pattern
            .adj(idx)
            .iter()
            .map(|&eid| {
                self.indices
                    .edge_color_frequency(self.pattern.edges()[eid].color)
            })
            .sum()
    }

    /// Host extensions available from `idx` over its pattern edges, skipping
    /// edges that touch an excluded vertex
    pub fn extensions_from(&self, idx: usize, exclude: &[usize]) -> usize {
        let color = self.pattern.vertices()[idx].color;
        let mut total = 0;
        for &id in self.indices.vertices_with_color(color) {
            if !self.allowed(idx, id) {
                continue;
            }
            let seed = Embedding::start(idx, id);
            for &eid in self.pattern.adj(idx) {
                let e = self.pattern.edges()[eid];
                if exclude.contains(&e.src) || exclude.contains(&e.targ) {
                    continue;
                }
                self.extend_embedding(&seed, eid, |_| total += 1);
            }
        }
        total
    }

    pub fn start_vertex(&self, start: StartPoint) -> usize {
        let n = self.pattern.vertex_count();
        let pick = |key: &dyn Fn(usize) -> usize, largest: bool| {
            let mut best = 0;
            let mut best_key = key(0);
            for idx in 1..n {
                let k = key(idx);
                if (largest && k > best_key) || (!largest && k < best_key) {
                    best = idx;
                    best_key = k;
                }
            }
            best
        };
        match start {
            StartPoint::MostConnected => pick(&|i| self.connectedness(i), true),
            StartPoint::LeastConnected => pick(&|i| self.connectedness(i), false),
            StartPoint::LeastFrequent => pick(&|i| self.vertex_frequency(i), false),
            StartPoint::MostFrequent => pick(&|i| self.vertex_frequency(i), true),
            StartPoint::FewestExtensions => pick(&|i| self.extensions_from(i, &[]), false),
            StartPoint::MostExtensions => pick(&|i| self.extensions_from(i, &[]), true),
            StartPoint::LowestCardinality => pick(&|i| self.cardinality(i), false),
            StartPoint::HighestCardinality => pick(&|i| self.cardinality(i), true),
            StartPoint::Random(seed) => ChaCha8Rng::seed_from_u64(seed).random_range(0..n),
        }
    }

    /// One partial embedding per admissible host vertex of the start color
    pub fn seeds(&self, start: usize) -> Vec<Embedding> {
        let color = self.pattern.vertices()[start].color;
        self.indices
            .vertices_with_color(color)
            .iter()
            .filter(|&&id| {
                self.pattern.out_degree(start) <= self.indices.out_degree(id)
                    && self.pattern.in_degree(start) <= self.indices.in_degree(id)
                    && self.allowed(start, id)
            })
            .map(|&id| Embedding::start(start, id))
            .collect()
    }

    /// Order in which the search binds pattern edges.
    ///
    /// Vertices are visited through a min-priority queue; a vertex's priority
    /// is the number of host extensions reaching it, so the most constrained
    /// frontier vertex is bound next. Each visit contributes the edge back to
    /// the most recently visited neighbor. Edges left over close cycles and
    /// go last.
    pub fn edge_chain(&self, start: usize) -> Vec<usize> {
        let p = self.pattern;
        let mut chain = Vec::with_capacity(p.edge_count());
        let mut added = vec![false; p.edge_count()];
        let mut seen = vec![false; p.vertex_count()];
        let mut colors = FxHashSet::default();
        let mut prevs: Vec<usize> = Vec::with_capacity(p.vertex_count());
        let mut queue = BinaryHeap::new();
        let mut queued = FxHashSet::default();

        queue.push(Reverse((0i64, start)));
        queued.insert(start);
        while let Some(Reverse((_, u))) = queue.pop() {
            queued.remove(&u);
            if seen[u] {
                continue;
            }
            for &prev in prevs.iter().rev() {
                let link = p
                    .adj(prev)
                    .iter()
                    .copied()
                    .find(|&eid| !added[eid] && p.edges()[eid].other(prev) == u);
                if let Some(eid) = link {
                    chain.push(eid);
                    added[eid] = true;
                    break;
                }
            }
            seen[u] = true;
            colors.insert(p.vertices()[u].color);
            prevs.push(u);

            for &eid in p.adj(u) {
                let v = p.edges()[eid].other(u);
                if seen[v] {
                    continue;
                }
                let from = self.extensions_from(v, &[u]) as i64;
                let mut prio = if from == 0 {
                    self.extensions_from(v, &[]) as i64 * 4
                } else {
                    from
                };
                if !colors.contains(&p.vertices()[v].color) {
                    prio /= 2;
                }
                for &neid in p.adj(v) {
                    let w = p.edges()[neid].other(v);
                    if w != v && !seen[w] {
                        prio -= self.extensions_from(w, &[v, u]) as i64;
                    }
                }
                if queued.insert(v) {
                    queue.push(Reverse((prio, v)));
                }
            }
        }

        chain.extend((0..p.edge_count()).filter(|&eid| !added[eid]));
        chain
    }

    /// Extend `cur` along pattern edge `eid`, handing every consistent
    /// successor to `f`
    pub fn extend_embedding(&self, cur: &Embedding, eid: usize, mut f: impl FnMut(Embedding)) {
        let e = self.pattern.edges()[eid];
        match cur.ids(e.src, e.targ) {
            (Some(s), Some(t)) => {
                if self.indices.has_edge(s, t, e.color) {
                    f(cur.clone());
                }
            }
            (Some(s), None) => {
                let targ_color = self.pattern.vertices()[e.targ].color;
                for &t in self.indices.targs_from_src(s, e.color, targ_color) {
                    if self.admits(cur, e.targ, t) {
                        f(cur.extend(e.targ, t));
                    }
                }
            }
            (None, Some(t)) => {
                let src_color = self.pattern.vertices()[e.src].color;
                for &s in self.indices.srcs_to_targ(t, e.color, src_color) {
                    if self.admits(cur, e.src, s) {
                        f(cur.extend(e.src, s));
                    }
                }
            }
            (None, None) => panic!("edge chain reached edge {} with neither endpoint bound", eid),
        }
    }
}

type PrunePredicate<'a> = Box<dyn Fn(&Embedding) -> bool + 'a>;

/// Lazy depth-first enumeration of complete embeddings
pub struct EmbeddingSearch<'a> {
    matcher: Matcher<'a>,
    start: StartPoint,
    prune: Option<PrunePredicate<'a>>,
    chain: Vec<usize>,
    stack: Vec<(Embedding, usize)>,
    started: bool,
}

impl<'a> EmbeddingSearch<'a> {
    pub fn new(pattern: &'a Pattern, indices: &'a Indices) -> Self {
        Self {
            matcher: Matcher::new(pattern, indices),
            start: StartPoint::default(),
            prune: None,
            chain: Vec::new(),
            stack: Vec::new(),
            started: false,
        }
    }

    pub fn start_at(mut self, start: StartPoint) -> Self {
        self.start = start;
        self
    }

    /// Restrict each pattern vertex to a set of host vertices
    pub fn overlap(mut self, overlap: &'a Overlap) -> Self {
        self.matcher.overlap = Some(overlap);
        self
    }

    /// Drop partial embeddings for which `prune` returns true
    pub fn prune(mut self, prune: impl Fn(&Embedding) -> bool + 'a) -> Self {
        self.prune = Some(Box::new(prune));
        self
    }

    fn init(&mut self) {
        self.started = true;
        if self.matcher.pattern.is_empty() {
            return;
        }
        let start = self.matcher.start_vertex(self.start);
        self.chain = self.matcher.edge_chain(start);
        let mut seeds = self.matcher.seeds(start);
        seeds.reverse();
        trace!(
            "Embedding search from vertex {} with {} seeds, chain {:?}",
            start,
            seeds.len(),
            self.chain
        );
        self.stack = seeds.into_iter().map(|emb| (emb, 0)).collect();
    }
}

impl Iterator for EmbeddingSearch<'_> {
    type Item = Embedding;

    fn next(&mut self) -> Option<Embedding> {
        if !self.started {
            self.init();
        }
        while let Some((emb, eid)) = self.stack.pop() {
            if let Some(prune) = &self.prune {
                if prune(&emb) {
                    continue;
                }
            }
            if eid >= self.chain.len() {
                return Some(emb);
            }
            let stack = &mut self.stack;
            self.matcher
                .extend_embedding(&emb, self.chain[eid], |ext| stack.push((ext, eid + 1)));
        }
        None
    }
}

impl Pattern {
    /// All embeddings of this pattern in `indices`, lazily
    pub fn embeddings<'a>(&'a self, indices: &'a Indices) -> EmbeddingSearch<'a> {
        EmbeddingSearch::new(self, indices)
    }

    /// Whether at least one embedding exists
    pub fn embedded_in(&self, indices: &Indices) -> bool {
        self.embeddings(indices).next().is_some()
    }

    /// The largest sub-pattern that still embeds, found by removing edges
    /// breadth first, with the fraction of vertices and edges it keeps
    pub fn estimate_match(&self, indices: &Indices) -> (f64, Pattern) {
        let total = (self.vertex_count() + self.edge_count()) as f64;
        if self.is_empty() {
            return (0.0, Pattern::empty());
        }
        if self.embedded_in(indices) {
            return (1.0, self.clone());
        }

        let mut seen: FxHashSet<Vec<u8>> = FxHashSet::default();
        let mut queue: VecDeque<Pattern> = VecDeque::from([self.clone()]);
        while let Some(cur) = queue.pop_front() {
            for eid in 0..cur.edge_count() {
                let mut b = cur.builder();
                if b.remove_edge(eid).is_err() {
                    continue;
                }
                let sub = b.build();
                if !seen.insert(sub.label().to_vec()) {
                    continue;
                }
                if sub.embedded_in(indices) {
                    let kept = (sub.vertex_count() + sub.edge_count()) as f64;
                    return (kept / total, sub);
                }
                queue.push_back(sub);
            }
        }

        // nothing with an edge embeds; fall back to a lone vertex
        for v in self.vertices() {
            if !indices.vertices_with_color(v.color).is_empty() {
                let sub = crate::pattern::PatternBuilder::from_vertex(v.color).build();
                return (1.0 / total, sub);
            }
        }
        (0.0, Pattern::empty())
    }

    /// Number of vertex-disjoint embeddings of the best matching sub-pattern
    pub fn support_of(&self, indices: &Indices) -> usize {
        let (_, sub) = self.estimate_match(indices);
        if sub.is_empty() {
            return 0;
        }
        let embs: Vec<Embedding> = sub.embeddings(indices).collect();
        fis(&embs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::HostGraphBuilder;
    use crate::pattern::PatternBuilder;

    /// 0(a) -> 1(b) -> 2(c), 3(a) -> 4(b)
    fn host() -> Indices {
        let mut b = HostGraphBuilder::new();
        for c in [0, 1, 2, 0, 1] {
            b.add_vertex(c);
        }
        b.add_edge(0, 1, 0);
        b.add_edge(1, 2, 0);
        b.add_edge(3, 4, 0);
        b.end_trace();
        b.build(0)
    }

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
    fn test_enumerates_all_embeddings() {
        let idx = host();
        let ab = path(&[0, 1]);
        let embs: Vec<Embedding> = ab.embeddings(&idx).collect();
        assert_eq!(embs.len(), 2);
        for emb in &embs {
            assert!(ab.embedding_exists(emb, &idx));
        }
    }

    #[test]
    fn test_every_start_point_agrees() {
        let idx = host();
        let abc = path(&[0, 1, 2]);
        for start in [
            StartPoint::MostConnected,
            StartPoint::LeastConnected,
            StartPoint::LeastFrequent,
            StartPoint::MostFrequent,
            StartPoint::FewestExtensions,
            StartPoint::MostExtensions,
            StartPoint::LowestCardinality,
            StartPoint::HighestCardinality,
            StartPoint::Random(3),
        ] {
            let count = EmbeddingSearch::new(&abc, &idx).start_at(start).count();
            assert_eq!(count, 1, "start point {:?}", start);
        }
    }

    #[test]
    fn test_overlap_restricts_matches() {
        let idx = host();
        let ab = path(&[0, 1]);
        let a_pos = ab.vertices().iter().position(|v| v.color == 0).unwrap();
        let mut overlap = vec![FxHashSet::default(); ab.vertex_count()];
        overlap[a_pos].insert(3);
        let embs: Vec<Embedding> = EmbeddingSearch::new(&ab, &idx).overlap(&overlap).collect();
        assert_eq!(embs.len(), 1);
        assert_eq!(embs[0].host_of(a_pos), Some(3));
    }

    #[test]
    fn test_prune_drops_partials() {
        let idx = host();
        let ab = path(&[0, 1]);
        let count = EmbeddingSearch::new(&ab, &idx)
            .prune(|emb| emb.has_id(0))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_edge_chain_is_connected() {
        let idx = host();
        let abc = path(&[0, 1, 2]);
        let m = Matcher::new(&abc, &idx);
        let start = m.start_vertex(StartPoint::MostConnected);
        let chain = m.edge_chain(start);
        assert_eq!(chain.len(), 2);
        let mut bound = vec![start];
        for eid in chain {
            let e = abc.edges()[eid];
            assert!(bound.contains(&e.src) || bound.contains(&e.targ));
            bound.push(e.src);
            bound.push(e.targ);
        }
    }

    #[test]
    fn test_estimate_match_and_support() {
        let idx = host();
        // a -> b -> c -> a does not exist, a -> b -> c does
        let mut b = PatternBuilder::new();
        for c in [0, 1, 2] {
            b.add_vertex(c);
        }
        b.add_edge(0, 1, 0);
        b.add_edge(1, 2, 0);
        b.add_edge(2, 0, 0);
        let cycle = b.build();
        assert!(!cycle.embedded_in(&idx));

        let (ratio, sub) = cycle.estimate_match(&idx);
        assert_eq!(sub.edge_count(), 2);
        assert!((ratio - 5.0 / 6.0).abs() < 1e-9);
        assert_eq!(cycle.support_of(&idx), 1);
        assert_eq!(path(&[0, 1]).support_of(&idx), 2);
    }
}
