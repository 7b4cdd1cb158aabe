//! Scoring lattice nodes
//!
//! A score is a pure function of four probabilities. `Pr[fail ∧ P]` is the
//! pattern's MNI support in the failing graph over the total trace count.
//! `Pr[ok ∧ P]` is either estimated from per-color and per-triple
//! frequencies in the passing graph, or computed exactly by embedding the
//! pattern there.
//!
//! `Score::max` is an upper bound on the score of any descendant of a node,
//! used by branch-and-bound to prune.

pub mod func;

use crate::cancel::CancelToken;
use crate::embedding::{mni, par_embeddings, Embedding, StartPoint};
use crate::error::MineResult;
use crate::graph::ColorTriple;
use crate::lattice::{Lattice, LatticeNode};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

pub use func::{Probabilities, ScoreFunc};

/// How `Pr[ok ∧ pattern]` is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OkSupport {
    /// Mean passing-graph frequency of the pattern's colors and color triples
    #[default]
    Estimated,
    /// MNI of the pattern's embeddings in the passing graph
    Exact,
}

#[derive(Debug)]
pub struct Score {
    func: ScoreFunc,
    ok_support: OkSupport,
    min_fails: usize,
    max_edges: usize,
    start: StartPoint,
    workers: usize,
    /// Exact passing-graph support by label, shared by parallel walkers
    exact_cache: DashMap<Vec<u8>, usize>,
    exact_searches: AtomicUsize,
}

impl Score {
    pub fn new(func: ScoreFunc, min_fails: usize, max_edges: usize) -> Self {
        Self {
            func,
            ok_support: OkSupport::default(),
            min_fails,
            max_edges,
            start: StartPoint::default(),
            workers: 1,
            exact_cache: DashMap::new(),
            exact_searches: AtomicUsize::new(0),
        }
    }

    pub fn with_ok_support(mut self, ok_support: OkSupport) -> Self {
        self.ok_support = ok_support;
        self
    }

    /// Search settings for exact passing-graph support
    pub fn with_search(mut self, start: StartPoint, workers: usize) -> Self {
        self.start = start;
        self.workers = workers.max(1);
        self
    }

    pub fn func(&self) -> ScoreFunc {
        self.func
    }

    pub fn ok_support(&self) -> OkSupport {
        self.ok_support
    }

    fn totals(lattice: &Lattice) -> (f64, f64, f64) {
        let f = lattice.fail().graphs() as f64;
        let o = lattice.ok().graphs() as f64;
        (f, o, f + o)
    }

    /// `(Pr[fail], Pr[fail ∧ node])`
    pub fn failure_probability(&self, lattice: &Lattice, node: &LatticeNode) -> (f64, f64) {
        let (f, _, t) = Self::totals(lattice);
        (f / t, node.mni() as f64 / t)
    }

    /// `(Pr[ok], Pr[ok ∧ node])`
    pub fn ok_probability(&self, lattice: &Lattice, node: &LatticeNode) -> (f64, f64) {
        let (_, o, t) = Self::totals(lattice);
        if node.is_root() {
            return (o / t, o / t);
        }
        let pr_o_node = match self.ok_support {
            OkSupport::Estimated => {
                let size = (node.vertex_count() + node.edge_count()) as f64;
                ok_mass(lattice, node) / size
            }
            OkSupport::Exact => self.exact_ok_support(lattice, node) as f64 / t,
        };
        (o / t, pr_o_node)
    }

    /// Number of exact passing-graph searches run so far
    pub fn exact_searches(&self) -> usize {
        self.exact_searches.load(Ordering::Relaxed)
    }

    fn exact_ok_support(&self, lattice: &Lattice, node: &LatticeNode) -> usize {
        if let Some(support) = self.exact_cache.get(node.label()) {
            return *support;
        }
        // the shard stays locked while searching, so a label is searched once
        *self
            .exact_cache
            .entry(node.label().to_vec())
            .or_insert_with(|| self.search_ok_support(lattice, node))
    }

    fn search_ok_support(&self, lattice: &Lattice, node: &LatticeNode) -> usize {
        self.exact_searches.fetch_add(1, Ordering::Relaxed);
        let pattern = node.pattern();
        let embeddings: Vec<Embedding> = if self.workers > 1 {
            par_embeddings(pattern, lattice.ok(), self.start, self.workers, &CancelToken::new())
        } else {
            pattern.embeddings(lattice.ok()).start_at(self.start).collect()
        };
        mni(&embeddings, pattern.vertex_count())
    }

    pub fn probabilities(&self, lattice: &Lattice, node: &LatticeNode) -> Probabilities {
        let (pr_f, pr_f_node) = self.failure_probability(lattice, node);
        let (pr_o, pr_o_node) = self.ok_probability(lattice, node);
        Probabilities::new(pr_f, pr_f_node, pr_o, pr_o_node)
    }

    /// Suspiciousness of a node
    pub fn score(&self, lattice: &Lattice, node: &LatticeNode) -> MineResult<f64> {
        self.func.apply(self.probabilities(lattice, node))
    }

    /// Upper bound on the score of `node` and every descendant.
    ///
    /// Each half substitutes the smallest support a descendant can still
    /// have in one class. Undefined values count as unbounded.
    pub fn max(&self, lattice: &Lattice, node: &LatticeNode) -> f64 {
        let bound = |p: Probabilities| {
            let s = self.func.raw(p);
            if s.is_nan() {
                f64::INFINITY
            } else {
                s
            }
        };
        let (f, o, t) = Self::totals(lattice);
        let (pr_f, pr_o) = (f / t, o / t);
        if node.is_root() {
            let x = bound(Probabilities::new(pr_f, 0.0, pr_o, 1.0));
            let y = bound(Probabilities::new(pr_f, 1.0, pr_o, 0.0));
            return x.max(y);
        }
        let p = self.probabilities(lattice, node);
        let min_pr_f_node = self.min_fails as f64 / t;
        let min_pr_o_node = match self.ok_support {
            OkSupport::Estimated => ok_mass(lattice, node) / (2 * self.max_edges + 1) as f64,
            OkSupport::Exact => 0.0,
        };
        let x = bound(Probabilities::new(p.pr_f, min_pr_f_node, p.pr_o, p.pr_o_node));
        let y = bound(Probabilities::new(p.pr_f, p.pr_f_node, p.pr_o, min_pr_o_node));
        x.max(y)
    }
}

/// Sum over the pattern's edges and vertices of their passing-graph
/// frequency, each over the total trace count
fn ok_mass(lattice: &Lattice, node: &LatticeNode) -> f64 {
    let ok = lattice.ok();
    let t = lattice.total_graphs() as f64;
    let pattern = node.pattern();
    let edges: f64 = pattern
        .edges()
        .iter()
        .map(|e| {
            let triple = ColorTriple {
                src_color: pattern.vertices()[e.src].color,
                targ_color: pattern.vertices()[e.targ].color,
                edge_color: e.color,
            };
            ok.edge_count(&triple) as f64 / t
        })
        .sum();
    let vertices: f64 = pattern
        .vertices()
        .iter()
        .map(|v| ok.vertex_color_frequency(v.color) as f64 / t)
        .sum();
    edges + vertices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorRegistry;
    use crate::graph::HostGraphBuilder;

    /// fail: a -> b in three traces; ok: a alone in one trace, a -> b in one
    fn lattice() -> Lattice {
        let registry = ColorRegistry::new();
        let (a, b) = (registry.color("a"), registry.color("b"));
        let mut fail = HostGraphBuilder::new();
        for _ in 0..3 {
            let x = fail.add_vertex(a);
            let y = fail.add_vertex(b);
            fail.add_edge(x, y, 0);
            fail.end_trace();
        }
        let mut ok = HostGraphBuilder::new();
        ok.add_vertex(a);
        ok.end_trace();
        let x = ok.add_vertex(a);
        let y = ok.add_vertex(b);
        ok.add_edge(x, y, 0);
        ok.end_trace();
        Lattice::new(fail.build(0), ok.build(0), registry, 1)
    }

    #[test]
    fn test_failure_probability_uses_fail_count() {
        let lat = lattice();
        let score = Score::new(ScoreFunc::Precision, 1, 4);
        let a = lat.node_for_color(lat.registry().color("a")).unwrap();
        let (pr_f, pr_f_node) = score.failure_probability(&lat, &a);
        assert!((pr_f - 3.0 / 5.0).abs() < 1e-9);
        assert!((pr_f_node - 3.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_estimated_and_exact_ok_support() {
        let lat = lattice();
        let a = lat.node_for_color(lat.registry().color("a")).unwrap();
        let ab = a.children(&lat)[0].clone();

        let estimated = Score::new(ScoreFunc::Precision, 1, 4);
        let (_, pro) = estimated.ok_probability(&lat, &ab);
        // (edge 1 + a 2 + b 1) / 5, averaged over 3 parts
        assert!((pro - (4.0 / 5.0) / 3.0).abs() < 1e-9);

        let exact = Score::new(ScoreFunc::Precision, 1, 4).with_ok_support(OkSupport::Exact);
        let (_, pro) = exact.ok_probability(&lat, &ab);
        assert!((pro - 1.0 / 5.0).abs() < 1e-9);
        let parallel = Score::new(ScoreFunc::Precision, 1, 4)
            .with_ok_support(OkSupport::Exact)
            .with_search(StartPoint::LeastFrequent, 3);
        assert!((parallel.ok_probability(&lat, &ab).1 - pro).abs() < 1e-9);
    }

    #[test]
    fn test_exact_support_searched_once_across_threads() {
        use rayon::prelude::*;

        let lat = lattice();
        let a = lat.node_for_color(lat.registry().color("a")).unwrap();
        let ab = a.children(&lat)[0].clone();
        let exact = Score::new(ScoreFunc::Precision, 1, 4).with_ok_support(OkSupport::Exact);

        let supports: Vec<f64> = (0..64)
            .into_par_iter()
            .map(|_| exact.ok_probability(&lat, &ab).1)
            .collect();
        assert!(supports.iter().all(|&p| (p - 1.0 / 5.0).abs() < 1e-9));
        assert_eq!(exact.exact_searches(), 1);

        exact.ok_probability(&lat, &a);
        assert_eq!(exact.exact_searches(), 2);
    }

    #[test]
    fn test_max_bounds_children() {
        let lat = lattice();
        // functions increasing in Pr[fail ∧ P] and decreasing in Pr[ok ∧ P]
        let monotone = [
            ScoreFunc::Precision,
            ScoreFunc::F1,
            ScoreFunc::Jaccard,
            ScoreFunc::OchiaiSquared,
            ScoreFunc::Contrast,
            ScoreFunc::RelativePrecision,
            ScoreFunc::RelativeJaccard,
        ];
        for func in monotone {
            let score = Score::new(func, 1, 4);
            let root = lat.root();
            let root_bound = score.max(&lat, &root);
            for kid in root.children(&lat) {
                let bound = score.max(&lat, kid);
                for grandkid in kid.children(&lat) {
                    if let Ok(s) = score.score(&lat, grandkid) {
                        assert!(s <= bound + 1e-9, "{}: {} > {}", func, s, bound);
                    }
                }
                if let Ok(s) = score.score(&lat, kid) {
                    assert!(s <= root_bound + 1e-9, "{}: {} > root {}", func, s, root_bound);
                }
            }
        }
    }
}
