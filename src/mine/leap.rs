//! LEAP: best-first search that skips near-duplicate branches
//!
//! [`SLeap`] is one pass at a fixed failing-support threshold. [`Leap`]
//! repeats passes while halving that threshold, seeding each pass with the
//! previous result set, and finishes with an exact pass at `min_fails`.

use super::branch_bound::BestFirst;
use super::{MineOutcome, MineStats, Miner, SearchNode, TopMiner};
use crate::cancel::CancelToken;
use rand::RngCore;
use tracing::debug;

/// Stop halving once the result sum moves by less than this
const CONVERGENCE: f64 = 0.01;

/// A single sLEAP pass
#[derive(Debug, Clone)]
pub struct SLeap {
    k: usize,
    sigma: f64,
    min_fail_sup: Option<usize>,
    maximal: bool,
    start_max: Vec<SearchNode>,
}

impl SLeap {
    /// `min_fail_sup` of `None` uses the miner's `min_fails`
    pub fn new(k: usize, sigma: f64, min_fail_sup: Option<usize>) -> Self {
        Self {
            k,
            sigma,
            min_fail_sup,
            maximal: true,
            start_max: Vec::new(),
        }
    }

    pub fn maximal(mut self, maximal: bool) -> Self {
        self.maximal = maximal;
        self
    }

    /// Seed the result set with nodes from an earlier search
    pub fn start_max(mut self, nodes: Vec<SearchNode>) -> Self {
        self.start_max = nodes;
        self
    }

    pub fn mine_from(
        &self,
        miner: &Miner<'_>,
        start: SearchNode,
        rng: &mut dyn RngCore,
        cancel: &CancelToken,
    ) -> MineOutcome {
        let pass = BestFirst {
            k: self.k,
            maximal: self.maximal,
            min_fail_sup: self.min_fail_sup.unwrap_or_else(|| miner.min_fails()),
            sigma: Some(self.sigma),
            start_max: &self.start_max,
        };
        pass.run(miner, start, rng, cancel)
    }
}

impl TopMiner for SLeap {
    fn name(&self) -> &'static str {
        "sleap"
    }

    fn mine(&self, miner: &Miner<'_>, rng: &mut dyn RngCore, cancel: &CancelToken) -> MineOutcome {
        self.mine_from(miner, miner.root(), rng, cancel)
    }
}

/// Repeated sLEAP passes with a falling support threshold
#[derive(Debug, Clone, Copy)]
pub struct Leap {
    k: usize,
    sigma: f64,
    maximal: bool,
}

impl Leap {
    pub fn new(k: usize, sigma: f64) -> Self {
        Self {
            k,
            sigma,
            maximal: true,
        }
    }

    pub fn maximal(mut self, maximal: bool) -> Self {
        self.maximal = maximal;
        self
    }

    pub fn mine_from(
        &self,
        miner: &Miner<'_>,
        start: SearchNode,
        rng: &mut dyn RngCore,
        cancel: &CancelToken,
    ) -> MineOutcome {
        let fails = miner.lattice().fail().graphs() as f64;
        let support = |p: f64| ((p * fails) as usize).max(miner.min_fails()).max(1);

        let mut stats = MineStats::default();
        let mut p = 1.0;
        let first = self.pass(miner, &start, self.sigma, support(p), Vec::new(), rng, cancel);
        stats.merge(&first.stats);
        let mut best = first.nodes;
        let mut prev = f64::NEG_INFINITY;
        let mut cur = sum(&best);

        while support(p) > miner.min_fails() && (cur - prev).abs() > CONVERGENCE && !cancel.is_cancelled() {
            p /= 2.0;
            let out = self.pass(miner, &start, self.sigma, support(p), best, rng, cancel);
            stats.merge(&out.stats);
            best = out.nodes;
            prev = cur;
            cur = sum(&best);
            debug!(
                "LEAP pass at support {}: {} found, |{:.4} - {:.4}| = {:.4}",
                support(p),
                best.len(),
                prev,
                cur,
                (cur - prev).abs()
            );
        }

        if !cancel.is_cancelled() {
            let out = self.pass(miner, &start, 0.0, miner.min_fails(), best, rng, cancel);
            stats.merge(&out.stats);
            best = out.nodes;
        }
        debug!(
            "LEAP finished after {} passes: {} found, {} leaps",
            stats.passes,
            best.len(),
            stats.leaps
        );
        MineOutcome { nodes: best, stats }
    }

    #[allow(clippy::too_many_arguments)]
    fn pass(
        &self,
        miner: &Miner<'_>,
        start: &SearchNode,
        sigma: f64,
        min_fail_sup: usize,
        seed: Vec<SearchNode>,
        rng: &mut dyn RngCore,
        cancel: &CancelToken,
    ) -> MineOutcome {
        SLeap::new(self.k, sigma, Some(min_fail_sup))
            .maximal(self.maximal)
            .start_max(seed)
            .mine_from(miner, start.clone(), rng, cancel)
    }
}

impl TopMiner for Leap {
    fn name(&self) -> &'static str {
        "leap"
    }

    fn mine(&self, miner: &Miner<'_>, rng: &mut dyn RngCore, cancel: &CancelToken) -> MineOutcome {
        self.mine_from(miner, miner.root(), rng, cancel)
    }
}

fn sum(nodes: &[SearchNode]) -> f64 {
    nodes.iter().map(|n| n.score).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorRegistry;
    use crate::graph::HostGraphBuilder;
    use crate::lattice::Lattice;
    use crate::mine::tests::fixture;
    use crate::mine::{BranchAndBound, MinerOptions};
    use crate::scoring::ScoreFunc;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn miner(lat: &crate::lattice::Lattice) -> Miner<'_> {
        let options = MinerOptions {
            max_edges: Some(3),
            min_fails: 1,
            ..MinerOptions::default()
        };
        Miner::new(lat, ScoreFunc::Precision, options).unwrap()
    }

    #[test]
    fn test_sleap_with_negative_sigma_matches_maximal_branch_and_bound() {
        let lat = fixture();
        let m = miner(&lat);
        let cancel = CancelToken::new();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let leap = SLeap::new(5, -10.0, None).mine(&m, &mut rng, &cancel);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let bb = BranchAndBound::new(5).maximal(true).mine(&m, &mut rng, &cancel);
        assert_eq!(leap.stats.leaps, 0);
        let labels = |o: &MineOutcome| o.nodes.iter().map(|n| n.label().to_vec()).collect::<Vec<_>>();
        assert_eq!(labels(&leap), labels(&bb));
    }

    #[test]
    fn test_leap_finds_best_pattern() {
        let lat = fixture();
        let m = miner(&lat);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let out = Leap::new(3, 0.01).mine(&m, &mut rng, &CancelToken::new());
        assert!(out.stats.passes >= 2);
        assert!(!out.nodes.is_empty());
        assert!((out.nodes[0].score - 9.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_seeded_results_survive() {
        let lat = fixture();
        let m = miner(&lat);
        let cancel = CancelToken::new();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let first = SLeap::new(2, 0.01, None).mine(&m, &mut rng, &cancel);
        // a pass that cannot expand anything still reports its seed
        let cancelled = CancelToken::new();
        cancelled.cancel();
        let again = SLeap::new(2, 0.01, None)
            .start_max(first.nodes.clone())
            .mine(&m, &mut rng, &cancelled);
        assert_eq!(again.nodes.len(), first.nodes.len());
    }

    /// Every failing run has `w <- x -> y`; passing runs hold the same
    /// vertices, never joined. `y` and `x` both grow into `x -> y`, and
    /// `x -> w` is only reachable from `x`.
    fn twin_parents() -> Lattice {
        let registry = ColorRegistry::new();
        let (x, y, w) = (registry.color("x"), registry.color("y"), registry.color("w"));
        let flow = registry.color("");
        let mut fail = HostGraphBuilder::new();
        let mut ok = HostGraphBuilder::new();
        for i in 0..10 {
            let vx = fail.add_vertex(x);
            let vy = fail.add_vertex(y);
            let vw = fail.add_vertex(w);
            fail.add_edge(vx, vy, flow);
            fail.add_edge(vx, vw, flow);
            fail.end_trace();

            ok.add_vertex(x);
            if i < 9 {
                ok.add_vertex(y);
            }
            if i < 4 {
                ok.add_vertex(w);
            }
            ok.end_trace();
        }
        Lattice::new(fail.build(0), ok.build(0), registry, 1)
    }

    #[test]
    fn test_leaping_skips_near_duplicate_parents() {
        let lat = twin_parents();
        let m = Miner::new(&lat, ScoreFunc::RelativeF1, MinerOptions::default()).unwrap();
        let cancel = CancelToken::new();
        let run = |sigma: f64| {
            let mut rng = ChaCha8Rng::seed_from_u64(6);
            SLeap::new(3, sigma, None).mine(&m, &mut rng, &cancel)
        };
        let exact = run(0.0);
        let leapt = run(0.5);

        assert_eq!(exact.stats.leaps, 0);
        // x behaves like x -> y, which was already expanded through y
        assert_eq!(leapt.stats.leaps, 1);
        assert_eq!(leapt.stats.expanded + 1, exact.stats.expanded);

        let labels = |o: &MineOutcome| o.nodes.iter().map(|n| n.label().to_vec()).collect::<Vec<_>>();
        assert_eq!(labels(&leapt), labels(&exact));
        assert_eq!(leapt.nodes[0].edge_count(), 2);
        for out in [&exact, &leapt] {
            for n in &out.nodes {
                assert!(
                    n.edge_count() >= m.max_edges() || m.filter_kids(m.min_fails(), n.score, &n.node).is_empty(),
                    "{} still has improving children",
                    n.node.pattern()
                );
            }
        }
    }

    #[test]
    fn test_leap_expands_less_with_positive_sigma() {
        let lat = twin_parents();
        let m = Miner::new(&lat, ScoreFunc::RelativeF1, MinerOptions::default()).unwrap();
        let run = |sigma: f64| {
            let mut rng = ChaCha8Rng::seed_from_u64(8);
            Leap::new(3, sigma).mine(&m, &mut rng, &CancelToken::new())
        };
        let exact = run(0.0);
        let leapt = run(0.5);
        assert_eq!(exact.stats.leaps, 0);
        assert!(leapt.stats.leaps > 0);
        assert!(leapt.stats.expanded < exact.stats.expanded);
        assert_eq!(leapt.nodes[0].label(), exact.nodes[0].label());
        assert!((leapt.nodes[0].score - 5.4 / 24.6).abs() < 1e-9);
    }
}
