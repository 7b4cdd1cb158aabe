//! Best-first top-k search with score-bound pruning
//!
//! [`BestFirst`] is the skeleton shared with sLEAP: pop the highest scoring
//! node, skip labels already expanded, and push every child whose `Max`
//! bound can still reach the result set.

use super::{MineOutcome, MineStats, Miner, Ranked, SearchNode, TopK, TopMiner};
use crate::cancel::CancelToken;
use rand::RngCore;
use rustc_hash::FxHashSet;
use std::collections::BinaryHeap;
use tracing::{debug, trace};

/// One best-first pass
#[derive(Debug, Clone)]
pub(crate) struct BestFirst<'s> {
    pub k: usize,
    pub maximal: bool,
    pub min_fail_sup: usize,
    /// Leap threshold; `None` never leaps
    pub sigma: Option<f64>,
    /// Results of an earlier pass seeding the result set
    pub start_max: &'s [SearchNode],
}

impl BestFirst<'_> {
    pub fn run(
        &self,
        miner: &Miner<'_>,
        start: SearchNode,
        rng: &mut dyn RngCore,
        cancel: &CancelToken,
    ) -> MineOutcome {
        self.run_visiting(miner, start, rng, cancel).0
    }

    /// Like [`run`](Self::run), also returning the label of every node
    /// that was popped and expanded
    fn run_visiting(
        &self,
        miner: &Miner<'_>,
        start: SearchNode,
        rng: &mut dyn RngCore,
        cancel: &CancelToken,
    ) -> (MineOutcome, FxHashSet<Vec<u8>>) {
        let mut stats = MineStats {
            passes: 1,
            ..MineStats::default()
        };
        let mut best = TopK::new(self.k);
        for n in self.start_max {
            best.offer(n.clone(), rng);
        }
        let mut queue: BinaryHeap<Ranked> = BinaryHeap::new();
        queue.push(Ranked(start));
        let mut seen: FxHashSet<Vec<u8>> = FxHashSet::default();

        'search: while let Some(Ranked(cur)) = queue.pop() {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                debug!("Search cancelled with {} queued, {} best", queue.len(), best.len());
                break;
            }
            if !seen.insert(cur.label().to_vec()) {
                continue;
            }
            stats.expanded += 1;
            trace!("cur {} {} {}", queue.len(), best.len(), cur);

            if cur.edge_count() >= miner.max_edges() {
                if miner.is_candidate(&cur) {
                    best.offer(cur, rng);
                }
                continue;
            }

            let kids = if self.maximal {
                miner.filter_kids(self.min_fail_sup, cur.score, &cur.node)
            } else {
                miner.score_kids(self.min_fail_sup, &cur.node)
            };

            if let Some(sigma) = self.sigma {
                for kid in &kids {
                    if seen.contains(kid.label()) && miner.near_duplicate(&cur, kid, sigma) {
                        trace!("leaping from {}", cur);
                        stats.leaps += 1;
                        continue 'search;
                    }
                }
            }

            let mut had_kid = false;
            for kid in kids {
                let bound = miner.max_bound(&kid.node);
                if !best.admits(bound) {
                    stats.record_prune(bound);
                    continue;
                }
                had_kid = true;
                if !seen.contains(kid.label()) {
                    stats.pushed += 1;
                    queue.push(Ranked(kid));
                }
            }

            if (!self.maximal || !had_kid) && miner.is_candidate(&cur) {
                best.offer(cur, rng);
            }
        }

        let outcome = MineOutcome {
            nodes: best.into_sorted(),
            stats,
        };
        (outcome, seen)
    }
}

/// Exhaustive top-k branch-and-bound.
///
/// In maximal mode only children that improve on their parent are
/// followed, and a node is reported only when none of them survives.
#[derive(Debug, Clone, Copy)]
pub struct BranchAndBound {
    k: usize,
    maximal: bool,
}

impl BranchAndBound {
    pub fn new(k: usize) -> Self {
        Self { k, maximal: false }
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
        let pass = BestFirst {
            k: self.k,
            maximal: self.maximal,
            min_fail_sup: miner.min_fails(),
            sigma: None,
            start_max: &[],
        };
        let outcome = pass.run(miner, start, rng, cancel);
        debug!(
            "Branch and bound: {} expanded, {} pruned, {} found",
            outcome.stats.expanded,
            outcome.stats.pruned,
            outcome.nodes.len()
        );
        outcome
    }
}

impl TopMiner for BranchAndBound {
    fn name(&self) -> &'static str {
        "branch-and-bound"
    }

    fn mine(&self, miner: &Miner<'_>, rng: &mut dyn RngCore, cancel: &CancelToken) -> MineOutcome {
        self.mine_from(miner, miner.root(), rng, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mine::tests::fixture;
    use crate::mine::MinerOptions;
    use crate::scoring::ScoreFunc;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn options() -> MinerOptions {
        MinerOptions {
            max_edges: Some(3),
            min_fails: 1,
            ..MinerOptions::default()
        }
    }

    #[test]
    fn test_finds_failing_path() {
        let lat = fixture();
        let miner = Miner::new(&lat, ScoreFunc::Precision, options()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let out = BranchAndBound::new(3).mine(&miner, &mut rng, &CancelToken::new());
        assert!(!out.nodes.is_empty());
        assert!(out.nodes.len() <= 3);
        // b -> c never runs in passing traces; only b's own frequency counts
        assert!((out.nodes[0].score - 9.0 / 11.0).abs() < 1e-9);
        assert_eq!(out.nodes[0].edge_count(), 1);
        assert!(out.nodes.iter().all(|n| n.edge_count() >= 1));
        for pair in out.nodes.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_pruned_bounds_stay_below_results() {
        let lat = fixture();
        let miner = Miner::new(&lat, ScoreFunc::Precision, options()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let out = BranchAndBound::new(1).mine(&miner, &mut rng, &CancelToken::new());
        let worst = out.nodes.last().map(|n| n.score).unwrap();
        if let Some(bound) = out.stats.max_pruned_bound {
            assert!(bound <= worst);
        }
    }

    #[test]
    fn test_unexpanded_nodes_bounded_by_results() {
        let lat = fixture();
        let miner = Miner::new(&lat, ScoreFunc::Precision, options()).unwrap();
        for k in [1, 2] {
            let pass = BestFirst {
                k,
                maximal: false,
                min_fail_sup: miner.min_fails(),
                sigma: None,
                start_max: &[],
            };
            let mut rng = ChaCha8Rng::seed_from_u64(17);
            let (out, visited) = pass.run_visiting(&miner, miner.root(), &mut rng, &CancelToken::new());
            assert_eq!(out.nodes.len(), k);
            assert!(out.stats.pruned > 0);
            let worst = out.nodes[k - 1].score;

            // every supported node the search never expanded
            let mut all: FxHashSet<Vec<u8>> = FxHashSet::default();
            let mut stack = vec![lat.root()];
            let mut unvisited = Vec::new();
            while let Some(node) = stack.pop() {
                if node.edge_count() >= miner.max_edges() {
                    continue;
                }
                for kid in node.children(&lat) {
                    if kid.mni() < miner.min_fails() || !all.insert(kid.label().to_vec()) {
                        continue;
                    }
                    if !visited.contains(kid.label()) {
                        unvisited.push(kid.clone());
                    }
                    stack.push(kid.clone());
                }
            }
            assert!(!unvisited.is_empty());
            for node in unvisited {
                let bound = miner.max_bound(&node);
                assert!(bound <= worst + 1e-12, "{} bounded by {} above {}", node.pattern(), bound, worst);
            }
        }
    }

    #[test]
    fn test_cancelled_search_stops_early() {
        let lat = fixture();
        let miner = Miner::new(&lat, ScoreFunc::Precision, options()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = BranchAndBound::new(3).mine(&miner, &mut rng, &cancel);
        assert!(out.stats.cancelled);
        assert!(out.nodes.is_empty());
        assert_eq!(out.stats.expanded, 0);
    }

    #[test]
    fn test_maximal_reports_only_leaves() {
        let lat = fixture();
        let miner = Miner::new(&lat, ScoreFunc::Precision, options()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let out = BranchAndBound::new(5)
            .maximal(true)
            .mine(&miner, &mut rng, &CancelToken::new());
        // b -> c, and a -> b -> c reached through a -> b
        assert_eq!(out.nodes.len(), 2);
        assert!((out.nodes[0].score - 9.0 / 11.0).abs() < 1e-9);
        assert!((out.nodes[1].score - 15.0 / 23.0).abs() < 1e-9);
        for n in &out.nodes {
            assert!(miner.filter_kids(miner.min_fails(), n.score, &n.node).is_empty());
        }
    }
}
