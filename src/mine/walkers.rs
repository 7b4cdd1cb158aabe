//! Random walks down the lattice
//!
//! A walk starts at the root or at a single-color node and repeatedly steps
//! to an improving child until it reaches `max_edges` or runs out of
//! children. Each walk yields one candidate.

use super::rank::{localize_colors, unique};
use super::{MineOutcome, MineStats, Miner, SearchNode, TopMiner};
use crate::cancel::CancelToken;
use crate::color::Color;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

/// Added to every shifted weight so zero scores stay reachable
const WEIGHT_FLOOR: f64 = 1e-8;

/// Score drop that separates two groups of top colors
const GROUP_GAP: f64 = 1e-4;

pub trait Walker: Send + Sync {
    fn name(&self) -> &'static str;

    fn walk_from(
        &self,
        miner: &Miner<'_>,
        start: SearchNode,
        rng: &mut dyn RngCore,
        cancel: &CancelToken,
    ) -> SearchNode;

    fn walk(&self, miner: &Miner<'_>, rng: &mut dyn RngCore, cancel: &CancelToken) -> SearchNode {
        self.walk_from(miner, miner.root(), rng, cancel)
    }

    /// `None` when the color has no node in the failing graph
    fn walk_from_color(
        &self,
        miner: &Miner<'_>,
        color: Color,
        rng: &mut dyn RngCore,
        cancel: &CancelToken,
    ) -> Option<SearchNode> {
        let start = miner.color_node(color)?;
        Some(self.walk_from(miner, start, rng, cancel))
    }
}

/// Unweighted random walk: each step picks an improving child uniformly
#[derive(Debug, Clone, Copy, Default)]
pub struct Urw;

impl Walker for Urw {
    fn name(&self) -> &'static str {
        "urw"
    }

    fn walk_from(
        &self,
        miner: &Miner<'_>,
        start: SearchNode,
        rng: &mut dyn RngCore,
        cancel: &CancelToken,
    ) -> SearchNode {
        let mut cur = start;
        loop {
            if cancel.is_cancelled() || cur.edge_count() >= miner.max_edges() {
                return cur;
            }
            let mut kids = miner.filter_kids(miner.min_fails(), cur.score, &cur.node);
            if kids.is_empty() {
                return cur;
            }
            let i = rng.random_range(0..kids.len());
            cur = kids.swap_remove(i);
            trace!("urw step {}", cur);
        }
    }
}

/// Score-weighted random walk.
///
/// Steps are drawn in proportion to child score. With probability
/// `1 / max_edges` per step the walk restarts from its start node, and with
/// `sample_non_max` it may also stop early with the same probability.
#[derive(Debug, Clone, Copy, Default)]
pub struct Swrw {
    sample_non_max: bool,
}

impl Swrw {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_non_max(mut self, sample: bool) -> Self {
        self.sample_non_max = sample;
        self
    }
}

impl Walker for Swrw {
    fn name(&self) -> &'static str {
        "swrw"
    }

    fn walk_from(
        &self,
        miner: &Miner<'_>,
        start: SearchNode,
        rng: &mut dyn RngCore,
        cancel: &CancelToken,
    ) -> SearchNode {
        let restart = 1.0 / miner.max_edges() as f64;
        let mut cur = start.clone();
        loop {
            if cancel.is_cancelled() || cur.edge_count() >= miner.max_edges() {
                return cur;
            }
            if rng.random::<f64>() < restart {
                cur = start.clone();
                continue;
            }
            if self.sample_non_max && rng.random::<f64>() < restart {
                return cur;
            }
            let kids = miner.filter_kids(miner.min_fails(), cur.score, &cur.node);
            match weighted(kids, rng) {
                Some(kid) => cur = kid,
                None => return cur,
            }
            trace!("swrw step {}", cur);
        }
    }
}

/// Draw one node with probability proportional to its score, after
/// shifting every score to be non-negative
fn weighted(mut nodes: Vec<SearchNode>, rng: &mut dyn RngCore) -> Option<SearchNode> {
    match nodes.len() {
        0 => return None,
        1 => return nodes.pop(),
        _ => {}
    }
    let min = nodes.iter().map(|n| n.score).fold(f64::INFINITY, f64::min);
    let shift = if min < 0.0 { -min } else { 0.0 };
    let weights: Vec<f64> = nodes.iter().map(|n| n.score + shift + WEIGHT_FLOOR).collect();
    let i = match WeightedIndex::new(&weights) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.random_range(0..nodes.len()),
    };
    Some(nodes.swap_remove(i))
}

fn walk_result(miner: &Miner<'_>, node: SearchNode) -> Option<SearchNode> {
    miner.is_candidate(&node).then_some(node)
}

/// `walks` sequential walks from the root
pub struct Walking<W> {
    walker: W,
    walks: usize,
}

impl<W: Walker> Walking<W> {
    pub fn new(walker: W, walks: usize) -> Self {
        Self { walker, walks }
    }
}

impl<W: Walker> TopMiner for Walking<W> {
    fn name(&self) -> &'static str {
        self.walker.name()
    }

    fn mine(&self, miner: &Miner<'_>, rng: &mut dyn RngCore, cancel: &CancelToken) -> MineOutcome {
        let mut stats = MineStats::default();
        let mut found = Vec::new();
        for _ in 0..self.walks {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            stats.walks += 1;
            let end = self.walker.walk(miner, rng, cancel);
            found.extend(walk_result(miner, end));
        }
        debug!("{}: {} walks, {} candidates", self.walker.name(), stats.walks, found.len());
        MineOutcome {
            nodes: unique(found),
            stats,
        }
    }
}

/// Independent walks spread over the rayon pool. Walk `i` draws from its
/// own generator seeded with `seed + i`, so results do not depend on
/// scheduling.
pub struct ParWalking<W> {
    walker: W,
    walks: usize,
}

impl<W: Walker> ParWalking<W> {
    pub fn new(walker: W, walks: usize) -> Self {
        Self { walker, walks }
    }
}

impl<W: Walker> TopMiner for ParWalking<W> {
    fn name(&self) -> &'static str {
        self.walker.name()
    }

    fn mine(&self, miner: &Miner<'_>, rng: &mut dyn RngCore, cancel: &CancelToken) -> MineOutcome {
        let seed = rng.next_u64();
        let ends: Vec<Option<SearchNode>> = (0..self.walks)
            .into_par_iter()
            .map(|i| {
                if cancel.is_cancelled() {
                    return None;
                }
                let mut walk_rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
                Some(self.walker.walk(miner, &mut walk_rng, cancel))
            })
            .collect();
        let stats = MineStats {
            walks: ends.iter().filter(|e| e.is_some()).count(),
            cancelled: cancel.is_cancelled(),
            ..MineStats::default()
        };
        let found: Vec<SearchNode> = ends
            .into_iter()
            .flatten()
            .filter_map(|end| walk_result(miner, end))
            .collect();
        debug!("parallel {}: {} walks, {} candidates", self.walker.name(), stats.walks, found.len());
        MineOutcome {
            nodes: unique(found),
            stats,
        }
    }
}

/// Walks seeded from the highest scoring single colors.
///
/// Colors are visited best first, `walks_per_color` walks each, until at
/// least `percent_of_colors` of them (and never fewer than ten) have been
/// walked and the walked colors span `min_groups` distinct score levels.
pub struct WalkingTopColors<W> {
    walker: W,
    percent_of_colors: f64,
    walks_per_color: usize,
    min_groups: usize,
    skip_seen_colors: bool,
}

impl<W: Walker> WalkingTopColors<W> {
    pub fn new(walker: W) -> Self {
        Self {
            walker,
            percent_of_colors: 0.0625,
            walks_per_color: 2,
            min_groups: 2,
            skip_seen_colors: false,
        }
    }

    pub fn percent_of_colors(mut self, percent: f64) -> Self {
        self.percent_of_colors = percent;
        self
    }

    pub fn walks_per_color(mut self, walks: usize) -> Self {
        self.walks_per_color = walks;
        self
    }

    pub fn min_groups(mut self, groups: usize) -> Self {
        self.min_groups = groups;
        self
    }

    /// Skip colors already covered by an earlier result
    pub fn skip_seen_colors(mut self, skip: bool) -> Self {
        self.skip_seen_colors = skip;
        self
    }
}

impl<W: Walker> TopMiner for WalkingTopColors<W> {
    fn name(&self) -> &'static str {
        "top-colors"
    }

    fn mine(&self, miner: &Miner<'_>, rng: &mut dyn RngCore, cancel: &CancelToken) -> MineOutcome {
        let locations = localize_colors(miner);
        let total = ((self.percent_of_colors * locations.len() as f64) as usize)
            .max(10)
            .min(locations.len());

        let mut stats = MineStats::default();
        let mut added: FxHashSet<Vec<u8>> = FxHashSet::default();
        let mut covered: FxHashSet<Color> = FxHashSet::default();
        let mut found = Vec::new();
        let mut prev_score: Option<f64> = None;
        let mut groups = 0;

        for (i, location) in locations.iter().enumerate() {
            if i >= total && groups >= self.min_groups {
                break;
            }
            if let Some(prev) = prev_score {
                if prev - location.score > GROUP_GAP {
                    groups += 1;
                }
            }
            prev_score = Some(location.score);
            if self.skip_seen_colors && covered.contains(&location.color) {
                trace!("skipping covered color {}", location.color);
                continue;
            }
            for _ in 0..self.walks_per_color {
                if cancel.is_cancelled() {
                    stats.cancelled = true;
                    break;
                }
                stats.walks += 1;
                let Some(end) = self.walker.walk_from_color(miner, location.color, rng, cancel) else {
                    break;
                };
                let Some(end) = walk_result(miner, end) else {
                    continue;
                };
                if !added.insert(end.label().to_vec()) {
                    continue;
                }
                covered.extend(end.node.pattern().vertices().iter().map(|v| v.color));
                found.push(end);
            }
            if stats.cancelled {
                break;
            }
        }

        debug!(
            "top colors: {} walks over {} groups, {} candidates",
            stats.walks,
            groups,
            found.len()
        );
        MineOutcome {
            nodes: unique(found),
            stats,
        }
    }
}
