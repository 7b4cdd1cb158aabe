//! Top-k search over the pattern lattice
//!
//! A [`Miner`] ties a lattice to a scoring function and the size limits of
//! the search. Strategies ([`BranchAndBound`], [`SLeap`], [`Leap`] and the
//! random-walk drivers) implement [`TopMiner`] and return their candidates
//! ranked by score, best first.

pub mod branch_bound;
pub mod leap;
pub mod rank;
pub mod report;
pub mod walkers;

use crate::cancel::CancelToken;
use crate::color::Color;
use crate::config::MinerConfig;
use crate::embedding::{Embedding, StartPoint};
use crate::error::{MineError, MineResult};
use crate::lattice::{Lattice, LatticeNode};
use crate::pattern::PatternBuilder;
use crate::scoring::{OkSupport, Score, ScoreFunc};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::sync::Arc;
use tracing::{info, trace, warn};

pub use branch_bound::BranchAndBound;
pub use leap::{Leap, SLeap};
pub use rank::{cluster, group_by_score, group_locations, localize_colors, unique, Cluster, ScoredLocation};
pub use report::SearchReport;
pub use walkers::{ParWalking, Swrw, Urw, Walker, Walking, WalkingTopColors};

/// Score given to the root. Below every valid score, above every invalid one.
pub const ROOT_SCORE: f64 = f64::MIN;

/// Tolerance for "precision is exactly one" when a child ties its parent
const PRECISION_EPSILON: f64 = 1e-17;

/// A lattice node with its suspiciousness score.
///
/// Nodes whose score falls outside the function's domain carry
/// `f64::NEG_INFINITY`. They can still be expanded but are never reported.
#[derive(Debug, Clone)]
pub struct SearchNode {
    pub node: Arc<LatticeNode>,
    pub score: f64,
    /// Witness test cases, keyed by embedding index
    pub witnesses: BTreeMap<usize, String>,
}

impl SearchNode {
    pub fn new(node: Arc<LatticeNode>, score: f64) -> Self {
        Self {
            node,
            score,
            witnesses: BTreeMap::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.node.is_root()
    }

    /// Whether the score is inside the scoring function's domain
    pub fn is_valid(&self) -> bool {
        self.score.is_finite()
    }

    pub fn label(&self) -> &[u8] {
        self.node.label()
    }

    pub fn edge_count(&self) -> usize {
        self.node.edge_count()
    }

    pub fn attach_witness(&mut self, embedding: usize, test: impl Into<String>) {
        self.witnesses.insert(embedding, test.into());
    }
}

impl fmt::Display for SearchNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8.5} {}", self.score, self.node.pattern())
    }
}

/// Counters collected by a search
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MineStats {
    pub expanded: usize,
    pub pushed: usize,
    pub pruned: usize,
    /// Largest `Max` bound among children pruned against a full result set
    pub max_pruned_bound: Option<f64>,
    pub leaps: usize,
    pub walks: usize,
    pub passes: usize,
    pub cancelled: bool,
}

impl MineStats {
    pub(crate) fn record_prune(&mut self, bound: f64) {
        self.pruned += 1;
        self.max_pruned_bound = Some(self.max_pruned_bound.map_or(bound, |b| b.max(bound)));
    }

    pub(crate) fn merge(&mut self, other: &MineStats) {
        self.expanded += other.expanded;
        self.pushed += other.pushed;
        self.pruned += other.pruned;
        if let Some(bound) = other.max_pruned_bound {
            self.max_pruned_bound = Some(self.max_pruned_bound.map_or(bound, |b| b.max(bound)));
        }
        self.leaps += other.leaps;
        self.walks += other.walks;
        self.passes += other.passes;
        self.cancelled |= other.cancelled;
    }
}

/// Result of a search: nodes best first, plus counters
#[derive(Debug, Clone, Default)]
pub struct MineOutcome {
    pub nodes: Vec<SearchNode>,
    pub stats: MineStats,
}

impl MineOutcome {
    /// Sum of the reported scores
    pub fn score_sum(&self) -> f64 {
        self.nodes.iter().map(|n| n.score).sum()
    }
}

/// A search strategy over the lattice
pub trait TopMiner: Send + Sync {
    fn name(&self) -> &'static str;

    fn mine(&self, miner: &Miner<'_>, rng: &mut dyn RngCore, cancel: &CancelToken) -> MineOutcome;
}

/// Run the search a configuration describes, returning the outcome and its
/// report
pub fn mine_with_config(lattice: &Lattice, config: &MinerConfig) -> MineResult<(MineOutcome, SearchReport)> {
    config.validate()?;
    let miner = Miner::new(lattice, config.score_func()?, config.miner_options())?;
    let strategy = config.strategy();
    let cancel = config.cancel_token();
    let mut rng: Box<dyn RngCore> = match config.search.seed {
        Some(seed) => Box::new(ChaCha8Rng::seed_from_u64(seed)),
        None => Box::new(rand::rng()),
    };
    info!(
        "Mining with {} (k={}, score {}, max edges {})",
        strategy.name(),
        config.search.k,
        miner.score().func(),
        miner.max_edges()
    );
    let outcome = strategy.mine(&miner, rng.as_mut(), &cancel);
    if outcome.stats.cancelled {
        warn!("Search stopped early; returning {} results found so far", outcome.nodes.len());
    }
    let mut report = SearchReport::new(&miner, strategy.name(), &outcome);
    if let Some(epsilon) = config.search.cluster_epsilon {
        let clusters = cluster(&outcome.nodes, epsilon);
        info!("Grouped {} results into {} clusters", outcome.nodes.len(), clusters.len());
        report = report.with_clusters(&clusters);
    }
    Ok((outcome, report))
}

/// Size limits and scoring settings for a search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinerOptions {
    /// Largest pattern, in edges. `None` uses the failing graph's edge count.
    pub max_edges: Option<usize>,
    /// Smallest pattern, in edges, that may be reported
    pub min_edges: usize,
    /// Smallest failing-graph support a reported pattern may have
    pub min_fails: usize,
    pub ok_support: OkSupport,
    /// Start point and worker count for exact passing-graph support
    pub start: StartPoint,
    pub workers: usize,
}

impl Default for MinerOptions {
    fn default() -> Self {
        Self {
            max_edges: None,
            min_edges: 1,
            min_fails: 2,
            ok_support: OkSupport::default(),
            start: StartPoint::default(),
            workers: 1,
        }
    }
}

impl MinerOptions {
    pub fn validate(&self) -> MineResult<()> {
        if let Some(max) = self.max_edges {
            if max < 2 {
                return Err(MineError::Config(format!("max_edges must be >= 2 (got {})", max)));
            }
        }
        if self.min_fails < 1 {
            return Err(MineError::Config(format!(
                "min_fails must be >= 1 (got {})",
                self.min_fails
            )));
        }
        if self.workers < 1 {
            return Err(MineError::Config("workers must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// A lattice, a score, and the limits every strategy searches within
#[derive(Debug)]
pub struct Miner<'a> {
    lattice: &'a Lattice,
    score: Score,
    max_edges: usize,
    min_edges: usize,
    min_fails: usize,
}

impl<'a> Miner<'a> {
    pub fn new(lattice: &'a Lattice, func: ScoreFunc, options: MinerOptions) -> MineResult<Self> {
        options.validate()?;
        let max_edges = options
            .max_edges
            .unwrap_or_else(|| lattice.fail().graph().edge_count())
            .max(2);
        let score = Score::new(func, options.min_fails, max_edges)
            .with_ok_support(options.ok_support)
            .with_search(options.start, options.workers);
        Ok(Self {
            lattice,
            score,
            max_edges,
            min_edges: options.min_edges,
            min_fails: options.min_fails,
        })
    }

    pub fn lattice(&self) -> &'a Lattice {
        self.lattice
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn max_edges(&self) -> usize {
        self.max_edges
    }

    pub fn min_edges(&self) -> usize {
        self.min_edges
    }

    pub fn min_fails(&self) -> usize {
        self.min_fails
    }

    pub fn root(&self) -> SearchNode {
        SearchNode::new(self.lattice.root(), ROOT_SCORE)
    }

    /// Score a node, mapping out-of-domain results to `NEG_INFINITY`
    pub fn search_node(&self, node: Arc<LatticeNode>) -> SearchNode {
        let score = match self.score.score(self.lattice, &node) {
            Ok(s) => s,
            Err(e) => {
                trace!("{}: {}", node.pattern(), e);
                f64::NEG_INFINITY
            }
        };
        SearchNode::new(node, score)
    }

    /// The single-vertex node for `color`, embedded at every failing-graph
    /// vertex of that color. `None` if the color was filtered out.
    pub fn color_node(&self, color: Color) -> Option<SearchNode> {
        if let Some(node) = self.lattice.node_for_color(color) {
            return Some(self.search_node(node));
        }
        let ids = self.lattice.fail().vertices_with_color(color);
        if ids.is_empty() {
            return None;
        }
        let embeddings: Vec<Embedding> = ids.iter().map(|&id| Embedding::start(0, id)).collect();
        let pattern = PatternBuilder::from_vertex(color).build();
        let node = LatticeNode::new(pattern, embeddings, FxHashSet::default());
        Some(self.search_node(Arc::new(node)))
    }

    /// Upper bound on the score of `node` and its descendants
    pub fn max_bound(&self, node: &LatticeNode) -> f64 {
        self.score.max(self.lattice, node)
    }

    /// Every child with at least `min_fail_sup` failing support, scored
    pub fn score_kids(&self, min_fail_sup: usize, node: &LatticeNode) -> Vec<SearchNode> {
        node.children(self.lattice)
            .iter()
            .filter(|kid| kid.mni() >= min_fail_sup)
            .map(|kid| self.search_node(kid.clone()))
            .collect()
    }

    /// Supported children that improve on `parent_score`. A child that
    /// only ties its parent survives when it is never seen in passing runs.
    pub fn filter_kids(&self, min_fail_sup: usize, parent_score: f64, node: &LatticeNode) -> Vec<SearchNode> {
        self.score_kids(min_fail_sup, node)
            .into_iter()
            .filter(|kid| {
                if !kid.is_valid() {
                    return false;
                }
                if kid.score > parent_score {
                    return true;
                }
                let (_, prf) = self.score.failure_probability(self.lattice, &kid.node);
                let (_, pro) = self.score.ok_probability(self.lattice, &kid.node);
                kid.score == parent_score && (1.0 - prf / (pro + prf)).abs() <= PRECISION_EPSILON
            })
            .collect()
    }

    /// Whether `kid` behaves like `parent` in both classes: the normalized
    /// drop in failing and in passing probability are both below `sigma`.
    pub fn near_duplicate(&self, parent: &SearchNode, kid: &SearchNode, sigma: f64) -> bool {
        let (_, cp) = self.score.failure_probability(self.lattice, &parent.node);
        let (_, kp) = self.score.failure_probability(self.lattice, &kid.node);
        let (_, cn) = self.score.ok_probability(self.lattice, &parent.node);
        let (_, kn) = self.score.ok_probability(self.lattice, &kid.node);
        let pc = 2.0 * (cp - kp) / (cp + kp);
        let nc = 2.0 * (cn - kn) / (cn + kn);
        pc < sigma && nc < sigma
    }

    /// Whether a node may be reported
    pub(crate) fn is_candidate(&self, node: &SearchNode) -> bool {
        !node.is_root() && node.is_valid() && node.edge_count() >= self.min_edges
    }
}

/// Orders search nodes by score, then by label so ties pop deterministically
#[derive(Debug, Clone)]
pub(crate) struct Ranked(pub SearchNode);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .score
            .total_cmp(&other.0.score)
            .then_with(|| other.0.label().cmp(self.0.label()))
    }
}

/// The k best nodes seen so far, as a min-heap on score
#[derive(Debug)]
pub(crate) struct TopK {
    k: usize,
    heap: BinaryHeap<Reverse<Ranked>>,
    labels: FxHashSet<Vec<u8>>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
            labels: FxHashSet::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    pub fn min_score(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse(r)| r.0.score)
    }

    /// Whether a node bounded by `bound` could still enter the set
    pub fn admits(&self, bound: f64) -> bool {
        match self.min_score() {
            Some(min) if self.is_full() => bound >= min,
            _ => true,
        }
    }

    /// Insert `node` if it beats the current minimum. An exact tie replaces
    /// the minimum with probability one half.
    pub fn offer(&mut self, node: SearchNode, rng: &mut dyn RngCore) -> bool {
        if self.k == 0 || node.is_root() || !node.is_valid() || self.labels.contains(node.label()) {
            return false;
        }
        if !self.is_full() {
            self.insert(node);
            return true;
        }
        let min = match self.min_score() {
            Some(min) => min,
            None => return false,
        };
        let replace = node.score > min || (node.score == min && rng.next_u32() & 1 == 1);
        if replace {
            if let Some(Reverse(Ranked(evicted))) = self.heap.pop() {
                self.labels.remove(evicted.label());
            }
            self.insert(node);
        }
        replace
    }

    fn insert(&mut self, node: SearchNode) {
        self.labels.insert(node.label().to_vec());
        self.heap.push(Reverse(Ranked(node)));
    }

    /// Nodes best first
    pub fn into_sorted(self) -> Vec<SearchNode> {
        let mut nodes: Vec<SearchNode> = self.heap.into_iter().map(|Reverse(Ranked(n))| n).collect();
        nodes.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.label().cmp(b.label())));
        nodes
    }
}
