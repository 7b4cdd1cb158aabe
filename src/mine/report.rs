//! Serializable summary of a search
//!
//! Patterns are rendered with registry labels and carry their canonical
//! label as hex, so a result can be rebuilt later with
//! `Lattice::node_from_label`.

use super::rank::{group_by_score, Cluster};
use super::{MineOutcome, MineStats, Miner, SearchNode};
use crate::scoring::Probabilities;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Serialize)]
pub struct PatternReport {
    pub rank: usize,
    pub score: f64,
    pub pattern: String,
    pub label: String,
    pub vertices: usize,
    pub edges: usize,
    pub embeddings: usize,
    pub support: usize,
    pub probabilities: Probabilities,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub witnesses: BTreeMap<usize, String>,
}

/// A cluster of results, by their rank in `results`
#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub score: f64,
    pub ranks: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub strategy: String,
    pub score: String,
    pub failing_traces: usize,
    pub passing_traces: usize,
    pub stats: MineStats,
    pub results: Vec<PatternReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<ClusterReport>,
}

impl SearchReport {
    pub fn new(miner: &Miner<'_>, strategy: &str, outcome: &MineOutcome) -> Self {
        let lattice = miner.lattice();
        let results = outcome
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| pattern_report(miner, i + 1, n))
            .collect();
        Self {
            strategy: strategy.to_string(),
            score: miner.score().func().to_string(),
            failing_traces: lattice.fail().graphs(),
            passing_traces: lattice.ok().graphs(),
            stats: outcome.stats.clone(),
            results,
            clusters: Vec::new(),
        }
    }

    /// Attach clusters of this report's results
    pub fn with_clusters(mut self, clusters: &[Cluster]) -> Self {
        let rank_of = |label: String| self.results.iter().find(|r| r.label == label).map(|r| r.rank);
        self.clusters = clusters
            .iter()
            .map(|c| ClusterReport {
                score: c.score,
                ranks: c.nodes.iter().filter_map(|n| rank_of(to_hex(n.label()))).collect(),
            })
            .collect();
        self
    }
}

fn pattern_report(miner: &Miner<'_>, rank: usize, n: &SearchNode) -> PatternReport {
    let lattice = miner.lattice();
    PatternReport {
        rank,
        score: n.score,
        pattern: n.node.pattern().pretty(lattice.registry()),
        label: to_hex(n.label()),
        vertices: n.node.vertex_count(),
        edges: n.edge_count(),
        embeddings: n.node.embeddings().len(),
        support: n.node.mni(),
        probabilities: miner.score().probabilities(lattice, &n.node),
        witnesses: n.witnesses.clone(),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

/// Parse a label rendered by the report back into bytes
pub fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Render report as JSON
pub fn render(report: &SearchReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Render report as compact JSON (single line)
pub fn render_compact(report: &SearchReport) -> Result<String> {
    Ok(serde_json::to_string(report)?)
}

/// Plain text, one block per score group
pub fn render_text(miner: &Miner<'_>, outcome: &MineOutcome) -> String {
    let registry = miner.lattice().registry();
    let mut out = String::new();
    for (i, group) in group_by_score(outcome.nodes.clone()).iter().enumerate() {
        let _ = writeln!(out, "group {} ({:.5})", i + 1, group[0].score);
        for n in group {
            let _ = writeln!(out, "  {}", n.node.pattern().pretty(registry));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::mine::tests::fixture;
    use crate::mine::{BranchAndBound, MinerOptions, TopMiner};
    use crate::scoring::ScoreFunc;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_report_round_trips_labels() {
        let lat = fixture();
        let options = MinerOptions {
            max_edges: Some(3),
            min_fails: 1,
            ..MinerOptions::default()
        };
        let miner = Miner::new(&lat, ScoreFunc::Precision, options).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let strategy = BranchAndBound::new(2);
        let outcome = strategy.mine(&miner, &mut rng, &CancelToken::new());
        let report = SearchReport::new(&miner, strategy.name(), &outcome);

        let json = render(&report).expect("render JSON");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("parse JSON");
        assert_eq!(parsed["strategy"], "branch-and-bound");
        assert_eq!(parsed["score"], "Precision");
        assert_eq!(parsed["failing_traces"], 4);
        let results = parsed["results"].as_array().expect("results array");
        assert_eq!(results.len(), outcome.nodes.len());
        assert_eq!(results[0]["rank"], 1);

        let label = from_hex(&report.results[0].label).expect("hex label");
        let node = lat.node_from_label(&label).expect("rebuild node");
        assert_eq!(node.label(), outcome.nodes[0].label());
        assert!(!render_compact(&report).expect("compact").contains('\n'));
        assert!(render_text(&miner, &outcome).starts_with("group 1"));
    }

    #[test]
    fn test_clusters_refer_to_result_ranks() {
        let lat = fixture();
        let options = MinerOptions {
            max_edges: Some(3),
            min_fails: 1,
            ..MinerOptions::default()
        };
        let miner = Miner::new(&lat, ScoreFunc::Precision, options).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let outcome = BranchAndBound::new(3).mine(&miner, &mut rng, &CancelToken::new());
        let report = SearchReport::new(&miner, "branch-and-bound", &outcome);
        let parsed: serde_json::Value = serde_json::from_str(&render(&report).unwrap()).unwrap();
        assert!(parsed.get("clusters").is_none());

        let clusters = crate::mine::cluster(&outcome.nodes, 1.0);
        let report = report.with_clusters(&clusters);
        assert_eq!(report.clusters.len(), 1);
        let mut ranks = report.clusters[0].ranks.clone();
        ranks.sort();
        assert_eq!(ranks, (1..=outcome.nodes.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert_eq!(from_hex("00ff10"), Some(vec![0, 255, 16]));
        assert_eq!(from_hex("abc"), None);
        assert_eq!(from_hex("zz"), None);
    }
}
