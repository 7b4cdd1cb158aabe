//! Ranking of search results and single-color locations

use super::{Miner, SearchNode};
use crate::color::{Color, ColorInfo};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Drop root nodes and repeated labels, then sort best first.
/// Ties are broken by label so the order is reproducible.
pub fn unique(nodes: impl IntoIterator<Item = SearchNode>) -> Vec<SearchNode> {
    let mut added: FxHashSet<Vec<u8>> = FxHashSet::default();
    let mut unique: Vec<SearchNode> = nodes
        .into_iter()
        .filter(|n| !n.is_root() && added.insert(n.label().to_vec()))
        .collect();
    unique.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.label().cmp(b.label())));
    unique
}

/// Split nodes sorted best first into runs of equal score
pub fn group_by_score(nodes: Vec<SearchNode>) -> Vec<Vec<SearchNode>> {
    let mut groups: Vec<Vec<SearchNode>> = Vec::new();
    for n in nodes {
        match groups.last_mut() {
            Some(group) if group[0].score == n.score => group.push(n),
            _ => groups.push(vec![n]),
        }
    }
    groups
}

/// A single color with its suspiciousness and source location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredLocation {
    pub color: Color,
    pub label: String,
    pub score: f64,
    #[serde(flatten)]
    pub info: ColorInfo,
}

impl fmt::Display for ScoredLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}",
            self.info.position, self.info.fn_name, self.info.basic_block, self.score
        )
    }
}

/// Score every color of the failing graph on its own, best first
pub fn localize_colors(miner: &Miner<'_>) -> Vec<ScoredLocation> {
    let lattice = miner.lattice();
    let registry = lattice.registry();
    let mut locations: Vec<ScoredLocation> = lattice
        .fail()
        .indexed_colors()
        .into_iter()
        .filter_map(|color| {
            let node = miner.color_node(color)?;
            Some(ScoredLocation {
                color,
                label: registry.label(color),
                score: node.score,
                info: registry.info(color).cloned().unwrap_or_default(),
            })
        })
        .collect();
    locations.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.color.cmp(&b.color)));
    locations
}

/// Split locations sorted best first into runs of equal score
pub fn group_locations(locations: Vec<ScoredLocation>) -> Vec<Vec<ScoredLocation>> {
    let mut groups: Vec<Vec<ScoredLocation>> = Vec::new();
    for l in locations {
        match groups.last_mut() {
            Some(group) if group[0].score == l.score => group.push(l),
            _ => groups.push(vec![l]),
        }
    }
    groups
}

/// Results that share most of their colors, scored together
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Mean member score, damped by `sqrt(n / (n + 1))` so lone patterns
    /// rank below groups of equal quality
    pub score: f64,
    pub nodes: Vec<SearchNode>,
}

/// Vertex and edge colors of a node
fn color_set(node: &SearchNode) -> BTreeSet<Color> {
    let pattern = node.node.pattern();
    pattern
        .vertices()
        .iter()
        .map(|v| v.color)
        .chain(pattern.edges().iter().map(|e| e.color))
        .collect()
}

/// Jaccard distance between two color sets
fn jaccard_distance(a: &BTreeSet<Color>, b: &BTreeSet<Color>) -> f64 {
    let inter = a.intersection(b).count() as f64;
    let union = a.len() as f64 + b.len() as f64 - inter;
    if union == 0.0 {
        return 0.0;
    }
    1.0 - inter / union
}

/// Density clustering of `nodes` by the Jaccard distance of their color sets.
///
/// Nodes are added in order. A node within `epsilon` of members of several
/// clusters joins them all into one, so clusters are the connected groups of
/// the "within `epsilon`" relation. Returned best first.
pub fn cluster(nodes: &[SearchNode], epsilon: f64) -> Vec<Cluster> {
    let mut clusters: Vec<Vec<(BTreeSet<Color>, &SearchNode)>> = Vec::new();
    for node in nodes.iter().filter(|n| !n.is_root()) {
        let colors = color_set(node);
        let mut near = BTreeSet::new();
        let mut closest: Option<(usize, f64)> = None;
        for (i, members) in clusters.iter().enumerate().rev() {
            for (other, _) in members {
                let d = jaccard_distance(&colors, other);
                if d > epsilon {
                    continue;
                }
                near.insert(i);
                if closest.map_or(true, |(_, best)| d < best) {
                    closest = Some((i, d));
                }
            }
        }
        let Some((into, _)) = closest else {
            clusters.push(vec![(colors, node)]);
            continue;
        };
        clusters[into].push((colors, node));
        // fold every near cluster into the lowest indexed one
        let mut near = near.into_iter().rev();
        if let Some(mut prev) = near.next() {
            for cur in near {
                let moved = clusters.remove(prev);
                clusters[cur].extend(moved);
                prev = cur;
            }
        }
    }

    let mut scored: Vec<Cluster> = clusters
        .into_iter()
        .map(|members| {
            let n = members.len() as f64;
            let sum: f64 = members.iter().map(|(_, node)| node.score).sum();
            Cluster {
                score: (sum / n) * (n / (n + 1.0)).sqrt(),
                nodes: members.into_iter().map(|(_, node)| node.clone()).collect(),
            }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}
