//! Miner configuration
//!
//! Loads search settings from `flowmine.toml` in a working directory.
//!
//! # Configuration Format
//!
//! ```toml
//! # flowmine.toml
//!
//! [miner]
//! score = "rf1"          # full name or abbreviation
//! max_edges = 8          # defaults to the failing graph's edge count
//! min_edges = 1
//! min_fails = 2
//! ok_support = "estimated"
//!
//! [search]
//! strategy = "leap"      # branch-and-bound | sleap | leap | walks | top-colors
//! k = 10
//! sigma = 0.01
//! seed = 42
//! timeout_secs = 60
//! cluster_epsilon = 0.5  # group results by shared colors
//!
//! [walks]
//! walker = "swrw"        # urw | swrw
//! walks = 100
//! parallel = true
//!
//! [embedding]
//! start = "most-connected"
//! workers = 4
//! ```

use crate::cancel::CancelToken;
use crate::embedding::StartPoint;
use crate::error::{MineError, MineResult};
use crate::mine::{
    BranchAndBound, Leap, MinerOptions, ParWalking, SLeap, Swrw, TopMiner, Urw, Walker, Walking,
    WalkingTopColors,
};
use crate::scoring::{OkSupport, ScoreFunc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "flowmine.toml";

/// Which search to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    BranchAndBound,
    Sleap,
    #[default]
    Leap,
    /// Independent walks from the root
    Walks,
    /// Walks from the best single colors
    TopColors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalkerKind {
    Urw,
    #[default]
    Swrw,
}

/// Full configuration loaded from flowmine.toml
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MinerConfig {
    #[serde(default)]
    pub miner: MinerSection,

    #[serde(default)]
    pub search: SearchSection,

    #[serde(default)]
    pub walks: WalksSection,

    #[serde(default)]
    pub embedding: EmbeddingSection,
}

/// Score function and pattern size limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerSection {
    #[serde(default = "default_score")]
    pub score: String,

    #[serde(default)]
    pub max_edges: Option<usize>,

    #[serde(default = "default_min_edges")]
    pub min_edges: usize,

    #[serde(default = "default_min_fails")]
    pub min_fails: usize,

    #[serde(default)]
    pub ok_support: OkSupport,
}

impl Default for MinerSection {
    fn default() -> Self {
        Self {
            score: default_score(),
            max_edges: None,
            min_edges: default_min_edges(),
            min_fails: default_min_fails(),
            ok_support: OkSupport::default(),
        }
    }
}

fn default_score() -> String {
    ScoreFunc::default().name().to_string()
}

fn default_min_edges() -> usize {
    1
}

fn default_min_fails() -> usize {
    2
}

/// Best-first search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSection {
    #[serde(default)]
    pub strategy: Strategy,

    #[serde(default = "default_k")]
    pub k: usize,

    #[serde(default = "default_sigma")]
    pub sigma: f64,

    /// Defaults to true for LEAP and sLEAP, false for branch-and-bound
    #[serde(default)]
    pub maximal: Option<bool>,

    /// Seed for tie-breaking and walks; unseeded runs draw from the OS
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Jaccard distance under which results are clustered in the report
    #[serde(default)]
    pub cluster_epsilon: Option<f64>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            k: default_k(),
            sigma: default_sigma(),
            maximal: None,
            seed: None,
            timeout_secs: None,
            cluster_epsilon: None,
        }
    }
}

fn default_k() -> usize {
    10
}

fn default_sigma() -> f64 {
    0.01
}

/// Random walk settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalksSection {
    #[serde(default)]
    pub walker: WalkerKind,

    #[serde(default = "default_walks")]
    pub walks: usize,

    #[serde(default)]
    pub parallel: bool,

    #[serde(default)]
    pub sample_non_max: bool,

    #[serde(default = "default_percent_of_colors")]
    pub percent_of_colors: f64,

    #[serde(default = "default_walks_per_color")]
    pub walks_per_color: usize,

    #[serde(default = "default_min_groups")]
    pub min_groups: usize,

    #[serde(default)]
    pub skip_seen_colors: bool,
}

impl Default for WalksSection {
    fn default() -> Self {
        Self {
            walker: WalkerKind::default(),
            walks: default_walks(),
            parallel: false,
            sample_non_max: false,
            percent_of_colors: default_percent_of_colors(),
            walks_per_color: default_walks_per_color(),
            min_groups: default_min_groups(),
            skip_seen_colors: false,
        }
    }
}

fn default_walks() -> usize {
    100
}

fn default_percent_of_colors() -> f64 {
    0.0625
}

fn default_walks_per_color() -> usize {
    2
}

fn default_min_groups() -> usize {
    2
}

/// Embedding search used for exact passing-graph support
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSection {
    #[serde(default)]
    pub start: StartPoint,

    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            start: StartPoint::default(),
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    1
}

impl MinerConfig {
    pub fn from_toml_str(content: &str) -> MineResult<Self> {
        let config: MinerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MineResult<()> {
        self.score_func()?;
        self.miner_options().validate()?;
        if self.search.k < 1 {
            return Err(MineError::Config("k must be >= 1".to_string()));
        }
        if self.search.sigma.is_nan() || self.search.sigma < 0.0 {
            return Err(MineError::Config(format!(
                "sigma must be >= 0 (got {})",
                self.search.sigma
            )));
        }
        if let Some(epsilon) = self.search.cluster_epsilon {
            if !(0.0..=1.0).contains(&epsilon) {
                return Err(MineError::Config(format!(
                    "cluster_epsilon must be within [0, 1] (got {})",
                    epsilon
                )));
            }
        }
        let percent = self.walks.percent_of_colors;
        if !(0.0..=1.0).contains(&percent) {
            return Err(MineError::Config(format!(
                "percent_of_colors must be within [0, 1] (got {})",
                percent
            )));
        }
        Ok(())
    }

    pub fn score_func(&self) -> MineResult<ScoreFunc> {
        self.miner.score.parse()
    }

    pub fn miner_options(&self) -> MinerOptions {
        MinerOptions {
            max_edges: self.miner.max_edges,
            min_edges: self.miner.min_edges,
            min_fails: self.miner.min_fails,
            ok_support: self.miner.ok_support,
            start: self.embedding.start,
            workers: self.embedding.workers,
        }
    }

    /// A token that fires after `timeout_secs`, if set
    pub fn cancel_token(&self) -> CancelToken {
        match self.search.timeout_secs {
            Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
            None => CancelToken::new(),
        }
    }

    /// The configured strategy
    pub fn strategy(&self) -> Box<dyn TopMiner> {
        let s = &self.search;
        match s.strategy {
            Strategy::BranchAndBound => Box::new(BranchAndBound::new(s.k).maximal(s.maximal.unwrap_or(false))),
            Strategy::Sleap => Box::new(SLeap::new(s.k, s.sigma, None).maximal(s.maximal.unwrap_or(true))),
            Strategy::Leap => Box::new(Leap::new(s.k, s.sigma).maximal(s.maximal.unwrap_or(true))),
            Strategy::Walks | Strategy::TopColors => match self.walks.walker {
                WalkerKind::Urw => self.walking(Urw),
                WalkerKind::Swrw => self.walking(Swrw::new().sample_non_max(self.walks.sample_non_max)),
            },
        }
    }

    fn walking<W: Walker + 'static>(&self, walker: W) -> Box<dyn TopMiner> {
        let w = &self.walks;
        match (self.search.strategy, w.parallel) {
            (Strategy::TopColors, _) => Box::new(
                WalkingTopColors::new(walker)
                    .percent_of_colors(w.percent_of_colors)
                    .walks_per_color(w.walks_per_color)
                    .min_groups(w.min_groups)
                    .skip_seen_colors(w.skip_seen_colors),
            ),
            (_, true) => Box::new(ParWalking::new(walker, w.walks)),
            (_, false) => Box::new(Walking::new(walker, w.walks)),
        }
    }
}

/// Load miner configuration from a directory.
///
/// Returns default configuration if no config file is found or it fails
/// to load.
pub fn load_miner_config(dir: &Path) -> MinerConfig {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        debug!("No miner config found, using defaults");
        return MinerConfig::default();
    }
    match load_toml_config(&path) {
        Ok(config) => {
            debug!("Loaded miner config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Failed to load {}: {:#}", path.display(), e);
            MinerConfig::default()
        }
    }
}

/// Load configuration from a TOML file
pub fn load_toml_config(path: &Path) -> anyhow::Result<MinerConfig> {
    let content = std::fs::read_to_string(path)?;
    Ok(MinerConfig::from_toml_str(&content)?)
}
