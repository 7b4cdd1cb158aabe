//! flowmine - Discriminative subgraph mining for fault localization
//!
//! Finds small connected behavior patterns that occur disproportionately in
//! execution-flow graphs of failing runs compared with passing runs, and
//! ranks them by a suspiciousness score.
//!
//! The pipeline, leaf to root:
//! - [`graph`]: colored host multigraphs and their read-only indices
//! - [`pattern`]: patterns with canonical byte labels
//! - [`embedding`]: subgraph-isomorphism search, sequential and parallel
//! - [`lattice`]: lazily expanded, support-pruned pattern lattice
//! - [`scoring`]: suspiciousness functions and their pruning bound
//! - [`mine`]: branch-and-bound, LEAP and random-walk top-k searches

pub mod cancel;
pub mod color;
pub mod config;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod lattice;
pub mod mine;
pub mod pattern;
pub mod scoring;

pub use cancel::CancelToken;
pub use color::{Color, ColorInfo, ColorRegistry};
pub use config::{load_miner_config, MinerConfig};
pub use embedding::{Embedding, StartPoint};
pub use error::{MineError, MineResult};
pub use graph::{HostGraphBuilder, Indices};
pub use lattice::{Lattice, LatticeNode};
pub use mine::{mine_with_config, MineOutcome, Miner, MinerOptions, SearchNode, SearchReport, TopMiner};
pub use pattern::{Extension, Pattern, PatternBuilder};
pub use scoring::{OkSupport, Score, ScoreFunc};
