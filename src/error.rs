//! Error types for the mining engine
//!
//! Structural builder errors and scoring domain errors are recoverable and
//! flow back to the node-expansion call site. Malformed extensions are an
//! internal invariant violation and panic instead (see `PatternBuilder::extend`).

use thiserror::Error;

/// Errors that can occur while building graphs, patterns or mining
#[derive(Error, Debug)]
pub enum MineError {
    #[error("edge {edge} cannot be removed: the pattern would become disconnected")]
    DisconnectedGraph { edge: usize },

    #[error("score {score} is outside its domain (prF={pr_f}, prF&P={pr_f_node}, prO={pr_o}, prO&P={pr_o_node})")]
    InvalidScoreDomain {
        score: &'static str,
        pr_f: f64,
        pr_f_node: f64,
        pr_o: f64,
        pr_o_node: f64,
    },

    #[error("Unknown score function: {0}")]
    UnknownScore(String),

    #[error("Failed to load graph at line {line}: {message}")]
    Load { line: usize, message: String },

    #[error("Unknown vertex id {0} referenced by an edge")]
    UnknownVertex(i64),

    #[error("Malformed pattern label: {0}")]
    Label(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type MineResult<T> = Result<T, MineError>;
