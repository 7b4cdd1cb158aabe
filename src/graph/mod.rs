//! Host graphs for the failing and passing trace corpora
//!
//! A host graph is a colored directed multigraph built once from ingested
//! traces. `Indices` wraps the finished graph with the lookup tables the
//! embedding search needs and is read-only afterwards, so it can be shared
//! across worker threads freely.

pub mod builder;
pub mod dot;
pub mod indices;
pub mod loader;

use crate::color::Color;
use serde::Serialize;

pub use builder::{HostGraph, HostGraphBuilder};
pub use dot::{load_dot, load_dot_path};
pub use indices::{ColorTriple, Indices};
pub use loader::{load_simple, load_simple_path};

/// A colored vertex. `idx` is local to whatever owns the vertex list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Vertex {
    pub idx: usize,
    pub color: Color,
}

/// A colored directed edge between two local vertex indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Edge {
    pub src: usize,
    pub targ: usize,
    pub color: Color,
}

impl Edge {
    /// The endpoint opposite to `u`. Panics if `u` is not an endpoint.
    pub fn other(&self, u: usize) -> usize {
        if self.src == u {
            self.targ
        } else if self.targ == u {
            self.src
        } else {
            panic!("vertex {} is not an endpoint of {:?}", u, self)
        }
    }
}
