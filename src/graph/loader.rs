//! Loader for the line-oriented flow graph format
//!
//! # Format
//!
//! ```text
//! start-graph
//! vertex	1, "main.go:10 entry", 0, "main.main", "main.go:10"
//! vertex	2, "main.go:12 call", 1, "main.main", "main.go:12"
//! edge	1, 2
//! end-graph
//! ```
//!
//! Fields after the tab are comma separated; quoted fields may contain commas
//! and backslash escapes. Vertex fields are `id, label, basic block, function,
//! position`. Edge fields are `src id, targ id` with an optional quoted label.
//! Each `end-graph` closes one trace.

use super::{HostGraphBuilder, Indices};
use crate::color::{ColorInfo, ColorRegistry};
use crate::error::{MineError, MineResult};
use anyhow::Context;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Load a host graph from a reader, interning labels into `registry`
pub fn load_simple<R: BufRead>(reader: R, registry: &mut ColorRegistry) -> MineResult<Indices> {
    let mut loader = SimpleLoader {
        builder: HostGraphBuilder::with_capacity(100, 1000),
        registry,
        vidxs: FxHashMap::default(),
    };
    let mut graphs = 0;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (kind, rest) = match line.split_once('\t') {
            Some((kind, rest)) => (kind, Some(rest)),
            None => (line, None),
        };
        let at = |message: String| MineError::Load {
            line: lineno + 1,
            message,
        };
        match kind {
            "start-graph" => {}
            "end-graph" => graphs += 1,
            "vertex" => loader
                .vertex(rest.ok_or_else(|| at("vertex line has no fields".into()))?)
                .map_err(at)?,
            "edge" => {
                let rest = rest.ok_or_else(|| at("edge line has no fields".into()))?;
                loader.edge(rest).map_err(|e| match e {
                    EdgeError::Unknown(id) => MineError::UnknownVertex(id),
                    EdgeError::Format(m) => at(m),
                })?
            }
            other => return Err(at(format!("unexpected kind `{}`", other))),
        }
    }
    loader.builder.set_graphs(graphs);
    debug!(
        "Loaded {} vertices, {} edges from {} traces",
        loader.builder.vertex_count(),
        loader.builder.edge_count(),
        graphs
    );
    Ok(loader.builder.build(0))
}

/// Load a host graph from a file path
pub fn load_simple_path(path: &Path, registry: &mut ColorRegistry) -> anyhow::Result<Indices> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let indices = load_simple(BufReader::new(file), registry)
        .with_context(|| format!("Failed to load flow graph from {}", path.display()))?;
    info!(
        "Loaded {} ({} traces, {} vertices)",
        path.display(),
        indices.graphs(),
        indices.graph().vertex_count()
    );
    Ok(indices)
}

enum EdgeError {
    Unknown(i64),
    Format(String),
}

struct SimpleLoader<'a> {
    builder: HostGraphBuilder,
    registry: &'a mut ColorRegistry,
    vidxs: FxHashMap<i64, usize>,
}

impl SimpleLoader<'_> {
    fn vertex(&mut self, rest: &str) -> Result<(), String> {
        let tokens = tokens(rest)?;
        if tokens.len() != 5 {
            return Err(format!("expected 5 vertex fields, got {}: `{}`", tokens.len(), rest));
        }
        let id = parse_int(&tokens[0])?;
        let label = unquote(&tokens[1])?;
        let basic_block = parse_int(&tokens[2])?;
        let fn_name = unquote(&tokens[3])?;
        let position = unquote(&tokens[4])?;

        let color = self.registry.color(&label);
        let idx = self.builder.add_vertex(color);
        self.vidxs.insert(id, idx);
        self.registry.set_info(
            color,
            ColorInfo {
                position,
                fn_name,
                basic_block,
            },
        );
        Ok(())
    }

    fn edge(&mut self, rest: &str) -> Result<(), EdgeError> {
        let tokens = tokens(rest).map_err(EdgeError::Format)?;
        if tokens.len() != 2 && tokens.len() != 3 {
            return Err(EdgeError::Format(format!(
                "expected 2 or 3 edge fields, got {}: `{}`",
                tokens.len(),
                rest
            )));
        }
        let sid = parse_int(&tokens[0]).map_err(EdgeError::Format)?;
        let tid = parse_int(&tokens[1]).map_err(EdgeError::Format)?;
        let label = match tokens.get(2) {
            Some(t) => unquote(t).map_err(EdgeError::Format)?,
            None => String::new(),
        };
        let src = *self.vidxs.get(&sid).ok_or(EdgeError::Unknown(sid))?;
        let targ = *self.vidxs.get(&tid).ok_or(EdgeError::Unknown(tid))?;
        let color = self.registry.color(&label);
        self.builder.add_edge(src, targ, color);
        Ok(())
    }
}

fn parse_int(s: &str) -> Result<i64, String> {
    s.parse::<i64>()
        .map_err(|e| format!("invalid integer `{}`: {}", s, e))
}

/// Split on commas that are outside quotes and not escaped
fn tokens(s: &str) -> Result<Vec<String>, String> {
    let mut parts = Vec::with_capacity(6);
    let mut buf = String::with_capacity(s.len());
    let mut quotes = false;
    let mut backslash = false;
    for c in s.chars() {
        match c {
            '"' if !backslash => quotes = !quotes,
            ',' if !backslash && !quotes => {
                parts.push(buf.trim().to_string());
                buf.clear();
                continue;
            }
            _ => {}
        }
        if c == '\\' {
            backslash = !backslash;
        } else {
            backslash = false;
        }
        buf.push(c);
    }
    if backslash {
        return Err(format!("unfinished backslash: `{}`", s));
    }
    if quotes {
        return Err(format!("unclosed quote: `{}`", s));
    }
    if !buf.is_empty() {
        parts.push(buf.trim().to_string());
    }
    Ok(parts)
}

fn unquote(s: &str) -> Result<String, String> {
    let inner = s
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .ok_or_else(|| format!("expected a quoted string, got `{}`", s))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => return Err(format!("dangling escape in `{}`", s)),
        }
    }
    Ok(out)
}
