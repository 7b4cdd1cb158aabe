//! Loader for flow graphs written as Graphviz digraphs
//!
//! ```text
//! digraph trace {
//!     1 [label="main.go:10 entry", fn_name="main.main", position="main.go:10", bbid="0"];
//!     2 [label="main.go:12 call"];
//!     1 -> 2;
//! }
//! ```
//!
//! Every top-level `digraph` block is one trace, and a file may hold any
//! number of them. A vertex takes its color from its `label` attribute, or
//! its id when it has none; `fn_name`, `position` and `bbid` fill in the
//! color's source info. Edges are colored by their `label`, empty if
//! missing. Vertices first named by an edge are created on the spot. Ids are
//! local to their block. Subgraph bodies and default attribute statements
//! are skipped.

use super::{HostGraphBuilder, Indices};
use crate::color::{ColorInfo, ColorRegistry};
use crate::error::{MineError, MineResult};
use anyhow::Context;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// Load a host graph from DOT text, interning labels into `registry`
pub fn load_dot<R: Read>(mut reader: R, registry: &mut ColorRegistry) -> MineResult<Indices> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let tokens = lex(&text)?;
    let mut parser = DotParser {
        tokens: &tokens,
        pos: 0,
        builder: HostGraphBuilder::with_capacity(100, 1000),
        registry,
        vids: FxHashMap::default(),
    };
    while !parser.at_end() {
        parser.graph()?;
    }
    let builder = parser.builder;
    debug!(
        "Loaded {} vertices, {} edges from DOT",
        builder.vertex_count(),
        builder.edge_count()
    );
    Ok(builder.build(0))
}

/// Load a DOT host graph from a file path
pub fn load_dot_path(path: &Path, registry: &mut ColorRegistry) -> anyhow::Result<Indices> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let indices = load_dot(BufReader::new(file), registry)
        .with_context(|| format!("Failed to load DOT graph from {}", path.display()))?;
    info!(
        "Loaded {} ({} traces, {} vertices)",
        path.display(),
        indices.graphs(),
        indices.graph().vertex_count()
    );
    Ok(indices)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Id(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Eq,
    Semi,
    Comma,
    Arrow,
    Undirected,
}

#[derive(Debug)]
struct Token {
    tok: Tok,
    line: usize,
}

fn load_error(line: usize, message: impl Into<String>) -> MineError {
    MineError::Load {
        line,
        message: message.into(),
    }
}

fn is_id_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn lex(text: &str) -> MineResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;
    let mut line_start = true;
    while let Some(c) = chars.next() {
        let at_line_start = line_start;
        line_start = false;
        let tok = match c {
            '\n' => {
                line += 1;
                line_start = true;
                continue;
            }
            c if c.is_whitespace() => {
                line_start = at_line_start;
                continue;
            }
            // preprocessor style lines
            '#' if at_line_start => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        line_start = true;
                        break;
                    }
                }
                continue;
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        line_start = true;
                        break;
                    }
                }
                continue;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let start = line;
                let mut prev = ' ';
                loop {
                    match chars.next() {
                        Some('/') if prev == '*' => break,
                        Some(c) => {
                            if c == '\n' {
                                line += 1;
                            }
                            prev = c;
                        }
                        None => return Err(load_error(start, "unterminated comment")),
                    }
                }
                continue;
            }
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            '=' => Tok::Eq,
            ';' => Tok::Semi,
            ',' => Tok::Comma,
            '-' if chars.peek() == Some(&'>') => {
                chars.next();
                Tok::Arrow
            }
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                Tok::Undirected
            }
            '"' => {
                let start = line;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => s.push('"'),
                            Some('\\') => s.push('\\'),
                            Some('n') => s.push('\n'),
                            Some('\n') => line += 1,
                            Some(other) => {
                                s.push('\\');
                                s.push(other);
                            }
                            None => return Err(load_error(start, "unterminated string")),
                        },
                        Some(c) => {
                            if c == '\n' {
                                line += 1;
                            }
                            s.push(c);
                        }
                        None => return Err(load_error(start, "unterminated string")),
                    }
                }
                Tok::Id(s)
            }
            c if is_id_char(c) || c == '-' => {
                let mut s = c.to_string();
                while let Some(&next) = chars.peek() {
                    if !is_id_char(next) {
                        break;
                    }
                    s.push(next);
                    chars.next();
                }
                Tok::Id(s)
            }
            other => return Err(load_error(line, format!("unexpected character `{}`", other))),
        };
        tokens.push(Token { tok, line });
    }
    Ok(tokens)
}

struct DotParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    builder: HostGraphBuilder,
    registry: &'a mut ColorRegistry,
    /// Vertex id -> builder index, for the current block
    vids: FxHashMap<String, usize>,
}

impl DotParser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn next(&mut self) -> MineResult<Tok> {
        let tok = self
            .tokens
            .get(self.pos)
            .map(|t| t.tok.clone())
            .ok_or_else(|| load_error(self.line(), "unexpected end of input"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, want: Tok) -> MineResult<()> {
        let line = self.line();
        let got = self.next()?;
        if got != want {
            return Err(load_error(line, format!("expected {:?}, got {:?}", want, got)));
        }
        Ok(())
    }

    fn id(&mut self) -> MineResult<String> {
        let line = self.line();
        match self.next()? {
            Tok::Id(s) => Ok(s),
            other => Err(load_error(line, format!("expected an id, got {:?}", other))),
        }
    }

    fn keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Id(s)) if s.eq_ignore_ascii_case(word))
    }

    /// `[strict] digraph [name] { ... }`
    fn graph(&mut self) -> MineResult<()> {
        if self.keyword("strict") {
            self.pos += 1;
        }
        let line = self.line();
        if self.keyword("graph") {
            return Err(load_error(line, "undirected graphs are not flow graphs"));
        }
        if !self.keyword("digraph") {
            return Err(load_error(line, "expected `digraph`"));
        }
        self.pos += 1;
        if let Some(Tok::Id(_)) = self.peek() {
            self.pos += 1;
        }
        self.expect(Tok::LBrace)?;
        self.vids.clear();
        loop {
            match self.peek() {
                Some(Tok::RBrace) => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.stmt()?,
                None => return Err(load_error(self.line(), "unclosed digraph")),
            }
        }
        self.builder.end_trace();
        Ok(())
    }

    fn stmt(&mut self) -> MineResult<()> {
        let line = self.line();
        match self.peek() {
            Some(Tok::Semi) => {
                self.pos += 1;
                return Ok(());
            }
            Some(Tok::LBrace) => return self.skip_block(),
            _ => {}
        }
        if self.keyword("subgraph") {
            self.pos += 1;
            if let Some(Tok::Id(_)) = self.peek() {
                self.pos += 1;
            }
            return self.skip_block();
        }
        if (self.keyword("node") || self.keyword("edge") || self.keyword("graph"))
            && matches!(self.tokens.get(self.pos + 1).map(|t| &t.tok), Some(Tok::LBracket))
        {
            self.pos += 1;
            self.attrs()?;
            return Ok(());
        }

        let first = self.id()?;
        match self.peek() {
            Some(Tok::Eq) => {
                // graph attribute
                self.pos += 1;
                self.id()?;
            }
            Some(Tok::Arrow) => {
                let mut chain = vec![first];
                while let Some(Tok::Arrow) = self.peek() {
                    self.pos += 1;
                    chain.push(self.id()?);
                }
                let attrs = self.attrs()?;
                let label = attrs.get("label").cloned().unwrap_or_default();
                let color = self.registry.color(&label);
                for pair in chain.windows(2) {
                    let src = self.vertex(&pair[0], &FxHashMap::default())?;
                    let targ = self.vertex(&pair[1], &FxHashMap::default())?;
                    self.builder.add_edge(src, targ, color);
                }
            }
            Some(Tok::Undirected) => {
                return Err(load_error(line, "undirected edge in a digraph"));
            }
            _ => {
                let attrs = self.attrs()?;
                self.vertex(&first, &attrs)?;
            }
        }
        Ok(())
    }

    /// Zero or more `[k=v, ...]` lists
    fn attrs(&mut self) -> MineResult<FxHashMap<String, String>> {
        let mut attrs = FxHashMap::default();
        while let Some(Tok::LBracket) = self.peek() {
            self.pos += 1;
            loop {
                match self.peek() {
                    Some(Tok::RBracket) => {
                        self.pos += 1;
                        break;
                    }
                    Some(Tok::Comma) | Some(Tok::Semi) => self.pos += 1,
                    _ => {
                        let key = self.id()?;
                        self.expect(Tok::Eq)?;
                        let value = self.id()?;
                        attrs.insert(key, value);
                    }
                }
            }
        }
        Ok(attrs)
    }

    /// Skip a balanced `{ ... }`
    fn skip_block(&mut self) -> MineResult<()> {
        self.expect(Tok::LBrace)?;
        let mut depth = 1;
        while depth > 0 {
            match self.next()? {
                Tok::LBrace => depth += 1,
                Tok::RBrace => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    /// The builder index of vertex `id`, adding it on first sight
    fn vertex(&mut self, id: &str, attrs: &FxHashMap<String, String>) -> MineResult<usize> {
        if let Some(&idx) = self.vids.get(id) {
            return Ok(idx);
        }
        let label = attrs.get("label").map_or(id, String::as_str);
        let color = self.registry.color(label);
        let idx = self.builder.add_vertex(color);
        self.vids.insert(id.to_string(), idx);

        if ["fn_name", "position", "bbid"].iter().any(|k| attrs.contains_key(*k)) {
            let basic_block = match attrs.get("bbid") {
                Some(b) => b
                    .parse::<i64>()
                    .map_err(|e| load_error(self.line(), format!("invalid bbid `{}`: {}", b, e)))?,
                None => 0,
            };
            self.registry.set_info(
                color,
                ColorInfo {
                    position: attrs.get("position").cloned().unwrap_or_default(),
                    fn_name: attrs.get("fn_name").cloned().unwrap_or_default(),
                    basic_block,
                },
            );
        }
        Ok(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TWO_TRACES: &str = r#"
// first run
digraph run1 {
    node [shape=box];
    1 [label="entry", fn_name="main.main", position="main.go:3", bbid="0"];
    2 [label="call \"x\""];
    1 -> 2 -> 3 [label="flow"];
    subgraph cluster_0 { 9 -> 10; }
}
/* second
   run */
digraph run2 {
    rankdir = LR;
    1 [label="entry"]
}
"#;

    #[test]
    fn test_load_two_traces() {
        let mut registry = ColorRegistry::new();
        let indices = load_dot(Cursor::new(TWO_TRACES), &mut registry).unwrap();

        assert_eq!(indices.graphs(), 2);
        // 1, 2 and the implicit 3, then the second entry
        assert_eq!(indices.graph().vertex_count(), 4);
        assert_eq!(indices.graph().edge_count(), 2);

        let entry = registry.get("entry").unwrap();
        assert_eq!(indices.vertices_with_color(entry).len(), 2);
        assert!(registry.get("call \"x\"").is_some());
        // unlabeled vertices are colored by id
        assert!(registry.get("3").is_some());
        assert!(registry.get("9").is_none());
        let flow = registry.get("flow").unwrap();
        assert!(indices.graph().edges.iter().all(|e| e.color == flow));

        let info = registry.info(entry).unwrap();
        assert_eq!(info.fn_name, "main.main");
        assert_eq!(info.position, "main.go:3");
    }

    #[test]
    fn test_ids_are_local_to_their_block() {
        let input = "digraph { a -> b }\ndigraph { a -> b }\n";
        let mut registry = ColorRegistry::new();
        let indices = load_dot(Cursor::new(input), &mut registry).unwrap();
        assert_eq!(indices.graph().vertex_count(), 4);
        let a = registry.get("a").unwrap();
        assert_eq!(indices.vertices_with_color(a).len(), 2);
        // edges without a label get the empty label
        assert!(registry.get("").is_some());
    }

    #[test]
    fn test_rejects_undirected_and_malformed() {
        let mut registry = ColorRegistry::new();
        assert!(load_dot(Cursor::new("graph { a -- b }"), &mut registry).is_err());
        assert!(load_dot(Cursor::new("digraph { a -- b }"), &mut registry).is_err());

        let err = load_dot(Cursor::new("digraph {\n a -> b\n\n c [label=\"x\n"), &mut registry).unwrap_err();
        match err {
            MineError::Load { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(
            load_dot(Cursor::new("digraph { a -> b "), &mut registry),
            Err(MineError::Load { .. })
        ));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fail.dot");
        std::fs::write(&path, TWO_TRACES).unwrap();
        let mut registry = ColorRegistry::new();
        let indices = load_dot_path(&path, &mut registry).unwrap();
        assert_eq!(indices.graphs(), 2);
        assert!(load_dot_path(&dir.path().join("missing.dot"), &mut registry).is_err());
    }
}
