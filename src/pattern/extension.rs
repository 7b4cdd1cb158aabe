use crate::color::Color;
use crate::graph::Vertex;

/// A proposed new edge on a pattern.
///
/// An endpoint whose `idx` equals the pattern's vertex count is a new vertex.
/// The derived ordering (source, then target, then edge color) is the order
/// extensions are visited in when children are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Extension {
    pub source: Vertex,
    pub target: Vertex,
    pub color: Color,
}

impl Extension {
    pub fn new(source: Vertex, target: Vertex, color: Color) -> Self {
        Self {
            source,
            target,
            color,
        }
    }

    /// Re-index into a permuted pattern.
    ///
    /// `vord[old] = new`. Indices at or past `org_len` refer to vertices that
    /// did not exist in the original ordering and are appended after it.
    pub fn translate(&self, org_len: usize, vord: &[usize]) -> Extension {
        let map = |idx: usize| {
            let idx = if idx >= org_len {
                vord.len() + (idx - org_len)
            } else {
                idx
            };
            if idx < vord.len() {
                vord[idx]
            } else {
                idx
            }
        };
        Extension {
            source: Vertex {
                idx: map(self.source.idx),
                color: self.source.color,
            },
            target: Vertex {
                idx: map(self.target.idx),
                color: self.target.color,
            },
            color: self.color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(idx: usize, color: Color) -> Vertex {
        Vertex { idx, color }
    }

    #[test]
    fn test_translate_existing_and_new() {
        // parent had 2 vertices, child has 3 with order [2, 0, 1]
        let ext = Extension::new(v(0, 5), v(2, 6), 1);
        let moved = ext.translate(2, &[2, 0, 1]);
        assert_eq!(moved.source.idx, 2);
        // the parent's "new" slot becomes the child's "new" slot
        assert_eq!(moved.target.idx, 3);
        assert_eq!(moved.target.color, 6);
        assert_eq!(moved.color, 1);
    }

    #[test]
    fn test_ordering_is_source_then_target_then_color() {
        let a = Extension::new(v(0, 1), v(1, 1), 9);
        let b = Extension::new(v(0, 1), v(2, 0), 0);
        let c = Extension::new(v(0, 1), v(1, 1), 3);
        let mut exts = vec![a, b, c];
        exts.sort();
        assert_eq!(exts, vec![c, a, b]);
    }
}
