//! Color registry: interning of opaque vertex/edge labels
//!
//! Every vertex and edge label in a flow graph is interned once and referenced
//! by a dense integer color. Patterns, indices and embeddings only ever see the
//! integer; the registry turns it back into text for reports.
//!
//! Per-color location metadata (source position, enclosing function, basic
//! block id) rides along for presentation. The search engine never reads it.

use lasso::{Key, Spur, ThreadedRodeo};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// A dense color id
pub type Color = u32;

/// Where a color came from in the instrumented program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColorInfo {
    pub position: String,
    pub fn_name: String,
    pub basic_block: i64,
}

/// Bidirectional label <-> color mapping
#[derive(Debug)]
pub struct ColorRegistry {
    inner: ThreadedRodeo,
    info: FxHashMap<Color, ColorInfo>,
}

impl Default for ColorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorRegistry {
    pub fn new() -> Self {
        Self {
            inner: ThreadedRodeo::default(),
            info: FxHashMap::default(),
        }
    }

    /// Create with estimated capacity
    pub fn with_capacity(labels: usize) -> Self {
        Self {
            inner: ThreadedRodeo::with_capacity(lasso::Capacity::for_strings(labels)),
            info: FxHashMap::default(),
        }
    }

    /// Intern a label, returning its color.
    /// Colors are assigned densely in first-seen order.
    #[inline]
    pub fn color(&self, label: &str) -> Color {
        self.inner.get_or_intern(label).into_usize() as Color
    }

    /// Color of an already interned label
    #[inline]
    pub fn get(&self, label: &str) -> Option<Color> {
        self.inner.get(label).map(|k| k.into_usize() as Color)
    }

    /// Label for a color. Unknown colors render as `color-[n]`.
    pub fn label(&self, color: Color) -> String {
        Spur::try_from_usize(color as usize)
            .and_then(|key| self.inner.try_resolve(&key))
            .map(str::to_string)
            .unwrap_or_else(|| format!("color-[{}]", color))
    }

    /// Number of interned labels
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// All colors in id order
    pub fn colors(&self) -> impl Iterator<Item = Color> {
        0..self.inner.len() as Color
    }

    /// Attach location metadata to a color (last write wins)
    pub fn set_info(&mut self, color: Color, info: ColorInfo) {
        self.info.insert(color, info);
    }

    pub fn info(&self, color: Color) -> Option<&ColorInfo> {
        self.info.get(&color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colors_are_dense_and_stable() {
        let registry = ColorRegistry::new();

        let black = registry.color("black");
        let red = registry.color("red");
        let black_again = registry.color("black");

        assert_eq!(black, 0);
        assert_eq!(red, 1);
        assert_eq!(black, black_again);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.colors().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_label_lookup() {
        let registry = ColorRegistry::new();
        let c = registry.color("main.go:12 call");

        assert_eq!(registry.label(c), "main.go:12 call");
        assert_eq!(registry.get("main.go:12 call"), Some(c));
        assert_eq!(registry.get("missing"), None);
        assert_eq!(registry.label(42), "color-[42]");
    }

    #[test]
    fn test_color_info() {
        let mut registry = ColorRegistry::new();
        let c = registry.color("blk");
        registry.set_info(
            c,
            ColorInfo {
                position: "main.go:3".into(),
                fn_name: "main".into(),
                basic_block: 2,
            },
        );

        assert_eq!(registry.info(c).map(|i| i.basic_block), Some(2));
        assert!(registry.info(c + 1).is_none());
    }
}
