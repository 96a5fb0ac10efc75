//! The text surface the engine drives.
//!
//! The widget itself (rendering, key handling, highlighting) lives in the
//! host. The engine only needs to read and replace its text, move the
//! caret, and hand it decorations.

use crate::overlay::DecorationSet;

/// Host-side text widget.
pub trait TextSurface {
    /// Full buffer as currently displayed.
    fn text(&self) -> String;

    /// Replace the whole buffer. Must not re-enter the session.
    fn replace_all(&mut self, text: &str);

    /// Caret byte offset.
    fn caret(&self) -> usize;

    fn set_caret(&mut self, offset: usize);

    /// Replace all presence decorations at once.
    fn set_decorations(&mut self, decorations: &DecorationSet);
}

/// In-memory surface for tests and headless participants.
#[derive(Debug, Clone, Default)]
pub struct MemorySurface {
    text: String,
    caret: usize,
    decorations: DecorationSet,
    replacements: usize,
}

impl MemorySurface {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            caret: text.len(),
            text,
            ..Self::default()
        }
    }

    pub fn decorations(&self) -> &DecorationSet {
        &self.decorations
    }

    /// Number of `replace_all` calls so far.
    pub fn replacements(&self) -> usize {
        self.replacements
    }

    /// Simulate typing: replace `range` with `insert` and return the new
    /// buffer, without going through the engine.
    pub fn splice(&mut self, range: std::ops::Range<usize>, insert: &str) -> String {
        self.text.replace_range(range.clone(), insert);
        self.caret = range.start + insert.len();
        self.text.clone()
    }
}

impl TextSurface for MemorySurface {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn replace_all(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
        self.caret = self.caret.min(self.text.len());
        while !self.text.is_char_boundary(self.caret) {
            self.caret -= 1;
        }
        self.replacements += 1;
    }

    fn caret(&self) -> usize {
        self.caret
    }

    fn set_caret(&mut self, offset: usize) {
        self.caret = offset.min(self.text.len());
    }

    fn set_decorations(&mut self, decorations: &DecorationSet) {
        self.decorations = decorations.clone();
    }
}
