//! Document state management.

use lsp_types::TextDocumentContentChangeEvent;
use ropey::Rope;

use super::utils::position_to_char;

/// A document we're tracking (an open file in the editor).
#[derive(Debug, Clone)]
pub struct Document {
    /// The document content, stored as a rope for cheap incremental edits.
    pub content: Rope,

    /// Document version (incremented by editor on each change).
    /// Published diagnostics are tagged with it.
    pub version: i32,

    /// Filesystem path passed to ruff; empty for non-file URIs.
    pub path: String,
}

impl Document {
    pub fn new(text: &str, version: i32, path: String) -> Self {
        Self {
            content: Rope::from_str(text),
            version,
            path,
        }
    }

    /// Apply one `didChange` event, ranged or full.
    pub fn apply_change(&mut self, change: &TextDocumentContentChangeEvent) {
        match change.range {
            Some(range) => {
                let start = position_to_char(&self.content, range.start);
                let end = position_to_char(&self.content, range.end).max(start);
                self.content.remove(start..end);
                self.content.insert(start, &change.text);
            }
            None => self.content = Rope::from_str(&change.text),
        }
    }
}
