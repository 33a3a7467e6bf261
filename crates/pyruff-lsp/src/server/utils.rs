//! Conversions between LSP positions/URIs and what ruff and ropey expect.

use std::path::PathBuf;

use lsp_types::{Position, Uri};
use ropey::Rope;

/// Convert a `file://` URI into a filesystem path.
///
/// Returns `None` for other schemes (e.g. `untitled:` buffers).
pub fn uri_to_path(uri: &Uri) -> Option<PathBuf> {
    let url = url::Url::parse(uri.as_str()).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

/// Path string handed to ruff as `--stdin-filename`; empty if unknown.
pub fn document_path(uri: &Uri) -> String {
    uri_to_path(uri)
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Convert an LSP position (UTF-16 columns) into a rope char index.
///
/// Positions past the end of a line or of the document are clamped.
pub fn position_to_char(rope: &Rope, position: Position) -> usize {
    let line = position.line as usize;
    if line >= rope.len_lines() {
        return rope.len_chars();
    }

    let line_start = rope.line_to_char(line);
    let line_slice = rope.line(line);
    let mut line_len = line_slice.len_chars();
    while line_len > 0 && matches!(line_slice.char(line_len - 1), '\n' | '\r') {
        line_len -= 1;
    }
    let line_end = line_start + line_len;

    let line_start_utf16 = rope.char_to_utf16_cu(line_start);
    let line_end_utf16 = rope.char_to_utf16_cu(line_end);
    let target = (line_start_utf16 + position.character as usize).min(line_end_utf16);

    rope.utf16_cu_to_char(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_to_path() {
        let uri: Uri = "file:///home/user/project/app.py".parse().unwrap();
        if cfg!(unix) {
            assert_eq!(
                uri_to_path(&uri),
                Some(PathBuf::from("/home/user/project/app.py"))
            );
        }
    }

    #[test]
    fn test_uri_to_path_decodes_escapes() {
        let uri: Uri = "file:///home/user/my%20project/app.py".parse().unwrap();
        if cfg!(unix) {
            assert_eq!(document_path(&uri), "/home/user/my project/app.py");
        }
    }

    #[test]
    fn test_non_file_uri_has_no_path() {
        let uri: Uri = "untitled:Untitled-1".parse().unwrap();
        assert_eq!(uri_to_path(&uri), None);
        assert_eq!(document_path(&uri), "");
    }

    #[test]
    fn test_position_to_char() {
        let rope = Rope::from_str("abc\ndef\n");
        assert_eq!(position_to_char(&rope, Position { line: 0, character: 0 }), 0);
        assert_eq!(position_to_char(&rope, Position { line: 1, character: 2 }), 6);
        assert_eq!(position_to_char(&rope, Position { line: 2, character: 0 }), 8);
        assert_eq!(position_to_char(&rope, Position { line: 9, character: 0 }), 8);
    }

    #[test]
    fn test_position_to_char_clamps_to_line() {
        let rope = Rope::from_str("abc\ndef\n");
        assert_eq!(position_to_char(&rope, Position { line: 0, character: 99 }), 3);
    }

    #[test]
    fn test_position_to_char_utf16() {
        // U+1D518 takes two UTF-16 code units but is a single char.
        let rope = Rope::from_str("x = \"𝔘\"\n");
        assert_eq!(position_to_char(&rope, Position { line: 0, character: 7 }), 6);
    }
}
