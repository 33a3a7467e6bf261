// This file is part of pyruff-lsp.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0

//! Conversions from ruff edits to LSP text edits.

use lsp_types::{Position, Range, TextEdit};

use crate::finding::{Fix, Location};

/// Convert every edit of a fix into an LSP text edit.
pub fn fix_text_edits(fix: &Fix) -> Vec<TextEdit> {
    fix.edits
        .iter()
        .map(|edit| TextEdit {
            range: Range {
                start: edit_position(edit.location),
                end: edit_position(edit.end_location),
            },
            new_text: edit.content.clone(),
        })
        .collect()
}

/// Edit endpoints index insertion points: only the row is shifted.
fn edit_position(location: Location) -> Position {
    Position {
        line: location.row.saturating_sub(1),
        character: location.column,
    }
}

/// Range from the start of the document to past its last line.
pub fn whole_document_range(content: &str) -> Range {
    Range {
        start: Position {
            line: 0,
            character: 0,
        },
        end: Position {
            line: content.lines().count() as u32,
            character: 0,
        },
    }
}

/// Length of a line in UTF-16 code units, the LSP default encoding.
pub fn utf16_len(line: &str) -> u32 {
    line.encode_utf16().count() as u32
}
