// This file is part of pyruff-lsp.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0

//! Suppression comments (`# noqa`).
//!
//! Recognized forms, case-insensitive:
//! - `# noqa`
//! - `# ruff: noqa` / `# flake8: noqa`
//! - any of the above followed by `: CODE[,CODE...]`

use std::sync::LazyLock;

use regex::Regex;

static NOQA_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:# (?:(?:ruff|flake8): )?(?P<noqa>noqa))(?::\s?(?P<codes>([A-Z]+[0-9]+(?:[,\s]+)?)+))?",
    )
    .expect("noqa pattern is valid")
});

/// A suppression comment found on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suppression {
    /// `# noqa` with no code list: suppresses everything.
    Blanket,
    /// `# noqa: A1,B2`.
    Codes(Vec<String>),
}

/// Find the suppression comment on `line`, if any.
pub fn find_suppression(line: &str) -> Option<Suppression> {
    let caps = NOQA_REGEX.captures(line)?;
    match caps.name("codes") {
        Some(codes) => Some(Suppression::Codes(
            codes
                .as_str()
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|code| !code.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        None => Some(Suppression::Blanket),
    }
}

/// Rewrite `line` so that `code` no longer fires on it.
///
/// `line` must not contain its line terminator.
///
/// - `foo  # noqa: OLD` -> `foo  # noqa: OLD,NEW`
/// - `foo  # noqa` -> `foo  # noqa: NEW` (narrows the blanket suppression)
/// - `foo` -> `foo  # noqa: NEW`
pub fn add_code(line: &str, code: &str) -> String {
    match find_suppression(line) {
        Some(Suppression::Codes(_)) => format!("{},{}", line, code),
        Some(Suppression::Blanket) => format!("{}: {}", line, code),
        None => format!("{}  # noqa: {}", line, code),
    }
}
