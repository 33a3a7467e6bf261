// This file is part of pyruff-lsp.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0

//! The shapes ruff reports with `--output-format=json`.
//!
//! A check pass prints a JSON array of findings:
//!
//! ```json
//! [{"code": "F401", "message": "`os` imported but unused",
//!   "filename": "/project/app.py",
//!   "location": {"row": 1, "column": 8},
//!   "end_location": {"row": 1, "column": 10},
//!   "fix": {"applicability": "safe", "message": "Remove unused import: `os`",
//!           "edits": [{"content": "", "location": {"row": 1, "column": 1},
//!                      "end_location": {"row": 2, "column": 1}}]}}]
//! ```
//!
//! Coordinates are 1-based. Keys we do not use (`url`, `noqa_row`, `cell`)
//! are ignored.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AnalyzerError, Result};

/// Code ruff uses for source that does not parse.
pub const SYNTAX_ERROR_CODE: &str = "E999";

/// A 1-based position in ruff's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub row: u32,
    pub column: u32,
}

/// One text substitution proposed by ruff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub content: String,
    pub location: Location,
    pub end_location: Location,
}

/// How confident ruff is that a fix preserves behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Applicability {
    Safe,
    Unsafe,
    DisplayOnly,
    #[serde(other)]
    Unknown,
}

/// A set of edits that resolves one finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    pub edits: Vec<Edit>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,
    pub applicability: Applicability,
}

impl Fix {
    pub fn is_unsafe(&self) -> bool {
        self.applicability == Applicability::Unsafe
    }

    /// Whether this fix may be offered under the given opt-in.
    pub fn is_allowed(&self, unsafe_fixes: bool) -> bool {
        unsafe_fixes || !self.is_unsafe()
    }

    /// Encode the fix for a diagnostic's `data` field.
    pub fn to_payload(&self) -> serde_json::Value {
        // Serializing plain strings and integers cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Decode a fix previously stored with [`Fix::to_payload`].
    pub fn from_payload(data: &serde_json::Value) -> Result<Self> {
        Self::deserialize(data).map_err(AnalyzerError::Payload)
    }
}

/// One issue reported by ruff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(
        default = "syntax_error_code",
        deserialize_with = "null_as_syntax_error"
    )]
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub filename: String,
    pub location: Location,
    pub end_location: Location,
    #[serde(default)]
    pub fix: Option<Fix>,
}

impl Finding {
    /// The finding's fix, if it may be offered under the given opt-in.
    pub fn allowed_fix(&self, unsafe_fixes: bool) -> Option<&Fix> {
        self.fix.as_ref().filter(|fix| fix.is_allowed(unsafe_fixes))
    }
}

/// Parse the stdout of a check pass.
///
/// Empty (or whitespace-only) output means no findings.
pub fn parse_findings(stdout: &str) -> Result<Vec<Finding>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(stdout).map_err(AnalyzerError::OutputParse)
}

fn syntax_error_code() -> String {
    SYNTAX_ERROR_CODE.to_string()
}

fn null_as_syntax_error<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(syntax_error_code))
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
