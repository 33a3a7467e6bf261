// This file is part of pyruff-lsp.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic engine that wraps `ruff check`.
//!
//! # How it works
//!
//! 1. We run ruff in check mode over the document text
//! 2. We parse stdout as a JSON list of findings
//! 3. We convert each finding to an LSP Diagnostic, carrying its fix in
//!    `data` so a later code-action request can use it without another run

use std::sync::Arc;

use lsp_types::{Diagnostic, DiagnosticSeverity, DiagnosticTag, NumberOrString, Position, Range};

use crate::finding::{parse_findings, Finding, Location, SYNTAX_ERROR_CODE};
use crate::invoker::{ProcessRunner, RuffInvoker, RuffMode, SubprocessRunner};
use crate::settings::PluginSettings;

/// Value of `Diagnostic::source` for everything we publish.
pub const DIAGNOSTIC_SOURCE: &str = "ruff";

/// Rule categories reported as errors by default (pyflakes).
const ERROR_CATEGORIES: &[char] = &['F'];

/// Codes for dead code the editor may render faded out.
const UNNECESSITY_CODES: &[&str] = &[
    "F401", // `module` imported but unused
    "F504", // % format unused named arguments
    "F522", // .format(...) unused named arguments
    "F523", // .format(...) unused positional arguments
    "F841", // local variable `name` is assigned to but never used
];

/// The diagnostic engine that wraps ruff's check mode.
pub struct DiagnosticEngine<R = SubprocessRunner> {
    invoker: Arc<RuffInvoker<R>>,
}

impl<R: ProcessRunner> DiagnosticEngine<R> {
    pub fn new(invoker: Arc<RuffInvoker<R>>) -> Self {
        Self { invoker }
    }

    /// Run a check pass and return ruff's findings.
    ///
    /// Output that is not valid JSON is logged and treated as no findings.
    pub async fn check(
        &self,
        document_path: &str,
        content: &str,
        settings: &PluginSettings,
    ) -> Vec<Finding> {
        let stdout = self
            .invoker
            .invoke(RuffMode::Check, document_path, content, settings, &[])
            .await;

        match parse_findings(&stdout) {
            Ok(findings) => findings,
            Err(e) => {
                tracing::warn!("{}", e);
                tracing::debug!("ruff stdout: {}", stdout);
                Vec::new()
            }
        }
    }

    /// Lint a document and return LSP diagnostics.
    pub async fn lint(
        &self,
        document_path: &str,
        content: &str,
        settings: &PluginSettings,
    ) -> Vec<Diagnostic> {
        if !settings.enabled {
            tracing::debug!("ruff is disabled, skipping diagnostics for {}", document_path);
            return Vec::new();
        }

        let diagnostics: Vec<Diagnostic> = self
            .check(document_path, content, settings)
            .await
            .iter()
            .map(|finding| create_diagnostic(finding, settings))
            .collect();

        tracing::info!(
            "Diagnostics for {}: {} finding(s)",
            document_path,
            diagnostics.len()
        );

        diagnostics
    }
}

/// Convert a ruff finding into an LSP diagnostic.
pub fn create_diagnostic(finding: &Finding, settings: &PluginSettings) -> Diagnostic {
    let tags = UNNECESSITY_CODES
        .contains(&finding.code.as_str())
        .then(|| vec![DiagnosticTag::UNNECESSARY]);

    Diagnostic {
        range: diagnostic_range(finding.location, finding.end_location),
        severity: Some(severity_for(&finding.code, settings)),
        code: Some(NumberOrString::String(finding.code.clone())),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message: finding.message.clone(),
        tags,
        data: finding.fix.as_ref().map(|fix| fix.to_payload()),
        ..Default::default()
    }
}

/// Severity for a rule code.
///
/// Syntax errors and pyflakes rules are errors, everything else a warning.
/// A `severities` entry overrides that; the longest key that prefixes the
/// code wins, so an exact code always beats a category.
pub fn severity_for(code: &str, settings: &PluginSettings) -> DiagnosticSeverity {
    let default = if code == SYNTAX_ERROR_CODE || code.starts_with(ERROR_CATEGORIES) {
        DiagnosticSeverity::ERROR
    } else {
        DiagnosticSeverity::WARNING
    };

    settings
        .severities
        .iter()
        .flatten()
        .filter(|(prefix, _)| code.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .and_then(|(_, letter)| severity_from_letter(letter))
        .unwrap_or(default)
}

fn severity_from_letter(letter: &str) -> Option<DiagnosticSeverity> {
    match letter {
        "E" => Some(DiagnosticSeverity::ERROR),
        "W" => Some(DiagnosticSeverity::WARNING),
        "I" => Some(DiagnosticSeverity::INFORMATION),
        "H" => Some(DiagnosticSeverity::HINT),
        _ => None,
    }
}

/// ruff's 1-based, end-inclusive span to a 0-based LSP range.
fn diagnostic_range(start: Location, end: Location) -> Range {
    Range {
        start: Position {
            line: start.row.saturating_sub(1),
            character: start.column.saturating_sub(1),
        },
        end: Position {
            line: end.row.saturating_sub(1),
            character: end.column.saturating_sub(1),
        },
    }
}
