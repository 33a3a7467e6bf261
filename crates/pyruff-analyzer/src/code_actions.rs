// This file is part of pyruff-lsp.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0

//! Code actions built from ruff fixes.
//!
//! # How it works
//!
//! 1. For every ruff diagnostic the editor hands back, offer a
//!    "Disable for this line" action
//! 2. If the diagnostic still carries its fix in `data`, offer it as a
//!    quick fix, or as "organize imports" for `I001`
//! 3. Run a fresh check pass: it catches an import-sorting fix the editor's
//!    list missed, and tells us whether "Fix All" has anything to do
//! 4. "Fix All" replaces the whole document with the output of ruff's fix
//!    mode
//!
//! Unsafe fixes are only offered when `unsafeFixes` is set.

use std::collections::HashMap;
use std::sync::Arc;

use lsp_types::{
    CodeAction, CodeActionKind, Diagnostic, NumberOrString, Position, Range, TextEdit, Uri,
    WorkspaceEdit,
};

use crate::diagnostics::{create_diagnostic, DiagnosticEngine, DIAGNOSTIC_SOURCE};
use crate::edits::{fix_text_edits, utf16_len, whole_document_range};
use crate::finding::{Finding, Fix};
use crate::invoker::{ProcessRunner, RuffInvoker, RuffMode, SubprocessRunner};
use crate::noqa;
use crate::settings::PluginSettings;

/// Rule code of ruff's import sorting check.
pub const ORGANIZE_IMPORTS_CODE: &str = "I001";

/// The state of a document at the time of the request.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub uri: Uri,
    /// Filesystem path handed to ruff; empty for unsaved buffers.
    pub path: String,
    pub text: String,
}

/// Builds quick fixes, organize-imports, disable and fix-all actions.
pub struct CodeActionEngine<R = SubprocessRunner> {
    invoker: Arc<RuffInvoker<R>>,
    diagnostics: DiagnosticEngine<R>,
}

impl<R: ProcessRunner> CodeActionEngine<R> {
    pub fn new(invoker: Arc<RuffInvoker<R>>) -> Self {
        Self {
            diagnostics: DiagnosticEngine::new(invoker.clone()),
            invoker,
        }
    }

    /// Compute the code actions for `document`.
    ///
    /// `context` is the list of diagnostics the editor sent with the
    /// request; diagnostics from other sources are ignored.
    pub async fn code_actions(
        &self,
        document: &DocumentSnapshot,
        context: &[Diagnostic],
        settings: &PluginSettings,
    ) -> Vec<CodeAction> {
        if !settings.enabled {
            return Vec::new();
        }

        let mut actions = Vec::new();
        let mut has_organize_imports = false;

        for diagnostic in context.iter().filter(|d| is_ruff_diagnostic(d)) {
            let Some(code) = diagnostic_code(diagnostic) else {
                continue;
            };

            actions.push(disable_action(document, diagnostic, &code));

            let data = match &diagnostic.data {
                Some(data) if !data.is_null() => data,
                _ => continue,
            };
            let fix = match Fix::from_payload(data) {
                Ok(fix) => fix,
                Err(e) => {
                    tracing::warn!("Skipping fix for {}: {}", code, e);
                    continue;
                }
            };

            if !fix.is_allowed(settings.unsafe_fixes) {
                continue;
            }

            if code == ORGANIZE_IMPORTS_CODE {
                actions.push(organize_imports_action(document, diagnostic, &fix));
                has_organize_imports = true;
            } else {
                actions.push(quick_fix_action(document, diagnostic, &code, &fix));
            }
        }

        let findings = self
            .diagnostics
            .check(&document.path, &document.text, settings)
            .await;
        // No borrowing iterator may be held across the fix-all await.
        let fixable: Vec<&Finding> = findings
            .iter()
            .filter(|finding| finding.allowed_fix(settings.unsafe_fixes).is_some())
            .collect();
        let has_fixes = !fixable.is_empty();

        if !has_organize_imports {
            let organize = fixable
                .iter()
                .copied()
                .find(|finding| finding.code == ORGANIZE_IMPORTS_CODE);
            if let Some((finding, fix)) = organize.and_then(|f| Some((f, f.fix.as_ref()?))) {
                let diagnostic = create_diagnostic(finding, settings);
                actions.push(organize_imports_action(document, &diagnostic, fix));
                actions.push(disable_action(document, &diagnostic, &finding.code));
            }
        }

        if has_fixes {
            if let Some(action) = self.fix_all_action(document, settings).await {
                actions.push(action);
            }
        }

        tracing::debug!(
            "Code actions for {}: {} action(s)",
            document.uri.as_str(),
            actions.len()
        );

        actions
    }

    async fn fix_all_action(
        &self,
        document: &DocumentSnapshot,
        settings: &PluginSettings,
    ) -> Option<CodeAction> {
        let fixed = self
            .invoker
            .invoke(RuffMode::Fix, &document.path, &document.text, settings, &[])
            .await;

        if fixed.is_empty() && !document.text.is_empty() {
            tracing::warn!(
                "ruff returned no output in fix mode for {}, omitting Fix All",
                document.uri.as_str()
            );
            return None;
        }

        let edit = TextEdit {
            range: whole_document_range(&document.text),
            new_text: fixed,
        };

        Some(CodeAction {
            title: "Ruff: Fix All".to_string(),
            kind: Some(CodeActionKind::SOURCE_FIX_ALL),
            edit: Some(workspace_edit(document, vec![edit])),
            ..Default::default()
        })
    }
}

fn is_ruff_diagnostic(diagnostic: &Diagnostic) -> bool {
    diagnostic
        .source
        .as_deref()
        .is_none_or(|source| source == DIAGNOSTIC_SOURCE)
}

fn diagnostic_code(diagnostic: &Diagnostic) -> Option<String> {
    match diagnostic.code.as_ref()? {
        NumberOrString::String(code) => Some(code.clone()),
        NumberOrString::Number(code) => Some(code.to_string()),
    }
}

fn fix_title(fix: &Fix) -> String {
    if fix.is_unsafe() {
        format!("{} (unsafe)", fix.message)
    } else {
        fix.message.clone()
    }
}

fn workspace_edit(document: &DocumentSnapshot, edits: Vec<TextEdit>) -> WorkspaceEdit {
    WorkspaceEdit {
        changes: Some(HashMap::from([(document.uri.clone(), edits)])),
        ..Default::default()
    }
}

fn quick_fix_action(
    document: &DocumentSnapshot,
    diagnostic: &Diagnostic,
    code: &str,
    fix: &Fix,
) -> CodeAction {
    CodeAction {
        title: format!("Ruff ({}): {}", code, fix_title(fix)),
        kind: Some(CodeActionKind::QUICKFIX),
        diagnostics: Some(vec![diagnostic.clone()]),
        edit: Some(workspace_edit(document, fix_text_edits(fix))),
        ..Default::default()
    }
}

fn organize_imports_action(
    document: &DocumentSnapshot,
    diagnostic: &Diagnostic,
    fix: &Fix,
) -> CodeAction {
    CodeAction {
        title: format!("Ruff: {}", fix_title(fix)),
        kind: Some(CodeActionKind::SOURCE_ORGANIZE_IMPORTS),
        diagnostics: Some(vec![diagnostic.clone()]),
        edit: Some(workspace_edit(document, fix_text_edits(fix))),
        ..Default::default()
    }
}

/// Add `code` to the line's `# noqa` comment, creating one if needed.
fn disable_action(document: &DocumentSnapshot, diagnostic: &Diagnostic, code: &str) -> CodeAction {
    let line_number = diagnostic.range.start.line;
    let line = document
        .text
        .lines()
        .nth(line_number as usize)
        .unwrap_or_default();

    let edit = TextEdit {
        range: Range {
            start: Position {
                line: line_number,
                character: 0,
            },
            end: Position {
                line: line_number,
                character: utf16_len(line),
            },
        },
        new_text: noqa::add_code(line, code),
    };

    CodeAction {
        title: format!("Ruff ({}): Disable for this line", code),
        kind: Some(CodeActionKind::QUICKFIX),
        diagnostics: Some(vec![diagnostic.clone()]),
        edit: Some(workspace_edit(document, vec![edit])),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRunner;

    const UNUSED_SOURCE: &str = "import os\ndef f():\n    a = 2\n";

    const UNUSED_FINDINGS: &str = r#"[
      {"code": "F401", "message": "`os` imported but unused", "filename": "/p/a.py",
       "location": {"row": 1, "column": 8}, "end_location": {"row": 1, "column": 10},
       "fix": {"applicability": "safe", "message": "Remove unused import: `os`",
               "edits": [{"content": "", "location": {"row": 1, "column": 1},
                          "end_location": {"row": 2, "column": 1}}]}},
      {"code": "F841", "message": "Local variable `a` is assigned to but never used",
       "filename": "/p/a.py",
       "location": {"row": 3, "column": 5}, "end_location": {"row": 3, "column": 6},
       "fix": {"applicability": "unsafe", "message": "Remove assignment to unused variable `a`",
               "edits": [{"content": "pass", "location": {"row": 3, "column": 5},
                          "end_location": {"row": 3, "column": 10}}]}}
    ]"#;

    const IMPORT_SOURCE: &str = "import pathlib\nimport os\n";

    const IMPORT_FINDINGS: &str = r#"[
      {"code": "I001", "message": "Import block is un-sorted or un-formatted",
       "filename": "/p/a.py",
       "location": {"row": 1, "column": 1}, "end_location": {"row": 3, "column": 1},
       "fix": {"applicability": "safe", "message": "Organize imports",
               "edits": [{"content": "import os\nimport pathlib\n",
                          "location": {"row": 1, "column": 1},
                          "end_location": {"row": 3, "column": 1}}]}}
    ]"#;

    fn document(text: &str) -> DocumentSnapshot {
        DocumentSnapshot {
            uri: "file:///p/a.py".parse().unwrap(),
            path: "/p/a.py".to_string(),
            text: text.to_string(),
        }
    }

    fn invoker(runner: FakeRunner) -> Arc<RuffInvoker<FakeRunner>> {
        Arc::new(RuffInvoker::with_runner(runner).with_interpreter("python3"))
    }

    fn titles(actions: &[CodeAction]) -> Vec<String> {
        let mut titles: Vec<String> = actions.iter().map(|a| a.title.clone()).collect();
        titles.sort();
        titles
    }

    fn single_edit(action: &CodeAction) -> TextEdit {
        let changes = action.edit.as_ref().unwrap().changes.as_ref().unwrap();
        let edits = changes.values().next().unwrap();
        assert_eq!(edits.len(), 1);
        edits[0].clone()
    }

    fn find<'a>(actions: &'a [CodeAction], title: &str) -> &'a CodeAction {
        actions
            .iter()
            .find(|a| a.title == title)
            .unwrap_or_else(|| panic!("no action titled {:?}", title))
    }

    async fn lint_then_actions(
        source: &str,
        findings: &str,
        fixed: &str,
        settings: &PluginSettings,
    ) -> Vec<CodeAction> {
        let invoker = invoker(FakeRunner::new().with_check(findings).with_fix(fixed));
        let doc = document(source);
        let diagnostics = DiagnosticEngine::new(invoker.clone())
            .lint(&doc.path, &doc.text, settings)
            .await;
        CodeActionEngine::new(invoker)
            .code_actions(&doc, &diagnostics, settings)
            .await
    }

    #[tokio::test]
    async fn test_unused_code_actions() {
        let settings = PluginSettings {
            select: Some(vec!["F".into()]),
            unsafe_fixes: true,
            ..PluginSettings::default()
        };
        let actions =
            lint_then_actions(UNUSED_SOURCE, UNUSED_FINDINGS, "def f():\n    pass\n", &settings)
                .await;

        assert_eq!(
            titles(&actions),
            vec![
                "Ruff (F401): Disable for this line",
                "Ruff (F401): Remove unused import: `os`",
                "Ruff (F841): Disable for this line",
                "Ruff (F841): Remove assignment to unused variable `a` (unsafe)",
                "Ruff: Fix All",
            ]
        );

        let disable_import = single_edit(find(&actions, "Ruff (F401): Disable for this line"));
        assert_eq!(disable_import.new_text, "import os  # noqa: F401");
        assert_eq!(disable_import.range.start, Position { line: 0, character: 0 });
        assert_eq!(disable_import.range.end, Position { line: 0, character: 9 });

        let disable_var = single_edit(find(&actions, "Ruff (F841): Disable for this line"));
        assert_eq!(disable_var.new_text, "    a = 2  # noqa: F841");
        assert_eq!(disable_var.range.start.line, 2);

        let fix_all = find(&actions, "Ruff: Fix All");
        assert_eq!(fix_all.kind, Some(CodeActionKind::SOURCE_FIX_ALL));
        let edit = single_edit(fix_all);
        assert_eq!(edit.new_text, "def f():\n    pass\n");
        assert_eq!(edit.range.end, Position { line: 3, character: 0 });

        let quick_fix = find(&actions, "Ruff (F401): Remove unused import: `os`");
        assert_eq!(quick_fix.kind, Some(CodeActionKind::QUICKFIX));
        let edit = single_edit(quick_fix);
        assert_eq!(edit.range.start, Position { line: 0, character: 1 });
        assert_eq!(edit.range.end, Position { line: 1, character: 1 });
    }

    #[tokio::test]
    async fn test_unsafe_fix_is_gated() {
        let settings = PluginSettings::default();
        let actions =
            lint_then_actions(UNUSED_SOURCE, UNUSED_FINDINGS, "def f():\n    a = 2\n", &settings)
                .await;

        assert_eq!(
            titles(&actions),
            vec![
                "Ruff (F401): Disable for this line",
                "Ruff (F401): Remove unused import: `os`",
                "Ruff (F841): Disable for this line",
                "Ruff: Fix All",
            ]
        );
    }

    #[tokio::test]
    async fn test_only_unsafe_fixes_gives_no_fix_all() {
        let only_unsafe = r#"[
          {"code": "F841", "message": "Local variable `a` is assigned to but never used",
           "filename": "/p/a.py",
           "location": {"row": 3, "column": 5}, "end_location": {"row": 3, "column": 6},
           "fix": {"applicability": "unsafe", "message": "Remove assignment to unused variable `a`",
                   "edits": []}}
        ]"#;

        let actions =
            lint_then_actions(UNUSED_SOURCE, only_unsafe, UNUSED_SOURCE, &PluginSettings::default())
                .await;
        assert_eq!(titles(&actions), vec!["Ruff (F841): Disable for this line"]);

        let settings = PluginSettings {
            unsafe_fixes: true,
            ..PluginSettings::default()
        };
        let actions = lint_then_actions(UNUSED_SOURCE, only_unsafe, "x", &settings).await;
        assert!(titles(&actions).contains(&"Ruff: Fix All".to_string()));
    }

    #[tokio::test]
    async fn test_single_organize_imports_action() {
        let settings = PluginSettings {
            extend_select: Some(vec!["I".into()]),
            extend_ignore: Some(vec!["F".into()]),
            ..PluginSettings::default()
        };
        let actions = lint_then_actions(
            IMPORT_SOURCE,
            IMPORT_FINDINGS,
            "import os\nimport pathlib\n",
            &settings,
        )
        .await;

        assert_eq!(
            titles(&actions),
            vec![
                "Ruff (I001): Disable for this line",
                "Ruff: Fix All",
                "Ruff: Organize imports",
            ]
        );
        let organize = find(&actions, "Ruff: Organize imports");
        assert_eq!(organize.kind, Some(CodeActionKind::SOURCE_ORGANIZE_IMPORTS));
    }

    #[tokio::test]
    async fn test_fresh_pass_supplies_missing_organize_imports() {
        let invoker = invoker(
            FakeRunner::new()
                .with_check(IMPORT_FINDINGS)
                .with_fix("import os\nimport pathlib\n"),
        );
        let actions = CodeActionEngine::new(invoker)
            .code_actions(&document(IMPORT_SOURCE), &[], &PluginSettings::default())
            .await;

        assert_eq!(
            titles(&actions),
            vec![
                "Ruff (I001): Disable for this line",
                "Ruff: Fix All",
                "Ruff: Organize imports",
            ]
        );
        let disable = single_edit(find(&actions, "Ruff (I001): Disable for this line"));
        assert_eq!(disable.new_text, "import pathlib  # noqa: I001");
    }

    #[tokio::test]
    async fn test_bad_payload_still_offers_disable() {
        let invoker = invoker(FakeRunner::new().with_check("[]"));
        let diagnostic = Diagnostic {
            range: Range::default(),
            code: Some(NumberOrString::String("E711".into())),
            source: Some("ruff".into()),
            message: "Comparison to `None`".into(),
            data: Some(serde_json::json!({"not": "a fix"})),
            ..Default::default()
        };

        let actions = CodeActionEngine::new(invoker)
            .code_actions(&document("x == None\n"), &[diagnostic], &PluginSettings::default())
            .await;
        assert_eq!(titles(&actions), vec!["Ruff (E711): Disable for this line"]);
        let edit = single_edit(&actions[0]);
        assert_eq!(edit.new_text, "x == None  # noqa: E711");
    }

    #[tokio::test]
    async fn test_foreign_diagnostics_are_ignored() {
        let invoker = invoker(FakeRunner::new().with_check("[]"));
        let diagnostic = Diagnostic {
            code: Some(NumberOrString::String("reportMissingImports".into())),
            source: Some("pyright".into()),
            message: "Import could not be resolved".into(),
            ..Default::default()
        };

        let actions = CodeActionEngine::new(invoker)
            .code_actions(&document("import foo\n"), &[diagnostic], &PluginSettings::default())
            .await;
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn test_empty_fix_output_omits_fix_all() {
        let invoker = invoker(FakeRunner::new().with_check(IMPORT_FINDINGS));
        let actions = CodeActionEngine::new(invoker)
            .code_actions(&document(IMPORT_SOURCE), &[], &PluginSettings::default())
            .await;
        assert!(!titles(&actions).contains(&"Ruff: Fix All".to_string()));
    }

    #[tokio::test]
    async fn test_code_actions_run_on_spawned_task() {
        let invoker = invoker(
            FakeRunner::new()
                .with_check(IMPORT_FINDINGS)
                .with_fix("import os\nimport pathlib\n"),
        );
        let engine = Arc::new(CodeActionEngine::new(invoker));

        let task = tokio::spawn(async move {
            engine
                .code_actions(&document(IMPORT_SOURCE), &[], &PluginSettings::default())
                .await
        });
        let actions = task.await.expect("task should not panic");

        assert_eq!(
            titles(&actions),
            vec![
                "Ruff (I001): Disable for this line",
                "Ruff: Fix All",
                "Ruff: Organize imports",
            ]
        );
    }
}
