// This file is part of pyruff-lsp.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0

//! Formatter engine that wraps `ruff format` and ruff's fix mode.
//!
//! # How it works
//!
//! 1. We run `ruff format` over the document text
//! 2. We run `ruff check --fix --fixable=I,...` over the formatted text
//! 3. If the result differs from the input, we return one edit replacing
//!    the whole document
//!
//! The fix pass only touches import sorting (`I`) unless the `format`
//! setting opts more rule families in.

use std::sync::Arc;

use lsp_types::TextEdit;

use crate::edits::whole_document_range;
use crate::invoker::{ProcessRunner, RuffInvoker, RuffMode, SubprocessRunner};
use crate::settings::PluginSettings;

/// The formatter engine.
pub struct FormatterEngine<R = SubprocessRunner> {
    invoker: Arc<RuffInvoker<R>>,
}

impl<R: ProcessRunner> FormatterEngine<R> {
    pub fn new(invoker: Arc<RuffInvoker<R>>) -> Self {
        Self { invoker }
    }

    /// Format `content` and return the edit to apply, if any.
    ///
    /// Returns `None` when ruff is disabled, produced no output, or left
    /// the document unchanged.
    pub async fn format(
        &self,
        document_path: &str,
        content: &str,
        settings: &PluginSettings,
    ) -> Option<TextEdit> {
        if !settings.enabled {
            tracing::debug!("ruff is disabled, not formatting {}", document_path);
            return None;
        }

        let reformatted = self
            .invoker
            .invoke(RuffMode::Reformat, document_path, content, settings, &[])
            .await;
        if reformatted.is_empty() {
            tracing::debug!("ruff format printed nothing for {}", document_path);
            return None;
        }

        let mut formatted = self
            .invoker
            .invoke(RuffMode::Format, document_path, &reformatted, settings, &[])
            .await;
        if formatted.is_empty() {
            formatted = reformatted;
        }

        if formatted == content {
            tracing::debug!("Nothing to format in {}", document_path);
            return None;
        }

        tracing::debug!(
            "Formatter succeeded for {}, output length: {}",
            document_path,
            formatted.len()
        );

        Some(TextEdit {
            range: whole_document_range(content),
            new_text: formatted,
        })
    }
}
