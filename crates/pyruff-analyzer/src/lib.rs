// This file is part of pyruff-lsp.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0

//! PyRuff Analyzer - the ruff bridge behind pyruff-lsp
//!
//! This crate provides:
//! - Settings resolution: editor settings vs. ruff's project configuration
//! - Invoker: runs `ruff check` over a document fed on stdin
//! - Diagnostics engine: ruff findings to LSP diagnostics
//! - Code action engine: quick fixes, organize imports, noqa and fix-all
//! - Formatter engine: import sorting and opted-in fixes as a format edit

pub mod code_actions;
pub mod diagnostics;
pub mod edits;
pub mod error;
pub mod finding;
pub mod formatter;
pub mod invoker;
pub mod noqa;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_support;

pub use code_actions::{CodeActionEngine, DocumentSnapshot};
pub use diagnostics::DiagnosticEngine;
pub use error::AnalyzerError;
pub use finding::{Finding, Fix};
pub use formatter::FormatterEngine;
pub use invoker::{ProcessRunner, RuffInvoker, RuffMode, SubprocessRunner};
pub use settings::{HostConfig, PluginSettings};
