// This file is part of pyruff-lsp.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0

//! Error types for the analyzer.
//!
//! None of these ever reach the editor. The engines recover from every
//! variant locally and log it; the types exist so the fallible helpers can
//! use `?` and so the logs say exactly what went wrong.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error while talking to ruff: {0}")]
    Io(#[from] std::io::Error),

    #[error("ruff produced output that is not a JSON list of findings: {0}")]
    OutputParse(#[source] serde_json::Error),

    #[error("diagnostic data is not a ruff fix: {0}")]
    Payload(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;
