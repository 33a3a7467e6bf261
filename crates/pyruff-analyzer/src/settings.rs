// This file is part of pyruff-lsp.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0

//! Effective settings for one lint, format or code-action request.
//!
//! # Precedence
//!
//! 1. The editor sends the plugin section of its configuration (camelCase
//!    keys, e.g. `extendSelect`, `perFileIgnores`).
//! 2. We look for ruff's own project configuration above the document:
//!    `pyproject.toml` with a `[tool.ruff]` table, or `ruff.toml` /
//!    `.ruff.toml`.
//! 3. If ruff has project configuration, it owns rule selection. Only the
//!    fields that make sense on top of it survive from the editor:
//!    `enabled`, `executable`, `unsafeFixes`, `extendIgnore`,
//!    `extendSelect`, `format` and `severities`.
//!
//! Settings are resolved from scratch for every request, so edits to a
//! project file apply without restarting the server.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AnalyzerError, Result};

const PYPROJECT: &str = "pyproject.toml";
const RUFF_CONFIG_FILES: [&str; 2] = ["ruff.toml", ".ruff.toml"];

/// Plugin settings as understood by the invoker and the code-action engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginSettings {
    pub enabled: bool,
    /// Path to the ruff binary. Unset means `python -m ruff`.
    pub executable: Option<String>,
    pub config: Option<String>,
    pub line_length: Option<u32>,
    pub preview: bool,
    pub target_version: Option<String>,
    pub exclude: Option<Vec<String>>,
    pub select: Option<Vec<String>>,
    pub extend_select: Option<Vec<String>>,
    pub ignore: Option<Vec<String>>,
    pub extend_ignore: Option<Vec<String>>,
    /// Glob -> rule codes ignored for documents matching the glob.
    pub per_file_ignores: Option<BTreeMap<String, Vec<String>>>,
    /// Extra rule prefixes ruff may fix while formatting (`I` is implied).
    pub format: Option<Vec<String>>,
    pub unsafe_fixes: bool,
    /// Rule code (or prefix) -> severity letter (`E`, `W`, `I`, `H`).
    pub severities: Option<BTreeMap<String, String>>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: None,
            config: None,
            line_length: None,
            preview: false,
            target_version: None,
            exclude: None,
            select: None,
            extend_select: None,
            ignore: None,
            extend_ignore: None,
            per_file_ignores: None,
            format: None,
            unsafe_fixes: false,
            severities: None,
        }
    }
}

/// The editor-provided configuration, kept as opaque JSON.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    value: Value,
}

impl HostConfig {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Locate the ruff section.
    ///
    /// Accepts the pylsp layout (`pylsp.plugins.ruff`), a bare
    /// `plugins.ruff` or `ruff` section, or the section itself.
    fn plugin_section(&self) -> Option<&Value> {
        let candidates = [
            self.value.pointer("/pylsp/plugins/ruff"),
            self.value.pointer("/plugins/ruff"),
            self.value.get("ruff"),
        ];
        candidates
            .into_iter()
            .flatten()
            .next()
            .or_else(|| self.value.is_object().then_some(&self.value))
    }

    /// Settings as the editor states them, before project-file precedence.
    pub fn plugin_settings(&self) -> PluginSettings {
        let Some(section) = self.plugin_section() else {
            return PluginSettings::default();
        };
        match PluginSettings::deserialize(section) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring malformed ruff settings from editor: {}", e);
                PluginSettings::default()
            }
        }
    }
}

/// Ruff configuration found above a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectConfig {
    None,
    /// A `pyproject.toml` declaring `[tool.ruff]`.
    Pyproject(PathBuf),
    /// A `ruff.toml` or `.ruff.toml`.
    RuffToml(PathBuf),
}

impl ProjectConfig {
    /// Search from the document's directory up to the workspace root.
    pub fn discover(workspace_root: Option<&Path>, document: &Path) -> Self {
        if let Some(pyproject) = find_parent_file(workspace_root, document, &[PYPROJECT]) {
            match pyproject_declares_ruff(&pyproject) {
                Ok(true) => return Self::Pyproject(pyproject),
                Ok(false) => {}
                Err(e) => tracing::warn!("{}, ignoring it for ruff settings", e),
            }
        }

        match find_parent_file(workspace_root, document, &RUFF_CONFIG_FILES) {
            Some(path) => Self::RuffToml(path),
            None => Self::None,
        }
    }

    /// Whether ruff's own configuration owns rule selection.
    pub fn delegates(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Combine editor settings with project precedence into a new value.
pub fn merge(host: PluginSettings, project: &ProjectConfig) -> PluginSettings {
    if !project.delegates() {
        return host;
    }

    PluginSettings {
        enabled: host.enabled,
        executable: host.executable,
        unsafe_fixes: host.unsafe_fixes,
        extend_ignore: host.extend_ignore,
        extend_select: host.extend_select,
        format: host.format,
        severities: host.severities,
        ..PluginSettings::default()
    }
}

/// Resolve the effective settings for `document_path`.
///
/// An empty path (an unsaved buffer) skips project discovery.
pub fn resolve(
    host: &HostConfig,
    workspace_root: Option<&Path>,
    document_path: &str,
) -> PluginSettings {
    let settings = host.plugin_settings();
    if document_path.is_empty() {
        return settings;
    }

    let project = ProjectConfig::discover(workspace_root, Path::new(document_path));
    match &project {
        ProjectConfig::Pyproject(path) | ProjectConfig::RuffToml(path) => {
            tracing::debug!(
                "Found ruff configuration in {}, skipping editor rule selection",
                path.display()
            );
        }
        ProjectConfig::None => {}
    }

    merge(settings, &project)
}

/// Return the nearest `names` file in the document's ancestors.
///
/// The walk starts at the document's directory and stops after the
/// workspace root. Documents outside the root find nothing.
fn find_parent_file(
    workspace_root: Option<&Path>,
    document: &Path,
    names: &[&str],
) -> Option<PathBuf> {
    if let Some(root) = workspace_root {
        if !document.starts_with(root) {
            tracing::debug!(
                "{} is outside the workspace root {}",
                document.display(),
                root.display()
            );
            return None;
        }
    }

    let mut dir = document.parent();
    while let Some(current) = dir {
        for name in names {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        if workspace_root.is_some_and(|root| current == root) {
            break;
        }
        dir = current.parent();
    }

    None
}

fn pyproject_declares_ruff(path: &Path) -> Result<bool> {
    let content = std::fs::read_to_string(path).map_err(|source| AnalyzerError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let table: toml::Table =
        toml::from_str(&content).map_err(|source| AnalyzerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(table
        .get("tool")
        .and_then(|tool| tool.get("ruff"))
        .is_some())
}
