// This file is part of pyruff-lsp.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0

//! Invocation of the ruff binary.
//!
//! # How it works
//!
//! 1. We build `ruff check ... -- -` (or `ruff format ... -- -`) from the
//!    effective settings
//! 2. We spawn the configured executable, or `python -m ruff`
//! 3. We write the document to stdin and close it
//! 4. We drain stdout and stderr until the process exits
//! 5. We return stdout; failures are logged, never raised
//!
//! The process itself sits behind [`ProcessRunner`] so the translation code
//! can be exercised with canned output.

use std::future::Future;
use std::path::{Component, Path};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;

use crate::error::{AnalyzerError, Result};
use crate::settings::PluginSettings;

/// Rule prefix ruff may always fix while formatting (import sorting).
const FORMAT_FIXABLE: &str = "I";

/// What a single ruff run is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuffMode {
    /// Report findings as JSON.
    Check,
    /// Apply every allowed fix and print the fixed document.
    Fix,
    /// Apply only import sorting plus `format` rules and print the document.
    Format,
    /// Run `ruff format` and print the reformatted document.
    Reformat,
}

/// Captured result of one process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Runs an external program with the given stdin.
///
/// Implementations must report a program that could not be started as
/// [`AnalyzerError::Spawn`]; the invoker uses it to pick a fallback.
pub trait ProcessRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: &str,
    ) -> impl Future<Output = Result<ProcessOutput>> + Send;
}

/// Runs programs as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessRunner;

impl ProcessRunner for SubprocessRunner {
    async fn run(&self, program: &str, args: &[String], stdin: &str) -> Result<ProcessOutput> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AnalyzerError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Feed stdin while draining the output pipes so neither side blocks.
        let pipe = child.stdin.take();
        let write = async move {
            if let Some(mut pipe) = pipe {
                pipe.write_all(stdin.as_bytes()).await?;
                pipe.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());

        if let Err(e) = written {
            tracing::warn!("Failed to write document to {}: {}", program, e);
        }
        let output = output?;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

/// Builds ruff command lines and runs them.
pub struct RuffInvoker<R = SubprocessRunner> {
    runner: R,
    /// Interpreter used for `-m ruff` when no executable is configured.
    interpreter: String,
}

impl RuffInvoker<SubprocessRunner> {
    pub fn new() -> Self {
        Self::with_runner(SubprocessRunner)
    }
}

impl Default for RuffInvoker<SubprocessRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ProcessRunner> RuffInvoker<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            interpreter: find_interpreter(),
        }
    }

    /// Override the interpreter used for the module fallback.
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Run ruff over `document_text` and return its stdout.
    ///
    /// Returns an empty string if ruff could not be run at all.
    pub async fn invoke(
        &self,
        mode: RuffMode,
        document_path: &str,
        document_text: &str,
        settings: &PluginSettings,
        extra_args: &[String],
    ) -> String {
        let args = build_arguments(mode, document_path, settings, extra_args);

        let result = match &settings.executable {
            Some(executable) => {
                tracing::debug!(
                    "Calling {} with args: {:?} on '{}'",
                    executable,
                    args,
                    document_path
                );
                match self.runner.run(executable, &args, document_text).await {
                    Err(e @ AnalyzerError::Spawn { .. }) => {
                        tracing::error!("Can't execute ruff with given executable: {}", e);
                        self.run_module(&args, document_text).await
                    }
                    other => other,
                }
            }
            None => self.run_module(&args, document_text).await,
        };

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Failed to run ruff: {}", e);
                return String::new();
            }
        };

        if output.exit_code != Some(0) {
            tracing::error!(
                "Error running ruff (exit code {:?}): {}",
                output.exit_code,
                output.stderr.trim()
            );
        } else if !output.stderr.trim().is_empty() {
            tracing::warn!("ruff stderr: {}", output.stderr.trim());
        }

        output.stdout
    }

    async fn run_module(&self, args: &[String], document_text: &str) -> Result<ProcessOutput> {
        let mut module_args = vec!["-m".to_string(), "ruff".to_string()];
        module_args.extend(args.iter().cloned());

        tracing::debug!("Calling {} with args: {:?}", self.interpreter, module_args);
        self.runner
            .run(&self.interpreter, &module_args, document_text)
            .await
    }
}

#[cfg(test)]
impl RuffInvoker<crate::test_support::FakeRunner> {
    pub(crate) fn runner_calls(&self) -> Vec<crate::test_support::Call> {
        self.runner.calls()
    }
}

/// Build the argument vector for one ruff run.
///
/// Everything after the subcommand is flags, then `--` and `-` so ruff
/// reads the document from stdin.
pub fn build_arguments(
    mode: RuffMode,
    document_path: &str,
    settings: &PluginSettings,
    extra_args: &[String],
) -> Vec<String> {
    if mode == RuffMode::Reformat {
        return build_format_arguments(document_path, settings, extra_args);
    }

    let mut args: Vec<String> = vec![
        "check".into(),
        // Suppress update announcements
        "--quiet".into(),
        // Findings are not a failure
        "--exit-zero".into(),
        "--output-format=json".into(),
        // Lint notebooks as Python
        "--extension=ipynb:python".into(),
        // Honor excludes even though the path is passed explicitly
        "--force-exclude".into(),
    ];

    match mode {
        RuffMode::Check => args.push("--no-fix".into()),
        RuffMode::Fix => args.push("--fix".into()),
        RuffMode::Format => {
            args.push("--fix".into());
            let mut fixable = vec![FORMAT_FIXABLE.to_string()];
            fixable.extend(settings.format.iter().flatten().cloned());
            args.push(format!("--fixable={}", fixable.join(",")));
        }
        RuffMode::Reformat => {}
    }

    // Lets per-file-ignores and excludes apply to unsaved content
    if !document_path.is_empty() {
        args.push(format!("--stdin-filename={}", document_path));
    }

    if let Some(config) = &settings.config {
        args.push(format!("--config={}", config));
    }
    if let Some(line_length) = settings.line_length {
        args.push(format!("--line-length={}", line_length));
    }
    if settings.preview {
        args.push("--preview".into());
    }
    if let Some(target_version) = &settings.target_version {
        args.push(format!("--target-version={}", target_version));
    }
    if settings.unsafe_fixes {
        args.push("--unsafe-fixes".into());
    }

    let lists = [
        ("--exclude", &settings.exclude),
        ("--select", &settings.select),
        ("--extend-select", &settings.extend_select),
        ("--ignore", &settings.ignore),
        ("--extend-ignore", &settings.extend_ignore),
    ];
    for (flag, values) in lists {
        if let Some(values) = values {
            args.push(format!("{}={}", flag, values.join(",")));
        }
    }

    for (pattern, codes) in settings.per_file_ignores.iter().flatten() {
        if path_matches(document_path, pattern) {
            args.push(format!("--ignore={}", codes.join(",")));
        }
    }

    args.extend(extra_args.iter().cloned());
    args.extend(["--".to_string(), "-".to_string()]);

    args
}

/// Build the argument vector for `ruff format`.
///
/// Rule selection does not apply to the formatter, so only the path,
/// config and style options are passed.
fn build_format_arguments(
    document_path: &str,
    settings: &PluginSettings,
    extra_args: &[String],
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "format".into(),
        "--quiet".into(),
        "--force-exclude".into(),
    ];

    if !document_path.is_empty() {
        args.push(format!("--stdin-filename={}", document_path));
    }
    if let Some(config) = &settings.config {
        args.push(format!("--config={}", config));
    }
    if let Some(exclude) = &settings.exclude {
        args.push(format!("--exclude={}", exclude.join(",")));
    }
    if settings.preview {
        args.push("--preview".into());
    }
    if let Some(line_length) = settings.line_length {
        args.push(format!("--line-length={}", line_length));
    }
    if let Some(target_version) = &settings.target_version {
        args.push(format!("--target-version={}", target_version));
    }

    args.extend(extra_args.iter().cloned());
    args.extend(["--".to_string(), "-".to_string()]);

    args
}

/// Match a path against a per-file-ignore glob.
///
/// A relative pattern matches the trailing components of the path, so
/// `__init__.py` matches that file in any directory and `tests/*.py`
/// matches any Python file directly inside a `tests` directory. An absolute
/// pattern has to match the whole path. Each component is a `glob` pattern.
pub fn path_matches(document_path: &str, pattern: &str) -> bool {
    let path = Path::new(document_path);
    let pattern_path = Path::new(pattern);

    let path_parts = normal_components(path);
    let pattern_parts = normal_components(pattern_path);
    if pattern_parts.is_empty() || pattern_parts.len() > path_parts.len() {
        return false;
    }
    if pattern_path.is_absolute()
        && (!path.is_absolute() || pattern_parts.len() != path_parts.len())
    {
        return false;
    }

    let tail = &path_parts[path_parts.len() - pattern_parts.len()..];
    tail.iter()
        .zip(&pattern_parts)
        .all(|(part, pattern)| match glob::Pattern::new(pattern) {
            Ok(glob) => glob.matches(part),
            Err(e) => {
                tracing::warn!("Invalid per-file-ignores pattern '{}': {}", pattern, e);
                false
            }
        })
}

fn normal_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Find the Python interpreter for the `-m ruff` fallback.
///
/// Search order:
/// 1. PYRUFF_PYTHON environment variable
/// 2. The active virtualenv (VIRTUAL_ENV)
/// 3. `python3` (`python` on Windows) from PATH
fn find_interpreter() -> String {
    if let Ok(python) = std::env::var("PYRUFF_PYTHON") {
        if !python.is_empty() {
            tracing::info!("Using interpreter from PYRUFF_PYTHON: {}", python);
            return python;
        }
    }

    if let Ok(venv) = std::env::var("VIRTUAL_ENV") {
        let python = if cfg!(windows) {
            Path::new(&venv).join("Scripts").join("python.exe")
        } else {
            Path::new(&venv).join("bin").join("python")
        };
        if python.exists() {
            let python = python.to_string_lossy().into_owned();
            tracing::info!("Using virtualenv interpreter: {}", python);
            return python;
        }
    }

    if cfg!(windows) { "python" } else { "python3" }.to_string()
}
