// This file is part of pyruff-lsp.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0

//! A scripted [`ProcessRunner`] for unit tests.

use std::sync::Mutex;

use crate::error::{AnalyzerError, Result};
use crate::invoker::{ProcessOutput, ProcessRunner};

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: String,
}

/// Answers each ruff mode with fixed stdout and records every call.
#[derive(Debug, Default)]
pub(crate) struct FakeRunner {
    check: String,
    fix: String,
    format: String,
    reformat: String,
    exit_code: i32,
    stderr: String,
    failing: Vec<String>,
    calls: Mutex<Vec<Call>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check(mut self, stdout: &str) -> Self {
        self.check = stdout.to_string();
        self
    }

    pub fn with_fix(mut self, stdout: &str) -> Self {
        self.fix = stdout.to_string();
        self
    }

    pub fn with_format(mut self, stdout: &str) -> Self {
        self.format = stdout.to_string();
        self
    }

    pub fn with_reformat(mut self, stdout: &str) -> Self {
        self.reformat = stdout.to_string();
        self
    }

    pub fn with_exit(mut self, code: i32, stderr: &str) -> Self {
        self.exit_code = code;
        self.stderr = stderr.to_string();
        self
    }

    /// Make spawning `program` fail as if it did not exist.
    pub fn failing(mut self, program: &str) -> Self {
        self.failing.push(program.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProcessRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String], stdin: &str) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(Call {
            program: program.to_string(),
            args: args.to_vec(),
            stdin: stdin.to_string(),
        });

        if self.failing.iter().any(|p| p == program) {
            return Err(AnalyzerError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }

        let stdout = if args.iter().any(|a| a == "format") {
            &self.reformat
        } else if args.iter().any(|a| a == "--no-fix") {
            &self.check
        } else if args.iter().any(|a| a.starts_with("--fixable=")) {
            &self.format
        } else {
            &self.fix
        };

        Ok(ProcessOutput {
            stdout: stdout.clone(),
            stderr: self.stderr.clone(),
            exit_code: Some(self.exit_code),
        })
    }
}
