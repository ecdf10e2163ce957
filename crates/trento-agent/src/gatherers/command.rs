// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Running host commands for gatherers.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;
use trento_core::{Context, ContextError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error(transparent)]
    Context(#[from] ContextError),
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` to completion and return its stdout. A non-zero exit
    /// status is an error.
    async fn output(
        &self,
        ctx: &Context,
        program: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, CommandError>;
}

/// Runs commands as child processes. The child is killed when `ctx` is done
/// first.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioExecutor;

#[async_trait]
impl CommandExecutor for TokioExecutor {
    async fn output(
        &self,
        ctx: &Context,
        program: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, CommandError> {
        debug!(program, ?args, "running command");

        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);
        let child = command.output();

        let output = tokio::select! {
            _ = ctx.done() => {
                return Err(ctx.err().unwrap_or(ContextError::Cancelled).into());
            }
            output = child => output.map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?,
        };

        if !output.status.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

/// Canned command results for tests, keyed by the full command line.
#[derive(Default, Clone)]
pub struct MockExecutor {
    outputs: Arc<HashMap<String, Result<String, String>>>,
    calls: Arc<AtomicUsize>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `stdout`.
    pub fn with_output(mut self, command: &str, stdout: &str) -> Self {
        Arc::make_mut(&mut self.outputs).insert(command.to_string(), Ok(stdout.to_string()));
        self
    }

    /// Fail `command` with `stderr`.
    pub fn with_failure(mut self, command: &str, stderr: &str) -> Self {
        Arc::make_mut(&mut self.outputs).insert(command.to_string(), Err(stderr.to_string()));
        self
    }

    /// How many commands were run, across clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn output(
        &self,
        ctx: &Context,
        program: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, CommandError> {
        if let Some(e) = ctx.err() {
            return Err(e.into());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        match self.outputs.get(&command) {
            Some(Ok(stdout)) => Ok(stdout.clone().into_bytes()),
            Some(Err(stderr)) => Err(CommandError::Failed {
                program: program.to_string(),
                status: "exit status: 1".to_string(),
                stderr: stderr.clone(),
            }),
            None => Err(CommandError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such command"),
            }),
        }
    }
}
