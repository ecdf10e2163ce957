// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Discovery and lifecycle of gatherer plugin processes.
//!
//! Every regular file in the plugins directory is started as a child
//! process with the magic cookie in its environment and handshaken over its
//! stdio. Binaries that fail to start or to handshake are skipped with a
//! warning; the rest are registered under their file stem at version `v1`.
//!
//! Plugins live as long as the [`PluginManager`]. [`PluginManager::cleanup`]
//! sends each child a shutdown frame and waits briefly for it to exit, then
//! escalates to `SIGTERM` and then `SIGKILL`, and reaps every child. Dropping the manager without cleanup still kills the
//! children (`kill_on_drop`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, warn};
use trento_core::Gatherer;
use trento_protocol::plugin_proto::{MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE};

use crate::client::{PluginClient, handshake};
use crate::error::{PluginError, Result};
use crate::gatherer::PluginGatherer;

/// Version every plugin is registered under.
pub const PLUGIN_VERSION: &str = "v1";

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a plugin gets to exit on the shutdown frame before `SIGTERM`.
pub const SHUTDOWN_FRAME_WAIT: Duration = Duration::from_millis(500);

/// How long a plugin gets to exit after `SIGTERM` before it is killed.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// How a plugin ended during cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStop {
    /// Exited on its own after the shutdown frame.
    Exited,
    /// Exited after `SIGTERM`.
    Terminated,
    Killed,
}

struct PluginProcess {
    name: String,
    child: Child,
    client: Arc<PluginClient>,
}

#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<PluginProcess>,
}

impl PluginManager {
    /// Start every plugin found in `directory`.
    ///
    /// A missing directory yields an empty manager. Per-plugin failures are
    /// logged and skipped.
    pub async fn load(directory: &Path, handshake_timeout: Duration) -> Result<Self> {
        if !tokio::fs::try_exists(directory).await.unwrap_or(false) {
            info!(directory = %directory.display(), "plugins directory not found, no plugins loaded");
            return Ok(Self::default());
        }

        let mut manager = Self::default();
        for path in plugin_files(directory).await? {
            match spawn_plugin(&path, handshake_timeout).await {
                Ok(plugin) => {
                    info!(plugin = %plugin.name, path = %path.display(), "plugin loaded");
                    manager.plugins.push(plugin);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping plugin");
                }
            }
        }
        Ok(manager)
    }

    /// `name -> {v1 -> gatherer}` for every loaded plugin, ready for
    /// `Registry::add`.
    pub fn gatherers(&self) -> HashMap<String, HashMap<String, Arc<dyn Gatherer>>> {
        self.plugins
            .iter()
            .map(|plugin| {
                let gatherer: Arc<dyn Gatherer> =
                    Arc::new(PluginGatherer::new(plugin.client.clone()));
                let versions = HashMap::from([(PLUGIN_VERSION.to_string(), gatherer)]);
                (plugin.name.clone(), versions)
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Stop and reap every plugin. Safe to call more than once.
    pub async fn cleanup(&mut self) -> Vec<(String, PluginStop)> {
        let mut stopped = Vec::with_capacity(self.plugins.len());
        for plugin in self.plugins.drain(..) {
            let name = plugin.name.clone();
            stopped.push((name, stop_plugin(plugin).await));
        }
        stopped
    }
}

async fn plugin_files(directory: &Path) -> Result<Vec<PathBuf>> {
    let read_error = |source| PluginError::Directory {
        path: directory.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(directory).await.map_err(read_error)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
        let path = entry.path();
        // Follows symlinks
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => files.push(path),
            Ok(_) => debug!(path = %path.display(), "not a file, ignoring"),
            Err(e) => warn!(path = %path.display(), error = %e, "cannot stat plugin"),
        }
    }
    files.sort();
    Ok(files)
}

fn plugin_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn spawn_plugin(path: &Path, handshake_timeout: Duration) -> Result<PluginProcess> {
    let name = plugin_name(path);

    let mut child = Command::new(path)
        .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| PluginError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_stderr(name.clone(), stderr));
    }

    let (Some(mut stdin), Some(mut stdout)) = (child.stdin.take(), child.stdout.take()) else {
        kill_and_reap(&name, &mut child).await;
        return Err(PluginError::MissingPipe);
    };

    match tokio::time::timeout(handshake_timeout, handshake(&mut stdout, &mut stdin)).await {
        Ok(Ok(ack)) => {
            debug!(plugin = %name, capabilities = ?ack.capabilities, "handshake complete");
        }
        Ok(Err(e)) => {
            kill_and_reap(&name, &mut child).await;
            return Err(e);
        }
        Err(_) => {
            kill_and_reap(&name, &mut child).await;
            return Err(PluginError::HandshakeTimeout(handshake_timeout));
        }
    }

    let client = Arc::new(PluginClient::start(name.clone(), stdout, stdin));
    Ok(PluginProcess {
        name,
        child,
        client,
    })
}

async fn forward_stderr(name: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(plugin = %name, "{}", line);
    }
}

async fn stop_plugin(mut plugin: PluginProcess) -> PluginStop {
    match plugin.client.shutdown().await {
        Ok(()) => {
            let exited = tokio::time::timeout(SHUTDOWN_FRAME_WAIT, plugin.child.wait()).await;
            if let Ok(exited) = exited {
                match exited {
                    Ok(status) => info!(plugin = %plugin.name, %status, "plugin stopped"),
                    Err(e) => warn!(plugin = %plugin.name, error = %e, "failed to reap plugin"),
                }
                return PluginStop::Exited;
            }
            debug!(plugin = %plugin.name, "plugin ignored shutdown, terminating");
        }
        Err(e) => debug!(plugin = %plugin.name, error = %e, "could not send shutdown"),
    }

    if let Some(pid) = plugin.child.id() {
        match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => debug!(plugin = %plugin.name, pid, "sent SIGTERM"),
            Err(nix::errno::Errno::ESRCH) => debug!(plugin = %plugin.name, pid, "already exited"),
            Err(e) => warn!(plugin = %plugin.name, pid, error = %e, "failed to send SIGTERM"),
        }
    }

    match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, plugin.child.wait()).await {
        Ok(Ok(status)) => {
            info!(plugin = %plugin.name, %status, "plugin terminated");
            PluginStop::Terminated
        }
        Ok(Err(e)) => {
            warn!(plugin = %plugin.name, error = %e, "failed to reap plugin");
            PluginStop::Terminated
        }
        Err(_) => {
            warn!(plugin = %plugin.name, "plugin did not exit in time, killing");
            kill_and_reap(&plugin.name, &mut plugin.child).await;
            PluginStop::Killed
        }
    }
}

async fn kill_and_reap(name: &str, child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(plugin = %name, error = %e, "kill failed");
    }
}
