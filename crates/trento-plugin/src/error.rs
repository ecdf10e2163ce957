// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for trento-plugin.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use trento_core::{ContextError, FactGatheringError};
use trento_protocol::FrameError;
use trento_protocol::plugin_proto::PROTOCOL_VERSION;

/// Result type using PluginError
pub type Result<T> = std::result::Result<T, PluginError>;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to read plugins directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start plugin {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin stdio was not captured")]
    MissingPipe,

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("unsupported protocol version {0}, expected {PROTOCOL_VERSION}")]
    ProtocolVersion(u32),

    #[error("magic cookie mismatch")]
    MagicCookie,

    #[error("plugin does not offer the '{0}' capability")]
    MissingCapability(String),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("plugin connection closed")]
    Closed,

    #[error(transparent)]
    Context(#[from] ContextError),

    /// The remote gatherer itself failed the whole batch.
    #[error(transparent)]
    Gatherer(FactGatheringError),
}

impl From<PluginError> for FactGatheringError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Gatherer(e) => e,
            other => FactGatheringError::plugin_rpc().wrap(other),
        }
    }
}
