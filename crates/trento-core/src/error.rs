// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Structured errors reported back to the control plane.
//!
//! A [`FactGatheringError`] is data, not control flow: it travels inside a
//! fact's value slot and the control plane renders it next to successful
//! values. Its `kind` is a short kebab-case tag that stays stable across
//! releases; the message is free text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag of a lookup miss in the gatherer registry.
pub const GATHERER_NOT_FOUND: &str = "gatherer-not-found";

/// Tag of a dotted-path miss in a fact value.
pub const VALUE_NOT_FOUND: &str = "value-not-found";

/// Tag of a failed call to a plugin process.
pub const PLUGIN_RPC_ERROR: &str = "plugin-rpc-error";

/// Tag of a gatherer task that panicked.
pub const GATHERER_PANIC: &str = "gatherer-panic";

/// Tag of a fact that reached the encoder without a payload.
pub const NULL_VALUE: &str = "null_value";

/// Tag of a payload the encoder cannot represent.
pub const UNKNOWN_VALUE_TYPE: &str = "unknown_value_type";

const DISPLAY_PREFIX: &str = "fact gathering error";

/// A tagged error value carrying a stable kind and a free-text message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactGatheringError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl FactGatheringError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// A new error of the same kind whose message has `detail` appended.
    pub fn wrap(&self, detail: impl fmt::Display) -> Self {
        Self {
            kind: self.kind.clone(),
            message: format!("{}: {}", self.message, detail),
        }
    }

    pub fn gatherer_not_found() -> Self {
        Self::new(GATHERER_NOT_FOUND, "requested gatherer not found")
    }

    pub fn value_not_found() -> Self {
        Self::new(VALUE_NOT_FOUND, "requested field value not found")
    }

    pub fn plugin_rpc() -> Self {
        Self::new(PLUGIN_RPC_ERROR, "error calling plugin gatherer")
    }

    pub fn gatherer_panic() -> Self {
        Self::new(GATHERER_PANIC, "gatherer terminated unexpectedly")
    }

    pub fn null_value() -> Self {
        Self::new(NULL_VALUE, "fact value is null")
    }

    pub fn unknown_value_type() -> Self {
        Self::new(UNKNOWN_VALUE_TYPE, "unknown value type")
    }
}

impl fmt::Display for FactGatheringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", DISPLAY_PREFIX, self.kind, self.message)
    }
}

impl std::error::Error for FactGatheringError {}
