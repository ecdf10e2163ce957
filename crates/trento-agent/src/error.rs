// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for trento-agent.

use thiserror::Error;

/// Agent errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Broker connection, channel or consumer failed.
    #[error("Messaging error: {0}")]
    Messaging(#[from] crate::messaging::MessagingError),

    /// `listen` was called before `subscribe`.
    #[error("engine is not subscribed")]
    NotSubscribed,
}

/// Result type using the agent Error.
pub type Result<T> = std::result::Result<T, Error>;
