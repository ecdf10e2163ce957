// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Broker messaging.
//!
//! The engines only see the [`Adapter`] trait. [`AmqpAdapter`] talks to a
//! real broker; [`MemoryAdapter`] records traffic for tests and local runs.

pub mod amqp;
pub mod memory;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;

pub use amqp::AmqpAdapter;
pub use memory::MemoryAdapter;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("adapter is already listening")]
    AlreadyListening,

    #[error("adapter is unsubscribed")]
    Closed,

    #[error("consumer stopped: {0}")]
    ConsumerLost(String),
}

/// Receives every delivery of a subscription.
///
/// `Ok` acknowledges the message; `Err` or a panic rejects it without
/// requeue.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, content_type: &str, body: &[u8]) -> anyhow::Result<()>;
}

/// A subscription bound to one exchange and one queue.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Start delivering messages to `handler` on a background task.
    async fn listen(&self, handler: Arc<dyn MessageHandler>) -> Result<(), MessagingError>;

    /// Resolves once deliveries stopped for a reason other than
    /// [`Adapter::unsubscribe`].
    async fn lost(&self) -> MessagingError;

    /// Publish a persistent message on the bound exchange.
    async fn publish(
        &self,
        routing_key: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<(), MessagingError>;

    /// Stop consuming and close the connection. Calling it again is a no-op.
    async fn unsubscribe(&self) -> Result<(), MessagingError>;
}

/// Run `handler` on one delivery. A panic is reported as an error.
pub(crate) async fn handle_delivery(
    handler: &dyn MessageHandler,
    content_type: &str,
    body: &[u8],
) -> anyhow::Result<()> {
    match AssertUnwindSafe(handler.handle(content_type, body))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("message handler panicked")),
    }
}
