// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process adapter.
//!
//! Messages are handed to the installed handler with [`MemoryAdapter::deliver`];
//! everything the handler publishes, acks and rejects is recorded.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};

use super::{Adapter, MessageHandler, MessagingError, handle_delivery};

/// A message published through the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub routing_key: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// How a delivered message was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    /// Rejected without requeue, with the handler error.
    Nack(String),
}

#[derive(Default)]
struct State {
    handler: Option<Arc<dyn MessageHandler>>,
    published: Vec<Published>,
    settlements: Vec<Settlement>,
    unsubscribed: bool,
}

pub struct MemoryAdapter {
    state: Mutex<State>,
    lost: watch::Sender<Option<String>>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            lost: watch::channel(None).0,
        }
    }
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop deliveries as a dropped broker connection would.
    pub async fn lose(&self, reason: &str) {
        self.state.lock().await.handler = None;
        self.lost.send_replace(Some(reason.to_string()));
    }

    /// Run the handler on one message and record its settlement.
    pub async fn deliver(
        &self,
        content_type: &str,
        body: &[u8],
    ) -> Result<Settlement, MessagingError> {
        let handler = {
            let state = self.state.lock().await;
            if state.unsubscribed {
                return Err(MessagingError::Closed);
            }
            state.handler.clone()
        };
        let Some(handler) = handler else {
            return Err(MessagingError::Closed);
        };

        let settlement = match handle_delivery(handler.as_ref(), content_type, body).await {
            Ok(()) => Settlement::Ack,
            Err(e) => Settlement::Nack(format!("{:#}", e)),
        };
        self.state.lock().await.settlements.push(settlement.clone());
        Ok(settlement)
    }

    pub async fn published(&self) -> Vec<Published> {
        self.state.lock().await.published.clone()
    }

    pub async fn settlements(&self) -> Vec<Settlement> {
        self.state.lock().await.settlements.clone()
    }

    pub async fn is_listening(&self) -> bool {
        let state = self.state.lock().await;
        state.handler.is_some() && !state.unsubscribed
    }

    pub async fn is_unsubscribed(&self) -> bool {
        self.state.lock().await.unsubscribed
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn listen(&self, handler: Arc<dyn MessageHandler>) -> Result<(), MessagingError> {
        let mut state = self.state.lock().await;
        if state.unsubscribed {
            return Err(MessagingError::Closed);
        }
        if state.handler.is_some() {
            return Err(MessagingError::AlreadyListening);
        }
        state.handler = Some(handler);
        Ok(())
    }

    async fn lost(&self) -> MessagingError {
        let mut lost = self.lost.subscribe();
        match lost.wait_for(Option::is_some).await {
            Ok(reason) => MessagingError::ConsumerLost(reason.clone().unwrap_or_default()),
            Err(_) => MessagingError::Closed,
        }
    }

    async fn publish(
        &self,
        routing_key: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<(), MessagingError> {
        let mut state = self.state.lock().await;
        if state.unsubscribed {
            return Err(MessagingError::Closed);
        }
        state.published.push(Published {
            routing_key: routing_key.to_string(),
            content_type: content_type.to_string(),
            body: body.to_vec(),
        });
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), MessagingError> {
        let mut state = self.state.lock().await;
        state.unsubscribed = true;
        state.handler = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectOdd;

    #[async_trait]
    impl MessageHandler for RejectOdd {
        async fn handle(&self, _content_type: &str, body: &[u8]) -> anyhow::Result<()> {
            if body.len() % 2 == 1 {
                anyhow::bail!("odd body");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_deliver_records_settlement() {
        let adapter = MemoryAdapter::new();
        adapter.listen(Arc::new(RejectOdd)).await.unwrap();

        assert_eq!(adapter.deliver("t", b"ab").await.unwrap(), Settlement::Ack);
        assert_eq!(
            adapter.deliver("t", b"abc").await.unwrap(),
            Settlement::Nack("odd body".to_string())
        );
        assert_eq!(adapter.settlements().await.len(), 2);
    }

    #[tokio::test]
    async fn test_listen_twice_fails() {
        let adapter = MemoryAdapter::new();
        adapter.listen(Arc::new(RejectOdd)).await.unwrap();
        assert!(matches!(
            adapter.listen(Arc::new(RejectOdd)).await,
            Err(MessagingError::AlreadyListening)
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_closes() {
        let adapter = MemoryAdapter::new();
        adapter.listen(Arc::new(RejectOdd)).await.unwrap();
        adapter.unsubscribe().await.unwrap();
        adapter.unsubscribe().await.unwrap();

        assert!(adapter.is_unsubscribed().await);
        assert!(matches!(
            adapter.publish("k", "t", b"x").await,
            Err(MessagingError::Closed)
        ));
        assert!(matches!(
            adapter.deliver("t", b"xx").await,
            Err(MessagingError::Closed)
        ));
    }

    struct Panics;

    #[async_trait]
    impl MessageHandler for Panics {
        async fn handle(&self, _content_type: &str, _body: &[u8]) -> anyhow::Result<()> {
            panic!("handler bug");
        }
    }

    #[tokio::test]
    async fn test_handler_panic_is_rejected() {
        let adapter = MemoryAdapter::new();
        adapter.listen(Arc::new(Panics)).await.unwrap();

        assert_eq!(
            adapter.deliver("t", b"x").await.unwrap(),
            Settlement::Nack("message handler panicked".to_string())
        );
        assert_eq!(adapter.settlements().await.len(), 1);
    }

    #[tokio::test]
    async fn test_lost_resolves_with_reason() {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.listen(Arc::new(RejectOdd)).await.unwrap();

        let waiter = {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.lost().await })
        };
        adapter.lose("connection reset").await;

        let err = waiter.await.unwrap();
        assert_eq!(err.to_string(), "consumer stopped: connection reset");
        assert!(!adapter.is_listening().await);
    }
}
