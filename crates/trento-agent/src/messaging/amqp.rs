// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AMQP 0-9-1 adapter over `lapin`.
//!
//! One connection carries two channels: the consumer channel owns the
//! queue subscription, the publisher channel sends results. Deliveries are
//! handled one at a time in arrival order.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{Adapter, MessageHandler, MessagingError, handle_delivery};

/// AMQP delivery mode of persistent messages.
const PERSISTENT: u8 = 2;

const REPLY_SUCCESS: u16 = 200;

#[derive(Default)]
struct ListenerState {
    listener: Option<JoinHandle<()>>,
    closed: bool,
}

pub struct AmqpAdapter {
    connection: Connection,
    consumer_channel: Channel,
    publisher_channel: Channel,
    exchange: String,
    queue: String,
    consumer_tag: String,
    state: Mutex<ListenerState>,
    /// Set by the consumer task when the delivery stream fails.
    lost: Arc<watch::Sender<Option<String>>>,
}

impl AmqpAdapter {
    /// Connect, declare the durable topic `exchange` and durable `queue`,
    /// and bind them with `routing_key`.
    pub async fn subscribe(
        url: &str,
        exchange: &str,
        queue: &str,
        routing_key: &str,
    ) -> Result<Self, MessagingError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;

        let consumer_channel = connection.create_channel().await?;
        consumer_channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        consumer_channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        consumer_channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let publisher_channel = connection.create_channel().await?;

        info!(exchange, queue, routing_key, "subscribed to broker");

        Ok(Self {
            connection,
            consumer_channel,
            publisher_channel,
            exchange: exchange.to_string(),
            queue: queue.to_string(),
            consumer_tag: format!("trento-agent-{}", Uuid::new_v4()),
            state: Mutex::new(ListenerState::default()),
            lost: Arc::new(watch::channel(None).0),
        })
    }
}

#[async_trait]
impl Adapter for AmqpAdapter {
    async fn listen(&self, handler: Arc<dyn MessageHandler>) -> Result<(), MessagingError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(MessagingError::Closed);
        }
        if state.listener.is_some() {
            return Err(MessagingError::AlreadyListening);
        }

        let consumer = self
            .consumer_channel
            .basic_consume(
                &self.queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        state.listener = Some(tokio::spawn(consume(
            self.queue.clone(),
            consumer,
            handler,
            self.lost.clone(),
        )));
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
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(content_type))
            .with_delivery_mode(PERSISTENT);

        self.publisher_channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                body,
                properties,
            )
            .await?
            .await?;

        debug!(exchange = %self.exchange, routing_key, bytes = body.len(), "message published");
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), MessagingError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        if let Some(listener) = state.listener.take() {
            self.consumer_channel
                .basic_cancel(&self.consumer_tag, BasicCancelOptions::default())
                .await?;
            // The consumer stream ends once the cancel is confirmed
            if let Err(e) = listener.await {
                warn!(error = %e, "consumer task ended abnormally");
            }
        }

        self.publisher_channel.close(REPLY_SUCCESS, "OK").await?;
        self.consumer_channel.close(REPLY_SUCCESS, "OK").await?;
        self.connection.close(REPLY_SUCCESS, "OK").await?;

        info!(queue = %self.queue, "unsubscribed from broker");
        Ok(())
    }
}

async fn consume(
    queue: String,
    mut consumer: Consumer,
    handler: Arc<dyn MessageHandler>,
    lost: Arc<watch::Sender<Option<String>>>,
) {
    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(queue = %queue, error = %e, "consumer failed");
                lost.send_replace(Some(e.to_string()));
                break;
            }
        };

        let content_type = delivery
            .properties
            .content_type()
            .as_ref()
            .map(|ct| ct.as_str())
            .unwrap_or_default();

        match handle_delivery(handler.as_ref(), content_type, &delivery.data).await {
            Ok(()) => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    warn!(queue = %queue, error = %e, "failed to ack message");
                }
            }
            Err(e) => {
                warn!(queue = %queue, error = %format!("{:#}", e), "discarding message");
                let options = BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                };
                if let Err(e) = delivery.nack(options).await {
                    warn!(queue = %queue, error = %e, "failed to nack message");
                }
            }
        }
    }
    debug!(queue = %queue, "consumer stopped");
}
