// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine facade: one broker subscription plus its dispatcher.
//!
//! The facts engine and the operations engine are the same [`Engine`] bound
//! to different [`Topology`] values. The facts engine also owns the plugin
//! processes and stops them when it shuts down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{error, info, instrument};
use trento_core::{Context, GathererRegistry, OperatorRegistry};
use trento_plugin::PluginManager;

use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::messaging::{Adapter, AmqpAdapter};

/// Routing key agents bind their queues with.
pub const AGENTS_ROUTING_KEY: &str = "agents";

/// Broker resources of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub exchange: &'static str,
    pub queue_prefix: &'static str,
    pub routing_key: &'static str,
}

impl Topology {
    /// `<prefix>.<agent_id>`
    pub fn queue(&self, agent_id: &str) -> String {
        format!("{}.{}", self.queue_prefix, agent_id)
    }
}

pub const FACTS_TOPOLOGY: Topology = Topology {
    exchange: "trento.checks",
    queue_prefix: "trento.checks.agents",
    routing_key: AGENTS_ROUTING_KEY,
};

pub const OPERATIONS_TOPOLOGY: Topology = Topology {
    exchange: "trento.operations",
    queue_prefix: "trento.operations.agents",
    routing_key: AGENTS_ROUTING_KEY,
};

pub struct Engine {
    agent_id: String,
    broker_url: String,
    topology: Topology,
    gatherers: Arc<GathererRegistry>,
    operators: Arc<OperatorRegistry>,
    adapter: Option<Arc<dyn Adapter>>,
    plugins: Mutex<Option<PluginManager>>,
    unsubscribed: AtomicBool,
}

impl Engine {
    pub fn new(
        agent_id: impl Into<String>,
        broker_url: impl Into<String>,
        topology: Topology,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            broker_url: broker_url.into(),
            topology,
            gatherers: Arc::new(GathererRegistry::new()),
            operators: Arc::new(OperatorRegistry::new()),
            adapter: None,
            plugins: Mutex::new(None),
            unsubscribed: AtomicBool::new(false),
        }
    }

    /// The facts engine answering `FactsGatheringRequested` with `gatherers`.
    pub fn facts(
        agent_id: impl Into<String>,
        broker_url: impl Into<String>,
        gatherers: Arc<GathererRegistry>,
    ) -> Self {
        Self::new(agent_id, broker_url, FACTS_TOPOLOGY).with_gatherers(gatherers)
    }

    /// The operations engine answering `OperatorExecutionRequested` with
    /// `operators`.
    pub fn operations(
        agent_id: impl Into<String>,
        broker_url: impl Into<String>,
        operators: Arc<OperatorRegistry>,
    ) -> Self {
        Self::new(agent_id, broker_url, OPERATIONS_TOPOLOGY).with_operators(operators)
    }

    pub fn with_gatherers(mut self, gatherers: Arc<GathererRegistry>) -> Self {
        self.gatherers = gatherers;
        self
    }

    pub fn with_operators(mut self, operators: Arc<OperatorRegistry>) -> Self {
        self.operators = operators;
        self
    }

    /// Plugins stopped when the engine unsubscribes.
    pub fn with_plugins(mut self, plugins: PluginManager) -> Self {
        self.plugins = Mutex::new(Some(plugins));
        self
    }

    /// Use an already subscribed adapter instead of connecting to the broker.
    pub fn with_adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Connect to the broker and declare this engine's exchange and queue.
    pub async fn subscribe(&mut self) -> Result<()> {
        let queue = self.topology.queue(&self.agent_id);
        let adapter = AmqpAdapter::subscribe(
            &self.broker_url,
            self.topology.exchange,
            &queue,
            self.topology.routing_key,
        )
        .await?;
        self.adapter = Some(Arc::new(adapter));
        Ok(())
    }

    /// Handle messages until `ctx` is done or the subscription is lost, then
    /// tear down. Teardown runs on every exit.
    #[instrument(skip_all, fields(agent_id = %self.agent_id, exchange = self.topology.exchange))]
    pub async fn listen(&self, ctx: Context) -> Result<()> {
        let served = self.serve(&ctx).await;
        let teardown = self.unsubscribe().await;
        served.and(teardown)
    }

    async fn serve(&self, ctx: &Context) -> Result<()> {
        let adapter = self.adapter.clone().ok_or(Error::NotSubscribed)?;
        let dispatcher = Dispatcher::new(
            self.agent_id.clone(),
            self.gatherers.clone(),
            self.operators.clone(),
            adapter.clone(),
            ctx.clone(),
        );
        adapter.listen(Arc::new(dispatcher)).await?;
        info!("listening for requests");

        tokio::select! {
            _ = ctx.done() => {
                info!("stopping");
                Ok(())
            }
            lost = adapter.lost() => {
                error!(error = %lost, "subscription lost");
                Err(lost.into())
            }
        }
    }

    /// Stop consuming and stop owned plugins. Only the first call acts.
    pub async fn unsubscribe(&self) -> Result<()> {
        if self.unsubscribed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = match &self.adapter {
            Some(adapter) => adapter.unsubscribe().await.map_err(Error::from),
            None => Ok(()),
        };

        if let Some(mut plugins) = self.plugins.lock().await.take() {
            plugins.cleanup().await;
        }

        result
    }
}
