// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! A remote plugin seen as a local [`Gatherer`].

use std::sync::Arc;

use async_trait::async_trait;
use trento_core::{Context, Fact, FactGatheringError, FactRequest, Gatherer};

use crate::client::PluginClient;

pub struct PluginGatherer {
    client: Arc<PluginClient>,
}

impl PluginGatherer {
    pub fn new(client: Arc<PluginClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Gatherer for PluginGatherer {
    /// Transport failures surface as `plugin-rpc-error`; errors raised by the
    /// remote gatherer come back unchanged.
    async fn gather(
        &self,
        ctx: &Context,
        requests: &[FactRequest],
    ) -> Result<Vec<Fact>, FactGatheringError> {
        self.client
            .gather(ctx, requests)
            .await
            .map_err(FactGatheringError::from)
    }
}
