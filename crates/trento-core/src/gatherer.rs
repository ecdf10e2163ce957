// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The gatherer contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::FactGatheringError;
use crate::fact::{Fact, FactRequest};
use crate::registry::Registry;

/// A named introspection routine answering a batch of fact requests.
///
/// Implementations are shared across concurrent gather calls and must honor
/// the context: return promptly once it is done. A returned error applies to
/// the whole batch and is expanded into one error fact per request.
#[async_trait]
pub trait Gatherer: Send + Sync {
    async fn gather(
        &self,
        ctx: &Context,
        requests: &[FactRequest],
    ) -> Result<Vec<Fact>, FactGatheringError>;
}

pub type GathererRegistry = Registry<Arc<dyn Gatherer>>;
