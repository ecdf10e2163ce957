// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Parallel fan-out of one fact request batch over the registered gatherers.
//!
//! Requests are grouped by gatherer name and every group runs as its own
//! task on a derived context. Each group contributes exactly one batch of
//! facts to a channel sized to the number of groups:
//! - the gatherer's own facts on success
//! - one error fact per request on a gatherer error, a registry miss, or a
//!   panic
//!
//! Failures of one gatherer never cancel its siblings. Only cancellation (or
//! deadline expiry) of the caller's context aborts the call, in which case
//! partial results are discarded.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::cache::FactsCache;
use crate::context::{Context, ContextError};
use crate::error::FactGatheringError;
use crate::fact::{Fact, FactRequest, FactsGathered, facts_with_error};
use crate::gatherer::GathererRegistry;

/// Tag of the facts of a group interrupted by cancellation. These never
/// reach the control plane since the whole call fails instead.
const GATHERING_CANCELLED: &str = "gathering-cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GatherError {
    #[error("facts gathering interrupted: {0}")]
    Context(#[from] ContextError),
}

/// Group requests by gatherer name, preserving request order per group.
pub fn group_by_gatherer(requests: &[FactRequest]) -> BTreeMap<String, Vec<FactRequest>> {
    let mut groups: BTreeMap<String, Vec<FactRequest>> = BTreeMap::new();
    for request in requests {
        groups
            .entry(request.gatherer.clone())
            .or_default()
            .push(request.clone());
    }
    groups
}

/// Gather every requested fact, returning exactly one fact per request.
#[instrument(skip_all, fields(execution_id = %execution_id, agent_id = %agent_id, requests = requests.len()))]
pub async fn gather_facts(
    ctx: &Context,
    execution_id: &str,
    agent_id: &str,
    group_id: &str,
    requests: &[FactRequest],
    registry: &GathererRegistry,
) -> Result<FactsGathered, GatherError> {
    let groups = group_by_gatherer(requests);
    let derived = ctx.with_cancel().with_cache(Arc::new(FactsCache::new()));
    let (tx, mut rx) = mpsc::channel::<Vec<Fact>>(groups.len().max(1));
    let mut tasks = JoinSet::new();

    for (name, group) in groups {
        let gatherer = match registry.get(&name) {
            Ok(gatherer) => gatherer,
            Err(e) => {
                warn!(gatherer = %name, error = %e, "gatherer not found");
                let err = FactGatheringError::from(e);
                let _ = tx.send(facts_with_error(&group, &err)).await;
                continue;
            }
        };

        let tx = tx.clone();
        let parent = ctx.clone();
        let ctx = derived.clone();
        tasks.spawn(async move {
            debug!(gatherer = %name, requests = group.len(), "starting gatherer");

            let outcome = tokio::select! {
                biased;
                _ = ctx.done() => None,
                result = AssertUnwindSafe(gatherer.gather(&ctx, &group)).catch_unwind() => Some(result),
            };

            let batch = match outcome {
                Some(Ok(Ok(facts))) => {
                    debug!(gatherer = %name, facts = facts.len(), "gatherer finished");
                    facts
                }
                Some(Ok(Err(e))) => {
                    warn!(gatherer = %name, error = %e, "gatherer failed");
                    facts_with_error(&group, &e)
                }
                Some(Err(_)) => {
                    warn!(gatherer = %name, "gatherer panicked");
                    facts_with_error(&group, &FactGatheringError::gatherer_panic().wrap(&name))
                }
                None => {
                    let reason = ctx.err().unwrap_or(ContextError::Cancelled);
                    let err = FactGatheringError::new(GATHERING_CANCELLED, reason.to_string());
                    facts_with_error(&group, &err)
                }
            };
            let _ = tx.send(batch).await;

            match parent.err() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        });
    }
    drop(tx);

    loop {
        tokio::select! {
            biased;
            _ = ctx.done() => {
                tasks.abort_all();
                let err = ctx.err().unwrap_or(ContextError::Cancelled);
                warn!(error = %err, "facts gathering interrupted");
                return Err(err.into());
            }
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => return Err(e.into()),
                Some(Err(e)) => warn!(error = %e, "gatherer task did not complete"),
            },
        }
    }

    let mut facts = Vec::with_capacity(requests.len());
    while let Some(batch) = rx.recv().await {
        facts.extend(batch);
    }

    info!(facts = facts.len(), "facts gathered");

    Ok(FactsGathered {
        agent_id: agent_id.to_string(),
        execution_id: execution_id.to_string(),
        group_id: group_id.to_string(),
        facts,
    })
}
