// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Example gatherer plugin, also used by the plugin integration tests.
//!
//! Each request's argument selects the behavior:
//! - `sleep`: wait up to 30s, returning early when cancelled
//! - `batch-error`: fail the whole batch with `dummy-error`
//! - `crash`: exit immediately without answering
//! - `map`: a small nested map
//! - anything else: the argument parsed as a scalar (`42`, `true`, `text`)

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use trento_core::{Context, Fact, FactGatheringError, FactRequest, FactValue, Gatherer};

struct DummyGatherer;

#[async_trait]
impl Gatherer for DummyGatherer {
    async fn gather(
        &self,
        ctx: &Context,
        requests: &[FactRequest],
    ) -> Result<Vec<Fact>, FactGatheringError> {
        if requests.iter().any(|r| r.argument == "crash") {
            std::process::exit(3);
        }
        if requests.iter().any(|r| r.argument == "batch-error") {
            return Err(FactGatheringError::new("dummy-error", "requested failure"));
        }
        if requests.iter().any(|r| r.argument == "sleep") {
            tokio::select! {
                _ = ctx.done() => {
                    return Err(FactGatheringError::new("dummy-cancelled", "request cancelled"));
                }
                _ = tokio::time::sleep(Duration::from_secs(30)) => {}
            }
        }

        Ok(requests
            .iter()
            .map(|request| {
                let value = match request.argument.as_str() {
                    "map" => FactValue::Map(BTreeMap::from([
                        ("name".to_string(), FactValue::from("dummy")),
                        (
                            "values".to_string(),
                            FactValue::List(vec![FactValue::Int(1), FactValue::Float(2.5)]),
                        ),
                    ])),
                    other => FactValue::parse_str(other),
                };
                Fact::with_value(request, value)
            })
            .collect())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = trento_plugin::serve(DummyGatherer).await {
        eprintln!("dummy-gatherer failed: {}", e);
        std::process::exit(1);
    }
}
