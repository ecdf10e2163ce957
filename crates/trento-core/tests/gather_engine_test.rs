// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end tests of the gather engine through the public API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use trento_core::{
    Context, Fact, FactGatheringError, FactRequest, FactValue, Gatherer, GathererRegistry,
    ParseOptions, gather_facts,
};

/// Echoes each request's argument, parsed with string coercion.
struct EchoGatherer;

#[async_trait]
impl Gatherer for EchoGatherer {
    async fn gather(
        &self,
        _ctx: &Context,
        requests: &[FactRequest],
    ) -> Result<Vec<Fact>, FactGatheringError> {
        Ok(requests
            .iter()
            .map(|r| Fact::with_value(r, FactValue::parse_str(&r.argument)))
            .collect())
    }
}

/// Projects a dotted path out of a fixed document, per request.
struct DocumentGatherer(FactValue);

#[async_trait]
impl Gatherer for DocumentGatherer {
    async fn gather(
        &self,
        _ctx: &Context,
        requests: &[FactRequest],
    ) -> Result<Vec<Fact>, FactGatheringError> {
        Ok(requests
            .iter()
            .map(|r| Fact::from_request(r, self.0.get(&r.argument).cloned()))
            .collect())
    }
}

/// Honors cancellation while sleeping.
struct PatientGatherer;

#[async_trait]
impl Gatherer for PatientGatherer {
    async fn gather(
        &self,
        ctx: &Context,
        requests: &[FactRequest],
    ) -> Result<Vec<Fact>, FactGatheringError> {
        tokio::select! {
            _ = ctx.done() => Err(FactGatheringError::new("patient-cancelled", "cancelled")),
            _ = tokio::time::sleep(Duration::from_secs(5)) => Ok(requests
                .iter()
                .map(|r| Fact::with_value(r, FactValue::Bool(true)))
                .collect()),
        }
    }
}

fn document() -> FactValue {
    FactValue::from_json(
        &serde_json::json!({
            "totem": {"token": "30000", "join": 60},
            "nodelist": [{"ring0_addr": "10.0.0.1"}, {"ring0_addr": "10.0.0.2"}]
        }),
        ParseOptions::coerced(),
    )
    .unwrap()
}

fn registry() -> GathererRegistry {
    let mut registry = GathererRegistry::new();
    let mut tree: HashMap<String, HashMap<String, Arc<dyn Gatherer>>> = HashMap::new();
    tree.entry("echo".to_string())
        .or_default()
        .insert("v1".to_string(), Arc::new(EchoGatherer));
    tree.entry("corosync.conf".to_string())
        .or_default()
        .insert("v1".to_string(), Arc::new(DocumentGatherer(document())));
    tree.entry("patient".to_string())
        .or_default()
        .insert("v1".to_string(), Arc::new(PatientGatherer));
    registry.add(tree);
    registry
}

#[tokio::test]
async fn test_every_request_gets_exactly_one_fact() {
    let gatherers = ["echo", "corosync.conf", "missing", "echo@v9", "bad@name@v1"];
    let requests: Vec<FactRequest> = (0..40)
        .map(|i| {
            FactRequest::new(
                format!("fact{}", i),
                format!("check{}", i),
                gatherers[i % gatherers.len()],
                if i % 2 == 0 { "totem.token" } else { "42" },
            )
        })
        .collect();

    let gathered = gather_facts(
        &Context::background(),
        "exec",
        "agent",
        "group",
        &requests,
        &registry(),
    )
    .await
    .unwrap();

    assert_eq!(gathered.facts.len(), requests.len());
    for request in &requests {
        let matching: Vec<&Fact> = gathered
            .facts
            .iter()
            .filter(|f| f.check_id == request.check_id)
            .collect();
        assert_eq!(matching.len(), 1, "check {}", request.check_id);
        assert_eq!(matching[0].name, request.name);
    }
}

#[tokio::test]
async fn test_document_projection_and_errors() {
    let requests = vec![
        FactRequest::new("token", "c1", "corosync.conf", "totem.token"),
        FactRequest::new("addr", "c2", "corosync.conf", "nodelist.1.ring0_addr"),
        FactRequest::new("nope", "c3", "corosync.conf", "nodelist.7"),
        FactRequest::new("echo", "c4", "echo@v1", "true"),
    ];

    let gathered = gather_facts(
        &Context::background(),
        "exec",
        "agent",
        "group",
        &requests,
        &registry(),
    )
    .await
    .unwrap();

    let by_check: HashMap<&str, &Fact> = gathered
        .facts
        .iter()
        .map(|f| (f.check_id.as_str(), f))
        .collect();
    assert_eq!(by_check["c1"].value, Ok(FactValue::Int(30000)));
    assert_eq!(by_check["c2"].value, Ok(FactValue::from("10.0.0.2")));
    assert_eq!(
        by_check["c3"].error().unwrap().message,
        "requested field value not found: nodelist.7"
    );
    assert_eq!(by_check["c4"].value, Ok(FactValue::Bool(true)));
}

#[tokio::test]
async fn test_cancellation_reaches_cooperative_gatherer() {
    let requests = vec![FactRequest::new("p", "c1", "patient", "")];
    let ctx = Context::background();
    let child = ctx.with_cancel();

    let handle = {
        let child = child.clone();
        let registry = registry();
        tokio::spawn(async move {
            gather_facts(&child, "exec", "agent", "group", &requests, &registry).await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    ctx.cancel();

    let result = tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("gather should stop promptly")
        .unwrap();
    assert!(result.is_err());
}
