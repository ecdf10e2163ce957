// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Handling of incoming broker messages.
//!
//! The [`Dispatcher`] is installed as the message handler of an engine's
//! subscription. Every message is decoded, filtered to this agent and
//! answered on the engine's exchange. Nothing is published when a message
//! cannot be decoded or handling is interrupted; the error is returned so
//! the adapter rejects the message.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use trento_core::{
    Context, ExecutionReport, GatherError, GathererRegistry, OperatorRegistry, Phase,
    RegistryError, gather_facts,
};
use trento_protocol::{CONTENT_TYPE, Envelope, EventError, EventType};

use crate::mapper::{self, MapperError};
use crate::messaging::{Adapter, MessageHandler, MessagingError};

/// Routing key of `FactsGathered` results.
pub const FACTS_GATHERED_ROUTING_KEY: &str = "executions";

/// Routing key of `OperatorExecutionCompleted` results.
pub const OPERATOR_COMPLETED_ROUTING_KEY: &str = "requests";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Mapper(#[from] MapperError),

    #[error(transparent)]
    Gather(#[from] GatherError),

    #[error("operator not found: {0}")]
    OperatorNotFound(#[source] RegistryError),

    #[error("failed to publish result: {0}")]
    Publish(#[from] MessagingError),
}

pub struct Dispatcher {
    agent_id: String,
    gatherers: Arc<GathererRegistry>,
    operators: Arc<OperatorRegistry>,
    adapter: Arc<dyn Adapter>,
    ctx: Context,
}

impl Dispatcher {
    /// `ctx` bounds every handled message: cancelling it interrupts
    /// in-flight gathers and operators.
    pub fn new(
        agent_id: impl Into<String>,
        gatherers: Arc<GathererRegistry>,
        operators: Arc<OperatorRegistry>,
        adapter: Arc<dyn Adapter>,
        ctx: Context,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            gatherers,
            operators,
            adapter,
            ctx,
        }
    }

    /// Handle one raw message.
    pub async fn dispatch(&self, content_type: &str, body: &[u8]) -> Result<(), DispatchError> {
        if content_type != CONTENT_TYPE {
            debug!(content_type, "unexpected content type, decoding anyway");
        }

        let envelope = Envelope::from_slice(body)?;
        match envelope.kind()? {
            EventType::FactsGatheringRequested => self.handle_facts_gathering(&envelope).await,
            EventType::OperatorExecutionRequested => {
                self.handle_operator_execution(&envelope).await
            }
            other => Err(EventError::InvalidType(other.to_string()).into()),
        }
    }

    #[instrument(skip_all, fields(agent_id = %self.agent_id))]
    async fn handle_facts_gathering(&self, envelope: &Envelope) -> Result<(), DispatchError> {
        let request = mapper::decode_facts_gathering_requested(envelope)?;
        let Some(requests) = mapper::fact_requests_for(&request, &self.agent_id) else {
            debug!(execution_id = %request.execution_id, "agent not targeted, ignoring");
            return Ok(());
        };

        info!(
            execution_id = %request.execution_id,
            group_id = %request.group_id,
            requests = requests.len(),
            "facts gathering requested"
        );

        let gathered = gather_facts(
            &self.ctx.with_cancel(),
            &request.execution_id,
            &self.agent_id,
            &request.group_id,
            &requests,
            &self.gatherers,
        )
        .await?;

        let errors = gathered.facts.iter().filter(|f| f.is_error()).count();
        let body = mapper::encode_facts_gathered(&gathered)?;
        self.adapter
            .publish(FACTS_GATHERED_ROUTING_KEY, CONTENT_TYPE, &body)
            .await?;

        info!(
            execution_id = %gathered.execution_id,
            facts = gathered.facts.len(),
            errors,
            "facts gathered published"
        );
        Ok(())
    }

    #[instrument(skip_all, fields(agent_id = %self.agent_id))]
    async fn handle_operator_execution(&self, envelope: &Envelope) -> Result<(), DispatchError> {
        let request = mapper::decode_operator_execution_requested(envelope)?;
        let Some(arguments) = mapper::operator_arguments_for(&request, &self.agent_id) else {
            debug!(operation_id = %request.operation_id, "agent not targeted, ignoring");
            return Ok(());
        };

        let builder = self
            .operators
            .get(&request.operator)
            .map_err(DispatchError::OperatorNotFound)?;

        info!(
            operation_id = %request.operation_id,
            operator = %request.operator,
            step_number = request.step_number,
            "operator execution requested"
        );

        let ctx = self.ctx.with_cancel();
        let run = async {
            let operator = builder(&request.operation_id, arguments);
            operator.run(&ctx).await
        };
        let report = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(report) => report,
            Err(_) => {
                error!(operation_id = %request.operation_id, "operator panicked");
                ExecutionReport::failure(&request.operation_id, Phase::Plan, "operator panicked")
            }
        };

        if !report.is_success() {
            warn!(operation_id = %request.operation_id, result = ?report.result, "operator failed");
        }

        let body = mapper::encode_operator_execution_completed(&request, &self.agent_id, &report)?;
        self.adapter
            .publish(OPERATOR_COMPLETED_ROUTING_KEY, CONTENT_TYPE, &body)
            .await?;

        info!(operation_id = %request.operation_id, "operator execution completed published");
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, content_type: &str, body: &[u8]) -> anyhow::Result<()> {
        Ok(self.dispatch(content_type, body).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MemoryAdapter;
    use serde_json::json;
    use trento_core::{Arguments, ExecutionResult, Operator};

    struct PanickingOperator;

    #[async_trait]
    impl Operator for PanickingOperator {
        async fn run(&self, _ctx: &Context) -> ExecutionReport {
            panic!("operator bug");
        }
    }

    fn dispatcher(adapter: Arc<MemoryAdapter>) -> Dispatcher {
        Dispatcher::new(
            "agent-1",
            Arc::new(GathererRegistry::new()),
            Arc::new(OperatorRegistry::new()),
            adapter,
            Context::background(),
        )
    }

    fn body(event_type: EventType, data: serde_json::Value) -> Vec<u8> {
        Envelope::new(event_type, &data).unwrap().to_vec().unwrap()
    }

    #[tokio::test]
    async fn test_outbound_event_type_is_rejected() {
        let adapter = Arc::new(MemoryAdapter::new());
        let dispatcher = dispatcher(adapter.clone());

        let err = dispatcher
            .dispatch(CONTENT_TYPE, &body(EventType::FactsGathered, json!({})))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid event type: Trento.Checks.V1.FactsGathered"
        );
        assert!(adapter.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_gatherer_still_publishes() {
        let adapter = Arc::new(MemoryAdapter::new());
        let dispatcher = dispatcher(adapter.clone());

        let data = json!({
            "execution_id": "exec-1",
            "group_id": "group-1",
            "targets": [{"agent_id": "agent-1", "fact_requests": [
                {"check_id": "c1", "name": "f1", "gatherer": "nope", "argument": ""}
            ]}]
        });
        dispatcher
            .dispatch(
                CONTENT_TYPE,
                &body(EventType::FactsGatheringRequested, data),
            )
            .await
            .unwrap();

        let published = adapter.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key, FACTS_GATHERED_ROUTING_KEY);
        let gathered = mapper::decode_facts_gathered(&published[0].body).unwrap();
        assert_eq!(gathered.facts[0].error().unwrap().kind, "gatherer-not-found");
    }

    #[tokio::test]
    async fn test_unknown_operator_is_an_error() {
        let adapter = Arc::new(MemoryAdapter::new());
        let dispatcher = dispatcher(adapter.clone());

        let data = json!({
            "operation_id": "op-1",
            "group_id": "group-1",
            "step_number": 1,
            "operator": "missing@v1",
            "targets": [{"agent_id": "agent-1", "arguments": {}}]
        });
        let err = dispatcher
            .dispatch(
                CONTENT_TYPE,
                &body(EventType::OperatorExecutionRequested, data),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::OperatorNotFound(_)));
        assert!(adapter.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_operator_is_reported_as_failure() {
        let adapter = Arc::new(MemoryAdapter::new());
        let operators = OperatorRegistry::new().with(
            "broken",
            "v1",
            Arc::new(|_: &str, _: Arguments| -> Box<dyn Operator> { Box::new(PanickingOperator) }),
        );
        let dispatcher = Dispatcher::new(
            "agent-1",
            Arc::new(GathererRegistry::new()),
            Arc::new(operators),
            adapter.clone(),
            Context::background(),
        );

        let data = json!({
            "operation_id": "op-1",
            "group_id": "group-1",
            "step_number": 0,
            "operator": "broken@v1",
            "targets": [{"agent_id": "agent-1", "arguments": {}}]
        });
        dispatcher
            .dispatch(
                CONTENT_TYPE,
                &body(EventType::OperatorExecutionRequested, data),
            )
            .await
            .unwrap();

        let published = adapter.published().await;
        assert_eq!(published.len(), 1);
        let completed = mapper::decode_operator_execution_completed(&published[0].body).unwrap();
        let report = mapper::report_from_contract(&completed.operation_id, completed.result);
        assert_eq!(
            report.result,
            ExecutionResult::Failure {
                phase: Phase::Plan,
                message: "operator panicked".to_string(),
            }
        );
    }
}
