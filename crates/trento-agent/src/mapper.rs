// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Translation between broker events and engine types.
//!
//! Inbound events are decoded into their contract bodies and then narrowed
//! to the part addressed to this agent. Outbound results are built from the
//! engine types and wrapped in a fresh agent envelope.

use thiserror::Error;
use trento_core::{
    Arguments, Diff, ExecutionReport, ExecutionResult, Fact, FactGatheringError, FactRequest,
    FactValue, FactsGathered, ParseOptions, Phase,
};
use trento_protocol::contracts::{self, FactOutcome, OperatorPhase, OperatorResult};
use trento_protocol::{Envelope, EventError, EventType};

#[derive(Debug, Error)]
pub enum MapperError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error("expected {expected} event, got {actual}")]
    UnexpectedType {
        expected: EventType,
        actual: EventType,
    },
}

fn decode<T: serde::de::DeserializeOwned>(
    envelope: &Envelope,
    expected: EventType,
) -> Result<T, MapperError> {
    let actual = envelope.kind()?;
    if actual != expected {
        return Err(MapperError::UnexpectedType { expected, actual });
    }
    Ok(envelope.decode_data()?)
}

fn encode<T: serde::Serialize>(event_type: EventType, body: &T) -> Result<Vec<u8>, MapperError> {
    Ok(Envelope::new(event_type, body)?.to_vec()?)
}

// ============================================================================
// Facts
// ============================================================================

pub fn decode_facts_gathering_requested(
    envelope: &Envelope,
) -> Result<contracts::FactsGatheringRequested, MapperError> {
    decode(envelope, EventType::FactsGatheringRequested)
}

/// The fact requests addressed to `agent_id`, or `None` when the agent is
/// not a target of the execution.
pub fn fact_requests_for(
    request: &contracts::FactsGatheringRequested,
    agent_id: &str,
) -> Option<Vec<FactRequest>> {
    request
        .targets
        .iter()
        .find(|target| target.agent_id == agent_id)
        .map(|target| {
            target
                .fact_requests
                .iter()
                .map(|r| FactRequest::new(&r.name, &r.check_id, &r.gatherer, &r.argument))
                .collect()
        })
}

fn error_outcome(e: &FactGatheringError) -> FactOutcome {
    FactOutcome::Error(contracts::FactError {
        kind: e.kind.clone(),
        message: e.message.clone(),
    })
}

/// A value with no JSON form (a non-finite float) is sent as a `null_value`
/// error, never as `null`.
pub fn fact_to_contract(fact: &Fact) -> contracts::Fact {
    let outcome = match &fact.value {
        Ok(value) => match value.as_json() {
            serde_json::Value::Null => error_outcome(&FactGatheringError::null_value()),
            json => FactOutcome::Value(json),
        },
        Err(e) => error_outcome(e),
    };
    contracts::Fact {
        check_id: fact.check_id.clone(),
        name: fact.name.clone(),
        outcome: Some(outcome),
    }
}

/// A fact with neither slot, or with a `null` value, becomes a `null_value`
/// error fact.
pub fn fact_from_contract(fact: contracts::Fact) -> Fact {
    let value = match fact.outcome {
        Some(FactOutcome::Value(value)) => FactValue::from_json(&value, ParseOptions::default())
            .map_err(|e| FactGatheringError::null_value().wrap(e)),
        Some(FactOutcome::Error(e)) => Err(FactGatheringError::new(e.kind, e.message)),
        None => Err(FactGatheringError::null_value()),
    };
    Fact::new(fact.name, fact.check_id, value)
}

pub fn facts_gathered_to_contract(gathered: &FactsGathered) -> contracts::FactsGathered {
    contracts::FactsGathered {
        agent_id: gathered.agent_id.clone(),
        execution_id: gathered.execution_id.clone(),
        group_id: gathered.group_id.clone(),
        facts_gathered: gathered.facts.iter().map(fact_to_contract).collect(),
    }
}

/// Envelope bytes of a `FactsGathered` event.
pub fn encode_facts_gathered(gathered: &FactsGathered) -> Result<Vec<u8>, MapperError> {
    encode(
        EventType::FactsGathered,
        &facts_gathered_to_contract(gathered),
    )
}

pub fn decode_facts_gathered(body: &[u8]) -> Result<FactsGathered, MapperError> {
    let envelope = Envelope::from_slice(body)?;
    let gathered: contracts::FactsGathered = decode(&envelope, EventType::FactsGathered)?;
    Ok(FactsGathered {
        agent_id: gathered.agent_id,
        execution_id: gathered.execution_id,
        group_id: gathered.group_id,
        facts: gathered
            .facts_gathered
            .into_iter()
            .map(fact_from_contract)
            .collect(),
    })
}

// ============================================================================
// Operations
// ============================================================================

pub fn decode_operator_execution_requested(
    envelope: &Envelope,
) -> Result<contracts::OperatorExecutionRequested, MapperError> {
    decode(envelope, EventType::OperatorExecutionRequested)
}

/// The operator arguments addressed to `agent_id`, or `None` when the agent
/// is not a target of the step.
pub fn operator_arguments_for(
    request: &contracts::OperatorExecutionRequested,
    agent_id: &str,
) -> Option<Arguments> {
    request
        .targets
        .iter()
        .find(|target| target.agent_id == agent_id)
        .map(|target| target.arguments.clone())
}

fn phase_to_contract(phase: Phase) -> OperatorPhase {
    match phase {
        Phase::Plan => OperatorPhase::Plan,
        Phase::Commit => OperatorPhase::Commit,
        Phase::Verify => OperatorPhase::Verify,
        Phase::Rollback => OperatorPhase::Rollback,
    }
}

fn phase_from_contract(phase: OperatorPhase) -> Phase {
    match phase {
        OperatorPhase::Plan => Phase::Plan,
        OperatorPhase::Commit => Phase::Commit,
        OperatorPhase::Verify => Phase::Verify,
        OperatorPhase::Rollback => Phase::Rollback,
    }
}

pub fn report_to_contract(report: &ExecutionReport) -> OperatorResult {
    match &report.result {
        ExecutionResult::Success { diff, last_phase } => {
            OperatorResult::Success(contracts::OperatorSuccess {
                diff: contracts::OperatorDiff {
                    before: diff.before.clone(),
                    after: diff.after.clone(),
                },
                last_phase: phase_to_contract(*last_phase),
            })
        }
        ExecutionResult::Failure { phase, message } => {
            OperatorResult::Failure(contracts::OperatorFailure {
                phase: phase_to_contract(*phase),
                message: message.clone(),
            })
        }
    }
}

pub fn report_from_contract(operation_id: &str, result: OperatorResult) -> ExecutionReport {
    match result {
        OperatorResult::Success(success) => ExecutionReport::success(
            operation_id,
            Diff {
                before: success.diff.before,
                after: success.diff.after,
            },
            phase_from_contract(success.last_phase),
        ),
        OperatorResult::Failure(failure) => ExecutionReport::failure(
            operation_id,
            phase_from_contract(failure.phase),
            failure.message,
        ),
    }
}

/// Envelope bytes of the `OperatorExecutionCompleted` event answering
/// `request` for `agent_id`.
pub fn encode_operator_execution_completed(
    request: &contracts::OperatorExecutionRequested,
    agent_id: &str,
    report: &ExecutionReport,
) -> Result<Vec<u8>, MapperError> {
    let completed = contracts::OperatorExecutionCompleted {
        operation_id: report.operation_id.clone(),
        group_id: request.group_id.clone(),
        step_number: request.step_number,
        agent_id: agent_id.to_string(),
        operator: request.operator.clone(),
        result: report_to_contract(report),
    };
    encode(EventType::OperatorExecutionCompleted, &completed)
}

pub fn decode_operator_execution_completed(
    body: &[u8],
) -> Result<contracts::OperatorExecutionCompleted, MapperError> {
    let envelope = Envelope::from_slice(body)?;
    decode(&envelope, EventType::OperatorExecutionCompleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use trento_protocol::events::AGENT_SOURCE;

    fn envelope(event_type: EventType, data: serde_json::Value) -> Envelope {
        Envelope::new(event_type, &data).unwrap()
    }

    fn gathering_request() -> Envelope {
        envelope(
            EventType::FactsGatheringRequested,
            json!({
                "execution_id": "exec-1",
                "group_id": "group-1",
                "targets": [
                    {"agent_id": "other", "fact_requests": []},
                    {"agent_id": "agent-1", "fact_requests": [
                        {"check_id": "c1", "name": "f1", "gatherer": "sysctl", "argument": "vm.swappiness"},
                        {"check_id": "c2", "name": "f2", "gatherer": "hosts@v1"}
                    ]}
                ]
            }),
        )
    }

    #[test]
    fn test_fact_requests_for_target() {
        let request = decode_facts_gathering_requested(&gathering_request()).unwrap();

        let requests = fact_requests_for(&request, "agent-1").unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0],
            FactRequest::new("f1", "c1", "sysctl", "vm.swappiness")
        );
        assert_eq!(requests[1].gatherer, "hosts@v1");
        assert_eq!(requests[1].argument, "");

        assert!(fact_requests_for(&request, "stranger").is_none());
    }

    #[test]
    fn test_decode_rejects_wrong_type() {
        let env = envelope(EventType::FactsGathered, json!({}));
        let err = decode_facts_gathering_requested(&env).unwrap_err();
        assert!(matches!(err, MapperError::UnexpectedType { .. }));
    }

    #[test]
    fn test_expired_request_fails() {
        let env = gathering_request()
            .with_expiration(chrono::Utc::now() - chrono::Duration::minutes(1));
        let err = decode_facts_gathering_requested(&env).unwrap_err();
        assert!(matches!(err, MapperError::Event(EventError::Expired(_))));
    }

    #[test]
    fn test_facts_gathered_wire_round_trip() {
        let map = FactValue::Map(BTreeMap::from([
            ("a".to_string(), FactValue::Int(1)),
            (
                "b".to_string(),
                FactValue::List(vec![FactValue::Bool(false), FactValue::from("x")]),
            ),
        ]));
        let gathered = FactsGathered {
            agent_id: "agent-1".into(),
            execution_id: "exec-1".into(),
            group_id: "group-1".into(),
            facts: vec![
                Fact::new("int", "c1", Ok(FactValue::Int(10))),
                Fact::new("float", "c2", Ok(FactValue::Float(2.0))),
                Fact::new("bool", "c3", Ok(FactValue::Bool(true))),
                Fact::new("string", "c4", Ok(FactValue::from("hello"))),
                Fact::new("map", "c5", Ok(map)),
                Fact::new(
                    "err",
                    "c6",
                    Err(FactGatheringError::new("sysctl-value-not-found", "missing")),
                ),
            ],
        };

        let body = encode_facts_gathered(&gathered).unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(raw["type"], "Trento.Checks.V1.FactsGathered");
        assert_eq!(raw["source"], AGENT_SOURCE);
        assert_eq!(raw["data"]["facts_gathered"][1]["value"], json!(2.0));
        assert_eq!(
            raw["data"]["facts_gathered"][5]["error"],
            json!({"type": "sysctl-value-not-found", "message": "missing"})
        );

        let decoded = decode_facts_gathered(&body).unwrap();
        assert_eq!(decoded, gathered);
    }

    #[test]
    fn test_non_finite_floats_are_sent_as_null_value_errors() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let contract = fact_to_contract(&Fact::new("f", "c", Ok(FactValue::Float(value))));
            let raw = serde_json::to_value(&contract).unwrap();
            assert_eq!(
                raw,
                json!({
                    "check_id": "c",
                    "name": "f",
                    "error": {"type": "null_value", "message": "fact value is null"}
                })
            );
        }
    }

    #[test]
    fn test_null_and_empty_slots_become_null_value_errors() {
        let null = fact_from_contract(
            serde_json::from_value(json!({"check_id": "c", "name": "n", "value": null})).unwrap(),
        );
        assert_eq!(null.error().unwrap().kind, "null_value");

        let empty = fact_from_contract(
            serde_json::from_value(json!({"check_id": "c", "name": "n"})).unwrap(),
        );
        assert_eq!(empty.error().unwrap().kind, "null_value");
    }

    #[test]
    fn test_envelope_ids_are_fresh() {
        let gathered = FactsGathered {
            agent_id: "a".into(),
            execution_id: "e".into(),
            group_id: "g".into(),
            facts: vec![],
        };
        let first: serde_json::Value =
            serde_json::from_slice(&encode_facts_gathered(&gathered).unwrap()).unwrap();
        let second: serde_json::Value =
            serde_json::from_slice(&encode_facts_gathered(&gathered).unwrap()).unwrap();
        assert_ne!(first["id"], second["id"]);
    }

    #[test]
    fn test_operator_completed_encoding() {
        let env = envelope(
            EventType::OperatorExecutionRequested,
            json!({
                "operation_id": "op-1",
                "group_id": "group-1",
                "step_number": 2,
                "operator": "saptuneapplysolution@v1",
                "targets": [{"agent_id": "agent-1", "arguments": {"solution": "HANA"}}]
            }),
        );
        let request = decode_operator_execution_requested(&env).unwrap();
        let arguments = operator_arguments_for(&request, "agent-1").unwrap();
        assert_eq!(arguments["solution"], "HANA");
        assert!(operator_arguments_for(&request, "agent-2").is_none());

        let report = ExecutionReport::failure("op-1", Phase::Verify, "not applied");
        let body = encode_operator_execution_completed(&request, "agent-1", &report).unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            raw["data"]["result"],
            json!({"failure": {"phase": "VERIFY", "message": "not applied"}})
        );

        let completed = decode_operator_execution_completed(&body).unwrap();
        assert_eq!(completed.step_number, 2);
        assert_eq!(completed.agent_id, "agent-1");
        assert_eq!(
            report_from_contract(&completed.operation_id, completed.result),
            report
        );
    }
}
