// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event bodies exchanged with the control plane.
//!
//! These are plain serde types mirroring the JSON on the wire. Conversion to
//! and from the engine's domain types lives in the agent's mapper.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Checks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRequest {
    pub check_id: String,
    pub name: String,
    pub gatherer: String,
    #[serde(default)]
    pub argument: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactsGatheringRequestedTarget {
    pub agent_id: String,
    #[serde(default)]
    pub fact_requests: Vec<FactRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactsGatheringRequested {
    pub execution_id: String,
    pub group_id: String,
    #[serde(default)]
    pub targets: Vec<FactsGatheringRequestedTarget>,
}

/// `{type, message}` as carried in a fact's error slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// The value slot of a gathered fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactOutcome {
    Value(Value),
    Error(FactError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub check_id: String,
    pub name: String,
    /// `None` only when decoding a fact that carried neither slot.
    #[serde(flatten)]
    pub outcome: Option<FactOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactsGathered {
    pub agent_id: String,
    pub execution_id: String,
    pub group_id: String,
    #[serde(default)]
    pub facts_gathered: Vec<Fact>,
}

// ============================================================================
// Operations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorExecutionRequestedTarget {
    pub agent_id: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorExecutionRequested {
    pub operation_id: String,
    pub group_id: String,
    pub step_number: i32,
    pub operator: String,
    #[serde(default)]
    pub targets: Vec<OperatorExecutionRequestedTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorPhase {
    Plan,
    Commit,
    Verify,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDiff {
    pub before: Value,
    pub after: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorSuccess {
    pub diff: OperatorDiff,
    pub last_phase: OperatorPhase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorFailure {
    pub phase: OperatorPhase,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorResult {
    Success(OperatorSuccess),
    Failure(OperatorFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorExecutionCompleted {
    pub operation_id: String,
    pub group_id: String,
    pub step_number: i32,
    pub agent_id: String,
    pub operator: String,
    pub result: OperatorResult,
}
