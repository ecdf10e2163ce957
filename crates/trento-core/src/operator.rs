// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operators: multi-phase state changes on the local host.
//!
//! An [`Operator`] is built per execution from its arguments and produces an
//! [`ExecutionReport`]. Most operators are written as a [`PhasedOperator`]
//! and get the phase sequencing for free:
//!
//! ```text
//! PLAN ──already applied──▶ success(PLAN)
//!   │
//!   ▼
//! COMMIT ──error──▶ ROLLBACK ──ok──▶ failure(COMMIT)
//!   │                   └──error──▶ failure(ROLLBACK)
//!   ▼
//! VERIFY ──error──▶ ROLLBACK ──ok──▶ failure(VERIFY)
//!   │                   └──error──▶ failure(ROLLBACK)
//!   ▼
//! success(VERIFY)
//! ```
//!
//! A phase that panics fails the same way as a phase returning an error.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{info, warn};

use crate::context::Context;
use crate::registry::Registry;

/// Opaque bag of dynamically typed arguments, as decoded from the wire.
pub type Arguments = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Plan,
    Commit,
    Verify,
    Rollback,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Plan => "PLAN",
            Phase::Commit => "COMMIT",
            Phase::Verify => "VERIFY",
            Phase::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the host before and after the operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Diff {
    pub before: Value,
    pub after: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Success { diff: Diff, last_phase: Phase },
    Failure { phase: Phase, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub operation_id: String,
    pub result: ExecutionResult,
}

impl ExecutionReport {
    pub fn success(operation_id: impl Into<String>, diff: Diff, last_phase: Phase) -> Self {
        Self {
            operation_id: operation_id.into(),
            result: ExecutionResult::Success { diff, last_phase },
        }
    }

    pub fn failure(operation_id: impl Into<String>, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            result: ExecutionResult::Failure {
                phase,
                message: message.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, ExecutionResult::Success { .. })
    }
}

#[async_trait]
pub trait Operator: Send + Sync {
    async fn run(&self, ctx: &Context) -> ExecutionReport;
}

/// Builds an operator for one execution from `(operation_id, arguments)`.
pub type OperatorBuilder = Arc<dyn Fn(&str, Arguments) -> Box<dyn Operator> + Send + Sync>;

pub type OperatorRegistry = Registry<OperatorBuilder>;

/// What planning found.
pub enum Planned<S> {
    /// The desired state is already in place; nothing to commit.
    AlreadyApplied(S),
    Pending(S),
}

/// An operator expressed as its individual phases.
///
/// `State` is whatever planning captured (typically the "before" value) and
/// is handed to every later phase.
#[async_trait]
pub trait PhasedOperator: Send + Sync {
    type State: Send + Sync;

    fn operation_id(&self) -> &str;

    async fn plan(&self, ctx: &Context) -> anyhow::Result<Planned<Self::State>>;

    async fn commit(&self, ctx: &Context, state: &Self::State) -> anyhow::Result<()>;

    async fn verify(&self, ctx: &Context, state: &Self::State) -> anyhow::Result<()>;

    async fn rollback(&self, ctx: &Context, state: &Self::State) -> anyhow::Result<()>;

    fn diff(&self, state: &Self::State) -> Diff;
}

#[async_trait]
impl<T> Operator for T
where
    T: PhasedOperator,
{
    async fn run(&self, ctx: &Context) -> ExecutionReport {
        run_phases(self, ctx).await
    }
}

/// Drive a [`PhasedOperator`] through PLAN, COMMIT and VERIFY.
pub async fn run_phases<T: PhasedOperator + ?Sized>(op: &T, ctx: &Context) -> ExecutionReport {
    let operation_id = op.operation_id().to_string();

    if let Some(err) = ctx.err() {
        return ExecutionReport::failure(operation_id, Phase::Plan, err.to_string());
    }

    let state = match guarded(op.plan(ctx)).await {
        Ok(Planned::AlreadyApplied(state)) => {
            info!(operation_id = %operation_id, "operation already applied");
            return ExecutionReport::success(operation_id, op.diff(&state), Phase::Plan);
        }
        Ok(Planned::Pending(state)) => state,
        Err(e) => return ExecutionReport::failure(operation_id, Phase::Plan, format!("{:#}", e)),
    };

    if let Some(err) = ctx.err() {
        return ExecutionReport::failure(operation_id, Phase::Commit, err.to_string());
    }

    if let Err(e) = guarded(op.commit(ctx, &state)).await {
        return rollback(op, &state, operation_id, Phase::Commit, e).await;
    }

    if let Some(err) = ctx.err() {
        return rollback(op, &state, operation_id, Phase::Verify, err.into()).await;
    }

    if let Err(e) = guarded(op.verify(ctx, &state)).await {
        return rollback(op, &state, operation_id, Phase::Verify, e).await;
    }

    ExecutionReport::success(operation_id, op.diff(&state), Phase::Verify)
}

/// Run one phase, turning a panic into an error.
async fn guarded<T>(phase: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
    match AssertUnwindSafe(phase).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("operator panicked")),
    }
}

async fn rollback<T: PhasedOperator + ?Sized>(
    op: &T,
    state: &T::State,
    operation_id: String,
    phase: Phase,
    cause: anyhow::Error,
) -> ExecutionReport {
    warn!(operation_id = %operation_id, %phase, error = %format!("{:#}", cause), "rolling back");

    // Rollback runs detached from the caller's cancellation.
    match guarded(op.rollback(&Context::background(), state)).await {
        Ok(()) => ExecutionReport::failure(operation_id, phase, format!("{:#}", cause)),
        Err(e) => ExecutionReport::failure(
            operation_id,
            Phase::Rollback,
            format!("{:#} (rollback after {} failure: {:#})", e, phase, cause),
        ),
    }
}
