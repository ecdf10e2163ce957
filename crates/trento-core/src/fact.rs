// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fact requests and gathered facts.

use crate::error::FactGatheringError;
use crate::value::FactValue;

/// One fact a check wants gathered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FactRequest {
    /// Caller's label, echoed back in the fact.
    pub name: String,
    /// Correlation token, echoed back in the fact.
    pub check_id: String,
    /// Gatherer name, optionally pinned with `@<version>`.
    pub gatherer: String,
    /// Free-form argument handed to the gatherer.
    pub argument: String,
}

impl FactRequest {
    pub fn new(
        name: impl Into<String>,
        check_id: impl Into<String>,
        gatherer: impl Into<String>,
        argument: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            check_id: check_id.into(),
            gatherer: gatherer.into(),
            argument: argument.into(),
        }
    }
}

/// The answer to one [`FactRequest`]: a value or a structured error.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub name: String,
    pub check_id: String,
    pub value: Result<FactValue, FactGatheringError>,
}

impl Fact {
    pub fn new(
        name: impl Into<String>,
        check_id: impl Into<String>,
        value: Result<FactValue, FactGatheringError>,
    ) -> Self {
        Self {
            name: name.into(),
            check_id: check_id.into(),
            value,
        }
    }

    pub fn from_request(
        request: &FactRequest,
        value: Result<FactValue, FactGatheringError>,
    ) -> Self {
        Self::new(request.name.clone(), request.check_id.clone(), value)
    }

    pub fn with_value(request: &FactRequest, value: FactValue) -> Self {
        Self::from_request(request, Ok(value))
    }

    pub fn with_error(request: &FactRequest, error: FactGatheringError) -> Self {
        Self::from_request(request, Err(error))
    }

    pub fn is_error(&self) -> bool {
        self.value.is_err()
    }

    pub fn error(&self) -> Option<&FactGatheringError> {
        self.value.as_ref().err()
    }

    /// `name: <pretty value>` or `name: <error>`, as shown by the CLI.
    pub fn pretty(&self) -> String {
        match &self.value {
            Ok(value) => format!("{}: {}", self.name, value.pretty()),
            Err(e) => format!("{}: {}", self.name, e),
        }
    }
}

/// One error fact per request, all carrying the same error.
pub fn facts_with_error(requests: &[FactRequest], error: &FactGatheringError) -> Vec<Fact> {
    requests
        .iter()
        .map(|request| Fact::with_error(request, error.clone()))
        .collect()
}

/// The result of one gather call for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct FactsGathered {
    pub agent_id: String,
    pub execution_id: String,
    pub group_id: String,
    pub facts: Vec<Fact>,
}
