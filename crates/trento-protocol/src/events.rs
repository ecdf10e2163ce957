// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! CloudEvents envelope used on the broker.
//!
//! Every message is a structured-mode CloudEvent serialized as JSON. The
//! envelope is validated before its `data` is looked at, so an unknown type
//! or an expired event never reaches a handler.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// AMQP content type of every envelope.
pub const CONTENT_TYPE: &str = "application/cloudevents+json";

/// Content type of the `data` field.
pub const DATA_CONTENT_TYPE: &str = "application/json";

/// CloudEvents spec version produced and accepted.
pub const SPEC_VERSION: &str = "1.0";

/// Source URI stamped on every event the agent emits.
pub const AGENT_SOURCE: &str = "https://github.com/trento-project/agent";

/// Known event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    FactsGatheringRequested,
    FactsGathered,
    OperatorExecutionRequested,
    OperatorExecutionCompleted,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::FactsGatheringRequested,
        EventType::FactsGathered,
        EventType::OperatorExecutionRequested,
        EventType::OperatorExecutionCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::FactsGatheringRequested => "Trento.Checks.V1.FactsGatheringRequested",
            EventType::FactsGathered => "Trento.Checks.V1.FactsGathered",
            EventType::OperatorExecutionRequested => {
                "Trento.Operations.V1.OperatorExecutionRequested"
            }
            EventType::OperatorExecutionCompleted => {
                "Trento.Operations.V1.OperatorExecutionCompleted"
            }
        }
    }

    pub fn parse(value: &str) -> Result<Self, EventError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == value)
            .ok_or_else(|| EventError::InvalidType(value.to_string()))
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while building or reading an envelope.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid event type: {0}")]
    InvalidType(String),

    #[error("unsupported specversion: {0}")]
    UnsupportedSpecVersion(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(&'static str),

    #[error("event expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("event carries no data")]
    MissingData,

    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A structured-mode CloudEvent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub specversion: String,
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacontenttype: Option<String>,
    /// Extension attribute: the event must not be acted on after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    /// Wrap a body into a fresh agent envelope.
    pub fn new<T: Serialize>(event_type: EventType, body: &T) -> Result<Self, EventError> {
        Ok(Self {
            specversion: SPEC_VERSION.to_string(),
            id: Uuid::new_v4().to_string(),
            source: AGENT_SOURCE.to_string(),
            event_type: event_type.as_str().to_string(),
            time: Some(Utc::now()),
            datacontenttype: Some(DATA_CONTENT_TYPE.to_string()),
            expiration: None,
            data: Some(serde_json::to_value(body)?),
        })
    }

    /// Set the expiration extension.
    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Parse and validate an envelope from raw bytes.
    pub fn from_slice(body: &[u8]) -> Result<Self, EventError> {
        let envelope: Envelope = serde_json::from_slice(body)?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Serialize to JSON bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, EventError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn validate(&self) -> Result<(), EventError> {
        if self.specversion != SPEC_VERSION {
            return Err(EventError::UnsupportedSpecVersion(self.specversion.clone()));
        }
        if self.id.is_empty() {
            return Err(EventError::MissingAttribute("id"));
        }
        if self.source.is_empty() {
            return Err(EventError::MissingAttribute("source"));
        }
        EventType::parse(&self.event_type)?;
        Ok(())
    }

    /// The validated event type.
    pub fn kind(&self) -> Result<EventType, EventError> {
        EventType::parse(&self.event_type)
    }

    /// Fail if the expiration extension lies in the past relative to `now`.
    pub fn check_expiration(&self, now: DateTime<Utc>) -> Result<(), EventError> {
        match self.expiration {
            Some(expiration) if expiration < now => Err(EventError::Expired(expiration)),
            _ => Ok(()),
        }
    }

    /// Decode the body, checking the expiration marker first.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, EventError> {
        self.check_expiration(Utc::now())?;
        let data = self.data.clone().ok_or(EventError::MissingData)?;
        Ok(serde_json::from_value(data)?)
    }
}
