// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Conversions between engine types and plugin protobuf messages.

use std::collections::BTreeMap;

use trento_core::{Fact, FactGatheringError, FactRequest, FactValue};
use trento_protocol::plugin_proto::{self as proto, fact, value::Kind};

pub fn value_to_proto(value: &FactValue) -> proto::Value {
    let kind = match value {
        FactValue::Int(i) => Kind::IntValue(*i),
        FactValue::Float(f) => Kind::FloatValue(*f),
        FactValue::Bool(b) => Kind::BoolValue(*b),
        FactValue::String(s) => Kind::StringValue(s.clone()),
        FactValue::List(items) => Kind::ListValue(proto::ListValue {
            values: items.iter().map(value_to_proto).collect(),
        }),
        FactValue::Map(map) => Kind::MapValue(proto::MapValue {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), value_to_proto(v)))
                .collect(),
        }),
    };
    proto::Value { kind: Some(kind) }
}

/// A node without a kind anywhere in the tree fails the whole value.
pub fn value_from_proto(value: proto::Value) -> Result<FactValue, FactGatheringError> {
    match value.kind {
        Some(Kind::IntValue(i)) => Ok(FactValue::Int(i)),
        Some(Kind::FloatValue(f)) => Ok(FactValue::Float(f)),
        Some(Kind::BoolValue(b)) => Ok(FactValue::Bool(b)),
        Some(Kind::StringValue(s)) => Ok(FactValue::String(s)),
        Some(Kind::ListValue(list)) => list
            .values
            .into_iter()
            .map(value_from_proto)
            .collect::<Result<Vec<_>, _>>()
            .map(FactValue::List),
        Some(Kind::MapValue(map)) => map
            .fields
            .into_iter()
            .map(|(k, v)| value_from_proto(v).map(|v| (k, v)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(FactValue::Map),
        None => Err(FactGatheringError::unknown_value_type()),
    }
}

pub fn error_to_proto(error: &FactGatheringError) -> proto::FactError {
    proto::FactError {
        kind: error.kind.clone(),
        message: error.message.clone(),
    }
}

pub fn error_from_proto(error: proto::FactError) -> FactGatheringError {
    FactGatheringError::new(error.kind, error.message)
}

pub fn request_to_proto(request: &FactRequest) -> proto::FactRequest {
    proto::FactRequest {
        name: request.name.clone(),
        check_id: request.check_id.clone(),
        gatherer: request.gatherer.clone(),
        argument: request.argument.clone(),
    }
}

pub fn request_from_proto(request: proto::FactRequest) -> FactRequest {
    FactRequest {
        name: request.name,
        check_id: request.check_id,
        gatherer: request.gatherer,
        argument: request.argument,
    }
}

pub fn fact_to_proto(fact: &Fact) -> proto::Fact {
    let result = match &fact.value {
        Ok(value) => fact::Result::Value(value_to_proto(value)),
        Err(error) => fact::Result::Error(error_to_proto(error)),
    };
    proto::Fact {
        name: fact.name.clone(),
        check_id: fact.check_id.clone(),
        result: Some(result),
    }
}

/// A fact carrying neither a value nor an error decodes as `null_value`.
pub fn fact_from_proto(fact: proto::Fact) -> Fact {
    let value = match fact.result {
        Some(fact::Result::Value(value)) => value_from_proto(value),
        Some(fact::Result::Error(error)) => Err(error_from_proto(error)),
        None => Err(FactGatheringError::null_value()),
    };
    Fact::new(fact.name, fact.check_id, value)
}
