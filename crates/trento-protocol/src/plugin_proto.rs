// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Protobuf messages exchanged between the agent and gatherer plugins.
//!
//! The messages are declared with `prost` derives directly so no protoc
//! toolchain is needed at build time. Tags are part of the plugin ABI and
//! must never be renumbered.

use std::collections::HashMap;

/// Protocol version spoken by this build of the agent.
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the magic cookie.
pub const MAGIC_COOKIE_KEY: &str = "TRENTO_PLUGIN";

/// Expected value of the magic cookie.
pub const MAGIC_COOKIE_VALUE: &str = "gatherer";

/// The single capability a gatherer plugin exposes.
pub const GATHERER_CAPABILITY: &str = "gatherer";

/// First message sent by the agent after spawning a plugin.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Handshake {
    #[prost(uint32, tag = "1")]
    pub protocol_version: u32,
    #[prost(string, tag = "2")]
    pub magic_cookie_key: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub magic_cookie_value: ::prost::alloc::string::String,
}

/// Plugin answer to a [`Handshake`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HandshakeAck {
    #[prost(uint32, tag = "1")]
    pub protocol_version: u32,
    #[prost(string, repeated, tag = "2")]
    pub capabilities: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FactRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub check_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub gatherer: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub argument: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FactError {
    #[prost(string, tag = "1")]
    pub kind: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

/// A fact value tree node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Value {
    #[prost(oneof = "value::Kind", tags = "1, 2, 3, 4, 5, 6")]
    pub kind: ::core::option::Option<value::Kind>,
}

pub mod value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(int64, tag = "1")]
        IntValue(i64),
        #[prost(double, tag = "2")]
        FloatValue(f64),
        #[prost(bool, tag = "3")]
        BoolValue(bool),
        #[prost(string, tag = "4")]
        StringValue(::prost::alloc::string::String),
        #[prost(message, tag = "5")]
        ListValue(super::ListValue),
        #[prost(message, tag = "6")]
        MapValue(super::MapValue),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListValue {
    #[prost(message, repeated, tag = "1")]
    pub values: ::prost::alloc::vec::Vec<Value>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MapValue {
    #[prost(map = "string, message", tag = "1")]
    pub fields: HashMap<::prost::alloc::string::String, Value>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Fact {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub check_id: ::prost::alloc::string::String,
    #[prost(oneof = "fact::Result", tags = "3, 4")]
    pub result: ::core::option::Option<fact::Result>,
}

pub mod fact {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "3")]
        Value(super::Value),
        #[prost(message, tag = "4")]
        Error(super::FactError),
    }
}

/// A `Gather` call. `id` correlates the response on a multiplexed pipe.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GatherRequest {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, tag = "2")]
    pub capability: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "3")]
    pub requests: ::prost::alloc::vec::Vec<FactRequest>,
}

/// Result of a `Gather` call: either facts or a whole-batch error.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GatherResponse {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(message, repeated, tag = "2")]
    pub facts: ::prost::alloc::vec::Vec<Fact>,
    #[prost(message, optional, tag = "3")]
    pub error: ::core::option::Option<FactError>,
}

/// Abort an in-flight `Gather` call.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CancelRequest {
    #[prost(uint64, tag = "1")]
    pub id: u64,
}

/// Ask the plugin to exit.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Shutdown {}
