// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Trento Protocol - wire formats spoken by the agent
//!
//! This crate provides the two wire protocols of the agent:
//! - The broker protocol: CloudEvents JSON envelopes carrying check and
//!   operation contracts between the control plane and the agents
//! - The plugin protocol: length-prefixed protobuf frames over the stdio
//!   pipes of gatherer plugin processes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    trento-protocol                          │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  Broker: contracts (serde)   │  Plugins: plugin_proto       │
//! │  Envelope: CloudEvents JSON  │  Framing: len + type + body  │
//! │  Transport: AMQP (agent)     │  Transport: child stdio      │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trento_protocol::{Envelope, EventType, contracts};
//!
//! let envelope = Envelope::from_slice(&body)?;
//! if envelope.kind()? == EventType::FactsGatheringRequested {
//!     let request: contracts::FactsGatheringRequested = envelope.decode_data()?;
//! }
//! ```

pub mod contracts;
pub mod events;
pub mod frame;
pub mod plugin_proto;

pub use events::{CONTENT_TYPE, Envelope, EventError, EventType};
pub use frame::{Frame, FrameError, MessageType, read_frame, write_frame};
