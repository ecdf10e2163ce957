// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Trento Agent - facts gathering and operations on a cluster node
//!
//! The agent subscribes to the control plane broker with two engines:
//! - Facts engine: answers `FactsGatheringRequested` by running the
//!   requested gatherers in parallel and publishing `FactsGathered`
//! - Operations engine: answers `OperatorExecutionRequested` by running the
//!   requested operator and publishing `OperatorExecutionCompleted`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  trento.checks / agents      ┌──────────────────────────┐
//! │ control      │ ───────────────────────────▶ │ Engine (facts)           │
//! │ plane        │ ◀─────────────────────────── │  Dispatcher              │
//! │ (broker)     │        executions            │   └─ gather_facts        │
//! │              │                              │       ├─ built-ins       │
//! │              │  trento.operations / agents  │       └─ plugins         │
//! │              │ ───────────────────────────▶ │ Engine (operations)      │
//! │              │ ◀─────────────────────────── │  Dispatcher              │
//! └──────────────┘        requests              │   └─ Operator::run       │
//!                                               └──────────────────────────┘
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod gatherers;
pub mod mapper;
pub mod messaging;

pub use config::{Config, ConfigError};
pub use dispatch::{DispatchError, Dispatcher};
pub use engine::{Engine, FACTS_TOPOLOGY, OPERATIONS_TOPOLOGY, Topology};
pub use error::{Error, Result};
pub use mapper::MapperError;
pub use messaging::{Adapter, AmqpAdapter, MemoryAdapter, MessageHandler, MessagingError};
