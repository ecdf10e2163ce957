// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Trento Core - the facts and operations engine
//!
//! This crate holds everything the agent does between decoding a request and
//! encoding its answer, independent of any transport:
//! - [`FactValue`]: the typed, nested payload of a gathered fact
//! - [`FactGatheringError`]: the `{type, message}` error carried in facts
//! - [`Registry`]: versioned `name[@version]` handler lookup
//! - [`FactsCache`]: single-flight memoization scoped to one gather call
//! - [`gather_facts`]: parallel fan-out of a request batch over gatherers
//! - [`Operator`] / [`PhasedOperator`]: multi-phase state changes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        trento-core                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  gather_facts: group by gatherer → one task per group       │
//! │                derived Context + fresh FactsCache           │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  GathererRegistry            │  OperatorRegistry            │
//! │  Arc<dyn Gatherer>           │  OperatorBuilder             │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │  Fact / FactValue / FactGatheringError                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trento_core::{Context, FactRequest, GathererRegistry, gather_facts};
//!
//! let registry = GathererRegistry::new().with("sysctl", "v1", sysctl);
//! let requests = vec![FactRequest::new("swappiness", "check1", "sysctl", "vm.swappiness")];
//! let gathered = gather_facts(&ctx, "exec", &agent_id, "group", &requests, &registry).await?;
//! ```

pub mod cache;
pub mod context;
pub mod error;
pub mod fact;
pub mod gatherer;
pub mod gathering;
pub mod operator;
pub mod registry;
pub mod value;

pub use cache::{CacheError, FactsCache};
pub use context::{Context, ContextError};
pub use error::FactGatheringError;
pub use fact::{Fact, FactRequest, FactsGathered, facts_with_error};
pub use gatherer::{Gatherer, GathererRegistry};
pub use gathering::{GatherError, gather_facts};
pub use operator::{
    Arguments, Diff, ExecutionReport, ExecutionResult, Operator, OperatorBuilder,
    OperatorRegistry, Phase, PhasedOperator, Planned,
};
pub use registry::{Registry, RegistryError};
pub use value::{FactValue, FactValueError, ParseOptions, pretty_print};
