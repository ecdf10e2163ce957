// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gatherers compiled into the agent.

pub mod command;
pub mod hosts;
pub mod os_release;
pub mod sysctl;

use std::collections::HashMap;
use std::sync::Arc;

use trento_core::Gatherer;

pub use command::{CommandError, CommandExecutor, MockExecutor, TokioExecutor};
pub use hosts::HostsGatherer;
pub use os_release::OsReleaseGatherer;
pub use sysctl::SysctlGatherer;

/// Version every built-in gatherer is registered under.
pub const BUILTIN_VERSION: &str = "v1";

/// `name -> {version -> gatherer}` for the built-ins, ready for
/// `Registry::add`.
pub fn builtin_gatherers(
    executor: Arc<dyn CommandExecutor>,
) -> HashMap<String, HashMap<String, Arc<dyn Gatherer>>> {
    let gatherers: [(&str, Arc<dyn Gatherer>); 3] = [
        (sysctl::SYSCTL_GATHERER, Arc::new(SysctlGatherer::new(executor))),
        (os_release::OS_RELEASE_GATHERER, Arc::new(OsReleaseGatherer::default())),
        (hosts::HOSTS_GATHERER, Arc::new(HostsGatherer::default())),
    ];

    gatherers
        .into_iter()
        .map(|(name, gatherer)| {
            (
                name.to_string(),
                HashMap::from([(BUILTIN_VERSION.to_string(), gatherer)]),
            )
        })
        .collect()
}
