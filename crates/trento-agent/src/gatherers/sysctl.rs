// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kernel parameters from `sysctl -a`.
//!
//! The argument is a dotted key such as `vm.swappiness`. A key that only
//! prefixes other keys answers with a map of everything below it, so
//! `net.ipv4.tcp_keepalive` covers `_time`, `_intvl` and `_probes` in one
//! fact. The command runs once per gather call through the facts cache.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use trento_core::cache::get_or_update;
use trento_core::{Context, Fact, FactGatheringError, FactRequest, FactValue, Gatherer};

use super::command::CommandExecutor;

pub const SYSCTL_GATHERER: &str = "sysctl";

/// Cache key of the parsed `sysctl -a` output.
pub const SYSCTL_CACHE_KEY: &str = "sysctl";

fn missing_argument() -> FactGatheringError {
    FactGatheringError::new("sysctl-missing-argument", "missing required argument")
}

fn command_error() -> FactGatheringError {
    FactGatheringError::new("sysctl-cmd-error", "error executing sysctl command")
}

fn value_not_found() -> FactGatheringError {
    FactGatheringError::new(
        "sysctl-value-not-found",
        "requested value not found in sysctl output",
    )
}

type SysctlOutput = Arc<BTreeMap<String, String>>;

pub struct SysctlGatherer {
    executor: Arc<dyn CommandExecutor>,
}

impl SysctlGatherer {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    async fn output(&self, ctx: &Context) -> Result<SysctlOutput, FactGatheringError> {
        get_or_update(ctx.cache(), SYSCTL_CACHE_KEY, || async {
            let stdout = self.executor.output(ctx, "sysctl", &["-a"]).await?;
            Ok::<_, anyhow::Error>(Arc::new(parse_sysctl(&String::from_utf8_lossy(&stdout))))
        })
        .await
        .map_err(|e| command_error().wrap(e))
    }
}

#[async_trait]
impl Gatherer for SysctlGatherer {
    async fn gather(
        &self,
        ctx: &Context,
        requests: &[FactRequest],
    ) -> Result<Vec<Fact>, FactGatheringError> {
        debug!(requests = requests.len(), "starting sysctl facts gathering");
        let output = self.output(ctx).await?;

        Ok(requests
            .iter()
            .map(|request| {
                let key = request.argument.trim();
                if key.is_empty() {
                    return Fact::with_error(request, missing_argument());
                }
                match lookup(&output, key) {
                    Some(value) => Fact::with_value(request, value),
                    None => Fact::with_error(request, value_not_found().wrap(key)),
                }
            })
            .collect())
    }
}

/// `key = value` per line. Lines without a separator are skipped.
pub fn parse_sysctl(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn lookup(output: &BTreeMap<String, String>, key: &str) -> Option<FactValue> {
    if let Some(value) = output.get(key) {
        return Some(FactValue::parse_str(value));
    }

    let prefix = format!("{}.", key);
    let mut tree = BTreeMap::new();
    for (full_key, value) in output.range(prefix.clone()..) {
        let Some(rest) = full_key.strip_prefix(&prefix) else {
            break;
        };
        insert_path(&mut tree, rest, FactValue::parse_str(value));
    }

    if tree.is_empty() {
        None
    } else {
        Some(FactValue::Map(tree))
    }
}

fn insert_path(tree: &mut BTreeMap<String, FactValue>, path: &str, value: FactValue) {
    match path.split_once('.') {
        None => {
            tree.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let node = tree
                .entry(head.to_string())
                .or_insert_with(|| FactValue::Map(BTreeMap::new()));
            if !matches!(node, FactValue::Map(_)) {
                *node = FactValue::Map(BTreeMap::new());
            }
            if let FactValue::Map(children) = node {
                insert_path(children, rest, value);
            }
        }
    }
}
