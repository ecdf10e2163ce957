// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `/etc/hosts` as `hostname -> [address]`.
//!
//! An empty argument returns the whole table, otherwise the addresses of
//! the named host.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;
use trento_core::{Context, Fact, FactGatheringError, FactRequest, FactValue, Gatherer};

pub const HOSTS_GATHERER: &str = "hosts";

pub const DEFAULT_HOSTS_PATH: &str = "/etc/hosts";

fn file_error() -> FactGatheringError {
    FactGatheringError::new("hosts-file-error", "error reading /etc/hosts file")
}

fn decoding_error() -> FactGatheringError {
    FactGatheringError::new("hosts-decoding-error", "error decoding /etc/hosts file")
}

fn value_not_found() -> FactGatheringError {
    FactGatheringError::new(
        "hosts-value-not-found",
        "requested value not found in /etc/hosts file",
    )
}

pub struct HostsGatherer {
    path: PathBuf,
}

impl Default for HostsGatherer {
    fn default() -> Self {
        Self::new(DEFAULT_HOSTS_PATH)
    }
}

impl HostsGatherer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Gatherer for HostsGatherer {
    async fn gather(
        &self,
        _ctx: &Context,
        requests: &[FactRequest],
    ) -> Result<Vec<Fact>, FactGatheringError> {
        debug!(path = %self.path.display(), "starting hosts facts gathering");

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| file_error().wrap(e))?;
        let hosts = parse_hosts(&content).map_err(|e| decoding_error().wrap(e))?;

        Ok(requests
            .iter()
            .map(|request| {
                let hostname = request.argument.trim();
                if hostname.is_empty() {
                    return Fact::with_value(request, table_value(&hosts));
                }
                match hosts.get(hostname) {
                    Some(addresses) => Fact::with_value(request, addresses_value(addresses)),
                    None => Fact::with_error(request, value_not_found().wrap(hostname)),
                }
            })
            .collect())
    }
}

/// Addresses of every hostname, in file order per hostname.
pub fn parse_hosts(content: &str) -> Result<BTreeMap<String, Vec<String>>, String> {
    let mut hosts: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let Some(address) = fields.next() else {
            continue;
        };
        if address.parse::<IpAddr>().is_err() {
            return Err(format!("line {}: invalid address '{}'", number + 1, address));
        }

        let mut names = fields.peekable();
        if names.peek().is_none() {
            return Err(format!("line {}: no hostname for {}", number + 1, address));
        }
        for name in names {
            hosts
                .entry(name.to_string())
                .or_default()
                .push(address.to_string());
        }
    }
    Ok(hosts)
}

fn addresses_value(addresses: &[String]) -> FactValue {
    FactValue::List(addresses.iter().map(|a| FactValue::from(a.as_str())).collect())
}

fn table_value(hosts: &BTreeMap<String, Vec<String>>) -> FactValue {
    FactValue::Map(
        hosts
            .iter()
            .map(|(name, addresses)| (name.clone(), addresses_value(addresses)))
            .collect(),
    )
}
