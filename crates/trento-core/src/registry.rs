// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Versioned name-to-handler lookup.
//!
//! Handlers are stored flat under `(name, version)` with a per-name index of
//! versions, so resolving a bare name to its latest version is a lookup of
//! the greatest element of an ordered set. Versions are opaque strings and
//! compare lexicographically (`v10` sorts before `v2`).
//!
//! The registry is built during startup and then shared read-only; mutation
//! takes `&mut self`, so concurrent modification cannot compile.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use thiserror::Error;

use crate::error::FactGatheringError;

/// Separator between a handler name and a pinned version.
pub const VERSION_SEPARATOR: char = '@';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid name '{0}', expected <name> or <name>@<version>")]
    InvalidName(String),

    #[error("{0}")]
    NotFound(String),
}

impl From<RegistryError> for FactGatheringError {
    fn from(err: RegistryError) -> Self {
        FactGatheringError::gatherer_not_found().wrap(err)
    }
}

/// Split `name` or `name@version`. The version is empty when not pinned.
pub fn parse_name(name_version: &str) -> Result<(&str, &str), RegistryError> {
    let mut parts = name_version.split(VERSION_SEPARATOR);
    let name = parts.next().unwrap_or_default();
    let version = parts.next().unwrap_or_default();
    if parts.next().is_some() {
        return Err(RegistryError::InvalidName(name_version.to_string()));
    }
    Ok((name, version))
}

pub struct Registry<H> {
    handlers: BTreeMap<(String, String), H>,
    versions: HashMap<String, BTreeSet<String>>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
            versions: HashMap::new(),
        }
    }
}

impl<H: Clone> Registry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a `name -> version -> handler` tree. A name present in `tree`
    /// replaces every version previously registered under that name.
    pub fn add(&mut self, tree: HashMap<String, HashMap<String, H>>) {
        for (name, versions) in tree {
            self.remove(&name);
            for (version, handler) in versions {
                self.register(name.clone(), version, handler);
            }
        }
    }

    /// Register a single version, keeping the other versions of `name`.
    pub fn register(&mut self, name: impl Into<String>, version: impl Into<String>, handler: H) {
        let name = name.into();
        let version = version.into();
        self.versions
            .entry(name.clone())
            .or_default()
            .insert(version.clone());
        self.handlers.insert((name, version), handler);
    }

    /// Builder form of [`Registry::register`].
    pub fn with(mut self, name: impl Into<String>, version: impl Into<String>, handler: H) -> Self {
        self.register(name, version, handler);
        self
    }

    fn remove(&mut self, name: &str) {
        if let Some(versions) = self.versions.remove(name) {
            for version in versions {
                self.handlers.remove(&(name.to_string(), version));
            }
        }
    }

    /// Resolve `name` (latest version) or `name@version` (exact).
    pub fn get(&self, name_version: &str) -> Result<H, RegistryError> {
        let (name, version) = parse_name(name_version)?;

        let version = if version.is_empty() {
            self.versions
                .get(name)
                .and_then(|versions| versions.last())
                .ok_or_else(|| RegistryError::NotFound(name_version.to_string()))?
                .as_str()
        } else {
            version
        };

        self.handlers
            .get(&(name.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name_version.to_string()))
    }

    /// `"name - v1/v2"` per registered name, sorted by name.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<&String> = self.versions.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let versions: Vec<&str> = self.versions[name].iter().map(String::as_str).collect();
                format!("{} - {}", name, versions.join("/"))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<H> fmt::Debug for Registry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
