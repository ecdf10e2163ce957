// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `/etc/os-release` as a map of its variables.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;
use trento_core::{Context, Fact, FactGatheringError, FactRequest, FactValue, Gatherer};

pub const OS_RELEASE_GATHERER: &str = "os-release";

pub const DEFAULT_OS_RELEASE_PATH: &str = "/etc/os-release";

fn file_error() -> FactGatheringError {
    FactGatheringError::new("os-release-file-error", "error reading /etc/os-release file")
}

fn decoding_error() -> FactGatheringError {
    FactGatheringError::new(
        "os-release-decoding-error",
        "error decoding /etc/os-release file",
    )
}

pub struct OsReleaseGatherer {
    path: PathBuf,
}

impl Default for OsReleaseGatherer {
    fn default() -> Self {
        Self::new(DEFAULT_OS_RELEASE_PATH)
    }
}

impl OsReleaseGatherer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Gatherer for OsReleaseGatherer {
    async fn gather(
        &self,
        _ctx: &Context,
        requests: &[FactRequest],
    ) -> Result<Vec<Fact>, FactGatheringError> {
        debug!(path = %self.path.display(), "starting os-release facts gathering");

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| file_error().wrap(e))?;
        let release = parse_os_release(&content).map_err(|e| decoding_error().wrap(e))?;

        let value = FactValue::Map(
            release
                .into_iter()
                .map(|(key, value)| (key, FactValue::String(value)))
                .collect(),
        );
        Ok(requests
            .iter()
            .map(|request| Fact::with_value(request, value.clone()))
            .collect())
    }
}

/// Shell-style `KEY=value` assignments; blank lines and `#` comments are
/// skipped and one level of matching quotes is removed.
pub fn parse_os_release(content: &str) -> Result<BTreeMap<String, String>, String> {
    let mut variables = BTreeMap::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(format!("line {}: missing '='", number + 1));
        };
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(format!("line {}: invalid variable name '{}'", number + 1, key));
        }
        variables.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    Ok(variables)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLES: &str = r#"NAME="SLES"
VERSION="15-SP5"
VERSION_ID="15.5"
PRETTY_NAME="SUSE Linux Enterprise Server 15 SP5"
# comment
ID='sles'
ID_LIKE="suse"
ANSI_COLOR="0;32"
CPE_NAME="cpe:/o:suse:sles:15:sp5"
DOCUMENTATION_URL=https://documentation.suse.com/
"#;

    fn request() -> FactRequest {
        FactRequest::new("os_release", "check", OS_RELEASE_GATHERER, "")
    }

    #[tokio::test]
    async fn test_gather_os_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("os-release");
        std::fs::write(&path, SLES).unwrap();

        let facts = OsReleaseGatherer::new(&path)
            .gather(&Context::background(), &[request(), request()])
            .await
            .unwrap();

        assert_eq!(facts.len(), 2);
        let value = facts[0].value.as_ref().unwrap();
        assert_eq!(value.get("NAME").unwrap(), &FactValue::from("SLES"));
        assert_eq!(value.get("VERSION_ID").unwrap(), &FactValue::from("15.5"));
        assert_eq!(value.get("ID").unwrap(), &FactValue::from("sles"));
        assert_eq!(
            value.get("DOCUMENTATION_URL").unwrap(),
            &FactValue::from("https://documentation.suse.com/")
        );
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = OsReleaseGatherer::new("/nonexistent/os-release")
            .gather(&Context::background(), &[request()])
            .await
            .unwrap_err();
        assert_eq!(err.kind, "os-release-file-error");
    }

    #[tokio::test]
    async fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("os-release");
        std::fs::write(&path, "NAME=\"SLES\"\nthis is not an assignment\n").unwrap();

        let err = OsReleaseGatherer::new(&path)
            .gather(&Context::background(), &[request()])
            .await
            .unwrap_err();
        assert_eq!(err.kind, "os-release-decoding-error");
        assert!(err.message.contains("line 2"));
    }
}
