//! Remediation catalog: known failure signatures and their fixes.
//!
//! The catalog maps substrings of validation output to fix commands. It is
//! loaded once from TOML and shared read-only across the run; entries are
//! consulted in declared order and the first match wins. Remediation is
//! best-effort: a fix that itself fails is logged and the loop simply moves
//! to its next attempt.

use crate::error::Result;
use crate::exec::worker::WorkerSpec;
use crate::{flog, flog_warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;

/// One known failure and its fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationEntry {
    /// Case-insensitive substring matched against validation output.
    pub signature: String,
    /// Shell command applied when the signature matches.
    pub fix: String,
}

/// Ordered, read-only collection of remediation entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemediationCatalog {
    #[serde(default, rename = "entry")]
    entries: Vec<RemediationEntry>,
}

impl RemediationCatalog {
    /// An empty catalog; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a catalog from a TOML file of `[[entry]]` tables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog: Self = toml::from_str(&content)?;
        Ok(catalog)
    }

    /// Add an entry; declaration order is match order.
    pub fn with_entry(mut self, signature: &str, fix: &str) -> Self {
        self.entries.push(RemediationEntry {
            signature: signature.to_string(),
            fix: fix.to_string(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the first entry whose signature occurs in `output`.
    ///
    /// Matching is case-insensitive substring containment; signatures are
    /// short fragments of compiler or test-runner output, not patterns.
    pub fn lookup(&self, output: &str) -> Option<&RemediationEntry> {
        let haystack = output.to_lowercase();
        self.entries
            .iter()
            .find(|e| haystack.contains(&e.signature.to_lowercase()))
    }

    /// Apply an entry's fix command inside `workspace`.
    ///
    /// Returns whether the fix command itself exited zero. Failures are
    /// logged, never propagated: remediation is advisory and the validation
    /// loop re-runs the stages either way.
    pub async fn apply(&self, entry: &RemediationEntry, workspace: &Path) -> bool {
        flog!("applying remediation for '{}': {}", entry.signature, entry.fix);
        let mut cmd = WorkerSpec::shell(&entry.fix).command();
        cmd.current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match cmd.status().await {
            Ok(status) if status.success() => true,
            Ok(status) => {
                flog_warn!(
                    "remediation '{}' exited {:?}",
                    entry.signature,
                    status.code()
                );
                false
            }
            Err(err) => {
                flog_warn!("remediation '{}' failed to spawn: {}", entry.signature, err);
                false
            }
        }
    }
}
