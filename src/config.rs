//! Configuration and the per-run context.
//!
//! `Config` is the optional on-disk defaults file at `~/.foreman/foreman.toml`.
//! `RunContext` is the resolved, explicit bundle of settings a run actually
//! uses, threaded by value through the driver instead of living in globals;
//! CLI flags override config values, config values override built-in defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::audit::RunId;
use crate::flog_debug;
use crate::gate::{DEFAULT_MAX_REGENERATIONS, DEFAULT_QUALITY_THRESHOLD};
use crate::validate::DEFAULT_MAX_ATTEMPTS;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Cap on concurrently running workers per level.
    pub max_concurrency: Option<usize>,
    /// Validation loop attempt budget.
    pub max_attempts: Option<u32>,
    /// Quality gate regeneration budget.
    pub max_regenerations: Option<u32>,
    /// Quality gate score threshold (0-10).
    pub quality_threshold: Option<u8>,
    /// Remediation catalog path; tilde-expanded.
    pub remediation_catalog: Option<String>,
    /// Task tracker snapshot path; tilde-expanded. Absent means no tracker.
    pub tracker_file: Option<String>,
}

impl Config {
    pub fn foreman_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".foreman"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::foreman_dir()?.join("foreman.toml"))
    }

    pub fn default_log_dir() -> Result<PathBuf> {
        Ok(Self::foreman_dir()?.join("logs"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        flog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            flog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        flog_debug!(
            "Config loaded: concurrency={:?}, attempts={:?}, threshold={:?}",
            config.max_concurrency,
            config.max_attempts,
            config.quality_threshold
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::foreman_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        flog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}

/// Everything one workflow run needs, resolved up front.
///
/// No field is read from the environment after construction; the driver and
/// its components receive this by reference.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    /// Directory validation commands and remediations run in.
    pub workspace: PathBuf,
    /// Directory receiving per-task worker logs and the audit log.
    pub log_dir: PathBuf,
    pub max_concurrency: Option<usize>,
    pub max_attempts: u32,
    pub max_regenerations: u32,
    pub quality_threshold: u8,
    /// Remediation catalog path, when configured.
    pub remediation_catalog: Option<PathBuf>,
    /// Tracker snapshot path, when configured.
    pub tracker_file: Option<PathBuf>,
}

impl RunContext {
    /// Resolve a context from config-file values, with built-in defaults for
    /// anything unset. CLI overrides are applied afterwards by the caller.
    pub fn from_config(config: &Config, workspace: PathBuf) -> Result<Self> {
        Ok(Self {
            run_id: RunId::new(),
            workspace,
            log_dir: Config::default_log_dir()?,
            max_concurrency: config.max_concurrency,
            max_attempts: config.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            max_regenerations: config
                .max_regenerations
                .unwrap_or(DEFAULT_MAX_REGENERATIONS),
            quality_threshold: config
                .quality_threshold
                .unwrap_or(DEFAULT_QUALITY_THRESHOLD),
            remediation_catalog: config
                .remediation_catalog
                .as_deref()
                .map(expand_tilde),
            tracker_file: config.tracker_file.as_deref().map(expand_tilde),
        })
    }

    /// Path of this run's audit log, inside the log directory.
    pub fn audit_path(&self) -> PathBuf {
        self.log_dir
            .join(format!("audit-{}.jsonl", self.run_id.short()))
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
