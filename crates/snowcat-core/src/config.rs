//! Configuration layer for the SnowCat runtime.
//!
//! Parsed from a `snowcat.toml` file with `SNOWCAT_*` environment variable
//! overrides, following `stupid-eisenbahn`'s `EisenbahnConfig` conventions.
//! The knobs here are exactly those named in spec.md §6.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Top-level SnowCat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnowcatConfig {
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub stage: StageDefaultsConfig,
    #[serde(default)]
    pub finalization: FinalizationConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Lease Manager defaults (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// TTL in seconds bounding liveness damage from a crashed runner.
    /// Recommended default: 3600s (1h). See spec.md §4.3.
    #[serde(default = "default_lease_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_lease_ttl_secs() -> u64 {
    3600
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_lease_ttl_secs(),
        }
    }
}

/// Stage Runner defaults (C5), overridable per-stage via `Stage::checkpoint_frequency`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefaultsConfig {
    #[serde(default = "default_checkpoint_frequency_secs")]
    pub checkpoint_frequency_secs: u64,
    #[serde(default = "default_buffer_length")]
    pub buffer_length: u32,
    #[serde(default = "default_re_arm_delay_secs")]
    pub re_arm_delay_secs: u64,
}

fn default_checkpoint_frequency_secs() -> u64 {
    60
}

fn default_buffer_length() -> u32 {
    10
}

fn default_re_arm_delay_secs() -> u64 {
    2
}

impl Default for StageDefaultsConfig {
    fn default() -> Self {
        Self {
            checkpoint_frequency_secs: default_checkpoint_frequency_secs(),
            buffer_length: default_buffer_length(),
            re_arm_delay_secs: default_re_arm_delay_secs(),
        }
    }
}

/// Finalization defaults (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationConfig {
    /// TTL in seconds for the `{stream}:finished` tombstone.
    /// Recommended default: 604800s (7 days). See spec.md §4.4.
    #[serde(default = "default_tombstone_ttl_secs")]
    pub tombstone_ttl_secs: u64,
}

fn default_tombstone_ttl_secs() -> u64 {
    604_800
}

impl Default for FinalizationConfig {
    fn default() -> Self {
        Self {
            tombstone_ttl_secs: default_tombstone_ttl_secs(),
        }
    }
}

/// Which `KvBackend` implementation to construct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// "memory" or "redis".
    #[serde(default = "default_backend_kind")]
    pub kind: String,
    /// Connection string, required when `kind = "redis"`.
    pub redis_url: Option<String>,
}

fn default_backend_kind() -> String {
    "memory".into()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            redis_url: None,
        }
    }
}

impl Default for SnowcatConfig {
    fn default() -> Self {
        Self {
            lease: LeaseConfig::default(),
            stage: StageDefaultsConfig::default(),
            finalization: FinalizationConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl SnowcatConfig {
    /// Parse config from a TOML string, applying env overrides and
    /// validating the result.
    pub fn from_toml(toml_str: &str) -> Result<Self, Error> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// In-memory backend, all other knobs at their defaults. Suitable for
    /// a single-process deployment or tests.
    pub fn local() -> Self {
        Self::default()
    }

    /// Apply `SNOWCAT_*` environment variable overrides.
    ///
    /// - `SNOWCAT_LEASE_TTL_SECS` → `lease.ttl_secs`
    /// - `SNOWCAT_STAGE_CHECKPOINT_FREQUENCY_SECS` → `stage.checkpoint_frequency_secs`
    /// - `SNOWCAT_STAGE_BUFFER_LENGTH` → `stage.buffer_length`
    /// - `SNOWCAT_STAGE_RE_ARM_DELAY_SECS` → `stage.re_arm_delay_secs`
    /// - `SNOWCAT_FINALIZATION_TOMBSTONE_TTL_SECS` → `finalization.tombstone_ttl_secs`
    /// - `SNOWCAT_BACKEND_KIND` → `backend.kind`
    /// - `SNOWCAT_BACKEND_REDIS_URL` → `backend.redis_url`
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SNOWCAT_LEASE_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.lease.ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("SNOWCAT_STAGE_CHECKPOINT_FREQUENCY_SECS") {
            if let Ok(n) = v.parse() {
                self.stage.checkpoint_frequency_secs = n;
            }
        }
        if let Ok(v) = std::env::var("SNOWCAT_STAGE_BUFFER_LENGTH") {
            if let Ok(n) = v.parse() {
                self.stage.buffer_length = n;
            }
        }
        if let Ok(v) = std::env::var("SNOWCAT_STAGE_RE_ARM_DELAY_SECS") {
            if let Ok(n) = v.parse() {
                self.stage.re_arm_delay_secs = n;
            }
        }
        if let Ok(v) = std::env::var("SNOWCAT_FINALIZATION_TOMBSTONE_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.finalization.tombstone_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("SNOWCAT_BACKEND_KIND") {
            self.backend.kind = v;
        }
        if let Ok(v) = std::env::var("SNOWCAT_BACKEND_REDIS_URL") {
            self.backend.redis_url = Some(v);
        }
    }

    /// Validate the config. Non-zero knobs and a redis URL present iff
    /// `backend.kind == "redis"`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.lease.ttl_secs == 0 {
            return Err(Error::Config("lease.ttl_secs must be > 0".into()));
        }
        if self.stage.buffer_length == 0 {
            return Err(Error::Config("stage.buffer_length must be > 0".into()));
        }
        match self.backend.kind.as_str() {
            "memory" => Ok(()),
            "redis" => {
                if self.backend.redis_url.is_none() {
                    return Err(Error::Config(
                        "backend.redis_url is required when backend.kind = \"redis\"".into(),
                    ));
                }
                Ok(())
            }
            other => Err(Error::Config(format!(
                "invalid backend.kind '{other}', expected \"memory\" or \"redis\""
            ))),
        }
    }
}
