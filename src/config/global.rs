//! Global configuration.
//!
//! Loaded from ~/.config/submitr/submitr.yml or ./submitr.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::Capability;
use crate::error::SubmitrError;
use crate::providers::Fallbacks;
use crate::resilience::BreakerConfig;
use crate::scheduler::RetryPolicy;

/// Longest retry backoff accepted, 30 days
pub const MAX_RETRY_DELAY_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Global configuration for submitr.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Circuit breaker thresholds.
    pub breaker: BreakerSection,

    /// Provider call budgets.
    pub providers: ProvidersConfig,

    /// Values substituted when a provider is unavailable.
    pub fallbacks: FallbackConfig,

    /// Retry policy.
    pub retry: RetryConfig,

    /// Queue and lease housekeeping.
    pub queue: QueueConfig,

    /// Persistence settings.
    pub storage: StorageConfig,

    /// Settings for the `simulate` command.
    pub simulate: SimulateConfig,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. ~/.config/submitr/submitr.yml
    /// 3. ./submitr.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("submitr").join("submitr.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        let local_config = PathBuf::from("submitr.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => {
                    log::info!("Loaded config from submitr.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load submitr.yml: {}", e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        fn invalid(msg: impl Into<String>) -> crate::error::Result<()> {
            Err(SubmitrError::Config(msg.into()))
        }

        if self.breaker.failure_threshold == 0 {
            return invalid("breaker.failure-threshold must be > 0");
        }
        for (capability, over) in &self.breaker.overrides {
            if over.failure_threshold == Some(0) {
                return invalid(format!("breaker.overrides.{}.failure-threshold must be > 0", capability));
            }
        }
        if self.providers.default_timeout_ms == 0 {
            return invalid("providers.default-timeout-ms must be > 0");
        }
        for (capability, ms) in &self.providers.timeouts_ms {
            if *ms == 0 {
                return invalid(format!("providers.timeouts-ms.{} must be > 0", capability));
            }
        }
        if self.providers.submit_deadline_ms == 0 {
            return invalid("providers.submit-deadline-ms must be > 0");
        }
        if !(0.0..=1.0).contains(&self.fallbacks.success_probability) {
            return invalid("fallbacks.success-probability must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.retry.confidence_floor) {
            return invalid("retry.confidence-floor must be in [0, 1]");
        }
        if self.retry.max_delay_ms > MAX_RETRY_DELAY_MS {
            return invalid(format!("retry.max-delay-ms must not exceed {}", MAX_RETRY_DELAY_MS));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return invalid("retry.base-delay-ms must not exceed retry.max-delay-ms");
        }
        if self.queue.sweep_interval_ms == 0 {
            return invalid("queue.sweep-interval-ms must be > 0");
        }
        if self.queue.lease_timeout_ms == 0 {
            return invalid("queue.lease-timeout-ms must be > 0");
        }
        if self.simulate.workers == 0 {
            return invalid("simulate.workers must be > 0");
        }
        if !(0.0..=1.0).contains(&self.simulate.success_rate) {
            return invalid("simulate.success-rate must be in [0, 1]");
        }
        Ok(())
    }

    /// Breaker thresholds for one capability, overrides applied.
    pub fn breaker_config(&self, capability: Capability) -> BreakerConfig {
        let over = self.breaker.overrides.get(&capability);
        BreakerConfig {
            failure_threshold: over
                .and_then(|o| o.failure_threshold)
                .unwrap_or(self.breaker.failure_threshold),
            reset_timeout: Duration::from_millis(
                over.and_then(|o| o.reset_timeout_ms)
                    .unwrap_or(self.breaker.reset_timeout_ms),
            ),
        }
    }

    /// Per-call timeout for one capability.
    pub fn provider_timeout(&self, capability: Capability) -> Duration {
        Duration::from_millis(
            self.providers
                .timeouts_ms
                .get(&capability)
                .copied()
                .unwrap_or(self.providers.default_timeout_ms),
        )
    }

    /// Budget shared by every provider call of one submit.
    pub fn submit_deadline(&self) -> Duration {
        Duration::from_millis(self.providers.submit_deadline_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            confidence_floor: self.retry.confidence_floor,
        }
    }

    pub fn fallbacks(&self) -> Fallbacks {
        Fallbacks {
            success_probability: self.fallbacks.success_probability,
            ..Fallbacks::default()
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.queue.sweep_interval_ms)
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.queue.lease_timeout_ms)
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSection {
    /// Consecutive failures that open a breaker.
    #[serde(rename = "failure-threshold")]
    pub failure_threshold: u32,

    /// Time an open breaker waits before a trial call, in milliseconds.
    #[serde(rename = "reset-timeout-ms")]
    pub reset_timeout_ms: u64,

    /// Per-capability overrides.
    pub overrides: BTreeMap<Capability, BreakerOverride>,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerOverride {
    #[serde(rename = "failure-threshold", skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,

    #[serde(rename = "reset-timeout-ms", skip_serializing_if = "Option::is_none")]
    pub reset_timeout_ms: Option<u64>,
}

/// Provider call budgets.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Timeout per provider call in milliseconds.
    #[serde(rename = "default-timeout-ms")]
    pub default_timeout_ms: u64,

    /// Per-capability timeouts in milliseconds.
    #[serde(rename = "timeouts-ms")]
    pub timeouts_ms: BTreeMap<Capability, u64>,

    /// Upper bound on the whole provider fan-out of one submit.
    #[serde(rename = "submit-deadline-ms")]
    pub submit_deadline_ms: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 1_500,
            timeouts_ms: BTreeMap::new(),
            submit_deadline_ms: 3_000,
        }
    }
}

/// Values substituted when a provider is unavailable.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackConfig {
    #[serde(rename = "success-probability")]
    pub success_probability: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            success_probability: 0.5,
        }
    }
}

/// Retry policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries allowed per job.
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Fraction of the backoff applied when the analyzer has zero confidence.
    #[serde(rename = "confidence-floor")]
    pub confidence_floor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 30_000,
            max_delay_ms: 3_600_000, // 1 hour
            confidence_floor: 0.5,
        }
    }
}

/// Queue and lease housekeeping.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How often delayed jobs are promoted and leases checked.
    #[serde(rename = "sweep-interval-ms")]
    pub sweep_interval_ms: u64,

    /// A dispatch without a heartbeat for this long is reclaimed.
    #[serde(rename = "lease-timeout-ms")]
    pub lease_timeout_ms: u64,

    /// Hold jobs until the start of their recommended window.
    #[serde(rename = "respect-timing-windows")]
    pub respect_timing_windows: bool,

    /// Finished jobs whose final status is kept in memory after they leave the index.
    #[serde(rename = "retired-capacity")]
    pub retired_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1_000,
            lease_timeout_ms: 300_000, // 5 minutes
            respect_timing_windows: true,
            retired_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Jsonl,
}

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Directory holding jobs.jsonl and breakers.jsonl.
    #[serde(rename = "jsonl-dir")]
    pub jsonl_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let default_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("submitr");

        Self {
            backend: StorageBackend::Memory,
            jsonl_dir: default_dir,
        }
    }
}

/// Settings for the `simulate` command.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulateConfig {
    /// Concurrent simulated workers.
    pub workers: usize,

    /// Jobs submitted when no targets file is given.
    pub jobs: usize,

    /// Probability that a simulated submission succeeds.
    #[serde(rename = "success-rate")]
    pub success_rate: f64,

    /// Simulated time per submission in milliseconds.
    #[serde(rename = "work-ms")]
    pub work_ms: u64,

    /// Pause between submissions of one worker in milliseconds.
    #[serde(rename = "pacing-ms")]
    pub pacing_ms: u64,

    /// Per-tier delay the built-in timing advisor adds, in milliseconds.
    #[serde(rename = "stagger-ms")]
    pub stagger_ms: u64,

    /// Retry backoff base used in place of retry.base-delay-ms while simulating.
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Seed for simulated outcomes.
    pub seed: u64,
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            jobs: 20,
            success_rate: 0.7,
            work_ms: 50,
            pacing_ms: 200,
            stagger_ms: 0,
            retry_delay_ms: 250,
            seed: 42,
        }
    }
}
