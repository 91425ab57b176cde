//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every engine section has a `Default` so the library runs without a file.
//! Secrets (the supplier API key) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::types::LeagueProfile;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub value: ValueConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub supplier: SupplierConfig,
    #[serde(default)]
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// League profiles seeded into the store by `sync-leagues`.
    #[serde(default)]
    pub leagues: Vec<LeagueProfile>,
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// Tuning for the probability model.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PredictionConfig {
    /// Minimum matches before a team rate is trusted.
    pub min_matches: u32,
    /// Absolute gap between recent and season rate that triggers momentum.
    pub momentum_threshold: f64,
    pub momentum_sensitivity: f64,
    pub momentum_min: f64,
    pub momentum_max: f64,
    /// Recent matches required before momentum is considered.
    pub momentum_min_recent: usize,
    pub aggression_early_minute: f64,
    pub aggression_early_boost: f64,
    pub aggression_mid_minute: f64,
    pub aggression_mid_boost: f64,
    pub vulnerability_high: f64,
    pub vulnerability_low: f64,
    pub vulnerability_boost: f64,
    pub vulnerability_penalty: f64,
    pub context_stakes_boost: f64,
    pub context_derby_boost: f64,
    pub context_rested_days: u32,
    pub context_rested_boost: f64,
    pub context_tired_days: u32,
    pub context_tired_boost: f64,
    pub context_max: f64,
    pub form_perfect_boost: f64,
    pub form_strong_boost: f64,
    pub form_cold_penalty: f64,
    pub form_min: f64,
    pub form_max: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            min_matches: 5,
            momentum_threshold: 0.15,
            momentum_sensitivity: 0.5,
            momentum_min: 0.92,
            momentum_max: 1.10,
            momentum_min_recent: 3,
            aggression_early_minute: 25.0,
            aggression_early_boost: 1.06,
            aggression_mid_minute: 35.0,
            aggression_mid_boost: 1.03,
            vulnerability_high: 0.60,
            vulnerability_low: 0.30,
            vulnerability_boost: 1.05,
            vulnerability_penalty: 0.95,
            context_stakes_boost: 1.03,
            context_derby_boost: 1.04,
            context_rested_days: 6,
            context_rested_boost: 1.02,
            context_tired_days: 3,
            context_tired_boost: 1.03,
            context_max: 1.12,
            form_perfect_boost: 1.05,
            form_strong_boost: 1.02,
            form_cold_penalty: 0.95,
            form_min: 0.90,
            form_max: 1.10,
        }
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Signal thresholds, stake sizing and candidate floors.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ValueConfig {
    pub threshold_a: f64,
    pub threshold_b: f64,
    pub threshold_c: f64,
    pub stake_a: f64,
    pub stake_b: f64,
    pub stake_c: f64,
    pub multiplier_min: f64,
    pub multiplier_max: f64,
    pub min_probability: f64,
    pub min_edge_score: f64,
}

impl Default for ValueConfig {
    fn default() -> Self {
        Self {
            threshold_a: 0.08,
            threshold_b: 0.03,
            threshold_c: 0.0,
            stake_a: 0.03,
            stake_b: 0.02,
            stake_c: 0.01,
            multiplier_min: 0.8,
            multiplier_max: 1.2,
            min_probability: 0.55,
            min_edge_score: 40.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline / health
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum selections created per run.
    pub max_selections: usize,
    /// Maximum cumulative stake fraction per run.
    pub max_exposure: f64,
    /// Concurrent prediction/odds lookups.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_selections: 5,
            max_exposure: 0.15,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HealthConfig {
    pub period_days: u32,
    /// A stored report younger than this is served from cache.
    pub cache_minutes: i64,
    /// Decided selections required before calibration is diagnosed.
    pub calibration_min_samples: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            period_days: 30,
            cache_minutes: 60,
            calibration_min_samples: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Infrastructure
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// sqlx connection URL, e.g. `sqlite://firsthalf.db`.
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://firsthalf.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SupplierConfig {
    pub base_url: String,
    /// Name of the env var holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    /// How long to stop calling a supplier after it rate-limits us.
    pub rate_limit_cooldown_secs: u64,
    /// Bookmaker ids to request; empty means all.
    pub bookmakers: Vec<u32>,
}

impl Default for SupplierConfig {
    fn default() -> Self {
        Self {
            base_url: "https://v3.football.api-sports.io".to_string(),
            api_key_env: "API_FOOTBALL_KEY".to_string(),
            timeout_secs: 15,
            max_retries: 3,
            base_backoff_ms: 1000,
            rate_limit_cooldown_secs: 60,
            bookmakers: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EstimationConfig {
    /// Share of full-match goals expected before half-time.
    pub first_half_share: f64,
    /// Bookmaker margin added to estimated prices.
    pub overround: f64,
    pub lambda_min: f64,
    pub lambda_max: f64,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            first_half_share: 0.44,
            overround: 0.06,
            lambda_min: 0.2,
            lambda_max: 6.0,
        }
    }
}

/// Intervals for the built-in scheduler.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub import_interval_mins: u64,
    pub odds_interval_mins: u64,
    /// Closing capture runs this often and covers matches kicking off within it.
    pub closing_interval_mins: u64,
    pub stats_interval_hours: u64,
    pub pipeline_interval_hours: u64,
    pub settle_interval_mins: u64,
    pub health_interval_hours: u64,
    /// Days ahead covered by fixture import.
    pub import_days_ahead: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            import_interval_mins: 360,
            odds_interval_mins: 60,
            closing_interval_mins: 10,
            stats_interval_hours: 24,
            pipeline_interval_hours: 24,
            settle_interval_mins: 60,
            health_interval_hours: 6,
            import_days_ahead: 3,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break engine invariants.
    pub fn validate(&self) -> Result<()> {
        let v = &self.value;
        if !(v.threshold_a >= v.threshold_b && v.threshold_b >= v.threshold_c) {
            anyhow::bail!("value thresholds must satisfy A >= B >= C");
        }
        if !(v.stake_a >= v.stake_b && v.stake_b >= v.stake_c && v.stake_c >= 0.0) {
            anyhow::bail!("stake bases must satisfy A >= B >= C >= 0");
        }
        let p = &self.prediction;
        if p.momentum_min > p.momentum_max || p.form_min > p.form_max {
            anyhow::bail!("prediction factor bounds must satisfy min <= max");
        }
        if self.pipeline.max_exposure <= 0.0 || self.pipeline.max_exposure > 1.0 {
            anyhow::bail!("pipeline max_exposure must be in (0, 1]");
        }
        let mut codes: Vec<&str> = self.leagues.iter().map(|l| l.code.as_str()).collect();
        codes.sort_unstable();
        if codes.windows(2).any(|w| w[0] == w[1]) {
            anyhow::bail!("duplicate league code in [[leagues]]");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
