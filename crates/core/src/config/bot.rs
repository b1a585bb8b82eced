//! Configuration management with profile support.
//!
//! Provides centralized configuration for all bot parameters with
//! support for different profiles (testing, production, aggressive).
//! Profiles only change timing, timeouts and batch sizes; the liquidation
//! policy constants keep their defaults everywhere.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::liquidator::ExecutionSettings;

/// Main configuration structure containing all bot parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Borrow-token and sizing policy
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Retry search bounds and timeouts
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Batched reads and route discovery
    #[serde(default)]
    pub reader: ReaderConfig,

    /// Cycle scheduling and journal
    #[serde(default)]
    pub cycle: CycleConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Liquidation policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Share of the user's debt a pool must hold to be borrowed from (percent)
    #[serde(default = "default_liquidity_threshold")]
    pub liquidity_threshold_pct: u64,

    /// Share of the pool kept for seizure when collateral is the borrow asset (bps)
    #[serde(default = "default_collateral_reserve")]
    pub collateral_reserve_bps: u16,

    /// Slippage of the first plan (bps)
    #[serde(default = "default_slippage")]
    pub default_slippage_bps: u16,
}

fn default_liquidity_threshold() -> u64 {
    15
}
fn default_collateral_reserve() -> u16 {
    5000
}
fn default_slippage() -> u16 {
    100
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            liquidity_threshold_pct: default_liquidity_threshold(),
            collateral_reserve_bps: default_collateral_reserve(),
            default_slippage_bps: default_slippage(),
        }
    }
}

/// Execution loop parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Amount divisors are doubled while below this bound
    #[serde(default = "default_max_divisor")]
    pub max_divisor: u64,

    /// First slippage tried (bps)
    #[serde(default = "default_slippage_start")]
    pub slippage_start_bps: u16,

    /// Last slippage tried, inclusive (bps)
    #[serde(default = "default_slippage_end")]
    pub slippage_end_bps: u16,

    /// Slippage increment (bps)
    #[serde(default = "default_slippage_step")]
    pub slippage_step_bps: u16,

    /// Per-candidate simulation timeout (seconds)
    #[serde(default = "default_simulate_timeout")]
    pub simulate_timeout_secs: u64,

    /// Submission and receipt timeout (seconds)
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,

    /// Fixed gas limit for liquidation transactions; estimated by the node when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

fn default_max_divisor() -> u64 {
    66666
}
fn default_slippage_start() -> u16 {
    100
}
fn default_slippage_end() -> u16 {
    900
}
fn default_slippage_step() -> u16 {
    100
}
fn default_simulate_timeout() -> u64 {
    15
}
fn default_submit_timeout() -> u64 {
    120
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_divisor: default_max_divisor(),
            slippage_start_bps: default_slippage_start(),
            slippage_end_bps: default_slippage_end(),
            slippage_step_bps: default_slippage_step(),
            simulate_timeout_secs: default_simulate_timeout(),
            submit_timeout_secs: default_submit_timeout(),
            gas_limit: None,
        }
    }
}

impl ExecutionConfig {
    /// Slippage values in search order. A zero step yields only the start value.
    pub fn slippages(&self) -> Vec<u16> {
        if self.slippage_step_bps == 0 {
            return vec![self.slippage_start_bps];
        }
        (self.slippage_start_bps..=self.slippage_end_bps)
            .step_by(self.slippage_step_bps as usize)
            .collect()
    }

    pub fn simulate_timeout(&self) -> Duration {
        Duration::from_secs(self.simulate_timeout_secs)
    }
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            max_divisor: self.max_divisor,
            slippages_bps: self.slippages(),
            simulate_timeout: self.simulate_timeout(),
            submit_timeout: self.submit_timeout(),
        }
    }
}

/// Read-side parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Calls per multicall chunk for the balance fan-out
    #[serde(default = "default_batch_size")]
    pub multicall_batch_size: usize,

    /// Uniswap V3 fee tiers probed for routes
    #[serde(default = "default_fee_tiers")]
    pub fee_tiers: Vec<u32>,
}

fn default_batch_size() -> usize {
    10
}
fn default_fee_tiers() -> Vec<u32> {
    vec![500, 3000, 10000]
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            multicall_batch_size: default_batch_size(),
            fee_tiers: default_fee_tiers(),
        }
    }
}

/// Cycle scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Delay between liquidation cycles (seconds)
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// JSON-lines journal of confirmed liquidations; an empty path disables it
    #[serde(default = "default_journal_path", with = "optional_path")]
    pub journal_path: Option<String>,
}

fn default_cycle_interval() -> u64 {
    30
}
fn default_journal_path() -> Option<String> {
    Some("liquidations.jsonl".to_string())
}

/// Optional path written as a string, `""` standing for `None`.
mod optional_path {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(path: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(path.as_deref().unwrap_or_default())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let path = String::deserialize(deserializer)?;
        Ok((!path.trim().is_empty()).then_some(path))
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval(),
            journal_path: default_journal_path(),
        }
    }
}

impl CycleConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            policy: PolicyConfig::default(),
            execution: ExecutionConfig::default(),
            reader: ReaderConfig::default(),
            cycle: CycleConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Short timeouts and cycles for forks and testnets.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            execution: ExecutionConfig {
                simulate_timeout_secs: 5,
                submit_timeout_secs: 30,
                ..Default::default()
            },
            reader: ReaderConfig {
                multicall_batch_size: 5,
                ..Default::default()
            },
            cycle: CycleConfig {
                cycle_interval_secs: 10,
                journal_path: None,
            },
            ..Default::default()
        }
    }

    /// Create a production profile with conservative settings.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            execution: ExecutionConfig {
                simulate_timeout_secs: 20,
                submit_timeout_secs: 180,
                ..Default::default()
            },
            cycle: CycleConfig {
                cycle_interval_secs: 60,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create an aggressive profile for maximum speed.
    pub fn aggressive() -> Self {
        Self {
            profile: "aggressive".to_string(),
            execution: ExecutionConfig {
                simulate_timeout_secs: 8,
                submit_timeout_secs: 60,
                ..Default::default()
            },
            reader: ReaderConfig {
                multicall_batch_size: 20,
                ..Default::default()
            },
            cycle: CycleConfig {
                cycle_interval_secs: 5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Get profile from environment variable BOT_PROFILE, or default.
    /// Supported values: testing, production, aggressive
    pub fn from_env() -> Self {
        let profile = std::env::var("BOT_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            "aggressive" | "aggro" => Self::aggressive(),
            _ => Self::default(),
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Bot configuration loaded");
        tracing::info!(
            liquidity_threshold_pct = self.policy.liquidity_threshold_pct,
            collateral_reserve_bps = self.policy.collateral_reserve_bps,
            default_slippage_bps = self.policy.default_slippage_bps,
            "Policy parameters"
        );
        tracing::info!(
            max_divisor = self.execution.max_divisor,
            slippages = ?self.execution.slippages(),
            simulate_timeout_secs = self.execution.simulate_timeout_secs,
            submit_timeout_secs = self.execution.submit_timeout_secs,
            gas_limit = ?self.execution.gas_limit,
            "Execution search"
        );
        tracing::info!(
            batch_size = self.reader.multicall_batch_size,
            fee_tiers = ?self.reader.fee_tiers,
            cycle_interval_secs = self.cycle.cycle_interval_secs,
            journal = ?self.cycle.journal_path,
            "Reader and cycle"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_constants() {
        let config = BotConfig::default();
        assert_eq!(config.policy.liquidity_threshold_pct, 15);
        assert_eq!(config.policy.collateral_reserve_bps, 5000);
        assert_eq!(config.policy.default_slippage_bps, 100);
        assert_eq!(config.execution.max_divisor, 66666);
        assert_eq!(config.reader.multicall_batch_size, 10);
        assert_eq!(config.reader.fee_tiers, vec![500, 3000, 10000]);
    }

    #[test]
    fn test_slippage_sequence() {
        let execution = ExecutionConfig::default();
        assert_eq!(
            execution.slippages(),
            vec![100, 200, 300, 400, 500, 600, 700, 800, 900]
        );

        let zero_step = ExecutionConfig {
            slippage_step_bps: 0,
            ..Default::default()
        };
        assert_eq!(zero_step.slippages(), vec![100]);
    }

    #[test]
    fn test_profiles_keep_policy_defaults() {
        for config in [BotConfig::testing(), BotConfig::production(), BotConfig::aggressive()] {
            assert_eq!(config.policy, PolicyConfig::default());
            assert_eq!(config.execution.max_divisor, 66666);
        }
        assert_eq!(BotConfig::testing().profile, "testing");
        assert!(BotConfig::aggressive().cycle.cycle_interval_secs < BotConfig::production().cycle.cycle_interval_secs);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: BotConfig = toml::from_str(
            r#"
            profile = "custom"
            [execution]
            max_divisor = 16
            "#,
        )
        .unwrap();
        assert_eq!(parsed.profile, "custom");
        assert_eq!(parsed.execution.max_divisor, 16);
        assert_eq!(parsed.execution.slippage_end_bps, 900);
        assert_eq!(parsed.execution.gas_limit, None);
        assert_eq!(parsed.policy.liquidity_threshold_pct, 15);
    }

    #[test]
    fn test_serialization() {
        let config = BotConfig::testing();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"testing\""));

        let parsed: BotConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.cycle.journal_path, None);

        let production = BotConfig::production();
        let parsed: BotConfig = toml::from_str(&toml::to_string_pretty(&production).unwrap()).unwrap();
        assert_eq!(parsed, production);
    }

    #[test]
    fn test_journal_path_from_toml() {
        let parsed: BotConfig = toml::from_str("[cycle]\njournal_path = \"\"\n").unwrap();
        assert_eq!(parsed.cycle.journal_path, None);

        let parsed: BotConfig = toml::from_str("[cycle]\njournal_path = \"out/liq.jsonl\"\n").unwrap();
        assert_eq!(parsed.cycle.journal_path.as_deref(), Some("out/liq.jsonl"));

        let parsed: BotConfig = toml::from_str("[cycle]\ncycle_interval_secs = 5\n").unwrap();
        assert_eq!(parsed.cycle.journal_path.as_deref(), Some("liquidations.jsonl"));
    }
}
