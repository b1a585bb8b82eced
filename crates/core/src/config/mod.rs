//! Configuration system for the liquidation bot.
//!
//! This module provides:
//! - Bot runtime configuration (profiles, policy constants, search bounds, timing)
//! - Deployment configuration (RPC endpoint, contract addresses, borrower feed)

mod bot;
mod deployment;

// Re-export bot config (main runtime config)
pub use bot::{BotConfig, CycleConfig, ExecutionConfig, PolicyConfig, ReaderConfig};

// Re-export deployment config
pub use deployment::{
    expand_env, load_deployment_from_env, BorrowerFeed, BorrowerFeedConfig, DeploymentConfig,
    DeploymentContracts, DeploymentDetails, ResolvedContracts, ResolvedDeployment,
    DEFAULT_DEPLOYMENT_PATH,
};
