//! Deployment configuration: chain, RPC endpoint, contract addresses and borrower feed.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Default deployment file, relative to the working directory.
pub const DEFAULT_DEPLOYMENT_PATH: &str = "config/deployment.toml";

/// Deployment file as written on disk. String values may contain `${VAR}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Deployment metadata
    pub deployment: DeploymentDetails,
    /// Contract addresses
    pub contracts: DeploymentContracts,
    /// Candidate borrower feed
    #[serde(default)]
    pub borrowers: BorrowerFeedConfig,
}

/// Deployment details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentDetails {
    /// Deployment name (e.g., "op-mainnet")
    pub name: String,
    /// Expected chain ID; checked against the node at startup
    pub chain_id: u64,
    /// HTTP JSON-RPC endpoint
    pub rpc_url: String,
}

/// Contract addresses, unparsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentContracts {
    pub lending_pool: String,
    /// Multicall3 aggregator
    pub multicall: String,
    /// Liquidation contract exposing `liquidationBorrow`
    pub liquidation_bot: String,
    /// Account whose capital funds liquidations
    pub asset_provider: String,
    pub uniswap_router: String,
    pub uniswap_factory: String,
    pub uniswap_quoter: String,
    /// Wrapped native asset, the hub of multi-hop routes
    pub base_asset: String,
}

/// Where candidate borrowers come from. With neither set, the `BORROWERS`
/// environment variable is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BorrowerFeedConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
}

/// Deployment with environment expanded and addresses parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDeployment {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub contracts: ResolvedContracts,
    pub borrowers: BorrowerFeed,
}

/// Parsed contract addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedContracts {
    pub lending_pool: Address,
    pub multicall: Address,
    pub liquidation_bot: Address,
    pub asset_provider: Address,
    pub uniswap_router: Address,
    pub uniswap_factory: Address,
    pub uniswap_quoter: Address,
    pub base_asset: Address,
}

/// Resolved borrower feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BorrowerFeed {
    Http(String),
    File(String),
    Env,
}

impl DeploymentConfig {
    /// Load deployment config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read deployment file {}", path.display()))?;
        let config: DeploymentConfig = toml::from_str(&content)
            .with_context(|| format!("invalid deployment file {}", path.display()))?;
        Ok(config)
    }

    /// Expand environment variables and parse every address.
    pub fn resolve(&self) -> Result<ResolvedDeployment> {
        let c = &self.contracts;
        let contracts = ResolvedContracts {
            lending_pool: parse_address("lending_pool", &c.lending_pool)?,
            multicall: parse_address("multicall", &c.multicall)?,
            liquidation_bot: parse_address("liquidation_bot", &c.liquidation_bot)?,
            asset_provider: parse_address("asset_provider", &c.asset_provider)?,
            uniswap_router: parse_address("uniswap_router", &c.uniswap_router)?,
            uniswap_factory: parse_address("uniswap_factory", &c.uniswap_factory)?,
            uniswap_quoter: parse_address("uniswap_quoter", &c.uniswap_quoter)?,
            base_asset: parse_address("base_asset", &c.base_asset)?,
        };

        let borrowers = match (&self.borrowers.url, &self.borrowers.file) {
            (Some(url), _) => BorrowerFeed::Http(expand_env(url)),
            (None, Some(file)) => BorrowerFeed::File(expand_env(file)),
            (None, None) => BorrowerFeed::Env,
        };

        Ok(ResolvedDeployment {
            name: self.deployment.name.clone(),
            chain_id: self.deployment.chain_id,
            rpc_url: expand_env(&self.deployment.rpc_url),
            contracts,
            borrowers,
        })
    }
}

impl ResolvedDeployment {
    /// Log the resolved deployment. The RPC URL is not logged, it often carries a key.
    pub fn log(&self) {
        info!(
            deployment = %self.name,
            chain_id = self.chain_id,
            lending_pool = %self.contracts.lending_pool,
            liquidation_bot = %self.contracts.liquidation_bot,
            asset_provider = %self.contracts.asset_provider,
            base_asset = %self.contracts.base_asset,
            borrowers = ?self.borrowers,
            "Deployment loaded"
        );
    }
}

/// Load and resolve the deployment named by `DEPLOYMENT`, or the default path.
pub fn load_deployment_from_env() -> Result<ResolvedDeployment> {
    let path = std::env::var("DEPLOYMENT").unwrap_or_else(|_| DEFAULT_DEPLOYMENT_PATH.to_string());
    DeploymentConfig::from_file(&path)?.resolve()
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    let expanded = expand_env(value);
    expanded
        .trim()
        .parse()
        .with_context(|| format!("invalid address for contracts.{field}: {expanded}"))
}

/// Expand ${VAR_NAME} patterns with environment variable values.
/// Unset variables are left as written.
pub fn expand_env(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };
    let mut result = s.to_string();

    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    result
}
