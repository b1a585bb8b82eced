//! Read-only RPC access.
//! Uses Alloy HTTP providers, one per call.

use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result};
use tracing::info;

/// Verified read endpoint.
#[derive(Debug, Clone)]
pub struct ProviderManager {
    /// Chain ID reported by the node
    chain_id: u64,
}

impl ProviderManager {
    /// Connect to `rpc_url` and verify the node answers.
    pub async fn new(rpc_url: &str) -> Result<Self> {
        info!(rpc = rpc_url, "Initializing provider manager");

        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let block = provider
            .get_block_number()
            .await
            .with_context(|| format!("RPC endpoint {rpc_url} is unreachable"))?;
        let chain_id = provider.get_chain_id().await?;
        info!(block = block, chain_id = chain_id, "Provider connection verified");

        Ok(Self { chain_id })
    }

    /// Chain ID observed at connection time.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}
