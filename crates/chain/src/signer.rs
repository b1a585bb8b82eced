//! Transaction simulation and submission for liquidations.
//! Uses Alloy wallet providers; nonce, gas and fees come from the recommended fillers.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Signs, simulates and sends liquidation transactions.
pub struct TransactionSender {
    /// RPC URL for sending transactions
    rpc_url: String,
    /// Signer wallet
    wallet: EthereumWallet,
    /// Signer address
    pub address: Address,
    /// Chain ID
    chain_id: u64,
    /// Fixed gas limit; estimated by the node when unset
    gas_limit: Option<u64>,
}

/// Builder for TransactionSender.
pub struct TransactionSenderBuilder {
    rpc_url: String,
    chain_id: u64,
    gas_limit: Option<u64>,
}

impl TransactionSenderBuilder {
    /// Create a new builder.
    pub fn new(rpc_url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
            gas_limit: None,
        }
    }

    /// Set a custom gas limit.
    pub fn gas_limit(mut self, limit: u64) -> Self {
        self.gas_limit = Some(limit);
        self
    }

    /// Build the TransactionSender.
    pub fn build(self, private_key: &str) -> Result<TransactionSender> {
        // Parse private key (with or without 0x prefix)
        let key_str = private_key.trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str.parse()?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        info!(
            address = %address,
            chain_id = self.chain_id,
            gas_limit = ?self.gas_limit,
            "Transaction sender initialized"
        );

        Ok(TransactionSender {
            rpc_url: self.rpc_url,
            wallet,
            address,
            chain_id: self.chain_id,
            gas_limit: self.gas_limit,
        })
    }
}

impl TransactionSender {
    /// Create a new transaction sender from private key.
    pub fn new(private_key: &str, rpc_url: &str, chain_id: u64) -> Result<Self> {
        TransactionSenderBuilder::new(rpc_url, chain_id).build(private_key)
    }

    fn request(&self, to: Address, calldata: Bytes, value: U256) -> TransactionRequest {
        let tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(calldata)
            .with_value(value)
            .with_chain_id(self.chain_id);

        match self.gas_limit {
            Some(limit) => tx.with_gas_limit(limit),
            None => tx,
        }
    }

    /// Execute the call against the latest block without sending it.
    /// A revert is returned as an error.
    pub async fn simulate(&self, to: Address, calldata: Bytes) -> Result<Bytes> {
        let start = Instant::now();
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let tx = self.request(to, calldata, U256::ZERO);

        let result = provider.call(tx).await;
        debug!(
            to = %to,
            success = result.is_ok(),
            simulate_ms = start.elapsed().as_millis(),
            "Simulation finished"
        );
        Ok(result?)
    }

    /// Send a transaction and wait for confirmation.
    /// A reverted receipt is returned as an error.
    pub async fn send_transaction(
        &self,
        to: Address,
        calldata: Bytes,
        value: U256,
    ) -> Result<B256> {
        let total_start = Instant::now();

        debug!(
            to = %to,
            calldata_len = calldata.len(),
            value = %value,
            "Preparing transaction"
        );

        let tx = self.request(to, calldata, value);
        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.parse()?);

        let submit_start = Instant::now();
        let pending = provider.send_transaction(tx).await?;
        let tx_hash = *pending.tx_hash();
        let submit_elapsed = submit_start.elapsed();

        info!(
            tx_hash = %tx_hash,
            submit_ms = submit_elapsed.as_millis(),
            "Transaction submitted, waiting for confirmation"
        );

        let confirm_start = Instant::now();
        let receipt = pending.get_receipt().await?;
        let confirm_elapsed = confirm_start.elapsed();
        let total_elapsed = total_start.elapsed();

        if receipt.status() {
            info!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used = receipt.gas_used,
                confirm_ms = confirm_elapsed.as_millis(),
                total_ms = total_elapsed.as_millis(),
                "Transaction confirmed"
            );
            Ok(tx_hash)
        } else {
            warn!(
                tx_hash = %tx_hash,
                total_ms = total_elapsed.as_millis(),
                "Transaction reverted"
            );
            anyhow::bail!("Transaction reverted: {:?}", tx_hash)
        }
    }

    /// Get current native balance.
    pub async fn get_balance(&self) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let balance = provider.get_balance(self.address).await?;
        Ok(balance)
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .field("gas_limit", &self.gas_limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (DO NOT USE IN PRODUCTION)
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_sender_address_from_key() {
        let sender = TransactionSender::new(DEV_KEY, "http://localhost:8545", 31337).unwrap();
        assert_eq!(
            format!("{:?}", sender.address).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert!(format!("{sender:?}").contains("chain_id: 31337"));
    }

    #[test]
    fn test_request_applies_gas_limit() {
        let sender = TransactionSenderBuilder::new("http://localhost:8545", 1)
            .gas_limit(1_600_000)
            .build(DEV_KEY.trim_start_matches("0x"))
            .unwrap();
        let tx = sender.request(Address::ZERO, Bytes::new(), U256::ZERO);
        assert_eq!(tx.gas, Some(1_600_000));
        assert_eq!(tx.from, Some(sender.address));
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(TransactionSender::new("0xdeadbeef", "http://localhost:8545", 1).is_err());
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_simulate_against_node() {
        let sender = TransactionSender::new(DEV_KEY, "http://localhost:8545", 31337).unwrap();
        let result = sender.simulate(Address::ZERO, Bytes::new()).await;
        assert!(result.is_ok());
    }
}
