//! Execution loop for liquidation transactions.
//!
//! Candidates are tried strictly one at a time: simulate, re-check the health
//! factor, submit and wait. A failed or timed out candidate advances the search.

use alloy::primitives::{Address, Bytes, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use liqbot_chain::{
    encode_liquidation_borrow, is_liquidatable, LendingPoolReader, LiquidationParams,
    TransactionSender,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::candidates::{CandidatePlans, SearchSpace};
use crate::error::LiquidationError;

/// Simulates and submits liquidation calls.
#[async_trait]
pub trait LiquidationExecutor: Send + Sync {
    /// Non-mutating call; a revert is an error.
    async fn simulate(&self, params: &LiquidationParams) -> Result<()>;

    /// Send and wait for the receipt; a reverted receipt is an error.
    async fn submit(&self, params: &LiquidationParams) -> Result<B256>;
}

/// Fresh health factor reads.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health_factor(&self, user: Address) -> Result<U256>;
}

#[async_trait]
impl HealthCheck for LendingPoolReader {
    async fn health_factor(&self, user: Address) -> Result<U256> {
        LendingPoolReader::health_factor(self, user).await
    }
}

/// Calls `liquidationBorrow` on the deployed liquidation contract.
#[derive(Debug)]
pub struct ContractExecutor {
    sender: Arc<TransactionSender>,
    contract: Address,
}

impl ContractExecutor {
    pub fn new(sender: Arc<TransactionSender>, contract: Address) -> Self {
        Self { sender, contract }
    }
}

#[async_trait]
impl LiquidationExecutor for ContractExecutor {
    async fn simulate(&self, params: &LiquidationParams) -> Result<()> {
        let calldata = encode_liquidation_borrow(params.clone());
        self.sender.simulate(self.contract, calldata).await?;
        Ok(())
    }

    async fn submit(&self, params: &LiquidationParams) -> Result<B256> {
        let calldata = encode_liquidation_borrow(params.clone());
        self.sender
            .send_transaction(self.contract, calldata, U256::ZERO)
            .await
    }
}

/// Why a liquidation was not submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Health factor was back at or above 1.0 before submission
    HealthRecovered { health_factor: U256 },
}

/// Terminal state of one user's execution loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Confirmed {
        tx_hash: B256,
        attempts: usize,
        params: LiquidationParams,
    },
    Skipped(SkipReason),
    /// Every candidate failed
    Exhausted { attempts: usize },
}

/// Search bounds and timeouts.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub max_divisor: u64,
    pub slippages_bps: Vec<u16>,
    pub simulate_timeout: Duration,
    pub submit_timeout: Duration,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_divisor: 66666,
            slippages_bps: (1..=9).map(|i| i * 100).collect(),
            simulate_timeout: Duration::from_secs(15),
            submit_timeout: Duration::from_secs(120),
        }
    }
}

/// Drives simulate / re-check / submit until success or exhaustion.
pub struct Liquidator {
    executor: Arc<dyn LiquidationExecutor>,
    health: Arc<dyn HealthCheck>,
    settings: ExecutionSettings,
}

impl Liquidator {
    pub fn new(
        executor: Arc<dyn LiquidationExecutor>,
        health: Arc<dyn HealthCheck>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            executor,
            health,
            settings,
        }
    }

    /// Read the user's health factor; `Some(hf)` if it is no longer liquidatable.
    ///
    /// Bounded by the simulation timeout.
    pub async fn recheck_health(&self, user: Address) -> Result<Option<U256>, LiquidationError> {
        let health_factor = with_timeout(
            "health_check",
            self.settings.simulate_timeout,
            self.health.health_factor(user),
        )
        .await?;
        if is_liquidatable(health_factor) {
            Ok(None)
        } else {
            info!(user = %user, health_factor = %health_factor, "Health factor recovered, skipping");
            Ok(Some(health_factor))
        }
    }

    /// Run the execution loop for a fully sized base plan.
    ///
    /// An empty path list stands for "no swap" and is tried as the empty path.
    #[instrument(skip_all, fields(user = %base.userToLiquidate))]
    pub async fn execute(
        &self,
        base: LiquidationParams,
        collateral_paths: Vec<Bytes>,
        borrow_paths: Vec<Bytes>,
    ) -> Result<ExecutionOutcome, LiquidationError> {
        if base.is_same_asset() {
            return self.execute_same_asset(base).await;
        }

        let space = SearchSpace {
            max_divisor: self.settings.max_divisor,
            slippages_bps: self.settings.slippages_bps.clone(),
            collateral_paths: non_empty(collateral_paths),
            borrow_paths: non_empty(borrow_paths),
        };
        let total = space.len();
        let start = Instant::now();
        info!(
            debt_to_cover = %base.debtToCover,
            candidates = total,
            "Starting liquidation search"
        );

        let mut attempts = 0;
        for candidate in CandidatePlans::new(base, space) {
            attempts = candidate.attempt;

            let simulated = with_timeout(
                "simulate",
                self.settings.simulate_timeout,
                self.executor.simulate(&candidate.params),
            )
            .await;
            if let Err(e) = simulated {
                debug!(
                    attempt = candidate.attempt,
                    divisor = candidate.divisor,
                    slippage_bps = candidate.slippage_bps,
                    error = %e,
                    "Candidate simulation failed"
                );
                continue;
            }

            if let Some(health_factor) = self.recheck_health(candidate.params.userToLiquidate).await? {
                return Ok(ExecutionOutcome::Skipped(SkipReason::HealthRecovered { health_factor }));
            }

            let submitted = with_timeout(
                "submit",
                self.settings.submit_timeout,
                self.executor.submit(&candidate.params),
            )
            .await;
            match submitted {
                Ok(tx_hash) => {
                    info!(
                        tx_hash = %tx_hash,
                        attempt = candidate.attempt,
                        divisor = candidate.divisor,
                        slippage_bps = candidate.slippage_bps,
                        debt_to_cover = %candidate.params.debtToCover,
                        elapsed_ms = start.elapsed().as_millis(),
                        "Liquidation confirmed"
                    );
                    return Ok(ExecutionOutcome::Confirmed {
                        tx_hash,
                        attempts,
                        params: candidate.params,
                    });
                }
                Err(e) => {
                    warn!(attempt = candidate.attempt, error = %e, "Submission failed, continuing search");
                }
            }
        }

        warn!(
            attempts,
            elapsed_ms = start.elapsed().as_millis(),
            "Liquidation search exhausted"
        );
        Ok(ExecutionOutcome::Exhausted { attempts })
    }

    /// Collateral, borrow and debt are one asset: exactly one attempt.
    async fn execute_same_asset(
        &self,
        params: LiquidationParams,
    ) -> Result<ExecutionOutcome, LiquidationError> {
        info!(debt_to_cover = %params.debtToCover, "Same-asset liquidation, single attempt");

        with_timeout(
            "simulate",
            self.settings.simulate_timeout,
            self.executor.simulate(&params),
        )
        .await
        .map_err(|e| LiquidationError::SameAssetFailed {
            reason: e.to_string(),
        })?;

        if let Some(health_factor) = self.recheck_health(params.userToLiquidate).await? {
            return Ok(ExecutionOutcome::Skipped(SkipReason::HealthRecovered { health_factor }));
        }

        let tx_hash = with_timeout(
            "submit",
            self.settings.submit_timeout,
            self.executor.submit(&params),
        )
        .await
        .map_err(|e| LiquidationError::SameAssetFailed {
            reason: e.to_string(),
        })?;

        info!(tx_hash = %tx_hash, "Liquidation confirmed");
        Ok(ExecutionOutcome::Confirmed {
            tx_hash,
            attempts: 1,
            params,
        })
    }
}

impl std::fmt::Debug for Liquidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Liquidator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn non_empty(paths: Vec<Bytes>) -> Vec<Bytes> {
    if paths.is_empty() {
        vec![Bytes::new()]
    } else {
        paths
    }
}

async fn with_timeout<T>(
    stage: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T, LiquidationError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(LiquidationError::from),
        Err(_) => Err(LiquidationError::Timeout {
            stage,
            timeout_ms: limit.as_millis(),
        }),
    }
}
