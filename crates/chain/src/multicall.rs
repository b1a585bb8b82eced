//! Batched contract reads through the Multicall3 aggregator.
//!
//! Every protocol read goes through the [`BatchReader`] capability:
//! - `aggregate`: atomic, a single revert fails the whole batch (mandatory protocol state)
//! - `try_aggregate`: per-call allow-failure (optional data such as pool lookups and quotes)
//!
//! Large fan-outs use [`aggregate_chunked`], which keeps going when one chunk fails.

use alloy::primitives::{Address, Bytes};
use alloy::providers::ProviderBuilder;
use alloy::sol;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, warn};

sol! {
    /// Multicall3 aggregator (subset)
    #[sol(rpc)]
    interface IMulticall3 {
        struct Call {
            address target;
            bytes callData;
        }

        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Call3Result {
            bool success;
            bytes returnData;
        }

        function aggregate(Call[] calldata calls)
            external
            payable
            returns (uint256 blockNumber, bytes[] memory returnData);

        function aggregate3(Call3[] calldata calls)
            external
            payable
            returns (Call3Result[] memory returnData);
    }
}

/// Default number of calls per round trip for large fan-outs.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// A single read: target contract plus ABI-encoded calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCall {
    pub target: Address,
    pub call_data: Bytes,
}

impl BatchCall {
    /// Create a call from raw calldata.
    pub fn new(target: Address, call_data: impl Into<Bytes>) -> Self {
        Self {
            target,
            call_data: call_data.into(),
        }
    }

    /// Create a call from a typed `sol!` call.
    pub fn encode<C: SolCall>(target: Address, call: &C) -> Self {
        Self::new(target, call.abi_encode())
    }
}

/// Per-call outcome of a non-atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub success: bool,
    pub return_data: Bytes,
}

impl CallResult {
    /// Decode the return data of a successful call.
    /// `None` if the call reverted or the data does not match the ABI.
    pub fn decode<C: SolCall>(&self) -> Option<C::Return> {
        if !self.success {
            return None;
        }
        C::abi_decode_returns(&self.return_data, true).ok()
    }
}

/// Decode return data of an atomic batch slot.
pub fn decode_return<C: SolCall>(data: &[u8]) -> Result<C::Return> {
    C::abi_decode_returns(data, true)
        .with_context(|| format!("failed to decode {} return data", C::SIGNATURE))
}

/// Capability for coalescing many reads into one round trip.
#[async_trait]
pub trait BatchReader: Send + Sync {
    /// Execute all calls atomically. Any revert fails the whole batch.
    async fn aggregate(&self, calls: Vec<BatchCall>) -> Result<Vec<Bytes>>;

    /// Execute all calls, tolerating individual failures.
    async fn try_aggregate(&self, calls: Vec<BatchCall>) -> Result<Vec<CallResult>>;
}

/// Failure of one chunk in a chunked fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkError {
    /// Zero-based index of the failed chunk
    pub batch_index: usize,
    /// Error message
    pub error: String,
}

/// Result of a chunked fan-out.
#[derive(Debug, Default)]
pub struct ChunkedResult {
    /// One slot per input call, `None` where the chunk failed
    pub results: Vec<Option<Bytes>>,
    /// Chunk-level errors
    pub errors: Vec<ChunkError>,
}

impl ChunkedResult {
    /// Number of call slots that have data.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }
}

/// Split `calls` into chunks of `chunk_size` and aggregate each atomically.
///
/// Chunks run sequentially. A failed chunk leaves its slots empty and is
/// recorded in `errors`; the remaining chunks still run.
pub async fn aggregate_chunked<R: BatchReader + ?Sized>(
    reader: &R,
    calls: Vec<BatchCall>,
    chunk_size: usize,
) -> ChunkedResult {
    let chunk_size = chunk_size.max(1);
    let mut results: Vec<Option<Bytes>> = Vec::with_capacity(calls.len());
    let mut errors = Vec::new();

    for (batch_index, chunk) in calls.chunks(chunk_size).enumerate() {
        match reader.aggregate(chunk.to_vec()).await {
            Ok(data) if data.len() == chunk.len() => {
                results.extend(data.into_iter().map(Some));
            }
            Ok(data) => {
                let error = format!("expected {} results, got {}", chunk.len(), data.len());
                warn!(batch_index, error = %error, "Batch returned wrong result count");
                errors.push(ChunkError { batch_index, error });
                results.resize(results.len() + chunk.len(), None);
            }
            Err(e) => {
                warn!(batch_index, error = %e, "Batch read failed, continuing with next chunk");
                errors.push(ChunkError {
                    batch_index,
                    error: e.to_string(),
                });
                results.resize(results.len() + chunk.len(), None);
            }
        }
    }

    ChunkedResult { results, errors }
}

/// [`BatchReader`] backed by a deployed Multicall3 contract.
#[derive(Debug, Clone)]
pub struct Multicall3Reader {
    /// RPC URL for reads
    rpc_url: String,
    /// Multicall3 address
    address: Address,
}

impl Multicall3Reader {
    /// Create a reader against the Multicall3 at `address`.
    pub fn new(rpc_url: impl Into<String>, address: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            address,
        }
    }

    /// Multicall3 address.
    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
impl BatchReader for Multicall3Reader {
    async fn aggregate(&self, calls: Vec<BatchCall>) -> Result<Vec<Bytes>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let count = calls.len();
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let multicall = IMulticall3::new(self.address, &provider);

        let calls: Vec<IMulticall3::Call> = calls
            .into_iter()
            .map(|c| IMulticall3::Call {
                target: c.target,
                callData: c.call_data,
            })
            .collect();

        let result = multicall
            .aggregate(calls)
            .call()
            .await
            .context("multicall aggregate failed")?;

        debug!(
            calls = count,
            block = %result.blockNumber,
            elapsed_ms = start.elapsed().as_millis(),
            "Aggregate read complete"
        );

        Ok(result.returnData)
    }

    async fn try_aggregate(&self, calls: Vec<BatchCall>) -> Result<Vec<CallResult>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let count = calls.len();
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let multicall = IMulticall3::new(self.address, &provider);

        let calls: Vec<IMulticall3::Call3> = calls
            .into_iter()
            .map(|c| IMulticall3::Call3 {
                target: c.target,
                allowFailure: true,
                callData: c.call_data,
            })
            .collect();

        let result = multicall
            .aggregate3(calls)
            .call()
            .await
            .context("multicall aggregate3 failed")?;

        let results: Vec<CallResult> = result
            .returnData
            .into_iter()
            .map(|r| CallResult {
                success: r.success,
                return_data: r.returnData,
            })
            .collect();

        debug!(
            calls = count,
            failed = results.iter().filter(|r| !r.success).count(),
            elapsed_ms = start.elapsed().as_millis(),
            "Aggregate3 read complete"
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::IERC20;
    use crate::testing::MockChain;
    use alloy::primitives::U256;
    use alloy::sol_types::SolValue;

    fn balance_call(token: Address, holder: Address) -> BatchCall {
        BatchCall::encode(token, &IERC20::balanceOfCall { account: holder })
    }

    #[tokio::test]
    async fn test_chunked_continues_after_failed_chunk() {
        let token = Address::repeat_byte(0x11);
        let mut chain = MockChain::new();
        let holders: Vec<Address> = (1..=25u8).map(Address::repeat_byte).collect();

        for (i, holder) in holders.iter().enumerate() {
            // Holder 13 reverts, which poisons the second chunk (slots 10..20)
            if i == 12 {
                chain.revert_call(token, &IERC20::balanceOfCall { account: *holder });
            } else {
                chain.on_call(
                    token,
                    &IERC20::balanceOfCall { account: *holder },
                    (U256::from(i as u64 + 1),).abi_encode_params(),
                );
            }
        }

        let calls: Vec<BatchCall> = holders.iter().map(|h| balance_call(token, *h)).collect();
        let chunked = aggregate_chunked(&chain, calls, 10).await;

        assert_eq!(chunked.results.len(), 25);
        assert_eq!(chunked.errors.len(), 1);
        assert_eq!(chunked.errors[0].batch_index, 1);
        assert_eq!(chunked.succeeded(), 15);
        assert!(chunked.results[..10].iter().all(|r| r.is_some()));
        assert!(chunked.results[10..20].iter().all(|r| r.is_none()));
        assert!(chunked.results[20..].iter().all(|r| r.is_some()));

        let first = decode_return::<IERC20::balanceOfCall>(chunked.results[0].as_ref().unwrap())
            .unwrap();
        assert_eq!(first._0, U256::from(1u64));
        assert_eq!(chain.aggregate_batches(), vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_chunked_empty_issues_no_request() {
        let chain = MockChain::new();
        let chunked = aggregate_chunked(&chain, Vec::new(), DEFAULT_BATCH_SIZE).await;
        assert!(chunked.results.is_empty());
        assert!(chunked.errors.is_empty());
        assert!(chain.aggregate_batches().is_empty());
    }

    #[tokio::test]
    async fn test_try_aggregate_tolerates_failures() {
        let token = Address::repeat_byte(0x22);
        let good = Address::repeat_byte(1);
        let bad = Address::repeat_byte(2);
        let mut chain = MockChain::new();
        chain.on_call(token, &IERC20::balanceOfCall { account: good }, (U256::from(7u64),).abi_encode_params());

        let results = chain
            .try_aggregate(vec![balance_call(token, good), balance_call(token, bad)])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].decode::<IERC20::balanceOfCall>().map(|r| r._0),
            Some(U256::from(7u64))
        );
        assert!(!results[1].success);
        assert!(results[1].decode::<IERC20::balanceOfCall>().is_none());
    }

    #[tokio::test]
    async fn test_aggregate_is_atomic() {
        let token = Address::repeat_byte(0x33);
        let good = Address::repeat_byte(1);
        let bad = Address::repeat_byte(2);
        let mut chain = MockChain::new();
        chain.on_call(token, &IERC20::balanceOfCall { account: good }, (U256::from(7u64),).abi_encode_params());

        let result = chain
            .aggregate(vec![balance_call(token, good), balance_call(token, bad)])
            .await;
        assert!(result.is_err());
    }
}
