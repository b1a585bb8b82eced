//! Liquidation bot chain interaction layer.
//!
//! This crate provides:
//! - The [`BatchReader`] capability and its Multicall3 implementation
//! - Contract bindings for the lending pool, tokens, Uniswap V3 and the liquidation contract
//! - The lending pool reader and the packed configuration codecs
//! - Provider management and transaction simulation/sending
//!
//! Every protocol read goes through a [`BatchReader`], so callers can be tested
//! against an in-memory chain (`testing::MockChain`, behind the `test-utils` feature).

pub mod contracts;
pub mod multicall;
pub mod protocol;
mod provider;
mod signer;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use contracts::{encode_liquidation_borrow, LiquidationParams};
pub use multicall::{
    aggregate_chunked, decode_return, BatchCall, BatchReader, CallResult, ChunkError,
    ChunkedResult, Multicall3Reader, DEFAULT_BATCH_SIZE,
};
pub use protocol::{
    is_liquidatable, AccountData, LendingPoolReader, ProviderCapital, RawBalance, Reserve,
    ReserveConfiguration, UserBalances, UserConfiguration, HEALTH_FACTOR_LIQUIDATION_THRESHOLD,
};
pub use provider::ProviderManager;
pub use signer::{TransactionSender, TransactionSenderBuilder};
