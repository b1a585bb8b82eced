//! Uniswap V3 route discovery.
//!
//! Pool existence is checked through the factory and outputs are quoted
//! through the Quoter, both in allow-failure multicall batches: a fee tier
//! without a pool or a reverting quote is expected, not an error.

use super::{sort_routes, RouteFinder, RouteKind, SwapRoute};
use alloy::primitives::{Address, Bytes, Uint, U160, U256};
use anyhow::{bail, Result};
use arrayvec::ArrayVec;
use async_trait::async_trait;
use liqbot_chain::contracts::{IQuoter, IUniswapV3Factory};
use liqbot_chain::{BatchCall, BatchReader, CallResult};
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Fee tiers probed by default: 0.05%, 0.3%, 1%.
pub const DEFAULT_FEE_TIERS: [u32; 3] = [500, 3000, 10000];

const MAX_FEE: u32 = 0xFF_FFFF;

/// Longest supported path: three tokens and two fees.
pub const MAX_PATH_LEN: usize = 20 + 3 + 20 + 3 + 20;

/// Pack `tokens` and `fees` into a Uniswap V3 path.
///
/// Expects `tokens.len() == fees.len() + 1` and at most two hops.
pub fn encode_path(tokens: &[Address], fees: &[u32]) -> Result<Bytes> {
    if tokens.len() != fees.len() + 1 {
        bail!(
            "path needs one more token than fees, got {} tokens and {} fees",
            tokens.len(),
            fees.len()
        );
    }

    let mut path: ArrayVec<u8, MAX_PATH_LEN> = ArrayVec::new();
    for (i, token) in tokens.iter().enumerate() {
        path.try_extend_from_slice(token.as_slice())?;
        if let Some(fee) = fees.get(i) {
            if *fee > MAX_FEE {
                bail!("fee tier {fee} does not fit in uint24");
            }
            path.try_extend_from_slice(&fee.to_be_bytes()[1..])?;
        }
    }

    Ok(Bytes::copy_from_slice(&path))
}

/// Uniswap V3 route finder over a [`BatchReader`].
#[derive(Clone)]
pub struct UniswapV3RouteFinder {
    reader: Arc<dyn BatchReader>,
    factory: Address,
    quoter: Address,
    /// Intermediate token for two-hop routes (wrapped native asset)
    base_asset: Address,
    fee_tiers: SmallVec<[u32; 4]>,
}

impl std::fmt::Debug for UniswapV3RouteFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniswapV3RouteFinder")
            .field("factory", &self.factory)
            .field("quoter", &self.quoter)
            .field("base_asset", &self.base_asset)
            .field("fee_tiers", &self.fee_tiers)
            .finish()
    }
}

impl UniswapV3RouteFinder {
    pub fn new(
        reader: Arc<dyn BatchReader>,
        factory: Address,
        quoter: Address,
        base_asset: Address,
    ) -> Self {
        Self {
            reader,
            factory,
            quoter,
            base_asset,
            fee_tiers: SmallVec::from_slice(&DEFAULT_FEE_TIERS),
        }
    }

    /// Override the probed fee tiers. Tiers that do not fit in uint24 are dropped.
    pub fn with_fee_tiers(mut self, fee_tiers: &[u32]) -> Self {
        self.fee_tiers = fee_tiers
            .iter()
            .copied()
            .filter(|fee| {
                let valid = *fee <= MAX_FEE;
                if !valid {
                    warn!(fee, "Ignoring fee tier outside uint24");
                }
                valid
            })
            .collect();
        self
    }

    fn get_pool_call(&self, token_a: Address, token_b: Address, fee: u32) -> BatchCall {
        BatchCall::encode(
            self.factory,
            &IUniswapV3Factory::getPoolCall {
                tokenA: token_a,
                tokenB: token_b,
                fee: Uint::<24, 1>::from(fee),
            },
        )
    }

    /// Tiers from `fee_tiers` whose `getPool` result is a deployed pool.
    fn existing_tiers(&self, results: &[CallResult]) -> SmallVec<[u32; 4]> {
        self.fee_tiers
            .iter()
            .zip(results)
            .filter_map(|(fee, result)| {
                let pool = result.decode::<IUniswapV3Factory::getPoolCall>()?.pool;
                (pool != Address::ZERO).then_some(*fee)
            })
            .collect()
    }

    /// Direct routes for every tier with a pool.
    async fn direct_routes(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<Vec<SwapRoute>> {
        let calls = self
            .fee_tiers
            .iter()
            .map(|fee| self.get_pool_call(token_in, token_out, *fee))
            .collect();
        let pools = self.reader.try_aggregate(calls).await?;
        let tiers = self.existing_tiers(&pools);
        if tiers.is_empty() {
            return Ok(Vec::new());
        }

        let quote_calls = tiers
            .iter()
            .map(|fee| {
                BatchCall::encode(
                    self.quoter,
                    &IQuoter::quoteExactInputSingleCall {
                        tokenIn: token_in,
                        tokenOut: token_out,
                        fee: Uint::<24, 1>::from(*fee),
                        amountIn: amount_in,
                        sqrtPriceLimitX96: U160::ZERO,
                    },
                )
            })
            .collect();
        let quotes = self.reader.try_aggregate(quote_calls).await?;

        let mut routes = Vec::with_capacity(tiers.len());
        for (i, fee) in tiers.iter().enumerate() {
            let output = quotes
                .get(i)
                .and_then(|q| q.decode::<IQuoter::quoteExactInputSingleCall>())
                .map(|q| q.amountOut);
            if output.is_none() {
                debug!(fee, "Direct quote failed, keeping route as fallback");
            }
            routes.push(SwapRoute {
                kind: RouteKind::Direct,
                fees: smallvec![*fee],
                encoded_path: encode_path(&[token_in, token_out], &[*fee])?,
                output,
            });
        }
        Ok(routes)
    }

    /// Two-hop routes through the base asset.
    async fn multi_hop_routes(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<Vec<SwapRoute>> {
        if token_in == self.base_asset || token_out == self.base_asset {
            return Ok(Vec::new());
        }

        let calls = self
            .fee_tiers
            .iter()
            .map(|fee| self.get_pool_call(token_in, self.base_asset, *fee))
            .chain(
                self.fee_tiers
                    .iter()
                    .map(|fee| self.get_pool_call(self.base_asset, token_out, *fee)),
            )
            .collect();
        let pools = self.reader.try_aggregate(calls).await?;
        let split = self.fee_tiers.len().min(pools.len());
        let (first_leg, second_leg) = pools.split_at(split);
        let first_tiers = self.existing_tiers(first_leg);
        let second_tiers = self.existing_tiers(second_leg);

        let mut routes = Vec::with_capacity(first_tiers.len() * second_tiers.len());
        for fee1 in &first_tiers {
            for fee2 in &second_tiers {
                routes.push(SwapRoute {
                    kind: RouteKind::MultiHop,
                    fees: smallvec![*fee1, *fee2],
                    encoded_path: encode_path(
                        &[token_in, self.base_asset, token_out],
                        &[*fee1, *fee2],
                    )?,
                    output: None,
                });
            }
        }
        if routes.is_empty() {
            return Ok(routes);
        }

        let quote_calls = routes
            .iter()
            .map(|r| {
                BatchCall::encode(
                    self.quoter,
                    &IQuoter::quoteExactInputCall {
                        path: r.encoded_path.clone(),
                        amountIn: amount_in,
                    },
                )
            })
            .collect();
        let quotes = self.reader.try_aggregate(quote_calls).await?;
        for (route, quote) in routes.iter_mut().zip(&quotes) {
            route.output = quote
                .decode::<IQuoter::quoteExactInputCall>()
                .map(|q| q.amountOut);
        }

        Ok(routes)
    }
}

#[async_trait]
impl RouteFinder for UniswapV3RouteFinder {
    fn router_id(&self) -> &str {
        "uniswap-v3"
    }

    async fn find_routes(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<Vec<SwapRoute>> {
        if token_in == token_out {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let (direct, multi_hop) = tokio::join!(
            self.direct_routes(token_in, token_out, amount_in),
            self.multi_hop_routes(token_in, token_out, amount_in)
        );

        let mut routes = direct?;
        routes.extend(multi_hop?);
        sort_routes(&mut routes);

        debug!(
            token_in = %token_in,
            token_out = %token_out,
            amount_in = %amount_in,
            routes = routes.len(),
            best_output = ?routes.first().and_then(|r| r.output),
            elapsed_ms = start.elapsed().as_millis(),
            "Swap routes found"
        );
        Ok(routes)
    }
}
