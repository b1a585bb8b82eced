//! Batched reads of lending pool state.
//!
//! Mandatory protocol state (reserve list, reserve data, prices, user
//! configurations, account snapshots) is read atomically: partial protocol
//! state is never returned. Only the borrower balance fan-out is chunked and
//! allowed to fail partially.

use alloy::primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{
    AccountData, ProviderCapital, RawBalance, Reserve, ReserveConfiguration, UserBalances,
    UserConfiguration, MAX_DECIMALS,
};
use crate::contracts::{ILendingPool, IPriceSource, IERC20};
use crate::multicall::{
    aggregate_chunked, decode_return, BatchCall, BatchReader, DEFAULT_BATCH_SIZE,
};

/// Reads protocol state through a [`BatchReader`].
#[derive(Clone)]
pub struct LendingPoolReader {
    reader: Arc<dyn BatchReader>,
    lending_pool: Address,
    batch_size: usize,
}

impl std::fmt::Debug for LendingPoolReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LendingPoolReader")
            .field("lending_pool", &self.lending_pool)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl LendingPoolReader {
    pub fn new(reader: Arc<dyn BatchReader>, lending_pool: Address) -> Self {
        Self {
            reader,
            lending_pool,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Calls per chunk for the balance fan-out.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Reserve assets in protocol index order.
    pub async fn reserves_list(&self) -> Result<Vec<Address>> {
        let call = BatchCall::encode(self.lending_pool, &ILendingPool::getReservesListCall {});
        let data = self
            .reader
            .aggregate(vec![call])
            .await
            .context("failed to read reserve list")?;

        let Some(raw) = data.first() else {
            bail!("reserve list read returned no data");
        };
        let list = decode_return::<ILendingPool::getReservesListCall>(raw)?._0;

        debug!(reserves = list.len(), "Reserve list loaded");
        Ok(list)
    }

    /// Reserve data and prices for `assets`, in the same order.
    ///
    /// Prices are read from each reserve's aToken, which exposes `getAssetPrice()`.
    pub async fn reserves(&self, assets: &[Address]) -> Result<Vec<Reserve>> {
        let start = Instant::now();

        let calls = assets
            .iter()
            .map(|asset| {
                BatchCall::encode(
                    self.lending_pool,
                    &ILendingPool::getReserveDataCall { asset: *asset },
                )
            })
            .collect();
        let data = self
            .reader
            .aggregate(calls)
            .await
            .context("failed to read reserve data")?;
        ensure_len(&data, assets.len(), "getReserveData")?;

        let mut reserves = Vec::with_capacity(assets.len());
        for (asset, raw) in assets.iter().zip(&data) {
            let decoded = decode_return::<ILendingPool::getReserveDataCall>(raw)?;
            reserves.push(Reserve {
                asset: *asset,
                id: decoded.id,
                configuration: ReserveConfiguration::decode(decoded.configuration),
                a_token: decoded.aTokenAddress,
                stable_debt_token: decoded.stableDebtTokenAddress,
                variable_debt_token: decoded.variableDebtTokenAddress,
                asset_price_wad: U256::ZERO,
            });
        }

        let price_calls = reserves
            .iter()
            .map(|r| BatchCall::encode(r.a_token, &IPriceSource::getAssetPriceCall {}))
            .collect();
        let prices = self
            .reader
            .aggregate(price_calls)
            .await
            .context("failed to read asset prices")?;
        ensure_len(&prices, reserves.len(), "getAssetPrice")?;

        for (reserve, raw) in reserves.iter_mut().zip(&prices) {
            reserve.asset_price_wad = decode_return::<IPriceSource::getAssetPriceCall>(raw)?._0;
        }

        // Kept in the list so bitmap indices stay aligned; a zero price values it at nothing
        for reserve in reserves.iter_mut().filter(|r| r.decimals() > MAX_DECIMALS) {
            warn!(
                asset = %reserve.asset,
                decimals = reserve.decimals(),
                "Unsupported reserve decimals, pricing at zero"
            );
            reserve.asset_price_wad = U256::ZERO;
        }

        info!(
            reserves = reserves.len(),
            frozen = reserves.iter().filter(|r| r.is_frozen()).count(),
            elapsed_ms = start.elapsed().as_millis(),
            "Reserves loaded"
        );
        Ok(reserves)
    }

    /// Configuration bitmap per user.
    pub async fn user_configurations(
        &self,
        users: &[Address],
    ) -> Result<BTreeMap<Address, UserConfiguration>> {
        let calls = users
            .iter()
            .map(|user| {
                BatchCall::encode(
                    self.lending_pool,
                    &ILendingPool::getUserConfigurationCall { user: *user },
                )
            })
            .collect();
        let data = self
            .reader
            .aggregate(calls)
            .await
            .context("failed to read user configurations")?;
        ensure_len(&data, users.len(), "getUserConfiguration")?;

        let mut configs = BTreeMap::new();
        for (user, raw) in users.iter().zip(&data) {
            let word = decode_return::<ILendingPool::getUserConfigurationCall>(raw)?._0;
            configs.insert(*user, UserConfiguration::decode(word));
        }
        Ok(configs)
    }

    /// Account snapshot per user.
    pub async fn account_data(&self, users: &[Address]) -> Result<BTreeMap<Address, AccountData>> {
        let calls = users
            .iter()
            .map(|user| self.account_data_call(*user))
            .collect();
        let data = self
            .reader
            .aggregate(calls)
            .await
            .context("failed to read account data")?;
        ensure_len(&data, users.len(), "getUserAccountData")?;

        let mut accounts = BTreeMap::new();
        for (user, raw) in users.iter().zip(&data) {
            accounts.insert(*user, decode_account_data(raw)?);
        }
        Ok(accounts)
    }

    /// Current health factor of one user.
    pub async fn health_factor(&self, user: Address) -> Result<U256> {
        let data = self
            .reader
            .aggregate(vec![self.account_data_call(user)])
            .await
            .with_context(|| format!("failed to read health factor of {user}"))?;
        let Some(raw) = data.first() else {
            bail!("health factor read returned no data");
        };
        Ok(decode_account_data(raw)?.health_factor)
    }

    /// aToken and variable debt balances for every (reserve, user) pair.
    ///
    /// Issued in chunks of `batch_size`. Users touched by a failed chunk are
    /// reported in `incomplete` and left out of `balances`.
    pub async fn user_balances(&self, users: &[Address], reserves: &[Reserve]) -> UserBalances {
        let start = Instant::now();

        let mut calls = Vec::with_capacity(reserves.len() * users.len() * 2);
        for reserve in reserves {
            for user in users {
                let balance_of = IERC20::balanceOfCall { account: *user };
                calls.push(BatchCall::encode(reserve.a_token, &balance_of));
                calls.push(BatchCall::encode(reserve.variable_debt_token, &balance_of));
            }
        }

        let chunked = aggregate_chunked(self.reader.as_ref(), calls, self.batch_size).await;
        let slots_read = chunked.succeeded();

        let mut result = UserBalances {
            errors: chunked.errors,
            ..UserBalances::default()
        };
        let mut slots = chunked.results.chunks(2);

        for reserve in reserves {
            for user in users {
                let pair = slots.next().unwrap_or(&[]);
                let collateral = pair.first().and_then(Option::as_ref).map(|b| decode_balance(b));
                let debt = pair.get(1).and_then(Option::as_ref).map(|b| decode_balance(b));

                match (collateral, debt) {
                    (Some(Ok(collateral)), Some(Ok(debt))) => {
                        result
                            .balances
                            .entry(*user)
                            .or_default()
                            .insert(reserve.asset, RawBalance { collateral, debt });
                    }
                    _ => {
                        result.incomplete.insert(*user);
                    }
                }
            }
        }

        for user in &result.incomplete {
            result.balances.remove(user);
        }

        if !result.errors.is_empty() {
            warn!(
                failed_chunks = result.errors.len(),
                incomplete_users = result.incomplete.len(),
                "Balance read partially failed"
            );
        }
        info!(
            users = users.len(),
            reserves = reserves.len(),
            complete_users = result.balances.len(),
            slots_read,
            elapsed_ms = start.elapsed().as_millis(),
            "Balances loaded"
        );
        result
    }

    /// Underlying tokens held by each reserve's aToken, i.e. borrowable liquidity.
    pub async fn pool_liquidity(&self, reserves: &[Reserve]) -> Result<BTreeMap<Address, U256>> {
        let calls = reserves
            .iter()
            .map(|r| BatchCall::encode(r.asset, &IERC20::balanceOfCall { account: r.a_token }))
            .collect();
        let data = self
            .reader
            .aggregate(calls)
            .await
            .context("failed to read pool liquidity")?;
        ensure_len(&data, reserves.len(), "pool balanceOf")?;

        let mut liquidity = BTreeMap::new();
        for (reserve, raw) in reserves.iter().zip(&data) {
            liquidity.insert(reserve.asset, decode_balance(raw)?);
        }
        Ok(liquidity)
    }

    /// aToken balances and account snapshot of the asset provider.
    pub async fn provider_capital(
        &self,
        reserves: &[Reserve],
        asset_provider: Address,
    ) -> Result<ProviderCapital> {
        let mut calls: Vec<BatchCall> = reserves
            .iter()
            .map(|r| {
                BatchCall::encode(
                    r.a_token,
                    &IERC20::balanceOfCall {
                        account: asset_provider,
                    },
                )
            })
            .collect();
        calls.push(self.account_data_call(asset_provider));

        let data = self
            .reader
            .aggregate(calls)
            .await
            .context("failed to read asset provider capital")?;
        ensure_len(&data, reserves.len() + 1, "asset provider reads")?;

        let (balances_raw, account_raw) = data.split_at(reserves.len());
        let mut balances = BTreeMap::new();
        for (reserve, raw) in reserves.iter().zip(balances_raw) {
            balances.insert(reserve.asset, decode_balance(raw)?);
        }
        let account = decode_account_data(&account_raw[0])?;

        debug!(
            provider = %asset_provider,
            available_borrows = %account.available_borrows,
            "Asset provider capital loaded"
        );
        Ok(ProviderCapital { balances, account })
    }

    fn account_data_call(&self, user: Address) -> BatchCall {
        BatchCall::encode(
            self.lending_pool,
            &ILendingPool::getUserAccountDataCall { user },
        )
    }
}

fn ensure_len<T>(data: &[T], expected: usize, what: &str) -> Result<()> {
    if data.len() != expected {
        bail!("{what}: expected {expected} results, got {}", data.len());
    }
    Ok(())
}

fn decode_balance(raw: &[u8]) -> Result<U256> {
    Ok(decode_return::<IERC20::balanceOfCall>(raw)?._0)
}

fn decode_account_data(raw: &[u8]) -> Result<AccountData> {
    let d = decode_return::<ILendingPool::getUserAccountDataCall>(raw)?;
    Ok(AccountData {
        total_collateral: d.totalCollateralETH,
        total_debt: d.totalDebtETH,
        available_borrows: d.availableBorrowsETH,
        current_liquidation_threshold: d.currentLiquidationThreshold,
        ltv: d.ltv,
        health_factor: d.healthFactor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;
    use alloy::sol_types::SolValue;

    const POOL: Address = Address::repeat_byte(0xAA);

    fn asset(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn a_token(n: u8) -> Address {
        Address::repeat_byte(0x10 + n)
    }

    fn debt_token(n: u8) -> Address {
        Address::repeat_byte(0x20 + n)
    }

    fn reserve_data(config: U256, n: u8) -> Vec<u8> {
        (
            config,
            0u128,
            0u128,
            0u128,
            0u128,
            0u128,
            0u64,
            a_token(n),
            Address::repeat_byte(0x30 + n),
            debt_token(n),
            Address::ZERO,
            U256::from(n),
        )
            .abi_encode_params()
    }

    fn account(collateral: u64, debt: u64, available: u64, hf: U256) -> Vec<u8> {
        (
            U256::from(collateral),
            U256::from(debt),
            U256::from(available),
            U256::from(8000u64),
            U256::from(7500u64),
            hf,
        )
            .abi_encode_params()
    }

    fn balance(value: u64) -> Vec<u8> {
        (U256::from(value),).abi_encode_params()
    }

    fn test_reserve(n: u8) -> Reserve {
        Reserve {
            asset: asset(n),
            id: n,
            configuration: ReserveConfiguration::default(),
            a_token: a_token(n),
            stable_debt_token: Address::repeat_byte(0x30 + n),
            variable_debt_token: debt_token(n),
            asset_price_wad: U256::ZERO,
        }
    }

    #[tokio::test]
    async fn test_reserves_decode_config_and_read_price_on_atoken() {
        let mut chain = MockChain::new();
        let config = ReserveConfiguration {
            liquidation_bonus_bps: 10500,
            decimals: 6,
            is_active: true,
            is_frozen: true,
            ..ReserveConfiguration::default()
        };

        chain.on_call(
            POOL,
            &ILendingPool::getReservesListCall {},
            (vec![asset(1)],).abi_encode_params(),
        );
        chain.on_call(
            POOL,
            &ILendingPool::getReserveDataCall { asset: asset(1) },
            reserve_data(config.encode(), 1),
        );
        chain.on_call(
            a_token(1),
            &IPriceSource::getAssetPriceCall {},
            balance(500_000_000_000_000),
        );

        let reader = LendingPoolReader::new(Arc::new(chain), POOL);
        let list = reader.reserves_list().await.unwrap();
        assert_eq!(list, vec![asset(1)]);

        let reserves = reader.reserves(&list).await.unwrap();
        assert_eq!(reserves.len(), 1);
        let reserve = &reserves[0];
        assert_eq!(reserve.configuration, config);
        assert_eq!(reserve.decimals(), 6);
        assert!(reserve.is_frozen());
        assert_eq!(reserve.a_token, a_token(1));
        assert_eq!(reserve.variable_debt_token, debt_token(1));
        assert_eq!(reserve.id, 1);
        assert_eq!(reserve.asset_price_wad, U256::from(500_000_000_000_000u64));
    }

    #[tokio::test]
    async fn test_oversized_decimals_priced_at_zero() {
        let mut chain = MockChain::new();
        for (n, decimals) in [(1u8, 18u8), (2, 78)] {
            let config = ReserveConfiguration {
                decimals,
                is_active: true,
                ..ReserveConfiguration::default()
            };
            chain.on_call(
                POOL,
                &ILendingPool::getReserveDataCall { asset: asset(n) },
                reserve_data(config.encode(), n),
            );
            chain.on_call(a_token(n), &IPriceSource::getAssetPriceCall {}, balance(1_000));
        }

        let reader = LendingPoolReader::new(Arc::new(chain), POOL);
        let reserves = reader.reserves(&[asset(1), asset(2)]).await.unwrap();

        assert_eq!(reserves.len(), 2);
        assert_eq!(reserves[0].asset_price_wad, U256::from(1_000u64));
        assert_eq!(reserves[1].asset, asset(2));
        assert_eq!(reserves[1].asset_price_wad, U256::ZERO);
    }

    #[tokio::test]
    async fn test_missing_price_is_fatal() {
        let mut chain = MockChain::new();
        chain.on_call(
            POOL,
            &ILendingPool::getReserveDataCall { asset: asset(1) },
            reserve_data(U256::ZERO, 1),
        );

        let reader = LendingPoolReader::new(Arc::new(chain), POOL);
        assert!(reader.reserves(&[asset(1)]).await.is_err());
    }

    #[tokio::test]
    async fn test_user_configurations_and_account_data() {
        let user = Address::repeat_byte(0x01);
        let mut chain = MockChain::new();
        chain.on_call(
            POOL,
            &ILendingPool::getUserConfigurationCall { user },
            (U256::from(0b0110u8),).abi_encode_params(),
        );
        chain.on_call(
            POOL,
            &ILendingPool::getUserAccountDataCall { user },
            account(100, 90, 0, U256::from(900_000_000_000_000_000u64)),
        );

        let reader = LendingPoolReader::new(Arc::new(chain), POOL);

        let configs = reader.user_configurations(&[user]).await.unwrap();
        assert!(configs[&user].is_borrowing(0));
        assert!(configs[&user].is_using_as_collateral(1));

        let accounts = reader.account_data(&[user]).await.unwrap();
        assert_eq!(accounts[&user].total_debt, U256::from(90u64));
        assert!(accounts[&user].is_liquidatable());

        let hf = reader.health_factor(user).await.unwrap();
        assert_eq!(hf, U256::from(900_000_000_000_000_000u64));
    }

    #[tokio::test]
    async fn test_user_balances_marks_users_in_failed_chunks() {
        let users: Vec<Address> = (1..=3u8).map(|n| Address::repeat_byte(0x40 + n)).collect();
        let reserves = vec![test_reserve(1), test_reserve(2)];
        let mut chain = MockChain::new();

        for reserve in &reserves {
            for (i, user) in users.iter().enumerate() {
                let call = IERC20::balanceOfCall { account: *user };
                chain.on_call(reserve.a_token, &call, balance(100 + i as u64));
                // Third user's debt in the second reserve reverts
                if reserve.asset == asset(2) && i == 2 {
                    chain.revert_call(reserve.variable_debt_token, &call);
                } else {
                    chain.on_call(reserve.variable_debt_token, &call, balance(10 + i as u64));
                }
            }
        }

        // 12 slots in chunks of 4: the last chunk holds both slots of the
        // second reserve's second and third users
        let reader = LendingPoolReader::new(Arc::new(chain), POOL).with_batch_size(4);
        let balances = reader.user_balances(&users, &reserves).await;

        assert_eq!(balances.errors.len(), 1);
        assert_eq!(balances.errors[0].batch_index, 2);
        assert!(balances.incomplete.contains(&users[1]));
        assert!(balances.incomplete.contains(&users[2]));
        assert!(!balances.balances.contains_key(&users[1]));

        let first = &balances.balances[&users[0]];
        assert_eq!(
            first[&asset(1)],
            RawBalance {
                collateral: U256::from(100u64),
                debt: U256::from(10u64),
            }
        );
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_pool_liquidity_and_provider_capital() {
        let provider = Address::repeat_byte(0x77);
        let reserves = vec![test_reserve(1), test_reserve(2)];
        let mut chain = MockChain::new();

        for (i, reserve) in reserves.iter().enumerate() {
            chain.on_call(
                reserve.asset,
                &IERC20::balanceOfCall {
                    account: reserve.a_token,
                },
                balance(1_000 * (i as u64 + 1)),
            );
            chain.on_call(
                reserve.a_token,
                &IERC20::balanceOfCall { account: provider },
                balance(50 * (i as u64 + 1)),
            );
        }
        chain.on_call(
            POOL,
            &ILendingPool::getUserAccountDataCall { user: provider },
            account(500, 0, 400, U256::MAX),
        );

        let reader = LendingPoolReader::new(Arc::new(chain), POOL);

        let liquidity = reader.pool_liquidity(&reserves).await.unwrap();
        assert_eq!(liquidity[&asset(1)], U256::from(1_000u64));
        assert_eq!(liquidity[&asset(2)], U256::from(2_000u64));

        let capital = reader.provider_capital(&reserves, provider).await.unwrap();
        assert_eq!(capital.balances[&asset(2)], U256::from(100u64));
        assert_eq!(capital.account.available_borrows, U256::from(400u64));
    }
}
