//! One liquidation cycle: global reads, then every user in isolation.
//!
//! Global reads are mandatory and their failure aborts the cycle. Per-user
//! stages run in a fixed order (policy, borrow token, sizing, health re-check,
//! routes, execution) and a failure only affects that user.

use alloy::primitives::{Address, Bytes, U256};
use anyhow::Result;
use chrono::Utc;
use liqbot_api::{Borrower, RouteFinder};
use liqbot_chain::{LendingPoolReader, LiquidationParams, Reserve};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{PolicyConfig, ResolvedContracts};
use crate::error::LiquidationError;
use crate::journal::{Journal, LiquidationRecord};
use crate::liquidator::{ExecutionOutcome, Liquidator, SkipReason};
use crate::policy::{select_borrow_token, select_targets, BorrowSelection};
use crate::position::{build_positions, UserPositions};
use crate::sizing::{debt_to_cover, CollateralReservation, SizingInputs};
use crate::u256_math::{convert_token_amount, to_usd, wad_to_f64};

/// Counts of what happened in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Liquidatable borrowers considered
    pub users_seen: usize,
    /// Policy skips, recovered health factors and incomplete reads
    pub skipped: usize,
    pub confirmed: usize,
    /// Every candidate failed
    pub exhausted: usize,
    /// Unexpected per-user errors
    pub failed: usize,
    /// Failed balance chunks
    pub chunk_errors: usize,
}

/// Policy parameters plus the chain the journal is written for.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub chain_id: u64,
    pub policy: PolicyConfig,
}

/// Protocol state shared by every user of a cycle.
struct CycleState {
    reserves: Vec<Reserve>,
    pool_liquidity_usd: BTreeMap<Address, U256>,
    provider_balances_usd: BTreeMap<Address, U256>,
    provider_available_borrows: U256,
}

impl CycleState {
    fn reserve(&self, asset: Address) -> Result<&Reserve, LiquidationError> {
        self.reserves
            .iter()
            .find(|r| r.asset == asset)
            .ok_or(LiquidationError::MissingReserve { asset })
    }
}

/// Runs liquidation cycles against one deployment.
pub struct LiquidationPipeline {
    pool: LendingPoolReader,
    routes: Arc<dyn RouteFinder>,
    liquidator: Liquidator,
    contracts: ResolvedContracts,
    settings: PipelineSettings,
    journal: Option<Journal>,
}

impl LiquidationPipeline {
    pub fn new(
        pool: LendingPoolReader,
        routes: Arc<dyn RouteFinder>,
        liquidator: Liquidator,
        contracts: ResolvedContracts,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            pool,
            routes,
            liquidator,
            contracts,
            settings,
            journal: None,
        }
    }

    /// Record confirmed liquidations.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Run one cycle over `borrowers`.
    ///
    /// Returns an error only when a global read fails.
    #[instrument(skip_all, fields(borrowers = borrowers.len()))]
    pub async fn run_cycle(&self, borrowers: &[Borrower]) -> Result<CycleReport> {
        let start = Instant::now();
        let mut report = CycleReport::default();

        let list = self.pool.reserves_list().await?;
        let reserves = self.pool.reserves(&list).await?;

        let users = self.liquidatable_users(borrowers).await?;
        report.users_seen = users.len();
        if users.is_empty() {
            info!(elapsed_ms = start.elapsed().as_millis(), "No liquidatable borrowers");
            return Ok(report);
        }

        let configs = self.pool.user_configurations(&users).await?;
        let balances = self.pool.user_balances(&users, &reserves).await;
        report.chunk_errors = balances.errors.len();

        let (liquidity, capital) = tokio::try_join!(
            self.pool.pool_liquidity(&reserves),
            self.pool.provider_capital(&reserves, self.contracts.asset_provider),
        )?;

        let positions = build_positions(&users, &balances, &configs, &reserves);
        report.skipped += users.len() - positions.len();

        let state = CycleState {
            pool_liquidity_usd: usd_values(&liquidity, &reserves),
            provider_balances_usd: usd_values(&capital.balances, &reserves),
            provider_available_borrows: capital.account.available_borrows,
            reserves,
        };
        info!(
            users = positions.len(),
            reserves = state.reserves.len(),
            provider_available_borrows = wad_to_f64(state.provider_available_borrows),
            read_ms = start.elapsed().as_millis(),
            "Cycle state loaded"
        );

        for (user, user_positions) in &positions {
            match self.liquidate_user(*user, user_positions, &state).await {
                Ok(ExecutionOutcome::Confirmed { .. }) => report.confirmed += 1,
                Ok(ExecutionOutcome::Skipped(_)) => report.skipped += 1,
                Ok(ExecutionOutcome::Exhausted { attempts }) => {
                    warn!(user = %user, attempts, "No candidate succeeded");
                    report.exhausted += 1;
                }
                Err(e) if e.is_skip() => {
                    info!(user = %user, reason = %e, "Skipping user");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(user = %user, error = %e, "Liquidation failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            users = report.users_seen,
            confirmed = report.confirmed,
            skipped = report.skipped,
            exhausted = report.exhausted,
            failed = report.failed,
            chunk_errors = report.chunk_errors,
            elapsed_ms = start.elapsed().as_millis(),
            "Cycle finished"
        );
        Ok(report)
    }

    /// Borrowers below health factor 1.0, deduplicated and in address order.
    ///
    /// A health factor reported by the feed is trusted for filtering; the
    /// others are read in one batch.
    async fn liquidatable_users(&self, borrowers: &[Borrower]) -> Result<Vec<Address>> {
        let mut users = BTreeSet::new();
        let mut unknown = BTreeSet::new();

        for borrower in borrowers {
            match borrower.reported_liquidatable() {
                Some(true) => {
                    users.insert(borrower.address);
                }
                Some(false) => {}
                None => {
                    unknown.insert(borrower.address);
                }
            }
        }

        if !unknown.is_empty() {
            let unknown: Vec<Address> = unknown.into_iter().collect();
            let accounts = self.pool.account_data(&unknown).await?;
            for (user, account) in accounts {
                if account.is_liquidatable() {
                    users.insert(user);
                }
            }
        }

        debug!(
            borrowers = borrowers.len(),
            liquidatable = users.len(),
            "Borrowers filtered"
        );
        Ok(users.into_iter().collect())
    }

    #[instrument(skip_all, fields(user = %user))]
    async fn liquidate_user(
        &self,
        user: Address,
        positions: &UserPositions,
        state: &CycleState,
    ) -> Result<ExecutionOutcome, LiquidationError> {
        let Some(targets) = select_targets(positions, &state.reserves) else {
            warn!(user = %user, "FROZEN, CANNOT LIQUIDATE");
            return Err(LiquidationError::NoEligibleReserves { user });
        };
        let collateral = state.reserve(targets.collateral.reserve)?;
        let debt = state.reserve(targets.debt.reserve)?;

        let selection = BorrowSelection {
            debt_reserve: debt.asset,
            user_debt_usd: targets.debt.debt_amount_usd,
            pool_liquidity_usd: &state.pool_liquidity_usd,
            provider_balances_usd: &state.provider_balances_usd,
            base_asset: self.contracts.base_asset,
            liquidity_threshold_pct: self.settings.policy.liquidity_threshold_pct,
        };
        let (borrow_asset, choice) =
            select_borrow_token(&selection, &state.reserves).ok_or(LiquidationError::NoBorrowAsset)?;
        let borrow = state.reserve(borrow_asset)?;

        let inputs = SizingInputs {
            lending_pool_liquidity_usd: state
                .pool_liquidity_usd
                .get(&borrow_asset)
                .copied()
                .unwrap_or_default(),
            asset_provider_balance_usd: state.provider_available_borrows,
            user_debt_usd: targets.debt.debt_amount_usd,
        };
        let reservation = CollateralReservation {
            collateral_is_borrow: collateral.asset == borrow_asset,
            liquidation_bonus_bps: collateral.liquidation_bonus_bps(),
            reserve_bps: self.settings.policy.collateral_reserve_bps,
        };
        let sizing = debt_to_cover(&inputs, &reservation, borrow.asset_price_wad, borrow.decimals());

        info!(
            collateral = %collateral.asset,
            debt = %debt.asset,
            borrow = %borrow_asset,
            borrow_choice = ?choice,
            branch = ?sizing.branch,
            user_debt_usd = wad_to_f64(inputs.user_debt_usd),
            total_debt_usd = wad_to_f64(positions.total_debt_usd()),
            max_borrow_usd = wad_to_f64(sizing.max_borrow_usd),
            capped = sizing.collateral_cap_usd.is_some(),
            debt_to_cover = %sizing.debt_to_cover,
            "Liquidation sized"
        );
        if sizing.debt_to_cover.is_zero() {
            return Err(LiquidationError::NothingToCover);
        }

        if let Some(health_factor) = self.liquidator.recheck_health(user).await? {
            return Ok(ExecutionOutcome::Skipped(SkipReason::HealthRecovered { health_factor }));
        }

        let borrow_amount = convert_token_amount(
            sizing.debt_to_cover,
            borrow.decimals(),
            borrow.asset_price_wad,
            debt.decimals(),
            debt.asset_price_wad,
        );
        let collateral_amount = convert_token_amount(
            borrow_amount,
            borrow.decimals(),
            borrow.asset_price_wad,
            collateral.decimals(),
            collateral.asset_price_wad,
        );

        let route_start = Instant::now();
        let (borrow_routes, collateral_routes) = tokio::try_join!(
            self.routes.find_routes(borrow_asset, debt.asset, borrow_amount),
            self.routes.find_routes(collateral.asset, borrow_asset, collateral_amount),
        )?;
        debug!(
            router = self.routes.router_id(),
            borrow_routes = borrow_routes.len(),
            collateral_routes = collateral_routes.len(),
            direct_borrow_routes = borrow_routes.iter().filter(|r| r.is_direct()).count(),
            route_ms = route_start.elapsed().as_millis(),
            "Routes found"
        );

        let borrow_paths: Vec<Bytes> = borrow_routes.into_iter().map(|r| r.encoded_path).collect();
        let collateral_paths: Vec<Bytes> =
            collateral_routes.into_iter().map(|r| r.encoded_path).collect();

        let base = LiquidationParams {
            lendingPool: self.contracts.lending_pool,
            uniswapRouter: self.contracts.uniswap_router,
            uniswapQuoter: self.contracts.uniswap_quoter,
            assetProvider: self.contracts.asset_provider,
            collateralAsset: collateral.asset,
            borrowAsset: borrow_asset,
            debtAsset: debt.asset,
            userToLiquidate: user,
            debtToCover: sizing.debt_to_cover,
            slippage: U256::from(self.settings.policy.default_slippage_bps),
            swapPathBorrowToDebt: borrow_paths.first().cloned().unwrap_or_default(),
            swapPathCollateralToBorrow: collateral_paths.first().cloned().unwrap_or_default(),
        };

        let outcome = self
            .liquidator
            .execute(base, collateral_paths, borrow_paths)
            .await?;

        if let (ExecutionOutcome::Confirmed { tx_hash, params, .. }, Some(journal)) =
            (&outcome, &self.journal)
        {
            journal.append(&LiquidationRecord {
                chain_id: self.settings.chain_id,
                user,
                timestamp: Utc::now(),
                collateral: params.collateralAsset,
                debt: params.debtAsset,
                borrow: params.borrowAsset,
                amount: params.debtToCover,
                tx_hash: *tx_hash,
            });
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for LiquidationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidationPipeline")
            .field("pool", &self.pool)
            .field("contracts", &self.contracts)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Attach base-currency values to raw per-reserve amounts.
fn usd_values(amounts: &BTreeMap<Address, U256>, reserves: &[Reserve]) -> BTreeMap<Address, U256> {
    reserves
        .iter()
        .map(|r| {
            let amount = amounts.get(&r.asset).copied().unwrap_or_default();
            (r.asset, to_usd(amount, r.asset_price_wad, r.decimals()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liquidator::{ExecutionSettings, HealthCheck, LiquidationExecutor};
    use alloy::primitives::B256;
    use alloy::sol_types::SolValue;
    use async_trait::async_trait;
    use liqbot_api::{RouteKind, SwapRoute};
    use liqbot_chain::contracts::{ILendingPool, IPriceSource, IERC20};
    use liqbot_chain::testing::MockChain;
    use liqbot_chain::ReserveConfiguration;
    use parking_lot::Mutex;
    use std::time::Duration;

    const POOL: Address = Address::repeat_byte(0xAA);
    const PROVIDER: Address = Address::repeat_byte(0x77);
    const USER: Address = Address::repeat_byte(0x41);
    const HEALTHY: Address = Address::repeat_byte(0x42);
    const DEBT_ASSET: Address = Address::repeat_byte(1);
    const BASE_ASSET: Address = Address::repeat_byte(2);

    fn wad() -> U256 {
        U256::from(1_000_000_000_000_000_000u64)
    }

    fn a_token(n: u8) -> Address {
        Address::repeat_byte(0x10 + n)
    }

    fn debt_token(n: u8) -> Address {
        Address::repeat_byte(0x20 + n)
    }

    fn uint(value: U256) -> Vec<u8> {
        (value,).abi_encode_params()
    }

    fn account(available: u64, hf: U256) -> Vec<u8> {
        (
            U256::ZERO,
            U256::ZERO,
            U256::from(available),
            U256::ZERO,
            U256::ZERO,
            hf,
        )
            .abi_encode_params()
    }

    /// Two 18-decimal reserves priced at 1.0. USER borrows 900 of reserve 1
    /// against 1000 of reserve 2; the provider can borrow 500.
    fn chain(debt_frozen: bool) -> MockChain {
        let mut chain = MockChain::new();
        chain.on_call(
            POOL,
            &ILendingPool::getReservesListCall {},
            (vec![DEBT_ASSET, BASE_ASSET],).abi_encode_params(),
        );

        for n in 1..=2u8 {
            let config = ReserveConfiguration {
                decimals: 18,
                liquidation_bonus_bps: 10500,
                is_active: true,
                is_frozen: debt_frozen && n == 1,
                ..ReserveConfiguration::default()
            };
            chain.on_call(
                POOL,
                &ILendingPool::getReserveDataCall {
                    asset: Address::repeat_byte(n),
                },
                (
                    config.encode(),
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
                    .abi_encode_params(),
            );
            chain.on_call(a_token(n), &IPriceSource::getAssetPriceCall {}, uint(wad()));

            let (collateral, debt) = if n == 1 { (0u64, 900u64) } else { (1000, 0) };
            let user_balance = IERC20::balanceOfCall { account: USER };
            chain.on_call(a_token(n), &user_balance, uint(U256::from(collateral)));
            chain.on_call(debt_token(n), &user_balance, uint(U256::from(debt)));

            chain.on_call(
                Address::repeat_byte(n),
                &IERC20::balanceOfCall { account: a_token(n) },
                uint(U256::from(10_000u64)),
            );
            chain.on_call(
                a_token(n),
                &IERC20::balanceOfCall { account: PROVIDER },
                uint(U256::ZERO),
            );
        }

        // Reserve 0 borrowed, reserve 1 supplied
        chain.on_call(
            POOL,
            &ILendingPool::getUserConfigurationCall { user: USER },
            uint(U256::from(0b0110u8)),
        );
        chain.on_call(
            POOL,
            &ILendingPool::getUserAccountDataCall { user: HEALTHY },
            account(0, wad() + wad()),
        );
        chain.on_call(
            POOL,
            &ILendingPool::getUserAccountDataCall { user: PROVIDER },
            account(500, U256::MAX),
        );
        chain
    }

    struct FakeRoutes;

    #[async_trait]
    impl RouteFinder for FakeRoutes {
        fn router_id(&self) -> &str {
            "fake"
        }

        async fn find_routes(
            &self,
            token_in: Address,
            token_out: Address,
            _amount_in: U256,
        ) -> Result<Vec<SwapRoute>> {
            if token_in == token_out {
                return Ok(vec![]);
            }
            Ok(vec![SwapRoute {
                kind: RouteKind::Direct,
                fees: Default::default(),
                encoded_path: Bytes::from(vec![0xAB]),
                output: Some(U256::from(1u8)),
            }])
        }
    }

    #[derive(Default)]
    struct RecordingExecutor {
        submitted: Mutex<Vec<LiquidationParams>>,
    }

    #[async_trait]
    impl LiquidationExecutor for RecordingExecutor {
        async fn simulate(&self, _params: &LiquidationParams) -> Result<()> {
            Ok(())
        }

        async fn submit(&self, params: &LiquidationParams) -> Result<B256> {
            self.submitted.lock().push(params.clone());
            Ok(B256::repeat_byte(0xEE))
        }
    }

    struct FixedHealth(U256);

    #[async_trait]
    impl HealthCheck for FixedHealth {
        async fn health_factor(&self, _user: Address) -> Result<U256> {
            Ok(self.0)
        }
    }

    fn contracts() -> ResolvedContracts {
        ResolvedContracts {
            lending_pool: POOL,
            multicall: Address::repeat_byte(0xCA),
            liquidation_bot: Address::repeat_byte(0xB0),
            asset_provider: PROVIDER,
            uniswap_router: Address::repeat_byte(0xE1),
            uniswap_factory: Address::repeat_byte(0xE2),
            uniswap_quoter: Address::repeat_byte(0xE3),
            base_asset: BASE_ASSET,
        }
    }

    fn pipeline(chain: MockChain, executor: Arc<RecordingExecutor>, hf: U256) -> LiquidationPipeline {
        let liquidator = Liquidator::new(
            executor,
            Arc::new(FixedHealth(hf)),
            ExecutionSettings {
                simulate_timeout: Duration::from_secs(1),
                submit_timeout: Duration::from_secs(1),
                ..ExecutionSettings::default()
            },
        );
        LiquidationPipeline::new(
            LendingPoolReader::new(Arc::new(chain), POOL),
            Arc::new(FakeRoutes),
            liquidator,
            contracts(),
            PipelineSettings {
                chain_id: 31337,
                policy: PolicyConfig::default(),
            },
        )
    }

    fn borrowers() -> Vec<Borrower> {
        vec![
            Borrower::new(USER).with_health_factor(wad() / U256::from(2u8)),
            Borrower::new(HEALTHY),
            // Reported healthy, never read
            Borrower::new(Address::repeat_byte(0x43)).with_health_factor(wad()),
        ]
    }

    #[tokio::test]
    async fn test_cycle_liquidates_with_debt_asset() {
        let executor = Arc::new(RecordingExecutor::default());
        let pipeline = pipeline(chain(false), executor.clone(), wad() / U256::from(2u8));

        let report = pipeline.run_cycle(&borrowers()).await.unwrap();
        assert_eq!(
            report,
            CycleReport {
                users_seen: 1,
                confirmed: 1,
                ..CycleReport::default()
            }
        );

        let submitted = executor.submitted.lock();
        assert_eq!(submitted.len(), 1);
        let params = &submitted[0];
        // 15% of 900 is covered by the debt pool, so the debt asset is borrowed.
        // Debt 900 < pool 10000 and >= provider 500: provider-bound.
        assert_eq!(params.borrowAsset, DEBT_ASSET);
        assert_eq!(params.debtAsset, DEBT_ASSET);
        assert_eq!(params.collateralAsset, BASE_ASSET);
        assert_eq!(params.debtToCover, U256::from(500u64));
        assert_eq!(params.slippage, U256::from(100u64));
        assert_eq!(params.swapPathBorrowToDebt, Bytes::new());
        assert_eq!(params.swapPathCollateralToBorrow, Bytes::from(vec![0xAB]));
        assert_eq!(params.userToLiquidate, USER);
        assert_eq!(params.assetProvider, PROVIDER);
    }

    #[tokio::test]
    async fn test_frozen_debt_skips_user() {
        let executor = Arc::new(RecordingExecutor::default());
        let pipeline = pipeline(chain(true), executor.clone(), wad() / U256::from(2u8));

        let report = pipeline.run_cycle(&borrowers()).await.unwrap();
        assert_eq!(report.users_seen, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.confirmed, 0);
        assert!(executor.submitted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_recovered_user_is_not_submitted() {
        let executor = Arc::new(RecordingExecutor::default());
        let pipeline = pipeline(chain(false), executor.clone(), wad());

        let report = pipeline.run_cycle(&borrowers()).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(executor.submitted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_no_liquidatable_borrowers() {
        let executor = Arc::new(RecordingExecutor::default());
        let pipeline = pipeline(chain(false), executor, wad());

        let report = pipeline.run_cycle(&[Borrower::new(HEALTHY)]).await.unwrap();
        assert_eq!(report, CycleReport::default());
    }

    #[tokio::test]
    async fn test_unreadable_reserve_list_is_global_error() {
        let executor = Arc::new(RecordingExecutor::default());
        let pipeline = pipeline(MockChain::new(), executor, wad());
        assert!(pipeline.run_cycle(&borrowers()).await.is_err());
    }

    #[tokio::test]
    async fn test_confirmed_liquidation_is_journaled() {
        let path = std::env::temp_dir().join(format!("liqbot-cycle-{}.jsonl", std::process::id()));
        std::fs::remove_file(&path).ok();

        let executor = Arc::new(RecordingExecutor::default());
        let pipeline = pipeline(chain(false), executor, wad() / U256::from(2u8))
            .with_journal(Journal::new(&path));
        pipeline.run_cycle(&borrowers()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let record: LiquidationRecord = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(record.user, USER);
        assert_eq!(record.chain_id, 31337);
        assert_eq!(record.amount, U256::from(500u64));
        assert_eq!(record.tx_hash, B256::repeat_byte(0xEE));
    }
}
