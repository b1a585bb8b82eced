//! Sizing of `debtToCover` under pool, provider and debt constraints.
//!
//! The branch order below is load-bearing: each arm picks a different binding
//! constraint and the floors happen in a fixed sequence.

use alloy::primitives::U256;

use crate::u256_math::{usd_to_token_amount, BPS_DENOMINATOR};

/// Which arm of the sizing decision produced the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingBranch {
    /// Debt >= pool, provider >= pool: pool is binding
    PoolLiquidity,
    /// Debt >= pool, provider < pool: provider is binding
    ProviderBalanceOverPool,
    /// Debt < pool, debt >= provider: provider is binding
    ProviderBalanceUnderDebt,
    /// Debt < pool, debt < provider: the whole debt
    UserDebt,
}

/// Base-currency inputs of the sizing decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizingInputs {
    /// Borrow asset available in the lending pool
    pub lending_pool_liquidity_usd: U256,
    /// What the asset provider can still borrow
    pub asset_provider_balance_usd: U256,
    /// User's debt in the selected debt reserve
    pub user_debt_usd: U256,
}

/// Sized liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sizing {
    pub branch: SizingBranch,
    /// Base-currency amount after the collateral cap
    pub max_borrow_usd: U256,
    /// Collateral cap, when it applied
    pub collateral_cap_usd: Option<U256>,
    /// `max_borrow_usd` in borrow-asset units
    pub debt_to_cover: U256,
}

/// Uncapped four-way decision.
pub fn max_borrow_usd(inputs: &SizingInputs) -> (U256, SizingBranch) {
    let SizingInputs {
        lending_pool_liquidity_usd: pool,
        asset_provider_balance_usd: provider,
        user_debt_usd: debt,
    } = *inputs;

    if debt >= pool {
        if provider >= pool {
            (pool, SizingBranch::PoolLiquidity)
        } else {
            (provider, SizingBranch::ProviderBalanceOverPool)
        }
    } else if debt >= provider {
        (provider, SizingBranch::ProviderBalanceUnderDebt)
    } else {
        (debt, SizingBranch::UserDebt)
    }
}

/// Largest borrow that leaves seizable collateral in a pool whose asset is
/// both borrowed and seized.
///
/// `pool / 10000 * reserve_bps - pool / 10000 * (bonus - 10000)`, saturating
/// at zero. A bonus at or below 100% adds nothing back.
pub fn collateral_cap(lending_pool_liquidity_usd: U256, liquidation_bonus_bps: u16, reserve_bps: u16) -> U256 {
    let one_bps = lending_pool_liquidity_usd / BPS_DENOMINATOR;
    let premium_bps = liquidation_bonus_bps.saturating_sub(10_000);

    one_bps
        .saturating_mul(U256::from(reserve_bps))
        .saturating_sub(one_bps.saturating_mul(U256::from(premium_bps)))
}

/// Collateral-side parameters of the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralReservation {
    /// Collateral reserve and borrow asset are the same asset
    pub collateral_is_borrow: bool,
    /// Liquidation bonus of the collateral reserve
    pub liquidation_bonus_bps: u16,
    /// Share of the pool kept for seizure, in basis points
    pub reserve_bps: u16,
}

/// Full sizing: decision, optional cap, then conversion to borrow-asset units.
pub fn debt_to_cover(
    inputs: &SizingInputs,
    reservation: &CollateralReservation,
    borrow_price_wad: U256,
    borrow_decimals: u8,
) -> Sizing {
    let (mut max_borrow, branch) = max_borrow_usd(inputs);

    let collateral_cap_usd = reservation.collateral_is_borrow.then(|| {
        collateral_cap(
            inputs.lending_pool_liquidity_usd,
            reservation.liquidation_bonus_bps,
            reservation.reserve_bps,
        )
    });
    if let Some(cap) = collateral_cap_usd {
        max_borrow = max_borrow.min(cap);
    }

    Sizing {
        branch,
        max_borrow_usd: max_borrow,
        collateral_cap_usd,
        debt_to_cover: usd_to_token_amount(max_borrow, borrow_price_wad, borrow_decimals),
    }
}
