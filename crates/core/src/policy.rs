//! Liquidation policy: which reserves to seize and repay, and which asset to borrow.

use alloy::primitives::{Address, U256};
use liqbot_chain::Reserve;
use std::collections::BTreeMap;
use tracing::debug;

use crate::position::{UserPosition, UserPositions};
use crate::u256_math::percent_of;

/// Reserves chosen for one liquidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationTargets {
    /// Reserve whose collateral is seized
    pub collateral: UserPosition,
    /// Reserve whose debt is repaid
    pub debt: UserPosition,
}

/// Pick the largest collateral and the largest non-frozen debt.
///
/// Both use a strict `>` against a running max starting at zero, so ties keep
/// the first reserve in list order and zero balances never qualify. Returns
/// `None` when either side has no eligible reserve.
pub fn select_targets(positions: &UserPositions, reserves: &[Reserve]) -> Option<LiquidationTargets> {
    let mut collateral: Option<&UserPosition> = None;
    let mut max_collateral = U256::ZERO;
    let mut debt: Option<&UserPosition> = None;
    let mut max_debt = U256::ZERO;

    for position in positions.iter() {
        if position.is_collateral && position.collateral_amount > max_collateral {
            max_collateral = position.collateral_amount;
            collateral = Some(position);
        }

        let frozen = reserves
            .iter()
            .find(|r| r.asset == position.reserve)
            .map_or(false, Reserve::is_frozen);
        if !frozen && position.debt_amount > max_debt {
            max_debt = position.debt_amount;
            debt = Some(position);
        }
    }

    Some(LiquidationTargets {
        collateral: collateral?.clone(),
        debt: debt?.clone(),
    })
}

/// Why a borrow asset was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowChoice {
    /// Debt reserve's own pool covers the threshold
    DebtAsset,
    /// Base asset pool covers the threshold
    BaseAsset,
    /// Greatest jointly available liquidity
    JointLiquidity,
}

/// Inputs of the borrow-token decision, all values in the base currency.
#[derive(Debug, Clone, Copy)]
pub struct BorrowSelection<'a> {
    /// Debt reserve asset
    pub debt_reserve: Address,
    /// User's debt in that reserve
    pub user_debt_usd: U256,
    /// Reserve asset -> pool liquidity
    pub pool_liquidity_usd: &'a BTreeMap<Address, U256>,
    /// Reserve asset -> asset provider aToken balance
    pub provider_balances_usd: &'a BTreeMap<Address, U256>,
    /// Wrapped native asset
    pub base_asset: Address,
    /// Share of the debt a pool must hold, in percent
    pub liquidity_threshold_pct: u64,
}

/// Decide which asset to borrow to fund the repayment.
///
/// `reserves` is iterated in list order for the joint-liquidity fallback.
/// Returns `None` only when there are no reserves at all.
pub fn select_borrow_token(
    selection: &BorrowSelection<'_>,
    reserves: &[Reserve],
) -> Option<(Address, BorrowChoice)> {
    let threshold = percent_of(selection.user_debt_usd, selection.liquidity_threshold_pct);
    let pool_usd = |asset: &Address| {
        selection
            .pool_liquidity_usd
            .get(asset)
            .copied()
            .unwrap_or_default()
    };

    if threshold <= pool_usd(&selection.debt_reserve) {
        return Some((selection.debt_reserve, BorrowChoice::DebtAsset));
    }
    if threshold <= pool_usd(&selection.base_asset) {
        return Some((selection.base_asset, BorrowChoice::BaseAsset));
    }

    let mut best: Option<(Address, U256)> = None;
    for reserve in reserves {
        let provider_usd = selection
            .provider_balances_usd
            .get(&reserve.asset)
            .copied()
            .unwrap_or_default();
        let joint = pool_usd(&reserve.asset).min(provider_usd);

        match best {
            Some((_, max)) if joint <= max => {}
            _ => best = Some((reserve.asset, joint)),
        }
    }

    if let Some((asset, joint)) = best {
        debug!(asset = %asset, joint_liquidity = %joint, "Borrowing asset with greatest joint liquidity");
    }
    best.map(|(asset, _)| (asset, BorrowChoice::JointLiquidity))
}
