//! Per-user, per-reserve position model.
//!
//! Built fresh every cycle from raw balances, the reserve list, reserve data
//! and user configuration bitmaps. Nothing here is cached across cycles.

use alloy::primitives::{Address, U256};
use liqbot_chain::{Reserve, UserBalances, UserConfiguration};
use std::collections::BTreeMap;
use tracing::debug;

use crate::u256_math::to_usd;

/// One user's position in one reserve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPosition {
    /// Reserve (underlying asset)
    pub reserve: Address,
    pub a_token: Address,
    pub variable_debt_token: Address,
    /// aToken balance, token units
    pub collateral_amount: U256,
    /// Variable debt balance, token units
    pub debt_amount: U256,
    /// Base-currency value of `collateral_amount` (18 decimals)
    pub collateral_amount_usd: U256,
    /// Base-currency value of `debt_amount` (18 decimals)
    pub debt_amount_usd: U256,
    /// Supplied reserve is enabled as collateral
    pub is_collateral: bool,
}

/// All positions of one user, in protocol reserve order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPositions {
    positions: Vec<UserPosition>,
}

impl UserPositions {
    pub fn new(positions: Vec<UserPosition>) -> Self {
        Self { positions }
    }

    /// Position in `reserve`, if the reserve is listed.
    pub fn get(&self, reserve: &Address) -> Option<&UserPosition> {
        self.positions.iter().find(|p| p.reserve == *reserve)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserPosition> {
        self.positions.iter()
    }

    /// Sum of debt values across reserves.
    pub fn total_debt_usd(&self) -> U256 {
        self.positions
            .iter()
            .fold(U256::ZERO, |acc, p| acc.saturating_add(p.debt_amount_usd))
    }
}

/// Merge balances, configuration bitmaps and prices into positions.
///
/// `reserves` must be in protocol list order: the bitmap index of a reserve is
/// its position in that list. Users without a configuration and users whose
/// balance read was incomplete are left out. A reserve with no balance entry
/// reads as zero.
pub fn build_positions(
    users: &[Address],
    balances: &UserBalances,
    user_configs: &BTreeMap<Address, UserConfiguration>,
    reserves: &[Reserve],
) -> BTreeMap<Address, UserPositions> {
    let mut merged = BTreeMap::new();

    for user in users {
        let Some(config) = user_configs.get(user) else {
            debug!(user = %user, "No user configuration, skipping");
            continue;
        };
        if balances.incomplete.contains(user) {
            debug!(user = %user, "Incomplete balances, skipping");
            continue;
        }
        let user_balances = balances.balances.get(user);

        let positions = reserves
            .iter()
            .enumerate()
            .map(|(index, reserve)| {
                let raw = user_balances
                    .and_then(|b| b.get(&reserve.asset))
                    .copied()
                    .unwrap_or_default();
                if !raw.debt.is_zero() && !config.is_borrowing(index) {
                    debug!(user = %user, reserve = %reserve.asset, "Debt balance without borrow flag");
                }

                UserPosition {
                    reserve: reserve.asset,
                    a_token: reserve.a_token,
                    variable_debt_token: reserve.variable_debt_token,
                    collateral_amount: raw.collateral,
                    debt_amount: raw.debt,
                    collateral_amount_usd: to_usd(
                        raw.collateral,
                        reserve.asset_price_wad,
                        reserve.decimals(),
                    ),
                    debt_amount_usd: to_usd(raw.debt, reserve.asset_price_wad, reserve.decimals()),
                    is_collateral: config.is_using_as_collateral(index),
                }
            })
            .collect();

        merged.insert(*user, UserPositions::new(positions));
    }

    merged
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::u256_math::WAD;
    use liqbot_chain::{RawBalance, ReserveConfiguration};

    pub(crate) fn reserve(n: u8, decimals: u8, price: U256) -> Reserve {
        Reserve {
            asset: Address::repeat_byte(n),
            id: n,
            configuration: ReserveConfiguration {
                decimals,
                liquidation_bonus_bps: 10500,
                is_active: true,
                ..ReserveConfiguration::default()
            },
            a_token: Address::repeat_byte(0x10 + n),
            stable_debt_token: Address::repeat_byte(0x30 + n),
            variable_debt_token: Address::repeat_byte(0x20 + n),
            asset_price_wad: price,
        }
    }

    fn balances_for(user: Address, entries: &[(Address, u64, u64)]) -> UserBalances {
        let mut balances = UserBalances::default();
        let map = balances.balances.entry(user).or_default();
        for (asset, collateral, debt) in entries {
            map.insert(
                *asset,
                RawBalance {
                    collateral: U256::from(*collateral),
                    debt: U256::from(*debt),
                },
            );
        }
        balances
    }

    #[test]
    fn test_build_positions_values_and_collateral_flags() {
        let user = Address::repeat_byte(0xAB);
        let usdc = reserve(1, 6, U256::from(500_000_000_000_000u64));
        let weth = reserve(2, 18, WAD);
        let balances = balances_for(
            user,
            &[(usdc.asset, 2_000_000_000, 0), (weth.asset, 0, 1_000_000_000_000_000_000)],
        );
        // Reserve 0 supplied, reserve 1 borrowed
        let configs = BTreeMap::from([(user, UserConfiguration::decode(U256::from(0b1001u8)))]);

        let merged = build_positions(&[user], &balances, &configs, &[usdc.clone(), weth.clone()]);
        let positions = &merged[&user];

        assert_eq!(positions.iter().count(), 2);
        let usdc_pos = positions.get(&usdc.asset).unwrap();
        assert!(usdc_pos.is_collateral);
        assert_eq!(usdc_pos.collateral_amount_usd, WAD);
        assert_eq!(usdc_pos.a_token, usdc.a_token);

        let weth_pos = positions.get(&weth.asset).unwrap();
        assert!(!weth_pos.is_collateral);
        assert_eq!(weth_pos.debt_amount_usd, WAD);
        assert_eq!(positions.total_debt_usd(), WAD);
    }

    #[test]
    fn test_user_without_config_is_skipped() {
        let user = Address::repeat_byte(0xAB);
        let balances = balances_for(user, &[]);
        let merged = build_positions(&[user], &balances, &BTreeMap::new(), &[reserve(1, 18, WAD)]);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_incomplete_user_is_skipped() {
        let user = Address::repeat_byte(0xAB);
        let mut balances = UserBalances::default();
        balances.incomplete.insert(user);
        let configs = BTreeMap::from([(user, UserConfiguration::default())]);

        let merged = build_positions(&[user], &balances, &configs, &[reserve(1, 18, WAD)]);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_missing_balances_read_as_zero() {
        let user = Address::repeat_byte(0xAB);
        let configs = BTreeMap::from([(user, UserConfiguration::default())]);

        let merged = build_positions(
            &[user],
            &UserBalances::default(),
            &configs,
            &[reserve(1, 18, WAD)],
        );
        let position = merged[&user].get(&Address::repeat_byte(1)).unwrap();
        assert_eq!(position.collateral_amount, U256::ZERO);
        assert_eq!(position.debt_amount_usd, U256::ZERO);
    }
}
