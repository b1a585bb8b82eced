//! Lending protocol state as the bot sees it.
//!
//! - [`ReserveConfiguration`] / [`UserConfiguration`]: codecs for the packed on-chain words
//! - [`LendingPoolReader`]: every protocol read, issued through a [`crate::BatchReader`]
//! - Plain data types for reserves, account snapshots and raw balances

mod lending_pool;
mod reserve_config;
mod user_config;

pub use lending_pool::LendingPoolReader;
pub use reserve_config::{ReserveConfiguration, MAX_DECIMALS};
pub use user_config::{UserConfiguration, MAX_RESERVES};

use crate::multicall::ChunkError;
use alloy::primitives::{Address, U256};
use std::collections::{BTreeMap, BTreeSet};

/// Health factor of exactly 1.0 in 18-decimal fixed point.
/// Positions strictly below are liquidatable.
pub const HEALTH_FACTOR_LIQUIDATION_THRESHOLD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// A reserve read from the protocol at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reserve {
    /// Underlying asset
    pub asset: Address,
    /// Index in the protocol's reserve list
    pub id: u8,
    pub configuration: ReserveConfiguration,
    pub a_token: Address,
    pub stable_debt_token: Address,
    pub variable_debt_token: Address,
    /// Price in the native base currency, 18 decimals
    pub asset_price_wad: U256,
}

impl Reserve {
    pub fn decimals(&self) -> u8 {
        self.configuration.decimals
    }

    pub fn is_frozen(&self) -> bool {
        self.configuration.is_frozen
    }

    pub fn liquidation_bonus_bps(&self) -> u16 {
        self.configuration.liquidation_bonus_bps
    }
}

/// `getUserAccountData` snapshot, all values in the 18-decimal base currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountData {
    pub total_collateral: U256,
    pub total_debt: U256,
    pub available_borrows: U256,
    pub current_liquidation_threshold: U256,
    pub ltv: U256,
    pub health_factor: U256,
}

impl AccountData {
    pub fn is_liquidatable(&self) -> bool {
        is_liquidatable(self.health_factor)
    }
}

/// True when `health_factor` is strictly below 1.0.
pub fn is_liquidatable(health_factor: U256) -> bool {
    health_factor < HEALTH_FACTOR_LIQUIDATION_THRESHOLD
}

/// aToken and variable debt token balance of one user in one reserve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawBalance {
    pub collateral: U256,
    pub debt: U256,
}

/// Result of the chunked balance fan-out.
#[derive(Debug, Default)]
pub struct UserBalances {
    /// user -> reserve asset -> balances, only for users with complete data
    pub balances: BTreeMap<Address, BTreeMap<Address, RawBalance>>,
    /// Users with at least one slot in a failed chunk
    pub incomplete: BTreeSet<Address>,
    pub errors: Vec<ChunkError>,
}

/// Capital the asset provider can lend to the liquidation contract.
#[derive(Debug, Clone, Default)]
pub struct ProviderCapital {
    /// reserve asset -> provider aToken balance
    pub balances: BTreeMap<Address, U256>,
    /// Provider's own account snapshot; `available_borrows` bounds every borrow
    pub account: AccountData,
}
