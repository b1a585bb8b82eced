//! Packed reserve configuration word.
//!
//! Layout (bit ranges inclusive):
//! - 0-15: LTV (bps)
//! - 16-31: liquidation threshold (bps)
//! - 32-47: liquidation bonus (bps, 10000 = 100%)
//! - 48-55: decimals
//! - 56: active, 57: frozen, 58: borrowing enabled, 59: stable rate borrowing enabled
//! - 60-63: reserved
//! - 64-79: reserve factor (bps)

use alloy::primitives::U256;

const LTV_SHIFT: u32 = 0;
const LIQUIDATION_THRESHOLD_SHIFT: u32 = 16;
const LIQUIDATION_BONUS_SHIFT: u32 = 32;
const DECIMALS_SHIFT: u32 = 48;
const ACTIVE_BIT: u32 = 56;
const FROZEN_BIT: u32 = 57;
const BORROWING_BIT: u32 = 58;
const STABLE_BORROWING_BIT: u32 = 59;
const RESERVED_SHIFT: u32 = 60;

/// Largest decimals whose power of ten fits in a U256.
pub const MAX_DECIMALS: u8 = 77;

/// Decoded reserve configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReserveConfiguration {
    pub ltv_bps: u16,
    pub liquidation_threshold_bps: u16,
    pub liquidation_bonus_bps: u16,
    pub decimals: u8,
    pub is_active: bool,
    pub is_frozen: bool,
    pub is_borrowing_enabled: bool,
    pub is_stable_rate_borrowing_enabled: bool,
    /// Bits 60-63, kept so that re-encoding is lossless
    pub reserved: u8,
    pub reserve_factor_bps: u16,
}

impl ReserveConfiguration {
    /// Decode from the on-chain word. Bits above 79 are ignored.
    pub fn decode(word: U256) -> Self {
        let limbs = word.as_limbs();
        let low = limbs[0];
        let high = limbs[1];

        Self {
            ltv_bps: (low >> LTV_SHIFT) as u16,
            liquidation_threshold_bps: (low >> LIQUIDATION_THRESHOLD_SHIFT) as u16,
            liquidation_bonus_bps: (low >> LIQUIDATION_BONUS_SHIFT) as u16,
            decimals: (low >> DECIMALS_SHIFT) as u8,
            is_active: (low >> ACTIVE_BIT) & 1 == 1,
            is_frozen: (low >> FROZEN_BIT) & 1 == 1,
            is_borrowing_enabled: (low >> BORROWING_BIT) & 1 == 1,
            is_stable_rate_borrowing_enabled: (low >> STABLE_BORROWING_BIT) & 1 == 1,
            reserved: ((low >> RESERVED_SHIFT) & 0xF) as u8,
            reserve_factor_bps: (high & 0xFFFF) as u16,
        }
    }

    /// Encode back into the on-chain word.
    pub fn encode(&self) -> U256 {
        let low = (self.ltv_bps as u64) << LTV_SHIFT
            | (self.liquidation_threshold_bps as u64) << LIQUIDATION_THRESHOLD_SHIFT
            | (self.liquidation_bonus_bps as u64) << LIQUIDATION_BONUS_SHIFT
            | (self.decimals as u64) << DECIMALS_SHIFT
            | (self.is_active as u64) << ACTIVE_BIT
            | (self.is_frozen as u64) << FROZEN_BIT
            | (self.is_borrowing_enabled as u64) << BORROWING_BIT
            | (self.is_stable_rate_borrowing_enabled as u64) << STABLE_BORROWING_BIT
            | ((self.reserved & 0xF) as u64) << RESERVED_SHIFT;
        let high = self.reserve_factor_bps as u64;

        U256::from_limbs([low, high, 0, 0])
    }
}
