//! Per-user reserve bitmap.
//!
//! Bit `2i` marks reserve `i` as supplied collateral, bit `2i + 1` marks it as borrowed.
//! Reserve indices follow the protocol's reserve list order.

use alloy::primitives::U256;

/// Number of reserve slots a 256-bit word can describe.
pub const MAX_RESERVES: usize = 128;

/// Decoded user configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserConfiguration {
    /// Bit `i` set when reserve `i` is used as collateral
    supplying: u128,
    /// Bit `i` set when reserve `i` is borrowed
    borrowing: u128,
}

impl UserConfiguration {
    pub fn decode(word: U256) -> Self {
        let mut supplying = 0u128;
        let mut borrowing = 0u128;

        for i in 0..MAX_RESERVES {
            if word.bit(2 * i) {
                supplying |= 1 << i;
            }
            if word.bit(2 * i + 1) {
                borrowing |= 1 << i;
            }
        }

        Self {
            supplying,
            borrowing,
        }
    }

    /// Reserve `index` is supplied as collateral. Out-of-range indices are false.
    pub fn is_using_as_collateral(&self, index: usize) -> bool {
        index < MAX_RESERVES && (self.supplying >> index) & 1 == 1
    }

    /// Reserve `index` is borrowed. Out-of-range indices are false.
    pub fn is_borrowing(&self, index: usize) -> bool {
        index < MAX_RESERVES && (self.borrowing >> index) & 1 == 1
    }
}
