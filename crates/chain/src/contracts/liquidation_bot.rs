//! Liquidation contract interface.
//!
//! The contract borrows `borrowAsset` from the asset provider, swaps it into the
//! debt asset, liquidates, swaps seized collateral back, and repays. Both swap
//! paths are Uniswap V3 packed paths; an empty path means no swap is needed.

use alloy::primitives::{Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    /// Parameters of a single liquidation attempt
    #[derive(Debug, PartialEq, Eq)]
    struct LiquidationParams {
        address lendingPool;
        address uniswapRouter;
        address uniswapQuoter;
        address assetProvider;
        address collateralAsset;
        address borrowAsset;
        address debtAsset;
        address userToLiquidate;
        uint256 debtToCover;
        uint256 slippage;
        bytes swapPathBorrowToDebt;
        bytes swapPathCollateralToBorrow;
    }

    /// Liquidation bot contract
    #[sol(rpc)]
    interface ILiquidationBot {
        function liquidationBorrow(LiquidationParams calldata params) external;
    }
}

impl LiquidationParams {
    /// True when collateral, borrow and debt asset are the same token.
    pub fn is_same_asset(&self) -> bool {
        self.borrowAsset == self.collateralAsset && self.borrowAsset == self.debtAsset
    }

    /// Copy with a different amount, slippage and swap paths.
    pub fn with_candidate(
        &self,
        debt_to_cover: U256,
        slippage_bps: u16,
        collateral_path: Bytes,
        borrow_path: Bytes,
    ) -> Self {
        Self {
            debtToCover: debt_to_cover,
            slippage: U256::from(slippage_bps),
            swapPathCollateralToBorrow: collateral_path,
            swapPathBorrowToDebt: borrow_path,
            ..self.clone()
        }
    }
}

/// Encode `liquidationBorrow(params)` calldata.
pub fn encode_liquidation_borrow(params: LiquidationParams) -> Bytes {
    let call = ILiquidationBot::liquidationBorrowCall { params };
    Bytes::from(call.abi_encode())
}

#[cfg(test)]
use alloy::primitives::Address;

/// Zero-filled params, used as a template in tests.
#[cfg(test)]
pub(crate) fn empty_params() -> LiquidationParams {
    LiquidationParams {
        lendingPool: Address::ZERO,
        uniswapRouter: Address::ZERO,
        uniswapQuoter: Address::ZERO,
        assetProvider: Address::ZERO,
        collateralAsset: Address::ZERO,
        borrowAsset: Address::ZERO,
        debtAsset: Address::ZERO,
        userToLiquidate: Address::ZERO,
        debtToCover: U256::ZERO,
        slippage: U256::ZERO,
        swapPathBorrowToDebt: Bytes::new(),
        swapPathCollateralToBorrow: Bytes::new(),
    }
}
