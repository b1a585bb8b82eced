//! Lending pool interface (Aave V2 fork).

use alloy::sol;

sol! {
    /// Lending pool views consumed by the bot
    #[sol(rpc)]
    interface ILendingPool {
        function getReservesList() external view returns (address[] memory);

        function getUserConfiguration(address user) external view returns (uint256);

        function getUserAccountData(address user)
            external
            view
            returns (
                uint256 totalCollateralETH,
                uint256 totalDebtETH,
                uint256 availableBorrowsETH,
                uint256 currentLiquidationThreshold,
                uint256 ltv,
                uint256 healthFactor
            );

        function getReserveData(address asset)
            external
            view
            returns (
                uint256 configuration,
                uint128 liquidityIndex,
                uint128 variableBorrowIndex,
                uint128 currentLiquidityRate,
                uint128 currentVariableBorrowRate,
                uint128 currentStableBorrowRate,
                uint40 lastUpdateTimestamp,
                address aTokenAddress,
                address stableDebtTokenAddress,
                address variableDebtTokenAddress,
                address interestRateStrategyAddress,
                uint8 id
            );
    }
}
