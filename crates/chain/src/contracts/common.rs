//! Common contract interfaces shared by the protocol and swap layers.

use alloy::sol;

// ERC20 interface for token interactions
sol! {
    /// Standard ERC20 interface (subset for liquidation needs)
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
    }
}

// Price source exposed by the fork's aTokens
sol! {
    /// Asset price in the native base currency (18 decimals)
    #[sol(rpc)]
    interface IPriceSource {
        function getAssetPrice() external view returns (uint256);
    }
}
