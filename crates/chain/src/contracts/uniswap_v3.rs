//! Uniswap V3 factory and quoter interfaces.

use alloy::sol;

sol! {
    /// Pool lookup by token pair and fee tier
    #[sol(rpc)]
    interface IUniswapV3Factory {
        function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address pool);
    }

    /// Quoter (V1 signatures): single-hop and packed-path quotes
    #[sol(rpc)]
    interface IQuoter {
        function quoteExactInputSingle(
            address tokenIn,
            address tokenOut,
            uint24 fee,
            uint256 amountIn,
            uint160 sqrtPriceLimitX96
        ) external returns (uint256 amountOut);

        function quoteExactInput(bytes memory path, uint256 amountIn) external returns (uint256 amountOut);
    }
}
