//! Contract bindings for the lending pool, the liquidation contract and the swap venue.

pub mod common;
pub mod lending_pool;
pub mod liquidation_bot;
pub mod uniswap_v3;

pub use common::{IPriceSource, IERC20};
pub use lending_pool::ILendingPool;
pub use liquidation_bot::{encode_liquidation_borrow, ILiquidationBot, LiquidationParams};
pub use uniswap_v3::{IQuoter, IUniswapV3Factory};
