//! Off-chain inputs of the liquidation bot.
//!
//! This crate provides:
//! - Swap route discovery (Uniswap V3 direct and two-hop routes)
//! - The borrower feed (HTTP, file or static list)

mod borrowers;
pub mod swap;

pub use borrowers::{
    Borrower, BorrowerSource, FileBorrowerSource, HttpBorrowerSource, StaticBorrowerSource,
};
pub use swap::{sort_routes, RouteFinder, RouteKind, SwapRoute, UniswapV3RouteFinder};
