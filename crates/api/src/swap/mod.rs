//! Swap route discovery for liquidation.
//!
//! A [`RouteFinder`] returns every candidate path between two tokens, ranked
//! by quoted output. The liquidation contract consumes the packed path
//! (`token ‖ fee ‖ token ...`) directly, so routes carry it pre-encoded.
//!
//! # Example
//!
//! ```rust,ignore
//! use liqbot_api::swap::{RouteFinder, UniswapV3RouteFinder};
//!
//! let finder = UniswapV3RouteFinder::new(reader, factory, quoter, weth);
//! let routes = finder.find_routes(usdc, wbtc, amount).await?;
//! let best = routes.first().map(|r| r.encoded_path.clone());
//! ```

mod uniswap_v3;

pub use uniswap_v3::{encode_path, UniswapV3RouteFinder, DEFAULT_FEE_TIERS, MAX_PATH_LEN};

use alloy::primitives::{Address, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use smallvec::SmallVec;
use std::cmp::Ordering;

/// Shape of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Single pool
    Direct,
    /// Two pools through the base asset
    MultiHop,
}

/// A candidate swap path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRoute {
    pub kind: RouteKind,
    /// Fee tier of each hop, in hundredths of a basis point
    pub fees: SmallVec<[u32; 2]>,
    /// Packed path accepted by the swap router
    pub encoded_path: Bytes,
    /// Quoted output; `None` when the quote reverted
    pub output: Option<U256>,
}

impl SwapRoute {
    /// Check if this is a direct swap (single hop).
    pub fn is_direct(&self) -> bool {
        self.kind == RouteKind::Direct
    }
}

/// Source of ranked swap routes.
#[async_trait]
pub trait RouteFinder: Send + Sync {
    /// Get the router identifier.
    fn router_id(&self) -> &str;

    /// All routes from `token_in` to `token_out`, best quote first.
    ///
    /// Returns an empty list when `token_in == token_out`: no swap is needed.
    async fn find_routes(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<Vec<SwapRoute>>;
}

/// Sort by quoted output, highest first. Unquoted routes go last.
/// The sort is stable, so equal quotes keep discovery order.
pub fn sort_routes(routes: &mut [SwapRoute]) {
    routes.sort_by(|a, b| match (a.output, b.output) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
