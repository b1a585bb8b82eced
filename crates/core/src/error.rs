use alloy::primitives::Address;
use thiserror::Error;

/// Per-user liquidation errors.
///
/// Skip variants are expected outcomes of the policy and never abort a cycle.
/// Everything else is a failure for that user only; global read failures are
/// propagated as `anyhow::Error` by the pipeline.
#[derive(Error, Debug)]
pub enum LiquidationError {
    // -- Policy -------------------------------------------------------------
    #[error("no eligible collateral or debt reserve for {user} (FROZEN, CANNOT LIQUIDATE)")]
    NoEligibleReserves { user: Address },

    #[error("no reserve available to borrow")]
    NoBorrowAsset,

    #[error("debt to cover rounds to zero")]
    NothingToCover,

    #[error("reserve {asset} missing from reserve data")]
    MissingReserve { asset: Address },

    // -- Execution ----------------------------------------------------------
    #[error("same-asset liquidation failed: {reason}")]
    SameAssetFailed { reason: String },

    #[error("{stage} timed out after {timeout_ms}ms")]
    Timeout { stage: &'static str, timeout_ms: u128 },

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LiquidationError {
    /// Expected policy outcome rather than a failure.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::NoEligibleReserves { .. }
                | Self::NoBorrowAsset
                | Self::NothingToCover
        )
    }
}
