//! Liquidation decision engine.
//!
//! This crate provides the core liquidation bot functionality:
//! - Position model built fresh from batched protocol reads
//! - Liquidation target and borrow-token selection
//! - Exact U256 sizing of the amount to cover
//! - Lazy candidate search with simulate / re-check / submit execution
//! - Cycle orchestration with per-user failure isolation
//! - Bot profiles and deployment configuration

mod candidates;
pub mod config;
mod error;
mod journal;
mod liquidator;
mod pipeline;
mod policy;
mod position;
mod sizing;
pub mod u256_math;

pub use candidates::{divisors, Candidate, CandidatePlans, SearchSpace};
pub use config::{
    load_deployment_from_env, BorrowerFeed, BotConfig, ResolvedContracts, ResolvedDeployment,
};
pub use error::LiquidationError;
pub use journal::{Journal, LiquidationRecord};
pub use liquidator::{
    ContractExecutor, ExecutionOutcome, ExecutionSettings, HealthCheck, LiquidationExecutor,
    Liquidator, SkipReason,
};
pub use pipeline::{CycleReport, LiquidationPipeline, PipelineSettings};
pub use policy::{select_borrow_token, select_targets, BorrowChoice, BorrowSelection, LiquidationTargets};
pub use position::{build_positions, UserPosition, UserPositions};
pub use sizing::{
    collateral_cap, debt_to_cover, max_borrow_usd, CollateralReservation, Sizing, SizingBranch,
    SizingInputs,
};
