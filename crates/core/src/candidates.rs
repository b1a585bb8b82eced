//! Lazy sequence of liquidation candidates for the retry search.
//!
//! Order, outermost first: amount divisor (1, 2, 4, ... below the maximum),
//! slippage, collateral-to-borrow path, borrow-to-debt path.

use alloy::primitives::{Bytes, U256};
use liqbot_chain::LiquidationParams;

/// Search dimensions of one liquidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpace {
    /// Divisors are doubled while strictly below this bound
    pub max_divisor: u64,
    /// Slippage values in basis points, tried in order
    pub slippages_bps: Vec<u16>,
    /// Encoded collateral-to-borrow paths, best first
    pub collateral_paths: Vec<Bytes>,
    /// Encoded borrow-to-debt paths, best first
    pub borrow_paths: Vec<Bytes>,
}

impl SearchSpace {
    /// Total number of candidates the search can yield.
    pub fn len(&self) -> usize {
        let divisors = divisors(self.max_divisor).count();
        divisors * self.slippages_bps.len() * self.collateral_paths.len() * self.borrow_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 1, 2, 4, ... strictly below `max`.
pub fn divisors(max: u64) -> impl Iterator<Item = u64> {
    std::iter::successors(Some(1u64), |d| d.checked_mul(2)).take_while(move |d| *d < max)
}

/// One point of the search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// 1-based position in the search
    pub attempt: usize,
    pub divisor: u64,
    pub slippage_bps: u16,
    pub params: LiquidationParams,
}

/// Iterator over every candidate of a [`SearchSpace`], built from a base plan.
#[derive(Debug)]
pub struct CandidatePlans {
    base: LiquidationParams,
    debt_to_cover: U256,
    space: SearchSpace,
    divisor: u64,
    slippage_idx: usize,
    collateral_idx: usize,
    borrow_idx: usize,
    attempt: usize,
}

impl CandidatePlans {
    pub fn new(base: LiquidationParams, space: SearchSpace) -> Self {
        Self {
            debt_to_cover: base.debtToCover,
            base,
            space,
            divisor: 1,
            slippage_idx: 0,
            collateral_idx: 0,
            borrow_idx: 0,
            attempt: 0,
        }
    }

    fn exhausted(&self) -> bool {
        self.divisor >= self.space.max_divisor
            || self.space.slippages_bps.is_empty()
            || self.space.collateral_paths.is_empty()
            || self.space.borrow_paths.is_empty()
    }

    /// Move to the next combination, innermost dimension first.
    fn advance(&mut self) {
        self.borrow_idx += 1;
        if self.borrow_idx < self.space.borrow_paths.len() {
            return;
        }
        self.borrow_idx = 0;

        self.collateral_idx += 1;
        if self.collateral_idx < self.space.collateral_paths.len() {
            return;
        }
        self.collateral_idx = 0;

        self.slippage_idx += 1;
        if self.slippage_idx < self.space.slippages_bps.len() {
            return;
        }
        self.slippage_idx = 0;

        self.divisor = self.divisor.saturating_mul(2);
    }
}

impl Iterator for CandidatePlans {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        if self.exhausted() {
            return None;
        }

        let slippage_bps = self.space.slippages_bps[self.slippage_idx];
        let params = self.base.with_candidate(
            self.debt_to_cover / U256::from(self.divisor),
            slippage_bps,
            self.space.collateral_paths[self.collateral_idx].clone(),
            self.space.borrow_paths[self.borrow_idx].clone(),
        );
        self.attempt += 1;
        let candidate = Candidate {
            attempt: self.attempt,
            divisor: self.divisor,
            slippage_bps,
            params,
        };

        self.advance();
        Some(candidate)
    }
}
