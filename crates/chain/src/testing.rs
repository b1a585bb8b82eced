//! In-memory [`BatchReader`] for tests.
//!
//! Responses are registered per `(target, calldata)` pair. Unregistered or
//! reverting calls fail the whole batch in `aggregate` and report
//! `success = false` in `try_aggregate`, mirroring Multicall3.

use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolCall;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::multicall::{BatchCall, BatchReader, CallResult};

/// Scripted chain state keyed by exact call.
#[derive(Debug, Default)]
pub struct MockChain {
    responses: HashMap<(Address, Bytes), Option<Bytes>>,
    aggregate_batches: Mutex<Vec<usize>>,
    try_aggregate_batches: Mutex<Vec<usize>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the encoded return data of a typed call,
    /// e.g. `(U256::from(1),).abi_encode_params()`.
    pub fn on_call<C: SolCall>(&mut self, target: Address, call: &C, ret: Vec<u8>) {
        self.on_raw(target, call.abi_encode(), ret);
    }

    /// Register raw return data for raw calldata.
    pub fn on_raw(&mut self, target: Address, call_data: Vec<u8>, ret: Vec<u8>) {
        self.responses
            .insert((target, Bytes::from(call_data)), Some(Bytes::from(ret)));
    }

    /// Make a typed call revert.
    pub fn revert_call<C: SolCall>(&mut self, target: Address, call: &C) {
        self.responses
            .insert((target, Bytes::from(call.abi_encode())), None);
    }

    /// Sizes of every `aggregate` batch issued so far.
    pub fn aggregate_batches(&self) -> Vec<usize> {
        self.aggregate_batches.lock().clone()
    }

    /// Sizes of every `try_aggregate` batch issued so far.
    pub fn try_aggregate_batches(&self) -> Vec<usize> {
        self.try_aggregate_batches.lock().clone()
    }

    fn lookup(&self, call: &BatchCall) -> Option<Bytes> {
        self.responses
            .get(&(call.target, call.call_data.clone()))
            .cloned()
            .flatten()
    }
}

#[async_trait]
impl BatchReader for MockChain {
    async fn aggregate(&self, calls: Vec<BatchCall>) -> Result<Vec<Bytes>> {
        self.aggregate_batches.lock().push(calls.len());
        calls
            .iter()
            .map(|call| {
                self.lookup(call).ok_or_else(|| {
                    anyhow::anyhow!("Multicall3: call failed (target {})", call.target)
                })
            })
            .collect()
    }

    async fn try_aggregate(&self, calls: Vec<BatchCall>) -> Result<Vec<CallResult>> {
        self.try_aggregate_batches.lock().push(calls.len());
        Ok(calls
            .iter()
            .map(|call| match self.lookup(call) {
                Some(return_data) => CallResult {
                    success: true,
                    return_data,
                },
                None => CallResult {
                    success: false,
                    return_data: Bytes::new(),
                },
            })
            .collect())
    }
}
