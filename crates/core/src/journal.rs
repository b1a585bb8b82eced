//! Append-only JSON-lines record of confirmed liquidations.

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One confirmed liquidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRecord {
    pub chain_id: u64,
    pub user: Address,
    pub timestamp: DateTime<Utc>,
    pub collateral: Address,
    pub debt: Address,
    pub borrow: Address,
    /// Debt covered, borrow-asset units
    pub amount: U256,
    pub tx_hash: B256,
}

/// Journal file. Writes are serialized; failures are logged and dropped.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record` as one JSON line.
    pub fn append(&self, record: &LiquidationRecord) {
        if let Err(e) = self.try_append(record) {
            warn!(path = %self.path.display(), error = %e, "Failed to write liquidation journal");
        }
    }

    fn try_append(&self, record: &LiquidationRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;

        debug!(user = %record.user, tx_hash = %record.tx_hash, "Liquidation journaled");
        Ok(())
    }
}
