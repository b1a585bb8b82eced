//! Borrower feed: where candidate addresses come from.
//!
//! Entries may carry the protocol's account snapshot. Numeric fields are
//! accepted as JSON numbers or decimal/hex strings, since indexers emit
//! 256-bit values as strings.

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, instrument, warn};

/// Health factor of 1.0 in 18-decimal fixed point.
const ONE_WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// A candidate borrower.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Borrower {
    #[serde(deserialize_with = "deserialize_address")]
    pub address: Address,

    #[serde(default, rename = "totalCollateralETH", deserialize_with = "deserialize_optional_u256")]
    pub total_collateral: Option<U256>,

    #[serde(default, rename = "totalDebtETH", deserialize_with = "deserialize_optional_u256")]
    pub total_debt: Option<U256>,

    #[serde(default, rename = "availableBorrowsETH", deserialize_with = "deserialize_optional_u256")]
    pub available_borrows: Option<U256>,

    #[serde(default, deserialize_with = "deserialize_optional_u256")]
    pub current_liquidation_threshold: Option<U256>,

    #[serde(default, deserialize_with = "deserialize_optional_u256")]
    pub ltv: Option<U256>,

    /// 18-decimal health factor, if the feed knows it
    #[serde(default, deserialize_with = "deserialize_optional_u256")]
    pub health_factor: Option<U256>,
}

impl Borrower {
    /// Borrower known only by address.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            total_collateral: None,
            total_debt: None,
            available_borrows: None,
            current_liquidation_threshold: None,
            ltv: None,
            health_factor: None,
        }
    }

    /// Set the reported health factor.
    pub fn with_health_factor(mut self, health_factor: U256) -> Self {
        self.health_factor = Some(health_factor);
        self
    }

    /// `Some(true)` if the feed reports a health factor below 1.0,
    /// `None` if it reports none.
    pub fn reported_liquidatable(&self) -> Option<bool> {
        self.health_factor.map(|hf| hf < ONE_WAD)
    }
}

/// Source of candidate borrowers.
#[async_trait]
pub trait BorrowerSource: Send + Sync {
    /// Short name for logs.
    fn source_id(&self) -> &str;

    async fn fetch_borrowers(&self) -> Result<Vec<Borrower>>;
}

/// JSON array of borrowers served over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBorrowerSource {
    client: reqwest::Client,
    url: String,
}

impl HttpBorrowerSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl BorrowerSource for HttpBorrowerSource {
    fn source_id(&self) -> &str {
        "http"
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_borrowers(&self) -> Result<Vec<Borrower>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("borrower feed {} returned an error", self.url))?;

        let entries: Vec<serde_json::Value> = response.json().await?;
        let borrowers = parse_entries(entries);
        info!(count = borrowers.len(), "Fetched borrowers");
        Ok(borrowers)
    }
}

/// JSON array of borrowers read from disk on every fetch.
#[derive(Debug, Clone)]
pub struct FileBorrowerSource {
    path: PathBuf,
}

impl FileBorrowerSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BorrowerSource for FileBorrowerSource {
    fn source_id(&self) -> &str {
        "file"
    }

    async fn fetch_borrowers(&self) -> Result<Vec<Borrower>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read borrower file {}", self.path.display()))?;
        let entries: Vec<serde_json::Value> = serde_json::from_str(&content)
            .with_context(|| format!("invalid borrower file {}", self.path.display()))?;
        let borrowers = parse_entries(entries);

        info!(count = borrowers.len(), path = %self.path.display(), "Loaded borrowers");
        Ok(borrowers)
    }
}

/// Fixed list of addresses.
#[derive(Debug, Clone, Default)]
pub struct StaticBorrowerSource {
    borrowers: Vec<Borrower>,
}

impl StaticBorrowerSource {
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self {
            borrowers: addresses.into_iter().map(Borrower::new).collect(),
        }
    }

    /// Parse a comma-separated address list.
    pub fn parse(list: &str) -> Result<Self> {
        let addresses = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Address>().with_context(|| format!("invalid borrower address: {s}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(addresses))
    }

    /// Read the list from the `BORROWERS` environment variable.
    pub fn from_env() -> Result<Self> {
        let list = std::env::var("BORROWERS").context("Missing env var: BORROWERS")?;
        Self::parse(&list)
    }
}

#[async_trait]
impl BorrowerSource for StaticBorrowerSource {
    fn source_id(&self) -> &str {
        "static"
    }

    async fn fetch_borrowers(&self) -> Result<Vec<Borrower>> {
        Ok(self.borrowers.clone())
    }
}

/// Decode feed entries one by one; a malformed entry is dropped, not the feed.
fn parse_entries(entries: Vec<serde_json::Value>) -> Vec<Borrower> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Borrower>(entry) {
            Ok(borrower) => Some(borrower),
            Err(e) => {
                warn!(error = %e, "Dropping malformed borrower entry");
                None
            }
        })
        .collect()
}

fn deserialize_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn deserialize_optional_u256<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => U256::from_str(&s).map(Some).map_err(Error::custom),
        Some(Value::Number(n)) => number_to_u256(&n)
            .map(Some)
            .ok_or_else(|| Error::custom(format!("not an unsigned integer: {n}"))),
        Some(other) => Err(Error::custom(format!("expected number or string, got {other}"))),
    }
}

/// Exact for integers; numbers beyond `u64` that the JSON parser kept only
/// as floats are truncated and saturate at `U256::MAX`.
fn number_to_u256(n: &serde_json::Number) -> Option<U256> {
    if let Some(v) = n.as_u64() {
        return Some(U256::from(v));
    }
    if let Ok(v) = U256::from_str(&n.to_string()) {
        return Some(v);
    }
    n.as_f64().and_then(f64_to_u256)
}

fn f64_to_u256(value: f64) -> Option<U256> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    if value < 1.0 {
        return Some(U256::ZERO);
    }
    let bits = value.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i64 - 1075;
    let mantissa = U256::from((bits & ((1u64 << 52) - 1)) | (1u64 << 52));

    Some(match exponent {
        e if e > 203 => U256::MAX,
        e if e >= 0 => mantissa << e as usize,
        e => mantissa >> e.unsigned_abs() as usize,
    })
}
