//! Error taxonomy for pool construction, datum decoding and pricing.
//!
//! Data errors (`PoolError`) are expected while scanning shared script
//! addresses and are skipped by batch tools. Pricing errors are caller
//! mistakes and should surface immediately.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetBagError {
    #[error("asset index {index} out of range for bag of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("duplicate asset unit: {0}")]
    DuplicateUnit(String),
}

/// Failure to read a Plutus datum into a typed schema.
#[derive(Debug, Error)]
pub enum DatumError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("CBOR error: {0}")]
    Cbor(String),
    #[error("{schema}: expected constructor {expected}, found {found}")]
    Constructor {
        schema: &'static str,
        expected: u64,
        found: u64,
    },
    #[error("{schema}: unknown constructor {found}")]
    UnknownVariant { schema: &'static str, found: u64 },
    #[error("{schema}: expected {expected} fields, found {found}")]
    FieldCount {
        schema: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("expected {expected}, found {found}")]
    Kind {
        expected: &'static str,
        found: String,
    },
    #[error("integer out of range: {0}")]
    IntegerRange(String),
    #[error("address encoding failed: {0}")]
    Address(String),
}

impl DatumError {
    pub(crate) fn kind(expected: &'static str, found: &ciborium::value::Value) -> Self {
        DatumError::Kind {
            expected,
            found: format!("{:?}", found),
        }
    }
}

/// Why a raw UTxO could not be turned into a pool or order state.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no assets: {0}")]
    NoAssets(String),
    #[error("not a pool: {reason}")]
    NotAPool {
        reason: String,
        #[source]
        source: Option<DatumError>,
    },
    #[error("invalid pool: {0}")]
    InvalidPool(String),
    #[error("invalid LP tokens: {0}")]
    InvalidLp(String),
}

impl PoolError {
    pub fn not_a_pool(reason: impl Into<String>) -> Self {
        PoolError::NotAPool {
            reason: reason.into(),
            source: None,
        }
    }

    /// Wraps a datum decode failure with enough context to find the record again.
    pub fn undecodable(tx_hash: &str, datum_cbor: &str, source: DatumError) -> Self {
        PoolError::NotAPool {
            reason: format!(
                "datum could not be decoded (tx_hash={}, datum={})",
                tx_hash, datum_cbor
            ),
            source: Some(source),
        }
    }

    /// All data errors are skippable inside a scan loop.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            PoolError::NoAssets(_)
                | PoolError::NotAPool { .. }
                | PoolError::InvalidPool(_)
                | PoolError::InvalidLp(_)
        )
    }

    /// Records that claim to be a pool but are inconsistent deserve a louder log line.
    pub fn is_suspicious(&self) -> bool {
        matches!(self, PoolError::InvalidPool(_) | PoolError::InvalidLp(_))
    }
}

/// Caller errors raised by quoting functions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("asset should contain exactly one token, found {0}")]
    AssetCount(usize),
    #[error("asset {unit} is invalid for pool {unit_a}-{unit_b}")]
    UnitNotInPool {
        unit: String,
        unit_a: String,
        unit_b: String,
    },
    #[error("requested {requested} exceeds reserve {reserve}")]
    InsufficientLiquidity { requested: i128, reserve: i128 },
    #[error("fee {0} is outside 0..10000 basis points")]
    InvalidFee(i128),
    #[error("stable pool amplification {0} is not positive")]
    InvalidAmplification(i128),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Assets(#[from] AssetBagError),
}
